//! Protection and exclusion rules, plus the header parsing they depend on

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

use crate::models::CollectionPolicy;

/// System label that always protects a conversation
pub const IMPORTANT_LABEL: &str = "IMPORTANT";
/// System label that always protects a conversation
pub const STARRED_LABEL: &str = "STARRED";
/// Prefix Gmail gives to ids of user-created labels
pub const CUSTOM_LABEL_PREFIX: &str = "Label_";

pub const UNKNOWN_SENDER: &str = "(Unknown Sender)";
pub const NO_SUBJECT: &str = "(No Subject)";

/// Subject width in collector progress events
pub const COLLECT_SUBJECT_WIDTH: usize = 60;
/// Subject width in cleaner progress events
pub const CLEANUP_SUBJECT_WIDTH: usize = 50;

static ANGLE_ADDRESS: Lazy<Regex> = Lazy::new(|| Regex::new(r"<([^>]+)>").unwrap());

/// Extract the address from a `From` header value
///
/// `"Jane <Jane@Example.com>"` gives `jane@example.com`; without angle
/// brackets the whole trimmed value is used.
pub fn extract_email_address(raw_from: &str) -> String {
    match ANGLE_ADDRESS.captures(raw_from).and_then(|caps| caps.get(1)) {
        Some(address) => address.as_str().to_lowercase(),
        None => raw_from.trim().to_lowercase(),
    }
}

/// Extract the lowercased domain from an address, or `""` without an `@`
pub fn extract_domain(email: &str) -> String {
    email
        .split('@')
        .nth(1)
        .map(str::to_lowercase)
        .unwrap_or_default()
}

/// Whether a conversation with these labels must never be collected
pub fn is_protected(label_ids: &HashSet<String>, policy: &CollectionPolicy) -> bool {
    if label_ids.contains(IMPORTANT_LABEL) || label_ids.contains(STARRED_LABEL) {
        tracing::debug!("Protected by IMPORTANT/STARRED");
        return true;
    }

    if !policy.use_label_protection {
        return false;
    }

    let mut custom = label_ids
        .iter()
        .filter(|label| label.starts_with(CUSTOM_LABEL_PREFIX))
        .peekable();

    if custom.peek().is_none() {
        return false;
    }

    match &policy.protected_label_ids {
        Some(protected) => {
            let matching: Vec<&String> = custom
                .filter(|label| protected.contains(*label))
                .collect();
            if !matching.is_empty() {
                tracing::debug!("Protected by selected labels: {:?}", matching);
            }
            !matching.is_empty()
        }
        None => {
            tracing::debug!("Protected by custom labels");
            true
        }
    }
}

pub fn is_excluded(domain: &str, policy: &CollectionPolicy) -> bool {
    policy.excluded_domains.contains(domain)
}

/// Truncate to `max_chars` characters, appending "..." when cut
pub fn truncate_for_display(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}
