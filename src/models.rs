use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Derived facts about one inbox conversation, built once per scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMetadata {
    pub id: String,
    /// Lowercased part of the sender address after `@`
    pub domain: String,
    /// Full subject; display truncation never touches this value
    pub subject: String,
    /// Lowercased sender address
    pub sender: String,
    pub message_count: usize,
    /// Union of conversation-level and first-message label ids
    pub label_ids: HashSet<String>,
}

impl ConversationMetadata {
    pub fn summary(&self) -> ThreadSummary {
        ThreadSummary {
            id: self.id.clone(),
            subject: self.subject.clone(),
            sender: self.sender.clone(),
            message_count: self.message_count,
        }
    }

    pub fn to_selected(&self) -> SelectedThread {
        SelectedThread {
            id: self.id.clone(),
            domain: self.domain.clone(),
            subject: self.subject.clone(),
            sender: self.sender.clone(),
            message_count: self.message_count,
        }
    }
}

/// Lightweight per-thread entry of a [`DomainAggregate`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadSummary {
    pub id: String,
    pub subject: String,
    pub sender: String,
    pub message_count: usize,
}

/// All included conversations sharing one sender domain
///
/// `count == threads.len()` always holds; use [`DomainAggregate::push`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainAggregate {
    pub domain: String,
    pub count: usize,
    pub threads: Vec<ThreadSummary>,
}

impl DomainAggregate {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            count: 0,
            threads: Vec::new(),
        }
    }

    pub fn push(&mut self, thread: ThreadSummary) {
        self.threads.push(thread);
        self.count += 1;
    }

    /// Total messages across the domain's threads
    pub fn message_count(&self) -> usize {
        self.threads.iter().map(|t| t.message_count).sum()
    }
}

/// A conversation chosen for cleanup, resolved from a [`CollectorIndex`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedThread {
    pub id: String,
    pub domain: String,
    pub subject: String,
    pub sender: String,
    pub message_count: usize,
}

/// In-memory index produced by one collection run
///
/// Every id in `by_domain` is a key of `by_id`, each id appears under exactly
/// one domain, and domain lists keep scan order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectorIndex {
    by_id: HashMap<String, ConversationMetadata>,
    by_domain: HashMap<String, Vec<String>>,
}

impl CollectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.by_id.clear();
        self.by_domain.clear();
    }

    /// Record a conversation. Returns false if the id was already stored.
    pub fn insert(&mut self, metadata: ConversationMetadata) -> bool {
        if self.by_id.contains_key(&metadata.id) {
            return false;
        }

        self.by_domain
            .entry(metadata.domain.clone())
            .or_default()
            .push(metadata.id.clone());
        self.by_id.insert(metadata.id.clone(), metadata);
        true
    }

    pub fn get(&self, id: &str) -> Option<&ConversationMetadata> {
        self.by_id.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Thread ids stored for a domain, in scan order
    pub fn thread_ids(&self, domain: &str) -> &[String] {
        self.by_domain
            .get(domain)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.by_domain.keys().map(String::as_str)
    }

    pub fn by_id(&self) -> &HashMap<String, ConversationMetadata> {
        &self.by_id
    }

    pub fn by_domain(&self) -> &HashMap<String, Vec<String>> {
        &self.by_domain
    }

    /// Resolve selected domains into cleanup input
    ///
    /// Domains are visited in the order given; unknown domains yield nothing.
    pub fn threads_for_domains<I, S>(&self, domains: I) -> Vec<SelectedThread>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut threads = Vec::new();

        for domain in domains {
            let domain = domain.as_ref();
            if !seen.insert(domain.to_string()) {
                continue;
            }
            for id in self.thread_ids(domain) {
                if let Some(metadata) = self.by_id.get(id) {
                    threads.push(metadata.to_selected());
                }
            }
        }

        threads
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn domain_count(&self) -> usize {
        self.by_domain.len()
    }

    /// Verify the two maps agree with each other
    pub fn check_consistency(&self) -> bool {
        let mut listed = HashSet::new();
        for (domain, ids) in &self.by_domain {
            for id in ids {
                match self.by_id.get(id) {
                    Some(metadata) if &metadata.domain == domain => {}
                    _ => return false,
                }
                if !listed.insert(id.as_str()) {
                    return false;
                }
            }
        }
        listed.len() == self.by_id.len()
    }
}

/// Filtering rules for one collection run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionPolicy {
    /// Stop after this many conversations pass the filters; zero means no limit
    pub limit: Option<usize>,
    /// Exact-match domains to leave out of the results
    pub excluded_domains: HashSet<String>,
    /// Let custom user labels protect conversations
    pub use_label_protection: bool,
    /// When set, only these custom labels protect; otherwise any custom label does
    pub protected_label_ids: Option<HashSet<String>>,
}

impl Default for CollectionPolicy {
    fn default() -> Self {
        Self {
            limit: None,
            excluded_domains: HashSet::new(),
            use_label_protection: true,
            protected_label_ids: None,
        }
    }
}

impl CollectionPolicy {
    /// The limit in force, with `Some(0)` read as unlimited
    pub fn effective_limit(&self) -> Option<usize> {
        self.limit.filter(|&limit| limit > 0)
    }
}

/// Options for one cleanup run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupSelection {
    pub dry_run: bool,
    /// Act on at most this many threads; zero means no limit
    pub limit: Option<usize>,
}

impl Default for CleanupSelection {
    fn default() -> Self {
        Self {
            dry_run: true,
            limit: None,
        }
    }
}

impl CleanupSelection {
    pub fn effective_limit(&self) -> Option<usize> {
        self.limit.filter(|&limit| limit > 0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupStats {
    pub threads_processed: usize,
    pub threads_deleted: usize,
    pub messages_deleted: usize,
    pub messages_kept: usize,
}

impl CleanupStats {
    /// Threads whose trash call failed and that stay in the mailbox
    pub fn threads_failed(&self) -> usize {
        self.threads_processed - self.threads_deleted
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionStats {
    /// Conversations fetched from the mailbox
    pub threads_scanned: usize,
    /// Conversations that passed protection and exclusion
    pub threads_included: usize,
    pub threads_protected: usize,
    pub threads_excluded: usize,
    /// Empty conversations and senders without a domain
    pub threads_skipped: usize,
    pub unique_domains: usize,
    pub interrupted: bool,
    /// Remote error that ended the scan early
    pub aborted: Option<String>,
}

/// View filter for listing conversations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MailboxView {
    #[default]
    Inbox,
}

impl MailboxView {
    /// Search query used when listing
    pub fn query(&self) -> &'static str {
        match self {
            MailboxView::Inbox => "in:inbox",
        }
    }

    /// System label whose counters describe this view
    pub fn label_id(&self) -> &'static str {
        match self {
            MailboxView::Inbox => "INBOX",
        }
    }
}

/// One page of conversation ids
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationPage {
    pub ids: Vec<String>,
    pub next_page_token: Option<String>,
}

/// Conversation as returned by the mailbox, before any interpretation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawConversation {
    pub id: String,
    pub label_ids: Vec<String>,
    pub messages: Vec<RawMessage>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawMessage {
    pub label_ids: Vec<String>,
    /// Header name/value pairs in wire order
    pub headers: Vec<(String, String)>,
}

impl RawMessage {
    /// First header with this name; names compare case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// User label info returned from Gmail API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelInfo {
    pub id: String,
    pub name: String,
}
