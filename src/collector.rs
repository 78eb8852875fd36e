//! Inbox scan that groups conversations by sender domain

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::client::MailboxClient;
use crate::error::Result;
use crate::interrupt::Interrupt;
use crate::models::{
    CollectionPolicy, CollectionStats, CollectorIndex, ConversationMetadata, DomainAggregate,
    MailboxView, RawConversation,
};
use crate::policy::{
    extract_domain, extract_email_address, is_excluded, is_protected, truncate_for_display,
    COLLECT_SUBJECT_WIDTH, NO_SUBJECT, UNKNOWN_SENDER,
};
use crate::progress::{NoopSink, ProgressEvent, ProgressSink};

/// Threads listed per page unless configured otherwise
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Included threads between cooperative yields
const YIELD_EVERY: usize = 10;

/// Result of one collection run
#[derive(Debug, Clone, Default)]
pub struct Collection {
    pub domains: HashMap<String, DomainAggregate>,
    pub index: CollectorIndex,
    pub stats: CollectionStats,
}

impl Collection {
    /// Aggregates ordered by count descending, ties broken by domain name
    pub fn sorted_domains(&self) -> Vec<&DomainAggregate> {
        let mut domains: Vec<&DomainAggregate> = self.domains.values().collect();
        domains.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.domain.cmp(&b.domain)));
        domains
    }

    pub fn total_threads(&self) -> usize {
        self.index.len()
    }
}

/// Outcome of interpreting one fetched conversation
enum Decision {
    Include(ConversationMetadata),
    Skipped,
    Protected,
    Excluded,
}

pub struct DomainCollector {
    client: Arc<dyn MailboxClient>,
    policy: CollectionPolicy,
    sink: Arc<dyn ProgressSink>,
    view: MailboxView,
    page_size: u32,
}

impl DomainCollector {
    pub fn new(client: Arc<dyn MailboxClient>, policy: CollectionPolicy) -> Self {
        Self {
            client,
            policy,
            sink: Arc::new(NoopSink),
            view: MailboxView::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn policy(&self) -> &CollectionPolicy {
        &self.policy
    }

    /// Scan the inbox and build a fresh domain index
    ///
    /// Remote failures end the scan with an `error` event; whatever was
    /// collected before the failure is still returned.
    pub async fn collect(&self, interrupt: &Interrupt) -> Collection {
        let limit = self.policy.effective_limit();

        let total = match self.client.approximate_total(self.view).await {
            Ok(total) => total,
            Err(e) => {
                warn!("Could not get inbox thread count: {}", e);
                0
            }
        };
        let effective_total = match limit {
            Some(limit) => limit.min(total),
            None => total,
        };

        let message = match limit {
            Some(limit) => format!("Starting domain collection (limit: {} threads)...", limit),
            None => "Starting domain collection...".to_string(),
        };
        info!("{}", message);
        self.sink
            .emit(ProgressEvent::CollectionStarted {
                message,
                total_threads: effective_total,
                limit,
            })
            .await;

        let mut collection = Collection::default();

        if let Err(e) = self
            .scan_pages(interrupt, effective_total, &mut collection)
            .await
        {
            let message = format!("Error fetching threads: {}", e);
            warn!("{}", message);
            collection.stats.aborted = Some(e.to_string());
            self.sink.emit(ProgressEvent::Error { message }).await;
        }

        collection.stats.unique_domains = collection.domains.len();
        let processed = collection.stats.threads_included;
        let unique_domains = collection.stats.unique_domains;

        let limit_msg = limit
            .map(|limit| format!(" (limited to {})", limit))
            .unwrap_or_default();
        let message = format!(
            "Collection complete{}: {} threads processed, {} unique domains",
            limit_msg, processed, unique_domains
        );
        info!("{}", message);
        debug!(
            "Stored {} threads across {} domains in memory",
            collection.index.len(),
            collection.index.domain_count()
        );

        self.sink
            .emit(ProgressEvent::CollectionCompleted {
                message,
                processed_threads: processed,
                total_threads: effective_total,
                unique_domains,
            })
            .await;

        collection
    }

    async fn scan_pages(
        &self,
        interrupt: &Interrupt,
        effective_total: usize,
        collection: &mut Collection,
    ) -> Result<()> {
        let mut page_token: Option<String> = None;

        loop {
            if interrupt.is_triggered() {
                info!("Collection interrupted before next page");
                collection.stats.interrupted = true;
                return Ok(());
            }

            let page = self
                .client
                .list_conversations(self.view, self.page_size, page_token.take())
                .await?;

            if page.ids.is_empty() {
                return Ok(());
            }

            for id in &page.ids {
                if interrupt.is_triggered() {
                    info!("Collection interrupted");
                    collection.stats.interrupted = true;
                    return Ok(());
                }

                let conversation = self.client.get_conversation(id).await?;
                collection.stats.threads_scanned += 1;

                let metadata = match self.decide(conversation) {
                    Decision::Include(metadata) => metadata,
                    Decision::Skipped => {
                        collection.stats.threads_skipped += 1;
                        continue;
                    }
                    Decision::Protected => {
                        collection.stats.threads_protected += 1;
                        continue;
                    }
                    Decision::Excluded => {
                        collection.stats.threads_excluded += 1;
                        continue;
                    }
                };

                if !collection.index.insert(metadata.clone()) {
                    debug!("Thread {} already collected, ignoring repeat", metadata.id);
                    continue;
                }

                collection
                    .domains
                    .entry(metadata.domain.clone())
                    .or_insert_with(|| DomainAggregate::new(metadata.domain.clone()))
                    .push(metadata.summary());
                collection.stats.threads_included += 1;
                let processed = collection.stats.threads_included;

                self.sink
                    .emit(ProgressEvent::ThreadProcessed {
                        thread_id: metadata.id.clone(),
                        domain: metadata.domain.clone(),
                        subject: truncate_for_display(&metadata.subject, COLLECT_SUBJECT_WIDTH),
                        processed_threads: processed,
                        total_threads: effective_total,
                        unique_domains: collection.domains.len(),
                    })
                    .await;

                if self.limit_reached(processed) {
                    info!(
                        "Reached limit of {} threads, stopping collection",
                        processed
                    );
                    return Ok(());
                }

                if processed % YIELD_EVERY == 0 {
                    tokio::task::yield_now().await;
                }
            }

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => return Ok(()),
            }
        }
    }

    fn limit_reached(&self, processed: usize) -> bool {
        matches!(self.policy.effective_limit(), Some(limit) if processed >= limit)
    }

    fn decide(&self, conversation: RawConversation) -> Decision {
        let Some(metadata) = interpret(conversation) else {
            return Decision::Skipped;
        };

        if is_protected(&metadata.label_ids, &self.policy) {
            debug!(
                "Skipping protected thread {} with labels {:?}",
                metadata.id, metadata.label_ids
            );
            return Decision::Protected;
        }

        if is_excluded(&metadata.domain, &self.policy) {
            debug!("Skipping excluded domain {}", metadata.domain);
            return Decision::Excluded;
        }

        Decision::Include(metadata)
    }
}

/// Derive metadata from a fetched conversation
///
/// Returns `None` for empty conversations and senders without a domain.
pub fn interpret(conversation: RawConversation) -> Option<ConversationMetadata> {
    let RawConversation {
        id,
        label_ids,
        messages,
    } = conversation;

    let message_count = messages.len();
    let first = messages.into_iter().next()?;

    let raw_from = first.header("From").unwrap_or(UNKNOWN_SENDER);
    let subject = first.header("Subject").unwrap_or(NO_SUBJECT).to_string();

    let sender = extract_email_address(raw_from);
    let domain = extract_domain(&sender);
    if domain.is_empty() {
        debug!("Skipping thread {} without sender domain", id);
        return None;
    }

    let label_ids: HashSet<String> = label_ids.into_iter().chain(first.label_ids).collect();

    Some(ConversationMetadata {
        id,
        domain,
        subject,
        sender,
        message_count,
        label_ids,
    })
}
