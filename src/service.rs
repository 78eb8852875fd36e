//! Facade tying an authenticated mailbox to the collector and cleaner

use std::sync::Arc;
use tracing::{debug, warn};

use crate::cleaner::DomainCleaner;
use crate::client::MailboxClient;
use crate::collector::{Collection, DomainCollector, DEFAULT_PAGE_SIZE};
use crate::error::{CleanerError, Result};
use crate::interrupt::Interrupt;
use crate::models::{
    CleanupSelection, CleanupStats, CollectionPolicy, DomainAggregate, LabelInfo, SelectedThread,
};
use crate::progress::{NoopSink, ProgressSink};

/// Keeps the latest collection so domains chosen from it can be cleaned
///
/// Collection and cleanup take `&mut self` and `&self` respectively, so a
/// cleanup can never overlap a scan that rebuilds the index it reads.
pub struct CleanerService {
    client: Option<Arc<dyn MailboxClient>>,
    sink: Arc<dyn ProgressSink>,
    interrupt: Interrupt,
    page_size: u32,
    last: Option<Collection>,
}

impl Default for CleanerService {
    fn default() -> Self {
        Self::new()
    }
}

impl CleanerService {
    /// Service without a mailbox; every remote call fails until one is set
    pub fn new() -> Self {
        Self {
            client: None,
            sink: Arc::new(NoopSink),
            interrupt: Interrupt::new(),
            page_size: DEFAULT_PAGE_SIZE,
            last: None,
        }
    }

    pub fn with_client(mut self, client: Arc<dyn MailboxClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Share a stop flag with a signal handler
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn set_client(&mut self, client: Arc<dyn MailboxClient>) {
        self.client = Some(client);
    }

    pub fn set_sink(&mut self, sink: Arc<dyn ProgressSink>) {
        self.sink = sink;
    }

    pub fn is_authenticated(&self) -> bool {
        self.client.is_some()
    }

    /// Handle for stopping a running scan or cleanup
    pub fn interrupt(&self) -> Interrupt {
        self.interrupt.clone()
    }

    fn client(&self) -> Result<Arc<dyn MailboxClient>> {
        self.client.clone().ok_or(CleanerError::NotAuthenticated)
    }

    /// Scan the inbox, replacing any previous result
    ///
    /// Clears a pending interrupt first. Cleanup does not, so a stop requested
    /// during a scan also prevents the cleanup that would follow it.
    pub async fn collect_domains(&mut self, policy: CollectionPolicy) -> Result<&Collection> {
        let client = self.client()?;
        self.interrupt.reset();

        let collector = DomainCollector::new(client, policy)
            .with_sink(Arc::clone(&self.sink))
            .with_page_size(self.page_size);

        // Drop the stale index before scanning
        self.last = None;
        let collection = collector.collect(&self.interrupt).await;
        Ok(self.last.insert(collection))
    }

    /// Latest collection, if a scan has run
    pub fn collection(&self) -> Option<&Collection> {
        self.last.as_ref()
    }

    /// Aggregates from the latest scan, sorted by count
    pub fn collected_domains(&self) -> Vec<&DomainAggregate> {
        self.last
            .as_ref()
            .map(Collection::sorted_domains)
            .unwrap_or_default()
    }

    /// Resolve domains into cleanup input through the stored index
    pub fn threads_for_domains<I, S>(&self, domains: I) -> Vec<SelectedThread>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let Some(collection) = self.last.as_ref() else {
            return Vec::new();
        };

        let threads = collection.index.threads_for_domains(domains);
        debug!("Retrieved {} threads for selected domains", threads.len());
        threads
    }

    pub async fn cleanup_emails<I, S>(
        &self,
        domains: I,
        selection: CleanupSelection,
    ) -> Result<CleanupStats>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let client = self.client()?;
        let threads = self.threads_for_domains(domains);

        if threads.is_empty() {
            warn!("No threads found for selected domains. Did you run a scan first?");
            return Ok(CleanupStats::default());
        }

        let cleaner = DomainCleaner::new(client, selection).with_sink(Arc::clone(&self.sink));
        Ok(cleaner.cleanup(&threads, &self.interrupt).await)
    }

    /// User labels that can be chosen as protected
    pub async fn labels(&self) -> Result<Vec<LabelInfo>> {
        self.client()?.list_labels().await
    }
}
