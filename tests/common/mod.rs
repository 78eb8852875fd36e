//! Common test utilities and fixtures
#![allow(dead_code)]

use async_trait::async_trait;
use gmail_domain_cleaner::client::MailboxClient;
use gmail_domain_cleaner::error::{CleanerError, Result};
use gmail_domain_cleaner::interrupt::Interrupt;
use gmail_domain_cleaner::models::{
    ConversationPage, LabelInfo, MailboxView, RawConversation, RawMessage, SelectedThread,
};
use gmail_domain_cleaner::progress::{ProgressEvent, ProgressSink};
use mockall::mock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Conversation whose first message carries `from` and `labels`
pub fn conversation(id: &str, from: &str, messages: usize, labels: &[&str]) -> RawConversation {
    let mut all = Vec::with_capacity(messages);
    for i in 0..messages {
        let mut headers = vec![("From".to_string(), from.to_string())];
        headers.push(("Subject".to_string(), format!("Subject of {}", id)));
        all.push(RawMessage {
            label_ids: if i == 0 {
                labels.iter().map(|s| s.to_string()).collect()
            } else {
                Vec::new()
            },
            headers,
        });
    }

    RawConversation {
        id: id.to_string(),
        label_ids: Vec::new(),
        messages: all,
    }
}

/// Same as [`conversation`] with a custom subject
pub fn conversation_with_subject(id: &str, from: &str, subject: &str) -> RawConversation {
    RawConversation {
        id: id.to_string(),
        label_ids: Vec::new(),
        messages: vec![RawMessage {
            label_ids: Vec::new(),
            headers: vec![
                ("From".to_string(), from.to_string()),
                ("Subject".to_string(), subject.to_string()),
            ],
        }],
    }
}

pub fn selected(id: &str, domain: &str, message_count: usize) -> SelectedThread {
    SelectedThread {
        id: id.to_string(),
        domain: domain.to_string(),
        subject: format!("Subject of {}", id),
        sender: format!("news@{}", domain),
        message_count,
    }
}

/// The three-conversation inbox used by the basic scenarios
pub fn spam_and_junk_inbox() -> FakeMailbox {
    FakeMailbox::new(vec![
        conversation("s1", "Deals <deals@spam.com>", 2, &["INBOX"]),
        conversation("j1", "junk@junk.com", 3, &["INBOX"]),
        conversation("s2", "Offers <offers@SPAM.com>", 1, &["INBOX"]),
    ])
}

/// In-memory paginated mailbox
///
/// Page tokens are the offset of the next page. Trashed ids are recorded in
/// order and removed from the inbox.
pub struct FakeMailbox {
    inbox: Mutex<Vec<RawConversation>>,
    total: Option<usize>,
    failing_gets: HashSet<String>,
    failing_trash: HashSet<String>,
    labels: Vec<LabelInfo>,
    trashed: Mutex<Vec<String>>,
    list_calls: AtomicUsize,
    get_calls: AtomicUsize,
}

impl FakeMailbox {
    pub fn new(conversations: Vec<RawConversation>) -> Self {
        let total = conversations.len();
        Self {
            inbox: Mutex::new(conversations),
            total: Some(total),
            failing_gets: HashSet::new(),
            failing_trash: HashSet::new(),
            labels: Vec::new(),
            trashed: Mutex::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
        }
    }

    /// Report this approximate total, or fail the count request with `None`
    pub fn with_total(mut self, total: Option<usize>) -> Self {
        self.total = total;
        self
    }

    pub fn failing_get(mut self, id: &str) -> Self {
        self.failing_gets.insert(id.to_string());
        self
    }

    pub fn failing_trash(mut self, id: &str) -> Self {
        self.failing_trash.insert(id.to_string());
        self
    }

    pub fn with_labels(mut self, labels: Vec<LabelInfo>) -> Self {
        self.labels = labels;
        self
    }

    pub fn push(&self, conversation: RawConversation) {
        self.inbox.lock().unwrap().push(conversation);
    }

    /// Ids passed to successful trash calls, in call order
    pub fn trashed(&self) -> Vec<String> {
        self.trashed.lock().unwrap().clone()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MailboxClient for FakeMailbox {
    async fn list_conversations(
        &self,
        _view: MailboxView,
        page_size: u32,
        page_token: Option<String>,
    ) -> Result<ConversationPage> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        let offset = match page_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| CleanerError::BadRequest(format!("bad page token {}", token)))?,
            None => 0,
        };

        let inbox = self.inbox.lock().unwrap();
        let end = (offset + page_size as usize).min(inbox.len());
        let ids = inbox
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .map(|c| c.id.clone())
            .collect();

        Ok(ConversationPage {
            ids,
            next_page_token: (end < inbox.len()).then(|| end.to_string()),
        })
    }

    async fn get_conversation(&self, id: &str) -> Result<RawConversation> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);

        if self.failing_gets.contains(id) {
            return Err(CleanerError::ServerError {
                status: 500,
                message: "backend error".to_string(),
            });
        }

        self.inbox
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| CleanerError::NotFound(id.to_string()))
    }

    async fn trash_conversation(&self, id: &str) -> Result<()> {
        if self.failing_trash.contains(id) {
            return Err(CleanerError::Forbidden(format!("cannot trash {}", id)));
        }

        self.inbox.lock().unwrap().retain(|c| c.id != id);
        self.trashed.lock().unwrap().push(id.to_string());
        Ok(())
    }

    async fn approximate_total(&self, _view: MailboxView) -> Result<usize> {
        self.total
            .ok_or_else(|| CleanerError::NetworkError("connection reset".to_string()))
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        Ok(self.labels.clone())
    }
}

/// Sink that records every event
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|e| e.name()).collect()
    }
}

#[async_trait]
impl ProgressSink for RecordingSink {
    async fn emit(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Triggers an interrupt once `after` events named `event` were seen
pub struct InterruptingSink {
    interrupt: Interrupt,
    event: &'static str,
    after: usize,
    seen: AtomicUsize,
}

impl InterruptingSink {
    pub fn new(interrupt: Interrupt, event: &'static str, after: usize) -> Self {
        Self {
            interrupt,
            event,
            after,
            seen: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ProgressSink for InterruptingSink {
    async fn emit(&self, event: ProgressEvent) {
        if event.name() == self.event
            && self.seen.fetch_add(1, Ordering::SeqCst) + 1 >= self.after
        {
            self.interrupt.trigger();
        }
    }
}

// Mock implementation of MailboxClient for testing
mock! {
    pub MailboxClient {}

    #[async_trait::async_trait]
    impl MailboxClient for MailboxClient {
        async fn list_conversations(
            &self,
            view: MailboxView,
            page_size: u32,
            page_token: Option<String>,
        ) -> Result<ConversationPage>;
        async fn get_conversation(&self, id: &str) -> Result<RawConversation>;
        async fn trash_conversation(&self, id: &str) -> Result<()>;
        async fn approximate_total(&self, view: MailboxView) -> Result<usize>;
        async fn list_labels(&self) -> Result<Vec<LabelInfo>>;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fake_mailbox_paginates() {
        let mailbox = spam_and_junk_inbox();

        let first = mailbox
            .list_conversations(MailboxView::Inbox, 2, None)
            .await
            .unwrap();
        assert_eq!(first.ids, vec!["s1", "j1"]);
        assert_eq!(first.next_page_token.as_deref(), Some("2"));

        let second = mailbox
            .list_conversations(MailboxView::Inbox, 2, first.next_page_token)
            .await
            .unwrap();
        assert_eq!(second.ids, vec!["s2"]);
        assert!(second.next_page_token.is_none());
    }

    #[tokio::test]
    async fn test_fake_mailbox_records_trash() {
        let mailbox = spam_and_junk_inbox().failing_trash("j1");

        mailbox.trash_conversation("s1").await.unwrap();
        assert!(mailbox.trash_conversation("j1").await.is_err());

        assert_eq!(mailbox.trashed(), vec!["s1"]);
        assert!(mailbox.get_conversation("s1").await.is_err());
    }
}
