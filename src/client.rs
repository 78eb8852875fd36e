//! Gmail thread client with rate limiting, timeouts and retry logic

use async_trait::async_trait;
use google_gmail1::api::{Message, Thread};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::auth::{GmailHub, MODIFY_SCOPE};
use crate::config::ClientConfig;
use crate::error::{CleanerError, Result};
use crate::models::{ConversationPage, LabelInfo, MailboxView, RawConversation, RawMessage};

/// Mailbox operations the collector and cleaner depend on
#[async_trait]
pub trait MailboxClient: Send + Sync {
    /// One page of conversation ids in a view
    async fn list_conversations(
        &self,
        view: MailboxView,
        page_size: u32,
        page_token: Option<String>,
    ) -> Result<ConversationPage>;

    /// Header metadata (From, Subject) and label ids for a conversation
    async fn get_conversation(&self, id: &str) -> Result<RawConversation>;

    /// Move a conversation to the trash
    async fn trash_conversation(&self, id: &str) -> Result<()>;

    /// Approximate number of conversations in a view
    async fn approximate_total(&self, view: MailboxView) -> Result<usize>;

    /// User-created labels, sorted by name
    async fn list_labels(&self) -> Result<Vec<LabelInfo>>;
}

/// Production Gmail client
///
/// - Semaphore-based limit on concurrent requests
/// - Per-request timeout
/// - Exponential backoff retry for transient failures
pub struct ProductionGmailClient {
    hub: GmailHub,
    rate_limiter: Arc<Semaphore>,
    request_timeout: Duration,
    max_retries: u32,
}

impl ProductionGmailClient {
    pub fn new(hub: GmailHub, config: &ClientConfig) -> Self {
        Self {
            hub,
            rate_limiter: Arc::new(Semaphore::new(config.max_concurrent_requests)),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            max_retries: config.max_retries,
        }
    }

    /// Run one API call under a permit and the request timeout
    async fn call<R, T, Fut>(&self, operation_name: &str, call: Fut) -> Result<T>
    where
        Fut: Future<Output = std::result::Result<(R, T), google_gmail1::Error>>,
    {
        let _permit = self.rate_limiter.acquire().await.map_err(|e| {
            CleanerError::NetworkError(format!("Failed to acquire rate limit permit: {}", e))
        })?;

        match tokio::time::timeout(self.request_timeout, call).await {
            Ok(result) => result.map(|(_, body)| body).map_err(CleanerError::from),
            Err(_) => {
                warn!(
                    "Gmail API {} call timed out after {:?}",
                    operation_name, self.request_timeout
                );
                Err(CleanerError::NetworkError(format!(
                    "{} timed out after {:?}",
                    operation_name, self.request_timeout
                )))
            }
        }
    }

    /// Check if an error is retryable
    fn should_retry(error: &CleanerError) -> bool {
        error.is_transient()
    }

    /// Execute an async operation with exponential backoff retry
    async fn with_retry<T, F, Fut>(
        operation_name: &str,
        max_retries: u32,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut delay = Duration::from_secs(1);
        let mut attempts = 0;

        loop {
            attempts += 1;
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if Self::should_retry(&e) && attempts <= max_retries => {
                    let wait = match &e {
                        CleanerError::RateLimitExceeded { retry_after } => {
                            std::cmp::max(delay, Duration::from_secs(*retry_after))
                        }
                        _ => delay,
                    };
                    warn!(
                        "{} failed (attempt {}/{}): {}. Retrying in {:?}...",
                        operation_name,
                        attempts,
                        max_retries + 1,
                        e,
                        wait
                    );
                    tokio::time::sleep(wait).await;
                    delay = std::cmp::min(delay * 2, Duration::from_secs(30));
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Convert a metadata-format Gmail thread into a raw conversation
///
/// The thread resource itself carries no label ids, so conversation-level
/// labels stay empty and the first message's labels carry the protection tags.
fn parse_thread(thread: Thread, requested_id: &str) -> RawConversation {
    let messages = thread
        .messages
        .unwrap_or_default()
        .into_iter()
        .map(parse_message)
        .collect();

    RawConversation {
        id: thread.id.unwrap_or_else(|| requested_id.to_string()),
        label_ids: Vec::new(),
        messages,
    }
}

fn parse_message(message: Message) -> RawMessage {
    let headers = message
        .payload
        .and_then(|payload| payload.headers)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|header| match (header.name, header.value) {
            (Some(name), Some(value)) => Some((name, value)),
            _ => None,
        })
        .collect();

    RawMessage {
        label_ids: message.label_ids.unwrap_or_default(),
        headers,
    }
}

#[async_trait]
impl MailboxClient for ProductionGmailClient {
    async fn list_conversations(
        &self,
        view: MailboxView,
        page_size: u32,
        page_token: Option<String>,
    ) -> Result<ConversationPage> {
        Self::with_retry("list_conversations", self.max_retries, || async {
            let mut request = self
                .hub
                .users()
                .threads_list("me")
                .q(view.query())
                .max_results(page_size);

            if let Some(token) = page_token.as_deref() {
                request = request.page_token(token);
            }

            let response = self
                .call("threads.list", request.add_scope(MODIFY_SCOPE).doit())
                .await?;

            let ids: Vec<String> = response
                .threads
                .unwrap_or_default()
                .into_iter()
                .filter_map(|thread| thread.id)
                .collect();

            debug!(
                "Listed {} threads (more pages: {})",
                ids.len(),
                response.next_page_token.is_some()
            );

            Ok(ConversationPage {
                ids,
                next_page_token: response.next_page_token,
            })
        })
        .await
    }

    async fn get_conversation(&self, id: &str) -> Result<RawConversation> {
        Self::with_retry("get_conversation", self.max_retries, || async {
            let request = self
                .hub
                .users()
                .threads_get("me", id)
                .format("metadata")
                .add_metadata_headers("From")
                .add_metadata_headers("Subject")
                .add_scope(MODIFY_SCOPE);

            let thread = self.call("threads.get", request.doit()).await?;
            Ok(parse_thread(thread, id))
        })
        .await
    }

    async fn trash_conversation(&self, id: &str) -> Result<()> {
        Self::with_retry("trash_conversation", self.max_retries, || async {
            let request = self
                .hub
                .users()
                .threads_trash("me", id)
                .add_scope(MODIFY_SCOPE);

            self.call("threads.trash", request.doit()).await?;
            debug!("Trashed thread {}", id);
            Ok(())
        })
        .await
    }

    async fn approximate_total(&self, view: MailboxView) -> Result<usize> {
        let label = self
            .call(
                "labels.get",
                self.hub
                    .users()
                    .labels_get("me", view.label_id())
                    .add_scope(MODIFY_SCOPE)
                    .doit(),
            )
            .await?;

        Ok(label.threads_total.unwrap_or(0).max(0) as usize)
    }

    async fn list_labels(&self) -> Result<Vec<LabelInfo>> {
        Self::with_retry("list_labels", self.max_retries, || async {
            let response = self
                .call(
                    "labels.list",
                    self.hub
                        .users()
                        .labels_list("me")
                        .add_scope(MODIFY_SCOPE)
                        .doit(),
                )
                .await?;

            let mut labels: Vec<LabelInfo> = response
                .labels
                .unwrap_or_default()
                .into_iter()
                .filter(|label| label.type_.as_deref() == Some("user"))
                .filter_map(|label| match (label.id, label.name) {
                    (Some(id), Some(name)) => Some(LabelInfo { id, name }),
                    _ => None,
                })
                .collect();

            labels.sort_by_key(|label| label.name.to_lowercase());
            debug!("Found {} user labels", labels.len());
            Ok(labels)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use google_gmail1::api::{MessagePart, MessagePartHeader};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn header(name: &str, value: &str) -> MessagePartHeader {
        MessagePartHeader {
            name: Some(name.to_string()),
            value: Some(value.to_string()),
        }
    }

    #[test]
    fn test_should_retry_transient_errors() {
        assert!(ProductionGmailClient::should_retry(&CleanerError::ServerError {
            status: 500,
            message: "Internal error".to_string(),
        }));
        assert!(ProductionGmailClient::should_retry(
            &CleanerError::RateLimitExceeded { retry_after: 5 }
        ));
        assert!(ProductionGmailClient::should_retry(&CleanerError::NetworkError(
            "connection reset".to_string()
        )));
    }

    #[test]
    fn test_should_not_retry_permanent_errors() {
        assert!(!ProductionGmailClient::should_retry(&CleanerError::AuthError(
            "invalid token".to_string()
        )));
        assert!(!ProductionGmailClient::should_retry(&CleanerError::NotFound(
            "thread".to_string()
        )));
    }

    #[test]
    fn test_parse_thread_keeps_headers_and_labels() {
        let thread = Thread {
            id: Some("t1".to_string()),
            messages: Some(vec![Message {
                label_ids: Some(vec!["INBOX".to_string(), "Label_1".to_string()]),
                payload: Some(MessagePart {
                    headers: Some(vec![
                        header("From", "News <news@spam.com>"),
                        header("Subject", "Deals"),
                        MessagePartHeader {
                            name: Some("X-Empty".to_string()),
                            value: None,
                        },
                    ]),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            ..Default::default()
        };

        let conversation = parse_thread(thread, "t1");
        assert_eq!(conversation.id, "t1");
        assert!(conversation.label_ids.is_empty());
        assert_eq!(conversation.messages.len(), 1);

        let message = &conversation.messages[0];
        assert_eq!(message.header("From"), Some("News <news@spam.com>"));
        assert_eq!(message.header("Subject"), Some("Deals"));
        assert_eq!(message.headers.len(), 2);
        assert_eq!(message.label_ids, vec!["INBOX", "Label_1"]);
    }

    #[test]
    fn test_parse_thread_without_messages() {
        let conversation = parse_thread(Thread::default(), "requested");
        assert_eq!(conversation.id, "requested");
        assert!(conversation.messages.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_succeeds_after_transient_error() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let attempt_count_clone = Arc::clone(&attempt_count);

        let result = ProductionGmailClient::with_retry("test_op", 3, || {
            let count = Arc::clone(&attempt_count_clone);
            async move {
                let current = count.fetch_add(1, Ordering::SeqCst);
                if current < 2 {
                    Err(CleanerError::NetworkError("Connection timeout".to_string()))
                } else {
                    Ok("success".to_string())
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_fails_on_permanent_error() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let attempt_count_clone = Arc::clone(&attempt_count);

        let result = ProductionGmailClient::with_retry("test_op", 3, || {
            let count = Arc::clone(&attempt_count_clone);
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Err::<String, _>(CleanerError::NotFound("t1".to_string()))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempt_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_exhausts_all_retries() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let attempt_count_clone = Arc::clone(&attempt_count);

        let result = ProductionGmailClient::with_retry("test_op", 3, || {
            let count = Arc::clone(&attempt_count_clone);
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Err::<String, _>(CleanerError::RateLimitExceeded { retry_after: 1 })
            }
        })
        .await;

        assert!(result.is_err());
        // Initial attempt + 3 retries
        assert_eq!(attempt_count.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_with_retry_zero_retries_attempts_once() {
        let attempt_count = Arc::new(AtomicU32::new(0));
        let attempt_count_clone = Arc::clone(&attempt_count);

        let result = ProductionGmailClient::with_retry("test_op", 0, || {
            let count = Arc::clone(&attempt_count_clone);
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Err::<String, _>(CleanerError::NetworkError("down".to_string()))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempt_count.load(Ordering::SeqCst), 1);
    }
}
