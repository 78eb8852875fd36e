//! Progress events emitted by the collector and cleaner
//!
//! Events serialize as `{"type": "<event_name>", "data": {...}}`, the shape a
//! websocket or log consumer expects. Consumers should ignore fields they do
//! not know.

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::models::CleanupStats;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ProgressEvent {
    CollectionStarted {
        message: String,
        total_threads: usize,
        limit: Option<usize>,
    },
    ThreadProcessed {
        thread_id: String,
        domain: String,
        /// Display-truncated subject
        subject: String,
        processed_threads: usize,
        total_threads: usize,
        unique_domains: usize,
    },
    Error {
        message: String,
    },
    CollectionCompleted {
        message: String,
        processed_threads: usize,
        total_threads: usize,
        unique_domains: usize,
    },
    CleanupStarted {
        dry_run: bool,
        limit: Option<usize>,
        threads_to_process: usize,
    },
    ThreadAnalyzed {
        thread_id: String,
        subject: String,
        sender: String,
    },
    WouldDelete {
        thread_id: String,
        subject: String,
        sender: String,
        message_count: usize,
    },
    Deleted {
        thread_id: String,
        subject: String,
        sender: String,
        message_count: usize,
    },
    DeleteError {
        thread_id: String,
        error: String,
    },
    CleanupCompleted(CleanupStats),
}

impl ProgressEvent {
    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            ProgressEvent::CollectionStarted { .. } => "collection_started",
            ProgressEvent::ThreadProcessed { .. } => "thread_processed",
            ProgressEvent::Error { .. } => "error",
            ProgressEvent::CollectionCompleted { .. } => "collection_completed",
            ProgressEvent::CleanupStarted { .. } => "cleanup_started",
            ProgressEvent::ThreadAnalyzed { .. } => "thread_analyzed",
            ProgressEvent::WouldDelete { .. } => "would_delete",
            ProgressEvent::Deleted { .. } => "deleted",
            ProgressEvent::DeleteError { .. } => "delete_error",
            ProgressEvent::CleanupCompleted(_) => "cleanup_completed",
        }
    }
}

/// Receiver of progress events
///
/// Sinks must not fail; a sink that cannot deliver drops the event.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn emit(&self, event: ProgressEvent);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

#[async_trait]
impl ProgressSink for NoopSink {
    async fn emit(&self, _event: ProgressEvent) {}
}

/// Writes events to the tracing subscriber
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl ProgressSink for TracingSink {
    async fn emit(&self, event: ProgressEvent) {
        match &event {
            ProgressEvent::CollectionStarted { message, .. }
            | ProgressEvent::CollectionCompleted { message, .. } => {
                tracing::info!("{}", message)
            }
            ProgressEvent::Error { message } => tracing::warn!("{}", message),
            ProgressEvent::DeleteError { thread_id, error } => {
                tracing::warn!("Failed to trash thread {}: {}", thread_id, error)
            }
            ProgressEvent::CleanupStarted {
                dry_run,
                threads_to_process,
                ..
            } => tracing::info!(
                "Cleanup started: {} threads{}",
                threads_to_process,
                if *dry_run { " (dry run)" } else { "" }
            ),
            ProgressEvent::CleanupCompleted(stats) => tracing::info!(
                "Cleanup complete: {} processed, {} deleted, {} messages deleted, {} kept",
                stats.threads_processed,
                stats.threads_deleted,
                stats.messages_deleted,
                stats.messages_kept
            ),
            other => tracing::debug!(event = other.name(), "{:?}", other),
        }
    }
}

/// Forwards events into an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelSink {
    pub fn new(sender: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self { sender }
    }

    /// Create a sink together with the receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl ProgressSink for ChannelSink {
    async fn emit(&self, event: ProgressEvent) {
        // A closed receiver means nobody is listening any more
        let _ = self.sender.send(event);
    }
}

type EmitFn = dyn Fn(ProgressEvent) -> BoxFuture<'static, ()> + Send + Sync;

/// Adapts an async closure into a sink
pub struct FnSink {
    callback: Box<EmitFn>,
}

impl FnSink {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(ProgressEvent) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    {
        Self {
            callback: Box::new(callback),
        }
    }
}

impl std::fmt::Debug for FnSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnSink").finish_non_exhaustive()
    }
}

#[async_trait]
impl ProgressSink for FnSink {
    async fn emit(&self, event: ProgressEvent) {
        (self.callback)(event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_event_wire_shape() {
        let event = ProgressEvent::ThreadProcessed {
            thread_id: "t1".to_string(),
            domain: "spam.com".to_string(),
            subject: "Hello".to_string(),
            processed_threads: 1,
            total_threads: 10,
            unique_domains: 1,
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "thread_processed");
        assert_eq!(json["data"]["domain"], "spam.com");
        assert_eq!(json["data"]["processed_threads"], 1);
        assert_eq!(event.name(), "thread_processed");
    }

    #[test]
    fn test_cleanup_completed_carries_stats() {
        let event = ProgressEvent::CleanupCompleted(CleanupStats {
            threads_processed: 2,
            threads_deleted: 2,
            messages_deleted: 3,
            messages_kept: 0,
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "cleanup_completed");
        assert_eq!(json["data"]["messages_deleted"], 3);
    }

    #[test]
    fn test_names_match_serde_tags() {
        let events = vec![
            ProgressEvent::Error {
                message: "boom".to_string(),
            },
            ProgressEvent::CleanupStarted {
                dry_run: true,
                limit: None,
                threads_to_process: 0,
            },
            ProgressEvent::DeleteError {
                thread_id: "t1".to_string(),
                error: "gone".to_string(),
            },
        ];

        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["type"], event.name());
        }
    }

    #[tokio::test]
    async fn test_channel_sink_forwards_events() {
        let (sink, mut receiver) = ChannelSink::channel();
        sink.emit(ProgressEvent::Error {
            message: "boom".to_string(),
        })
        .await;

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.name(), "error");
    }

    #[tokio::test]
    async fn test_channel_sink_survives_closed_receiver() {
        let (sink, receiver) = ChannelSink::channel();
        drop(receiver);
        sink.emit(ProgressEvent::Error {
            message: "nobody listening".to_string(),
        })
        .await;
    }

    #[tokio::test]
    async fn test_fn_sink_invokes_callback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let sink = FnSink::new(move |event| {
            let seen = Arc::clone(&seen_clone);
            async move {
                seen.lock().unwrap().push(event.name());
            }
            .boxed()
        });

        sink.emit(ProgressEvent::Error {
            message: "x".to_string(),
        })
        .await;

        assert_eq!(*seen.lock().unwrap(), vec!["error"]);
    }
}
