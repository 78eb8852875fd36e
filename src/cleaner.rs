//! Moves selected conversations to the trash, or reports what would be moved

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::client::MailboxClient;
use crate::interrupt::Interrupt;
use crate::models::{CleanupSelection, CleanupStats, SelectedThread};
use crate::policy::{truncate_for_display, CLEANUP_SUBJECT_WIDTH};
use crate::progress::{NoopSink, ProgressEvent, ProgressSink};

pub struct DomainCleaner {
    client: Arc<dyn MailboxClient>,
    selection: CleanupSelection,
    sink: Arc<dyn ProgressSink>,
}

impl DomainCleaner {
    pub fn new(client: Arc<dyn MailboxClient>, selection: CleanupSelection) -> Self {
        Self {
            client,
            selection,
            sink: Arc::new(NoopSink),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn selection(&self) -> CleanupSelection {
        self.selection
    }

    /// Process threads in order
    ///
    /// A failed trash call is final for that thread in this run and its
    /// messages count as kept. Stopping early returns the partial stats.
    pub async fn cleanup(&self, threads: &[SelectedThread], interrupt: &Interrupt) -> CleanupStats {
        let mut stats = CleanupStats::default();

        if threads.is_empty() {
            warn!("No threads provided for cleanup");
            return stats;
        }

        let limit = self.selection.effective_limit();
        let threads = match limit {
            Some(limit) if limit < threads.len() => &threads[..limit],
            _ => threads,
        };

        info!(
            "Cleaning up {} threads{}",
            threads.len(),
            if self.selection.dry_run { " (dry run)" } else { "" }
        );
        self.sink
            .emit(ProgressEvent::CleanupStarted {
                dry_run: self.selection.dry_run,
                limit,
                threads_to_process: threads.len(),
            })
            .await;

        for thread in threads {
            if interrupt.is_triggered() {
                info!(
                    "Cleanup interrupted after {} of {} threads",
                    stats.threads_processed,
                    threads.len()
                );
                break;
            }

            let subject = truncate_for_display(&thread.subject, CLEANUP_SUBJECT_WIDTH);

            self.sink
                .emit(ProgressEvent::ThreadAnalyzed {
                    thread_id: thread.id.clone(),
                    subject: subject.clone(),
                    sender: thread.sender.clone(),
                })
                .await;

            if self.selection.dry_run {
                self.sink
                    .emit(ProgressEvent::WouldDelete {
                        thread_id: thread.id.clone(),
                        subject,
                        sender: thread.sender.clone(),
                        message_count: thread.message_count,
                    })
                    .await;
                stats.threads_deleted += 1;
                stats.messages_deleted += thread.message_count;
            } else {
                match self.client.trash_conversation(&thread.id).await {
                    Ok(()) => {
                        self.sink
                            .emit(ProgressEvent::Deleted {
                                thread_id: thread.id.clone(),
                                subject,
                                sender: thread.sender.clone(),
                                message_count: thread.message_count,
                            })
                            .await;
                        stats.threads_deleted += 1;
                        stats.messages_deleted += thread.message_count;
                    }
                    Err(e) => {
                        error!("Error trashing thread {}: {}", thread.id, e);
                        self.sink
                            .emit(ProgressEvent::DeleteError {
                                thread_id: thread.id.clone(),
                                error: e.to_string(),
                            })
                            .await;
                        stats.messages_kept += thread.message_count;
                    }
                }
            }

            stats.threads_processed += 1;
        }

        info!(
            "Cleanup finished: {} processed, {} deleted, {} messages deleted, {} kept",
            stats.threads_processed,
            stats.threads_deleted,
            stats.messages_deleted,
            stats.messages_kept
        );
        self.sink.emit(ProgressEvent::CleanupCompleted(stats)).await;

        stats
    }
}
