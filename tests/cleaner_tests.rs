//! Cleaner behavior: dry run, trash failures, limits and interruption

mod common;

use std::sync::Arc;

use common::{selected, spam_and_junk_inbox, InterruptingSink, MockMailboxClient, RecordingSink};
use gmail_domain_cleaner::cleaner::DomainCleaner;
use gmail_domain_cleaner::collector::DomainCollector;
use gmail_domain_cleaner::error::CleanerError;
use gmail_domain_cleaner::interrupt::Interrupt;
use gmail_domain_cleaner::models::{CleanupSelection, CleanupStats, CollectionPolicy};
use gmail_domain_cleaner::progress::ProgressEvent;
use mockall::Sequence;

fn live() -> CleanupSelection {
    CleanupSelection {
        dry_run: false,
        limit: None,
    }
}

#[tokio::test]
async fn test_dry_run_reports_without_mutating() {
    let mailbox = Arc::new(spam_and_junk_inbox());
    let collection = DomainCollector::new(mailbox.clone(), CollectionPolicy::default())
        .collect(&Interrupt::new())
        .await;
    let threads = collection.index.threads_for_domains(["spam.com"]);

    let sink = Arc::new(RecordingSink::default());
    let stats = DomainCleaner::new(mailbox.clone(), CleanupSelection::default())
        .with_sink(sink.clone())
        .cleanup(&threads, &Interrupt::new())
        .await;

    assert_eq!(
        stats,
        CleanupStats {
            threads_processed: 2,
            threads_deleted: 2,
            messages_deleted: 3,
            messages_kept: 0,
        }
    );
    assert!(mailbox.trashed().is_empty());
    assert_eq!(
        sink.names(),
        vec![
            "cleanup_started",
            "thread_analyzed",
            "would_delete",
            "thread_analyzed",
            "would_delete",
            "cleanup_completed",
        ]
    );
    assert_eq!(
        sink.events().last(),
        Some(&ProgressEvent::CleanupCompleted(stats))
    );
}

#[tokio::test]
async fn test_dry_run_never_calls_trash() {
    let mut mock = MockMailboxClient::new();
    mock.expect_trash_conversation().never();

    let threads = vec![selected("t1", "spam.com", 4)];
    let stats = DomainCleaner::new(Arc::new(mock), CleanupSelection::default())
        .cleanup(&threads, &Interrupt::new())
        .await;

    assert_eq!(stats.threads_deleted, 1);
    assert_eq!(stats.messages_deleted, 4);
}

#[tokio::test]
async fn test_trash_failure_counts_messages_as_kept() {
    let mailbox = Arc::new(spam_and_junk_inbox().failing_trash("j1"));
    let threads = vec![
        selected("s1", "spam.com", 2),
        selected("j1", "junk.com", 3),
        selected("s2", "spam.com", 1),
    ];

    let sink = Arc::new(RecordingSink::default());
    let stats = DomainCleaner::new(mailbox.clone(), live())
        .with_sink(sink.clone())
        .cleanup(&threads, &Interrupt::new())
        .await;

    assert_eq!(stats.threads_processed, 3);
    assert_eq!(stats.threads_deleted, 2);
    assert_eq!(stats.messages_deleted, 3);
    assert_eq!(stats.messages_kept, 3);
    assert_eq!(stats.threads_failed(), 1);
    assert_eq!(mailbox.trashed(), vec!["s1", "s2"]);

    let failure = sink
        .events()
        .into_iter()
        .find_map(|e| match e {
            ProgressEvent::DeleteError { thread_id, error } => Some((thread_id, error)),
            _ => None,
        })
        .unwrap();
    assert_eq!(failure.0, "j1");
    assert!(failure.1.contains("cannot trash j1"));
}

#[tokio::test]
async fn test_live_cleanup_trashes_in_input_order() {
    let mut mock = MockMailboxClient::new();
    let mut seq = Sequence::new();
    for id in ["t1", "t2", "t3"] {
        mock.expect_trash_conversation()
            .withf(move |candidate| candidate.to_string() == id)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
    }

    let threads = vec![
        selected("t1", "a.com", 1),
        selected("t2", "a.com", 2),
        selected("t3", "b.com", 3),
    ];
    let stats = DomainCleaner::new(Arc::new(mock), live())
        .cleanup(&threads, &Interrupt::new())
        .await;

    assert_eq!(stats.threads_deleted, 3);
    assert_eq!(stats.messages_deleted, 6);
    assert_eq!(stats.messages_kept, 0);
}

#[tokio::test]
async fn test_failed_trash_is_not_retried() {
    let mut mock = MockMailboxClient::new();
    mock.expect_trash_conversation()
        .times(1)
        .returning(|_| Err(CleanerError::ServerError {
            status: 503,
            message: "unavailable".to_string(),
        }));

    let threads = vec![selected("t1", "a.com", 2)];
    let stats = DomainCleaner::new(Arc::new(mock), live())
        .cleanup(&threads, &Interrupt::new())
        .await;

    assert_eq!(stats.threads_processed, 1);
    assert_eq!(stats.threads_deleted, 0);
    assert_eq!(stats.messages_kept, 2);
}

#[tokio::test]
async fn test_limit_acts_on_leading_threads() {
    let threads: Vec<_> = (0..5)
        .map(|i| selected(&format!("t{}", i), "a.com", 1))
        .collect();
    let sink = Arc::new(RecordingSink::default());
    let selection = CleanupSelection {
        dry_run: true,
        limit: Some(2),
    };

    let stats = DomainCleaner::new(Arc::new(spam_and_junk_inbox()), selection)
        .with_sink(sink.clone())
        .cleanup(&threads, &Interrupt::new())
        .await;

    assert_eq!(stats.threads_processed, 2);
    assert_eq!(
        sink.events()[0],
        ProgressEvent::CleanupStarted {
            dry_run: true,
            limit: Some(2),
            threads_to_process: 2,
        }
    );
    let analyzed: Vec<String> = sink
        .events()
        .into_iter()
        .filter_map(|e| match e {
            ProgressEvent::ThreadAnalyzed { thread_id, .. } => Some(thread_id),
            _ => None,
        })
        .collect();
    assert_eq!(analyzed, vec!["t0", "t1"]);
}

#[tokio::test]
async fn test_zero_limit_acts_on_every_thread() {
    let threads: Vec<_> = (0..3)
        .map(|i| selected(&format!("t{}", i), "a.com", 1))
        .collect();
    let sink = Arc::new(RecordingSink::default());
    let selection = CleanupSelection {
        dry_run: true,
        limit: Some(0),
    };

    let stats = DomainCleaner::new(Arc::new(spam_and_junk_inbox()), selection)
        .with_sink(sink.clone())
        .cleanup(&threads, &Interrupt::new())
        .await;

    assert_eq!(stats.threads_processed, 3);
    assert_eq!(
        sink.events()[0],
        ProgressEvent::CleanupStarted {
            dry_run: true,
            limit: None,
            threads_to_process: 3,
        }
    );
}

#[tokio::test]
async fn test_empty_input_emits_nothing() {
    let sink = Arc::new(RecordingSink::default());
    let stats = DomainCleaner::new(Arc::new(MockMailboxClient::new()), live())
        .with_sink(sink.clone())
        .cleanup(&[], &Interrupt::new())
        .await;

    assert_eq!(stats, CleanupStats::default());
    assert!(sink.events().is_empty());
}

#[tokio::test]
async fn test_subjects_truncated_to_fifty_chars() {
    let mut thread = selected("t1", "a.com", 1);
    thread.subject = "y".repeat(51);
    let sink = Arc::new(RecordingSink::default());

    DomainCleaner::new(Arc::new(MockMailboxClient::new()), CleanupSelection::default())
        .with_sink(sink.clone())
        .cleanup(&[thread], &Interrupt::new())
        .await;

    let expected = format!("{}...", "y".repeat(50));
    for event in sink.events() {
        match event {
            ProgressEvent::ThreadAnalyzed { subject, .. }
            | ProgressEvent::WouldDelete { subject, .. } => assert_eq!(subject, expected),
            _ => {}
        }
    }
}

#[tokio::test]
async fn test_pre_triggered_interrupt_processes_nothing() {
    let mut mock = MockMailboxClient::new();
    mock.expect_trash_conversation().never();
    let interrupt = Interrupt::new();
    interrupt.trigger();

    let sink = Arc::new(RecordingSink::default());
    let stats = DomainCleaner::new(Arc::new(mock), live())
        .with_sink(sink.clone())
        .cleanup(&[selected("t1", "a.com", 1)], &interrupt)
        .await;

    assert_eq!(stats, CleanupStats::default());
    assert_eq!(sink.names(), vec!["cleanup_started", "cleanup_completed"]);
}

#[tokio::test]
async fn test_interrupt_returns_partial_stats() {
    let mailbox = Arc::new(spam_and_junk_inbox());
    let interrupt = Interrupt::new();
    let sink = Arc::new(InterruptingSink::new(interrupt.clone(), "deleted", 1));
    let threads = vec![
        selected("s1", "spam.com", 2),
        selected("s2", "spam.com", 1),
    ];

    let stats = DomainCleaner::new(mailbox.clone(), live())
        .with_sink(sink)
        .cleanup(&threads, &interrupt)
        .await;

    assert_eq!(stats.threads_processed, 1);
    assert_eq!(stats.messages_deleted, 2);
    assert_eq!(mailbox.trashed(), vec!["s1"]);
}
