//! Gmail Domain Cleaner
//!
//! Scans the inbox, groups conversations by sender domain and moves every
//! conversation from the domains you pick to the trash.
//!
//! # Overview
//!
//! - **Collection**: page through the inbox, skip protected conversations
//!   (IMPORTANT, STARRED or custom labels) and excluded domains, and build a
//!   per-domain index
//! - **Cleanup**: trash the indexed conversations of selected domains, or
//!   report what would be trashed in a dry run
//! - **Progress**: every step emits a typed [`ProgressEvent`] to a
//!   [`ProgressSink`]
//! - **Interruption**: a shared [`Interrupt`] stops a scan or cleanup between
//!   conversations
//!
//! # Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use gmail_domain_cleaner::{auth, config::Config, CleanerService, ProductionGmailClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml".as_ref()).await?;
//!
//!     let hub = auth::initialize_gmail_hub(
//!         "credentials.json".as_ref(),
//!         ".gmail-domain-cleaner/token.json".as_ref(),
//!         false,
//!     )
//!     .await?;
//!     let client = Arc::new(ProductionGmailClient::new(hub, &config.client));
//!
//!     let mut service = CleanerService::new().with_client(client);
//!     service.collect_domains(config.collection_policy()).await?;
//!
//!     let stats = service
//!         .cleanup_emails(["newsletters.example"], config.cleanup_selection())
//!         .await?;
//!     println!("{} threads would be trashed", stats.threads_deleted);
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`auth`] - OAuth2 authentication and Gmail API initialization
//! - [`client`] - Mailbox trait and the rate-limited Gmail implementation
//! - [`collector`] - Inbox scan grouped by sender domain
//! - [`cleaner`] - Trashing selected conversations
//! - [`service`] - Facade keeping the latest scan between the two phases
//! - [`policy`] - Protection and exclusion rules, header parsing
//! - [`progress`] - Progress events and sinks
//! - [`interrupt`] - Cooperative stop flag
//! - [`cli`] - Command-line interface
//! - [`config`] - Configuration management
//! - [`error`] - Error types and result aliases
//! - [`models`] - Core data structures

pub mod auth;
pub mod cleaner;
pub mod cli;
pub mod client;
pub mod collector;
pub mod config;
pub mod error;
pub mod interrupt;
pub mod models;
pub mod policy;
pub mod progress;
pub mod service;

pub use error::{CleanerError, Result};

pub use models::{
    CleanupSelection, CleanupStats, CollectionPolicy, CollectionStats, CollectorIndex,
    ConversationMetadata, DomainAggregate, LabelInfo, MailboxView, SelectedThread, ThreadSummary,
};

pub use client::{MailboxClient, ProductionGmailClient};
pub use cleaner::DomainCleaner;
pub use collector::{Collection, DomainCollector};
pub use config::Config;
pub use interrupt::Interrupt;
pub use progress::{ChannelSink, ProgressEvent, ProgressSink};
pub use service::CleanerService;

pub use cli::{Cli, Commands, ProgressReporter, Report};
