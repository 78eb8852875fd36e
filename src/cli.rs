//! Command-line interface

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use inquire::InquireError;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use crate::auth;
use crate::client::ProductionGmailClient;
use crate::config::Config;
use crate::error::{CleanerError, Result};
use crate::interrupt::Interrupt;
use crate::models::{CleanupStats, CollectionStats, DomainAggregate, LabelInfo};
use crate::policy::truncate_for_display;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::service::CleanerService;

#[derive(Parser, Debug)]
#[command(name = "gmail-domain-cleaner")]
#[command(version)]
#[command(about = "Group inbox conversations by sender domain and trash unwanted ones", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Path to OAuth2 credentials file
    #[arg(long, default_value = "credentials.json")]
    pub credentials: PathBuf,

    /// Path to token cache file
    #[arg(long, default_value = ".gmail-domain-cleaner/token.json")]
    pub token_cache: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Authenticate with Gmail API
    Auth {
        /// Force re-authentication even if token exists
        #[arg(long)]
        force: bool,
    },

    /// Scan the inbox and list sender domains
    Scan {
        #[command(flatten)]
        scan: ScanArgs,

        /// Print the result as JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Scan the inbox, then trash every conversation from the chosen domains
    Clean {
        /// Domains to clean; prompts for a selection when omitted
        domains: Vec<String>,

        /// Actually move conversations to the trash (default is a dry run)
        #[arg(long)]
        execute: bool,

        /// Act on at most this many conversations
        #[arg(long)]
        limit: Option<usize>,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// List user labels that can protect conversations
    Labels,

    /// Generate example configuration file
    InitConfig {
        /// Path to create config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

/// Collection overrides layered over the `[collection]` config section
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ScanArgs {
    /// Stop after this many conversations pass the filters
    #[arg(long)]
    pub limit: Option<usize>,

    /// Leave this domain out of the results (repeatable)
    #[arg(long = "exclude", value_name = "DOMAIN")]
    pub exclude: Vec<String>,

    /// Do not let custom labels protect conversations
    #[arg(long)]
    pub no_label_protection: bool,

    /// Only these labels protect; accepts label ids or names (repeatable)
    #[arg(long = "protect-label", value_name = "LABEL")]
    pub protect_label: Vec<String>,
}

impl ScanArgs {
    /// Apply the overrides, resolving label names through `labels`
    pub fn apply(&self, config: &mut Config, labels: &[LabelInfo]) {
        if self.limit.is_some() {
            config.collection.limit = self.limit;
        }
        config
            .collection
            .excluded_domains
            .extend(self.exclude.iter().cloned());
        if self.no_label_protection {
            config.collection.use_label_protection = false;
        }
        if !self.protect_label.is_empty() {
            config.collection.protected_label_ids =
                Some(resolve_label_ids(&self.protect_label, labels));
        }
    }
}

/// Map label names or ids to ids; unknown values pass through unchanged
pub fn resolve_label_ids(requested: &[String], labels: &[LabelInfo]) -> Vec<String> {
    requested
        .iter()
        .map(|wanted| {
            labels
                .iter()
                .find(|label| label.id == *wanted || label.name.eq_ignore_ascii_case(wanted))
                .map(|label| label.id.clone())
                .unwrap_or_else(|| {
                    tracing::warn!("Unknown label '{}', using it as a label id", wanted);
                    wanted.clone()
                })
        })
        .collect()
}

/// Progress reporter using indicatif
///
/// Implements [`ProgressSink`] so collector and cleaner events drive a bar.
pub struct ProgressReporter {
    multi: MultiProgress,
    spinner_style: ProgressStyle,
    bar_style: ProgressStyle,
    current: Mutex<Option<ProgressBar>>,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::with_multi_progress(MultiProgress::new())
    }

    /// Share a MultiProgress with the log writer so log lines print above bars
    pub fn with_multi_progress(multi: MultiProgress) -> Self {
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed:>6}] {msg}")
            .unwrap()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

        let bar_style = ProgressStyle::default_bar()
            .template("[{elapsed:>6}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
            .unwrap()
            .progress_chars("##-");

        Self {
            multi,
            spinner_style,
            bar_style,
            current: Mutex::new(None),
        }
    }

    pub fn multi_progress(&self) -> &MultiProgress {
        &self.multi
    }

    pub fn add_spinner(&self, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(self.spinner_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    pub fn add_progress_bar(&self, len: u64, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new(len));
        pb.set_style(self.bar_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Finish a spinner and clear it from the multi-progress display
    pub fn finish_spinner(&self, pb: &ProgressBar, msg: &str) {
        pb.finish_and_clear();
        let _ = self.multi.println(format!("  ✓ {}", msg));
    }

    fn println(&self, msg: String) {
        let _ = self.multi.println(msg);
    }

    fn start(&self, bar: ProgressBar) {
        if let Ok(mut current) = self.current.lock() {
            if let Some(previous) = current.replace(bar) {
                previous.finish_and_clear();
            }
        }
    }

    fn with_current(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(current) = self.current.lock() {
            if let Some(bar) = current.as_ref() {
                f(bar);
            }
        }
    }

    fn finish(&self) {
        if let Ok(mut current) = self.current.lock() {
            if let Some(bar) = current.take() {
                bar.finish_and_clear();
            }
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProgressSink for ProgressReporter {
    async fn emit(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::CollectionStarted {
                message,
                total_threads,
                ..
            } => {
                // The inbox total is approximate, so an unknown total gets a spinner
                let bar = if total_threads > 0 {
                    self.add_progress_bar(total_threads as u64, &message)
                } else {
                    self.add_spinner(&message)
                };
                self.start(bar);
            }
            ProgressEvent::ThreadProcessed {
                domain,
                processed_threads,
                total_threads,
                unique_domains,
                ..
            } => self.with_current(|bar| {
                if processed_threads as u64 > bar.length().unwrap_or(0) {
                    bar.set_length(processed_threads.max(total_threads) as u64);
                }
                bar.set_position(processed_threads as u64);
                bar.set_message(format!("{} ({} domains)", domain, unique_domains));
            }),
            ProgressEvent::Error { message } => self.println(format!("  ✗ {}", message)),
            ProgressEvent::CollectionCompleted { message, .. } => {
                self.finish();
                self.println(format!("  ✓ {}", message));
            }
            ProgressEvent::CleanupStarted {
                dry_run,
                threads_to_process,
                ..
            } => {
                let msg = if dry_run {
                    "Analyzing threads (dry run)..."
                } else {
                    "Moving threads to trash..."
                };
                self.start(self.add_progress_bar(threads_to_process as u64, msg));
            }
            ProgressEvent::ThreadAnalyzed { subject, .. } => {
                self.with_current(|bar| bar.set_message(subject))
            }
            ProgressEvent::WouldDelete {
                subject,
                sender,
                message_count,
                ..
            } => {
                self.with_current(|bar| bar.inc(1));
                self.println(format!(
                    "  would trash: {} - {} ({} messages)",
                    sender, subject, message_count
                ));
            }
            ProgressEvent::Deleted { .. } => self.with_current(|bar| bar.inc(1)),
            ProgressEvent::DeleteError { thread_id, error } => {
                self.with_current(|bar| bar.inc(1));
                self.println(format!("  ✗ {}: {}", thread_id, error));
            }
            ProgressEvent::CleanupCompleted(_) => self.finish(),
        }
    }
}

/// Summary of one scan, optionally followed by a cleanup
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub collection: CollectionStats,
    pub domains: Vec<DomainAggregate>,
    pub dry_run: Option<bool>,
    pub cleanup: Option<CleanupStats>,
}

impl Report {
    pub fn new(
        started_at: DateTime<Utc>,
        collection: CollectionStats,
        domains: Vec<DomainAggregate>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at,
            completed_at: Utc::now(),
            collection,
            domains,
            dry_run: None,
            cleanup: None,
        }
    }

    pub fn with_cleanup(mut self, dry_run: bool, stats: CleanupStats) -> Self {
        self.dry_run = Some(dry_run);
        self.cleanup = Some(stats);
        self.completed_at = Utc::now();
        self
    }

    pub fn duration_seconds(&self) -> i64 {
        (self.completed_at - self.started_at).num_seconds()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Plain-text domain table, largest domains first
    pub fn domain_table(&self, max_rows: usize) -> String {
        let mut out = String::new();
        out.push_str(&format!("{:<40} {:>8} {:>9}\n", "DOMAIN", "THREADS", "MESSAGES"));
        for aggregate in self.domains.iter().take(max_rows) {
            out.push_str(&format!(
                "{:<40} {:>8} {:>9}\n",
                truncate_for_display(&aggregate.domain, 37),
                aggregate.count,
                aggregate.message_count()
            ));
        }
        if self.domains.len() > max_rows {
            out.push_str(&format!("... and {} more domains\n", self.domains.len() - max_rows));
        }
        out
    }

    pub fn print_summary(&self) {
        println!("\n========================================");
        println!("Run Summary");
        println!("========================================");
        println!("Run ID: {}", self.run_id);
        println!("Duration: {} seconds", self.duration_seconds());
        println!("Threads scanned: {}", self.collection.threads_scanned);
        println!("Threads collected: {}", self.collection.threads_included);
        println!("Protected: {}", self.collection.threads_protected);
        println!("Excluded: {}", self.collection.threads_excluded);
        println!("Unique domains: {}", self.collection.unique_domains);
        if self.collection.interrupted {
            println!("Scan was interrupted; results are partial");
        }
        if let Some(reason) = &self.collection.aborted {
            println!("Scan stopped early: {}", reason);
        }
        if let (Some(dry_run), Some(stats)) = (self.dry_run, self.cleanup) {
            let verb = if dry_run { "Would trash" } else { "Trashed" };
            println!("Threads processed: {}", stats.threads_processed);
            println!("{} threads: {}", verb, stats.threads_deleted);
            println!("{} messages: {}", verb, stats.messages_deleted);
            println!("Messages kept: {}", stats.messages_kept);
            if dry_run {
                println!("\nDry run only. Re-run with --execute to move these threads to trash.");
            }
        }
        println!("========================================");
    }
}

fn prompt_error(e: InquireError) -> CleanerError {
    match e {
        InquireError::IO(err) => CleanerError::IoError(err),
        InquireError::OperationCanceled | InquireError::OperationInterrupted => {
            CleanerError::Cancelled("prompt dismissed".to_string())
        }
        other => CleanerError::Cancelled(other.to_string()),
    }
}

/// Authenticate and build a service reporting through `reporter`
async fn connect(
    cli: &Cli,
    config: &Config,
    reporter: Arc<ProgressReporter>,
    interrupt: Interrupt,
) -> Result<CleanerService> {
    let auth_spinner = reporter.add_spinner("Authenticating with Gmail API...");
    let hub = auth::initialize_gmail_hub(&cli.credentials, &cli.token_cache, false).await?;
    reporter.finish_spinner(&auth_spinner, "Gmail API authenticated successfully");

    let client = Arc::new(ProductionGmailClient::new(hub, &config.client));
    Ok(CleanerService::new()
        .with_client(client)
        .with_sink(reporter)
        .with_interrupt(interrupt)
        .with_page_size(config.client.page_size))
}

/// Scan the inbox and print the domain breakdown
pub async fn run_scan(
    cli: &Cli,
    scan: &ScanArgs,
    json: bool,
    multi: MultiProgress,
    interrupt: Interrupt,
) -> Result<Report> {
    let started_at = Utc::now();
    let mut config = Config::load(&cli.config).await?;
    let reporter = Arc::new(ProgressReporter::with_multi_progress(multi));
    let mut service = connect(cli, &config, Arc::clone(&reporter), interrupt).await?;

    let labels = if scan.protect_label.is_empty() {
        Vec::new()
    } else {
        service.labels().await?
    };
    scan.apply(&mut config, &labels);
    config.validate()?;

    let collection = service.collect_domains(config.collection_policy()).await?;
    let report = Report::new(
        started_at,
        collection.stats.clone(),
        collection.sorted_domains().into_iter().cloned().collect(),
    );

    if json {
        println!("{}", report.to_json()?);
    } else {
        println!("\n{}", report.domain_table(50));
    }

    Ok(report)
}

/// Scan, choose domains, then trash (or preview trashing) their conversations
pub async fn run_clean(
    cli: &Cli,
    domains: &[String],
    execute: bool,
    limit: Option<usize>,
    yes: bool,
    multi: MultiProgress,
    interrupt: Interrupt,
) -> Result<Report> {
    let started_at = Utc::now();
    let mut config = Config::load(&cli.config).await?;
    if execute {
        config.cleanup.dry_run = false;
    }
    if limit.is_some() {
        config.cleanup.limit = limit;
    }
    config.validate()?;

    let reporter = Arc::new(ProgressReporter::with_multi_progress(multi));
    let mut service = connect(cli, &config, Arc::clone(&reporter), interrupt.clone()).await?;

    let collection = service.collect_domains(config.collection_policy()).await?;
    let report = Report::new(
        started_at,
        collection.stats.clone(),
        collection.sorted_domains().into_iter().cloned().collect(),
    );

    if interrupt.is_triggered() {
        return Err(CleanerError::Cancelled(
            "scan interrupted, nothing was cleaned".to_string(),
        ));
    }
    if report.domains.is_empty() {
        println!("No domains found in the inbox.");
        return Ok(report);
    }

    let selected = if domains.is_empty() {
        choose_domains(&report.domains)?
    } else {
        domains.iter().map(|d| d.trim().to_lowercase()).collect()
    };

    for domain in &selected {
        if !report.domains.iter().any(|d| &d.domain == domain) {
            tracing::warn!("Domain {} was not found in the scan", domain);
        }
    }

    let selection = config.cleanup_selection();
    let mut threads = service.threads_for_domains(&selected).len();
    if let Some(limit) = selection.effective_limit() {
        threads = threads.min(limit);
    }
    if threads == 0 {
        println!("Nothing to clean for the selected domains.");
        return Ok(report);
    }

    if !selection.dry_run && !yes {
        let confirmed = inquire::Confirm::new(&format!(
            "Move {} conversations from {} domains to trash?",
            threads,
            selected.len()
        ))
        .with_default(false)
        .prompt()
        .map_err(prompt_error)?;

        if !confirmed {
            return Err(CleanerError::Cancelled("cleanup not confirmed".to_string()));
        }
    }

    let stats = service.cleanup_emails(&selected, selection).await?;
    Ok(report.with_cleanup(selection.dry_run, stats))
}

fn choose_domains(domains: &[DomainAggregate]) -> Result<Vec<String>> {
    let options: Vec<String> = domains
        .iter()
        .map(|d| format!("{} ({} threads, {} messages)", d.domain, d.count, d.message_count()))
        .collect();

    let chosen = inquire::MultiSelect::new("Select domains to clean:", options.clone())
        .with_page_size(15)
        .prompt()
        .map_err(prompt_error)?;

    Ok(chosen
        .iter()
        .filter_map(|choice| options.iter().position(|o| o == choice))
        .map(|idx| domains[idx].domain.clone())
        .collect())
}

/// Print user labels with their ids
pub async fn run_labels(cli: &Cli, multi: MultiProgress) -> Result<Vec<LabelInfo>> {
    let config = Config::load(&cli.config).await?;
    let reporter = Arc::new(ProgressReporter::with_multi_progress(multi));
    let service = connect(cli, &config, reporter, Interrupt::new()).await?;

    let labels = service.labels().await?;
    if labels.is_empty() {
        println!("No user labels found.");
    } else {
        println!("{:<30} {}", "ID", "NAME");
        for label in &labels {
            println!("{:<30} {}", label.id, label.name);
        }
    }
    Ok(labels)
}
