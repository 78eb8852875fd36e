use anyhow::Result;
use clap::Parser;
use gmail_domain_cleaner::auth::{self, MODIFY_SCOPE};
use gmail_domain_cleaner::cli::{self, Cli, Commands};
use gmail_domain_cleaner::config::Config;
use gmail_domain_cleaner::error::CleanerError;
use gmail_domain_cleaner::interrupt::Interrupt;
use indicatif::MultiProgress;
use std::io::Write;
use std::process;
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Exit status after a second Ctrl-C
const SIGINT_EXIT_CODE: i32 = 130;

/// A writer that prints through MultiProgress to avoid progress bar conflicts
#[derive(Clone)]
struct MultiProgressWriter {
    multi: Arc<MultiProgress>,
    buffer: Arc<std::sync::Mutex<Vec<u8>>>,
}

impl MultiProgressWriter {
    fn new(multi: Arc<MultiProgress>) -> Self {
        Self {
            multi,
            buffer: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }
}

impl Write for MultiProgressWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut buffer = self.buffer.lock().unwrap();
        buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut buffer = self.buffer.lock().unwrap();
        if !buffer.is_empty() {
            let msg = String::from_utf8_lossy(&buffer);
            let msg = msg.trim_end_matches('\n');
            if !msg.is_empty() {
                let _ = self.multi.println(msg);
            }
            buffer.clear();
        }
        Ok(())
    }
}

impl Drop for MultiProgressWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// MakeWriter implementation for tracing
#[derive(Clone)]
struct MultiProgressMakeWriter {
    multi: Arc<MultiProgress>,
}

impl MultiProgressMakeWriter {
    fn new(multi: Arc<MultiProgress>) -> Self {
        Self { multi }
    }
}

impl<'a> MakeWriter<'a> for MultiProgressMakeWriter {
    type Writer = MultiProgressWriter;

    fn make_writer(&'a self) -> Self::Writer {
        MultiProgressWriter::new(Arc::clone(&self.multi))
    }
}

/// First Ctrl-C asks the running scan or cleanup to stop, the second exits
fn install_interrupt_handler(interrupt: Interrupt) {
    tokio::spawn(async move {
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                tracing::warn!("Could not listen for Ctrl-C");
                return;
            }
            if interrupt.trigger() {
                eprintln!("\nForce exit.");
                process::exit(SIGINT_EXIT_CODE);
            }
            eprintln!("\nStopping after the current thread... press Ctrl-C again to force exit");
        }
    });
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        if let Some(CleanerError::Cancelled(reason)) = e.downcast_ref::<CleanerError>() {
            eprintln!("Cancelled: {}", reason);
            process::exit(SIGINT_EXIT_CODE);
        }
        eprintln!("Error: {}", e);
        eprintln!("\nFor help, run: gmail-domain-cleaner --help");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Several dependencies pull in rustls, so pick the crypto provider explicitly
    #[cfg(not(windows))]
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    #[cfg(windows)]
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gmail_domain_cleaner=debug,info"))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("gmail_domain_cleaner=info,warn"))
    };

    // Logs print above progress bars through the shared MultiProgress
    let multi_progress = Arc::new(MultiProgress::new());
    let make_writer = MultiProgressMakeWriter::new(Arc::clone(&multi_progress));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(make_writer)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let interrupt = Interrupt::new();
    install_interrupt_handler(interrupt.clone());

    if let Some(parent) = cli.token_cache.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    match &cli.command {
        Commands::Auth { force } => {
            tracing::info!("Authenticating with Gmail API...");

            let hub = auth::initialize_gmail_hub(&cli.credentials, &cli.token_cache, *force)
                .await?;

            println!("Successfully authenticated with Gmail API");
            println!("Token cached at: {:?}", cli.token_cache);

            // Must name the scope or the hub asks for a broader token
            let (_, profile) = hub
                .users()
                .get_profile("me")
                .add_scope(MODIFY_SCOPE)
                .doit()
                .await
                .map_err(CleanerError::from)?;
            println!(
                "Connected to account: {}",
                profile.email_address.unwrap_or_default()
            );
            if let Some(total) = profile.threads_total {
                println!("Conversations in mailbox: {}", total);
            }

            Ok(())
        }

        Commands::Scan { scan, json } => {
            let report = cli::run_scan(
                &cli,
                scan,
                *json,
                (*multi_progress).clone(),
                interrupt,
            )
            .await?;

            if !*json {
                report.print_summary();
            }
            Ok(())
        }

        Commands::Clean {
            domains,
            execute,
            limit,
            yes,
        } => {
            if !*execute {
                println!("Running in DRY RUN mode - nothing will be moved to trash");
            }

            let report = cli::run_clean(
                &cli,
                domains,
                *execute,
                *limit,
                *yes,
                (*multi_progress).clone(),
                interrupt,
            )
            .await?;

            report.print_summary();
            Ok(())
        }

        Commands::Labels => {
            cli::run_labels(&cli, (*multi_progress).clone()).await?;
            Ok(())
        }

        Commands::InitConfig { output, force } => {
            tracing::info!("Generating example configuration file");

            if output.exists() && !*force {
                return Err(CleanerError::ConfigError(format!(
                    "Configuration file already exists at {:?}. Use --force to overwrite.",
                    output
                ))
                .into());
            }

            Config::create_example(output).await?;

            println!("Created example configuration file at: {:?}", output);
            println!("\nPlease edit this file to customize your settings.");
            println!("Key settings to review:");
            println!(
                "  - collection.excluded_domains: Domains never offered for cleanup (case-insensitive)"
            );
            println!("  - collection.protected_label_ids: Labels that keep conversations safe");
            println!("  - cleanup.dry_run: Preview only unless set to false or --execute is passed");

            Ok(())
        }
    }
}
