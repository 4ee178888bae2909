//! Kagami command-line interface
//!
//! Thin shim over the library: parse arguments, load configuration, run one
//! engine operation, and map its outcome to an exit code. `0` means every
//! entry succeeded, `1` a configuration or startup failure, `2` a completed
//! job with failed entries, `3` a cancelled job.

use clap::{Parser, Subcommand};
use kagami::config::{load_config, Config};
use kagami::{CompletionEvent, EntryOutcome, MirrorEngine, MirrorMode, SiteSummary};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Kagami: a site mirroring and forensic profiling tool
#[derive(Parser, Debug)]
#[command(name = "kagami")]
#[command(version)]
#[command(about = "Mirror web sites locally and profile their pages", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file (defaults apply without one)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mirror a single page and the assets it references
    Page {
        /// Page URL; a bare host defaults to http://
        url: String,
    },
    /// Mirror a site's reachable subtree
    Site {
        /// Seed URL; a bare host defaults to http://
        url: String,

        /// Override the configured link depth bound
        #[arg(long, value_name = "N")]
        max_depth: Option<u32>,

        /// Override the configured content mode (full, text, image, video)
        #[arg(long, value_name = "MODE")]
        mode: Option<MirrorMode>,
    },
    /// Fetch one page and print its forensic report as JSON
    Profile {
        /// Page URL; a bare host defaults to http://
        url: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet);

    let config = match load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(error) => {
            tracing::error!(%error, "Failed to load configuration");
            return ExitCode::from(1);
        }
    };

    match run(cli.command, config).await {
        Ok(code) => code,
        Err(error) => {
            tracing::error!(%error, "Aborting");
            ExitCode::from(1)
        }
    }
}

/// Sets up the tracing subscriber; an explicit `RUST_LOG` wins over the
/// verbosity flags
fn setup_logging(verbose: u8, quiet: bool) {
    let default = if quiet {
        "error"
    } else {
        match verbose {
            0 => "kagami=info,warn",
            1 => "kagami=debug,info",
            _ => "trace",
        }
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn load(path: Option<&Path>) -> kagami::Result<Config> {
    match path {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading configuration");
            Ok(load_config(path)?)
        }
        None => {
            let mut config = Config::default();
            config.transport.apply_env_proxy();
            Ok(config)
        }
    }
}

async fn run(command: Command, mut config: Config) -> kagami::Result<ExitCode> {
    match command {
        Command::Page { url } => {
            let engine = MirrorEngine::new(config)?;
            let result = engine.mirror_page(&url).await?;

            let root = &engine.config().output.root_dir;
            match &result.document_path {
                Some(path) => println!("Mirrored {} -> {}", result.url, root.join(path).display()),
                None => println!("Nothing persisted for {}", result.url),
            }
            if let Some(report) = &result.report_path {
                println!("Report: {}", root.join(report).display());
            }
            println!(
                "Assets: {} mirrored, {} failed; {} bytes written",
                result.assets_mirrored, result.assets_failed, result.bytes_written
            );
            Ok(ExitCode::from(result.status.exit_code()))
        }
        Command::Site {
            url,
            max_depth,
            mode,
        } => {
            if let Some(depth) = max_depth {
                config.job.max_depth = depth;
            }
            if let Some(mode) = mode {
                config.job.mode = mode;
            }
            let engine = MirrorEngine::new(config)?;
            let mut job = engine.start_site(&url).await?;

            let handle = job.handle();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupt received; cancelling job");
                    handle.cancel();
                }
            });

            while let Some(event) = job.next_event().await {
                log_progress(&event);
            }
            let summary = job.finish().await?;
            print_summary(&summary);
            Ok(ExitCode::from(summary.status.exit_code()))
        }
        Command::Profile { url } => {
            let engine = MirrorEngine::new(config)?;
            let report = engine.extract_forensic_report(&url).await?;
            println!("{}", report.to_json_pretty()?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn log_progress(event: &CompletionEvent) {
    match &event.outcome {
        EntryOutcome::Mirrored { path, bytes, .. } => {
            tracing::info!(url = %event.url, path = %path.display(), bytes, "Mirrored");
        }
        EntryOutcome::Failed { kind, message } => {
            tracing::warn!(url = %event.url, kind = ?kind, %message, "Failed");
        }
        EntryOutcome::Traversed => tracing::debug!(url = %event.url, "Traversed"),
        EntryOutcome::Skipped { reason } => {
            tracing::debug!(url = %event.url, reason = ?reason, "Skipped");
        }
        EntryOutcome::Cancelled => tracing::debug!(url = %event.url, "Cancelled"),
    }
}

fn print_summary(summary: &SiteSummary) {
    let elapsed = summary.finished_at - summary.started_at;
    println!("\n=== Mirror Summary ===");
    println!("Seed:     {}", summary.seed);
    println!("Status:   {:?}", summary.status);
    println!(
        "Pages:    {} mirrored, {} failed",
        summary.pages_mirrored, summary.pages_failed
    );
    println!(
        "Assets:   {} mirrored, {} failed",
        summary.assets_mirrored, summary.assets_failed
    );
    if summary.traversed > 0 {
        println!("Traversed without persisting: {}", summary.traversed);
    }
    println!("Skipped:  {}", summary.skipped);
    if summary.cancelled > 0 {
        println!("Cancelled in queue: {}", summary.cancelled);
    }
    println!("Reports:  {}", summary.reports_written);
    println!("Bytes:    {}", summary.bytes_written);
    println!("Elapsed:  {}.{:03}s", elapsed.num_seconds(), elapsed.num_milliseconds() % 1000);
}
