//! The mirroring engine: the crate's public entry point
//!
//! A [`MirrorEngine`] is a configuration plus a transport. Each operation
//! spawns an independent job with its own frontier, host ledger, and path
//! mapper, so one engine can run jobs back to back (or concurrently against
//! different output roots).
//!
//! Three ways to consume a site job:
//! - [`MirrorEngine::mirror_site`] blocks until done and returns the summary
//! - [`MirrorEngine::start_site`] hands back a [`SiteJob`] for streaming
//!   completion events and cancelling mid-run
//! - [`MirrorEngine::mirror_page`] bounds the same machinery to depth zero:
//!   one document and its assets
//!
//! [`MirrorEngine::extract_forensic_report`] profiles a single page without
//! touching the filesystem at all.

mod events;
mod frontier;
mod scheduler;

pub use events::{CompletionEvent, EntryOutcome, JobStatus, MirrorResult, SiteSummary};

use crate::config::Config;
use crate::engine::frontier::Frontier;
use crate::engine::scheduler::{run_site_job, JobContext};
use crate::parser::{parser_for, ParsedDocument};
use crate::profiler::{self, ForensicReport};
use crate::storage::{PathMapper, SiteStore};
use crate::transport::{HttpTransport, Transport};
use crate::url::{normalize_url, ScopePolicy};
use crate::{KagamiError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;
use url::Url;

/// Site mirroring and page profiling over one configured transport
pub struct MirrorEngine {
    config: Config,
    transport: Arc<dyn Transport>,
}

impl MirrorEngine {
    /// Builds an engine with an HTTP transport from the configuration
    ///
    /// Fails before any fetch if the transport session cannot be built,
    /// e.g. on a malformed proxy endpoint.
    pub fn new(config: Config) -> Result<Self> {
        let transport = HttpTransport::new(&config.transport)?;
        Ok(Self {
            config,
            transport: Arc::new(transport),
        })
    }

    /// Builds an engine over a caller-supplied transport
    pub fn with_transport(config: Config, transport: Arc<dyn Transport>) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Mirrors one page and the assets it references
    ///
    /// Runs a site job bounded to depth zero: hyperlinks are discovered and
    /// left remote, assets are fetched at the page's own depth.
    pub async fn mirror_page(&self, page: &str) -> Result<MirrorResult> {
        let seed = parse_seed(page)?;
        let mut job = self.spawn_job(seed.clone(), Some(0)).await?;

        let mut document_path = None;
        let mut report_path = None;
        while let Some(event) = job.next_event().await {
            if event.url == seed.as_str() {
                if let EntryOutcome::Mirrored { path, report, .. } = &event.outcome {
                    document_path = Some(path.clone());
                    report_path = report.clone();
                }
            }
            log_event(&event);
        }
        let summary = job.finish().await?;

        Ok(MirrorResult {
            url: seed.to_string(),
            status: summary.status,
            document_path,
            report_path,
            assets_mirrored: summary.assets_mirrored,
            assets_failed: summary.assets_failed,
            bytes_written: summary.bytes_written,
        })
    }

    /// Mirrors a site's reachable subtree and blocks until it finishes
    pub async fn mirror_site(&self, seed: &str) -> Result<SiteSummary> {
        let mut job = self.start_site(seed).await?;
        while let Some(event) = job.next_event().await {
            log_event(&event);
        }
        job.finish().await
    }

    /// Starts a site job and returns a handle for observing it
    pub async fn start_site(&self, seed: &str) -> Result<SiteJob> {
        let seed = parse_seed(seed)?;
        self.spawn_job(seed, None).await
    }

    /// Fetches one page and extracts its forensic report, writing nothing
    pub async fn extract_forensic_report(&self, page: &str) -> Result<ForensicReport> {
        let url = parse_seed(page)?;
        let response = self.transport.fetch(&url, &[]).await?;
        let body = String::from_utf8_lossy(&response.body).into_owned();
        let parsed = match parser_for(response.content_type().as_deref(), &url, &response.body) {
            Some(strategy) => strategy.parse(&body, &url),
            None => ParsedDocument::default(),
        };
        Ok(profiler::profile(&url, &response, &body, &parsed))
    }

    async fn spawn_job(&self, seed: Url, depth_override: Option<u32>) -> Result<SiteJob> {
        let ctx = Arc::new(JobContext {
            transport: self.transport.clone(),
            store: SiteStore::new(self.config.output.root_dir.clone()),
            mapper: Mutex::new(PathMapper::new()),
            frontier: Mutex::new(Frontier::new()),
            scope: ScopePolicy::new(&seed, &self.config.job.allowed_hosts),
            mode: self.config.job.mode,
            follow_links: self.config.job.follow_links,
            max_depth: depth_override.unwrap_or(self.config.job.max_depth),
            max_retries: self.config.limits.max_retries,
            forensic_reports: self.config.output.forensic_reports,
        });

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let handle = JobHandle::new();
        let task = tokio::spawn(run_site_job(
            ctx,
            self.config.limits.clone(),
            seed.clone(),
            events_tx,
            handle.clone(),
        ));

        Ok(SiteJob {
            seed,
            events: events_rx,
            handle,
            task,
        })
    }
}

/// A running site job
///
/// Dropping a `SiteJob` detaches the job rather than aborting it; use the
/// [`JobHandle`] to stop one early.
pub struct SiteJob {
    seed: Url,
    events: mpsc::UnboundedReceiver<CompletionEvent>,
    handle: JobHandle,
    task: JoinHandle<SiteSummary>,
}

impl SiteJob {
    pub fn seed(&self) -> &Url {
        &self.seed
    }

    /// A cancellation handle, freely cloneable across tasks
    pub fn handle(&self) -> JobHandle {
        self.handle.clone()
    }

    /// Next terminal event, or `None` once the job has finished
    pub async fn next_event(&mut self) -> Option<CompletionEvent> {
        self.events.recv().await
    }

    /// Waits for the job and returns its summary
    pub async fn finish(self) -> Result<SiteSummary> {
        Ok(self.task.await?)
    }
}

/// Requests cancellation of a site job
///
/// Cancelling stops new dispatches immediately; fetches already in flight
/// are allowed to finish and still appear in the summary.
#[derive(Clone)]
pub struct JobHandle {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl JobHandle {
    pub(crate) fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Flags the job as cancelled and wakes its dispatch loop
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once cancellation has been requested
    pub(crate) async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.notify.notified().await;
    }
}

/// Parses a seed, defaulting to `http://` when no scheme was given
fn parse_seed(raw: &str) -> Result<Url> {
    let raw = raw.trim();
    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{}", raw)
    };
    normalize_url(&candidate).map_err(|error| KagamiError::Seed {
        url: raw.to_string(),
        reason: error.to_string(),
    })
}

fn log_event(event: &CompletionEvent) {
    match &event.outcome {
        EntryOutcome::Mirrored { path, bytes, .. } => {
            tracing::debug!(url = %event.url, path = %path.display(), bytes, "Mirrored");
        }
        EntryOutcome::Traversed => {
            tracing::debug!(url = %event.url, "Traversed without persisting");
        }
        EntryOutcome::Skipped { reason } => {
            tracing::debug!(url = %event.url, reason = ?reason, "Skipped");
        }
        EntryOutcome::Failed { kind, message } => {
            tracing::warn!(url = %event.url, kind = ?kind, %message, "Entry failed");
        }
        EntryOutcome::Cancelled => {
            tracing::debug!(url = %event.url, "Cancelled while queued");
        }
    }
}
