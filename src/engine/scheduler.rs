//! Job orchestration: one dispatch loop, many short-lived workers
//!
//! The loop owns the host ledger and the summary; workers share the
//! frontier and the path mapper through the job context. A worker fetches
//! one entry, schedules what it discovered, persists the result, and
//! reports back over a channel. That report is also the loop's wakeup: a
//! finished fetch frees a permit and a host slot, so dispatching is
//! re-attempted exactly when it may succeed. When nothing is in flight the
//! loop sleeps until the earliest host timer instead.

use crate::config::LimitsConfig;
use crate::engine::events::{CompletionEvent, EntryOutcome, JobStatus, SiteSummary};
use crate::engine::frontier::{Frontier, FrontierEntry, OfferOutcome};
use crate::engine::JobHandle;
use crate::filter::{self, DocumentPayload, FilteredDocument, MirrorMode};
use crate::parser::{parser_for, ParsedDocument};
use crate::profiler;
use crate::state::{EntryKind, EntryState, FailureKind, HostState};
use crate::storage::{PathMapper, Rewrite, SiteStore};
use crate::transport::{FetchedResponse, Transport, TransportError};
use crate::url::{normalize_url, ScopePolicy};
use std::borrow::Cow;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex, Semaphore};
use url::Url;

/// Delay before the second attempt at a URL; doubles per further attempt
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Shared state and policy for one job, visible to every worker
pub(crate) struct JobContext {
    pub transport: Arc<dyn Transport>,
    pub store: SiteStore,
    pub mapper: Mutex<PathMapper>,
    pub frontier: Mutex<Frontier>,
    pub scope: ScopePolicy,
    pub mode: MirrorMode,
    pub follow_links: bool,
    pub max_depth: u32,
    pub max_retries: u32,
    pub forensic_reports: bool,
}

/// Everything a worker tells the loop
enum WorkerMessage {
    /// A terminal state to forward and count (the worker's own entry, or a
    /// skip for a URL it discovered)
    Event(CompletionEvent),
    /// The worker is done; its permit is released
    Done {
        host: String,
        disposition: Disposition,
    },
}

/// How a dispatch ended, for host bookkeeping
enum Disposition {
    Succeeded,
    Failed,
    /// The host answered 429; the entry may be requeued
    RateLimited(FrontierEntry),
}

/// Runs a site job to completion and returns its summary
pub(crate) async fn run_site_job(
    ctx: Arc<JobContext>,
    limits: LimitsConfig,
    seed: Url,
    events: mpsc::UnboundedSender<CompletionEvent>,
    handle: JobHandle,
) -> SiteSummary {
    let interval = Duration::from_millis(limits.per_host_interval_ms);
    let semaphore = Arc::new(Semaphore::new(limits.concurrency.max(1) as usize));
    let (worker_tx, mut worker_rx) = mpsc::unbounded_channel::<WorkerMessage>();

    let mut hosts: HashMap<String, HostState> = HashMap::new();
    let mut summary = SiteSummary::started(seed.as_str());
    let mut in_flight: u32 = 0;
    let mut drained_on_cancel = false;

    ctx.frontier.lock().await.offer(
        seed.clone(),
        0,
        EntryKind::Page,
        None,
        &ctx.scope,
        ctx.max_depth,
    );
    tracing::info!(
        seed = %seed,
        mode = %ctx.mode,
        max_depth = ctx.max_depth,
        concurrency = limits.concurrency,
        "Starting mirror job"
    );

    loop {
        if handle.is_cancelled() && !drained_on_cancel {
            drained_on_cancel = true;
            let dropped = ctx.frontier.lock().await.drain_cancelled();
            if !dropped.is_empty() {
                tracing::warn!(count = dropped.len(), "Cancelled; dropping queued entries");
            }
            for entry in dropped {
                let event = completion(&entry, EntryOutcome::Cancelled);
                summary.record(&event);
                let _ = events.send(event);
            }
        }

        // Dispatch every entry currently allowed by the permits and the
        // per-host politeness rules
        if !handle.is_cancelled() {
            while let Ok(permit) = semaphore.clone().try_acquire_owned() {
                let now = Instant::now();
                let popped = ctx.frontier.lock().await.pop_ready(
                    &hosts,
                    now,
                    interval,
                    limits.per_host_concurrency,
                );
                let Some(entry) = popped else {
                    drop(permit);
                    break;
                };
                hosts
                    .entry(entry.host.clone())
                    .or_default()
                    .record_dispatch(now);
                in_flight += 1;
                tracing::debug!(
                    url = %entry.url,
                    depth = entry.depth,
                    kind = ?entry.kind,
                    attempts = entry.attempts,
                    "Dispatching"
                );
                let worker_ctx = ctx.clone();
                let tx = worker_tx.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    run_entry(worker_ctx, entry, tx).await;
                });
            }
        }

        let queue_empty = ctx.frontier.lock().await.is_exhausted();
        if in_flight == 0 && (queue_empty || handle.is_cancelled()) {
            break;
        }

        // Sleep until something can change: a worker report, cancellation,
        // or the earliest throttled host coming ready
        let wake_at = if !queue_empty && !handle.is_cancelled() && semaphore.available_permits() > 0
        {
            let now = Instant::now();
            ctx.frontier
                .lock()
                .await
                .earliest_ready(&hosts, now, interval, limits.per_host_concurrency)
        } else {
            None
        };
        let deadline = wake_at.unwrap_or_else(Instant::now);
        if let Some(at) = wake_at {
            tracing::trace!(
                wait_ms = at.saturating_duration_since(Instant::now()).as_millis() as u64,
                "All ready hosts throttled; waiting"
            );
        }

        tokio::select! {
            message = worker_rx.recv() => match message {
                Some(message) => {
                    handle_worker_message(
                        message,
                        &ctx,
                        &mut summary,
                        &mut hosts,
                        &mut in_flight,
                        &events,
                    )
                    .await;
                }
                None => break,
            },
            _ = handle.cancelled() => {}
            _ = tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)),
                if wake_at.is_some() => {}
        }
    }

    let status = if handle.is_cancelled() {
        JobStatus::Cancelled
    } else if summary.has_failures() {
        JobStatus::PartialSuccess
    } else {
        JobStatus::Success
    };
    summary.finish(status);
    tracing::info!(
        status = ?summary.status,
        pages = summary.pages_mirrored,
        assets = summary.assets_mirrored,
        failed = summary.pages_failed + summary.assets_failed,
        skipped = summary.skipped,
        bytes = summary.bytes_written,
        "Mirror job finished"
    );
    summary
}

async fn handle_worker_message(
    message: WorkerMessage,
    ctx: &Arc<JobContext>,
    summary: &mut SiteSummary,
    hosts: &mut HashMap<String, HostState>,
    in_flight: &mut u32,
    events: &mpsc::UnboundedSender<CompletionEvent>,
) {
    match message {
        WorkerMessage::Event(event) => {
            summary.record(&event);
            let _ = events.send(event);
        }
        WorkerMessage::Done { host, disposition } => {
            *in_flight = in_flight.saturating_sub(1);
            let state = hosts.entry(host.clone()).or_default();
            state.record_completion();
            match disposition {
                Disposition::Succeeded => state.record_success(),
                Disposition::Failed => {}
                Disposition::RateLimited(mut entry) => {
                    let now = Instant::now();
                    state.record_rate_limited(now);
                    let backoff = state
                        .backoff_remaining(now)
                        .unwrap_or_default()
                        .as_secs();
                    entry.attempts += 1;
                    if entry.attempts >= ctx.max_retries.max(1) {
                        tracing::warn!(
                            url = %entry.url,
                            attempts = entry.attempts,
                            "Rate limited with attempt budget exhausted"
                        );
                        ctx.frontier
                            .lock()
                            .await
                            .note_terminal(&entry.url, EntryState::Failed);
                        let event = completion(
                            &entry,
                            EntryOutcome::Failed {
                                kind: FailureKind::HttpStatus(429),
                                message: "rate limited and attempt budget exhausted".to_string(),
                            },
                        );
                        summary.record(&event);
                        let _ = events.send(event);
                    } else {
                        tracing::warn!(
                            host = %host,
                            backoff_secs = backoff,
                            url = %entry.url,
                            "Rate limited; backing off host and requeueing"
                        );
                        ctx.frontier.lock().await.requeue(entry);
                    }
                }
            }
        }
    }
}

/// One worker: processes a single entry and reports back
async fn run_entry(
    ctx: Arc<JobContext>,
    entry: FrontierEntry,
    tx: mpsc::UnboundedSender<WorkerMessage>,
) {
    let host = entry.host.clone();
    let disposition = process_entry(&ctx, entry, &tx).await;
    let _ = tx.send(WorkerMessage::Done { host, disposition });
}

async fn process_entry(
    ctx: &Arc<JobContext>,
    entry: FrontierEntry,
    tx: &mpsc::UnboundedSender<WorkerMessage>,
) -> Disposition {
    let response = match fetch_with_retries(ctx, &entry).await {
        Ok(response) => response,
        Err(error) if error.is_rate_limit() => {
            return Disposition::RateLimited(entry);
        }
        Err(error) => {
            tracing::warn!(url = %entry.url, %error, "Fetch failed");
            ctx.frontier
                .lock()
                .await
                .note_terminal(&entry.url, EntryState::Failed);
            let _ = tx.send(WorkerMessage::Event(completion(
                &entry,
                EntryOutcome::Failed {
                    kind: error.failure_kind(),
                    message: error.to_string(),
                },
            )));
            return Disposition::Failed;
        }
    };
    tracing::debug!(
        url = %entry.url,
        status = response.status,
        bytes = response.body.len(),
        "Fetched"
    );

    match persist_response(ctx, &entry, &response, tx).await {
        Ok(outcome) => {
            ctx.frontier
                .lock()
                .await
                .note_terminal(&entry.url, EntryState::Succeeded);
            let _ = tx.send(WorkerMessage::Event(completion(&entry, outcome)));
            Disposition::Succeeded
        }
        Err((kind, message)) => {
            tracing::warn!(url = %entry.url, kind = ?kind, %message, "Persisting failed");
            ctx.frontier
                .lock()
                .await
                .note_terminal(&entry.url, EntryState::Failed);
            let _ = tx.send(WorkerMessage::Event(completion(
                &entry,
                EntryOutcome::Failed { kind, message },
            )));
            Disposition::Failed
        }
    }
}

/// Fetches with in-worker retries for transient failures
///
/// The attempt budget is shared with earlier dispatch cycles of the same
/// entry: a 429 that sent the entry back to the queue already consumed an
/// attempt. Rate-limit responses return immediately; the scheduler decides
/// between requeueing and giving up.
async fn fetch_with_retries(
    ctx: &JobContext,
    entry: &FrontierEntry,
) -> Result<FetchedResponse, TransportError> {
    let budget = ctx.max_retries.max(1);
    let mut attempt = entry.attempts;
    loop {
        attempt += 1;
        match ctx.transport.fetch(&entry.url, &[]).await {
            Ok(response) => return Ok(response),
            Err(error) if error.is_rate_limit() => return Err(error),
            Err(error) if error.is_transient() && attempt < budget => {
                let delay = RETRY_BASE_DELAY * 2u32.saturating_pow(attempt.saturating_sub(1));
                tracing::debug!(
                    url = %entry.url,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    %error,
                    "Transient failure; retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(error) => return Err(error),
        }
    }
}

fn write_failure(error: crate::KagamiError) -> (FailureKind, String) {
    (FailureKind::Write, error.to_string())
}

/// Parses, filters, schedules discoveries, and persists one response
async fn persist_response(
    ctx: &Arc<JobContext>,
    entry: &FrontierEntry,
    response: &FetchedResponse,
    tx: &mpsc::UnboundedSender<WorkerMessage>,
) -> Result<EntryOutcome, (FailureKind, String)> {
    let document_path = ctx.mapper.lock().await.resolve(&entry.url);
    let content_type = response.content_type();
    let strategy = parser_for(content_type.as_deref(), &entry.url, &response.body);

    match strategy {
        // Pages are parsed for discovery; stylesheets are parsed even when
        // fetched as assets so their url() references join the crawl.
        // Parseable content fetched as any other asset kind stays opaque.
        Some(strategy) if entry.kind == EntryKind::Page || strategy.name() == "css" => {
            let body = String::from_utf8_lossy(&response.body);
            let intact = matches!(body, Cow::Borrowed(_));
            let parsed = strategy.parse(&body, &entry.url);

            let filtered = if strategy.name() == "css" {
                // A stylesheet never carries hyperlinks and is persisted
                // as-is only when documents of every kind are kept
                FilteredDocument {
                    payload: if ctx.mode == MirrorMode::Full {
                        DocumentPayload::Markup
                    } else {
                        DocumentPayload::Omitted
                    },
                    assets: parsed
                        .assets
                        .iter()
                        .filter(|asset| ctx.mode.wants_asset(asset.kind))
                        .cloned()
                        .collect(),
                    follow_links: false,
                }
            } else {
                filter::apply(ctx.mode, ctx.follow_links, &body, &parsed)
            };

            let rewrites = schedule_discoveries(ctx, entry, &parsed, &filtered, tx).await;

            let bytes = match &filtered.payload {
                DocumentPayload::Markup if intact => ctx
                    .store
                    .persist_document(&document_path, &body, &rewrites)
                    .await
                    .map_err(write_failure)?,
                // Mis-labelled binary: keep the exact bytes, skip rewriting
                DocumentPayload::Markup => ctx
                    .store
                    .persist_raw(&document_path, &response.body)
                    .await
                    .map_err(write_failure)?,
                DocumentPayload::Text(reduced) => ctx
                    .store
                    .persist_raw(&document_path, reduced.as_bytes())
                    .await
                    .map_err(write_failure)?,
                DocumentPayload::Omitted => return Ok(EntryOutcome::Traversed),
            };

            let report = if ctx.forensic_reports && strategy.name() == "html" {
                write_report(ctx, entry, &document_path, response, &body, &parsed).await
            } else {
                None
            };

            Ok(EntryOutcome::Mirrored {
                path: document_path,
                bytes,
                report,
            })
        }
        _ => match entry.kind {
            EntryKind::Asset => {
                let bytes = ctx
                    .store
                    .persist_raw(&document_path, &response.body)
                    .await
                    .map_err(write_failure)?;
                Ok(EntryOutcome::Mirrored {
                    path: document_path,
                    bytes,
                    report: None,
                })
            }
            EntryKind::Page if ctx.mode == MirrorMode::Full => {
                let bytes = ctx
                    .store
                    .persist_raw(&document_path, &response.body)
                    .await
                    .map_err(write_failure)?;
                Ok(EntryOutcome::Mirrored {
                    path: document_path,
                    bytes,
                    report: None,
                })
            }
            EntryKind::Page => Ok(EntryOutcome::Traversed),
        },
    }
}

/// Offers everything the document referenced and returns the rewrites for
/// references that are (or will be) part of the mirror
///
/// Hyperlinks are offered one level deeper than the document; assets stay
/// at the document's own depth. References that stay remote, because they
/// are out of scope or beyond the depth bound, keep their original text.
async fn schedule_discoveries(
    ctx: &Arc<JobContext>,
    entry: &FrontierEntry,
    parsed: &ParsedDocument,
    filtered: &FilteredDocument,
    tx: &mpsc::UnboundedSender<WorkerMessage>,
) -> Vec<Rewrite> {
    let mut targets: Vec<(String, Url)> = Vec::new();

    {
        let mut frontier = ctx.frontier.lock().await;

        if filtered.follow_links {
            for link in &parsed.links {
                let Ok(normalized) = normalize_url(link.url.as_str()) else {
                    continue;
                };
                let outcome = frontier.offer(
                    normalized.clone(),
                    entry.depth + 1,
                    EntryKind::Page,
                    Some(entry.url.clone()),
                    &ctx.scope,
                    ctx.max_depth,
                );
                note_offer(
                    outcome,
                    normalized,
                    entry.depth + 1,
                    EntryKind::Page,
                    &link.original,
                    &mut targets,
                    tx,
                );
            }
        }

        for asset in &filtered.assets {
            let Ok(normalized) = normalize_url(asset.url.as_str()) else {
                continue;
            };
            let outcome = frontier.offer(
                normalized.clone(),
                entry.depth,
                EntryKind::Asset,
                Some(entry.url.clone()),
                &ctx.scope,
                ctx.max_depth,
            );
            note_offer(
                outcome,
                normalized,
                entry.depth,
                EntryKind::Asset,
                &asset.original,
                &mut targets,
                tx,
            );
        }
    }

    if targets.is_empty() {
        return Vec::new();
    }

    let mut mapper = ctx.mapper.lock().await;
    targets
        .into_iter()
        .map(|(original, url)| Rewrite {
            original,
            target: mapper.resolve(&url),
        })
        .collect()
}

fn note_offer(
    outcome: OfferOutcome,
    url: Url,
    depth: u32,
    kind: EntryKind,
    original: &str,
    targets: &mut Vec<(String, Url)>,
    tx: &mpsc::UnboundedSender<WorkerMessage>,
) {
    match outcome {
        OfferOutcome::Enqueued => {
            tracing::debug!(url = %url, depth, kind = ?kind, "Queued");
            targets.push((original.to_string(), url));
        }
        OfferOutcome::Duplicate { scheduled: true } => {
            targets.push((original.to_string(), url));
        }
        OfferOutcome::Duplicate { scheduled: false } => {}
        OfferOutcome::Rejected(reason) => {
            tracing::debug!(url = %url, reason = ?reason, "Skipping discovered URL");
            let _ = tx.send(WorkerMessage::Event(CompletionEvent {
                url: url.to_string(),
                kind,
                depth,
                outcome: EntryOutcome::Skipped { reason },
            }));
        }
    }
}

async fn write_report(
    ctx: &Arc<JobContext>,
    entry: &FrontierEntry,
    document_path: &Path,
    response: &FetchedResponse,
    body: &str,
    parsed: &ParsedDocument,
) -> Option<PathBuf> {
    let report = profiler::profile(&entry.url, response, body, parsed);
    let json = match report.to_json_pretty() {
        Ok(json) => json,
        Err(error) => {
            tracing::warn!(url = %entry.url, %error, "Forensic report serialization failed");
            return None;
        }
    };
    match ctx.store.persist_report(document_path, &json).await {
        Ok(path) => {
            tracing::debug!(url = %entry.url, path = %path.display(), "Forensic report written");
            Some(path)
        }
        Err(error) => {
            tracing::warn!(url = %entry.url, %error, "Forensic report write failed");
            None
        }
    }
}

fn completion(entry: &FrontierEntry, outcome: EntryOutcome) -> CompletionEvent {
    CompletionEvent {
        url: entry.url.to_string(),
        kind: entry.kind,
        depth: entry.depth,
        outcome,
    }
}
