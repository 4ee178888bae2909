//! Completion events and job accounting
//!
//! Every frontier entry ends in exactly one terminal state, delivered as a
//! [`CompletionEvent`] while the job runs and folded into a [`SiteSummary`]
//! when it finishes. Consumers that only want the final numbers can ignore
//! the event stream entirely.

use crate::state::{EntryKind, FailureKind, SkipReason};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

/// How a single frontier entry ended
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case", tag = "state")]
pub enum EntryOutcome {
    /// Fetched and persisted under the mirror root
    Mirrored {
        /// Local path relative to the mirror root
        path: PathBuf,
        /// Bytes written for the document or asset itself
        bytes: u64,
        /// Forensic report path, when one was written alongside
        report: Option<PathBuf>,
    },
    /// Fetched and processed for discovery, nothing persisted (asset-only
    /// modes leave page documents out of the mirror)
    Traversed,
    /// Never fetched
    Skipped { reason: SkipReason },
    /// Failed terminally after the attempt budget
    Failed {
        #[serde(rename = "error")]
        kind: FailureKind,
        message: String,
    },
    /// Still queued when the job was cancelled
    Cancelled,
}

/// One terminal state, emitted as entries finish
#[derive(Debug, Clone, Serialize)]
pub struct CompletionEvent {
    pub url: String,
    pub kind: EntryKind,
    pub depth: u32,
    #[serde(flatten)]
    pub outcome: EntryOutcome,
}

/// Overall disposition of a finished job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    /// Every entry reached a terminal state and none failed
    Success,
    /// The job ran to completion but some entries failed
    PartialSuccess,
    /// Cancelled before the frontier drained
    Cancelled,
}

impl JobStatus {
    /// Process exit code for this status. `1` is reserved for
    /// configuration errors that prevent a job from starting at all.
    pub fn exit_code(self) -> u8 {
        match self {
            JobStatus::Success => 0,
            JobStatus::PartialSuccess => 2,
            JobStatus::Cancelled => 3,
        }
    }
}

/// Final accounting for a site job
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct SiteSummary {
    /// Normalized seed URL the job started from
    pub seed: String,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Documents persisted (pages, and stylesheets saved as documents)
    pub pages_mirrored: u64,
    /// Assets persisted
    pub assets_mirrored: u64,
    /// Pages fetched for discovery only, nothing persisted
    pub traversed: u64,
    pub pages_failed: u64,
    pub assets_failed: u64,
    /// Entries rejected at discovery (out of scope or beyond the depth bound)
    pub skipped: u64,
    /// Entries still queued at cancellation
    pub cancelled: u64,
    /// Forensic reports written next to mirrored pages
    pub reports_written: u64,
    /// Total document and asset bytes persisted
    pub bytes_written: u64,
}

impl SiteSummary {
    /// Starts an empty summary for a job beginning now
    pub(crate) fn started(seed: &str) -> Self {
        let now = Utc::now();
        Self {
            seed: seed.to_string(),
            status: JobStatus::Success,
            started_at: now,
            finished_at: now,
            pages_mirrored: 0,
            assets_mirrored: 0,
            traversed: 0,
            pages_failed: 0,
            assets_failed: 0,
            skipped: 0,
            cancelled: 0,
            reports_written: 0,
            bytes_written: 0,
        }
    }

    /// Folds one terminal event into the counts
    pub(crate) fn record(&mut self, event: &CompletionEvent) {
        match &event.outcome {
            EntryOutcome::Mirrored { bytes, report, .. } => {
                match event.kind {
                    EntryKind::Page => self.pages_mirrored += 1,
                    EntryKind::Asset => self.assets_mirrored += 1,
                }
                self.bytes_written += bytes;
                if report.is_some() {
                    self.reports_written += 1;
                }
            }
            EntryOutcome::Traversed => self.traversed += 1,
            EntryOutcome::Skipped { .. } => self.skipped += 1,
            EntryOutcome::Failed { .. } => match event.kind {
                EntryKind::Page => self.pages_failed += 1,
                EntryKind::Asset => self.assets_failed += 1,
            },
            EntryOutcome::Cancelled => self.cancelled += 1,
        }
    }

    /// Whether any entry failed terminally
    pub fn has_failures(&self) -> bool {
        self.pages_failed + self.assets_failed > 0
    }

    /// Stamps the final status and finish time
    pub(crate) fn finish(&mut self, status: JobStatus) {
        self.status = status;
        self.finished_at = Utc::now();
    }
}

/// Result of mirroring a single page with its assets
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct MirrorResult {
    /// Normalized URL of the requested page
    pub url: String,
    pub status: JobStatus,
    /// Local path of the page document, when it was persisted
    pub document_path: Option<PathBuf>,
    /// Local path of the page's forensic report, when one was written
    pub report_path: Option<PathBuf>,
    pub assets_mirrored: u64,
    pub assets_failed: u64,
    pub bytes_written: u64,
}
