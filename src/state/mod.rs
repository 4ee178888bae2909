//! Crawl state tracking
//!
//! Provides the per-entry lifecycle state machine and the per-host
//! politeness/load state the scheduler consults before dispatching.

mod entry;
mod host;

pub use entry::{EntryKind, EntryState, FailureKind, SkipReason};
pub use host::HostState;
