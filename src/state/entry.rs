use serde::Serialize;

/// What a frontier entry is fetched for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// A document fetched for persistence and recursion
    Page,
    /// A referenced resource fetched for persistence only
    Asset,
}

/// Why an entry was skipped without fetching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// Host outside the job's scope policy
    OutOfScope,
    /// Enqueueing would exceed the job's maximum depth
    DepthExceeded,
}

/// Why an entry failed terminally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// Transient network failure that exhausted the attempt budget
    Network,
    /// Permanent HTTP status, or a 5xx that exhausted the attempt budget
    HttpStatus(u16),
    /// Redirect chain looped or exceeded the hop limit
    RedirectLoop,
    /// URL malformed or scheme unsupported at fetch time
    InvalidUrl,
    /// Local write failure while persisting
    Write,
}

/// Lifecycle state of a single frontier entry
///
/// ```text
/// Queued -> InFlight -> {Succeeded, Failed}
/// Queued -> Cancelled
/// Skipped is terminal at discovery time (never queued)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryState {
    /// Waiting in the frontier queue
    Queued,
    /// Dispatched to a worker, fetch in progress
    InFlight,
    /// Fetched and persisted (or profiled) successfully
    Succeeded,
    /// Never fetched: out of scope or beyond the depth bound
    Skipped,
    /// Terminal failure after retry budget exhaustion or a permanent error
    Failed,
    /// Still queued when the job was cancelled
    Cancelled,
}

impl EntryState {
    /// Returns true if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Queued | Self::InFlight)
    }

    /// Returns true if the entry is still being worked on
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Queued | Self::InFlight)
    }

    /// Returns true for the successful terminal state
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Returns true for terminal states that represent an error
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Returns true if `next` is a legal transition from this state
    pub fn can_transition_to(&self, next: EntryState) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::InFlight)
                | (Self::Queued, Self::Cancelled)
                | (Self::InFlight, Self::Succeeded)
                | (Self::InFlight, Self::Failed)
                | (Self::InFlight, Self::Queued)
        )
    }
}
