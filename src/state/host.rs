use std::time::{Duration, Instant};

/// Base backoff applied after the first 429 from a host
const RATE_LIMIT_BASE_SECS: u64 = 30;

/// Ceiling on per-host rate-limit backoff
const RATE_LIMIT_MAX_SECS: u64 = 600;

/// Politeness and load state for a single host
///
/// One `HostState` exists per host key within a job. The scheduler updates
/// it at dispatch and completion; the minimum inter-request interval and
/// the per-host in-flight cap come from the job's limits.
#[derive(Debug, Clone, Default)]
pub struct HostState {
    /// When a request to this host was last dispatched
    pub last_dispatch: Option<Instant>,
    /// Requests currently in flight against this host
    pub in_flight: u32,
    /// Consecutive 429 responses without an intervening success
    pub consecutive_429s: u32,
    /// No dispatches to this host until this instant
    pub backoff_until: Option<Instant>,
    /// Total requests dispatched to this host
    pub dispatch_count: u64,
}

impl HostState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the earliest instant a dispatch to this host is allowed,
    /// considering the politeness interval and any rate-limit backoff.
    /// `None` means the host is ready now (the in-flight cap is a separate
    /// check).
    pub fn ready_at(&self, interval: Duration) -> Option<Instant> {
        let interval_gate = self.last_dispatch.map(|last| last + interval);
        match (interval_gate, self.backoff_until) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
    }

    /// Returns true if a dispatch to this host may happen at `now`
    pub fn can_dispatch(&self, now: Instant, interval: Duration, per_host_cap: u32) -> bool {
        if self.in_flight >= per_host_cap {
            return false;
        }
        match self.ready_at(interval) {
            Some(ready) => now >= ready,
            None => true,
        }
    }

    /// Records a dispatch to this host
    pub fn record_dispatch(&mut self, now: Instant) {
        self.last_dispatch = Some(now);
        self.in_flight += 1;
        self.dispatch_count += 1;
    }

    /// Records a request finishing (any outcome)
    pub fn record_completion(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    /// Records a successful response, clearing any rate-limit backoff
    pub fn record_success(&mut self) {
        self.consecutive_429s = 0;
        self.backoff_until = None;
    }

    /// Records a 429, doubling the backoff from a 30s base up to the cap
    pub fn record_rate_limited(&mut self, now: Instant) {
        self.consecutive_429s += 1;
        let exponent = self.consecutive_429s.saturating_sub(1).min(4);
        let secs = (RATE_LIMIT_BASE_SECS << exponent).min(RATE_LIMIT_MAX_SECS);
        self.backoff_until = Some(now + Duration::from_secs(secs));
    }

    /// Seconds of backoff currently imposed by rate limiting, if any
    pub fn backoff_remaining(&self, now: Instant) -> Option<Duration> {
        self.backoff_until
            .and_then(|until| until.checked_duration_since(now))
            .filter(|d| !d.is_zero())
    }
}
