//! The crawl frontier: a breadth-first queue over a visited map
//!
//! Checking the visited map and enqueueing happen as one operation under the
//! caller's lock, so a URL discovered by two workers at once is still
//! scheduled exactly once. The map also remembers URLs rejected at discovery
//! (out of scope, too deep), so a rejection is reported once and later
//! sightings of the same URL stay silent.

use crate::state::{EntryKind, EntryState, HostState, SkipReason};
use crate::url::{host_key, ScopePolicy};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use url::Url;

/// One unit of crawl work
#[derive(Debug, Clone)]
pub(crate) struct FrontierEntry {
    /// Normalized URL to fetch
    pub url: Url,
    /// Host key used for politeness accounting
    pub host: String,
    /// Link distance from the seed
    pub depth: u32,
    pub kind: EntryKind,
    /// Document this URL was discovered in; `None` for the seed
    pub origin: Option<Url>,
    /// Dispatch attempts already spent on this entry
    pub attempts: u32,
}

/// What [`Frontier::offer`] did with a discovered URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OfferOutcome {
    /// First sighting, accepted and queued
    Enqueued,
    /// Already known. `scheduled` is false when the earlier sighting was
    /// rejected, i.e. the URL will never be fetched.
    Duplicate { scheduled: bool },
    /// First sighting, rejected; the caller owes one skip event
    Rejected(SkipReason),
}

#[derive(Debug, Default)]
pub(crate) struct Frontier {
    queue: VecDeque<FrontierEntry>,
    /// Every URL ever offered, keyed by its normalized form
    visited: HashMap<String, EntryState>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offers a URL for scheduling
    ///
    /// The scope and depth checks run before anything is queued; a URL that
    /// fails either is remembered as [`EntryState::Skipped`] so the frontier
    /// reports each rejection exactly once.
    pub fn offer(
        &mut self,
        url: Url,
        depth: u32,
        kind: EntryKind,
        origin: Option<Url>,
        scope: &ScopePolicy,
        max_depth: u32,
    ) -> OfferOutcome {
        if let Some(state) = self.visited.get(url.as_str()) {
            return OfferOutcome::Duplicate {
                scheduled: !matches!(state, EntryState::Skipped | EntryState::Cancelled),
            };
        }

        if !scope.contains(&url) {
            self.visited
                .insert(url.as_str().to_string(), EntryState::Skipped);
            return OfferOutcome::Rejected(SkipReason::OutOfScope);
        }

        if depth > max_depth {
            self.visited
                .insert(url.as_str().to_string(), EntryState::Skipped);
            return OfferOutcome::Rejected(SkipReason::DepthExceeded);
        }

        let Some(host) = host_key(&url) else {
            // In-scope URLs always carry a host; treat a missing one as
            // out of scope rather than queueing something unfetchable
            self.visited
                .insert(url.as_str().to_string(), EntryState::Skipped);
            return OfferOutcome::Rejected(SkipReason::OutOfScope);
        };

        self.visited
            .insert(url.as_str().to_string(), EntryState::Queued);
        self.queue.push_back(FrontierEntry {
            url,
            host,
            depth,
            kind,
            origin,
            attempts: 0,
        });
        OfferOutcome::Enqueued
    }

    /// Puts an in-flight entry back in the queue, keeping its attempt count
    pub fn requeue(&mut self, entry: FrontierEntry) {
        self.set_state(entry.url.as_str(), EntryState::Queued);
        self.queue.push_back(entry);
    }

    /// Records the terminal state of a finished entry
    pub fn note_terminal(&mut self, url: &Url, state: EntryState) {
        self.set_state(url.as_str(), state);
    }

    /// Takes the first queued entry whose host may be dispatched to now
    ///
    /// Entries for throttled hosts stay queued in order; the scan walks past
    /// them so one slow host never blocks the rest of the crawl.
    pub fn pop_ready(
        &mut self,
        hosts: &HashMap<String, HostState>,
        now: Instant,
        interval: Duration,
        per_host_cap: u32,
    ) -> Option<FrontierEntry> {
        let position = self.queue.iter().position(|entry| {
            hosts
                .get(&entry.host)
                .map(|host| host.can_dispatch(now, interval, per_host_cap))
                .unwrap_or(true)
        })?;
        let entry = self.queue.remove(position)?;
        self.set_state(entry.url.as_str(), EntryState::InFlight);
        Some(entry)
    }

    /// Earliest instant any queued entry becomes dispatchable
    ///
    /// Hosts at their in-flight cap are excluded: no timer frees a slot
    /// there, a completion does. `None` means no queued entry is waiting on
    /// time alone.
    pub fn earliest_ready(
        &self,
        hosts: &HashMap<String, HostState>,
        now: Instant,
        interval: Duration,
        per_host_cap: u32,
    ) -> Option<Instant> {
        self.queue
            .iter()
            .filter_map(|entry| match hosts.get(&entry.host) {
                None => Some(now),
                Some(host) => {
                    if host.in_flight >= per_host_cap {
                        return None;
                    }
                    Some(host.ready_at(interval).unwrap_or(now))
                }
            })
            .min()
    }

    /// Empties the queue, marking every drained entry cancelled
    pub fn drain_cancelled(&mut self) -> Vec<FrontierEntry> {
        let drained: Vec<FrontierEntry> = self.queue.drain(..).collect();
        for entry in &drained {
            self.set_state(entry.url.as_str(), EntryState::Cancelled);
        }
        drained
    }

    /// Whether the queue is empty (the visited map is never cleared)
    pub fn is_exhausted(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Number of distinct URLs ever offered
    pub fn known(&self) -> usize {
        self.visited.len()
    }

    fn set_state(&mut self, url: &str, next: EntryState) {
        if let Some(state) = self.visited.get_mut(url) {
            if state.can_transition_to(next) {
                *state = next;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope() -> ScopePolicy {
        let seed = Url::parse("https://example.com/").unwrap();
        ScopePolicy::new(&seed, &[])
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn offer(frontier: &mut Frontier, raw: &str, depth: u32) -> OfferOutcome {
        frontier.offer(url(raw), depth, EntryKind::Page, None, &scope(), 3)
    }

    #[test]
    fn test_offer_enqueues_first_sighting_only() {
        let mut frontier = Frontier::new();
        assert_eq!(
            offer(&mut frontier, "https://example.com/a", 1),
            OfferOutcome::Enqueued
        );
        assert_eq!(
            offer(&mut frontier, "https://example.com/a", 2),
            OfferOutcome::Duplicate { scheduled: true }
        );
        assert_eq!(frontier.queue_len(), 1);
    }

    #[test]
    fn test_out_of_scope_rejected_once_then_silent() {
        let mut frontier = Frontier::new();
        assert_eq!(
            offer(&mut frontier, "https://other.org/x", 1),
            OfferOutcome::Rejected(SkipReason::OutOfScope)
        );
        assert_eq!(
            offer(&mut frontier, "https://other.org/x", 1),
            OfferOutcome::Duplicate { scheduled: false }
        );
        assert_eq!(frontier.queue_len(), 0);
    }

    #[test]
    fn test_depth_bound_rejects() {
        let mut frontier = Frontier::new();
        assert_eq!(
            offer(&mut frontier, "https://example.com/deep", 4),
            OfferOutcome::Rejected(SkipReason::DepthExceeded)
        );
        assert_eq!(frontier.queue_len(), 0);
    }

    #[test]
    fn test_pop_ready_marks_in_flight() {
        let mut frontier = Frontier::new();
        offer(&mut frontier, "https://example.com/a", 0);

        let hosts = HashMap::new();
        let entry = frontier
            .pop_ready(&hosts, Instant::now(), Duration::from_millis(500), 2)
            .expect("entry ready");
        assert_eq!(entry.url.as_str(), "https://example.com/a");
        assert_eq!(frontier.queue_len(), 0);

        // Still known, so a rediscovery is a duplicate
        assert_eq!(
            offer(&mut frontier, "https://example.com/a", 1),
            OfferOutcome::Duplicate { scheduled: true }
        );
    }

    #[test]
    fn test_pop_ready_skips_throttled_host() {
        let seed = url("https://a.example.com/");
        let scope = ScopePolicy::new(&seed, &["b.example.com".to_string()]);
        let mut frontier = Frontier::new();
        frontier.offer(
            url("https://a.example.com/1"),
            0,
            EntryKind::Page,
            None,
            &scope,
            3,
        );
        frontier.offer(
            url("https://b.example.com/1"),
            1,
            EntryKind::Page,
            None,
            &scope,
            3,
        );

        let now = Instant::now();
        let interval = Duration::from_millis(500);
        let mut hosts = HashMap::new();
        // a.example.com was just dispatched to, so it is inside its interval
        let mut busy = HostState::new();
        busy.record_dispatch(now);
        hosts.insert("a.example.com".to_string(), busy);

        let entry = frontier
            .pop_ready(&hosts, now, interval, 2)
            .expect("other host ready");
        assert_eq!(entry.host, "b.example.com");

        // The throttled entry stays queued
        assert_eq!(frontier.queue_len(), 1);
        assert!(frontier.pop_ready(&hosts, now, interval, 2).is_none());
    }

    #[test]
    fn test_pop_ready_respects_per_host_cap() {
        let mut frontier = Frontier::new();
        offer(&mut frontier, "https://example.com/a", 0);

        let now = Instant::now();
        let mut hosts = HashMap::new();
        let mut saturated = HostState::new();
        saturated.in_flight = 2;
        hosts.insert("example.com".to_string(), saturated);

        assert!(frontier
            .pop_ready(&hosts, now, Duration::from_millis(500), 2)
            .is_none());
    }

    #[test]
    fn test_requeue_keeps_attempts() {
        let mut frontier = Frontier::new();
        offer(&mut frontier, "https://example.com/a", 0);

        let hosts = HashMap::new();
        let interval = Duration::from_millis(0);
        let mut entry = frontier
            .pop_ready(&hosts, Instant::now(), interval, 2)
            .expect("ready");
        entry.attempts += 1;
        frontier.requeue(entry);

        let again = frontier
            .pop_ready(&hosts, Instant::now(), interval, 2)
            .expect("requeued entry ready");
        assert_eq!(again.attempts, 1);
    }

    #[test]
    fn test_earliest_ready_excludes_capped_hosts() {
        let mut frontier = Frontier::new();
        offer(&mut frontier, "https://example.com/a", 0);

        let now = Instant::now();
        let interval = Duration::from_millis(500);

        let mut hosts = HashMap::new();
        let mut state = HostState::new();
        state.record_dispatch(now);
        hosts.insert("example.com".to_string(), state);

        // Inside the interval: ready half a second from the dispatch
        let ready = frontier
            .earliest_ready(&hosts, now, interval, 2)
            .expect("timer pending");
        assert_eq!(ready, now + interval);

        // At the cap no timer applies
        if let Some(state) = hosts.get_mut("example.com") {
            state.in_flight = 2;
        }
        assert!(frontier.earliest_ready(&hosts, now, interval, 2).is_none());
    }

    #[test]
    fn test_drain_cancelled_empties_queue() {
        let mut frontier = Frontier::new();
        offer(&mut frontier, "https://example.com/a", 0);
        offer(&mut frontier, "https://example.com/b", 1);

        let drained = frontier.drain_cancelled();
        assert_eq!(drained.len(), 2);
        assert!(frontier.is_exhausted());

        // Cancelled URLs are never rescheduled
        assert_eq!(
            offer(&mut frontier, "https://example.com/a", 1),
            OfferOutcome::Duplicate { scheduled: false }
        );
    }

    #[test]
    fn test_known_counts_rejections_too() {
        let mut frontier = Frontier::new();
        offer(&mut frontier, "https://example.com/a", 0);
        offer(&mut frontier, "https://other.org/b", 1);
        assert_eq!(frontier.known(), 2);
        assert_eq!(frontier.queue_len(), 1);
    }
}
