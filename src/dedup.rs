//! Download deduplication
//!
//! The same remote asset is often reachable from several enumeration paths (a photo
//! shared into two albums, a forwarded attachment). [`DedupCache`] makes concurrent
//! dispatch of such overlaps safe: a URL is fetched by at most one worker at a time,
//! and never again once it has been persisted.
//!
//! Each URL is in one of three states:
//! - absent: nobody owns it; the next [`DedupCache::try_claim`] wins it
//! - in progress: one [`Claim`] holder is fetching it; other claimants wait
//! - done: it was persisted; every claimant is told to skip
//!
//! A claim that is dropped without [`Claim::complete`] reverts the URL to absent, so a
//! failed download never blocks a later attempt.
//!
//! With a claim timeout configured, a claim whose holder has not refreshed it within
//! the timeout is considered abandoned and may be taken over. Holders doing long work
//! wrap it in [`Claim::keep_alive`].

use crate::config::DedupConfig;
use crate::retry::BackoffSchedule;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};

/// Shortest interval between claim refreshes
const MIN_HEARTBEAT: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy)]
enum ClaimState {
    InProgress { token: u64, since: Instant },
    Done { at: Instant },
}

/// Observable state of a URL in the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupState {
    /// Not tracked
    Absent,
    /// Claimed by a worker that has not finished yet
    InProgress,
    /// Already persisted
    Done,
}

/// Result of [`DedupCache::try_claim`]
#[derive(Debug)]
pub enum ClaimOutcome {
    /// The caller owns the URL and must fetch it
    Claimed(Claim),
    /// The URL was already persisted; the caller must skip it
    AlreadyDone,
}

struct Inner {
    entries: DashMap<String, ClaimState>,
    next_token: AtomicU64,
    claim_timeout: Option<Duration>,
    done_ttl: Option<Duration>,
    max_entries: Option<usize>,
    schedule: BackoffSchedule,
}

impl Inner {
    fn is_expired(&self, done_at: Instant, now: Instant) -> bool {
        self.done_ttl
            .is_some_and(|ttl| now.saturating_duration_since(done_at) >= ttl)
    }

    fn is_stale(&self, since: Instant, now: Instant) -> bool {
        self.claim_timeout
            .is_some_and(|timeout| now.saturating_duration_since(since) >= timeout)
    }

    fn next_token(&self) -> u64 {
        self.next_token.fetch_add(1, Ordering::Relaxed)
    }
}

/// Concurrent registry of in-flight and completed download URLs
///
/// Cloning is cheap; clones share the same entries.
#[derive(Clone)]
pub struct DedupCache {
    inner: Arc<Inner>,
}

impl DedupCache {
    /// Create an empty cache; `schedule` paces waiting on another worker's claim
    pub fn new(config: &DedupConfig, schedule: BackoffSchedule) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: DashMap::new(),
                next_token: AtomicU64::new(1),
                claim_timeout: config.claim_timeout,
                done_ttl: config.done_ttl,
                max_entries: config.max_entries,
                schedule,
            }),
        }
    }

    /// Claim `url` for download
    ///
    /// Returns [`ClaimOutcome::Claimed`] when the URL was absent. When another worker
    /// holds it, waits on the backoff schedule (cycling through it) until that worker
    /// finishes: a completed URL yields [`ClaimOutcome::AlreadyDone`], a released one
    /// is claimed again. A claim older than the configured claim timeout is taken over.
    pub async fn try_claim(&self, url: &str) -> ClaimOutcome {
        let mut waits = self.inner.schedule.cycle();

        loop {
            let now = Instant::now();
            let decision = match self.inner.entries.entry(url.to_string()) {
                Entry::Vacant(vacant) => {
                    let token = self.inner.next_token();
                    vacant.insert(ClaimState::InProgress { token, since: now });
                    Some(ClaimOutcome::Claimed(Claim::new(&self.inner, url, token)))
                }
                Entry::Occupied(mut occupied) => {
                    let current = *occupied.get();
                    match current {
                        ClaimState::Done { at } if !self.inner.is_expired(at, now) => {
                            Some(ClaimOutcome::AlreadyDone)
                        }
                        ClaimState::Done { .. } => {
                            let token = self.inner.next_token();
                            occupied.insert(ClaimState::InProgress { token, since: now });
                            Some(ClaimOutcome::Claimed(Claim::new(&self.inner, url, token)))
                        }
                        ClaimState::InProgress { since, .. } if self.inner.is_stale(since, now) => {
                            tracing::warn!(
                                url = %url,
                                held_for_secs = now.saturating_duration_since(since).as_secs(),
                                "Taking over stale download claim"
                            );
                            let token = self.inner.next_token();
                            occupied.insert(ClaimState::InProgress { token, since: now });
                            Some(ClaimOutcome::Claimed(Claim::new(&self.inner, url, token)))
                        }
                        ClaimState::InProgress { .. } => None,
                    }
                }
            };

            if let Some(outcome) = decision {
                if matches!(outcome, ClaimOutcome::Claimed(_)) {
                    self.enforce_bound();
                }
                return outcome;
            }

            let wait = waits.next().unwrap_or(Duration::ZERO);
            tracing::debug!(
                url = %url,
                wait_ms = wait.as_millis(),
                "URL is being downloaded by another worker, waiting"
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Current state of `url`
    pub fn state(&self, url: &str) -> DedupState {
        match self.inner.entries.get(url).map(|entry| *entry.value()) {
            None => DedupState::Absent,
            Some(ClaimState::InProgress { .. }) => DedupState::InProgress,
            Some(ClaimState::Done { at }) if self.inner.is_expired(at, Instant::now()) => {
                DedupState::Absent
            }
            Some(ClaimState::Done { .. }) => DedupState::Done,
        }
    }

    /// Number of tracked URLs
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    /// True when no URL is tracked
    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Drop completed entries whose TTL has elapsed; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        if self.inner.done_ttl.is_none() {
            return 0;
        }
        let now = Instant::now();
        let before = self.inner.entries.len();
        self.inner.entries.retain(|_, state| match *state {
            ClaimState::Done { at } => !self.inner.is_expired(at, now),
            ClaimState::InProgress { .. } => true,
        });
        before.saturating_sub(self.inner.entries.len())
    }

    /// Keep the cache within `max_entries` by evicting the oldest completed URLs.
    /// In-progress entries are never evicted.
    fn enforce_bound(&self) {
        let Some(max) = self.inner.max_entries else {
            return;
        };
        if self.inner.entries.len() <= max {
            return;
        }
        self.purge_expired();

        let excess = self.inner.entries.len().saturating_sub(max);
        if excess == 0 {
            return;
        }
        let mut done: Vec<(String, Instant)> = self
            .inner
            .entries
            .iter()
            .filter_map(|entry| match *entry.value() {
                ClaimState::Done { at } => Some((entry.key().clone(), at)),
                ClaimState::InProgress { .. } => None,
            })
            .collect();
        done.sort_by_key(|(_, at)| *at);

        for (url, at) in done.into_iter().take(excess) {
            self.inner.entries.remove_if(&url, |_, state| {
                matches!(state, ClaimState::Done { at: current } if *current == at)
            });
        }
    }
}

/// Exclusive, revocable right to download one URL
///
/// Call [`Claim::complete`] after the file is persisted. Dropping the claim
/// without completing it releases the URL for another attempt.
#[derive(Debug)]
pub struct Claim {
    inner: Arc<Inner>,
    url: String,
    token: u64,
    settled: bool,
}

impl std::fmt::Debug for Inner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DedupCache")
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl Claim {
    fn new(inner: &Arc<Inner>, url: &str, token: u64) -> Self {
        Self {
            inner: Arc::clone(inner),
            url: url.to_string(),
            token,
            settled: false,
        }
    }

    /// The claimed URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Refresh the claim so waiters do not consider it stale
    pub fn touch(&self) {
        if let Some(mut entry) = self.inner.entries.get_mut(&self.url)
            && let ClaimState::InProgress { token, since } = &mut *entry
            && *token == self.token
        {
            *since = Instant::now();
        }
    }

    /// Drive `work` to completion while refreshing the claim
    ///
    /// The claim is touched every quarter of the claim timeout, so a holder that is
    /// still making progress is never taken over. Without a timeout this is a plain
    /// await.
    pub async fn keep_alive<F: Future>(&self, work: F) -> F::Output {
        let Some(timeout) = self.inner.claim_timeout else {
            return work.await;
        };
        let period = (timeout / 4).max(MIN_HEARTBEAT);
        let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tokio::pin!(work);
        loop {
            tokio::select! {
                output = &mut work => return output,
                _ = heartbeat.tick() => self.touch(),
            }
        }
    }

    /// Mark the URL as persisted; later claimants will skip it
    pub fn complete(mut self) {
        self.settled = true;
        if let Some(mut entry) = self.inner.entries.get_mut(&self.url) {
            let current = *entry;
            if matches!(current, ClaimState::InProgress { token, .. } if token == self.token) {
                *entry = ClaimState::Done { at: Instant::now() };
            }
        }
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        // Only revert our own claim; a stale claim may have been taken over
        let token = self.token;
        self.inner.entries.remove_if(&self.url, |_, state| {
            matches!(state, ClaimState::InProgress { token: current, .. } if *current == token)
        });
    }
}
