//! In-process counters and timers for the definition cache.
//!
//! Everything here is side-channel telemetry: lock-free atomics updated on
//! the hot paths and read through [`CacheStats::snapshot`]. Nothing in the
//! cache's behaviour depends on these values.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::glob::MatchKind;

/// Latency accumulator: sample count, total and maximum, in nanoseconds.
#[derive(Debug, Default)]
pub struct Timer {
    count: AtomicU64,
    total_ns: AtomicU64,
    max_ns: AtomicU64,
}

impl Timer {
    /// Records one sample.
    #[allow(clippy::cast_possible_truncation)] // ~584 years of nanoseconds
    pub fn record(&self, elapsed: Duration) {
        let ns = elapsed.as_nanos() as u64;
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_ns.fetch_add(ns, Ordering::Relaxed);
        self.max_ns.fetch_max(ns, Ordering::Relaxed);
    }

    /// Records the time elapsed since `start`.
    pub fn record_since(&self, start: Instant) {
        self.record(start.elapsed());
    }

    /// Returns the current values.
    pub fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            count: self.count.load(Ordering::Relaxed),
            total_ns: self.total_ns.load(Ordering::Relaxed),
            max_ns: self.max_ns.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of a [`Timer`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TimerSnapshot {
    /// Number of samples.
    pub count: u64,
    /// Sum of all samples, in nanoseconds.
    pub total_ns: u64,
    /// Largest sample, in nanoseconds.
    pub max_ns: u64,
}

impl TimerSnapshot {
    /// Mean sample duration, or zero if nothing was recorded.
    pub fn mean(&self) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.total_ns / self.count)
    }
}

/// Counters and timers maintained by a [`DefCache`](crate::cache::DefCache).
#[derive(Debug, Default)]
pub struct CacheStats {
    /// Successful write-throughs to the durable store.
    pub write_through_ok: AtomicU64,
    /// Failed write-throughs to the durable store.
    pub write_through_fail: AtomicU64,
    /// Definitions loaded during bootstrap.
    pub bootstrapped: AtomicU64,
    /// Posting lists dropped by pruning, cumulative.
    pub pruned_fragments: AtomicU64,
    /// Write-through latency.
    pub write_through: Timer,
    /// Prune pass latency, including lock acquisition.
    pub prune: Timer,
    /// `get` latency.
    pub get: Timer,
    /// `list` latency.
    pub list: Timer,
    /// `find` latency for literal patterns.
    pub match_literal: Timer,
    /// `find` latency for prefix patterns.
    pub match_prefix: Timer,
    /// `find` latency for trigram patterns.
    pub match_trigram: Timer,
}

impl CacheStats {
    /// Returns the timer tracking lookups of the given kind.
    pub fn match_timer(&self, kind: MatchKind) -> &Timer {
        match kind {
            MatchKind::Literal => &self.match_literal,
            MatchKind::Prefix => &self.match_prefix,
            MatchKind::Trigram => &self.match_trigram,
        }
    }

    /// Returns the current values of all counters and timers.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            write_through_ok: self.write_through_ok.load(Ordering::Relaxed),
            write_through_fail: self.write_through_fail.load(Ordering::Relaxed),
            bootstrapped: self.bootstrapped.load(Ordering::Relaxed),
            pruned_fragments: self.pruned_fragments.load(Ordering::Relaxed),
            write_through: self.write_through.snapshot(),
            prune: self.prune.snapshot(),
            get: self.get.snapshot(),
            list: self.list.snapshot(),
            match_literal: self.match_literal.snapshot(),
            match_prefix: self.match_prefix.snapshot(),
            match_trigram: self.match_trigram.snapshot(),
        }
    }
}

/// Serializable view of [`CacheStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[allow(missing_docs)]
pub struct StatsSnapshot {
    pub write_through_ok: u64,
    pub write_through_fail: u64,
    pub bootstrapped: u64,
    pub pruned_fragments: u64,
    pub write_through: TimerSnapshot,
    pub prune: TimerSnapshot,
    pub get: TimerSnapshot,
    pub list: TimerSnapshot,
    pub match_literal: TimerSnapshot,
    pub match_prefix: TimerSnapshot,
    pub match_trigram: TimerSnapshot,
}
