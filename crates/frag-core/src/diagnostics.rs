//! Coalescer diagnostics
//!
//! Stage timings are plain atomics updated outside the critical section;
//! [`Diagnostics`] is a point-in-time snapshot.

use frag_cache::CacheStats;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Pipeline stage being timed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stage {
    Split,
    Canonicalize,
    Lookup,
    Submit,
}

#[derive(Debug, Default)]
struct StageTimer {
    count: AtomicU64,
    nanos: AtomicU64,
}

impl StageTimer {
    fn record(&self, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.nanos.fetch_add(nanos, Ordering::Relaxed);
    }

    fn snapshot(&self) -> StageTiming {
        StageTiming {
            count: self.count.load(Ordering::Relaxed),
            total: Duration::from_nanos(self.nanos.load(Ordering::Relaxed)),
        }
    }
}

/// Live counters owned by a coalescer
#[derive(Debug, Default)]
pub(crate) struct Counters {
    split: StageTimer,
    canonicalize: StageTimer,
    lookup: StageTimer,
    submit: StageTimer,
    tests: AtomicU64,
    fragments: AtomicU64,
    submissions: AtomicU64,
    shared: AtomicU64,
}

impl Counters {
    /// Time `f` as `stage`
    pub(crate) fn time<T>(&self, stage: Stage, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = f();
        self.timer(stage).record(start.elapsed());
        out
    }

    /// Time `f` as `outer`, leaving out whatever `f` times through the
    /// [`Nested`] handle so the two stages never overlap
    pub(crate) fn time_excluding<T>(&self, outer: Stage, f: impl FnOnce(&mut Nested<'_>) -> T) -> T {
        let start = Instant::now();
        let mut nested = Nested {
            counters: self,
            excluded: Duration::ZERO,
        };
        let out = f(&mut nested);
        let excluded = nested.excluded;
        self.timer(outer).record(start.elapsed().saturating_sub(excluded));
        out
    }

    fn timer(&self, stage: Stage) -> &StageTimer {
        match stage {
            Stage::Split => &self.split,
            Stage::Canonicalize => &self.canonicalize,
            Stage::Lookup => &self.lookup,
            Stage::Submit => &self.submit,
        }
    }

    pub(crate) fn test(&self, fragments: usize) {
        self.tests.fetch_add(1, Ordering::Relaxed);
        self.fragments
            .fetch_add(u64::try_from(fragments).unwrap_or(u64::MAX), Ordering::Relaxed);
    }

    pub(crate) fn submitted(&self) {
        self.submissions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn joined(&self) {
        self.shared.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> Diagnostics {
        Diagnostics {
            enabled: true,
            tests: self.tests.load(Ordering::Relaxed),
            fragments: self.fragments.load(Ordering::Relaxed),
            submissions: self.submissions.load(Ordering::Relaxed),
            joined_in_flight: self.shared.load(Ordering::Relaxed),
            in_flight: 0,
            cache_len: 0,
            cache_capacity: 0,
            cache: CacheStats::default(),
            split: self.split.snapshot(),
            canonicalize: self.canonicalize.snapshot(),
            lookup: self.lookup.snapshot(),
            submit: self.submit.snapshot(),
        }
    }
}

/// Timing handle for a stage running inside another
pub(crate) struct Nested<'c> {
    counters: &'c Counters,
    excluded: Duration,
}

impl Nested<'_> {
    /// Time `f` as `stage`; the enclosing stage does not count it
    pub(crate) fn time<T>(&mut self, stage: Stage, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let out = f();
        let elapsed = start.elapsed();
        self.counters.timer(stage).record(elapsed);
        self.excluded += elapsed;
        out
    }
}

/// Accumulated time spent in one stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTiming {
    /// Times the stage ran
    pub count: u64,
    /// Total time spent
    pub total: Duration,
}

impl StageTiming {
    /// Mean time per run
    #[must_use]
    pub fn mean(&self) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }
        let nanos = self.total.as_nanos() / u128::from(self.count);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }
}

impl fmt::Display for StageTiming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} total, {:?} mean over {}", self.total, self.mean(), self.count)
    }
}

/// Snapshot of a coalescer's state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Coalescing currently enabled
    pub enabled: bool,
    /// Tests submitted through [`crate::Coalescer::evaluate`]
    pub tests: u64,
    /// Fragments those tests split into
    pub fragments: u64,
    /// Evaluations handed to the evaluator
    pub submissions: u64,
    /// Fragments that joined an evaluation already in flight
    pub joined_in_flight: u64,
    /// Evaluations currently in flight
    pub in_flight: usize,
    /// Cached fragments
    pub cache_len: usize,
    /// Cache capacity
    pub cache_capacity: usize,
    /// Cache counters
    pub cache: CacheStats,
    /// Time spent splitting
    pub split: StageTiming,
    /// Time spent canonicalizing
    pub canonicalize: StageTiming,
    /// Time spent inside the cache/in-flight critical section, submissions excluded
    pub lookup: StageTiming,
    /// Time spent spawning submissions
    pub submit: StageTiming,
}

impl Diagnostics {
    /// Fraction of cache lookups that hit
    #[inline]
    #[must_use]
    pub fn hit_ratio(&self) -> f64 {
        self.cache.hit_ratio()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "coalescing {}",
            if self.enabled { "enabled" } else { "disabled" }
        )?;
        writeln!(
            f,
            "tests: {}, fragments: {}, submissions: {}, joined in flight: {}",
            self.tests, self.fragments, self.submissions, self.joined_in_flight
        )?;
        writeln!(
            f,
            "cache: {}/{} entries, hit ratio {:.1}% ({} hits, {} misses, {} evictions)",
            self.cache_len,
            self.cache_capacity,
            self.hit_ratio() * 100.0,
            self.cache.hits,
            self.cache.misses,
            self.cache.evictions
        )?;
        writeln!(f, "in flight: {}", self.in_flight)?;
        writeln!(f, "split: {}", self.split)?;
        writeln!(f, "canonicalize: {}", self.canonicalize)?;
        writeln!(f, "lookup: {}", self.lookup)?;
        write!(f, "submit: {}", self.submit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timers_accumulate() {
        let counters = Counters::default();
        let n = counters.time(Stage::Split, || 41 + 1);
        assert_eq!(n, 42);
        counters.time(Stage::Split, || ());
        let snap = counters.snapshot();
        assert_eq!(snap.split.count, 2);
        assert_eq!(snap.lookup.count, 0);
    }

    #[test]
    fn nested_stage_is_not_counted_twice() {
        let counters = Counters::default();
        let pause = Duration::from_millis(20);
        counters.time_excluding(Stage::Lookup, |nested| {
            nested.time(Stage::Submit, || std::thread::sleep(pause));
            nested.time(Stage::Submit, || std::thread::sleep(pause));
        });
        let snap = counters.snapshot();
        assert_eq!(snap.lookup.count, 1);
        assert_eq!(snap.submit.count, 2);
        assert!(snap.submit.total >= pause * 2);
        assert!(snap.lookup.total < pause, "lookup {:?} includes submit time", snap.lookup.total);
    }

    #[test]
    fn mean_of_nothing_is_zero() {
        assert_eq!(StageTiming::default().mean(), Duration::ZERO);
    }

    #[test]
    fn display_names_every_stage() {
        let text = Counters::default().snapshot().to_string();
        for needle in ["hit ratio", "in flight", "split", "canonicalize", "lookup", "submit"] {
            assert!(text.contains(needle), "missing {needle} in {text}");
        }
    }
}
