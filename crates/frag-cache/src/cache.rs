//! Score-based fragment cache
//!
//! Every entry carries a score. A new entry starts at the initial score `S`;
//! a hit adds `S`, capped at `S²`; [`FragmentCache::age`] halves every score.
//! Eviction only ever removes entries whose score has decayed to zero, so an
//! entry that keeps being hit survives while unused entries fall out after
//! `O(log S)` generations.
//!
//! There is deliberately no way to iterate the cached entries.

use crate::error::CacheConfigError;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::hash::Hash;

/// Cache sizing and scoring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries
    pub capacity: usize,
    /// Score of a new entry, and the bonus added per hit
    pub initial_score: u64,
    /// Maximum entries evicted by one sweep
    pub sweep_batch: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            initial_score: 8,
            sweep_batch: 64,
        }
    }
}

impl CacheConfig {
    /// Default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With capacity
    #[inline]
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// With initial score
    #[inline]
    #[must_use]
    pub fn with_initial_score(mut self, score: u64) -> Self {
        self.initial_score = score;
        self
    }

    /// With sweep batch size
    #[inline]
    #[must_use]
    pub fn with_sweep_batch(mut self, batch: usize) -> Self {
        self.sweep_batch = batch;
        self
    }

    /// Highest score an entry can reach
    #[inline]
    #[must_use]
    pub fn max_score(&self) -> u64 {
        self.initial_score.saturating_mul(self.initial_score)
    }

    /// Check the configuration
    ///
    /// # Errors
    /// Any zero-valued field
    pub fn validate(&self) -> Result<(), CacheConfigError> {
        if self.capacity == 0 {
            return Err(CacheConfigError::ZeroCapacity);
        }
        if self.initial_score == 0 {
            return Err(CacheConfigError::ZeroInitialScore);
        }
        if self.sweep_batch == 0 {
            return Err(CacheConfigError::ZeroSweepBatch);
        }
        Ok(())
    }
}

/// Counters since the cache was created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Lookups that found an entry
    pub hits: u64,
    /// Lookups that found nothing
    pub misses: u64,
    /// New entries stored
    pub insertions: u64,
    /// Entries removed by sweeps
    pub evictions: u64,
    /// Calls to [`FragmentCache::age`], including those made by `put`
    pub ages: u64,
}

impl CacheStats {
    /// Fraction of lookups that hit, `0.0` before the first lookup
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    score: u64,
}

/// Bounded map with decaying-score eviction
#[derive(Debug)]
pub struct FragmentCache<K, V> {
    config: CacheConfig,
    entries: IndexMap<K, Entry<V>>,
    stats: CacheStats,
}

impl<K: Hash + Eq, V> FragmentCache<K, V> {
    /// Create an empty cache
    ///
    /// # Errors
    /// [`CacheConfigError`] if `config` does not validate
    pub fn new(config: CacheConfig) -> Result<Self, CacheConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            entries: IndexMap::new(),
            stats: CacheStats::default(),
        })
    }

    /// Look up `key`; a hit raises the entry's score
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let bonus = self.config.initial_score;
        let cap = self.config.max_score();
        if let Some(entry) = self.entries.get_mut(key) {
            entry.score = entry.score.saturating_add(bonus).min(cap);
            self.stats.hits += 1;
            tracing::trace!(score = entry.score, "cache hit");
            Some(&entry.value)
        } else {
            self.stats.misses += 1;
            None
        }
    }

    /// Store `value` under `key`, evicting decayed entries if the cache is full.
    ///
    /// Storing an existing key replaces the value and keeps the score.
    pub fn put(&mut self, key: K, value: V) {
        if let Some(entry) = self.entries.get_mut(&key) {
            entry.value = value;
            return;
        }
        if self.entries.len() + 1 >= self.config.capacity && self.sweep() == 0 {
            self.age();
            self.sweep();
        }
        while self.entries.len() + 1 > self.config.capacity {
            self.age();
            self.sweep();
        }
        self.entries.insert(
            key,
            Entry {
                value,
                score: self.config.initial_score,
            },
        );
        self.stats.insertions += 1;
    }

    /// Halve every score
    pub fn age(&mut self) {
        for entry in self.entries.values_mut() {
            entry.score /= 2;
        }
        self.stats.ages += 1;
        tracing::trace!(entries = self.entries.len(), "cache aged");
    }

    /// Number of entries
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// No entries
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Whether `key` is cached; does not count as a hit
    #[inline]
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Current score of `key`; does not count as a hit
    #[inline]
    #[must_use]
    pub fn score(&self, key: &K) -> Option<u64> {
        self.entries.get(key).map(|e| e.score)
    }

    /// Counters
    #[inline]
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Remove up to `sweep_batch` zero-score entries, oldest first
    fn sweep(&mut self) -> usize {
        let before = self.entries.len();
        let mut budget = self.config.sweep_batch;
        self.entries.retain(|_, entry| {
            if budget > 0 && entry.score == 0 {
                budget -= 1;
                false
            } else {
                true
            }
        });
        let evicted = before - self.entries.len();
        if evicted > 0 {
            self.stats.evictions += evicted as u64;
            tracing::trace!(evicted, remaining = self.entries.len(), "cache sweep");
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cache(capacity: usize, score: u64, batch: usize) -> FragmentCache<&'static str, u32> {
        FragmentCache::new(
            CacheConfig::new()
                .with_capacity(capacity)
                .with_initial_score(score)
                .with_sweep_batch(batch),
        )
        .unwrap()
    }

    fn seed(cache: &mut FragmentCache<&'static str, u32>, key: &'static str, score: u64) {
        cache.entries.insert(key, Entry { value: 0, score });
    }

    #[test]
    fn config_validation() {
        assert_eq!(
            CacheConfig::new().with_capacity(0).validate(),
            Err(CacheConfigError::ZeroCapacity)
        );
        assert_eq!(
            CacheConfig::new().with_initial_score(0).validate(),
            Err(CacheConfigError::ZeroInitialScore)
        );
        assert_eq!(
            CacheConfig::new().with_sweep_batch(0).validate(),
            Err(CacheConfigError::ZeroSweepBatch)
        );
        assert!(CacheConfig::default().validate().is_ok());
    }

    #[test]
    fn hit_raises_score_up_to_square() {
        let mut c = cache(10, 3, 1);
        c.put("a", 1);
        assert_eq!(c.score(&"a"), Some(3));
        assert_eq!(c.get(&"a"), Some(&1));
        assert_eq!(c.score(&"a"), Some(6));
        for _ in 0..5 {
            c.get(&"a");
        }
        assert_eq!(c.score(&"a"), Some(9));
        assert!(c.get(&"b").is_none());
        assert_eq!(c.stats().hits, 6);
        assert_eq!(c.stats().misses, 1);
    }

    #[test]
    fn age_halves_scores() {
        let mut c = cache(10, 5, 1);
        c.put("a", 1);
        c.age();
        assert_eq!(c.score(&"a"), Some(2));
        c.age();
        c.age();
        assert_eq!(c.score(&"a"), Some(0));
        assert!(c.contains(&"a"));
    }

    #[test]
    fn full_cache_evicts_lowest_score_first() {
        let mut c = cache(3, 4, 1);
        seed(&mut c, "A", 2);
        seed(&mut c, "B", 6);
        seed(&mut c, "C", 1);

        c.put("D", 4);

        assert!(!c.contains(&"C"));
        assert!(c.contains(&"A"));
        assert!(c.contains(&"B"));
        assert!(c.contains(&"D"));
        assert_eq!(c.len(), 3);
        assert_eq!(c.score(&"B"), Some(3));
    }

    #[test]
    fn sweep_is_bounded_by_batch() {
        let mut c = cache(4, 4, 1);
        seed(&mut c, "A", 0);
        seed(&mut c, "B", 0);
        seed(&mut c, "C", 0);
        c.put("D", 1);
        assert_eq!(c.len(), 3);
        assert!(!c.contains(&"A"));
        assert!(c.contains(&"B"));
        assert_eq!(c.stats().evictions, 1);
    }

    #[test]
    fn replacing_keeps_score() {
        let mut c = cache(4, 4, 1);
        c.put("a", 1);
        c.get(&"a");
        c.put("a", 2);
        assert_eq!(c.score(&"a"), Some(8));
        assert_eq!(c.get(&"a"), Some(&2));
        assert_eq!(c.stats().insertions, 1);
    }

    #[test]
    fn capacity_one() {
        let mut c = cache(1, 16, 1);
        c.put("a", 1);
        c.put("b", 2);
        assert_eq!(c.len(), 1);
        assert!(c.contains(&"b"));
    }

    proptest! {
        #[test]
        fn never_exceeds_capacity(
            capacity in 1usize..12,
            score in 1u64..40,
            batch in 1usize..4,
            ops in prop::collection::vec((0u8..3, 0u32..32), 1..200),
        ) {
            let mut c: FragmentCache<u32, u32> = FragmentCache::new(
                CacheConfig::new()
                    .with_capacity(capacity)
                    .with_initial_score(score)
                    .with_sweep_batch(batch),
            )
            .unwrap();
            for (op, key) in ops {
                match op {
                    0 => c.put(key, key),
                    1 => { c.get(&key); }
                    _ => c.age(),
                }
                prop_assert!(c.len() <= capacity);
                if let Some(s) = c.score(&key) {
                    prop_assert!(s <= score * score);
                }
            }
        }
    }
}
