//! Coalescing evaluator
//!
//! Splits every submitted test into independent fragments, canonicalizes
//! them, and makes sure each canonical fragment is evaluated at most once:
//!
//! 1. a cached result is returned directly;
//! 2. a fragment already being evaluated is joined through its shared future;
//! 3. otherwise a new evaluation is registered and spawned.
//!
//! Steps 1 to 3 run inside one critical section over the cache and the
//! in-flight map. A spawned evaluation always runs to completion, even if
//! every waiter is dropped, and only successful results are cached.

use crate::config::CoalescerConfig;
use crate::coverage::CoverageResult;
use crate::diagnostics::{Counters, Diagnostics, Nested, Stage};
use crate::error::CoalesceError;
use crate::evaluator::{AuxData, EvaluationFailure, Evaluator};
use frag_cache::FragmentCache;
use frag_canon::Pipeline;
use frag_ir::{CanonicalFragment, Test};
use frag_split::Splitter;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

type Outcome = Result<CoverageResult, EvaluationFailure>;
type SharedOutcome = Shared<BoxFuture<'static, Outcome>>;

/// Cache and in-flight map, always locked together
struct State {
    cache: FragmentCache<CanonicalFragment, CoverageResult>,
    in_flight: HashMap<CanonicalFragment, SharedOutcome>,
}

struct Inner<E> {
    evaluator: E,
    config: CoalescerConfig,
    splitter: Splitter,
    pipeline: Pipeline,
    enabled: AtomicBool,
    state: Mutex<State>,
    counters: Counters,
}

/// Deduplicating front end to an [`Evaluator`]
///
/// Cloning is cheap and clones share all state.
pub struct Coalescer<E> {
    inner: Arc<Inner<E>>,
}

impl<E> Clone for Coalescer<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> fmt::Debug for Coalescer<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coalescer")
            .field("config", &self.inner.config)
            .field("enabled", &self.inner.enabled.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl<E: Evaluator> Coalescer<E> {
    /// Create a coalescer in front of `evaluator`
    ///
    /// # Errors
    /// [`CoalesceError::Config`] if the configuration does not validate
    pub fn new(evaluator: E, config: CoalescerConfig) -> Result<Self, CoalesceError> {
        config.validate()?;
        let cache = FragmentCache::new(config.cache).map_err(crate::error::ConfigError::from)?;
        let inner = Inner {
            evaluator,
            splitter: Splitter::new(config.split_options()),
            pipeline: Pipeline::new().with_max_rounds(config.max_pipeline_rounds),
            enabled: AtomicBool::new(config.enabled),
            state: Mutex::new(State {
                cache,
                in_flight: HashMap::new(),
            }),
            counters: Counters::default(),
            config,
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Wrapped evaluator
    #[inline]
    #[must_use]
    pub fn evaluator(&self) -> &E {
        &self.inner.evaluator
    }

    /// Configuration the coalescer was built with
    #[inline]
    #[must_use]
    pub fn config(&self) -> &CoalescerConfig {
        &self.inner.config
    }

    /// Split and canonicalize `test` without evaluating anything
    ///
    /// # Errors
    /// [`CoalesceError::Canon`] if canonicalization breaks an invariant
    pub fn fragments(&self, test: &Test) -> Result<Vec<CanonicalFragment>, CoalesceError> {
        let inner = &self.inner;
        let fragments = inner.counters.time(Stage::Split, || inner.splitter.split(test));
        let keys = inner.counters.time(Stage::Canonicalize, || {
            fragments
                .iter()
                .map(|f| inner.pipeline.canonicalize(f))
                .collect::<Result<Vec<_>, _>>()
        });
        keys.map_err(|e| {
            tracing::error!(error = %e, steps = test.len(), "canonicalization invariant violated");
            CoalesceError::from(e)
        })
    }

    /// Submit a test for evaluation
    ///
    /// Returns once every fragment is either answered from the cache or
    /// attached to an evaluation; await [`EvaluationHandle::wait`] for the
    /// merged coverage.
    ///
    /// # Errors
    /// Bookkeeping violations ([`CoalesceError::Canon`],
    /// [`CoalesceError::DoubleRegistration`]); evaluation failures are
    /// reported by the handle instead.
    ///
    /// # Panics
    /// If called outside a Tokio runtime.
    pub fn evaluate(&self, test: &Test, aux: AuxData) -> Result<EvaluationHandle, CoalesceError> {
        let inner = &self.inner;
        if !inner.enabled.load(Ordering::Acquire) {
            inner.counters.test(1);
            let key = CanonicalFragment::verbatim(test);
            let shared = inner
                .counters
                .time(Stage::Submit, || self.spawn(key, aux, false));
            return Ok(EvaluationHandle {
                parts: vec![Pending::Shared(shared)],
            });
        }

        let keys = self.fragments(test)?;
        inner.counters.test(keys.len());
        tracing::debug!(
            steps = test.len(),
            fragments = keys.len(),
            generation = aux.generation,
            "test split"
        );

        let parts = inner.counters.time_excluding(Stage::Lookup, |nested| {
            let mut state = inner.state.lock();
            keys.into_iter()
                .map(|key| self.claim(&mut state, nested, key, &aux))
                .collect::<Result<Vec<_>, _>>()
        })?;
        Ok(EvaluationHandle { parts })
    }

    fn claim(
        &self,
        state: &mut State,
        nested: &mut Nested<'_>,
        key: CanonicalFragment,
        aux: &AuxData,
    ) -> Result<Pending, CoalesceError> {
        let fingerprint = key.fingerprint();
        if let Some(coverage) = state.cache.get(&key) {
            tracing::trace!(fragment = %fingerprint.short(), "cache hit");
            return Ok(Pending::Ready(coverage.clone()));
        }
        if let Some(shared) = state.in_flight.get(&key) {
            tracing::trace!(fragment = %fingerprint.short(), "joined in-flight evaluation");
            self.inner.counters.joined();
            return Ok(Pending::Shared(shared.clone()));
        }

        tracing::trace!(fragment = %fingerprint.short(), steps = key.len(), "submitting");
        let shared = nested.time(Stage::Submit, || self.spawn(key.clone(), aux.clone(), true));
        if state.in_flight.insert(key, shared.clone()).is_some() {
            tracing::error!(fragment = %fingerprint, "fragment registered in flight twice");
            return Err(CoalesceError::DoubleRegistration(fingerprint));
        }
        Ok(Pending::Shared(shared))
    }

    fn spawn(&self, key: CanonicalFragment, aux: AuxData, tracked: bool) -> SharedOutcome {
        self.inner.counters.submitted();
        let fingerprint = key.fingerprint();
        let task = tokio::spawn(Arc::clone(&self.inner).run(key, aux, tracked));
        async move {
            task.await.unwrap_or_else(|e| {
                Err(EvaluationFailure::internal(format!(
                    "evaluation task for {} failed: {e}",
                    fingerprint.short()
                )))
            })
        }
        .boxed()
        .shared()
    }

    /// Turn coalescing back on
    pub fn enable(&self) {
        if !self.inner.enabled.swap(true, Ordering::AcqRel) {
            tracing::info!("coalescing enabled");
        }
    }

    /// Submit every test verbatim, bypassing splitting, cache and deduplication
    pub fn disable(&self) {
        if self.inner.enabled.swap(false, Ordering::AcqRel) {
            tracing::info!("coalescing disabled");
        }
    }

    /// Whether coalescing is on
    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Acquire)
    }

    /// Halve every cache score; call once per search generation
    pub fn age_cache(&self) {
        let mut state = self.inner.state.lock();
        state.cache.age();
        tracing::info!(entries = state.cache.len(), "cache aged");
    }

    /// Snapshot of counters, cache and in-flight state
    #[must_use]
    pub fn diagnostics(&self) -> Diagnostics {
        let mut snapshot = self.inner.counters.snapshot();
        snapshot.enabled = self.is_enabled();
        let state = self.inner.state.lock();
        snapshot.in_flight = state.in_flight.len();
        snapshot.cache_len = state.cache.len();
        snapshot.cache_capacity = state.cache.capacity();
        snapshot.cache = state.cache.stats();
        snapshot
    }
}

impl<E: Evaluator> Inner<E> {
    async fn run(self: Arc<Self>, key: CanonicalFragment, aux: AuxData, tracked: bool) -> Outcome {
        let outcome = match AssertUnwindSafe(self.evaluator.evaluate(key.clone(), aux))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::warn!(fragment = %key.fingerprint().short(), %message, "evaluator panicked");
                Err(EvaluationFailure::internal(message))
            }
        };
        if tracked {
            if let Err(e) = self.complete(&key, &outcome) {
                return Err(EvaluationFailure::internal(e.to_string()));
            }
        }
        outcome
    }

    fn complete(&self, key: &CanonicalFragment, outcome: &Outcome) -> Result<(), CoalesceError> {
        let mut state = self.state.lock();
        if state.in_flight.remove(key).is_none() {
            tracing::error!(fragment = %key.fingerprint(), "completed fragment was not in flight");
            return Err(CoalesceError::MissingInFlight(key.fingerprint()));
        }
        match outcome {
            Ok(coverage) if !state.cache.contains(key) => {
                state.cache.put(key.clone(), coverage.clone());
                tracing::trace!(fragment = %key.fingerprint().short(), "result cached");
            }
            Ok(_) => {}
            Err(failure) => {
                tracing::debug!(fragment = %key.fingerprint().short(), %failure, "evaluation failed");
            }
        }
        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "evaluator panicked".to_owned())
}

enum Pending {
    Ready(CoverageResult),
    Shared(SharedOutcome),
}

/// Outstanding evaluation of one submitted test
#[must_use = "the coverage is only available through `wait`"]
pub struct EvaluationHandle {
    parts: Vec<Pending>,
}

impl fmt::Debug for EvaluationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluationHandle")
            .field("fragments", &self.fragments())
            .field("cached", &self.cached())
            .finish()
    }
}

impl EvaluationHandle {
    /// Fragments the test was split into
    #[inline]
    #[must_use]
    pub fn fragments(&self) -> usize {
        self.parts.len()
    }

    /// Fragments answered from the cache
    #[must_use]
    pub fn cached(&self) -> usize {
        self.parts
            .iter()
            .filter(|p| matches!(p, Pending::Ready(_)))
            .count()
    }

    /// Wait for every fragment and merge their coverage
    ///
    /// # Errors
    /// The first failing fragment's [`EvaluationFailure`]
    pub async fn wait(self) -> Outcome {
        let outcomes = futures::future::join_all(self.parts.into_iter().map(|part| async move {
            match part {
                Pending::Ready(coverage) => Ok(coverage),
                Pending::Shared(shared) => shared.await,
            }
        }))
        .await;

        let mut merged = CoverageResult::new();
        for outcome in outcomes {
            merged.merge(&outcome?);
        }
        Ok(merged)
    }
}
