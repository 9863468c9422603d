//! Evaluator contract
//!
//! The evaluator runs one canonical fragment against the instrumented
//! subject and reports what it covered. It is supplied by the caller; this
//! crate only schedules it.

use crate::coverage::CoverageResult;
use async_trait::async_trait;
use frag_ir::CanonicalFragment;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Context passed alongside every submission
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuxData {
    /// Search generation that requested the evaluation
    pub generation: u64,
    /// Free-form labels forwarded to the evaluator
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl AuxData {
    /// Context for `generation`
    #[inline]
    #[must_use]
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            labels: BTreeMap::new(),
        }
    }

    /// With one more label
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// Why an evaluation produced no coverage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// The evaluation process died
    Crash,
    /// The evaluation did not finish in time
    Timeout,
    /// The evaluator refused the fragment
    Rejected,
    /// Scheduling failure on this side, including a panicking evaluator
    Internal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Crash => "crash",
            Self::Timeout => "timeout",
            Self::Rejected => "rejected",
            Self::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// Failed evaluation, delivered to every waiter of the fragment and never cached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind} evaluation failure: {message}")]
pub struct EvaluationFailure {
    /// Failure class
    pub kind: FailureKind,
    /// Human-readable detail
    pub message: String,
}

impl EvaluationFailure {
    /// Create a failure
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Evaluation process died
    pub fn crash(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Crash, message)
    }

    /// Evaluation timed out
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, message)
    }

    /// Evaluator refused the fragment
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Rejected, message)
    }

    /// Scheduling failure
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Internal, message)
    }
}

/// Runs canonical fragments and reports their coverage
#[async_trait]
pub trait Evaluator: Send + Sync + 'static {
    /// Evaluate one fragment
    ///
    /// # Errors
    /// Any [`EvaluationFailure`]; it reaches every caller waiting on this
    /// fragment and is not cached.
    async fn evaluate(
        &self,
        fragment: CanonicalFragment,
        aux: AuxData,
    ) -> Result<CoverageResult, EvaluationFailure>;
}

#[async_trait]
impl<E: Evaluator + ?Sized> Evaluator for std::sync::Arc<E> {
    async fn evaluate(
        &self,
        fragment: CanonicalFragment,
        aux: AuxData,
    ) -> Result<CoverageResult, EvaluationFailure> {
        (**self).evaluate(fragment, aux).await
    }
}
