//! Tests, fragments and canonical fragments
//!
//! - [`Test`]: a validated candidate program handed over by the search layer
//! - [`Fragment`]: an independent sub-sequence of a test, before canonicalization
//! - [`CanonicalFragment`]: the normal form of a fragment, used as a cache key

use crate::error::IrError;
use crate::fingerprint::Fingerprint;
use crate::model::TypeModel;
use crate::operation::{OpId, Operation, Step};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A candidate test: ordered steps over a shared type model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Test {
    model: Arc<TypeModel>,
    steps: Vec<Step>,
}

impl Test {
    /// Validate and wrap a step sequence
    ///
    /// # Errors
    /// - [`IrError::DuplicateOperation`] if two steps share an id
    /// - [`IrError::UnknownType`] / [`IrError::DanglingSlot`] for references
    ///   outside the model's pools
    /// - [`IrError::Malformed`] for operations that do not match the model
    pub fn new(model: Arc<TypeModel>, steps: Vec<Step>) -> Result<Self, IrError> {
        let mut seen = HashSet::with_capacity(steps.len());
        for step in &steps {
            if !seen.insert(step.id) {
                return Err(IrError::DuplicateOperation(step.id));
            }
            for reference in step.op.target().into_iter().chain(step.op.uses()) {
                let info = model.type_info(reference.ty).ok_or(IrError::UnknownType {
                    op: step.id,
                    reference,
                })?;
                if reference.slot >= info.slots {
                    return Err(IrError::DanglingSlot {
                        op: step.id,
                        reference,
                        pool: info.slots,
                    });
                }
            }
            if let Some(reason) = step.op.malformation(&model) {
                return Err(IrError::malformed(step.id, reason));
            }
        }
        Ok(Self { model, steps })
    }

    /// Build a test from bare operations, numbering them in order
    ///
    /// # Errors
    /// Same as [`Test::new`]
    pub fn from_operations(
        model: Arc<TypeModel>,
        ops: impl IntoIterator<Item = Operation>,
    ) -> Result<Self, IrError> {
        let steps = ops
            .into_iter()
            .enumerate()
            .map(|(i, op)| Step::new(OpId(u32::try_from(i).unwrap_or(u32::MAX)), op))
            .collect();
        Self::new(model, steps)
    }

    /// Shared type model
    #[inline]
    #[must_use]
    pub fn model(&self) -> &Arc<TypeModel> {
        &self.model
    }

    /// Steps in execution order
    #[inline]
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Number of steps
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// No steps
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// The whole test as a single fragment
    #[must_use]
    pub fn to_fragment(&self) -> Fragment {
        Fragment::new(Arc::clone(&self.model), self.steps.clone())
    }
}

/// An independent sub-sequence of a test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    model: Arc<TypeModel>,
    steps: Vec<Step>,
}

impl Fragment {
    /// Wrap steps produced by a splitter or a pipeline pass
    #[inline]
    #[must_use]
    pub fn new(model: Arc<TypeModel>, steps: Vec<Step>) -> Self {
        Self { model, steps }
    }

    /// Shared type model
    #[inline]
    #[must_use]
    pub fn model(&self) -> &Arc<TypeModel> {
        &self.model
    }

    /// Steps in execution order
    #[inline]
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Take the steps out
    #[inline]
    #[must_use]
    pub fn into_steps(self) -> Vec<Step> {
        self.steps
    }

    /// Number of steps
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// No steps
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[derive(Serialize)]
struct KeyView<'a> {
    subject: &'a str,
    canonical: bool,
    steps: &'a [Step],
}

/// Normal form of a fragment
///
/// Equality is content equality over the subject name and steps; hashing
/// uses the precomputed fingerprint.
#[derive(Clone)]
pub struct CanonicalFragment {
    model: Arc<TypeModel>,
    steps: Arc<[Step]>,
    canonical: bool,
    fingerprint: Fingerprint,
}

impl CanonicalFragment {
    /// Wrap the fixed point of a canonicalization pipeline
    #[must_use]
    pub fn from_canonical(model: Arc<TypeModel>, steps: Vec<Step>) -> Self {
        Self::build(model, steps, true)
    }

    /// Wrap a test without canonicalizing it, for runs that bypass coalescing
    #[must_use]
    pub fn verbatim(test: &Test) -> Self {
        Self::build(Arc::clone(test.model()), test.steps().to_vec(), false)
    }

    fn build(model: Arc<TypeModel>, steps: Vec<Step>, canonical: bool) -> Self {
        let view = KeyView {
            subject: model.subject_name(),
            canonical,
            steps: &steps,
        };
        // Steps hold only integers, strings and enums, which always serialize.
        let fingerprint = Fingerprint::compute_serializable(&view)
            .unwrap_or_else(|_| Fingerprint::compute(format!("{steps:?}").as_bytes()));
        Self {
            model,
            steps: steps.into(),
            canonical,
            fingerprint,
        }
    }

    /// Shared type model
    #[inline]
    #[must_use]
    pub fn model(&self) -> &Arc<TypeModel> {
        &self.model
    }

    /// Steps in canonical order
    #[inline]
    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Content fingerprint
    #[inline]
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// `false` for fragments built with [`CanonicalFragment::verbatim`]
    #[inline]
    #[must_use]
    pub fn is_canonical(&self) -> bool {
        self.canonical
    }

    /// Number of steps
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// No steps
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Back to an ordinary fragment
    #[must_use]
    pub fn to_fragment(&self) -> Fragment {
        Fragment::new(Arc::clone(&self.model), self.steps.to_vec())
    }
}

impl PartialEq for CanonicalFragment {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint == other.fingerprint
            && self.canonical == other.canonical
            && self.model.subject_name() == other.model.subject_name()
            && self.steps == other.steps
    }
}

impl Eq for CanonicalFragment {}

impl Hash for CanonicalFragment {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fingerprint.hash(state);
    }
}

impl fmt::Debug for CanonicalFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CanonicalFragment")
            .field("subject", &self.model.subject_name())
            .field("fingerprint", &self.fingerprint.short())
            .field("canonical", &self.canonical)
            .field("steps", &self.steps)
            .finish()
    }
}
