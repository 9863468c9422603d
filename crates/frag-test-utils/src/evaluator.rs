//! Synthetic evaluator
//!
//! Stands in for the instrumented subject. Coverage comes from a simulated
//! run in which every slot holds either nothing (`null` or unbound) or a
//! symbolic value: a digest of the operation that produced it and of that
//! operation's inputs. Mutating calls fold themselves into the state of the
//! objects they change. Two runs cover the same goals only if every
//! subject-touching call sees the same inputs, so dropping or misordering a
//! value-carrying step shows up as a coverage difference.

use async_trait::async_trait;
use frag_core::{AuxData, CoverageKind, CoverageResult, EvaluationFailure, Evaluator};
use frag_ir::{CanonicalFragment, Fingerprint, MethodId, Operation, Reference, Step, TypeKind, TypeModel};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Goal ids of methods start here; constructors use their own id
const METHOD_GOAL_BASE: u32 = 100;

/// Symbolic value of a slot; `None` is `null`
type Value = Option<u64>;

fn first_word(hash: &blake3::Hash) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(word)
}

fn digest(parts: &[u64]) -> u64 {
    let mut h = blake3::Hasher::new();
    for part in parts {
        h.update(&part.to_le_bytes());
    }
    first_word(&h.finalize())
}

fn constant_digest(text: &str) -> u64 {
    first_word(&blake3::hash(text.as_bytes()))
}

/// Unbound slots read as `null`
fn read(values: &HashMap<Reference, Value>, r: &Reference) -> Value {
    values.get(r).copied().flatten()
}

fn encode(value: Value) -> u64 {
    value.map_or(0, |v| v | 1)
}

/// Coverage of a simulated run of `steps`
///
/// A call runs when its receiver (if any) and every primitive operand hold
/// a value; a call that cannot run leaves `null` in its target. Every
/// subject-touching call that runs covers its method goal, one of two branch
/// goals depending on whether any argument is `null`, a line goal derived
/// from the values it was called with, and an exception goal when it carries
/// a recorded failure.
pub fn synthetic_coverage(steps: &[Step], model: &TypeModel) -> CoverageResult {
    let mut values: HashMap<Reference, Value> = HashMap::new();
    let mut coverage = CoverageResult::new();

    for step in steps {
        let (goal, receiver, params) = match &step.op {
            Operation::Reset => {
                values.clear();
                continue;
            }
            Operation::AssignConstant { target, value } => {
                values.insert(*target, value.map(|v| constant_digest(&format!("static {v}"))));
                continue;
            }
            Operation::AssignPrimitive { target, value } => {
                let v = value.as_ref().map(|v| constant_digest(&format!("literal {v:?}")));
                values.insert(*target, v);
                continue;
            }
            Operation::CreateObject {
                constructor, params, ..
            } => (constructor.0, None, params),
            Operation::Invoke {
                receiver,
                method,
                params,
                ..
            } => (METHOD_GOAL_BASE + method.0, *receiver, params),
        };

        let runs = receiver.map_or(true, |r| read(&values, &r).is_some())
            && params
                .iter()
                .filter(|p| model.kind_of(p.ty) == TypeKind::Primitive)
                .all(|p| read(&values, p).is_some());
        if !runs {
            if let Some(t) = step.op.target() {
                values.insert(t, None);
            }
            continue;
        }

        let mut inputs = vec![u64::from(goal)];
        inputs.extend(receiver.iter().map(|r| encode(read(&values, r))));
        inputs.extend(params.iter().map(|p| encode(read(&values, p))));
        let call = digest(&inputs);
        let null_argument = params.iter().any(|p| read(&values, p).is_none());

        for (n, slot) in step.op.mutated(model).into_iter().enumerate() {
            if let Some(state) = read(&values, &slot) {
                values.insert(slot, Some(digest(&[state, call, n as u64])));
            }
        }
        if let Some(t) = step.op.target() {
            values.insert(t, Some(digest(&[call, u64::MAX])));
        }
        if !step.op.touches_subject(model) {
            continue;
        }

        coverage.insert(CoverageKind::Method, goal);
        coverage.insert(CoverageKind::Branch, goal * 2 + u32::from(null_argument));
        coverage.insert(CoverageKind::Line, (call >> 32) as u32);
        if step.failure.is_some() {
            coverage.insert(CoverageKind::Exception, goal);
        }
    }
    coverage
}

/// Counting evaluator returning [`synthetic_coverage`]
#[derive(Debug, Default)]
pub struct SyntheticEvaluator {
    delay: Option<Duration>,
    fail_on: Option<MethodId>,
    panic_on: Option<MethodId>,
    submissions: AtomicUsize,
    per_fragment: Mutex<HashMap<Fingerprint, usize>>,
}

impl SyntheticEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every evaluation
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Report a crash for fragments calling `method`
    pub fn failing_on(mut self, method: MethodId) -> Self {
        self.fail_on = Some(method);
        self
    }

    /// Panic on fragments calling `method`
    pub fn panicking_on(mut self, method: MethodId) -> Self {
        self.panic_on = Some(method);
        self
    }

    /// Total evaluations started
    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    /// Evaluations started for one fragment
    pub fn submissions_of(&self, fingerprint: &Fingerprint) -> usize {
        self.per_fragment.lock().get(fingerprint).copied().unwrap_or(0)
    }

    /// Distinct fragments evaluated
    pub fn distinct_fragments(&self) -> usize {
        self.per_fragment.lock().len()
    }

    /// Largest number of evaluations of any single fragment
    pub fn max_submissions_per_fragment(&self) -> usize {
        self.per_fragment.lock().values().copied().max().unwrap_or(0)
    }
}

fn calls(fragment: &CanonicalFragment, target: MethodId) -> bool {
    fragment
        .steps()
        .iter()
        .any(|s| matches!(s.op, Operation::Invoke { method, .. } if method == target))
}

#[async_trait]
impl Evaluator for SyntheticEvaluator {
    async fn evaluate(
        &self,
        fragment: CanonicalFragment,
        _aux: AuxData,
    ) -> Result<CoverageResult, EvaluationFailure> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        *self.per_fragment.lock().entry(fragment.fingerprint()).or_insert(0) += 1;

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.panic_on.is_some_and(|m| calls(&fragment, m)) {
            panic!("synthetic evaluator panicked on {}", fragment.fingerprint().short());
        }
        if self.fail_on.is_some_and(|m| calls(&fragment, m)) {
            return Err(EvaluationFailure::crash(format!(
                "fragment {} crashed",
                fragment.fingerprint().short()
            )));
        }
        Ok(synthetic_coverage(fragment.steps(), fragment.model()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DemoModel;

    fn coverage(demo: &DemoModel, ops: Vec<Operation>) -> CoverageResult {
        synthetic_coverage(&demo.steps(ops), &demo.model)
    }

    #[test]
    fn null_receiver_covers_nothing() {
        let demo = DemoModel::new();
        assert!(coverage(&demo, vec![demo.null_stack(0), demo.pop(0)]).is_empty());
    }

    #[test]
    fn null_argument_takes_other_branch() {
        let demo = DemoModel::new();
        let with_value = coverage(
            &demo,
            vec![demo.new_stack(0), demo.boxed(0, Some(1)), demo.push_boxed(0, 0)],
        );
        let with_null = coverage(
            &demo,
            vec![demo.new_stack(0), demo.boxed(0, None), demo.push_boxed(0, 0)],
        );
        assert_ne!(with_value, with_null);
        assert_eq!(with_value.goals(CoverageKind::Method), with_null.goals(CoverageKind::Method));
    }

    #[test]
    fn failed_call_leaves_null_target() {
        let demo = DemoModel::new();
        let c = coverage(&demo, vec![demo.stack_of(0, 0), demo.pop(0)]);
        assert!(c.is_empty());
    }

    #[test]
    fn reset_forgets_bindings() {
        let demo = DemoModel::new();
        let c = coverage(&demo, vec![demo.new_stack(0), Operation::Reset, demo.pop(0)]);
        assert_eq!(c.goal_count(), 3);
    }

    #[test]
    fn argument_values_reach_line_goals() {
        let demo = DemoModel::new();
        let one = coverage(&demo, vec![demo.new_stack(0), demo.int(0, 1), demo.push(0, 0)]);
        let two = coverage(&demo, vec![demo.new_stack(0), demo.int(0, 2), demo.push(0, 0)]);
        assert_eq!(one.goals(CoverageKind::Method), two.goals(CoverageKind::Method));
        assert_eq!(one.goals(CoverageKind::Branch), two.goals(CoverageKind::Branch));
        assert_ne!(one.goals(CoverageKind::Line), two.goals(CoverageKind::Line));
    }

    #[test]
    fn dropping_an_overwrite_changes_coverage() {
        let demo = DemoModel::new();
        let full = vec![
            demo.new_stack(0),
            demo.int(0, 1),
            demo.push(0, 0),
            demo.int(0, 2),
            demo.push(0, 0),
        ];
        let mut dropped = full.clone();
        dropped.remove(3);
        assert_ne!(coverage(&demo, full), coverage(&demo, dropped));
    }

    #[test]
    fn observer_result_feeds_later_calls() {
        let demo = DemoModel::new();
        // i0 = s0.get(i0) twice reads different values the second time
        let twice = vec![
            demo.new_stack(0),
            demo.int(0, 1),
            demo.get(0, 0, 0),
            demo.get(0, 0, 0),
            demo.new_stack(1),
            demo.push(1, 0),
        ];
        let mut once = twice.clone();
        once.remove(3);
        assert_ne!(coverage(&demo, twice), coverage(&demo, once));
    }

    #[tokio::test]
    async fn counts_submissions() {
        let demo = DemoModel::new();
        let evaluator = SyntheticEvaluator::new();
        let fragment = CanonicalFragment::verbatim(&demo.test(vec![demo.new_stack(0)]));
        evaluator.evaluate(fragment.clone(), AuxData::new(0)).await.unwrap();
        evaluator.evaluate(fragment.clone(), AuxData::new(0)).await.unwrap();
        assert_eq!(evaluator.submissions(), 2);
        assert_eq!(evaluator.submissions_of(&fragment.fingerprint()), 2);
        assert_eq!(evaluator.distinct_fragments(), 1);
    }

    #[tokio::test]
    async fn injected_failure() {
        let demo = DemoModel::new();
        let evaluator = SyntheticEvaluator::new().failing_on(demo.pop);
        let fragment = CanonicalFragment::verbatim(&demo.test(vec![demo.new_stack(0), demo.pop(0)]));
        let err = evaluator.evaluate(fragment, AuxData::new(0)).await.unwrap_err();
        assert_eq!(err.kind, frag_core::FailureKind::Crash);
    }
}
