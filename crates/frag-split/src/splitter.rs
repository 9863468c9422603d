//! Test splitting
//!
//! Splits a [`Test`] into the independent [`Fragment`]s whose union
//! reproduces the coverage-relevant effect of the original.

use crate::observer::{ObserverIndex, ObserverKey};
use crate::tracker::{DependencyTracker, LiveSet};
use frag_ir::{Fragment, Operation, Reference, Step, Test, TypeModel};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Splitter configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitOptions {
    /// Merge repeated read-only calls into aliases
    pub observer_merging: bool,
}

impl SplitOptions {
    /// Default options (no observer merging)
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With observer merging
    #[inline]
    #[must_use]
    pub fn with_observer_merging(mut self, enabled: bool) -> Self {
        self.observer_merging = enabled;
        self
    }
}

/// Fragments of one test plus bookkeeping counters
#[derive(Debug, Clone)]
pub struct SplitReport {
    /// Independent fragments, ordered by their first step
    pub fragments: Vec<Fragment>,
    /// Observer calls represented as aliases
    pub merged_observers: usize,
    /// Candidate sets dropped as scaffolding or as contained in another fragment
    pub discarded: usize,
}

/// Splits tests into independent fragments
#[derive(Debug, Clone, Copy, Default)]
pub struct Splitter {
    options: SplitOptions,
}

impl Splitter {
    /// Create splitter
    #[inline]
    #[must_use]
    pub fn new(options: SplitOptions) -> Self {
        Self { options }
    }

    /// Configured options
    #[inline]
    #[must_use]
    pub fn options(&self) -> SplitOptions {
        self.options
    }

    /// Split a test into independent fragments
    #[must_use]
    pub fn split(&self, test: &Test) -> Vec<Fragment> {
        self.split_detailed(test).fragments
    }

    /// Split a test, reporting how many observers were merged and how many
    /// candidate sets were dropped
    #[must_use]
    pub fn split_detailed(&self, test: &Test) -> SplitReport {
        let model = test.model();
        let interesting = test
            .steps()
            .iter()
            .map(|step| step.op.touches_subject(model))
            .collect();
        let mut run = SplitRun::new(model, interesting, self.options);
        for (position, step) in test.steps().iter().enumerate() {
            run.step(position, step);
        }
        let report = run.finish(model);
        tracing::debug!(
            steps = test.len(),
            fragments = report.fragments.len(),
            merged = report.merged_observers,
            discarded = report.discarded,
            "split test"
        );
        report
    }
}

/// State of one pass over a test
struct SplitRun<'m> {
    model: &'m TypeModel,
    options: SplitOptions,
    tracker: DependencyTracker,
    observers: ObserverIndex,
    /// Steps with alias-resolved operands, `None` until visited
    rewritten: Vec<Option<Step>>,
}

impl<'m> SplitRun<'m> {
    fn new(model: &'m TypeModel, interesting: Vec<bool>, options: SplitOptions) -> Self {
        let len = interesting.len();
        Self {
            model,
            options,
            tracker: DependencyTracker::new(interesting),
            observers: ObserverIndex::new(),
            rewritten: vec![None; len],
        }
    }

    fn step(&mut self, position: usize, step: &Step) {
        let mut step = step.clone();
        step.op.map_uses(|r| self.observers.resolve(r));

        match &step.op {
            Operation::Reset => {
                self.tracker.barrier();
                self.observers.clear();
            }
            Operation::AssignConstant { target, .. } | Operation::AssignPrimitive { target, .. } => {
                let target = *target;
                self.write(&[target], &LiveSet::from([position]));
            }
            Operation::CreateObject { .. } | Operation::Invoke { .. } => {
                if !self.try_merge_observer(position, &step) {
                    self.call(position, &step);
                }
            }
        }
        self.rewritten[position] = Some(step);
    }

    fn call(&mut self, position: usize, step: &Step) {
        let set = self.tracker.gather(step.op.uses(), position);
        let defs = step.op.defs(self.model);
        if defs.is_empty() {
            self.tracker.detach(set);
        } else {
            self.write(&defs, &set);
        }
        // A call that failed, or that overwrote one of its own operands,
        // cannot stand in for a later call with the same key.
        if self.options.observer_merging && step.failure.is_none() {
            if let Some((key, target)) = observer_key(self.model, &step.op) {
                if !defs.iter().any(|&d| key.mentions(d)) {
                    self.observers.record(key, target);
                }
            }
        }
    }

    /// Represent a repeated observer call as an alias of the earlier result
    fn try_merge_observer(&mut self, position: usize, step: &Step) -> bool {
        if !self.options.observer_merging || step.failure.is_some() {
            return false;
        }
        let Some((key, target)) = observer_key(self.model, &step.op) else {
            return false;
        };
        let Some(origin) = self.observers.lookup(&key) else {
            return false;
        };
        if origin.ty != target.ty {
            return false;
        }
        if origin == target {
            // Same call, same slot: the binding already holds this value.
            return true;
        }

        let mut materialized = self
            .tracker
            .live_set(origin)
            .cloned()
            .unwrap_or_default();
        materialized.insert(position);

        self.materialize_dependents(target);
        self.tracker.unbind(target);
        self.observers.add_alias(target, origin, &key, materialized);
        tracing::trace!(%target, %origin, position, "merged observer call");
        true
    }

    /// Bind `set` to `slots`, first giving invalidated aliases their own value
    fn write(&mut self, slots: &[Reference], set: &LiveSet) {
        for &slot in slots {
            self.materialize_dependents(slot);
        }
        self.tracker.bind(slots, set);
    }

    fn materialize_dependents(&mut self, written: Reference) {
        for (alias, live) in self.observers.invalidate(written) {
            tracing::trace!(%alias, %written, "alias invalidated");
            self.tracker.bind(&[alias], &live);
        }
    }

    fn finish(self, model: &Arc<TypeModel>) -> SplitReport {
        let merged_observers = self.observers.merged();
        let (sets, discarded) = self.tracker.finish();
        let fragments = sets
            .into_iter()
            .map(|set| {
                let steps = set
                    .into_iter()
                    .filter_map(|i| self.rewritten.get(i).cloned().flatten())
                    .collect();
                Fragment::new(Arc::clone(model), steps)
            })
            .collect();
        SplitReport {
            fragments,
            merged_observers,
            discarded,
        }
    }
}

fn observer_key(model: &TypeModel, op: &Operation) -> Option<(ObserverKey, Reference)> {
    match op {
        Operation::Invoke {
            target: Some(target),
            receiver: Some(receiver),
            method,
            params,
        } if op.is_observer_call(model) => Some((
            ObserverKey {
                receiver: *receiver,
                method: *method,
                params: params.clone(),
            },
            *target,
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frag_test_utils::DemoModel;
    use pretty_assertions::assert_eq;

    fn ids(fragment: &Fragment) -> Vec<u32> {
        fragment.steps().iter().map(|s| s.id.0).collect()
    }

    #[test]
    fn independent_objects_split_apart() {
        let demo = DemoModel::new();
        let test = demo.test(vec![
            demo.new_stack(0),
            demo.new_stack(1),
            demo.int(0, 5),
            demo.push(0, 0),
            demo.push(1, 0),
        ]);
        let fragments = Splitter::default().split(&test);
        let got: Vec<_> = fragments.iter().map(ids).collect();
        assert_eq!(got, vec![vec![0, 2, 3], vec![1, 2, 4]]);
    }

    #[test]
    fn pure_scaffolding_is_dropped() {
        let demo = DemoModel::new();
        let test = demo.test(vec![demo.int(0, 1), demo.int(1, 2), demo.new_stack(0)]);
        let report = Splitter::default().split_detailed(&test);
        assert_eq!(report.fragments.iter().map(ids).collect::<Vec<_>>(), vec![vec![2]]);
        assert_eq!(report.discarded, 2);
    }

    #[test]
    fn observer_merging_aliases_repeated_read() {
        let demo = DemoModel::new();
        let test = demo.test(vec![demo.new_stack(0), demo.size(0, 0), demo.size(1, 0)]);

        let merged = Splitter::new(SplitOptions::new().with_observer_merging(true));
        let report = merged.split_detailed(&test);
        assert_eq!(report.fragments.iter().map(ids).collect::<Vec<_>>(), vec![vec![0, 1]]);
        assert_eq!(report.merged_observers, 1);

        let plain = Splitter::default().split(&test);
        assert_eq!(plain.len(), 2);
    }

    #[test]
    fn alias_use_is_rewritten_to_origin() {
        let demo = DemoModel::new();
        // s0 = new; n0 = s0.size(); n1 = s0.size(); s1 = new; s1.push(n1)
        let test = demo.test(vec![
            demo.new_stack(0),
            demo.size(0, 0),
            demo.size(1, 0),
            demo.new_stack(1),
            demo.push(1, 1),
        ]);
        let splitter = Splitter::new(SplitOptions::new().with_observer_merging(true));
        let fragments = splitter.split(&test);
        assert_eq!(fragments.len(), 1);
        let last = fragments[0].steps().last().unwrap();
        assert_eq!(last.op, demo.push(1, 0));
    }

    #[test]
    fn mutation_invalidates_alias() {
        let demo = DemoModel::new();
        // s0 = new; n0 = s0.size(); n1 = s0.size(); s0.push(n0); s1 = new; s1.push(n1)
        let test = demo.test(vec![
            demo.new_stack(0),
            demo.size(0, 0),
            demo.size(1, 0),
            demo.push(0, 0),
            demo.new_stack(1),
            demo.push(1, 1),
        ]);
        let splitter = Splitter::new(SplitOptions::new().with_observer_merging(true));
        let fragments = splitter.split(&test);
        let got: Vec<_> = fragments.iter().map(ids).collect();
        assert_eq!(got, vec![vec![0, 1, 2, 4, 5], vec![0, 1, 3]]);
        // The merged call is materialized with its own target.
        let tail = fragments[0].steps().last().unwrap();
        assert_eq!(tail.op, demo.push(1, 1));
    }

    #[test]
    fn observer_overwriting_its_argument_is_not_merged() {
        let demo = DemoModel::new();
        // s0 = new; i0 = 1; i0 = s0.get(i0); i0 = s0.get(i0); s1 = new; s1.push(i0)
        let test = demo.test(vec![
            demo.new_stack(0),
            demo.int(0, 1),
            demo.get(0, 0, 0),
            demo.get(0, 0, 0),
            demo.new_stack(1),
            demo.push(1, 0),
        ]);
        let plain = Splitter::default().split(&test);
        let merged = Splitter::new(SplitOptions::new().with_observer_merging(true)).split_detailed(&test);
        assert_eq!(merged.merged_observers, 0);
        assert_eq!(merged.fragments.iter().map(ids).collect::<Vec<_>>(), vec![vec![0, 1, 2, 3, 4, 5]]);
        assert_eq!(merged.fragments, plain);
    }

    #[test]
    fn observer_with_fresh_target_is_merged() {
        let demo = DemoModel::new();
        // s0 = new; i0 = 1; i1 = s0.get(i0); i2 = s0.get(i0); s1 = new; s1.push(i2)
        let test = demo.test(vec![
            demo.new_stack(0),
            demo.int(0, 1),
            demo.get(1, 0, 0),
            demo.get(2, 0, 0),
            demo.new_stack(1),
            demo.push(1, 2),
        ]);
        let splitter = Splitter::new(SplitOptions::new().with_observer_merging(true));
        let report = splitter.split_detailed(&test);
        assert_eq!(report.merged_observers, 1);
        assert_eq!(report.fragments.iter().map(ids).collect::<Vec<_>>(), vec![vec![0, 1, 2, 4, 5]]);
        let tail = report.fragments[0].steps().last().unwrap();
        assert_eq!(tail.op, demo.push(1, 1));
    }

    #[test]
    fn failed_observer_is_not_merged() {
        let demo = DemoModel::new();
        let mut steps = demo.steps(vec![demo.new_stack(0), demo.size(0, 0), demo.size(1, 0)]);
        steps[1] = steps[1].clone().with_failure("java.lang.IllegalStateException");
        let test = demo.test_steps(steps);
        let splitter = Splitter::new(SplitOptions::new().with_observer_merging(true));
        let report = splitter.split_detailed(&test);
        assert_eq!(report.merged_observers, 0);
        assert_eq!(report.fragments.len(), 2);
    }

    #[test]
    fn reset_separates_dependent_operations() {
        let demo = DemoModel::new();
        let test = demo.test(vec![demo.new_stack(0), Operation::Reset, demo.pop(0)]);
        let fragments = Splitter::default().split(&test);
        assert_eq!(fragments.iter().map(ids).collect::<Vec<_>>(), vec![vec![0], vec![2]]);

        let joined = demo.test(vec![demo.new_stack(0), demo.pop(0)]);
        assert_eq!(Splitter::default().split(&joined).len(), 1);
    }
}
