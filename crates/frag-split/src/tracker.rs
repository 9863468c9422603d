//! Live-set dependency tracking
//!
//! The [`DependencyTracker`] maps every bound reference slot to the set of
//! step positions that produced the value it currently holds. When a slot
//! is rebound, or at a barrier, the superseded sets become candidate
//! fragments.

use frag_ir::Reference;
use std::collections::{BTreeSet, HashMap};

/// Step positions transitively responsible for a value
pub type LiveSet = BTreeSet<usize>;

/// Per-slot live sets plus the fragments flushed so far
#[derive(Debug)]
pub struct DependencyTracker {
    /// Per-position "touches the subject type" flag
    interesting: Vec<bool>,
    bindings: HashMap<Reference, LiveSet>,
    /// Sets produced by calls that bind nothing
    detached: Vec<LiveSet>,
    emitted: Vec<LiveSet>,
    discarded: usize,
}

impl DependencyTracker {
    /// Tracker for a test whose step `i` touches the subject iff `interesting[i]`
    #[must_use]
    pub fn new(interesting: Vec<bool>) -> Self {
        Self {
            interesting,
            bindings: HashMap::new(),
            detached: Vec::new(),
            emitted: Vec::new(),
            discarded: 0,
        }
    }

    /// Live set currently bound to `slot`
    #[inline]
    #[must_use]
    pub fn live_set(&self, slot: Reference) -> Option<&LiveSet> {
        self.bindings.get(&slot)
    }

    /// Union of the live sets of `operands` plus `position`
    #[must_use]
    pub fn gather(&self, operands: impl IntoIterator<Item = Reference>, position: usize) -> LiveSet {
        let mut set = LiveSet::new();
        for slot in operands {
            if let Some(live) = self.bindings.get(&slot) {
                set.extend(live.iter().copied());
            }
        }
        set.insert(position);
        set
    }

    /// Bind `set` to every slot in `slots`, flushing the sets they held
    pub fn bind(&mut self, slots: &[Reference], set: &LiveSet) {
        let mut previous = Vec::with_capacity(slots.len());
        for &slot in slots {
            if let Some(old) = self.bindings.insert(slot, set.clone()) {
                previous.push(old);
            }
        }
        for old in previous {
            self.flush_candidate(old);
        }
    }

    /// Drop the binding of `slot`, flushing the set it held
    pub fn unbind(&mut self, slot: Reference) {
        if let Some(old) = self.bindings.remove(&slot) {
            self.flush_candidate(old);
        }
    }

    /// Keep a set that no slot holds until the next barrier
    pub fn detach(&mut self, set: LiveSet) {
        self.detached.push(set);
    }

    /// Flush every live and detached set and clear all bindings
    pub fn barrier(&mut self) {
        let mut pending: Vec<LiveSet> = self.bindings.drain().map(|(_, set)| set).collect();
        pending.append(&mut self.detached);
        pending.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        pending.dedup();

        let mut kept: Vec<LiveSet> = Vec::with_capacity(pending.len());
        for set in pending {
            if kept.iter().any(|k| set.is_subset(k)) {
                continue;
            }
            kept.push(set);
        }
        for set in kept {
            self.emit(set);
        }
    }

    /// Final barrier, then drop every fragment contained in another one
    #[must_use]
    pub fn finish(mut self) -> (Vec<LiveSet>, usize) {
        self.barrier();
        let mut emitted = std::mem::take(&mut self.emitted);
        emitted.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        emitted.dedup();

        let mut kept: Vec<LiveSet> = Vec::with_capacity(emitted.len());
        for set in emitted {
            if kept.iter().any(|k| set.is_subset(k)) {
                self.discarded += 1;
                continue;
            }
            kept.push(set);
        }
        kept.sort_by_key(|s| s.first().copied());
        (kept, self.discarded)
    }

    /// Emit a superseded set unless a live set still owns it
    fn flush_candidate(&mut self, set: LiveSet) {
        let owned = self
            .bindings
            .values()
            .chain(self.detached.iter())
            .any(|live| set.is_subset(live));
        if owned {
            return;
        }
        self.emit(set);
    }

    fn emit(&mut self, set: LiveSet) {
        let interesting = set
            .iter()
            .any(|&i| self.interesting.get(i).copied().unwrap_or(false));
        if interesting {
            self.emitted.push(set);
        } else {
            self.discarded += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use frag_ir::TypeIdx;

    fn r(slot: u32) -> Reference {
        Reference::new(TypeIdx(0), slot)
    }

    fn set(items: &[usize]) -> LiveSet {
        items.iter().copied().collect()
    }

    #[test]
    fn rebinding_flushes_unowned_set() {
        let mut t = DependencyTracker::new(vec![true; 4]);
        t.bind(&[r(0)], &set(&[0]));
        t.bind(&[r(0)], &set(&[1]));
        let (fragments, _) = t.finish();
        assert_eq!(fragments, vec![set(&[0]), set(&[1])]);
    }

    #[test]
    fn rebinding_keeps_set_owned_by_new_value() {
        let mut t = DependencyTracker::new(vec![true; 4]);
        t.bind(&[r(0)], &set(&[0]));
        t.bind(&[r(0)], &set(&[0, 1]));
        let (fragments, _) = t.finish();
        assert_eq!(fragments, vec![set(&[0, 1])]);
    }

    #[test]
    fn uninteresting_sets_are_discarded() {
        let mut t = DependencyTracker::new(vec![false, true]);
        t.bind(&[r(0)], &set(&[0]));
        t.bind(&[r(1)], &set(&[1]));
        let (fragments, discarded) = t.finish();
        assert_eq!(fragments, vec![set(&[1])]);
        assert_eq!(discarded, 1);
    }

    #[test]
    fn barrier_emits_maximal_sets_once() {
        let mut t = DependencyTracker::new(vec![true; 4]);
        t.bind(&[r(0)], &set(&[0]));
        t.bind(&[r(1), r(2)], &set(&[0, 1]));
        t.barrier();
        assert!(t.live_set(r(0)).is_none());
        let (fragments, _) = t.finish();
        assert_eq!(fragments, vec![set(&[0, 1])]);
    }

    #[test]
    fn gather_unions_operand_sets() {
        let mut t = DependencyTracker::new(vec![true; 4]);
        t.bind(&[r(0)], &set(&[0]));
        t.bind(&[r(1)], &set(&[1]));
        assert_eq!(t.gather([r(0), r(1), r(9)], 3), set(&[0, 1, 3]));
    }
}
