//! Coverage results
//!
//! A [`CoverageResult`] is a set of covered goals per [`CoverageKind`].
//! Merging is per-kind set union, so it is commutative, associative and
//! idempotent: the combined coverage of a test does not depend on the order
//! in which its fragments finish.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Coverage criterion
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverageKind {
    /// Source lines
    Line,
    /// Branch outcomes
    Branch,
    /// Entered methods
    Method,
    /// Thrown exception types
    Exception,
}

impl fmt::Display for CoverageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Line => "line",
            Self::Branch => "branch",
            Self::Method => "method",
            Self::Exception => "exception",
        };
        f.write_str(name)
    }
}

/// Goals covered by one evaluation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoverageResult {
    goals: BTreeMap<CoverageKind, BTreeSet<u32>>,
}

impl CoverageResult {
    /// Nothing covered
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one goal
    pub fn insert(&mut self, kind: CoverageKind, goal: u32) {
        self.goals.entry(kind).or_default().insert(goal);
    }

    /// With one more goal
    #[must_use]
    pub fn with_goal(mut self, kind: CoverageKind, goal: u32) -> Self {
        self.insert(kind, goal);
        self
    }

    /// Union `other` into `self`
    pub fn merge(&mut self, other: &Self) {
        for (kind, goals) in &other.goals {
            self.goals
                .entry(*kind)
                .or_default()
                .extend(goals.iter().copied());
        }
    }

    /// Union of many results
    #[must_use]
    pub fn merged<'a>(results: impl IntoIterator<Item = &'a Self>) -> Self {
        let mut out = Self::new();
        for r in results {
            out.merge(r);
        }
        out
    }

    /// Whether `goal` of `kind` is covered
    #[inline]
    #[must_use]
    pub fn covers(&self, kind: CoverageKind, goal: u32) -> bool {
        self.goals.get(&kind).is_some_and(|g| g.contains(&goal))
    }

    /// Goals covered for one kind
    #[must_use]
    pub fn goals(&self, kind: CoverageKind) -> Option<&BTreeSet<u32>> {
        self.goals.get(&kind)
    }

    /// Total number of covered goals across all kinds
    #[must_use]
    pub fn goal_count(&self) -> usize {
        self.goals.values().map(BTreeSet::len).sum()
    }

    /// No goal covered
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.goal_count() == 0
    }

    /// Whether every goal of `other` is covered here
    #[must_use]
    pub fn includes(&self, other: &Self) -> bool {
        other.goals.iter().all(|(kind, goals)| {
            goals.is_empty()
                || self
                    .goals
                    .get(kind)
                    .is_some_and(|mine| goals.is_subset(mine))
        })
    }
}

impl fmt::Display for CoverageResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (kind, goals) in &self.goals {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{kind}: {}", goals.len())?;
        }
        if first {
            f.write_str("no goals")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn result(goals: &[(CoverageKind, u32)]) -> CoverageResult {
        goals
            .iter()
            .fold(CoverageResult::new(), |r, &(k, g)| r.with_goal(k, g))
    }

    #[test]
    fn merge_is_union() {
        let a = result(&[(CoverageKind::Line, 1), (CoverageKind::Method, 3)]);
        let b = result(&[(CoverageKind::Line, 2), (CoverageKind::Line, 1)]);
        let m = CoverageResult::merged([&a, &b]);
        assert_eq!(m.goal_count(), 3);
        assert!(m.covers(CoverageKind::Line, 2));
        assert!(m.includes(&a) && m.includes(&b));
        assert!(!a.includes(&m));
    }

    #[test]
    fn display_lists_kinds() {
        assert_eq!(CoverageResult::new().to_string(), "no goals");
        let r = result(&[(CoverageKind::Branch, 1), (CoverageKind::Line, 4)]);
        assert_eq!(r.to_string(), "line: 1, branch: 1");
    }

    fn arb_result() -> impl Strategy<Value = CoverageResult> {
        prop::collection::vec((0u8..4, 0u32..16), 0..12).prop_map(|goals| {
            let mut r = CoverageResult::new();
            for (k, g) in goals {
                let kind = match k {
                    0 => CoverageKind::Line,
                    1 => CoverageKind::Branch,
                    2 => CoverageKind::Method,
                    _ => CoverageKind::Exception,
                };
                r.insert(kind, g);
            }
            r
        })
    }

    proptest! {
        #[test]
        fn merge_is_commutative_associative_idempotent(
            a in arb_result(),
            b in arb_result(),
            c in arb_result(),
        ) {
            prop_assert_eq!(CoverageResult::merged([&a, &b]), CoverageResult::merged([&b, &a]));
            let ab_c = CoverageResult::merged([&CoverageResult::merged([&a, &b]), &c]);
            let a_bc = CoverageResult::merged([&a, &CoverageResult::merged([&b, &c])]);
            prop_assert_eq!(ab_c, a_bc);
            prop_assert_eq!(CoverageResult::merged([&a, &a]), a);
        }
    }
}
