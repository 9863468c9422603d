//! Canonical ordering
//!
//! Within each `Reset`-delimited segment, steps are reordered into the least
//! linear extension of their dependency order. Two steps depend on each
//! other when one writes a slot the other reads or writes, when both touch
//! static state and at least one of them writes it, or when both carry a
//! recorded failure. Steps the model cannot describe depend on everything.
//!
//! Ready steps are ranked by their [`SortKey`], then by a structural colour
//! obtained by iterated refinement over the dependency graph (each step's
//! colour absorbs its producers' and consumers' colours together with the
//! operand positions that connect them). Both are independent of slot
//! numbering and of the input order, so equivalent fragments are emitted in
//! the same order. Operand slots and input position only separate steps that
//! are structurally indistinguishable.

use crate::error::CanonError;
use crate::pass::{is_malformed, Pass};
use frag_ir::{Literal, Operands, Operation, Reference, Step, TypeModel};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

type Colour = [u8; 32];

/// Reorders independent steps canonically
#[derive(Debug, Clone, Copy, Default)]
pub struct CanonicalOrder;

impl CanonicalOrder {
    /// Create pass
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Pass for CanonicalOrder {
    fn name(&self) -> &'static str {
        "canonical-order"
    }

    fn apply(&self, steps: Vec<Step>, model: &TypeModel) -> Result<Vec<Step>, CanonError> {
        let mut out = Vec::with_capacity(steps.len());
        let mut segment = Vec::new();
        for step in steps {
            if matches!(step.op, Operation::Reset) {
                out.extend(order_segment(std::mem::take(&mut segment), model));
                out.push(step);
            } else {
                segment.push(step);
            }
        }
        out.extend(order_segment(segment, model));
        Ok(out)
    }
}

/// Numbering-independent description of a step
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SortKey {
    kind: u8,
    member: String,
    target_type: String,
    literal: Option<Literal>,
    params: Vec<String>,
    failure: Option<String>,
}

impl SortKey {
    /// Key of `step`
    #[must_use]
    pub fn of(step: &Step, model: &TypeModel) -> Self {
        let op = &step.op;
        let member = match op {
            Operation::Reset | Operation::AssignPrimitive { .. } => String::new(),
            Operation::AssignConstant { value: None, .. } => "null".to_owned(),
            Operation::AssignConstant {
                value: Some(id), ..
            } => model.static_value(*id).map_or_else(
                || id.to_string(),
                |s| format!("{}.{}", model.type_name(s.declaring), s.name),
            ),
            Operation::CreateObject { constructor, .. } => model
                .constructor(*constructor)
                .map_or_else(|| constructor.to_string(), |c| {
                    format!("new {}", model.type_name(c.declaring))
                }),
            Operation::Invoke { method, .. } => model.method(*method).map_or_else(
                || method.to_string(),
                |m| format!("{}.{}", model.type_name(m.declaring), m.name),
            ),
        };
        let literal = match op {
            Operation::AssignPrimitive { value, .. } => value.clone(),
            _ => None,
        };
        Self {
            kind: op.kind_rank(),
            member,
            target_type: op
                .target()
                .map_or_else(String::new, |t| model.type_name(t.ty).to_owned()),
            literal,
            params: op
                .uses()
                .iter()
                .map(|r| model.type_name(r.ty).to_owned())
                .collect(),
            failure: step.failure.clone(),
        }
    }

    fn digest(&self) -> Colour {
        let mut h = blake3::Hasher::new();
        h.update(&[self.kind]);
        feed_str(&mut h, &self.member);
        feed_str(&mut h, &self.target_type);
        match &self.literal {
            None => {
                h.update(&[0xff]);
            }
            Some(Literal::Bool(b)) => {
                h.update(&[0, u8::from(*b)]);
            }
            Some(Literal::Int(i)) => {
                h.update(&[1]);
                h.update(&i.to_le_bytes());
            }
            Some(Literal::Float(bits)) => {
                h.update(&[2]);
                h.update(&bits.to_le_bytes());
            }
            Some(Literal::Char(c)) => {
                h.update(&[3]);
                h.update(&u32::from(*c).to_le_bytes());
            }
            Some(Literal::Str(s)) => {
                h.update(&[4]);
                feed_str(&mut h, s);
            }
        }
        h.update(&(self.params.len() as u64).to_le_bytes());
        for p in &self.params {
            feed_str(&mut h, p);
        }
        if let Some(f) = &self.failure {
            h.update(&[1]);
            feed_str(&mut h, f);
        } else {
            h.update(&[0]);
        }
        *h.finalize().as_bytes()
    }
}

fn feed_str(h: &mut blake3::Hasher, s: &str) {
    h.update(&(s.len() as u64).to_le_bytes());
    h.update(s.as_bytes());
}

/// What a step reads and writes, for conflict detection
struct Access {
    defs: Operands,
    uses: Operands,
    /// `Some(writes)` for static calls
    statics: Option<bool>,
    failure: bool,
    barrier: bool,
}

impl Access {
    fn of(step: &Step, model: &TypeModel) -> Self {
        Self {
            defs: step.op.defs(model),
            uses: step.op.uses(),
            statics: step
                .op
                .is_static_call()
                .then(|| !step.op.is_pure(model)),
            failure: step.failure.is_some(),
            barrier: matches!(step.op, Operation::Reset) || is_malformed(step, model),
        }
    }
}

/// How `earlier` and `later` constrain each other; empty when independent
fn conflict_labels(earlier: &Access, later: &Access) -> Vec<(u8, u8, u8)> {
    fn idx(i: usize) -> u8 {
        u8::try_from(i).unwrap_or(u8::MAX)
    }
    let mut labels = Vec::new();
    for (x, d) in earlier.defs.iter().enumerate() {
        for (y, u) in later.uses.iter().enumerate() {
            if d == u {
                labels.push((1, idx(x), idx(y)));
            }
        }
        for (y, d2) in later.defs.iter().enumerate() {
            if d == d2 {
                labels.push((2, idx(x), idx(y)));
            }
        }
    }
    for (x, u) in earlier.uses.iter().enumerate() {
        for (y, d) in later.defs.iter().enumerate() {
            if u == d {
                labels.push((3, idx(x), idx(y)));
            }
        }
    }
    if let (Some(a), Some(b)) = (earlier.statics, later.statics) {
        if a || b {
            labels.push((4, u8::from(a), u8::from(b)));
        }
    }
    if earlier.failure && later.failure {
        labels.push((5, 0, 0));
    }
    if earlier.barrier || later.barrier {
        labels.push((6, 0, 0));
    }
    labels
}

/// Whether swapping two adjacent steps preserves the fragment's meaning
#[must_use]
pub fn independent(a: &Step, b: &Step, model: &TypeModel) -> bool {
    conflict_labels(&Access::of(a, model), &Access::of(b, model)).is_empty()
}

fn label_digest(labels: &[(u8, u8, u8)]) -> Colour {
    let mut h = blake3::Hasher::new();
    for &(k, x, y) in labels {
        h.update(&[k, x, y]);
    }
    *h.finalize().as_bytes()
}

fn distinct(colours: &[Colour]) -> usize {
    colours.iter().collect::<HashSet<_>>().len()
}

fn refine(colours: &mut Vec<Colour>, preds: &[Vec<(usize, Colour)>], succs: &[Vec<(usize, Colour)>]) {
    let n = colours.len();
    let mut classes = distinct(colours);
    for _ in 0..n {
        let next: Vec<Colour> = (0..n)
            .map(|i| {
                let mut ins: Vec<(Colour, Colour)> =
                    preds[i].iter().map(|&(p, l)| (l, colours[p])).collect();
                let mut outs: Vec<(Colour, Colour)> =
                    succs[i].iter().map(|&(s, l)| (l, colours[s])).collect();
                ins.sort_unstable();
                outs.sort_unstable();

                let mut h = blake3::Hasher::new();
                h.update(&colours[i]);
                h.update(&(ins.len() as u64).to_le_bytes());
                for (l, c) in &ins {
                    h.update(l);
                    h.update(c);
                }
                h.update(&(outs.len() as u64).to_le_bytes());
                for (l, c) in &outs {
                    h.update(l);
                    h.update(c);
                }
                *h.finalize().as_bytes()
            })
            .collect();
        let refined = distinct(&next);
        *colours = next;
        if refined <= classes {
            break;
        }
        classes = refined;
    }
}

#[derive(PartialEq, Eq, PartialOrd, Ord)]
struct Ready {
    key: SortKey,
    colour: Colour,
    slots: Vec<Reference>,
    position: usize,
}

fn order_segment(steps: Vec<Step>, model: &TypeModel) -> Vec<Step> {
    let n = steps.len();
    if n < 2 {
        return steps;
    }

    let keys: Vec<SortKey> = steps.iter().map(|s| SortKey::of(s, model)).collect();
    let access: Vec<Access> = steps.iter().map(|s| Access::of(s, model)).collect();

    let mut preds: Vec<Vec<(usize, Colour)>> = vec![Vec::new(); n];
    let mut succs: Vec<Vec<(usize, Colour)>> = vec![Vec::new(); n];
    for i in 0..n {
        for j in i + 1..n {
            let labels = conflict_labels(&access[i], &access[j]);
            if labels.is_empty() {
                continue;
            }
            let l = label_digest(&labels);
            succs[i].push((j, l));
            preds[j].push((i, l));
        }
    }

    let mut colours: Vec<Colour> = keys.iter().map(SortKey::digest).collect();
    refine(&mut colours, &preds, &succs);

    let mut pending: Vec<usize> = preds.iter().map(Vec::len).collect();
    let mut heap = BinaryHeap::new();
    let ready = |i: usize| {
        let step: &Step = &steps[i];
        Reverse(Ready {
            key: keys[i].clone(),
            colour: colours[i],
            slots: step.op.target().into_iter().chain(step.op.uses()).collect(),
            position: i,
        })
    };
    for (i, &count) in pending.iter().enumerate() {
        if count == 0 {
            heap.push(ready(i));
        }
    }

    let mut order = Vec::with_capacity(n);
    while let Some(Reverse(next)) = heap.pop() {
        let i = next.position;
        order.push(i);
        for &(j, _) in &succs[i] {
            pending[j] -= 1;
            if pending[j] == 0 {
                heap.push(ready(j));
            }
        }
    }

    let mut slots: Vec<Option<Step>> = steps.into_iter().map(Some).collect();
    order.into_iter().filter_map(|i| slots[i].take()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use frag_test_utils::DemoModel;
    use pretty_assertions::assert_eq;

    fn run(demo: &DemoModel, ops: Vec<Operation>) -> Vec<Operation> {
        CanonicalOrder::new()
            .apply(demo.steps(ops), &demo.model)
            .unwrap()
            .into_iter()
            .map(|s| s.op)
            .collect()
    }

    #[test]
    fn independent_steps_are_sorted() {
        let demo = DemoModel::new();
        let a = run(&demo, vec![demo.int(0, 2), demo.int(1, 1)]);
        let b = run(&demo, vec![demo.int(1, 1), demo.int(0, 2)]);
        assert_eq!(a, b);
        assert_eq!(a, vec![demo.int(1, 1), demo.int(0, 2)]);
    }

    #[test]
    fn dependencies_are_respected() {
        let demo = DemoModel::new();
        let ops = vec![demo.new_stack(0), demo.int(0, 1), demo.push(0, 0), demo.pop(0)];
        let out = run(&demo, ops);
        let push = out.iter().position(|o| *o == demo.push(0, 0)).unwrap();
        let pop = out.iter().position(|o| *o == demo.pop(0)).unwrap();
        let new = out.iter().position(|o| *o == demo.new_stack(0)).unwrap();
        assert!(new < push && push < pop);
    }

    #[test]
    fn failures_keep_their_relative_order() {
        let demo = DemoModel::new();
        let mut steps = demo.steps(vec![demo.new_stack(0), demo.new_stack(1)]);
        steps[0] = steps[0].clone().with_failure("B");
        steps[1] = steps[1].clone().with_failure("A");
        let out = CanonicalOrder::new().apply(steps, &demo.model).unwrap();
        assert_eq!(out[0].failure.as_deref(), Some("B"));
    }

    #[test]
    fn reset_is_a_barrier() {
        let demo = DemoModel::new();
        let out = run(&demo, vec![demo.int(0, 2), Operation::Reset, demo.int(1, 1)]);
        assert_eq!(out, vec![demo.int(0, 2), Operation::Reset, demo.int(1, 1)]);
    }

    #[test]
    fn static_writers_are_ordered() {
        let demo = DemoModel::new();
        assert!(!independent(
            &Step::new(frag_ir::OpId(0), demo.reset_counter()),
            &Step::new(frag_ir::OpId(1), demo.stack_of(0, 0)),
            &demo.model
        ));
        assert!(independent(
            &Step::new(frag_ir::OpId(0), demo.abs(1, 0)),
            &Step::new(frag_ir::OpId(1), demo.abs(2, 0)),
            &demo.model
        ));
    }

    #[test]
    fn consumers_break_producer_ties() {
        let demo = DemoModel::new();
        // Two identical literals feeding different pushes on one stack
        let a = run(
            &demo,
            vec![
                demo.new_stack(0),
                demo.int(0, 5),
                demo.int(1, 5),
                demo.push(0, 0),
                demo.push_all(0, 0),
                demo.push(0, 1),
            ],
        );
        let b = run(
            &demo,
            vec![
                demo.new_stack(0),
                demo.int(1, 5),
                demo.int(0, 5),
                demo.push(0, 0),
                demo.push_all(0, 0),
                demo.push(0, 1),
            ],
        );
        assert_eq!(a, b);
    }
}
