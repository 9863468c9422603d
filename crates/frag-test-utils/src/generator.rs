//! Random candidate tests over [`DemoModel`]
//!
//! Produces tests the way a search operator would: slots are reused freely,
//! some reads have no producer, a few steps carry failures and a `Reset`
//! shows up now and then.

use crate::DemoModel;
use frag_ir::{OpId, Operation, Step, Test, TypeIdx};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const FAILURES: [&str; 2] = [
    "java.util.EmptyStackException",
    "java.lang.NullPointerException",
];

/// Shape of generated tests
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeneratorConfig {
    pub min_len: usize,
    pub max_len: usize,
    pub reset_probability: f64,
    pub failure_probability: f64,
    pub null_probability: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            min_len: 1,
            max_len: 16,
            reset_probability: 0.04,
            failure_probability: 0.05,
            null_probability: 0.1,
        }
    }
}

impl GeneratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_len(mut self, min: usize, max: usize) -> Self {
        self.min_len = min;
        self.max_len = max.max(min);
        self
    }

    pub fn with_reset_probability(mut self, p: f64) -> Self {
        self.reset_probability = p;
        self
    }

    pub fn with_failure_probability(mut self, p: f64) -> Self {
        self.failure_probability = p;
        self
    }
}

/// Deterministic random test for `seed`
pub fn random_test(demo: &DemoModel, seed: u64, config: &GeneratorConfig) -> Test {
    let mut rng = StdRng::seed_from_u64(seed);
    let len = rng.random_range(config.min_len..=config.max_len.max(config.min_len));
    let steps = (0..len)
        .map(|n| {
            let id = OpId(n as u32);
            if rng.random_bool(config.reset_probability) {
                return Step::new(id, Operation::Reset);
            }
            let op = random_operation(demo, &mut rng, config);
            if op.is_call() && rng.random_bool(config.failure_probability) {
                let name = FAILURES[rng.random_range(0..FAILURES.len())];
                Step::new(id, op).with_failure(name)
            } else {
                Step::new(id, op)
            }
        })
        .collect();
    demo.test_steps(steps)
}

fn slot(demo: &DemoModel, rng: &mut StdRng, ty: TypeIdx) -> u32 {
    let pool = demo.model.type_info(ty).map_or(1, |t| t.slots);
    rng.random_range(0..pool)
}

fn random_operation(demo: &DemoModel, rng: &mut StdRng, config: &GeneratorConfig) -> Operation {
    let s = slot(demo, rng, demo.stack);
    let i = slot(demo, rng, demo.int);
    let j = slot(demo, rng, demo.int);
    let b = slot(demo, rng, demo.boolean);
    let bx = slot(demo, rng, demo.boxed);
    let l = slot(demo, rng, demo.list);
    match rng.random_range(0..19) {
        0 | 1 => demo.new_stack(s),
        2 => demo.new_stack_sized(s, i),
        3 => demo.new_list(l),
        4 | 5 => demo.int(i, rng.random_range(-3..=3)),
        6 => {
            let value = (!rng.random_bool(config.null_probability)).then(|| rng.random_range(0..3));
            demo.boxed(bx, value)
        }
        7 => {
            if rng.random_bool(config.null_probability) {
                demo.null_stack(s)
            } else {
                demo.empty(s)
            }
        }
        8 | 9 => demo.push(s, i),
        10 => demo.push_boxed(s, bx),
        11 => {
            if rng.random_bool(0.5) {
                demo.pop(s)
            } else {
                demo.pop_into(i, s)
            }
        }
        12 => demo.peek(i, s),
        13 => demo.size(i, s),
        14 => demo.is_empty(b, s),
        15 => {
            if rng.random_bool(0.5) {
                demo.push_all(s, l)
            } else {
                demo.list_add(l, i)
            }
        }
        16 => {
            if rng.random_bool(0.8) {
                demo.stack_of(s, i)
            } else {
                demo.reset_counter()
            }
        }
        17 => demo.abs(j, i),
        _ => demo.get(j, s, i),
    }
}
