//! Synthetic search loop
//!
//! Runs a toy generational search over the demo `Stack` model: every
//! generation is evaluated through a coalescer and, for reference, through a
//! second coalescer with coalescing disabled. The two must agree on every
//! test's coverage.

use anyhow::{Context, Result};
use frag_cache::CacheConfig;
use frag_canon::Pipeline;
use frag_core::{
    AuxData, Coalescer, CoalescerConfig, CoverageResult, Diagnostics, EvaluationHandle,
};
use frag_ir::{Step, Test, TypeModel};
use frag_split::{SplitOptions, Splitter};
use frag_test_utils::{random_test, DemoModel, GeneratorConfig, SyntheticEvaluator};
use futures::future::join_all;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::cmp::Reverse;
use std::fmt::Write as _;
use std::sync::Arc;

/// Simulator configuration
#[derive(Debug, Clone, Serialize)]
pub struct SimulatorConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Generations to run
    pub generations: u64,
    /// Tests per generation
    pub population: usize,
    /// Best tests carried into the next generation
    pub survivors: usize,
    /// Longest generated test
    pub max_len: usize,
    /// Merge repeated read-only calls while splitting
    pub observer_merging: bool,
    /// Fragment cache capacity
    pub cache_capacity: usize,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            generations: 20,
            population: 50,
            survivors: 25,
            max_len: 16,
            observer_merging: false,
            cache_capacity: 10_000,
        }
    }
}

/// Problem found while simulating
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    /// Coalesced coverage differs from verbatim coverage
    CoverageMismatch {
        /// Generation of the test
        generation: u64,
        /// Seed that generated the test
        test_seed: u64,
        /// Goals covered by the verbatim run
        expected: usize,
        /// Goals covered through the coalescer
        actual: usize,
    },
    /// A fragment was evaluated more than once without ever being evicted
    DuplicateEvaluation {
        /// Highest evaluation count of a single fragment
        evaluations: usize,
    },
    /// The synthetic evaluator never fails, so any failure is a bug
    EvaluationFailed {
        /// Generation of the test
        generation: u64,
        /// Seed that generated the test
        test_seed: u64,
        /// Failure message
        message: String,
    },
}

/// Per-generation counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GenerationStats {
    /// Generation number
    pub generation: u64,
    /// Tests evaluated
    pub tests: usize,
    /// Fragments those tests split into
    pub fragments: usize,
    /// Fragments answered from the cache
    pub cached: usize,
    /// Evaluations run by the coalescer
    pub submissions: usize,
    /// Evaluations run without coalescing
    pub baseline_submissions: usize,
    /// Goals covered by the whole generation
    pub goals: usize,
}

/// Final report from the simulator
#[derive(Debug, Clone, Serialize)]
pub struct SimulatorReport {
    /// Configuration that produced the report
    pub config: SimulatorConfig,
    /// Counters per generation
    pub generations: Vec<GenerationStats>,
    /// Union of all coverage reached
    pub coverage: CoverageResult,
    /// Problems found
    pub violations: Vec<Violation>,
    /// Coalescer state at the end of the run
    pub diagnostics: Diagnostics,
}

impl SimulatorReport {
    /// No violations
    #[must_use]
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    /// Evaluations run by the coalescer
    #[must_use]
    pub fn submissions(&self) -> usize {
        self.generations.iter().map(|g| g.submissions).sum()
    }

    /// Evaluations that would have run without coalescing
    #[must_use]
    pub fn baseline_submissions(&self) -> usize {
        self.generations.iter().map(|g| g.baseline_submissions).sum()
    }

    /// Text report
    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "=== Fragment coalescing simulation ===\n");
        let _ = writeln!(out, "Seed: {}", self.config.seed);
        let _ = writeln!(
            out,
            "Generations: {}, population: {}, survivors: {}",
            self.config.generations, self.config.population, self.config.survivors
        );
        let _ = writeln!(out, "Observer merging: {}\n", self.config.observer_merging);
        let _ = writeln!(
            out,
            "{:>4} {:>6} {:>9} {:>7} {:>11} {:>9} {:>6}",
            "gen", "tests", "fragments", "cached", "submissions", "verbatim", "goals"
        );
        for g in &self.generations {
            let _ = writeln!(
                out,
                "{:>4} {:>6} {:>9} {:>7} {:>11} {:>9} {:>6}",
                g.generation,
                g.tests,
                g.fragments,
                g.cached,
                g.submissions,
                g.baseline_submissions,
                g.goals
            );
        }
        let _ = writeln!(
            out,
            "\nEvaluations: {} coalesced vs {} verbatim",
            self.submissions(),
            self.baseline_submissions()
        );
        let _ = writeln!(out, "Coverage: {}\n", self.coverage);
        let _ = writeln!(out, "{}", self.diagnostics);

        if !self.violations.is_empty() {
            let _ = writeln!(out, "\n=== Violations ===");
            for (n, v) in self.violations.iter().enumerate() {
                let _ = writeln!(out, "{}. {v:?}", n + 1);
            }
        }
        let _ = writeln!(
            out,
            "\n=== Result: {} ===",
            if self.passed() { "PASS" } else { "FAIL" }
        );
        out
    }
}

async fn wait_all(handles: Vec<EvaluationHandle>) -> Vec<CoverageResult> {
    join_all(handles.into_iter().map(EvaluationHandle::wait))
        .await
        .into_iter()
        .map(|r| r.unwrap_or_default())
        .collect()
}

/// Run the simulator
///
/// # Errors
/// Invalid configuration or a coalescer bookkeeping error
pub async fn run_simulator(config: SimulatorConfig) -> Result<SimulatorReport> {
    let demo = DemoModel::new();
    let generator = GeneratorConfig::new().with_len(1, config.max_len.max(1));
    let evaluator = Arc::new(SyntheticEvaluator::new());
    let reference = Arc::new(SyntheticEvaluator::new());

    let coalescer = Coalescer::new(
        Arc::clone(&evaluator),
        CoalescerConfig::new()
            .with_observer_merging(config.observer_merging)
            .with_cache(CacheConfig::new().with_capacity(config.cache_capacity)),
    )
    .context("invalid coalescer configuration")?;
    let baseline = Coalescer::new(Arc::clone(&reference), CoalescerConfig::new().with_enabled(false))
        .context("invalid baseline configuration")?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut population: Vec<u64> = (0..config.population).map(|_| rng.random()).collect();
    let mut generations = Vec::new();
    let mut violations = Vec::new();
    let mut coverage = CoverageResult::new();

    for generation in 0..config.generations {
        let tests: Vec<Test> = population
            .iter()
            .map(|&seed| random_test(&demo, seed, &generator))
            .collect();
        let before = (evaluator.submissions(), reference.submissions());

        let handles = tests
            .iter()
            .map(|t| coalescer.evaluate(t, AuxData::new(generation)))
            .collect::<Result<Vec<_>, _>>()?;
        let fragments: usize = handles.iter().map(EvaluationHandle::fragments).sum();
        let cached: usize = handles.iter().map(EvaluationHandle::cached).sum();
        let verbatim = tests
            .iter()
            .map(|t| baseline.evaluate(t, AuxData::new(generation)))
            .collect::<Result<Vec<_>, _>>()?;

        let (results, expected) = futures::join!(
            join_all(handles.into_iter().map(EvaluationHandle::wait)),
            wait_all(verbatim)
        );

        let mut generation_coverage = CoverageResult::new();
        let mut scored = Vec::with_capacity(tests.len());
        for ((&test_seed, result), expected) in population.iter().zip(results).zip(expected) {
            match result {
                Ok(actual) => {
                    if actual != expected {
                        tracing::warn!(generation, test_seed, "coverage mismatch");
                        violations.push(Violation::CoverageMismatch {
                            generation,
                            test_seed,
                            expected: expected.goal_count(),
                            actual: actual.goal_count(),
                        });
                    }
                    scored.push((test_seed, actual.goal_count()));
                    generation_coverage.merge(&actual);
                }
                Err(failure) => {
                    violations.push(Violation::EvaluationFailed {
                        generation,
                        test_seed,
                        message: failure.to_string(),
                    });
                    scored.push((test_seed, 0));
                }
            }
        }
        coverage.merge(&generation_coverage);
        coalescer.age_cache();

        let stats = GenerationStats {
            generation,
            tests: tests.len(),
            fragments,
            cached,
            submissions: evaluator.submissions() - before.0,
            baseline_submissions: reference.submissions() - before.1,
            goals: generation_coverage.goal_count(),
        };
        tracing::info!(
            generation,
            submissions = stats.submissions,
            cached = stats.cached,
            goals = stats.goals,
            "generation evaluated"
        );
        generations.push(stats);

        scored.sort_by_key(|&(_, goals)| Reverse(goals));
        population = scored
            .into_iter()
            .take(config.survivors.min(config.population))
            .map(|(seed, _)| seed)
            .collect();
        while population.len() < config.population {
            population.push(rng.random());
        }
    }

    let diagnostics = coalescer.diagnostics();
    let most = evaluator.max_submissions_per_fragment();
    if most > 1 && diagnostics.cache.evictions == 0 {
        violations.push(Violation::DuplicateEvaluation { evaluations: most });
    }

    Ok(SimulatorReport {
        config,
        generations,
        coverage,
        violations,
        diagnostics,
    })
}

fn render(out: &mut String, steps: &[Step], model: &TypeModel) {
    for step in steps {
        let _ = writeln!(out, "    {}", step.display(model));
    }
}

/// Show how one random test is split and canonicalized
///
/// # Errors
/// A canonicalization invariant violation
pub fn explain(seed: u64, observer_merging: bool, max_len: usize) -> Result<String> {
    let demo = DemoModel::new();
    let test = random_test(&demo, seed, &GeneratorConfig::new().with_len(1, max_len.max(1)));
    let splitter = Splitter::new(SplitOptions::new().with_observer_merging(observer_merging));
    let pipeline = Pipeline::new();
    let report = splitter.split_detailed(&test);

    let mut out = String::new();
    let _ = writeln!(out, "Test (seed {seed}, {} steps):", test.len());
    render(&mut out, test.steps(), &demo.model);
    let _ = writeln!(
        out,
        "\n{} fragment(s), {} merged observer(s), {} discarded candidate(s)",
        report.fragments.len(),
        report.merged_observers,
        report.discarded
    );
    for (n, fragment) in report.fragments.iter().enumerate() {
        let canonical = pipeline
            .canonicalize_detailed(fragment)
            .with_context(|| format!("canonicalizing fragment {n}"))?;
        let _ = writeln!(out, "\nFragment {n}:");
        render(&mut out, fragment.steps(), &demo.model);
        let _ = writeln!(
            out,
            "  canonical {} ({} round(s)):",
            canonical.fragment.fingerprint().short(),
            canonical.rounds
        );
        render(&mut out, canonical.fragment.steps(), &demo.model);
    }
    Ok(out)
}
