use frag_core::{AuxData, Coalescer, CoalescerConfig, CoverageResult};
use frag_test_utils::{random_test, synthetic_coverage, DemoModel, GeneratorConfig, SyntheticEvaluator};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(96))]

    #[test]
    fn prop_coalescing_preserves_coverage(seed in any::<u64>(), merging in any::<bool>()) {
        let demo = DemoModel::new();
        let test = random_test(&demo, seed, &GeneratorConfig::new());
        let config = CoalescerConfig::new().with_observer_merging(merging);
        let coalescer = Coalescer::new(SyntheticEvaluator::new(), config).unwrap();

        let coverage = runtime()
            .block_on(async { coalescer.evaluate(&test, AuxData::new(0)).unwrap().wait().await })
            .unwrap();
        prop_assert_eq!(coverage, synthetic_coverage(test.steps(), &demo.model));
    }

    #[test]
    fn prop_population_coverage_is_order_independent(seeds in proptest::collection::vec(any::<u64>(), 1..12)) {
        let demo = DemoModel::new();
        let tests: Vec<_> = seeds
            .iter()
            .map(|&s| random_test(&demo, s, &GeneratorConfig::new()))
            .collect();
        let coalescer = Coalescer::new(SyntheticEvaluator::new(), CoalescerConfig::new()).unwrap();

        let results = runtime().block_on(async {
            let handles: Vec<_> = tests
                .iter()
                .map(|t| coalescer.evaluate(t, AuxData::new(0)).unwrap())
                .collect();
            let mut out = Vec::new();
            for h in handles {
                out.push(h.wait().await.unwrap());
            }
            out
        });
        for (test, coverage) in tests.iter().zip(&results) {
            prop_assert_eq!(coverage, &synthetic_coverage(test.steps(), &demo.model));
        }
        prop_assert!(coalescer.evaluator().max_submissions_per_fragment() <= 1);
    }
}

#[test]
fn test_concurrent_demand_evaluates_each_fragment_once() {
    let demo = DemoModel::new();
    let config = GeneratorConfig::new().with_len(6, 14);
    let tests: Vec<_> = (0..8).map(|seed| random_test(&demo, seed, &config)).collect();
    let evaluator = Arc::new(SyntheticEvaluator::new().with_delay(Duration::from_millis(20)));
    let coalescer = Coalescer::new(Arc::clone(&evaluator), CoalescerConfig::new()).unwrap();

    runtime().block_on(async {
        let mut tasks = Vec::new();
        for round in 0..16 {
            for test in &tests {
                let coalescer = coalescer.clone();
                let test = test.clone();
                tasks.push(tokio::spawn(async move {
                    coalescer.evaluate(&test, AuxData::new(round)).unwrap().wait().await
                }));
            }
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }
    });

    assert_eq!(evaluator.max_submissions_per_fragment(), 1);
    assert_eq!(evaluator.submissions(), evaluator.distinct_fragments());
    let diagnostics = coalescer.diagnostics();
    assert_eq!(diagnostics.in_flight, 0);
    assert_eq!(diagnostics.submissions as usize, evaluator.submissions());
}

#[test]
fn test_dropped_waiters_do_not_cancel_evaluation() {
    let demo = DemoModel::new();
    let test = demo.test(vec![demo.new_stack(0), demo.pop(0)]);
    let evaluator = Arc::new(SyntheticEvaluator::new().with_delay(Duration::from_millis(10)));
    let coalescer = Coalescer::new(Arc::clone(&evaluator), CoalescerConfig::new()).unwrap();

    runtime().block_on(async {
        drop(coalescer.evaluate(&test, AuxData::new(0)).unwrap());
        tokio::time::sleep(Duration::from_millis(100)).await;
        let handle = coalescer.evaluate(&test, AuxData::new(1)).unwrap();
        assert_eq!(handle.cached(), 1);
        let coverage: CoverageResult = handle.wait().await.unwrap();
        assert!(!coverage.is_empty());
    });
    assert_eq!(evaluator.submissions(), 1);
}
