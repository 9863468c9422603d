use frag_core::{AuxData, CoalesceError, Coalescer, CoalescerConfig, FailureKind};
use frag_ir::Test;
use frag_test_utils::{synthetic_coverage, DemoModel, SyntheticEvaluator};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn coalescer(evaluator: SyntheticEvaluator) -> Coalescer<Arc<SyntheticEvaluator>> {
    Coalescer::new(Arc::new(evaluator), CoalescerConfig::new()).unwrap()
}

fn two_stacks(demo: &DemoModel) -> Test {
    demo.test(vec![
        demo.new_stack(0),
        demo.int(0, 1),
        demo.push(0, 0),
        demo.new_stack(1),
        demo.pop(1),
    ])
}

#[tokio::test]
async fn test_fragments_are_evaluated_separately() {
    let demo = DemoModel::new();
    let c = coalescer(SyntheticEvaluator::new());
    let test = two_stacks(&demo);
    let handle = c.evaluate(&test, AuxData::new(0)).unwrap();
    assert_eq!(handle.fragments(), 2);
    let coverage = handle.wait().await.unwrap();
    assert_eq!(coverage, synthetic_coverage(test.steps(), &demo.model));
    assert_eq!(c.evaluator().submissions(), 2);
}

#[tokio::test]
async fn test_second_submission_is_served_from_cache() {
    let demo = DemoModel::new();
    let c = coalescer(SyntheticEvaluator::new());
    let test = two_stacks(&demo);
    c.evaluate(&test, AuxData::new(0)).unwrap().wait().await.unwrap();
    let handle = c.evaluate(&test, AuxData::new(1)).unwrap();
    assert_eq!(handle.cached(), 2);
    handle.wait().await.unwrap();
    assert_eq!(c.evaluator().submissions(), 2);
    assert_eq!(c.diagnostics().cache.hits, 2);
}

#[tokio::test]
async fn test_equivalent_fragments_share_one_evaluation() {
    let demo = DemoModel::new();
    let c = coalescer(SyntheticEvaluator::new());
    // The same two-step fragment under different slots
    let test = demo.test(vec![demo.new_stack(0), demo.pop(0), demo.new_stack(2), demo.pop(2)]);
    let handle = c.evaluate(&test, AuxData::new(0)).unwrap();
    assert_eq!(handle.fragments(), 2);
    handle.wait().await.unwrap();
    assert_eq!(c.evaluator().submissions(), 1);
    assert_eq!(c.diagnostics().joined_in_flight, 1);
}

#[tokio::test]
async fn test_failures_reach_the_caller_and_are_not_cached() {
    let demo = DemoModel::new();
    let c = coalescer(SyntheticEvaluator::new().failing_on(demo.pop));
    let test = two_stacks(&demo);
    let err = c.evaluate(&test, AuxData::new(0)).unwrap().wait().await.unwrap_err();
    assert_eq!(err.kind, FailureKind::Crash);
    assert_eq!(c.diagnostics().cache_len, 1);

    c.evaluate(&test, AuxData::new(1)).unwrap().wait().await.unwrap_err();
    assert_eq!(c.evaluator().submissions(), 3);
    assert_eq!(c.diagnostics().in_flight, 0);
}

#[tokio::test]
async fn test_panicking_evaluator_is_an_internal_failure() {
    let demo = DemoModel::new();
    let c = coalescer(SyntheticEvaluator::new().panicking_on(demo.pop));
    let err = c
        .evaluate(&two_stacks(&demo), AuxData::new(0))
        .unwrap()
        .wait()
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::Internal);
    assert_eq!(c.diagnostics().in_flight, 0);
}

#[tokio::test]
async fn test_disabled_submits_verbatim() {
    let demo = DemoModel::new();
    let c = coalescer(SyntheticEvaluator::new());
    c.disable();
    assert!(!c.is_enabled());
    let test = two_stacks(&demo);
    for generation in 0..3 {
        let handle = c.evaluate(&test, AuxData::new(generation)).unwrap();
        assert_eq!(handle.fragments(), 1);
        let coverage = handle.wait().await.unwrap();
        assert_eq!(coverage, synthetic_coverage(test.steps(), &demo.model));
    }
    assert_eq!(c.evaluator().submissions(), 3);
    assert_eq!(c.diagnostics().cache_len, 0);

    c.enable();
    c.evaluate(&test, AuxData::new(3)).unwrap().wait().await.unwrap();
    assert_eq!(c.diagnostics().cache_len, 2);
}

#[tokio::test]
async fn test_empty_test_covers_nothing() {
    let demo = DemoModel::new();
    let c = coalescer(SyntheticEvaluator::new());
    let handle = c.evaluate(&demo.test(vec![demo.int(0, 1)]), AuxData::new(0)).unwrap();
    assert_eq!(handle.fragments(), 0);
    assert!(handle.wait().await.unwrap().is_empty());
    assert_eq!(c.evaluator().submissions(), 0);
}

#[tokio::test]
async fn test_aging_lets_unused_entries_go() {
    let demo = DemoModel::new();
    let config = CoalescerConfig::new().with_cache(
        frag_cache::CacheConfig::new()
            .with_capacity(2)
            .with_initial_score(2),
    );
    let c = Coalescer::new(Arc::new(SyntheticEvaluator::new()), config).unwrap();
    c.evaluate(&two_stacks(&demo), AuxData::new(0)).unwrap().wait().await.unwrap();
    c.age_cache();
    c.age_cache();
    let other = demo.test(vec![demo.empty(0), demo.pop(0)]);
    c.evaluate(&other, AuxData::new(1)).unwrap().wait().await.unwrap();
    let d = c.diagnostics();
    assert!(d.cache_len <= 2);
    assert!(d.cache.evictions >= 1);
}

#[test]
fn test_invalid_config_is_rejected() {
    let config = CoalescerConfig::new().with_max_pipeline_rounds(0);
    let err = Coalescer::new(SyntheticEvaluator::new(), config).unwrap_err();
    assert!(matches!(err, CoalesceError::Config(_)));
}
