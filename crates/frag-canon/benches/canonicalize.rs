use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use frag_canon::Pipeline;
use frag_split::{SplitOptions, Splitter};
use frag_test_utils::{random_test, DemoModel, GeneratorConfig};

fn bench_canonicalize(c: &mut Criterion) {
    let demo = DemoModel::new();
    let pipeline = Pipeline::new();
    let mut group = c.benchmark_group("canonicalize");
    for len in [8usize, 32, 128] {
        let config = GeneratorConfig::new().with_len(len, len);
        let fragments: Vec<_> = (0..32)
            .map(|seed| random_test(&demo, seed, &config).to_fragment())
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(len), &fragments, |b, fragments| {
            b.iter(|| {
                for f in fragments {
                    black_box(pipeline.canonicalize(f).unwrap());
                }
            });
        });
    }
    group.finish();
}

fn bench_split_and_canonicalize(c: &mut Criterion) {
    let demo = DemoModel::new();
    let pipeline = Pipeline::new();
    let splitter = Splitter::new(SplitOptions::new().with_observer_merging(true));
    let config = GeneratorConfig::new().with_len(32, 32);
    let tests: Vec<_> = (0..32).map(|seed| random_test(&demo, seed, &config)).collect();
    c.bench_function("split_and_canonicalize", |b| {
        b.iter(|| {
            for test in &tests {
                for f in splitter.split(test) {
                    black_box(pipeline.canonicalize(&f).unwrap());
                }
            }
        });
    });
}

criterion_group!(benches, bench_canonicalize, bench_split_and_canonicalize);
criterion_main!(benches);
