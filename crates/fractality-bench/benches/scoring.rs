use criterion::{Criterion, black_box, criterion_group, criterion_main};
use fractality_bench::{sized_tree, wide_view};
use fractality_graph::{ContextScorer, compute_family_view};
use std::time::Duration;

fn bench_scoring(c: &mut Criterion) {
    let graph = sized_tree(5_000).expect("fixture graph");
    let view = compute_family_view(&graph, "root", &wide_view());

    c.bench_function("ccs_analyze_5000", |b| {
        b.iter(|| {
            let mut scorer = ContextScorer::new();
            scorer.analyze(black_box(&graph), Duration::ZERO);
            black_box(scorer);
        })
    });

    let mut scorer = ContextScorer::new();
    scorer.analyze(&graph, Duration::ZERO);
    c.bench_function("ccs_score_visible", |b| {
        b.iter(|| black_box(scorer.score(&graph, view.ids(), "root", Duration::ZERO)))
    });

    c.bench_function("ccs_navigation_hints", |b| {
        b.iter(|| black_box(scorer.navigation_hints(&graph, Duration::ZERO, 5)))
    });
}

criterion_group!(benches, bench_scoring);
criterion_main!(benches);
