use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use fractality_bench::{sized_tree, wide_view};
use fractality_graph::compute_family_view;

fn bench_family_view(c: &mut Criterion) {
    let mut group = c.benchmark_group("family_view");
    for nodes in [100, 1_000, 5_000] {
        let graph = sized_tree(nodes).expect("fixture graph");
        let focus = graph.ids()[graph.len() / 2].clone();
        let config = wide_view();
        group.bench_with_input(BenchmarkId::from_parameter(nodes), &graph, |b, graph| {
            b.iter(|| black_box(compute_family_view(graph, black_box(focus.as_str()), &config)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_family_view);
criterion_main!(benches);
