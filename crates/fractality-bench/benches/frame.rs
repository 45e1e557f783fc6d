use criterion::{Criterion, black_box, criterion_group, criterion_main};
use fractality_bench::pattern;
use fractality_core::EngineConfig;
use fractality_engine::{Engine, EngineContext, ManualClock};
use fractality_graph::TestPattern;
use std::sync::Arc;
use std::time::Duration;

fn bench_frame(c: &mut Criterion) {
    let graph = Arc::new(pattern(TestPattern::Stress).expect("fixture graph"));
    let mut config = EngineConfig::default();
    config.performance.calibrate = false;
    config.performance.adaptive_quality.enabled = false;

    let clock = ManualClock::new();
    let context = EngineContext::new(config).with_clock(Arc::new(clock.clone()));
    let mut engine = Engine::headless(context);
    engine.set_graph(graph);
    let ids: Vec<String> = engine
        .graph()
        .map(|g| g.ids().iter().take(64).map(|id| id.to_string()).collect())
        .unwrap_or_default();

    c.bench_function("engine_frame_idle", |b| {
        b.iter(|| {
            clock.advance(Duration::from_millis(16));
            black_box(engine.frame());
        })
    });

    let mut next = 0;
    c.bench_function("engine_frame_refocus", |b| {
        b.iter(|| {
            next = (next + 1) % ids.len().max(1);
            if let Some(id) = ids.get(next) {
                let _ = engine.set_focus(id);
            }
            clock.advance(Duration::from_millis(16));
            black_box(engine.frame());
        })
    });
}

criterion_group!(benches, bench_frame);
criterion_main!(benches);
