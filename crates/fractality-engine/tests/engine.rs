use fractality_core::{
    EngineConfig, ErrorKind, FamilyViewConfig, Feature, LayoutKind, NodeId, QualityLevel,
    TransitionKind,
};
use fractality_engine::{Clock, Engine, EngineContext, ManualClock};
use fractality_events::Event;
use fractality_graph::{
    Graph, LayoutEngine, TestDataGenerator, TestPattern, compute_family_view,
};
use proptest::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const FRAME: f32 = 0.016;

fn config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.performance.calibrate = false;
    config
}

fn headless(config: EngineConfig) -> (Engine, ManualClock) {
    let clock = ManualClock::new();
    let context = EngineContext::new(config).with_clock(Arc::new(clock.clone()));
    (Engine::headless(context), clock)
}

fn generate(pattern: TestPattern) -> Arc<Graph> {
    Arc::new(TestDataGenerator::default().generate(pattern).unwrap())
}

fn s1_view() -> FamilyViewConfig {
    FamilyViewConfig {
        max_siblings: 5,
        max_children: 7,
        show_parent: true,
        show_grandparent: false,
        context_depth: 0,
        ..Default::default()
    }
}

fn run_for(engine: &mut Engine, clock: &ManualClock, seconds: f32) {
    let frames = (seconds / FRAME).ceil() as usize;
    for _ in 0..frames {
        clock.advance_secs(FRAME);
        engine.frame();
    }
}

fn assert_at_rest(engine: &Engine) {
    assert!(!engine.animation().is_animating());
    for (id, state) in engine.visuals().iter() {
        assert_eq!(state.position, state.target_position, "{id} still moving");
    }
}

#[test]
fn focus_change_recomputes_layout_once() {
    let (mut engine, clock) = headless(config());
    engine.set_view_config(s1_view());
    let graph = generate(TestPattern::Simple);
    engine.set_graph(Arc::clone(&graph));

    clock.advance_secs(FRAME);
    let report = engine.frame();
    assert!(report.laid_out);
    assert_eq!(report.visible, 4);
    assert_eq!(engine.layout_engine().computations(), 1);
    assert!(!engine.state().needs_layout());
    run_for(&mut engine, &clock, 3.0);
    assert_eq!(engine.layout_engine().computations(), 1);

    let before: Vec<(NodeId, _)> = engine
        .visuals()
        .iter()
        .map(|(id, s)| (id.clone(), s.position))
        .collect();

    clock.advance_secs(FRAME);
    assert!(engine.set_focus("child-1").unwrap());
    assert!(engine.state().needs_layout());
    let report = engine.frame();
    assert!(report.laid_out);
    assert_eq!(engine.layout_engine().computations(), 2);
    assert!(!engine.state().needs_layout());

    let view = compute_family_view(&graph, "child-1", &s1_view());
    assert_eq!(view.len(), 6);
    let expected = LayoutEngine::new(engine.state().layout_config().clone())
        .calculate_layout(&graph, &view, Duration::ZERO);

    for (id, position) in &before {
        if expected.get(id).is_some_and(|target| target != position) {
            assert!(
                engine.animation().has_transition(id.as_str(), TransitionKind::Move),
                "{id} moved without a transition"
            );
        }
    }
    for id in ["child-1-0", "child-1-1"] {
        assert!(engine.animation().has_transition(id, TransitionKind::Move));
    }

    let wait = engine.animation().remaining() + engine.animation().config().max_delay + 0.5;
    run_for(&mut engine, &clock, wait);
    assert_eq!(engine.layout_engine().computations(), 2);
    for (id, target) in expected.iter() {
        let state = engine.visuals().get(id.as_str()).unwrap();
        assert!(
            state.position.distance(*target) < 1e-5,
            "{id}: {:?} != {target:?}",
            state.position
        );
    }
    assert_at_rest(&engine);
}

#[test]
fn sustained_low_fps_backs_quality_off() {
    let mut config = config();
    config.performance.adaptive_quality.initial_quality = 0.75;
    let (mut engine, clock) = headless(config);
    engine.set_graph(generate(TestPattern::Simple));
    assert_eq!(engine.quality().level(), QualityLevel::High);
    assert!(engine.quality().is_enabled(Feature::Shadows));
    let ratio_before = engine.renderer().settings().pixel_ratio;
    engine.events().drain();

    // 61 frames at 50 ms: 60 interval samples at 20 FPS over ~3 s.
    for _ in 0..61 {
        clock.advance_secs(0.05);
        engine.frame();
    }

    assert!((engine.quality().quality() - 0.65).abs() < 1e-5);
    assert_eq!(engine.quality().level(), QualityLevel::Medium);
    assert!(!engine.quality().is_enabled(Feature::Shadows));
    assert!(engine.renderer().settings().pixel_ratio < ratio_before);

    let events = engine.events().drain();
    let change = events
        .iter()
        .find_map(|e| match e {
            Event::QualityChanged {
                level,
                enabled_features,
                ..
            } => Some((*level, enabled_features.clone())),
            _ => None,
        })
        .expect("qualityChanged event");
    assert_eq!(change.0, QualityLevel::Medium);
    assert!(!change.1.contains(&Feature::Shadows));
    assert!(events.iter().any(|e| matches!(e, Event::Performance { .. })));
}

#[test]
fn access_is_recorded_before_the_next_score() {
    let (mut engine, clock) = headless(config());
    engine.set_graph(generate(TestPattern::Simple));
    clock.advance_secs(FRAME);
    engine.frame();

    clock.advance_secs(1.0);
    engine.set_focus("child-1").unwrap();
    let now = clock.now();
    assert_eq!(engine.scorer().access().last_access("child-1"), Some(now));
    let scorer = engine.scorer();
    assert!(scorer.access_score("child-1", now) > scorer.access_score("child-0", now));
    engine.frame();
    assert!(engine.scores().contains_key("child-1"));
}

/// Moves forward a fixed step on every read, so each frame appears to do
/// real work.
struct SteppingClock {
    nanos: AtomicU64,
    step: Duration,
}

impl Clock for SteppingClock {
    fn now(&self) -> Duration {
        let step = self.step.as_nanos() as u64;
        Duration::from_nanos(self.nanos.fetch_add(step, Ordering::SeqCst) + step)
    }
}

#[test]
fn layout_defers_once_when_budget_is_spent() {
    let clock = Arc::new(SteppingClock {
        nanos: AtomicU64::new(0),
        step: Duration::from_millis(20),
    });
    let context = EngineContext::new(config()).with_clock(clock);
    let mut engine = Engine::headless(context);
    engine.set_graph(generate(TestPattern::Simple));

    let first = engine.frame();
    assert!(first.layout_deferred);
    assert!(!first.laid_out);
    assert!(engine.state().needs_layout());
    assert_eq!(engine.layout_engine().computations(), 0);

    let second = engine.frame();
    assert!(second.laid_out);
    assert!(!engine.state().needs_layout());
    assert_eq!(engine.layout_engine().computations(), 1);
    assert_eq!(engine.stats().deferred_layouts, 1);
}

#[tokio::test]
async fn failed_load_keeps_current_graph() {
    let (mut engine, _) = headless(config());
    let graph = engine.load("test:simple").await.unwrap();
    assert_eq!(graph.len(), 10);
    engine.events().drain();

    let err = engine
        .load("/definitely/not/here/graph.json")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SourceInvalid);
    assert!(Arc::ptr_eq(engine.graph().unwrap(), &graph));
    assert_eq!(engine.focus().map(NodeId::as_str), Some("root"));

    let events = engine.events().drain();
    assert!(events.iter().any(|e| matches!(
        e,
        Event::LoadFailed {
            kind: ErrorKind::SourceInvalid,
            ..
        }
    )));
    assert!(!events.iter().any(|e| e.name() == "graphChanged"));
}

#[tokio::test]
async fn loaded_graph_renders() {
    let (mut engine, clock) = headless(config());
    engine.load("test:balanced").await.unwrap();
    run_for(&mut engine, &clock, 2.0);
    let stats = engine.stats();
    assert_eq!(stats.graph_nodes, engine.graph().unwrap().len());
    assert_eq!(stats.layout_computations, 1);
    assert_eq!(stats.instance_count, stats.visible);
    assert!(stats.frames > 100);
}

#[test]
fn graph_swap_moves_focus_to_new_root() {
    let (mut engine, clock) = headless(config());
    engine.set_graph(generate(TestPattern::Simple));
    clock.advance_secs(FRAME);
    engine.frame();
    engine.set_focus("child-2-1").unwrap();
    clock.advance_secs(FRAME);
    engine.frame();

    let mut other = TestDataGenerator::new(7);
    engine.set_graph(Arc::new(other.deep(4).unwrap()));
    assert_eq!(engine.focus().map(NodeId::as_str), Some("root"));
    run_for(&mut engine, &clock, 3.0);
    assert!(engine.visuals().ids().all(|id| engine.graph().unwrap().contains(id.as_str())));
    assert_at_rest(&engine);
}

#[test]
fn back_after_graph_swap_stays_in_new_graph() {
    let (mut engine, clock) = headless(config());
    engine.set_graph(generate(TestPattern::Simple));
    engine.set_focus("child-2").unwrap();
    engine.set_focus("child-2-1").unwrap();
    clock.advance_secs(FRAME);
    engine.frame();

    let mut other = TestDataGenerator::new(7);
    engine.set_graph(Arc::new(other.deep(4).unwrap()));
    assert!(
        engine
            .state()
            .history()
            .all(|id| engine.graph().unwrap().contains(id.as_str()))
    );
    assert_eq!(engine.back(), None);
    assert_eq!(engine.focus().map(NodeId::as_str), Some("root"));

    engine.set_focus("deep-1").unwrap();
    assert_eq!(engine.back().as_ref().map(NodeId::as_str), Some("root"));
    engine.events().drain();
    clock.advance_secs(FRAME);
    let report = engine.frame();
    assert!(report.visible > 0);
    assert!(
        !engine
            .events()
            .drain()
            .iter()
            .any(|e| matches!(e, Event::Diagnostic { .. }))
    );
}

#[test]
fn layout_switch_relayouts_without_refocus() {
    let (mut engine, clock) = headless(config());
    engine.set_graph(generate(TestPattern::Balanced));
    run_for(&mut engine, &clock, 1.0);
    assert!(engine.set_layout("fibonacciSphere").unwrap());
    assert_eq!(engine.layout_engine().active(), LayoutKind::FibonacciSphere);
    clock.advance_secs(FRAME);
    assert!(engine.frame().laid_out);
    assert_eq!(engine.layout_engine().computations(), 2);
    let events = engine.events().drain();
    assert!(events.iter().any(|e| matches!(
        e,
        Event::LayoutChanged {
            layout: LayoutKind::FibonacciSphere
        }
    )));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn prop_transitions_complete_after_remaining_time(
        walk in prop::collection::vec(0usize..200, 1..6),
        layout in 0usize..4,
    ) {
        let (mut engine, clock) = headless(config());
        let graph = generate(TestPattern::Balanced);
        engine.set_graph(Arc::clone(&graph));
        let name = ["family", "goldenSpiral", "fibonacciSphere", "fractalTree"][layout];
        engine.set_layout(name).unwrap();

        for pick in walk {
            let id = graph.ids()[pick % graph.len()].clone();
            engine.set_focus(id.as_str()).unwrap();
            clock.advance_secs(FRAME);
            engine.frame();
            let wait = engine.animation().remaining() + 0.1;
            run_for(&mut engine, &clock, wait);
            prop_assert!(!engine.animation().is_animating());
            for (id, state) in engine.visuals().iter() {
                prop_assert_eq!(state.position, state.target_position, "{} not at target", id);
            }
        }
    }
}
