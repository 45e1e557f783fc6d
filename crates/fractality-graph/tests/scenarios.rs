use fractality_core::{
    FamilyViewConfig, GOLDEN_ANGLE, GraphNode, Kinship, LayoutConfig, LayoutKind, NodeId, Vec3,
};
use fractality_graph::{
    ContextScorer, FamilyViewSelector, Graph, LayoutEngine, TestDataGenerator, TestPattern,
};
use std::time::Duration;

fn s1_config() -> FamilyViewConfig {
    FamilyViewConfig {
        max_siblings: 5,
        max_children: 7,
        show_parent: true,
        show_grandparent: false,
        context_depth: 0,
        ..Default::default()
    }
}

#[test]
fn simple_family_view_and_layout() {
    let graph = TestDataGenerator::default()
        .generate(TestPattern::Simple)
        .unwrap();
    assert_eq!(graph.len(), 10);

    let mut selector = FamilyViewSelector::new();
    let view = selector.select(&graph, "root", &s1_config(), Duration::ZERO);
    let ids: Vec<&str> = view.ids().map(NodeId::as_str).collect();
    assert_eq!(ids, vec!["root", "child-0", "child-1", "child-2"]);

    assert_eq!(selector.priority(&graph, "root", "root"), 3.0);
    for child in ["child-0", "child-1", "child-2"] {
        assert_eq!(selector.priority(&graph, child, "root"), 1.5);
        assert_eq!(view.role_of(child), Some(Kinship::Child));
    }

    let mut layout = LayoutEngine::default();
    let positions = layout.calculate_layout(&graph, &view, Duration::ZERO);
    assert_eq!(positions["root"], Vec3::ZERO);
    for i in 0..3 {
        let t = i as f32 / 3.0;
        let angle = i as f32 * GOLDEN_ANGLE;
        let radius = 5.0 * t.sqrt();
        let expected = Vec3::new(
            radius * angle.cos(),
            (t - 0.5) * 2.5 + 2.0,
            radius * angle.sin() - 3.0,
        );
        let actual = positions[format!("child-{i}").as_str()];
        assert!(
            actual.distance(expected) < 1e-4,
            "child-{i}: {actual:?} != {expected:?}"
        );
    }
}

#[test]
fn scoring_ranks_root_above_leaves() {
    let mut graph = Graph::new();
    let root = GraphNode::root("root");
    graph.add(root.clone()).unwrap();
    for i in 0..5 {
        graph
            .add(GraphNode::child_of(format!("leaf-{i}"), &root))
            .unwrap();
    }

    let mut selector = FamilyViewSelector::new();
    let view = selector.select(&graph, "root", &FamilyViewConfig::default(), Duration::ZERO);
    assert_eq!(view.len(), 6);

    let mut scorer = ContextScorer::new();
    scorer.analyze(&graph, Duration::ZERO);
    scorer.record_access("root", Duration::ZERO);
    let scores = scorer
        .score(&graph, view.ids(), "root", Duration::ZERO)
        .unwrap();

    let root_score = scores["root"];
    assert_eq!(root_score, 1.0);
    for i in 0..5 {
        let leaf = scores[format!("leaf-{i}").as_str()];
        assert!((0.0..=1.0).contains(&leaf));
        assert!(root_score > leaf);
    }
}

#[test]
fn cosmic_web_pins_focus() {
    let graph = TestDataGenerator::new(11).random_tree(50, 4, 6).unwrap();
    assert_eq!(graph.len(), 50);

    let config = FamilyViewConfig {
        max_children: 50,
        max_siblings: 50,
        context_depth: 4,
        max_context: 50,
        ..Default::default()
    };
    let mut selector = FamilyViewSelector::new();
    let view = selector.select(&graph, "root", &config, Duration::ZERO);
    assert_eq!(view.len(), 50);

    let mut layout = LayoutEngine::new(LayoutConfig::default()).with_seed(Some(2024));
    layout.set_layout_by_name("cosmicWeb").unwrap();
    assert_eq!(layout.active(), LayoutKind::CosmicWeb);
    assert_eq!(layout.config().cosmic_web.iterations, 10);

    let positions = layout.calculate_layout(&graph, &view, Duration::ZERO);
    assert_eq!(positions.len(), 50);
    assert_eq!(positions["root"], Vec3::ZERO);
    let at_origin = positions
        .iter()
        .filter(|(_, p)| **p == Vec3::ZERO)
        .count();
    assert_eq!(at_origin, 1);
}
