use fractality_core::FamilyViewConfig;
use fractality_graph::{Graph, TestDataGenerator, TestPattern};

pub const SEED: u64 = 42;

pub fn pattern(pattern: TestPattern) -> anyhow::Result<Graph> {
    Ok(TestDataGenerator::new(SEED).generate(pattern)?)
}

/// Random tree of exactly `nodes` nodes.
pub fn sized_tree(nodes: usize) -> anyhow::Result<Graph> {
    Ok(TestDataGenerator::new(SEED).random_tree(nodes, 12, 16)?)
}

/// Family view settings that pull in two hops of context.
pub fn wide_view() -> FamilyViewConfig {
    FamilyViewConfig {
        max_siblings: 12,
        max_children: 24,
        show_grandparent: true,
        context_depth: 2,
        ..Default::default()
    }
}
