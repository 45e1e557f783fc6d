use crate::store::Graph;
use fractality_core::{FractalityError, GraphNode, NodeId, NodeMetadata, Result, Timestamp};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::str::FromStr;

/// Base `created` timestamp (ms) for generated nodes; each node adds its index.
const CREATED_BASE_MS: i64 = 1_700_000_000_000;
pub const DEFAULT_SEED: u64 = 0x5eed_f2ac;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestPattern {
    Balanced,
    Spiral,
    Organic,
    Stress,
    Deep,
    Wide,
    Simple,
}

impl TestPattern {
    pub const ALL: [TestPattern; 7] = [
        TestPattern::Balanced,
        TestPattern::Spiral,
        TestPattern::Organic,
        TestPattern::Stress,
        TestPattern::Deep,
        TestPattern::Wide,
        TestPattern::Simple,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Balanced => "balanced",
            Self::Spiral => "spiral",
            Self::Organic => "organic",
            Self::Stress => "stress",
            Self::Deep => "deep",
            Self::Wide => "wide",
            Self::Simple => "simple",
        }
    }
}

impl fmt::Display for TestPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TestPattern {
    type Err = FractalityError;

    fn from_str(s: &str) -> Result<Self> {
        TestPattern::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| FractalityError::SourceInvalid(format!("unknown test pattern '{s}'")))
    }
}

/// Synthetic graph factory. Every pattern is rooted at id `root` and is fully
/// determined by the seed.
pub struct TestDataGenerator {
    rng: StdRng,
    counter: i64,
}

impl Default for TestDataGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}

impl TestDataGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            counter: 0,
        }
    }

    pub fn generate(&mut self, pattern: TestPattern) -> Result<Graph> {
        self.counter = 0;
        let graph = match pattern {
            TestPattern::Simple => self.balanced_with_prefix(2, 3, 2, "child")?,
            TestPattern::Balanced => self.balanced(3, 4)?,
            TestPattern::Stress => self.balanced(4, 8)?,
            TestPattern::Spiral => self.spiral(12)?,
            TestPattern::Deep => self.deep(20)?,
            TestPattern::Wide => self.wide(120)?,
            TestPattern::Organic => self.organic(400, 7)?,
        };
        tracing::debug!("Generated '{}' test graph with {} nodes", pattern, graph.len());
        Ok(graph)
    }

    /// `depth` levels below the root, `branching` children per node.
    pub fn balanced(&mut self, depth: u32, branching: usize) -> Result<Graph> {
        self.balanced_with_prefix(depth, branching, branching, "node")
    }

    fn balanced_with_prefix(
        &mut self,
        depth: u32,
        root_branching: usize,
        branching: usize,
        prefix: &str,
    ) -> Result<Graph> {
        let mut graph = Graph::new();
        let root = self.node(None, "root", "Root");
        graph.add(root.clone())?;

        let mut level = vec![root];
        for d in 1..=depth {
            let fanout = if d == 1 { root_branching } else { branching };
            let mut next = Vec::with_capacity(level.len() * fanout);
            for parent in &level {
                for i in 0..fanout {
                    let id = if parent.is_root() {
                        format!("{prefix}-{i}")
                    } else {
                        format!("{}-{i}", parent.id)
                    };
                    let suffix = id.trim_start_matches(prefix).trim_start_matches('-');
                    let label = format!("{} {}", capitalize(prefix), suffix);
                    let child = self.node(Some(parent), &id, &label);
                    graph.add(child.clone())?;
                    next.push(child);
                }
            }
            level = next;
        }
        Ok(graph)
    }

    /// A spine descending `turns` levels, with two leaves at every level.
    pub fn spiral(&mut self, turns: u32) -> Result<Graph> {
        let mut graph = Graph::new();
        let mut spine = self.node(None, "root", "Spiral origin");
        graph.add(spine.clone())?;
        for turn in 1..=turns {
            let next = self.node(Some(&spine), &format!("spiral-{turn}"), &format!("Turn {turn}"));
            graph.add(next.clone())?;
            for leaf in 0..2 {
                let id = format!("spiral-{turn}-leaf-{leaf}");
                let node = self.node(Some(&spine), &id, &format!("Arm {turn}.{leaf}"));
                graph.add(node)?;
            }
            spine = next;
        }
        Ok(graph)
    }

    /// A chain `levels` deep; every chain node also carries one leaf.
    pub fn deep(&mut self, levels: u32) -> Result<Graph> {
        let mut graph = Graph::new();
        let mut current = self.node(None, "root", "Abyss");
        graph.add(current.clone())?;
        for level in 1..=levels {
            let leaf = self.node(Some(&current), &format!("deep-{level}-leaf"), "Ledge");
            graph.add(leaf)?;
            let next = self.node(
                Some(&current),
                &format!("deep-{level}"),
                &format!("Level {level}"),
            );
            graph.add(next.clone())?;
            current = next;
        }
        Ok(graph)
    }

    /// One root with `width` children, each holding `i % 3` leaves.
    pub fn wide(&mut self, width: usize) -> Result<Graph> {
        let mut graph = Graph::new();
        let root = self.node(None, "root", "Horizon");
        graph.add(root.clone())?;
        for i in 0..width {
            let child = self.node(Some(&root), &format!("wide-{i}"), &format!("Wide {i}"));
            graph.add(child.clone())?;
            for j in 0..(i % 3) {
                let leaf = self.node(Some(&child), &format!("wide-{i}-{j}"), "Leaf");
                graph.add(leaf)?;
            }
        }
        Ok(graph)
    }

    /// Random branching that thins out with depth, capped at `max_nodes`.
    pub fn organic(&mut self, max_nodes: usize, max_depth: u32) -> Result<Graph> {
        let mut graph = Graph::new();
        let root = self.node(None, "root", "Seed");
        graph.add(root.clone())?;

        let mut frontier = std::collections::VecDeque::from([root]);
        while let Some(parent) = frontier.pop_front() {
            if parent.depth >= max_depth {
                continue;
            }
            let ceiling = 6usize.saturating_sub(parent.depth as usize).max(1);
            let fanout = if parent.is_root() {
                self.rng.gen_range(3..=6)
            } else if self.rng.gen_bool(0.15) {
                0
            } else {
                self.rng.gen_range(0..=ceiling)
            };
            for i in 0..fanout {
                if graph.len() >= max_nodes {
                    return Ok(graph);
                }
                let id = if parent.is_root() {
                    format!("org-{i}")
                } else {
                    format!("{}-{i}", parent.id)
                };
                let child = self.node(Some(&parent), &id, &format!("Growth {id}"));
                graph.add(child.clone())?;
                frontier.push_back(child);
            }
        }
        Ok(graph)
    }

    /// Random tree of exactly `node_count` nodes (at least 1), depth at most
    /// `max_depth`, no node holding more than `max_fanout` children.
    pub fn random_tree(
        &mut self,
        node_count: usize,
        max_depth: u32,
        max_fanout: usize,
    ) -> Result<Graph> {
        let max_fanout = max_fanout.max(1);
        let mut graph = Graph::new();
        let root = self.node(None, "root", "Root");
        graph.add(root.clone())?;

        // Nodes that may still take children.
        let mut open: Vec<GraphNode> = if max_depth > 0 { vec![root] } else { Vec::new() };
        let mut fanout: std::collections::HashMap<NodeId, usize> = Default::default();
        let mut next_root = 1usize;

        while graph.len() < node_count {
            if open.is_empty() {
                // Everything is saturated: start another root.
                let extra = self.node(None, &format!("root-{next_root}"), "Root");
                next_root += 1;
                graph.add(extra.clone())?;
                if max_depth > 0 {
                    open.push(extra);
                }
                continue;
            }
            let pick = self.rng.gen_range(0..open.len());
            let parent = open[pick].clone();
            let id = format!("r-{}", graph.len());
            let child = self.node(Some(&parent), &id, &id);
            graph.add(child.clone())?;

            let count = fanout.entry(parent.id.clone()).or_default();
            *count += 1;
            if *count >= max_fanout {
                open.swap_remove(pick);
            }
            if child.depth < max_depth {
                open.push(child);
            }
        }
        Ok(graph)
    }

    fn node(&mut self, parent: Option<&GraphNode>, id: &str, label: &str) -> GraphNode {
        let node = match parent {
            Some(parent) => GraphNode::child_of(id, parent),
            None => GraphNode::root(id),
        };
        let node_type = match node.depth {
            0 => "root",
            1 => "concept",
            2 => "category",
            3 => "topic",
            _ => "detail",
        };
        let mut metadata = NodeMetadata {
            label: label.to_string(),
            node_type: node_type.to_string(),
            tags: vec![format!("depth-{}", node.depth)],
            created: Timestamp::Int(CREATED_BASE_MS + self.counter),
            extra: serde_json::Map::new(),
        };
        metadata.extra.insert(
            "energy".to_string(),
            serde_json::json!(self.rng.gen_range(0.0..1.0f64)),
        );
        self.counter += 1;
        node.with_metadata(metadata)
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
