//! Context & complexity scoring.
//!
//! Global analysis counts descendants and connections once per graph load;
//! per-frame scoring combines those with depth distance, sibling rank and
//! recency of access, then min-max normalizes over the visible set.

use crate::store::Graph;
use fractality_core::{Complexity, FractalityError, NodeId, Result};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;

pub const ANALYSIS_TTL: Duration = Duration::from_secs(5);
pub const ACCESS_CAPACITY: usize = 1000;
pub const ACCESS_DECAY_RATE: f32 = 0.95;
pub const ACCESS_WINDOW: Duration = Duration::from_secs(5);

const DESCENDANT_SATURATION: f32 = 50.0;
const DEPTH_SATURATION: f32 = 5.0;
const CONNECTION_SATURATION: f32 = 10.0;
/// Leaves deeper than this are hinted as dead ends.
const AVOID_DEPTH: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringWeights {
    pub descendants: f32,
    pub depth: f32,
    pub connections: f32,
    pub sibling_rank: f32,
    pub access: f32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            descendants: 0.30,
            depth: 0.20,
            connections: 0.20,
            sibling_rank: 0.15,
            access: 0.15,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeAnalysis {
    pub descendants: usize,
    pub connections: usize,
    pub complexity: Complexity,
    analyzed_at: Duration,
}

/// Counts nodes reachable below `start`. Terminates on cyclic input: a node
/// already visited is not expanded again.
pub fn count_descendants<'a, F>(start: &'a str, children: F) -> usize
where
    F: Fn(&str) -> &'a [NodeId],
{
    let mut visited: HashSet<&str> = HashSet::new();
    visited.insert(start);
    let mut stack: Vec<&str> = vec![start];
    let mut count = 0;
    while let Some(id) = stack.pop() {
        for child in children(id) {
            if visited.insert(child.as_str()) {
                count += 1;
                stack.push(child.as_str());
            }
        }
    }
    count
}

/// Bounded record of when each node was last focused. The oldest stamp is
/// evicted once `capacity` is exceeded.
#[derive(Debug, Clone)]
pub struct AccessTracker {
    capacity: usize,
    decay_rate: f32,
    window: Duration,
    stamps: HashMap<NodeId, (Duration, u64)>,
    lru: BTreeMap<u64, NodeId>,
    next_seq: u64,
}

impl Default for AccessTracker {
    fn default() -> Self {
        Self::new(ACCESS_CAPACITY, ACCESS_DECAY_RATE, ACCESS_WINDOW)
    }
}

impl AccessTracker {
    pub fn new(capacity: usize, decay_rate: f32, window: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            decay_rate,
            window,
            stamps: HashMap::new(),
            lru: BTreeMap::new(),
            next_seq: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.stamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stamps.is_empty()
    }

    pub fn last_access(&self, id: &str) -> Option<Duration> {
        self.stamps.get(id).map(|(at, _)| *at)
    }

    pub fn record(&mut self, id: &str, now: Duration) {
        let seq = self.next_seq;
        self.next_seq += 1;
        if let Some((_, old_seq)) = self.stamps.insert(NodeId::from(id), (now, seq)) {
            self.lru.remove(&old_seq);
        }
        self.lru.insert(seq, NodeId::from(id));

        while self.stamps.len() > self.capacity {
            let Some((_, evicted)) = self.lru.pop_first() else {
                break;
            };
            self.stamps.remove(&evicted);
        }
    }

    /// `decay^elapsed_secs` inside the recent window, else 0.
    pub fn score(&self, id: &str, now: Duration) -> f32 {
        let Some((at, _)) = self.stamps.get(id) else {
            return 0.0;
        };
        let elapsed = now.saturating_sub(*at);
        if elapsed > self.window {
            return 0.0;
        }
        self.decay_rate.powf(elapsed.as_secs_f32())
    }

    pub fn clear(&mut self) {
        self.stamps.clear();
        self.lru.clear();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hint {
    pub id: NodeId,
    pub score: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NavigationHints {
    pub recommended: Vec<Hint>,
    pub explore: Vec<Hint>,
    pub avoid: Vec<Hint>,
}

#[derive(Debug)]
pub struct ContextScorer {
    weights: ScoringWeights,
    analysis: HashMap<NodeId, NodeAnalysis>,
    ttl: Duration,
    access: AccessTracker,
}

impl Default for ContextScorer {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextScorer {
    pub fn new() -> Self {
        Self {
            weights: ScoringWeights::default(),
            analysis: HashMap::new(),
            ttl: ANALYSIS_TTL,
            access: AccessTracker::default(),
        }
    }

    pub fn with_weights(mut self, weights: ScoringWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn access(&self) -> &AccessTracker {
        &self.access
    }

    /// Recomputes every node's analysis in one bottom-up pass.
    pub fn analyze(&mut self, graph: &Graph, now: Duration) {
        self.analysis.clear();
        self.analysis.reserve(graph.len());
        for depth in (0..=graph.max_depth()).rev() {
            for id in graph.nodes_at_depth(depth) {
                let Some(node) = graph.get(id.as_str()) else {
                    continue;
                };
                let descendants = node
                    .child_ids
                    .iter()
                    .map(|c| self.analysis.get(c).map_or(0, |a| a.descendants) + 1)
                    .sum();
                self.analysis.insert(
                    id.clone(),
                    NodeAnalysis {
                        descendants,
                        connections: node.connection_count(),
                        complexity: Complexity::from_descendants(descendants),
                        analyzed_at: now,
                    },
                );
            }
        }
        tracing::debug!("Analyzed {} nodes", self.analysis.len());
    }

    /// Analysis of one node, refreshed if missing or older than the TTL.
    pub fn analysis(&mut self, graph: &Graph, id: &str, now: Duration) -> Option<NodeAnalysis> {
        if let Some(cached) = self.analysis.get(id)
            && now.saturating_sub(cached.analyzed_at) < self.ttl
        {
            return Some(*cached);
        }
        let node = graph.get(id)?;
        let descendants = count_descendants(node.id.as_str(), |n| graph.children(n));
        let fresh = NodeAnalysis {
            descendants,
            connections: node.connection_count(),
            complexity: Complexity::from_descendants(descendants),
            analyzed_at: now,
        };
        self.analysis.insert(node.id.clone(), fresh);
        Some(fresh)
    }

    pub fn complexity(&self, id: &str) -> Option<Complexity> {
        self.analysis.get(id).map(|a| a.complexity)
    }

    pub fn record_access(&mut self, id: &str, now: Duration) {
        self.access.record(id, now);
    }

    pub fn access_score(&self, id: &str, now: Duration) -> f32 {
        self.access.score(id, now)
    }

    pub fn invalidate(&mut self) {
        self.analysis.clear();
    }

    fn raw_score(
        &mut self,
        graph: &Graph,
        id: &str,
        focus_depth: u32,
        now: Duration,
    ) -> Result<f32> {
        let node = graph
            .get(id)
            .ok_or_else(|| {
                FractalityError::invariant(format!("visible node '{id}' is not in the graph"))
            })?;
        let analysis = self
            .analysis(graph, id, now)
            .ok_or_else(|| FractalityError::invariant(format!("no analysis for '{id}'")))?;
        let w = self.weights;

        let descendants = (analysis.descendants as f32 / DESCENDANT_SATURATION).min(1.0);
        let depth_gap = node.depth.abs_diff(focus_depth) as f32;
        let depth = 1.0 - (depth_gap / DEPTH_SATURATION).min(1.0);
        let connections = (analysis.connections as f32 / CONNECTION_SATURATION).min(1.0);
        let sibling_rank = sibling_rank(graph, id);
        let access = self.access.score(id, now);

        Ok(w.descendants * descendants
            + w.depth * depth
            + w.connections * connections
            + w.sibling_rank * sibling_rank
            + w.access * access)
    }

    /// Normalized context scores in `[0, 1]` for the visible set. If every raw
    /// score is equal, all scores are exactly 0.5.
    pub fn score<'a, I>(
        &mut self,
        graph: &Graph,
        visible: I,
        focus: &str,
        now: Duration,
    ) -> Result<HashMap<NodeId, f32>>
    where
        I: IntoIterator<Item = &'a NodeId>,
    {
        let focus_depth = graph
            .get(focus)
            .map(|n| n.depth)
            .ok_or_else(|| {
                FractalityError::invariant(format!("focus '{focus}' is not in the graph"))
            })?;

        let mut raw: Vec<(NodeId, f32)> = Vec::new();
        for id in visible {
            let value = self.raw_score(graph, id.as_str(), focus_depth, now)?;
            raw.push((id.clone(), value));
        }
        Ok(normalize(raw))
    }

    /// Three ranked lists built from analysis and access history, each
    /// truncated to `limit`.
    pub fn navigation_hints(
        &mut self,
        graph: &Graph,
        now: Duration,
        limit: usize,
    ) -> NavigationHints {
        let mut hints = NavigationHints::default();
        for node in graph.iter() {
            let Some(analysis) = self.analysis(graph, node.id.as_str(), now) else {
                continue;
            };
            let access = self.access.score(node.id.as_str(), now);
            if access > 0.0 {
                hints.recommended.push(Hint {
                    id: node.id.clone(),
                    score: access,
                });
            }
            if analysis.descendants > 0 && access < 0.5 {
                let breadth = (analysis.descendants as f32 / DESCENDANT_SATURATION).min(1.0);
                hints.explore.push(Hint {
                    id: node.id.clone(),
                    score: breadth * (1.0 - access),
                });
            }
            if node.is_leaf() && node.depth > AVOID_DEPTH {
                hints.avoid.push(Hint {
                    id: node.id.clone(),
                    score: ((node.depth - AVOID_DEPTH) as f32 / DEPTH_SATURATION).min(1.0),
                });
            }
        }
        for list in [&mut hints.recommended, &mut hints.explore, &mut hints.avoid] {
            list.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
            list.truncate(limit);
        }
        hints
    }
}

/// `1 - rank / n` where `rank` is the position by id among the parent's
/// children; roots score 1.
pub fn sibling_rank(graph: &Graph, id: &str) -> f32 {
    let Some(parent) = graph.parent(id) else {
        return 1.0;
    };
    let family = &parent.child_ids;
    if family.is_empty() {
        return 1.0;
    }
    let rank = family.iter().filter(|c| c.as_str() < id).count();
    1.0 - rank as f32 / family.len() as f32
}

fn normalize(raw: Vec<(NodeId, f32)>) -> HashMap<NodeId, f32> {
    let (min, max) = raw
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), (_, v)| (lo.min(*v), hi.max(*v)));
    let span = max - min;
    raw.into_iter()
        .map(|(id, v)| {
            let score = if span > f32::EPSILON {
                ((v - min) / span).clamp(0.0, 1.0)
            } else {
                0.5
            };
            (id, score)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdata::{TestDataGenerator, TestPattern};
    use fractality_core::GraphNode;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn star(leaves: usize) -> Graph {
        let mut graph = Graph::new();
        let root = GraphNode::root("root");
        graph.add(root.clone()).unwrap();
        for i in 0..leaves {
            graph.add(GraphNode::child_of(format!("leaf-{i}"), &root)).unwrap();
        }
        graph
    }

    #[test]
    fn test_analyze_counts_descendants() {
        let graph = TestDataGenerator::default()
            .generate(TestPattern::Balanced)
            .unwrap();
        let mut scorer = ContextScorer::new();
        scorer.analyze(&graph, ms(0));
        let root = scorer.analysis(&graph, "root", ms(10)).unwrap();
        assert_eq!(root.descendants, 84);
        assert_eq!(root.connections, 4);
        assert_eq!(root.complexity, Complexity::Complex);
        assert_eq!(scorer.complexity("node-0"), Some(Complexity::Complex));
        assert_eq!(scorer.complexity("node-0-0"), Some(Complexity::Simple));
        assert_eq!(scorer.analysis(&graph, "node-0-0-0", ms(10)).unwrap().descendants, 0);
    }

    #[test]
    fn test_descendant_count_survives_cycles() {
        let mut edges: HashMap<String, Vec<NodeId>> = HashMap::new();
        edges.insert("a".into(), vec![NodeId::from("b")]);
        edges.insert("b".into(), vec![NodeId::from("c")]);
        edges.insert("c".into(), vec![NodeId::from("a"), NodeId::from("d")]);
        let count = count_descendants("a", |id| edges.get(id).map(Vec::as_slice).unwrap_or(&[]));
        assert_eq!(count, 3);
    }

    #[test]
    fn test_lazy_analysis_refresh_after_ttl() {
        let graph = star(3);
        let mut scorer = ContextScorer::new();
        let first = scorer.analysis(&graph, "root", ms(0)).unwrap();
        assert_eq!(first.descendants, 3);
        let again = scorer.analysis(&graph, "root", ms(6000)).unwrap();
        assert_eq!(again.descendants, 3);
        assert!(scorer.analysis(&graph, "ghost", ms(0)).is_none());
    }

    #[test]
    fn test_root_outscores_equal_leaves() {
        let graph = star(5);
        let mut scorer = ContextScorer::new();
        scorer.analyze(&graph, ms(0));
        let visible: Vec<NodeId> = graph.ids().to_vec();
        let scores = scorer.score(&graph, &visible, "root", ms(0)).unwrap();
        let root = scores["root"];
        assert_eq!(root, 1.0);
        for i in 0..5 {
            let leaf = scores[format!("leaf-{i}").as_str()];
            assert!((0.0..1.0).contains(&leaf));
            assert!(leaf < root);
        }
    }

    #[test]
    fn test_all_equal_raw_scores_normalize_to_half() {
        let mut graph = Graph::new();
        graph.add(GraphNode::root("a")).unwrap();
        let mut scorer = ContextScorer::new();
        let visible = [NodeId::from("a")];
        let scores = scorer.score(&graph, &visible, "a", ms(0)).unwrap();
        assert_eq!(scores["a"], 0.5);
    }

    #[test]
    fn test_unknown_visible_id_is_an_error() {
        let graph = star(2);
        let mut scorer = ContextScorer::new();
        let visible = [NodeId::from("root"), NodeId::from("ghost")];
        assert!(scorer.score(&graph, &visible, "root", ms(0)).is_err());
        assert!(scorer.score(&graph, &visible[..1], "ghost", ms(0)).is_err());
    }

    #[test]
    fn test_access_score_decays_and_expires() {
        let mut tracker = AccessTracker::default();
        tracker.record("a", ms(1000));
        assert_eq!(tracker.score("a", ms(1000)), 1.0);
        let later = tracker.score("a", ms(3000));
        assert!((later - 0.95f32.powf(2.0)).abs() < 1e-6);
        assert_eq!(tracker.score("a", ms(6001)), 0.0);
        assert_eq!(tracker.score("b", ms(1000)), 0.0);
    }

    #[test]
    fn test_access_tracker_evicts_oldest() {
        let mut tracker = AccessTracker::new(3, ACCESS_DECAY_RATE, ACCESS_WINDOW);
        tracker.record("a", ms(0));
        tracker.record("b", ms(1));
        tracker.record("c", ms(2));
        tracker.record("a", ms(3));
        tracker.record("d", ms(4));
        assert_eq!(tracker.len(), 3);
        assert!(tracker.last_access("b").is_none());
        assert_eq!(tracker.last_access("a"), Some(ms(3)));
    }

    #[test]
    fn test_recent_access_lifts_score() {
        let graph = star(4);
        let mut scorer = ContextScorer::new();
        scorer.analyze(&graph, ms(0));
        let visible: Vec<NodeId> = graph.ids().to_vec();
        scorer.record_access("leaf-3", ms(100));
        let scores = scorer.score(&graph, &visible, "root", ms(100)).unwrap();
        assert!(scores["leaf-3"] > scores["leaf-1"]);
    }

    #[test]
    fn test_sibling_rank_by_id() {
        let graph = star(4);
        assert_eq!(sibling_rank(&graph, "root"), 1.0);
        assert_eq!(sibling_rank(&graph, "leaf-0"), 1.0);
        assert_eq!(sibling_rank(&graph, "leaf-2"), 0.5);
    }

    #[test]
    fn test_navigation_hints() {
        let graph = TestDataGenerator::default()
            .generate(TestPattern::Deep)
            .unwrap();
        let mut scorer = ContextScorer::new();
        scorer.analyze(&graph, ms(0));
        scorer.record_access("deep-2", ms(0));
        let hints = scorer.navigation_hints(&graph, ms(500), 5);
        assert_eq!(hints.recommended[0].id.as_str(), "deep-2");
        assert_eq!(hints.explore[0].id.as_str(), "root");
        assert!(hints.avoid.len() <= 5);
        assert!(hints.avoid.iter().all(|h| graph.get(h.id.as_str()).unwrap().depth > 3));
        assert!(hints.avoid.windows(2).all(|w| w[0].score >= w[1].score));
    }
}
