use crate::store::Graph;
use fractality_core::{FamilyViewConfig, GraphNode, Kinship, NodeId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_VIEW_TTL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleNode {
    pub id: NodeId,
    pub role: Kinship,
}

/// Ordered visible set: focus first, then parent, grandparent, siblings,
/// children and context kin. Empty when the focus is not in the graph.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FamilyView {
    pub focus: Option<NodeId>,
    pub entries: Vec<VisibleNode>,
}

impl FamilyView {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &NodeId> {
        self.entries.iter().map(|e| &e.id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e.id.as_str() == id)
    }

    pub fn role_of(&self, id: &str) -> Option<Kinship> {
        self.entries
            .iter()
            .find(|e| e.id.as_str() == id)
            .map(|e| e.role)
    }
}

/// Emphasis weight per kinship role.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorityWeights {
    pub focus: f32,
    pub parent: f32,
    pub child: f32,
    pub sibling: f32,
    pub grandparent: f32,
    pub other: f32,
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            focus: 3.0,
            parent: 2.0,
            child: 1.5,
            sibling: 1.0,
            grandparent: 0.8,
            other: 1.0,
        }
    }
}

impl PriorityWeights {
    pub fn for_role(&self, role: Kinship) -> f32 {
        match role {
            Kinship::Focus => self.focus,
            Kinship::Parent => self.parent,
            Kinship::Grandparent => self.grandparent,
            Kinship::Sibling => self.sibling,
            Kinship::Child => self.child,
            Kinship::Context { .. } => self.other,
        }
    }
}

/// Role of `id` relative to `focus`, derived from graph structure alone.
pub fn kinship(graph: &Graph, id: &str, focus: &str) -> Option<Kinship> {
    if id == focus {
        return Some(Kinship::Focus);
    }
    let node = graph.get(id)?;
    let focus_node = graph.get(focus)?;
    if focus_node.parent_id.as_ref().is_some_and(|p| p.as_str() == id) {
        return Some(Kinship::Parent);
    }
    if node.parent_id.as_ref().is_some_and(|p| p.as_str() == focus) {
        return Some(Kinship::Child);
    }
    if focus_node.sibling_ids.iter().any(|s| s.as_str() == id) {
        return Some(Kinship::Sibling);
    }
    if graph
        .parent(focus)
        .and_then(|p| p.parent_id.as_ref())
        .is_some_and(|gp| gp.as_str() == id)
    {
        return Some(Kinship::Grandparent);
    }
    None
}

#[derive(Debug)]
struct CachedView {
    at: Duration,
    view: Arc<FamilyView>,
}

/// Computes the visible set for a focus with a short-lived result cache.
///
/// Callers pass the current time explicitly so cache expiry follows the
/// engine clock.
#[derive(Debug)]
pub struct FamilyViewSelector {
    weights: PriorityWeights,
    ttl: Duration,
    cache: HashMap<(NodeId, FamilyViewConfig), CachedView>,
    computations: u64,
}

impl Default for FamilyViewSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl FamilyViewSelector {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_VIEW_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            weights: PriorityWeights::default(),
            ttl,
            cache: HashMap::new(),
            computations: 0,
        }
    }

    pub fn weights(&self) -> &PriorityWeights {
        &self.weights
    }

    /// Number of uncached selections performed so far.
    pub fn computations(&self) -> u64 {
        self.computations
    }

    pub fn invalidate(&mut self) {
        self.cache.clear();
    }

    pub fn select(
        &mut self,
        graph: &Graph,
        focus: &str,
        config: &FamilyViewConfig,
        now: Duration,
    ) -> Arc<FamilyView> {
        let key = (NodeId::from(focus), config.clone());
        if let Some(cached) = self.cache.get(&key)
            && now.saturating_sub(cached.at) < self.ttl
        {
            return Arc::clone(&cached.view);
        }

        let ttl = self.ttl;
        self.cache
            .retain(|_, cached| now.saturating_sub(cached.at) < ttl);

        let view = Arc::new(compute_family_view(graph, focus, config));
        self.computations += 1;
        self.cache.insert(
            key,
            CachedView {
                at: now,
                view: Arc::clone(&view),
            },
        );
        view
    }

    /// Emphasis weight of `id` with respect to `focus`; unrelated nodes get
    /// the `other` weight.
    pub fn priority(&self, graph: &Graph, id: &str, focus: &str) -> f32 {
        kinship(graph, id, focus)
            .map(|role| self.weights.for_role(role))
            .unwrap_or(self.weights.other)
    }
}

/// Uncached selection. Deterministic for a given graph, focus and config.
pub fn compute_family_view(graph: &Graph, focus: &str, config: &FamilyViewConfig) -> FamilyView {
    let Some(focus_node) = graph.get(focus) else {
        return FamilyView::default();
    };

    let mut out = ViewBuilder::default();
    out.push(&focus_node.id, Kinship::Focus);

    let parent = graph.parent(focus);
    if config.show_parent
        && let Some(parent) = parent
    {
        out.push(&parent.id, Kinship::Parent);
    }
    if config.show_grandparent
        && let Some(grandparent) = parent.and_then(|p| graph.parent(p.id.as_str()))
    {
        out.push(&grandparent.id, Kinship::Grandparent);
    }

    for sibling in top_k(graph, &focus_node.sibling_ids, config.max_siblings) {
        out.push(sibling, Kinship::Sibling);
    }
    let children = top_k(graph, &focus_node.child_ids, config.max_children);
    for child in &children {
        out.push(child, Kinship::Child);
    }

    // Context expansion: hop h adds the siblings of the h-th ancestor and the
    // h-th generation below the selected children.
    let mut context_budget = config.max_context;
    let mut ancestor = parent;
    let mut generation: Vec<&NodeId> = children;
    for hops in 1..=config.context_depth {
        if context_budget == 0 {
            break;
        }
        let role = Kinship::Context { hops };

        if let Some(anc) = ancestor {
            for id in &anc.sibling_ids {
                if context_budget == 0 {
                    break;
                }
                if out.push(id, role) {
                    context_budget -= 1;
                }
            }
        }

        let mut next_generation = Vec::new();
        for id in &generation {
            for grandchild in graph.children(id.as_str()) {
                next_generation.push(grandchild);
            }
        }
        for id in &next_generation {
            if context_budget == 0 {
                break;
            }
            if out.push(id, role) {
                context_budget -= 1;
            }
        }

        ancestor = ancestor.and_then(|a| graph.parent(a.id.as_str()));
        generation = next_generation;
    }

    FamilyView {
        focus: Some(focus_node.id.clone()),
        entries: out.entries,
    }
}

/// Top `k` ids by descending child count, ties broken by ascending id.
fn top_k<'g>(graph: &'g Graph, ids: &'g [NodeId], k: usize) -> Vec<&'g NodeId> {
    let mut ranked: Vec<(&NodeId, usize)> = ids
        .iter()
        .map(|id| (id, graph.get(id.as_str()).map_or(0, |n: &GraphNode| n.child_ids.len())))
        .collect();
    ranked.sort_by(|(a_id, a_n), (b_id, b_n)| b_n.cmp(a_n).then_with(|| a_id.cmp(b_id)));
    ranked.into_iter().take(k).map(|(id, _)| id).collect()
}

#[derive(Default)]
struct ViewBuilder {
    seen: HashSet<NodeId>,
    entries: Vec<VisibleNode>,
}

impl ViewBuilder {
    fn push(&mut self, id: &NodeId, role: Kinship) -> bool {
        if !self.seen.insert(id.clone()) {
            return false;
        }
        self.entries.push(VisibleNode {
            id: id.clone(),
            role,
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdata::{TestDataGenerator, TestPattern};

    fn simple() -> Graph {
        TestDataGenerator::default()
            .generate(TestPattern::Simple)
            .unwrap()
    }

    fn ids(view: &FamilyView) -> Vec<&str> {
        view.ids().map(NodeId::as_str).collect()
    }

    #[test]
    fn test_focus_on_root_shows_children() {
        let graph = simple();
        let view = compute_family_view(&graph, "root", &FamilyViewConfig::default());
        assert_eq!(ids(&view), vec!["root", "child-0", "child-1", "child-2"]);
        assert_eq!(view.role_of("child-2"), Some(Kinship::Child));
    }

    #[test]
    fn test_focus_on_child_shows_parent_siblings_children() {
        let graph = simple();
        let view = compute_family_view(&graph, "child-1", &FamilyViewConfig::default());
        assert_eq!(
            ids(&view),
            vec!["child-1", "root", "child-0", "child-2", "child-1-0", "child-1-1"]
        );
        assert_eq!(view.role_of("root"), Some(Kinship::Parent));
        assert_eq!(view.role_of("child-0"), Some(Kinship::Sibling));
    }

    #[test]
    fn test_top_k_prefers_larger_subtrees_then_id() {
        let graph = TestDataGenerator::default()
            .generate(TestPattern::Wide)
            .unwrap();
        let config = FamilyViewConfig {
            max_children: 3,
            ..Default::default()
        };
        let view = compute_family_view(&graph, "root", &config);
        // wide-2, wide-5, wide-8 ... carry two leaves; ids compare as strings.
        assert_eq!(ids(&view), vec!["root", "wide-101", "wide-104", "wide-107"]);
    }

    #[test]
    fn test_grandparent_and_context() {
        let graph = simple();
        let config = FamilyViewConfig {
            show_grandparent: true,
            context_depth: 1,
            ..Default::default()
        };
        let view = compute_family_view(&graph, "child-0-1", &config);
        assert_eq!(view.entries[0].id.as_str(), "child-0-1");
        assert_eq!(view.role_of("child-0"), Some(Kinship::Parent));
        assert_eq!(view.role_of("root"), Some(Kinship::Grandparent));
        assert_eq!(view.role_of("child-1"), Some(Kinship::Context { hops: 1 }));
        assert_eq!(view.role_of("child-2"), Some(Kinship::Context { hops: 1 }));
        let unique: HashSet<_> = view.ids().collect();
        assert_eq!(unique.len(), view.len());
    }

    #[test]
    fn test_context_is_capped() {
        let graph = TestDataGenerator::default()
            .generate(TestPattern::Balanced)
            .unwrap();
        let config = FamilyViewConfig {
            context_depth: 3,
            max_context: 6,
            ..Default::default()
        };
        let view = compute_family_view(&graph, "node-0", &config);
        let context = view
            .entries
            .iter()
            .filter(|e| matches!(e.role, Kinship::Context { .. }))
            .count();
        assert_eq!(context, 6);
    }

    #[test]
    fn test_unknown_focus_is_empty() {
        let graph = simple();
        let view = compute_family_view(&graph, "nope", &FamilyViewConfig::default());
        assert!(view.is_empty());
        assert!(view.focus.is_none());
    }

    #[test]
    fn test_cache_returns_identical_arc_within_ttl() {
        let graph = simple();
        let config = FamilyViewConfig::default();
        let mut selector = FamilyViewSelector::new();
        let a = selector.select(&graph, "root", &config, Duration::from_millis(0));
        let b = selector.select(&graph, "root", &config, Duration::from_millis(900));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(selector.computations(), 1);

        let c = selector.select(&graph, "root", &config, Duration::from_millis(1500));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(*a, *c);

        let other = FamilyViewConfig {
            max_children: 1,
            ..Default::default()
        };
        let d = selector.select(&graph, "root", &other, Duration::from_millis(1500));
        assert_eq!(d.len(), 2);
        selector.invalidate();
        let e = selector.select(&graph, "root", &config, Duration::from_millis(1500));
        assert!(!Arc::ptr_eq(&c, &e));
    }

    #[test]
    fn test_priorities() {
        let graph = simple();
        let selector = FamilyViewSelector::new();
        assert_eq!(selector.priority(&graph, "child-1", "child-1"), 3.0);
        assert_eq!(selector.priority(&graph, "root", "child-1"), 2.0);
        assert_eq!(selector.priority(&graph, "child-1-0", "child-1"), 1.5);
        assert_eq!(selector.priority(&graph, "child-0", "child-1"), 1.0);
        assert_eq!(selector.priority(&graph, "root", "child-1-0"), 0.8);
        assert_eq!(selector.priority(&graph, "child-2-1", "child-1"), 1.0);
    }
}
