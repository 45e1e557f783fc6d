use fractality_core::{FractalityError, GraphNode, NodeId, Result, stable_hash};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::mem::size_of;

/// Rough per-entry overhead of a hash map slot, used by [`Graph::memory_footprint`].
const MAP_ENTRY_OVERHEAD: usize = 16;
/// Estimated size of an opaque metadata value.
const METADATA_VALUE_ESTIMATE: usize = 64;

/// In-memory node store with parent/child, sibling and depth indices.
///
/// Every public mutation keeps the graph invariants: parents exist, the
/// parent/child relation is mirrored in both directions, depths follow the
/// parent chain, there are no cycles and sibling caches match the parent's
/// children. Not thread-safe; the engine only reads it during frames.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: HashMap<NodeId, GraphNode>,
    /// Insertion order, for deterministic iteration.
    order: Vec<NodeId>,
    depth_index: BTreeMap<u32, Vec<NodeId>>,
    version: String,
}

impl Graph {
    pub fn new() -> Self {
        Self::with_version("1.0")
    }

    pub fn with_version(version: impl Into<String>) -> Self {
        Self {
            nodes: HashMap::new(),
            order: Vec::new(),
            depth_index: BTreeMap::new(),
            version: version.into(),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    /// Nodes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &GraphNode> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn ids(&self) -> &[NodeId] {
        &self.order
    }

    /// Children in canonical (insertion) order. Empty if `id` is unknown.
    pub fn children(&self, id: &str) -> &[NodeId] {
        self.nodes
            .get(id)
            .map(|n| n.child_ids.as_slice())
            .unwrap_or(&[])
    }

    /// Siblings of `id`. Empty for roots and unknown ids.
    pub fn siblings(&self, id: &str) -> &[NodeId] {
        self.nodes
            .get(id)
            .map(|n| n.sibling_ids.as_slice())
            .unwrap_or(&[])
    }

    pub fn parent(&self, id: &str) -> Option<&GraphNode> {
        self.nodes
            .get(id)
            .and_then(|n| n.parent_id.as_ref())
            .and_then(|pid| self.nodes.get(pid))
    }

    pub fn nodes_at_depth(&self, depth: u32) -> &[NodeId] {
        self.depth_index
            .get(&depth)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn roots(&self) -> &[NodeId] {
        self.nodes_at_depth(0)
    }

    pub fn max_depth(&self) -> u32 {
        self.depth_index.keys().next_back().copied().unwrap_or(0)
    }

    /// PRNG seed derived from the root ids; stable for a given graph shape.
    pub fn seed(&self) -> u64 {
        self.roots()
            .iter()
            .fold(0x9e37_79b9_7f4a_7c15, |acc, id| {
                acc.rotate_left(5) ^ stable_hash(id.as_str())
            })
    }

    /// Adds one node.
    ///
    /// The parent must already be present and `depth` must equal the parent's
    /// depth plus one (zero for roots). Children attach themselves later by
    /// naming this node as parent, so declared `child_ids` that are not yet in
    /// the graph are dropped; a declared child that is already present would
    /// re-parent an existing node and is rejected.
    pub fn add(&mut self, mut node: GraphNode) -> Result<()> {
        if self.nodes.contains_key(&node.id) {
            return Err(FractalityError::invariant(format!(
                "duplicate node id '{}'",
                node.id
            )));
        }
        if node.parent_id.as_ref() == Some(&node.id) {
            return Err(FractalityError::invariant(format!(
                "node '{}' cannot be its own parent",
                node.id
            )));
        }
        if let Some(existing) = node.child_ids.iter().find(|c| self.nodes.contains_key(*c)) {
            return Err(FractalityError::invariant(format!(
                "adding '{}' would re-parent existing node '{}' (cycle or second parent)",
                node.id, existing
            )));
        }
        if !node.child_ids.is_empty() {
            tracing::debug!(
                "Dropping {} pending child ids declared on '{}'",
                node.child_ids.len(),
                node.id
            );
            node.child_ids.clear();
        }

        match &node.parent_id {
            Some(parent_id) => {
                let parent = self.nodes.get(parent_id).ok_or_else(|| {
                    FractalityError::invariant(format!(
                        "parent '{}' of '{}' is not in the graph",
                        parent_id, node.id
                    ))
                })?;
                if node.depth != parent.depth + 1 {
                    return Err(FractalityError::invariant(format!(
                        "depth of '{}' is {} but parent '{}' has depth {}",
                        node.id, node.depth, parent_id, parent.depth
                    )));
                }
            }
            None if node.depth != 0 => {
                return Err(FractalityError::invariant(format!(
                    "root '{}' must have depth 0, got {}",
                    node.id, node.depth
                )));
            }
            None => {}
        }

        let id = node.id.clone();
        node.sibling_ids.clear();
        if let Some(parent_id) = node.parent_id.clone()
            && let Some(parent) = self.nodes.get_mut(&parent_id)
        {
            node.sibling_ids = parent.child_ids.clone();
            parent.child_ids.push(id.clone());
            for sibling in &node.sibling_ids {
                if let Some(sibling) = self.nodes.get_mut(sibling) {
                    sibling.sibling_ids.push(id.clone());
                }
            }
        }

        self.depth_index
            .entry(node.depth)
            .or_default()
            .push(id.clone());
        self.order.push(id.clone());
        self.nodes.insert(id, node);
        Ok(())
    }

    /// Builds a graph from fully materialized nodes in two passes: first all
    /// nodes are keyed, then parent links are checked, child lists rebuilt,
    /// depths re-derived from the parent chain and sibling caches filled.
    ///
    /// Dangling child ids are dropped, children that name a parent without
    /// being listed by it are appended, and wrong stored depths are repaired.
    /// Unknown parents and cycles are rejected.
    pub fn from_nodes(version: impl Into<String>, nodes: Vec<GraphNode>) -> Result<Self> {
        let mut graph = Graph::with_version(version);

        // Pass 1: materialize.
        for mut node in nodes {
            if graph.nodes.contains_key(&node.id) {
                return Err(FractalityError::invariant(format!(
                    "duplicate node id '{}'",
                    node.id
                )));
            }
            node.sibling_ids.clear();
            graph.order.push(node.id.clone());
            graph.nodes.insert(node.id.clone(), node);
        }

        // Pass 2: re-seat into indices.
        let mut claimed: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for id in &graph.order {
            let node = &graph.nodes[id];
            if let Some(parent_id) = &node.parent_id {
                if parent_id == id {
                    return Err(FractalityError::invariant(format!(
                        "node '{id}' cannot be its own parent"
                    )));
                }
                if !graph.nodes.contains_key(parent_id) {
                    return Err(FractalityError::invariant(format!(
                        "parent '{parent_id}' of '{id}' is not in the graph"
                    )));
                }
                claimed
                    .entry(parent_id.clone())
                    .or_default()
                    .push(id.clone());
            }
        }

        for id in graph.order.clone() {
            let claimants = claimed.remove(&id).unwrap_or_default();
            let Some(node) = graph.nodes.get_mut(&id) else {
                continue;
            };
            let claimant_set: HashSet<&NodeId> = claimants.iter().collect();
            let mut seen = HashSet::new();
            let mut child_ids = Vec::with_capacity(claimants.len());
            for declared in &node.child_ids {
                if claimant_set.contains(declared) && seen.insert(declared.clone()) {
                    child_ids.push(declared.clone());
                } else if !claimant_set.contains(declared) {
                    tracing::warn!(
                        "Dropping child id '{}' of '{}': node missing or names another parent",
                        declared,
                        id
                    );
                }
            }
            for claimant in claimants {
                if seen.insert(claimant.clone()) {
                    child_ids.push(claimant);
                }
            }
            node.child_ids = child_ids;
        }

        graph.reseat_depths()?;
        graph.rebuild_siblings();
        Ok(graph)
    }

    fn reseat_depths(&mut self) -> Result<()> {
        let mut queue: VecDeque<(NodeId, u32)> = self
            .order
            .iter()
            .filter(|id| self.nodes[*id].parent_id.is_none())
            .map(|id| (id.clone(), 0))
            .collect();

        let mut visited = HashSet::with_capacity(self.nodes.len());
        self.depth_index.clear();
        let mut assigned: HashMap<NodeId, u32> = HashMap::with_capacity(self.nodes.len());
        while let Some((id, depth)) = queue.pop_front() {
            if !visited.insert(id.clone()) {
                continue;
            }
            assigned.insert(id.clone(), depth);
            for child in &self.nodes[&id].child_ids {
                queue.push_back((child.clone(), depth + 1));
            }
        }

        if visited.len() != self.nodes.len() {
            let stuck = self
                .order
                .iter()
                .find(|id| !visited.contains(*id))
                .map(|id| id.to_string())
                .unwrap_or_default();
            return Err(FractalityError::invariant(format!(
                "parent relation has a cycle through '{stuck}'"
            )));
        }

        for id in &self.order {
            let depth = assigned[id];
            if let Some(node) = self.nodes.get_mut(id) {
                if node.depth != depth {
                    tracing::debug!(
                        "Repairing depth of '{}' from {} to {}",
                        id,
                        node.depth,
                        depth
                    );
                    node.depth = depth;
                }
            }
            self.depth_index.entry(depth).or_default().push(id.clone());
        }
        Ok(())
    }

    fn rebuild_siblings(&mut self) {
        let families: Vec<Vec<NodeId>> = self
            .order
            .iter()
            .map(|id| self.nodes[id].child_ids.clone())
            .filter(|children| !children.is_empty())
            .collect();
        for children in families {
            for child in &children {
                if let Some(node) = self.nodes.get_mut(child) {
                    node.sibling_ids = children.iter().filter(|c| *c != child).cloned().collect();
                }
            }
        }
    }

    /// New graph holding at most `limit` nodes in breadth-first order from the
    /// roots, skipping everything deeper than `max_depth`.
    pub fn retain_bfs(&self, limit: Option<usize>, max_depth: Option<u32>) -> Result<Graph> {
        let limit = limit.unwrap_or(usize::MAX);
        let max_depth = max_depth.unwrap_or(u32::MAX);
        let mut out = Graph::with_version(self.version.clone());
        let mut queue: VecDeque<&NodeId> = self.roots().iter().collect();

        while let Some(id) = queue.pop_front() {
            if out.len() >= limit {
                break;
            }
            let Some(node) = self.nodes.get(id) else {
                continue;
            };
            if node.depth > max_depth {
                continue;
            }
            let mut copy = node.clone();
            copy.child_ids.clear();
            copy.sibling_ids.clear();
            out.add(copy)?;
            queue.extend(node.child_ids.iter());
        }
        Ok(out)
    }

    /// Checks every structural invariant. Intended for tests and debug builds.
    pub fn validate(&self) -> Result<()> {
        for node in self.iter() {
            match &node.parent_id {
                Some(parent_id) => {
                    let parent = self.nodes.get(parent_id).ok_or_else(|| {
                        FractalityError::invariant(format!(
                            "'{}' names missing parent '{}'",
                            node.id, parent_id
                        ))
                    })?;
                    if !parent.child_ids.contains(&node.id) {
                        return Err(FractalityError::invariant(format!(
                            "'{}' is not listed among children of '{}'",
                            node.id, parent_id
                        )));
                    }
                    if node.depth != parent.depth + 1 {
                        return Err(FractalityError::invariant(format!(
                            "depth of '{}' does not follow its parent",
                            node.id
                        )));
                    }
                    let expected: Vec<&NodeId> =
                        parent.child_ids.iter().filter(|c| **c != node.id).collect();
                    let actual: Vec<&NodeId> = node.sibling_ids.iter().collect();
                    if expected != actual {
                        return Err(FractalityError::invariant(format!(
                            "sibling cache of '{}' is stale",
                            node.id
                        )));
                    }
                }
                None => {
                    if node.depth != 0 || !node.sibling_ids.is_empty() {
                        return Err(FractalityError::invariant(format!(
                            "root '{}' has depth {} or siblings",
                            node.id, node.depth
                        )));
                    }
                }
            }
            for child in &node.child_ids {
                let child_node = self.nodes.get(child).ok_or_else(|| {
                    FractalityError::invariant(format!(
                        "'{}' lists missing child '{}'",
                        node.id, child
                    ))
                })?;
                if child_node.parent_id.as_ref() != Some(&node.id) {
                    return Err(FractalityError::invariant(format!(
                        "child '{}' of '{}' names another parent",
                        child, node.id
                    )));
                }
            }
        }
        // Strictly increasing depth along parent links rules out cycles.
        Ok(())
    }

    /// Approximate heap footprint in bytes, used by the loader's cache budget.
    pub fn memory_footprint(&self) -> usize {
        let id_size = size_of::<NodeId>();
        let mut bytes = size_of::<Self>() + self.version.len();
        for node in self.nodes.values() {
            bytes += size_of::<GraphNode>() + MAP_ENTRY_OVERHEAD;
            // key in the map plus entries in `order` and the depth index
            bytes += 3 * (id_size + node.id.0.len());
            bytes += node.parent_id.as_ref().map_or(0, |p| p.0.len());
            bytes += node
                .child_ids
                .iter()
                .chain(node.sibling_ids.iter())
                .map(|c| id_size + c.0.len())
                .sum::<usize>();
            let meta = &node.metadata;
            bytes += meta.label.len() + meta.node_type.len();
            bytes += meta.tags.iter().map(|t| t.len() + size_of::<String>()).sum::<usize>();
            bytes += meta
                .extra
                .keys()
                .map(|k| k.len() + METADATA_VALUE_ESTIMATE)
                .sum::<usize>();
        }
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_graph() -> Graph {
        let mut graph = Graph::new();
        let root = GraphNode::root("root");
        let a = GraphNode::child_of("a", &root);
        let b = GraphNode::child_of("b", &root);
        let a1 = GraphNode::child_of("a1", &a);
        graph.add(root).unwrap();
        graph.add(a).unwrap();
        graph.add(b).unwrap();
        graph.add(a1).unwrap();
        graph
    }

    #[test]
    fn test_add_maintains_indices() {
        let graph = small_graph();
        assert_eq!(graph.len(), 4);
        assert_eq!(graph.children("root"), &[NodeId::from("a"), NodeId::from("b")]);
        assert_eq!(graph.siblings("a"), &[NodeId::from("b")]);
        assert_eq!(graph.siblings("b"), &[NodeId::from("a")]);
        assert!(graph.siblings("root").is_empty());
        assert_eq!(graph.nodes_at_depth(1).len(), 2);
        assert_eq!(graph.nodes_at_depth(2), &[NodeId::from("a1")]);
        assert_eq!(graph.parent("a1").map(|n| n.id.as_str()), Some("a"));
        graph.validate().unwrap();
    }

    #[test]
    fn test_unknown_ids_yield_empty() {
        let graph = small_graph();
        assert!(graph.get("zzz").is_none());
        assert!(graph.children("zzz").is_empty());
        assert!(graph.siblings("zzz").is_empty());
        assert!(graph.nodes_at_depth(9).is_empty());
    }

    #[test]
    fn test_add_rejects_duplicates() {
        let mut graph = small_graph();
        let err = graph.add(GraphNode::root("root")).unwrap_err();
        assert_eq!(err.kind(), fractality_core::ErrorKind::InvariantViolation);
    }

    #[test]
    fn test_add_rejects_cycle_through_existing_child() {
        let mut graph = small_graph();
        // "x" claims the existing root as its child while hanging under a1:
        // root -> a -> a1 -> x -> root.
        let a1 = graph.get("a1").unwrap().clone();
        let mut x = GraphNode::child_of("x", &a1);
        x.child_ids.push(NodeId::from("root"));
        let err = graph.add(x).unwrap_err();
        assert_eq!(err.kind(), fractality_core::ErrorKind::InvariantViolation);
        graph.validate().unwrap();
    }

    #[test]
    fn test_add_rejects_missing_parent_and_bad_depth() {
        let mut graph = small_graph();
        let mut orphan = GraphNode::root("orphan");
        orphan.parent_id = Some(NodeId::from("ghost"));
        orphan.depth = 1;
        assert!(graph.add(orphan).is_err());

        let root = graph.get("root").unwrap().clone();
        let mut wrong = GraphNode::child_of("wrong", &root);
        wrong.depth = 5;
        assert!(graph.add(wrong).is_err());

        let mut self_loop = GraphNode::root("loop");
        self_loop.parent_id = Some(NodeId::from("loop"));
        assert!(graph.add(self_loop).is_err());
    }

    #[test]
    fn test_from_nodes_rebuilds_children_and_depths() {
        let root = GraphNode::root("root");
        let mut b = GraphNode::child_of("b", &root);
        b.depth = 7; // wrong on purpose
        let a = GraphNode::child_of("a", &root);
        let mut root = root;
        // declares b first, omits a, and lists a ghost
        root.child_ids = vec![NodeId::from("b"), NodeId::from("ghost")];

        let graph = Graph::from_nodes("1.0", vec![b, root, a]).unwrap();
        assert_eq!(graph.children("root"), &[NodeId::from("b"), NodeId::from("a")]);
        assert_eq!(graph.get("b").unwrap().depth, 1);
        assert_eq!(graph.siblings("a"), &[NodeId::from("b")]);
        graph.validate().unwrap();
    }

    #[test]
    fn test_from_nodes_rejects_cycle() {
        let mut a = GraphNode::root("a");
        let mut b = GraphNode::root("b");
        a.parent_id = Some(NodeId::from("b"));
        b.parent_id = Some(NodeId::from("a"));
        let err = Graph::from_nodes("1.0", vec![a, b]).unwrap_err();
        assert!(err.message().contains("cycle"));
    }

    #[test]
    fn test_retain_bfs_limit_and_depth() {
        let graph = small_graph();
        let limited = graph.retain_bfs(Some(3), None).unwrap();
        assert_eq!(limited.len(), 3);
        assert!(limited.contains("b"));
        assert!(!limited.contains("a1"));

        let shallow = graph.retain_bfs(None, Some(1)).unwrap();
        assert_eq!(shallow.len(), 3);
        assert!(shallow.children("a").is_empty());
        shallow.validate().unwrap();
    }

    #[test]
    fn test_memory_footprint_grows_with_nodes() {
        let graph = small_graph();
        let smaller = graph.retain_bfs(Some(2), None).unwrap();
        assert!(graph.memory_footprint() > smaller.memory_footprint());
        assert!(smaller.memory_footprint() > 0);
    }

    #[test]
    fn test_seed_depends_on_roots() {
        let graph = small_graph();
        let mut other = Graph::new();
        other.add(GraphNode::root("another")).unwrap();
        assert_eq!(graph.seed(), small_graph().seed());
        assert_ne!(graph.seed(), other.seed());
    }
}
