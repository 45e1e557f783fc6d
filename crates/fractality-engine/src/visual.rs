use fractality_core::{NodeId, Vec3, VisualState};
use std::collections::HashMap;

/// Per-frame visual state of every node that is, or recently was, on screen.
/// Kept apart from the graph so graph data stays immutable during a session.
#[derive(Debug, Default, Clone)]
pub struct VisualStore {
    states: HashMap<NodeId, VisualState>,
}

impl VisualStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.states.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&VisualState> {
        self.states.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut VisualState> {
        self.states.get_mut(id)
    }

    /// Returns the state for `id`, creating an invisible one at `spawn` if absent.
    pub fn ensure(&mut self, id: &NodeId, spawn: Vec3) -> &mut VisualState {
        self.states
            .entry(id.clone())
            .or_insert_with(|| VisualState::at(spawn))
    }

    pub fn ids(&self) -> impl Iterator<Item = &NodeId> {
        self.states.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &VisualState)> {
        self.states.iter()
    }

    pub fn remove(&mut self, id: &str) -> Option<VisualState> {
        self.states.remove(id)
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&NodeId, &VisualState) -> bool) {
        self.states.retain(|id, state| keep(id, state));
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_spawns_invisible_once() {
        let mut store = VisualStore::new();
        let id = NodeId::from("a");
        store.ensure(&id, Vec3::new(1.0, 2.0, 3.0)).opacity = 0.7;
        let state = store.ensure(&id, Vec3::ZERO);
        assert_eq!(state.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(state.opacity, 0.7);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_retain_drops_states() {
        let mut store = VisualStore::new();
        store.ensure(&NodeId::from("a"), Vec3::ZERO);
        store.ensure(&NodeId::from("b"), Vec3::ZERO);
        store.retain(|id, _| id.as_str() == "a");
        assert!(store.contains("a"));
        assert!(!store.contains("b"));
    }
}
