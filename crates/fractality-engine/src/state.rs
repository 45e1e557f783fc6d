//! Navigation and view state with deferred change delivery.
//!
//! Every mutator queues its change and delivers the queue to observers once
//! the mutation is complete, so an observer never sees a half-applied update.
//! Inside [`StateStore::batch`] delivery waits until the batch ends.

use fractality_core::{
    FamilyViewConfig, FractalityError, InteractionMode, LayoutConfig, LayoutKind, NodeId, Result,
};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};

pub const HISTORY_CAPACITY: usize = 20;

/// Feature flags the store accepts, with their defaults.
pub const KNOWN_FLAGS: [(&str, bool); 5] = [
    ("labels", true),
    ("navigationHints", false),
    ("pulseOnFocus", true),
    ("rippleOnFocus", false),
    ("autoRotate", false),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StateChange {
    FocusChanged {
        previous: Option<NodeId>,
        current: Option<NodeId>,
    },
    ViewConfigChanged,
    LayoutConfigChanged,
    LayoutChanged {
        layout: LayoutKind,
    },
    ModeChanged {
        mode: InteractionMode,
    },
    FlagChanged {
        name: String,
        enabled: bool,
    },
    GraphReloaded,
}

pub type ObserverId = u64;
type Observer = Box<dyn FnMut(&StateChange) + Send>;

pub struct StateStore {
    focus: Option<NodeId>,
    previous_focus: Option<NodeId>,
    history: VecDeque<NodeId>,
    view_config: FamilyViewConfig,
    layout_config: LayoutConfig,
    mode: InteractionMode,
    flags: BTreeMap<String, bool>,
    needs_layout: bool,
    pending: VecDeque<StateChange>,
    observers: Vec<(ObserverId, Observer)>,
    next_observer: ObserverId,
    batch_depth: usize,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(LayoutConfig::default())
    }
}

impl StateStore {
    pub fn new(layout_config: LayoutConfig) -> Self {
        Self {
            focus: None,
            previous_focus: None,
            history: VecDeque::with_capacity(HISTORY_CAPACITY),
            view_config: layout_config.family_view.clone(),
            layout_config,
            mode: InteractionMode::default(),
            flags: KNOWN_FLAGS
                .iter()
                .map(|(name, on)| (name.to_string(), *on))
                .collect(),
            needs_layout: false,
            pending: VecDeque::new(),
            observers: Vec::new(),
            next_observer: 0,
            batch_depth: 0,
        }
    }

    pub fn focus(&self) -> Option<&NodeId> {
        self.focus.as_ref()
    }

    pub fn previous_focus(&self) -> Option<&NodeId> {
        self.previous_focus.as_ref()
    }

    /// Prior foci, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &NodeId> {
        self.history.iter()
    }

    pub fn view_config(&self) -> &FamilyViewConfig {
        &self.view_config
    }

    pub fn layout_config(&self) -> &LayoutConfig {
        &self.layout_config
    }

    pub fn layout(&self) -> LayoutKind {
        self.layout_config.active
    }

    pub fn mode(&self) -> InteractionMode {
        self.mode
    }

    pub fn needs_layout(&self) -> bool {
        self.needs_layout
    }

    pub fn flag(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }

    pub fn flags(&self) -> &BTreeMap<String, bool> {
        &self.flags
    }

    pub fn subscribe(&mut self, observer: impl FnMut(&StateChange) + Send + 'static) -> ObserverId {
        let id = self.next_observer;
        self.next_observer += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(oid, _)| *oid != id);
        self.observers.len() != before
    }

    /// Runs `f` with delivery held back until it returns.
    pub fn batch<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.batch_depth += 1;
        let result = f(self);
        self.batch_depth -= 1;
        self.deliver();
        result
    }

    fn emit(&mut self, change: StateChange) {
        self.pending.push_back(change);
        self.deliver();
    }

    fn deliver(&mut self) {
        if self.batch_depth > 0 {
            return;
        }
        while let Some(change) = self.pending.pop_front() {
            for (_, observer) in self.observers.iter_mut() {
                observer(&change);
            }
        }
    }

    /// Returns `false` if `id` already has focus.
    pub fn set_focus(&mut self, id: NodeId) -> bool {
        if self.focus.as_ref() == Some(&id) {
            return false;
        }
        if let Some(previous) = self.focus.clone() {
            if self.history.len() == HISTORY_CAPACITY {
                self.history.pop_front();
            }
            self.history.push_back(previous);
        }
        self.replace_focus(Some(id));
        true
    }

    /// Returns to the most recent prior focus, if any. Entries equal to the
    /// current focus are skipped.
    pub fn back(&mut self) -> Option<NodeId> {
        let target = loop {
            let candidate = self.history.pop_back()?;
            if self.focus.as_ref() != Some(&candidate) {
                break candidate;
            }
        };
        self.replace_focus(Some(target.clone()));
        Some(target)
    }

    /// Drops history entries rejected by `keep`. Focus is untouched.
    pub fn retain_history(&mut self, mut keep: impl FnMut(&NodeId) -> bool) {
        self.history.retain(|id| keep(id));
    }

    pub fn clear_focus(&mut self) {
        if self.focus.is_some() {
            self.replace_focus(None);
        }
    }

    fn replace_focus(&mut self, next: Option<NodeId>) {
        let previous = std::mem::replace(&mut self.focus, next);
        self.previous_focus = previous.clone();
        self.needs_layout = true;
        tracing::debug!(
            "Focus {:?} -> {:?}",
            previous.as_ref().map(NodeId::as_str),
            self.focus.as_ref().map(NodeId::as_str)
        );
        self.emit(StateChange::FocusChanged {
            previous,
            current: self.focus.clone(),
        });
    }

    pub fn set_view_config(&mut self, config: FamilyViewConfig) {
        if self.view_config == config {
            return;
        }
        self.view_config = config.clone();
        self.layout_config.family_view = config;
        self.needs_layout = true;
        self.emit(StateChange::ViewConfigChanged);
    }

    pub fn set_layout_config(&mut self, config: LayoutConfig) {
        if self.layout_config == config {
            return;
        }
        let layout_changed = config.active != self.layout_config.active;
        self.view_config = config.family_view.clone();
        self.layout_config = config;
        self.needs_layout = true;
        self.emit(StateChange::LayoutConfigChanged);
        if layout_changed {
            self.emit(StateChange::LayoutChanged {
                layout: self.layout_config.active,
            });
        }
    }

    pub fn set_layout(&mut self, layout: LayoutKind) -> bool {
        if self.layout_config.active == layout {
            return false;
        }
        self.layout_config.active = layout;
        self.needs_layout = true;
        self.emit(StateChange::LayoutChanged { layout });
        true
    }

    /// Unknown names are rejected and the current layout is kept.
    pub fn set_layout_by_name(&mut self, name: &str) -> Result<bool> {
        let layout = name.parse::<LayoutKind>().inspect_err(|err| {
            tracing::warn!("Rejected layout '{}': {}", name, err);
        })?;
        Ok(self.set_layout(layout))
    }

    pub fn set_mode(&mut self, mode: InteractionMode) {
        if self.mode != mode {
            self.mode = mode;
            self.emit(StateChange::ModeChanged { mode });
        }
    }

    /// Only flags in [`KNOWN_FLAGS`] are accepted.
    pub fn set_flag(&mut self, name: &str, enabled: bool) -> Result<()> {
        let Some(slot) = self.flags.get_mut(name) else {
            tracing::warn!("Rejected unknown feature flag '{}'", name);
            return Err(FractalityError::config(format!(
                "unknown feature flag '{name}'"
            )));
        };
        if *slot != enabled {
            *slot = enabled;
            self.emit(StateChange::FlagChanged {
                name: name.to_string(),
                enabled,
            });
        }
        Ok(())
    }

    pub fn mark_graph_reloaded(&mut self) {
        self.needs_layout = true;
        self.emit(StateChange::GraphReloaded);
    }

    pub fn mark_needs_layout(&mut self) {
        self.needs_layout = true;
    }

    pub fn clear_needs_layout(&mut self) {
        self.needs_layout = false;
    }
}
