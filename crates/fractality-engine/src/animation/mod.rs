//! Keyframed transitions over the visual store.
//!
//! At most one transition of each [`TransitionKind`] exists per node. Move and
//! fade-out drive the primary channels and replace each other; pulses write
//! only `pulse_scale`, so they run on top of either.

pub mod easing;
pub mod transition;

pub use easing::{ease, ease_scaled};
pub use transition::{ChannelEasing, Effect, Transition};

use crate::visual::VisualStore;
use fractality_core::{
    AnimationConfig, Color, Kinship, NodeId, TransitionKind, Vec3, VisualSnapshot,
};
use fractality_graph::FamilyView;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Instant;

pub type TransitionKey = (NodeId, TransitionKind);

const PULSE_AMPLITUDE: f32 = 0.3;
const RIPPLE_AMPLITUDE: f32 = 0.2;
const FOCUS_EPSILON: f32 = 0.01;
const PARENT_Z: f32 = -5.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnimationTick {
    pub animating: bool,
    /// Wall time spent inside `update`.
    pub elapsed_ms: f32,
    pub completed: Vec<TransitionKey>,
}

/// Non-positional channels a visible node should settle to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Appearance {
    pub scale: f32,
    pub opacity: f32,
    pub color: Color,
}

impl Default for Appearance {
    fn default() -> Self {
        Self {
            scale: 1.0,
            opacity: 1.0,
            color: Color::WHITE,
        }
    }
}

impl Appearance {
    pub fn at(&self, position: Vec3) -> VisualSnapshot {
        VisualSnapshot {
            position,
            scale: self.scale,
            opacity: self.opacity,
            color: self.color,
        }
    }
}

/// Stagger groups, in start order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum StaggerGroup {
    Focus,
    Parents,
    Children,
    Siblings,
    Others,
}

impl StaggerGroup {
    fn classify(position: Vec3, role: Option<Kinship>) -> Self {
        if position.length() < FOCUS_EPSILON {
            return Self::Focus;
        }
        if position.z < PARENT_Z {
            return Self::Parents;
        }
        match role {
            Some(Kinship::Child) => Self::Children,
            Some(Kinship::Sibling) => Self::Siblings,
            _ => Self::Others,
        }
    }
}

pub struct AnimationSystem {
    config: AnimationConfig,
    easing: ChannelEasing,
    transitions: BTreeMap<TransitionKey, Transition>,
}

impl Default for AnimationSystem {
    fn default() -> Self {
        Self::new(AnimationConfig::default())
    }
}

impl AnimationSystem {
    pub fn new(config: AnimationConfig) -> Self {
        let easing = ChannelEasing {
            curves: config.easing.clone(),
            elastic_amplitude: config.elastic_amplitude,
        };
        Self {
            config,
            easing,
            transitions: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &AnimationConfig {
        &self.config
    }

    pub fn is_animating(&self) -> bool {
        !self.transitions.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.transitions.len()
    }

    pub fn has_transition(&self, id: &str, kind: TransitionKind) -> bool {
        self.transitions.contains_key(&(NodeId::from(id), kind))
    }

    pub fn transition(&self, id: &str, kind: TransitionKind) -> Option<&Transition> {
        self.transitions.get(&(NodeId::from(id), kind))
    }

    /// Latest `delay + duration` over all live transitions, minus time already elapsed.
    pub fn remaining(&self) -> f32 {
        self.transitions
            .values()
            .map(|t| (t.total() - t.elapsed).max(0.0))
            .fold(0.0, f32::max)
    }

    /// Builds move targets from `positions`, keeping each node's current
    /// target appearance (new nodes settle to [`Appearance::default`]).
    pub fn targets_from_positions(
        visuals: &VisualStore,
        positions: &HashMap<NodeId, Vec3>,
    ) -> HashMap<NodeId, VisualSnapshot> {
        positions
            .iter()
            .map(|(id, &position)| {
                let appearance = visuals
                    .get(id.as_str())
                    .filter(|state| state.target_opacity > 0.0)
                    .map(|state| Appearance {
                        scale: state.target_scale,
                        opacity: state.target_opacity,
                        color: state.target_color,
                    })
                    .unwrap_or_default();
                (id.clone(), appearance.at(position))
            })
            .collect()
    }

    /// Schedules moves toward `targets` and fade-outs for every node in
    /// `nodes` that has no target. Returns the number of transitions created.
    pub fn start_transition<'a>(
        &mut self,
        visuals: &mut VisualStore,
        nodes: impl IntoIterator<Item = &'a NodeId>,
        targets: &HashMap<NodeId, VisualSnapshot>,
        roles: Option<&FamilyView>,
    ) -> usize {
        let mut created = 0;
        let mut seen = HashSet::new();

        for id in nodes {
            if !seen.insert(id.clone()) || targets.contains_key(id) {
                continue;
            }
            let Some(state) = visuals.get_mut(id.as_str()) else {
                continue;
            };
            // Already fading or faded.
            if state.target_opacity == 0.0
                && !self.has_transition(id.as_str(), TransitionKind::Move)
            {
                continue;
            }
            self.transitions
                .remove(&(id.clone(), TransitionKind::Move));
            let start = state.current();
            let target = VisualSnapshot {
                opacity: 0.0,
                ..start
            };
            state.set_target(target);
            self.transitions.insert(
                (id.clone(), TransitionKind::FadeOut),
                Transition::visual(
                    id.clone(),
                    TransitionKind::FadeOut,
                    start,
                    target,
                    0.0,
                    self.config.fade_out_duration,
                ),
            );
            created += 1;
        }

        let delays = self.stagger(targets, roles);
        let mut ordered: Vec<(&NodeId, &VisualSnapshot)> = targets.iter().collect();
        ordered.sort_by(|a, b| a.0.cmp(b.0));
        for (id, target) in ordered {
            let existing = self.transitions.get(&(id.clone(), TransitionKind::Move));
            if existing.and_then(Transition::target) == Some(target) {
                continue;
            }
            let state = visuals.ensure(id, target.position);
            if existing.is_none()
                && !self.has_transition(id.as_str(), TransitionKind::FadeOut)
                && state.current() == *target
            {
                state.set_target(*target);
                continue;
            }

            self.transitions
                .remove(&(id.clone(), TransitionKind::FadeOut));
            let start = state.current();
            let distance = start.position.distance(target.position);
            let duration = (distance / self.config.speed.position).max(self.config.min_duration);
            state.set_target(*target);
            let delay = delays.get(id).copied().unwrap_or(0.0);
            self.transitions.insert(
                (id.clone(), TransitionKind::Move),
                Transition::visual(
                    id.clone(),
                    TransitionKind::Move,
                    start,
                    *target,
                    delay,
                    duration,
                ),
            );
            created += 1;
        }

        tracing::debug!(
            "Scheduled {} transitions ({} active)",
            created,
            self.transitions.len()
        );
        created
    }

    fn stagger(
        &self,
        targets: &HashMap<NodeId, VisualSnapshot>,
        roles: Option<&FamilyView>,
    ) -> HashMap<NodeId, f32> {
        let mut groups: BTreeMap<StaggerGroup, Vec<(f32, &NodeId)>> = BTreeMap::new();
        for (id, target) in targets {
            let role = roles.and_then(|view| view.role_of(id.as_str()));
            let group = StaggerGroup::classify(target.position, role);
            let angle = match group {
                StaggerGroup::Children => target.position.z.atan2(target.position.x),
                _ => 0.0,
            };
            groups.entry(group).or_default().push((angle, id));
        }

        let mut delays = HashMap::with_capacity(targets.len());
        for (rank, members) in groups.values_mut().enumerate() {
            members.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(b.1)));
            let base = rank as f32 * self.config.group_step;
            for (k, (_, id)) in members.iter().enumerate() {
                let delay = (base + k as f32 * self.config.stagger_step).min(self.config.max_delay);
                delays.insert((*id).clone(), delay);
            }
        }
        delays
    }

    /// Advances every transition by `delta · budget_scale` seconds.
    pub fn update(
        &mut self,
        visuals: &mut VisualStore,
        delta: f32,
        budget_scale: f32,
    ) -> AnimationTick {
        let started = Instant::now();
        let step = delta.max(0.0) * budget_scale.clamp(f32::MIN_POSITIVE, 1.0);
        let mut completed = Vec::new();
        let mut orphaned = Vec::new();

        for (key, transition) in self.transitions.iter_mut() {
            transition.advance(step);
            let Some(state) = visuals.get_mut(key.0.as_str()) else {
                orphaned.push(key.clone());
                continue;
            };
            let Some(progress) = transition.progress() else {
                continue;
            };
            match &transition.effect {
                Effect::Visual { start, target } => {
                    if progress >= 1.0 {
                        state.apply(*target);
                        state.set_target(*target);
                    } else {
                        state.apply(self.easing.sample(start, target, progress));
                    }
                }
                Effect::Pulse { amplitude } => {
                    state.pulse_scale = Transition::pulse_scale(*amplitude, progress);
                }
            }
            if progress >= 1.0 {
                completed.push(key.clone());
            }
        }

        for key in orphaned.iter().chain(completed.iter()) {
            self.transitions.remove(key);
        }

        AnimationTick {
            animating: !self.transitions.is_empty(),
            elapsed_ms: started.elapsed().as_secs_f32() * 1000.0,
            completed,
        }
    }

    /// Moves a resting node's appearance toward `appearance` at the configured
    /// channel speeds. Nodes with a live move or fade-out are left alone.
    pub fn settle(&self, visuals: &mut VisualStore, id: &str, appearance: Appearance, delta: f32) {
        if self.has_transition(id, TransitionKind::Move)
            || self.has_transition(id, TransitionKind::FadeOut)
        {
            return;
        }
        let Some(state) = visuals.get_mut(id) else {
            return;
        };
        state.target_scale = appearance.scale;
        state.target_opacity = appearance.opacity;
        state.target_color = appearance.color;

        let speed = &self.config.speed;
        let delta = delta.max(0.0);
        state.opacity = approach(state.opacity, appearance.opacity, speed.opacity * delta);
        state.scale = approach(state.scale, appearance.scale, speed.scale * delta);
        let color_step = speed.opacity * delta;
        state.color = Color::new(
            approach(state.color.r, appearance.color.r, color_step),
            approach(state.color.g, appearance.color.g, color_step),
            approach(state.color.b, appearance.color.b, color_step),
        );
    }

    /// Swells one node. Returns `false` if the node has no visual state.
    pub fn pulse_node(&mut self, visuals: &VisualStore, id: &NodeId) -> bool {
        if !visuals.contains(id.as_str()) {
            return false;
        }
        self.insert_pulse(id, PULSE_AMPLITUDE, 0.0);
        true
    }

    /// Pulses `nodes` outward from `center`, each delayed by its distance
    /// over `rippleSpeed`. Returns the number of pulses scheduled.
    pub fn ripple_from<'a>(
        &mut self,
        visuals: &VisualStore,
        center: &str,
        nodes: impl IntoIterator<Item = &'a NodeId>,
    ) -> usize {
        let Some(origin) = visuals.get(center).map(|s| s.position) else {
            return 0;
        };
        let speed = self.config.ripple_speed.max(f32::EPSILON);
        let mut scheduled = 0;
        for id in nodes {
            let Some(state) = visuals.get(id.as_str()) else {
                continue;
            };
            let delay = origin.distance(state.position) / speed;
            self.insert_pulse(id, RIPPLE_AMPLITUDE, delay);
            scheduled += 1;
        }
        scheduled
    }

    fn insert_pulse(&mut self, id: &NodeId, amplitude: f32, delay: f32) {
        self.transitions.insert(
            (id.clone(), TransitionKind::Pulse),
            Transition::pulse(id.clone(), amplitude, delay, self.config.pulse_duration),
        );
    }

    /// Cancels everything. Nodes keep their current interpolated state.
    pub fn stop_all(&mut self, visuals: &mut VisualStore) {
        let transitions = std::mem::take(&mut self.transitions);
        for (id, _) in transitions.keys() {
            freeze(visuals, id);
        }
    }

    pub fn stop_for_nodes<'a>(
        &mut self,
        visuals: &mut VisualStore,
        ids: impl IntoIterator<Item = &'a NodeId>,
    ) {
        let ids: HashSet<&NodeId> = ids.into_iter().collect();
        self.transitions.retain(|(id, _), _| !ids.contains(id));
        for id in ids {
            freeze(visuals, id);
        }
    }

    /// Drops transitions whose node left the visual store.
    pub fn forget(&mut self, visuals: &VisualStore) {
        self.transitions
            .retain(|(id, _), _| visuals.contains(id.as_str()));
    }
}

fn freeze(visuals: &mut VisualStore, id: &NodeId) {
    if let Some(state) = visuals.get_mut(id.as_str()) {
        let current = state.current();
        state.set_target(current);
        state.pulse_scale = 1.0;
    }
}

fn approach(current: f32, target: f32, max_step: f32) -> f32 {
    let diff = target - current;
    if diff.abs() <= max_step {
        target
    } else {
        current + max_step * diff.signum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fractality_core::FamilyViewConfig;
    use fractality_graph::{TestDataGenerator, TestPattern, compute_family_view};

    fn id(s: &str) -> NodeId {
        NodeId::from(s)
    }

    fn targets(pairs: &[(&str, Vec3)]) -> HashMap<NodeId, VisualSnapshot> {
        pairs
            .iter()
            .map(|(k, p)| (id(k), Appearance::default().at(*p)))
            .collect()
    }

    fn run_to_end(anim: &mut AnimationSystem, visuals: &mut VisualStore) -> Vec<TransitionKey> {
        let mut completed = Vec::new();
        for _ in 0..600 {
            completed.extend(anim.update(visuals, 1.0 / 60.0, 1.0).completed);
            if !anim.is_animating() {
                break;
            }
        }
        completed
    }

    #[test]
    fn test_move_duration_follows_distance() {
        let mut anim = AnimationSystem::default();
        let mut visuals = VisualStore::new();
        visuals.ensure(&id("a"), Vec3::ZERO).opacity = 1.0;
        let t = targets(&[("a", Vec3::new(9.0, 0.0, 0.0))]);
        assert_eq!(anim.start_transition(&mut visuals, [&id("a")], &t, None), 1);
        let move_t = anim.transition("a", TransitionKind::Move).unwrap();
        assert!((move_t.duration - 3.0).abs() < 1e-5);

        let t = targets(&[("a", Vec3::new(9.1, 0.0, 0.0))]);
        anim.stop_all(&mut visuals);
        visuals.get_mut("a").unwrap().position = Vec3::new(9.0, 0.0, 0.0);
        anim.start_transition(&mut visuals, [&id("a")], &t, None);
        let short = anim.transition("a", TransitionKind::Move).unwrap();
        assert_eq!(short.duration, anim.config().min_duration);
    }

    #[test]
    fn test_missing_target_fades_out() {
        let mut anim = AnimationSystem::default();
        let mut visuals = VisualStore::new();
        let state = visuals.ensure(&id("gone"), Vec3::new(1.0, 0.0, 0.0));
        state.opacity = 1.0;
        state.target_opacity = 1.0;
        anim.start_transition(&mut visuals, [&id("gone")], &HashMap::new(), None);
        let fade = anim.transition("gone", TransitionKind::FadeOut).unwrap();
        assert_eq!(fade.duration, 0.5);

        let completed = run_to_end(&mut anim, &mut visuals);
        assert_eq!(completed, vec![(id("gone"), TransitionKind::FadeOut)]);
        assert_eq!(visuals.get("gone").unwrap().opacity, 0.0);
    }

    #[test]
    fn test_new_transition_supersedes_from_current_state() {
        let mut anim = AnimationSystem::default();
        let mut visuals = VisualStore::new();
        visuals.ensure(&id("a"), Vec3::ZERO).opacity = 1.0;
        let first = targets(&[("a", Vec3::new(6.0, 0.0, 0.0))]);
        anim.start_transition(&mut visuals, [&id("a")], &first, None);
        anim.update(&mut visuals, 1.0, 1.0);
        let mid = visuals.get("a").unwrap().position;
        assert!(mid.x > 0.0 && mid.x < 6.0);

        let second = targets(&[("a", Vec3::new(0.0, 0.0, 6.0))]);
        anim.start_transition(&mut visuals, [&id("a")], &second, None);
        assert_eq!(anim.active_count(), 1);
        match &anim.transition("a", TransitionKind::Move).unwrap().effect {
            Effect::Visual { start, .. } => assert_eq!(start.position, mid),
            other => panic!("unexpected effect {other:?}"),
        }
    }

    #[test]
    fn test_update_completes_everything_at_target() {
        let graph = TestDataGenerator::default().generate(TestPattern::Simple).unwrap();
        let view = compute_family_view(&graph, "root", &FamilyViewConfig::default());
        let mut anim = AnimationSystem::default();
        let mut visuals = VisualStore::new();
        let t = targets(&[
            ("root", Vec3::ZERO),
            ("child-0", Vec3::new(1.0, 2.0, -3.0)),
            ("child-1", Vec3::new(-2.0, 1.0, -4.0)),
            ("child-2", Vec3::new(0.5, 3.0, -1.0)),
        ]);
        anim.start_transition(&mut visuals, view.ids(), &t, Some(&view));
        let horizon = anim.remaining();
        let tick = anim.update(&mut visuals, horizon + 0.01, 1.0);
        assert!(!tick.animating);
        assert_eq!(tick.completed.len(), 4);
        for (node, state) in visuals.iter() {
            assert!(state.at_target(), "{node} not at target");
            assert_eq!(state.position, t[node].position);
        }
    }

    #[test]
    fn test_stagger_orders_groups_and_caps_delay() {
        let mut anim = AnimationSystem::new(AnimationConfig {
            max_delay: 0.15,
            ..Default::default()
        });
        let mut visuals = VisualStore::new();
        let t = targets(&[
            ("focus", Vec3::ZERO),
            ("parent", Vec3::new(0.0, 0.0, -10.0)),
            ("far-1", Vec3::new(15.0, 0.0, 0.0)),
            ("far-2", Vec3::new(-15.0, 0.0, 0.0)),
            ("far-3", Vec3::new(0.0, 0.0, 15.0)),
        ]);
        anim.start_transition(&mut visuals, [], &t, None);
        let delay = |k: &str| anim.transition(k, TransitionKind::Move).unwrap().delay;
        assert_eq!(delay("focus"), 0.0);
        assert!((delay("parent") - 0.1).abs() < 1e-6);
        assert!(delay("far-1") >= delay("parent"));
        assert!(["far-1", "far-2", "far-3"].iter().all(|k| delay(k) <= 0.15));
    }

    #[test]
    fn test_pulse_composes_with_move() {
        let mut anim = AnimationSystem::default();
        let mut visuals = VisualStore::new();
        visuals.ensure(&id("a"), Vec3::ZERO).opacity = 1.0;
        anim.start_transition(&mut visuals, [], &targets(&[("a", Vec3::new(3.0, 0.0, 0.0))]), None);
        assert!(anim.pulse_node(&visuals, &id("a")));
        assert!(anim.has_transition("a", TransitionKind::Move));
        assert!(anim.has_transition("a", TransitionKind::Pulse));

        anim.update(&mut visuals, 0.3, 1.0);
        let state = visuals.get("a").unwrap();
        assert!(state.pulse_scale > 1.0);
        assert!(state.position.x > 0.0);

        run_to_end(&mut anim, &mut visuals);
        assert_eq!(visuals.get("a").unwrap().pulse_scale, 1.0);
        assert!(!anim.pulse_node(&visuals, &id("missing")));
    }

    #[test]
    fn test_ripple_delays_by_distance() {
        let mut anim = AnimationSystem::default();
        let mut visuals = VisualStore::new();
        visuals.ensure(&id("c"), Vec3::ZERO);
        visuals.ensure(&id("near"), Vec3::new(2.0, 0.0, 0.0));
        visuals.ensure(&id("far"), Vec3::new(20.0, 0.0, 0.0));
        let nodes = [id("near"), id("far"), id("ghost")];
        assert_eq!(anim.ripple_from(&visuals, "c", nodes.iter()), 2);
        let near = anim.transition("near", TransitionKind::Pulse).unwrap().delay;
        let far = anim.transition("far", TransitionKind::Pulse).unwrap().delay;
        assert!((near - 0.2).abs() < 1e-6);
        assert!((far - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_stop_snaps_to_current() {
        let mut anim = AnimationSystem::default();
        let mut visuals = VisualStore::new();
        visuals.ensure(&id("a"), Vec3::ZERO).opacity = 1.0;
        visuals.ensure(&id("b"), Vec3::ZERO).opacity = 1.0;
        let t = targets(&[("a", Vec3::new(6.0, 0.0, 0.0)), ("b", Vec3::new(0.0, 6.0, 0.0))]);
        anim.start_transition(&mut visuals, [], &t, None);
        anim.update(&mut visuals, 0.5, 1.0);

        anim.stop_for_nodes(&mut visuals, [&id("a")]);
        assert!(!anim.has_transition("a", TransitionKind::Move));
        assert!(anim.has_transition("b", TransitionKind::Move));
        assert!(visuals.get("a").unwrap().at_target());

        anim.stop_all(&mut visuals);
        assert!(!anim.is_animating());
        assert!(visuals.get("b").unwrap().at_target());
    }

    #[test]
    fn test_budget_scale_dilates_time() {
        let mut anim = AnimationSystem::default();
        let mut visuals = VisualStore::new();
        visuals.ensure(&id("a"), Vec3::ZERO).opacity = 1.0;
        anim.start_transition(&mut visuals, [], &targets(&[("a", Vec3::new(3.0, 0.0, 0.0))]), None);
        anim.update(&mut visuals, 1.0, 0.5);
        assert!((anim.transition("a", TransitionKind::Move).unwrap().elapsed - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_settle_moves_resting_nodes_only() {
        let mut anim = AnimationSystem::default();
        let mut visuals = VisualStore::new();
        let state = visuals.ensure(&id("rest"), Vec3::ZERO);
        state.opacity = 1.0;
        state.target_opacity = 1.0;
        let dim = Appearance {
            opacity: 0.4,
            ..Default::default()
        };
        anim.settle(&mut visuals, "rest", dim, 0.1);
        assert!((visuals.get("rest").unwrap().opacity - 0.8).abs() < 1e-6);
        anim.settle(&mut visuals, "rest", dim, 1.0);
        assert!(visuals.get("rest").unwrap().at_target());

        let moved = targets(&[("rest", Vec3::new(3.0, 0.0, 0.0))]);
        anim.start_transition(&mut visuals, [], &moved, None);
        let before = visuals.get("rest").unwrap().clone();
        anim.settle(&mut visuals, "rest", Appearance::default(), 1.0);
        assert_eq!(visuals.get("rest").unwrap(), &before);
    }
}
