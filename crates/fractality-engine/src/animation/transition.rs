use super::easing::{ease, ease_scaled};
use fractality_core::{AnimationEasingConfig, NodeId, TransitionKind, VisualSnapshot};
use std::f32::consts::PI;

/// Per-channel easing applied to a visual transition.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelEasing {
    pub curves: AnimationEasingConfig,
    /// Multiplies the scale curve's deviation from linear.
    pub elastic_amplitude: f32,
}

impl Default for ChannelEasing {
    fn default() -> Self {
        Self {
            curves: AnimationEasingConfig::default(),
            elastic_amplitude: 1.0,
        }
    }
}

impl ChannelEasing {
    pub fn sample(
        &self,
        start: &VisualSnapshot,
        target: &VisualSnapshot,
        t: f32,
    ) -> VisualSnapshot {
        let position = ease(self.curves.position, t);
        let opacity = ease(self.curves.opacity, t);
        let scale = ease_scaled(self.curves.scale, t, self.elastic_amplitude);
        let color = ease(self.curves.color, t);
        VisualSnapshot {
            position: start.position.lerp(target.position, position),
            opacity: start.opacity + (target.opacity - start.opacity) * opacity,
            scale: start.scale + (target.scale - start.scale) * scale,
            color: start.color.lerp(target.color, color),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Interpolates the primary channels from `start` to `target`.
    Visual {
        start: VisualSnapshot,
        target: VisualSnapshot,
    },
    /// Swells `pulse_scale` to `1 + amplitude` and back to 1.
    Pulse { amplitude: f32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub node_id: NodeId,
    pub kind: TransitionKind,
    pub effect: Effect,
    /// Seconds before the transition starts to show.
    pub delay: f32,
    pub elapsed: f32,
    pub duration: f32,
}

impl Transition {
    pub fn visual(
        node_id: NodeId,
        kind: TransitionKind,
        start: VisualSnapshot,
        target: VisualSnapshot,
        delay: f32,
        duration: f32,
    ) -> Self {
        Self {
            node_id,
            kind,
            effect: Effect::Visual { start, target },
            delay,
            elapsed: 0.0,
            duration,
        }
    }

    pub fn pulse(node_id: NodeId, amplitude: f32, delay: f32, duration: f32) -> Self {
        Self {
            node_id,
            kind: TransitionKind::Pulse,
            effect: Effect::Pulse { amplitude },
            delay,
            elapsed: 0.0,
            duration,
        }
    }

    /// Seconds from creation until the transition completes.
    pub fn total(&self) -> f32 {
        self.delay + self.duration
    }

    pub fn advance(&mut self, seconds: f32) {
        self.elapsed += seconds;
    }

    /// `None` while still inside the delay, else progress in `[0, 1]`.
    pub fn progress(&self) -> Option<f32> {
        if self.elapsed < self.delay {
            return None;
        }
        if self.duration <= 0.0 {
            return Some(1.0);
        }
        Some(((self.elapsed - self.delay) / self.duration).min(1.0))
    }

    pub fn target(&self) -> Option<&VisualSnapshot> {
        match &self.effect {
            Effect::Visual { target, .. } => Some(target),
            Effect::Pulse { .. } => None,
        }
    }

    pub fn pulse_scale(amplitude: f32, progress: f32) -> f32 {
        if progress >= 1.0 {
            return 1.0;
        }
        1.0 + amplitude * (PI * progress).sin()
    }
}
