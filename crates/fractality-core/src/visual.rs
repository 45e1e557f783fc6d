use crate::math::{Color, Vec3};
use serde::{Deserialize, Serialize};

/// The animatable channels of a node at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VisualSnapshot {
    pub position: Vec3,
    pub scale: f32,
    pub opacity: f32,
    pub color: Color,
}

impl Default for VisualSnapshot {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            scale: 1.0,
            opacity: 1.0,
            color: Color::WHITE,
        }
    }
}

/// Per-frame visual state of one node. Owned by the engine; the interpolated
/// channels are written only by the animation system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualState {
    pub position: Vec3,
    pub target_position: Vec3,
    pub scale: f32,
    pub target_scale: f32,
    pub opacity: f32,
    pub target_opacity: f32,
    pub color: Color,
    pub target_color: Color,
    /// Multiplier written by pulse/ripple effects, 1.0 at rest.
    pub pulse_scale: f32,
    pub priority: f32,
    /// Normalized context score in `[0, 1]`.
    pub context_score: f32,
}

impl Default for VisualState {
    fn default() -> Self {
        Self::at(Vec3::ZERO)
    }
}

impl VisualState {
    /// Fresh state for a node entering the view: invisible, unit scale, at `position`.
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            target_position: position,
            scale: 1.0,
            target_scale: 1.0,
            opacity: 0.0,
            target_opacity: 0.0,
            color: Color::WHITE,
            target_color: Color::WHITE,
            pulse_scale: 1.0,
            priority: 1.0,
            context_score: 0.5,
        }
    }

    pub fn current(&self) -> VisualSnapshot {
        VisualSnapshot {
            position: self.position,
            scale: self.scale,
            opacity: self.opacity,
            color: self.color,
        }
    }

    pub fn target(&self) -> VisualSnapshot {
        VisualSnapshot {
            position: self.target_position,
            scale: self.target_scale,
            opacity: self.target_opacity,
            color: self.target_color,
        }
    }

    pub fn apply(&mut self, snapshot: VisualSnapshot) {
        self.position = snapshot.position;
        self.scale = snapshot.scale;
        self.opacity = snapshot.opacity;
        self.color = snapshot.color;
    }

    pub fn set_target(&mut self, snapshot: VisualSnapshot) {
        self.target_position = snapshot.position;
        self.target_scale = snapshot.scale;
        self.target_opacity = snapshot.opacity;
        self.target_color = snapshot.color;
    }

    pub fn at_target(&self) -> bool {
        self.current() == self.target()
    }
}
