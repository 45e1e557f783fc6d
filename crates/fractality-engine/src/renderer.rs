//! Instance buffer assembly and the backend seam.
//!
//! The renderer turns visual states into one instanced draw: a transform and
//! a color per node, sorted back to front. Drawing itself is delegated to a
//! [`RenderBackend`].

use crate::visual::VisualStore;
use fractality_core::{
    CameraConfig, Color, FogConfig, GeometryKind, Mat4, NodeId, PixelRatio, RenderingConfig, Vec3,
    stable_hash,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::f32::consts::TAU;
use std::sync::Arc;

const MIN_OPACITY: f32 = 0.01;
const CAMERA_LERP: f32 = 0.1;
const MAX_PIXEL_RATIO: f32 = 2.0;
const SHADOW_QUALITY: f32 = 0.5;
const HIGH_PRIORITY: f32 = 2.0;
const PRIORITY_TINT: f32 = 1.2;

#[derive(Debug, Clone, PartialEq)]
pub struct InstanceData {
    pub id: NodeId,
    pub transform: Mat4,
    pub color: Color,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Camera {
    pub position: Vec3,
    pub look_at: Vec3,
    pub fov: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera {
    fn from_config(config: &CameraConfig) -> Self {
        Self {
            position: Vec3::from_array(config.start_position),
            look_at: Vec3::ZERO,
            fov: config.fov,
            near: config.near,
            far: config.far,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderSettings {
    pub pixel_ratio: f32,
    pub shadows: bool,
    pub antialias: bool,
    pub geometry: GeometryKind,
    pub fog: Option<FogConfig>,
}

/// Everything a backend needs to draw one frame.
#[derive(Debug)]
pub struct RenderFrame<'a> {
    pub camera: &'a Camera,
    pub settings: &'a RenderSettings,
    pub instances: &'a [InstanceData],
}

/// Host renderer capable of one instanced draw with per-instance matrix and color.
pub trait RenderBackend: Send {
    fn name(&self) -> &str;
    fn draw(&mut self, frame: &RenderFrame<'_>);
}

#[derive(Debug, Clone, Default)]
pub struct HeadlessLog {
    pub frames: u64,
    pub last_instances: Vec<InstanceData>,
    pub last_camera: Option<Vec3>,
    pub last_settings: Option<RenderSettings>,
}

/// Records frames instead of drawing them. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct HeadlessBackend {
    log: Arc<Mutex<HeadlessLog>>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> HeadlessLog {
        self.log.lock().clone()
    }

    pub fn frames(&self) -> u64 {
        self.log.lock().frames
    }
}

impl RenderBackend for HeadlessBackend {
    fn name(&self) -> &str {
        "headless"
    }

    fn draw(&mut self, frame: &RenderFrame<'_>) {
        let mut log = self.log.lock();
        log.frames += 1;
        log.last_instances = frame.instances.to_vec();
        log.last_camera = Some(frame.camera.position);
        log.last_settings = Some(frame.settings.clone());
    }
}

pub struct Renderer {
    config: RenderingConfig,
    camera: Camera,
    settings: RenderSettings,
    instances: Vec<InstanceData>,
    backend: Box<dyn RenderBackend>,
}

impl Renderer {
    pub fn new(config: RenderingConfig, backend: Box<dyn RenderBackend>) -> Self {
        let camera = Camera::from_config(&config.camera);
        let settings = RenderSettings {
            pixel_ratio: pixel_ratio(&config, 1.0),
            shadows: config.shadows_enabled,
            antialias: config.antialias,
            geometry: config.instances.geometry.kind,
            fog: config.fog.enabled.then(|| config.fog.clone()),
        };
        tracing::debug!("Renderer using '{}' backend", backend.name());
        Self {
            config,
            camera,
            settings,
            instances: Vec::new(),
            backend,
        }
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn instances(&self) -> &[InstanceData] {
        &self.instances
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Scales pixel ratio and toggles shadows and geometry detail.
    pub fn apply_quality(&mut self, quality: f32, high_poly: bool, antialias: bool) {
        let geometry = if high_poly {
            self.config.instances.geometry.kind
        } else {
            GeometryKind::Octahedron
        };
        if geometry != self.settings.geometry {
            tracing::debug!("Swapping instance geometry to {:?}", geometry);
        }
        self.settings = RenderSettings {
            pixel_ratio: pixel_ratio(&self.config, quality),
            shadows: self.config.shadows_enabled && quality > SHADOW_QUALITY,
            antialias: self.config.antialias && antialias,
            geometry,
            fog: self.settings.fog.take(),
        };
    }

    /// Rebuilds the instance buffer from every visible-enough state, back to front.
    pub fn update_instances(&mut self, visuals: &VisualStore) -> usize {
        let eye = self.camera.position;
        let mut drawable: Vec<_> = visuals
            .iter()
            .filter(|(_, state)| state.opacity > MIN_OPACITY)
            .map(|(id, state)| (state.position.distance_sq(eye), id, state))
            .collect();
        drawable.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));

        let max = self.config.instances.max_count;
        if drawable.len() > max {
            tracing::debug!(
                "Dropping {} farthest instances over the cap of {}",
                drawable.len() - max,
                max
            );
            drawable.drain(..drawable.len() - max);
        }

        self.instances.clear();
        self.instances.extend(drawable.into_iter().map(|(_, id, state)| {
            let scale = state.scale * (0.5 + 0.5 * state.opacity) * state.pulse_scale;
            let tint = if state.priority > HIGH_PRIORITY {
                PRIORITY_TINT
            } else {
                1.0
            };
            let intensity = 0.7 + 0.3 * (1.0 - state.context_score);
            InstanceData {
                id: id.clone(),
                transform: Mat4::compose(state.position, rotation_for(id.as_str()), scale),
                color: state.color.scaled(tint * intensity).clamped(),
            }
        }));
        self.instances.len()
    }

    /// Eases the camera toward `focus + cameraOffset`.
    pub fn update_camera(&mut self, focus: Vec3) {
        let goal = focus + Vec3::from_array(self.config.camera_offset);
        self.camera.position = self.camera.position.lerp(goal, CAMERA_LERP);
        self.camera.look_at = focus;
    }

    pub fn render(&mut self) {
        let frame = RenderFrame {
            camera: &self.camera,
            settings: &self.settings,
            instances: &self.instances,
        };
        self.backend.draw(&frame);
    }
}

/// Stable y-rotation in `[0, 2π)` derived from the node id.
pub fn rotation_for(id: &str) -> f32 {
    (stable_hash(id) % 10_000) as f32 / 10_000.0 * TAU
}

fn pixel_ratio(config: &RenderingConfig, quality: f32) -> f32 {
    let base = match config.pixel_ratio {
        PixelRatio::Auto => config.device_pixel_ratio,
        PixelRatio::Fixed(ratio) => ratio,
    };
    (base * quality).min(MAX_PIXEL_RATIO)
}
