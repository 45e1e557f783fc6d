//! Engine configuration tree.
//!
//! Every section is `#[serde(default)]`, so a JSON document only needs the
//! keys it wants to override. Unknown keys are ignored.

use crate::error::{FractalityError, Result};
use crate::kinds::{Easing, LayoutKind};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub performance: PerformanceConfig,
    pub rendering: RenderingConfig,
    pub layout: LayoutConfig,
    pub animation: AnimationConfig,
    pub data: DataConfig,
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            FractalityError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&content)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Rejects values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let perf = &self.performance;
        if perf.target_fps <= 0.0 {
            return Err(FractalityError::config("performance.targetFPS must be > 0"));
        }
        if perf.budgets.total <= 0.0 {
            return Err(FractalityError::config(
                "performance.budgets.total must be > 0",
            ));
        }
        let aq = &perf.adaptive_quality;
        if !(0.0 < aq.min_quality && aq.min_quality <= aq.max_quality && aq.max_quality <= 1.0) {
            return Err(FractalityError::config(format!(
                "adaptive quality bounds out of range: min={} max={}",
                aq.min_quality, aq.max_quality
            )));
        }
        if aq.adjustment_rate <= 0.0 || aq.sample_frames == 0 {
            return Err(FractalityError::config(
                "adaptiveQuality.adjustmentRate and sampleFrames must be > 0",
            ));
        }
        if let PixelRatio::Fixed(ratio) = self.rendering.pixel_ratio
            && ratio <= 0.0
        {
            return Err(FractalityError::config("rendering.pixelRatio must be > 0"));
        }
        if self.rendering.instances.max_count == 0 {
            return Err(FractalityError::config(
                "rendering.instances.maxCount must be > 0",
            ));
        }
        if self.animation.speed.position <= 0.0 {
            return Err(FractalityError::config(
                "animation.speed.position must be > 0",
            ));
        }
        if self.animation.max_delay < 0.0 || self.animation.fade_out_duration <= 0.0 {
            return Err(FractalityError::config(
                "animation.maxDelay must be >= 0 and fadeOutDuration > 0",
            ));
        }
        if self.layout.cosmic_web.node_radius <= 0.0 {
            return Err(FractalityError::config(
                "layout.cosmicWeb.nodeRadius must be > 0",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Performance
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PerformanceConfig {
    #[serde(rename = "targetFPS", alias = "targetFps")]
    pub target_fps: f32,
    pub budgets: BudgetConfig,
    pub adaptive_quality: AdaptiveQualityConfig,
    /// Run the synthetic CPU calibration loop on init.
    pub calibrate: bool,
    /// Overrides the detected process memory limit.
    pub memory_limit_mb: Option<u64>,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            target_fps: 60.0,
            budgets: BudgetConfig::default(),
            adaptive_quality: AdaptiveQualityConfig::default(),
            calibrate: true,
            memory_limit_mb: None,
        }
    }
}

/// Per-frame sub-budgets in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BudgetConfig {
    pub total: f32,
    pub animation: f32,
    pub layout: f32,
    pub rendering: f32,
    pub ui: f32,
    pub overhead: f32,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            total: 16.67,
            animation: 4.0,
            layout: 2.0,
            rendering: 8.0,
            ui: 1.0,
            overhead: 1.67,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdaptiveQualityConfig {
    pub enabled: bool,
    pub min_quality: f32,
    pub max_quality: f32,
    pub adjustment_rate: f32,
    pub sample_frames: usize,
    #[serde(rename = "minFPS", alias = "minFps")]
    pub min_fps: f32,
    pub initial_quality: f32,
    pub adjustment_interval_ms: u64,
}

impl Default for AdaptiveQualityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_quality: 0.1,
            max_quality: 1.0,
            adjustment_rate: 0.1,
            sample_frames: 60,
            min_fps: 30.0,
            initial_quality: 1.0,
            adjustment_interval_ms: 1000,
        }
    }
}

// ============================================================================
// Rendering
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RenderingConfig {
    pub antialias: bool,
    pub pixel_ratio: PixelRatio,
    /// Device pixel ratio reported by the host when `pixelRatio` is `"auto"`.
    pub device_pixel_ratio: f32,
    pub shadows_enabled: bool,
    pub camera: CameraConfig,
    pub camera_offset: [f32; 3],
    pub fog: FogConfig,
    pub instances: InstanceConfig,
}

impl Default for RenderingConfig {
    fn default() -> Self {
        Self {
            antialias: true,
            pixel_ratio: PixelRatio::Auto,
            device_pixel_ratio: 1.0,
            shadows_enabled: true,
            camera: CameraConfig::default(),
            camera_offset: [0.0, 5.0, 15.0],
            fog: FogConfig::default(),
            instances: InstanceConfig::default(),
        }
    }
}

/// `"auto"` or a fixed number.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", into = "serde_json::Value")]
pub enum PixelRatio {
    #[default]
    Auto,
    Fixed(f32),
}

impl TryFrom<serde_json::Value> for PixelRatio {
    type Error = String;

    fn try_from(value: serde_json::Value) -> std::result::Result<Self, Self::Error> {
        match value {
            serde_json::Value::String(s) if s == "auto" => Ok(PixelRatio::Auto),
            serde_json::Value::Number(n) => n
                .as_f64()
                .map(|v| PixelRatio::Fixed(v as f32))
                .ok_or_else(|| "pixelRatio is not a finite number".to_string()),
            other => Err(format!("pixelRatio must be \"auto\" or a number, got {other}")),
        }
    }
}

impl From<PixelRatio> for serde_json::Value {
    fn from(value: PixelRatio) -> Self {
        match value {
            PixelRatio::Auto => serde_json::Value::String("auto".to_string()),
            PixelRatio::Fixed(v) => serde_json::json!(v),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CameraConfig {
    pub fov: f32,
    pub near: f32,
    pub far: f32,
    pub start_position: [f32; 3],
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov: 75.0,
            near: 0.1,
            far: 1000.0,
            start_position: [0.0, 5.0, 20.0],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FogConfig {
    pub enabled: bool,
    pub color: u32,
    pub near: f32,
    pub far: f32,
}

impl Default for FogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            color: 0x000011,
            near: 50.0,
            far: 200.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InstanceConfig {
    pub max_count: usize,
    pub geometry: GeometryConfig,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            max_count: 10_000,
            geometry: GeometryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeometryKind {
    #[default]
    Sphere,
    Box,
    Octahedron,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GeometryConfig {
    #[serde(rename = "type")]
    pub kind: GeometryKind,
    pub segments: u32,
    pub radius: f32,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            kind: GeometryKind::Sphere,
            segments: 16,
            radius: 0.5,
        }
    }
}

// ============================================================================
// Layout
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LayoutConfig {
    pub active: LayoutKind,
    pub family_view: FamilyViewConfig,
    pub positions: PositionConfig,
    pub golden_spiral: GoldenSpiralConfig,
    pub sphere: SphereConfig,
    pub tree: TreeConfig,
    pub cosmic_web: CosmicWebConfig,
    pub cache_ttl_ms: u64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            active: LayoutKind::Family,
            family_view: FamilyViewConfig::default(),
            positions: PositionConfig::default(),
            golden_spiral: GoldenSpiralConfig::default(),
            sphere: SphereConfig::default(),
            tree: TreeConfig::default(),
            cosmic_web: CosmicWebConfig::default(),
            cache_ttl_ms: 500,
        }
    }
}

/// Selection policy of the family view. Hashable so it can key the selector cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FamilyViewConfig {
    pub max_siblings: usize,
    pub max_children: usize,
    pub show_parent: bool,
    pub show_grandparent: bool,
    pub context_depth: u32,
    pub max_context: usize,
}

impl Default for FamilyViewConfig {
    fn default() -> Self {
        Self {
            max_siblings: 5,
            max_children: 7,
            show_parent: true,
            show_grandparent: false,
            context_depth: 0,
            max_context: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PositionConfig {
    pub parent_offset: [f32; 3],
    pub sibling_radius: f32,
    pub sibling_height: f32,
    pub sibling_arc: f32,
    pub child_radius: f32,
    pub child_tightness: f32,
    pub child_height_offset: f32,
    pub child_depth_offset: f32,
    pub context_radius: f32,
    pub context_ring_step: f32,
    pub context_height_step: f32,
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            parent_offset: [0.0, 0.0, -10.0],
            sibling_radius: 8.0,
            sibling_height: 0.0,
            sibling_arc: std::f32::consts::PI,
            child_radius: 5.0,
            child_tightness: 1.0,
            child_height_offset: 2.0,
            child_depth_offset: -3.0,
            context_radius: 15.0,
            context_ring_step: 5.0,
            context_height_step: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GoldenSpiralConfig {
    pub a: f32,
    pub b: f32,
    pub c: f32,
}

impl Default for GoldenSpiralConfig {
    fn default() -> Self {
        Self {
            a: 2.0,
            b: 3.0,
            c: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SphereConfig {
    pub radius: f32,
}

impl Default for SphereConfig {
    fn default() -> Self {
        Self { radius: 10.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TreeConfig {
    pub branch_angle: f32,
    pub level_height: f32,
    pub branch_scale: f32,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            branch_angle: std::f32::consts::FRAC_PI_6,
            level_height: 6.0,
            branch_scale: 0.75,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CosmicWebConfig {
    pub iterations: usize,
    pub strength: f32,
    pub k: f32,
    pub node_radius: f32,
    /// Half-extent of the initial scatter cube.
    pub bounds: f32,
    /// Optional cap on one node's displacement per relaxation step, layered
    /// over the plain explicit Euler update. `None` leaves steps unbounded.
    pub max_step: Option<f32>,
    pub seed: Option<u64>,
}

impl Default for CosmicWebConfig {
    fn default() -> Self {
        Self {
            iterations: 10,
            strength: 1.0,
            k: 1.0,
            node_radius: 3.0,
            bounds: 20.0,
            max_step: None,
            seed: None,
        }
    }
}

// ============================================================================
// Animation
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnimationConfig {
    pub speed: AnimationSpeedConfig,
    pub easing: AnimationEasingConfig,
    pub max_delay: f32,
    pub fade_out_duration: f32,
    pub min_duration: f32,
    pub elastic_amplitude: f32,
    pub pulse_duration: f32,
    pub ripple_speed: f32,
    /// Delay between consecutive nodes of one role group.
    pub stagger_step: f32,
    /// Delay between role groups.
    pub group_step: f32,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            speed: AnimationSpeedConfig::default(),
            easing: AnimationEasingConfig::default(),
            max_delay: 0.5,
            fade_out_duration: 0.5,
            min_duration: 0.3,
            elastic_amplitude: 1.0,
            pulse_duration: 0.6,
            ripple_speed: 10.0,
            stagger_step: 0.03,
            group_step: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnimationSpeedConfig {
    pub position: f32,
    pub opacity: f32,
    pub scale: f32,
    pub rotation: f32,
}

impl Default for AnimationSpeedConfig {
    fn default() -> Self {
        Self {
            position: 3.0,
            opacity: 2.0,
            scale: 2.0,
            rotation: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AnimationEasingConfig {
    pub position: Easing,
    pub opacity: Easing,
    pub scale: Easing,
    pub color: Easing,
}

impl Default for AnimationEasingConfig {
    fn default() -> Self {
        Self {
            position: Easing::EaseInOutCubic,
            opacity: Easing::EaseOutQuad,
            scale: Easing::EaseOutElastic,
            color: Easing::EaseInOutSine,
        }
    }
}

// ============================================================================
// Data
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DataConfig {
    pub loading: LoadingConfig,
    /// PRNG seed override for synthetic graphs and random layouts.
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoadingConfig {
    pub chunk_size: usize,
    pub preload_depth: u32,
    pub cache_enabled: bool,
    /// Byte budget of the loader's LRU cache.
    pub max_cache_size: usize,
    pub timeout_ms: u64,
}

impl Default for LoadingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            preload_depth: 2,
            cache_enabled: true,
            max_cache_size: 100 * 1024 * 1024,
            timeout_ms: 10_000,
        }
    }
}
