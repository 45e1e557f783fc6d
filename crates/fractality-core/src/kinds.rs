use crate::error::FractalityError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role of a visible node relative to the focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Kinship {
    Focus,
    Parent,
    Grandparent,
    Sibling,
    Child,
    /// Kin reached through context expansion; `hops` starts at 1.
    Context { hops: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransitionKind {
    Move,
    FadeOut,
    Pulse,
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Move => write!(f, "move"),
            Self::FadeOut => write!(f, "fade-out"),
            Self::Pulse => write!(f, "pulse"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QualityLevel {
    Minimum,
    Low,
    Medium,
    High,
    Ultra,
}

impl QualityLevel {
    pub fn from_quality(quality: f32) -> Self {
        if quality >= 0.9 {
            Self::Ultra
        } else if quality >= 0.7 {
            Self::High
        } else if quality >= 0.5 {
            Self::Medium
        } else if quality >= 0.3 {
            Self::Low
        } else {
            Self::Minimum
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Minimum => "minimum",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Ultra => "ultra",
        }
    }
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Render features toggled by the quality controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Feature {
    Shadows,
    Antialias,
    HighPolyGeometry,
    PostProcessing,
    Particles,
    Reflections,
}

impl Feature {
    pub const ALL: [Feature; 6] = [
        Feature::Shadows,
        Feature::Antialias,
        Feature::HighPolyGeometry,
        Feature::PostProcessing,
        Feature::Particles,
        Feature::Reflections,
    ];

    /// Minimum quality at which the feature is enabled.
    pub fn default_threshold(&self) -> f32 {
        match self {
            Self::Reflections => 0.9,
            Self::PostProcessing => 0.8,
            Self::Shadows => 0.7,
            Self::Antialias => 0.6,
            Self::HighPolyGeometry => 0.5,
            Self::Particles => 0.4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PerformanceStatus {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl PerformanceStatus {
    pub fn from_fps(fps: f32) -> Self {
        if fps >= 55.0 {
            Self::Excellent
        } else if fps >= 45.0 {
            Self::Good
        } else if fps >= 30.0 {
            Self::Fair
        } else {
            Self::Poor
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LayoutKind {
    #[default]
    Family,
    GoldenSpiral,
    FibonacciSphere,
    FractalTree,
    CosmicWeb,
}

impl LayoutKind {
    pub const ALL: [LayoutKind; 5] = [
        LayoutKind::Family,
        LayoutKind::GoldenSpiral,
        LayoutKind::FibonacciSphere,
        LayoutKind::FractalTree,
        LayoutKind::CosmicWeb,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Family => "family",
            Self::GoldenSpiral => "goldenSpiral",
            Self::FibonacciSphere => "fibonacciSphere",
            Self::FractalTree => "fractalTree",
            Self::CosmicWeb => "cosmicWeb",
        }
    }

    /// Layouts whose output depends on a PRNG.
    pub fn is_random(&self) -> bool {
        matches!(self, Self::CosmicWeb)
    }
}

impl fmt::Display for LayoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LayoutKind {
    type Err = FractalityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LayoutKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| FractalityError::config(format!("unknown layout '{s}'")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InteractionMode {
    #[default]
    Navigate,
    Inspect,
    Explore,
}

impl FromStr for InteractionMode {
    type Err = FractalityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "navigate" => Ok(Self::Navigate),
            "inspect" => Ok(Self::Inspect),
            "explore" => Ok(Self::Explore),
            other => Err(FractalityError::config(format!(
                "unknown interaction mode '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Easing {
    Linear,
    EaseInQuad,
    EaseOutQuad,
    EaseInOutQuad,
    EaseOutCubic,
    #[default]
    EaseInOutCubic,
    EaseInOutSine,
    EaseOutElastic,
}

/// Complexity bucket assigned during global analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
    Hypercomplex,
}

impl Complexity {
    pub fn from_descendants(descendants: usize) -> Self {
        match descendants {
            0..=4 => Self::Simple,
            5..=19 => Self::Moderate,
            20..=99 => Self::Complex,
            _ => Self::Hypercomplex,
        }
    }
}
