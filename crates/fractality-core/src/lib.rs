use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

pub mod config;
pub mod error;
pub mod kinds;
pub mod math;
pub mod visual;

pub use config::{
    AdaptiveQualityConfig, AnimationConfig, AnimationEasingConfig, AnimationSpeedConfig,
    BudgetConfig, CameraConfig, CosmicWebConfig, DataConfig, EngineConfig, FamilyViewConfig,
    FogConfig, GeometryConfig, GeometryKind, GoldenSpiralConfig, InstanceConfig, LayoutConfig,
    LoadingConfig, PerformanceConfig, PixelRatio, PositionConfig, RenderingConfig, SphereConfig,
    TreeConfig,
};
pub use error::{ErrorKind, FractalityError, Result};
pub use kinds::{
    Complexity, Easing, Feature, InteractionMode, Kinship, LayoutKind, PerformanceStatus,
    QualityLevel, TransitionKind,
};
pub use math::{Color, GOLDEN_ANGLE, Mat4, PHI, Vec3};
pub use visual::{VisualSnapshot, VisualState};

/// Stable string identifier of a node, unique within one graph.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Open key/value bag attached to every node.
///
/// `label`, `type`, `tags` and `created` are always present after
/// deserialization; any other key is kept verbatim in `extra` and written back
/// unchanged on serialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeMetadata {
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type", default)]
    pub node_type: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub created: Timestamp,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl NodeMetadata {
    pub fn labelled(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Default::default()
        }
    }

    /// Looks up an opaque key. Known keys are not reachable through here.
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.extra.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.extra.get(key).and_then(|v| v.as_str())
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.extra.get(key).and_then(|v| v.as_f64())
    }
}

/// `created` as written by the source. Producers disagree on the shape
/// (epoch millis, fractional epoch seconds, ISO strings), so the value is kept
/// as given and written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Default for Timestamp {
    fn default() -> Self {
        Timestamp::Int(0)
    }
}

impl From<i64> for Timestamp {
    fn from(value: i64) -> Self {
        Timestamp::Int(value)
    }
}

impl Timestamp {
    /// Numeric value, if the source wrote a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Timestamp::Int(v) => Some(*v as f64),
            Timestamp::Float(v) => Some(*v),
            Timestamp::Text(_) => None,
        }
    }
}

/// Data half of a node. Immutable once the graph is handed to the engine;
/// per-frame visual state lives in a parallel store keyed by the same id.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    pub id: NodeId,
    pub depth: u32,
    pub parent_id: Option<NodeId>,
    /// Canonical child order is insertion order.
    pub child_ids: Vec<NodeId>,
    /// Derived: `parent.child_ids` without `self`. Maintained by the graph.
    pub sibling_ids: Vec<NodeId>,
    pub metadata: NodeMetadata,
}

impl GraphNode {
    pub fn root(id: impl Into<NodeId>) -> Self {
        let id = id.into();
        let metadata = NodeMetadata::labelled(id.as_str());
        Self {
            id,
            depth: 0,
            parent_id: None,
            child_ids: Vec::new(),
            sibling_ids: Vec::new(),
            metadata,
        }
    }

    pub fn child_of(id: impl Into<NodeId>, parent: &GraphNode) -> Self {
        let id = id.into();
        let metadata = NodeMetadata::labelled(id.as_str());
        Self {
            id,
            depth: parent.depth + 1,
            parent_id: Some(parent.id.clone()),
            child_ids: Vec::new(),
            sibling_ids: Vec::new(),
            metadata,
        }
    }

    pub fn with_metadata(mut self, metadata: NodeMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn is_leaf(&self) -> bool {
        self.child_ids.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// `|childIds| + (hasParent ? 1 : 0)`.
    pub fn connection_count(&self) -> usize {
        self.child_ids.len() + usize::from(self.parent_id.is_some())
    }
}

/// FNV-1a over the UTF-8 bytes of `s`. Used wherever a stable per-id number
/// is needed (instance rotation, PRNG seeds, cache keys).
pub fn stable_hash(s: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = OFFSET;
    for byte in s.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}
