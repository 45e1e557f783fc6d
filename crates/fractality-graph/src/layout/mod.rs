//! Layout engine: maps a visible set to 3D target positions.

mod cosmic;
mod family;
mod sphere;
mod spiral;
mod tree;

pub use cosmic::CosmicWebLayout;
pub use family::FamilyLayout;
pub use sphere::FibonacciSphereLayout;
pub use spiral::GoldenSpiralLayout;
pub use tree::FractalTreeLayout;

use crate::family_view::FamilyView;
use crate::store::Graph;
use fractality_core::{LayoutConfig, LayoutKind, NodeId, Result, Vec3};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub type Positions = HashMap<NodeId, Vec3>;

pub struct LayoutInput<'a> {
    pub graph: &'a Graph,
    pub view: &'a FamilyView,
    pub config: &'a LayoutConfig,
    /// Seed for layouts that scatter randomly.
    pub seed: u64,
}

impl LayoutInput<'_> {
    pub fn focus(&self) -> Option<&NodeId> {
        self.view.focus.as_ref()
    }
}

pub trait Layouter: Send + Sync {
    fn kind(&self) -> LayoutKind;

    /// Positions for every entry of `input.view`. Must be a pure function of
    /// the input.
    fn compute(&self, input: &LayoutInput<'_>) -> Positions;
}

pub fn layouter_for(kind: LayoutKind) -> &'static dyn Layouter {
    match kind {
        LayoutKind::Family => &FamilyLayout,
        LayoutKind::GoldenSpiral => &GoldenSpiralLayout,
        LayoutKind::FibonacciSphere => &FibonacciSphereLayout,
        LayoutKind::FractalTree => &FractalTreeLayout,
        LayoutKind::CosmicWeb => &CosmicWebLayout,
    }
}

type CacheKey = (NodeId, usize, LayoutKind);

/// Holds the active layout and a short result cache keyed by focus, visible
/// count and layout.
pub struct LayoutEngine {
    active: LayoutKind,
    config: LayoutConfig,
    seed_override: Option<u64>,
    cache: HashMap<CacheKey, (Duration, Arc<Positions>)>,
    computations: u64,
}

impl Default for LayoutEngine {
    fn default() -> Self {
        Self::new(LayoutConfig::default())
    }
}

impl LayoutEngine {
    pub fn new(config: LayoutConfig) -> Self {
        Self {
            active: config.active,
            config,
            seed_override: None,
            cache: HashMap::new(),
            computations: 0,
        }
    }

    /// Seed used when `cosmicWeb.seed` is unset. Falls back to the graph's own seed.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed_override = seed;
        self
    }

    pub fn active(&self) -> LayoutKind {
        self.active
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    pub fn computations(&self) -> u64 {
        self.computations
    }

    /// Returns `true` if the active layout changed.
    pub fn set_layout(&mut self, kind: LayoutKind) -> bool {
        if self.active == kind {
            return false;
        }
        tracing::info!("Switching layout {} -> {}", self.active, kind);
        self.active = kind;
        self.config.active = kind;
        true
    }

    /// Unknown names are rejected and the active layout is kept.
    pub fn set_layout_by_name(&mut self, name: &str) -> Result<bool> {
        match name.parse::<LayoutKind>() {
            Ok(kind) => Ok(self.set_layout(kind)),
            Err(err) => {
                tracing::warn!("Rejected layout '{}': {}", name, err);
                Err(err)
            }
        }
    }

    pub fn set_config(&mut self, config: LayoutConfig) {
        self.active = config.active;
        self.config = config;
        self.cache.clear();
    }

    pub fn invalidate(&mut self) {
        self.cache.clear();
    }

    pub fn seed_for(&self, graph: &Graph) -> u64 {
        self.config
            .cosmic_web
            .seed
            .or(self.seed_override)
            .unwrap_or_else(|| graph.seed())
    }

    pub fn calculate_layout(
        &mut self,
        graph: &Graph,
        view: &FamilyView,
        now: Duration,
    ) -> Arc<Positions> {
        let Some(focus) = view.focus.clone() else {
            return Arc::new(Positions::new());
        };
        let ttl = Duration::from_millis(self.config.cache_ttl_ms);
        let key = (focus, view.len(), self.active);
        if let Some((at, positions)) = self.cache.get(&key)
            && now.saturating_sub(*at) < ttl
        {
            return Arc::clone(positions);
        }
        self.cache.retain(|_, (at, _)| now.saturating_sub(*at) < ttl);

        let input = LayoutInput {
            graph,
            view,
            config: &self.config,
            seed: self.seed_for(graph),
        };
        let positions = Arc::new(layouter_for(self.active).compute(&input));
        self.computations += 1;
        tracing::debug!(
            "Computed {} layout for {} nodes around '{}'",
            self.active,
            positions.len(),
            key.0
        );
        self.cache.insert(key, (now, Arc::clone(&positions)));
        positions
    }
}
