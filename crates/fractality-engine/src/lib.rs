//! Runtime half of the explorer: per-node visual state, animation, adaptive
//! quality, performance accounting and the frame loop that drives them.

pub mod animation;
pub mod clock;
pub mod engine;
pub mod performance;
pub mod quality;
pub mod renderer;
pub mod state;
pub mod visual;

pub use animation::{AnimationSystem, AnimationTick, Appearance, TransitionKey};
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{Engine, EngineContext, EngineStats, FrameReport};
pub use performance::{
    FrameStats, MemoryProbe, MemorySample, PerformanceMonitor, PerformanceReport, SysinfoProbe,
};
pub use quality::{QualityChange, QualityController, QualityOutcome};
pub use renderer::{
    Camera, HeadlessBackend, HeadlessLog, InstanceData, RenderBackend, RenderFrame, RenderSettings,
    Renderer,
};
pub use state::{ObserverId, StateChange, StateStore};
pub use visual::VisualStore;
