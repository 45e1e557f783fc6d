//! Frame orchestration.
//!
//! Per frame, in order: visibility, scoring, layout (only when state asks
//! for it), animation, render, then performance and quality bookkeeping.

use crate::animation::{AnimationSystem, Appearance};
use crate::clock::{Clock, SystemClock};
use crate::performance::{FrameStats, PerformanceMonitor, PerformanceReport, SysinfoProbe};
use crate::quality::{QualityChange, QualityController};
use crate::renderer::{HeadlessBackend, RenderBackend, Renderer};
use crate::state::{StateChange, StateStore};
use crate::visual::VisualStore;
use fractality_core::{
    Color, EngineConfig, FamilyViewConfig, Feature, FractalityError, GraphNode, InteractionMode,
    Kinship, LayoutConfig, LayoutKind, NodeId, QualityLevel, Result, TransitionKind, Vec3,
    VisualSnapshot,
};
use fractality_events::{Event, EventBus};
use fractality_graph::{
    ContextScorer, FamilyView, FamilyViewSelector, Graph, LayoutEngine, NavigationHints,
};
use fractality_loader::{DataLoader, LoadOptions, LoaderStats, Source};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const FADED: f32 = 0.01;
const NEUTRAL_SCORE: f32 = 0.5;

/// Shared collaborators handed to the engine instead of process-wide globals.
#[derive(Clone)]
pub struct EngineContext {
    pub config: EngineConfig,
    pub events: EventBus,
    pub clock: Arc<dyn Clock>,
}

impl Default for EngineContext {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl EngineContext {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            events: EventBus::new(),
            clock: Arc::new(SystemClock::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }
}

/// What one call to [`Engine::frame`] did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FrameReport {
    pub visible: usize,
    pub laid_out: bool,
    pub layout_deferred: bool,
    pub transitions_started: usize,
    pub transitions_completed: usize,
    pub animating: bool,
    pub instances: usize,
    pub timing: FrameStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStats {
    pub frames: u64,
    pub graph_nodes: usize,
    pub focus: Option<NodeId>,
    pub layout: LayoutKind,
    pub visible: usize,
    pub layout_computations: u64,
    pub deferred_layouts: u64,
    pub view_computations: u64,
    pub active_transitions: usize,
    pub instance_count: usize,
    pub quality: f32,
    pub quality_level: QualityLevel,
    pub diagnostics: u64,
    pub performance: PerformanceReport,
    pub loader: LoaderStats,
}

pub struct Engine {
    context: EngineContext,
    loader: DataLoader,
    graph: Option<Arc<Graph>>,
    state: StateStore,
    selector: FamilyViewSelector,
    scorer: ContextScorer,
    layout: LayoutEngine,
    animation: AnimationSystem,
    visuals: VisualStore,
    quality: QualityController,
    performance: PerformanceMonitor,
    renderer: Renderer,
    view: Arc<FamilyView>,
    scores: HashMap<NodeId, f32>,
    layout_deferred: bool,
    deferred_layouts: u64,
    diagnostics: u64,
}

impl Engine {
    /// Engine drawing into a [`HeadlessBackend`].
    pub fn headless(context: EngineContext) -> Self {
        Self::new(context, Box::new(HeadlessBackend::new()))
    }

    pub fn new(context: EngineContext, backend: Box<dyn RenderBackend>) -> Self {
        let config = context.config.clone();
        let loader = DataLoader::with_seed(config.data.loading.clone(), config.data.seed);
        Self::with_loader(context, backend, loader)
    }

    /// Like [`new`](Self::new) with an existing loader, so several engines
    /// can share one cache.
    pub fn with_loader(
        context: EngineContext,
        backend: Box<dyn RenderBackend>,
        loader: DataLoader,
    ) -> Self {
        let config = &context.config;

        let mut performance = PerformanceMonitor::new(&config.performance)
            .with_memory_probe(Box::new(SysinfoProbe::new(config.performance.memory_limit_mb)));
        if config.performance.calibrate {
            performance.calibrate();
        }

        let quality = QualityController::new(
            config.performance.adaptive_quality.clone(),
            config.performance.target_fps,
        );
        let mut renderer = Renderer::new(config.rendering.clone(), backend);
        renderer.apply_quality(
            quality.quality(),
            quality.is_enabled(Feature::HighPolyGeometry),
            quality.is_enabled(Feature::Antialias),
        );

        let mut state = StateStore::new(config.layout.clone());
        let events = context.events.clone();
        state.subscribe(move |change| match change {
            StateChange::FocusChanged {
                previous,
                current: Some(current),
            } => events.publish(Event::FocusChanged {
                previous: previous.clone(),
                current: current.clone(),
            }),
            StateChange::LayoutChanged { layout } => {
                events.publish(Event::LayoutChanged { layout: *layout })
            }
            _ => {}
        });

        Self {
            layout: LayoutEngine::new(config.layout.clone()).with_seed(config.data.seed),
            animation: AnimationSystem::new(config.animation.clone()),
            loader,
            graph: None,
            state,
            selector: FamilyViewSelector::new(),
            scorer: ContextScorer::new(),
            visuals: VisualStore::new(),
            quality,
            performance,
            renderer,
            view: Arc::new(FamilyView::default()),
            scores: HashMap::new(),
            layout_deferred: false,
            deferred_layouts: 0,
            diagnostics: 0,
            context,
        }
    }

    pub fn context(&self) -> &EngineContext {
        &self.context
    }

    pub fn events(&self) -> &EventBus {
        &self.context.events
    }

    pub fn loader(&self) -> &DataLoader {
        &self.loader
    }

    pub fn graph(&self) -> Option<&Arc<Graph>> {
        self.graph.as_ref()
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    pub fn visuals(&self) -> &VisualStore {
        &self.visuals
    }

    pub fn animation(&self) -> &AnimationSystem {
        &self.animation
    }

    pub fn quality(&self) -> &QualityController {
        &self.quality
    }

    pub fn performance(&self) -> &PerformanceMonitor {
        &self.performance
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn layout_engine(&self) -> &LayoutEngine {
        &self.layout
    }

    pub fn scorer(&self) -> &ContextScorer {
        &self.scorer
    }

    /// Visible set of the last frame.
    pub fn view(&self) -> &FamilyView {
        &self.view
    }

    pub fn scores(&self) -> &HashMap<NodeId, f32> {
        &self.scores
    }

    pub fn focus(&self) -> Option<&NodeId> {
        self.state.focus()
    }

    fn now(&self) -> Duration {
        self.context.clock.now()
    }

    // ========================================================================
    // Graph lifecycle
    // ========================================================================

    /// Loads `descriptor` and makes it the active graph. On failure the prior
    /// graph stays active and a `LoadFailed` event is published.
    pub async fn load(&mut self, descriptor: &str) -> Result<Arc<Graph>> {
        match Source::parse(descriptor) {
            Ok(source) => self.load_source(source, LoadOptions::default()).await,
            Err(err) => {
                self.report_load_failure(descriptor, &err);
                Err(err)
            }
        }
    }

    pub async fn load_source(
        &mut self,
        source: Source,
        options: LoadOptions,
    ) -> Result<Arc<Graph>> {
        match self.loader.load(source.clone(), options).await {
            Ok(graph) => {
                self.set_graph(Arc::clone(&graph));
                Ok(graph)
            }
            Err(err) => {
                self.report_load_failure(&source.key(), &err);
                Err(err)
            }
        }
    }

    fn report_load_failure(&self, source: &str, err: &FractalityError) {
        tracing::warn!("Keeping current graph; loading '{}' failed: {}", source, err);
        self.context.events.publish(Event::LoadFailed {
            source: source.to_string(),
            kind: err.kind(),
            message: err.message().to_string(),
        });
    }

    /// Makes `graph` active. Focus is kept if the node still exists,
    /// otherwise it moves to the first root.
    pub fn set_graph(&mut self, graph: Arc<Graph>) {
        tracing::info!("Activating graph with {} nodes", graph.len());
        self.graph = Some(graph);
        self.refresh_graph();
    }

    /// Applies `mutate` to the active graph (copy-on-write) and reruns analysis.
    pub fn mutate_graph<R>(&mut self, mutate: impl FnOnce(&mut Graph) -> Result<R>) -> Result<R> {
        let graph = self
            .graph
            .as_mut()
            .ok_or_else(|| FractalityError::invariant("no graph loaded"))?;
        let result = mutate(Arc::make_mut(graph))?;
        self.graph_changed();
        Ok(result)
    }

    /// Signals that the active graph changed outside the engine.
    pub fn graph_changed(&mut self) {
        self.refresh_graph();
    }

    fn refresh_graph(&mut self) {
        let Some(graph) = self.graph.clone() else {
            return;
        };
        let now = self.now();
        self.selector.invalidate();
        self.layout.invalidate();
        self.scorer.invalidate();
        self.scorer.analyze(&graph, now);

        let keep_focus = self
            .state
            .focus()
            .is_some_and(|f| graph.contains(f.as_str()));
        if !keep_focus {
            match graph.roots().first() {
                Some(root) => {
                    self.state.set_focus(root.clone());
                    self.scorer.record_access(root.as_str(), now);
                }
                None => self.state.clear_focus(),
            }
        }
        self.state.retain_history(|id| graph.contains(id.as_str()));

        self.visuals.retain(|id, _| graph.contains(id.as_str()));
        self.animation.forget(&self.visuals);
        self.state.mark_graph_reloaded();
        self.context.events.publish(Event::GraphChanged {
            node_count: graph.len(),
        });
    }

    // ========================================================================
    // Navigation and configuration
    // ========================================================================

    /// Returns `Ok(false)` if `id` already has focus.
    pub fn set_focus(&mut self, id: &str) -> Result<bool> {
        let graph = self
            .graph
            .as_ref()
            .ok_or_else(|| FractalityError::invariant("no graph loaded"))?;
        let node = graph
            .get(id)
            .ok_or_else(|| {
                FractalityError::invariant(format!("cannot focus '{id}': not in graph"))
            })?;
        let node_id = node.id.clone();
        if !self.state.set_focus(node_id.clone()) {
            return Ok(false);
        }
        self.on_focus(&node_id);
        Ok(true)
    }

    /// Returns to the previous focus, if any.
    pub fn back(&mut self) -> Option<NodeId> {
        let target = self.state.back()?;
        self.on_focus(&target);
        Some(target)
    }

    fn on_focus(&mut self, id: &NodeId) {
        // Access must be recorded before the next frame scores.
        self.scorer.record_access(id.as_str(), self.now());
        if self.state.flag("pulseOnFocus") {
            self.animation.pulse_node(&self.visuals, id);
        }
        if self.state.flag("rippleOnFocus") {
            self.animation
                .ripple_from(&self.visuals, id.as_str(), self.view.ids());
        }
    }

    pub fn set_layout(&mut self, name: &str) -> Result<bool> {
        let changed = self.state.set_layout_by_name(name)?;
        self.layout.set_layout(self.state.layout());
        Ok(changed)
    }

    pub fn set_view_config(&mut self, config: FamilyViewConfig) {
        self.state.set_view_config(config);
        self.layout.set_config(self.state.layout_config().clone());
    }

    pub fn set_layout_config(&mut self, config: LayoutConfig) {
        self.state.set_layout_config(config);
        self.layout.set_config(self.state.layout_config().clone());
    }

    pub fn set_mode(&mut self, mode: InteractionMode) {
        self.state.set_mode(mode);
    }

    pub fn set_flag(&mut self, name: &str, enabled: bool) -> Result<()> {
        self.state.set_flag(name, enabled)
    }

    pub fn pulse_node(&mut self, id: &str) -> bool {
        self.animation.pulse_node(&self.visuals, &NodeId::from(id))
    }

    pub fn ripple_from(&mut self, id: &str) -> usize {
        self.animation
            .ripple_from(&self.visuals, id, self.view.ids())
    }

    pub fn stop_animations(&mut self) {
        self.animation.stop_all(&mut self.visuals);
    }

    pub fn navigation_hints(&mut self, limit: usize) -> Option<NavigationHints> {
        let graph = self.graph.clone()?;
        let now = self.now();
        Some(self.scorer.navigation_hints(&graph, now, limit))
    }

    // ========================================================================
    // Frame
    // ========================================================================

    pub fn frame(&mut self) -> FrameReport {
        let now = self.now();
        let delta = self.performance.start_frame(now);
        let mut report = FrameReport::default();

        if !self.performance.can_continue()
            && let Some(change) = self.quality.decrease(now)
        {
            self.apply_quality_change(change);
        }

        if let (Some(graph), Some(focus)) = (self.graph.clone(), self.state.focus().cloned()) {
            self.frame_graph(&graph, &focus, now, delta, &mut report);
        }

        let focus_position = self
            .state
            .focus()
            .and_then(|f| self.visuals.get(f.as_str()))
            .map(|s| s.position)
            .unwrap_or(Vec3::ZERO);
        let render = self.performance.start_timing("rendering", self.now());
        self.renderer.update_camera(focus_position);
        report.instances = self.renderer.update_instances(&self.visuals);
        self.renderer.render();
        self.performance.end_timing(render, self.now());

        report.timing = self.performance.end_frame(self.now());
        self.after_frame(now, &report.timing);
        report
    }

    fn frame_graph(
        &mut self,
        graph: &Graph,
        focus: &NodeId,
        now: Duration,
        delta: f32,
        report: &mut FrameReport,
    ) {
        let view = self
            .selector
            .select(graph, focus.as_str(), self.state.view_config(), now);
        report.visible = view.len();

        match self.scorer.score(graph, view.ids(), focus.as_str(), now) {
            Ok(scores) => self.scores = scores,
            Err(err) => {
                self.scores.clear();
                self.diagnostic("context", &err);
            }
        }

        if self.state.needs_layout() {
            let remaining = self.performance.remaining_budget(self.now());
            if remaining <= 0.0 && !self.layout_deferred {
                tracing::debug!("Deferring layout: frame budget exhausted ({:.2} ms)", remaining);
                self.layout_deferred = true;
                self.deferred_layouts += 1;
                report.layout_deferred = true;
            } else {
                let handle = self.performance.start_timing("layout", self.now());
                let positions = self.layout.calculate_layout(graph, &view, now);
                let targets: HashMap<NodeId, VisualSnapshot> = positions
                    .iter()
                    .map(|(id, position)| {
                        (id.clone(), self.appearance(graph, &view, id).at(*position))
                    })
                    .collect();
                let present: Vec<NodeId> = self.visuals.ids().cloned().collect();
                report.transitions_started = self.animation.start_transition(
                    &mut self.visuals,
                    present.iter().chain(view.ids()),
                    &targets,
                    Some(&view),
                );
                self.performance.end_timing(handle, self.now());
                self.state.clear_needs_layout();
                self.layout_deferred = false;
                report.laid_out = true;
            }
        }

        for entry in &view.entries {
            let priority = self.selector.weights().for_role(entry.role);
            let score = self.score_of(&entry.id);
            if let Some(state) = self.visuals.get_mut(entry.id.as_str()) {
                state.priority = priority;
                state.context_score = score;
            }
            let appearance = self.appearance(graph, &view, &entry.id);
            self.animation
                .settle(&mut self.visuals, entry.id.as_str(), appearance, delta);
        }

        let handle = self.performance.start_timing("animation", self.now());
        let tick = self.animation.update(
            &mut self.visuals,
            delta,
            self.performance.animation_budget_scale(),
        );
        self.performance.end_timing(handle, self.now());
        report.transitions_completed = tick.completed.len();
        report.animating = tick.animating;
        for (node_id, kind) in tick.completed {
            self.context
                .events
                .publish(Event::TransitionComplete { node_id, kind });
        }

        let animation = &self.animation;
        let stale: Vec<NodeId> = self
            .visuals
            .iter()
            .filter(|(id, state)| {
                state.opacity <= FADED
                    && !view.contains(id.as_str())
                    && !animation.has_transition(id.as_str(), TransitionKind::FadeOut)
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in &stale {
            self.visuals.remove(id.as_str());
        }
        if !stale.is_empty() {
            self.animation.forget(&self.visuals);
        }

        self.view = view;
    }

    fn score_of(&self, id: &NodeId) -> f32 {
        self.scores.get(id).copied().unwrap_or(NEUTRAL_SCORE)
    }

    /// Target opacity, scale and color of a visible node from its role,
    /// priority and context score.
    fn appearance(&self, graph: &Graph, view: &FamilyView, id: &NodeId) -> Appearance {
        let role = view.role_of(id.as_str()).unwrap_or(Kinship::Context { hops: 1 });
        let priority = self.selector.weights().for_role(role);
        let score = self.score_of(id);
        let opacity = match role {
            Kinship::Focus => 1.0,
            _ => 0.45 + 0.55 * score,
        };
        Appearance {
            scale: 0.6 + 0.2 * priority,
            opacity,
            color: graph.get(id.as_str()).map_or(Color::WHITE, node_color),
        }
    }

    fn after_frame(&mut self, now: Duration, timing: &FrameStats) {
        let events = &self.context.events;
        if let Some(fps) = timing.fps {
            events.publish(Event::Performance {
                fps,
                frame_time: self.performance.average_frame_time(),
                status: self.performance.status(),
            });
        }

        if let Some(sample) = self.performance.check_memory(now) {
            tracing::warn!(
                "Memory pressure: {:.1} MB ({:.1}%)",
                sample.used_mb(),
                sample.percent()
            );
            events.publish(Event::MemoryPressure {
                used_mb: sample.used_mb(),
                percent: sample.percent(),
            });
            self.quality.note_memory_pressure();
        }

        if let Some(fps) = self.performance.instantaneous_fps() {
            self.quality.record_fps(fps);
        }
        let outcome = self.quality.update(now);
        if let Some(change) = outcome.changed {
            self.apply_quality_change(change);
        }
        if let Some(fps) = outcome.critical {
            self.context.events.publish(Event::PerformanceCritical {
                fps,
                quality: self.quality.quality(),
            });
        }
    }

    fn apply_quality_change(&mut self, change: QualityChange) {
        self.renderer.apply_quality(
            change.quality,
            self.quality.is_enabled(Feature::HighPolyGeometry),
            self.quality.is_enabled(Feature::Antialias),
        );
        self.context.events.publish(Event::QualityChanged {
            quality: change.quality,
            level: change.level,
            enabled_features: change.enabled_features,
        });
    }

    fn diagnostic(&mut self, subsystem: &str, err: &FractalityError) {
        self.diagnostics += 1;
        tracing::warn!("Skipping {} for this frame: {}", subsystem, err);
        self.context.events.publish(Event::Diagnostic {
            subsystem: subsystem.to_string(),
            message: err.to_string(),
        });
    }

    /// Runs `frames` frames back to back. The clock is not advanced here.
    pub fn run_frames(&mut self, frames: usize) -> Vec<FrameReport> {
        (0..frames).map(|_| self.frame()).collect()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            frames: self.performance.frames(),
            graph_nodes: self.graph.as_ref().map_or(0, |g| g.len()),
            focus: self.state.focus().cloned(),
            layout: self.layout.active(),
            visible: self.view.len(),
            layout_computations: self.layout.computations(),
            deferred_layouts: self.deferred_layouts,
            view_computations: self.selector.computations(),
            active_transitions: self.animation.active_count(),
            instance_count: self.renderer.instance_count(),
            quality: self.quality.quality(),
            quality_level: self.quality.level(),
            diagnostics: self.diagnostics,
            performance: self.performance.report(),
            loader: self.loader.stats(),
        }
    }
}

/// Node tint from a `color` metadata key (`#rrggbb`), white otherwise.
fn node_color(node: &GraphNode) -> Color {
    node.metadata
        .get_str("color")
        .and_then(Color::parse_hex)
        .unwrap_or(Color::WHITE)
}
