use crossbeam_channel::{Receiver, Sender, unbounded};
use fractality_core::{
    ErrorKind, Feature, LayoutKind, NodeId, PerformanceStatus, QualityLevel, TransitionKind,
};
use serde::{Deserialize, Serialize};

/// Runtime events published by the engine for UI layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum Event {
    // Navigation
    FocusChanged {
        previous: Option<NodeId>,
        current: NodeId,
    },
    LayoutChanged {
        layout: LayoutKind,
    },

    // Animation
    TransitionComplete {
        node_id: NodeId,
        kind: TransitionKind,
    },

    // Graph
    GraphChanged {
        node_count: usize,
    },
    LoadFailed {
        source: String,
        kind: ErrorKind,
        message: String,
    },

    // ========================================================================
    // Performance & Quality
    // ========================================================================
    Performance {
        fps: f32,
        frame_time: f32,
        status: PerformanceStatus,
    },
    QualityChanged {
        quality: f32,
        level: QualityLevel,
        enabled_features: Vec<Feature>,
    },
    /// Quality is at its floor with every feature off and FPS still below minimum.
    PerformanceCritical {
        fps: f32,
        quality: f32,
    },
    MemoryPressure {
        #[serde(rename = "usedMB")]
        used_mb: f64,
        percent: f64,
    },

    /// An optional subsystem was skipped for one frame.
    Diagnostic {
        subsystem: String,
        message: String,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::FocusChanged { .. } => "focusChanged",
            Event::LayoutChanged { .. } => "layoutChanged",
            Event::TransitionComplete { .. } => "transitionComplete",
            Event::GraphChanged { .. } => "graphChanged",
            Event::LoadFailed { .. } => "loadFailed",
            Event::Performance { .. } => "performance",
            Event::QualityChanged { .. } => "qualityChanged",
            Event::PerformanceCritical { .. } => "performanceCritical",
            Event::MemoryPressure { .. } => "memoryPressure",
            Event::Diagnostic { .. } => "diagnostic",
        }
    }
}

/// Queue-backed bus. Publishing never calls listeners directly; delivery
/// happens when the owner drains the queue, so a listener reacting to an
/// event can publish more without re-entering itself.
#[derive(Clone)]
pub struct EventBus {
    tx: Sender<Event>,
    rx: Receiver<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn sender(&self) -> Sender<Event> {
        self.tx.clone()
    }

    pub fn receiver(&self) -> Receiver<Event> {
        self.rx.clone()
    }

    pub fn publish(&self, event: Event) {
        tracing::trace!(event = event.name(), "publish");
        let _ = self.tx.send(event);
    }

    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Removes and returns every queued event.
    pub fn drain(&self) -> Vec<Event> {
        self.rx.try_iter().collect()
    }

    /// Hands every queued event to `listener` in publish order.
    pub fn dispatch_to<L: EventListener>(&self, listener: &mut L) {
        while let Ok(event) = self.rx.try_recv() {
            listener.handle_event(&event);
        }
    }
}

/// A UI-side consumer fed by [`EventBus::dispatch_to`].
pub trait EventListener {
    fn handle_event(&mut self, event: &Event);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cloned_sender_reaches_bus() {
        let bus = EventBus::new();
        let receiver = bus.receiver();

        bus.sender()
            .send(Event::FocusChanged {
                previous: None,
                current: NodeId::from("root"),
            })
            .unwrap();

        match receiver.recv().unwrap() {
            Event::FocusChanged { previous, current } => {
                assert!(previous.is_none());
                assert_eq!(current.as_str(), "root");
            }
            other => panic!("Expected FocusChanged, got {other:?}"),
        }
    }

    #[test]
    fn test_dispatch_preserves_order() {
        struct Recorder(Vec<&'static str>);
        impl EventListener for Recorder {
            fn handle_event(&mut self, event: &Event) {
                self.0.push(event.name());
            }
        }

        let bus = EventBus::new();
        bus.publish(Event::GraphChanged { node_count: 10 });
        bus.publish(Event::LayoutChanged {
            layout: LayoutKind::CosmicWeb,
        });
        bus.publish(Event::MemoryPressure {
            used_mb: 900.0,
            percent: 91.0,
        });
        assert_eq!(bus.pending(), 3);

        let mut recorder = Recorder(Vec::new());
        bus.dispatch_to(&mut recorder);
        assert_eq!(
            recorder.0,
            vec!["graphChanged", "layoutChanged", "memoryPressure"]
        );
        assert_eq!(bus.pending(), 0);
    }

    #[test]
    fn test_event_serializes_with_type_and_data() {
        let ev = Event::QualityChanged {
            quality: 0.5,
            level: QualityLevel::Medium,
            enabled_features: vec![Feature::HighPolyGeometry, Feature::Particles],
        };
        let v = serde_json::to_value(ev).unwrap();
        assert_eq!(v["type"], "qualityChanged");
        assert_eq!(v["data"]["level"], "medium");
        assert_eq!(v["data"]["enabledFeatures"][0], "highPolyGeometry");
    }

    #[test]
    fn test_field_names_are_camel_case() {
        let v = serde_json::to_value(Event::MemoryPressure {
            used_mb: 512.0,
            percent: 85.0,
        })
        .unwrap();
        assert_eq!(v["data"]["usedMB"], 512.0);

        let v = serde_json::to_value(Event::TransitionComplete {
            node_id: NodeId::from("a"),
            kind: TransitionKind::Move,
        })
        .unwrap();
        assert_eq!(v["data"]["nodeId"], "a");
    }
}
