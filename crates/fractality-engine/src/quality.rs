use fractality_core::{AdaptiveQualityConfig, Feature, QualityLevel};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

/// Result of one controller step that changed the quality value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityChange {
    pub previous: f32,
    pub quality: f32,
    pub level: QualityLevel,
    pub previous_level: QualityLevel,
    pub enabled_features: Vec<Feature>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QualityOutcome {
    pub changed: Option<QualityChange>,
    /// Average FPS, set when quality is at its floor with every feature off
    /// and the frame rate is still below the minimum.
    pub critical: Option<f32>,
}

/// Closed-loop controller that trades visual features for frame rate.
#[derive(Debug)]
pub struct QualityController {
    config: AdaptiveQualityConfig,
    target_fps: f32,
    quality: f32,
    thresholds: BTreeMap<Feature, f32>,
    samples: VecDeque<f32>,
    last_adjustment: Option<Duration>,
    memory_pressure: bool,
}

impl QualityController {
    pub fn new(config: AdaptiveQualityConfig, target_fps: f32) -> Self {
        let quality = config
            .initial_quality
            .clamp(config.min_quality, config.max_quality);
        let thresholds = Feature::ALL
            .into_iter()
            .map(|f| (f, f.default_threshold()))
            .collect();
        Self {
            samples: VecDeque::with_capacity(config.sample_frames),
            config,
            target_fps,
            quality,
            thresholds,
            last_adjustment: None,
            memory_pressure: false,
        }
    }

    pub fn quality(&self) -> f32 {
        self.quality
    }

    pub fn level(&self) -> QualityLevel {
        QualityLevel::from_quality(self.quality)
    }

    pub fn is_enabled(&self, feature: Feature) -> bool {
        self.thresholds
            .get(&feature)
            .is_some_and(|threshold| self.quality >= *threshold)
    }

    pub fn enabled_features(&self) -> Vec<Feature> {
        self.thresholds
            .keys()
            .copied()
            .filter(|f| self.is_enabled(*f))
            .collect()
    }

    pub fn set_threshold(&mut self, feature: Feature, threshold: f32) {
        self.thresholds.insert(feature, threshold.clamp(0.0, 1.0));
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn average_fps(&self) -> Option<f32> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<f32>() / self.samples.len() as f32)
    }

    /// Records one frame's instantaneous FPS into the sample window.
    pub fn record_fps(&mut self, fps: f32) {
        if !fps.is_finite() {
            return;
        }
        if self.samples.len() == self.config.sample_frames {
            self.samples.pop_front();
        }
        self.samples.push_back(fps);
    }

    /// Biases the next adjustment one step toward lower quality.
    pub fn note_memory_pressure(&mut self) {
        self.memory_pressure = true;
    }

    fn interval_elapsed(&self, now: Duration) -> bool {
        let interval = Duration::from_millis(self.config.adjustment_interval_ms);
        self.last_adjustment
            .is_none_or(|last| now.saturating_sub(last) >= interval)
    }

    /// One adaptive step. Does nothing until the sample window is full or
    /// within the minimum interval of the previous adjustment.
    pub fn update(&mut self, now: Duration) -> QualityOutcome {
        if !self.config.enabled
            || self.samples.len() < self.config.sample_frames
            || !self.interval_elapsed(now)
        {
            return QualityOutcome::default();
        }
        let Some(avg) = self.average_fps() else {
            return QualityOutcome::default();
        };

        let rate = self.config.adjustment_rate;
        let mut delta = if avg < self.config.min_fps {
            -2.0 * rate
        } else if avg < 0.9 * self.target_fps {
            -rate
        } else if avg > 0.95 * self.target_fps && self.quality < self.config.max_quality {
            rate
        } else {
            0.0
        };
        if std::mem::take(&mut self.memory_pressure) {
            delta = (delta - rate).max(-2.0 * rate);
        }
        self.last_adjustment = Some(now);

        let target = (self.quality + delta).clamp(self.config.min_quality, self.config.max_quality);
        let changed = self.move_toward(target);

        let critical = (avg < self.config.min_fps
            && self.quality <= self.config.min_quality + f32::EPSILON
            && self.enabled_features().is_empty())
        .then_some(avg);
        if let Some(fps) = critical {
            tracing::warn!(
                "Quality at floor {:.2} with every feature off, still {:.1} FPS",
                self.quality,
                fps
            );
        }
        QualityOutcome { changed, critical }
    }

    /// Immediate one-step decrease for a frame that ran over budget. Shares
    /// the minimum interval with [`update`](Self::update).
    pub fn decrease(&mut self, now: Duration) -> Option<QualityChange> {
        if !self.config.enabled
            || !self.interval_elapsed(now)
            || self.quality <= self.config.min_quality
        {
            return None;
        }
        self.last_adjustment = Some(now);
        let target = (self.quality - self.config.adjustment_rate).max(self.config.min_quality);
        self.move_toward(target)
    }

    /// Lerps halfway to `target`, snapping when the remainder is negligible.
    fn move_toward(&mut self, target: f32) -> Option<QualityChange> {
        let previous = self.quality;
        let mut next = previous + (target - previous) * 0.5;
        if (target - next).abs() < 1e-3 {
            next = target;
        }
        let next = next.clamp(self.config.min_quality, self.config.max_quality);
        if next == previous {
            return None;
        }
        let previous_level = QualityLevel::from_quality(previous);
        self.quality = next;
        let level = self.level();
        if level != previous_level {
            tracing::info!(
                "Quality level {} -> {} ({:.2})",
                previous_level,
                level,
                next
            );
        } else {
            tracing::debug!("Quality {:.3} -> {:.3}", previous, next);
        }
        Some(QualityChange {
            previous,
            quality: next,
            level,
            previous_level,
            enabled_features: self.enabled_features(),
        })
    }

    /// Sets quality directly, bypassing the controller.
    pub fn force(&mut self, quality: f32) -> Option<QualityChange> {
        let target = quality.clamp(self.config.min_quality, self.config.max_quality);
        let previous = self.quality;
        if target == previous {
            return None;
        }
        let previous_level = QualityLevel::from_quality(previous);
        self.quality = target;
        Some(QualityChange {
            previous,
            quality: target,
            level: self.level(),
            previous_level,
            enabled_features: self.enabled_features(),
        })
    }
}
