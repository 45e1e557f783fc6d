use fractality_core::{BudgetConfig, PerformanceConfig, PerformanceStatus};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessesToUpdate, System};

const MOVING_AVERAGE_FRAMES: usize = 60;
const HISTORY_WINDOW: Duration = Duration::from_secs(120);
const FPS_INTERVAL: Duration = Duration::from_secs(1);
const MEMORY_INTERVAL: Duration = Duration::from_secs(1);
const MEMORY_PRESSURE_PERCENT: f64 = 90.0;
const CALIBRATION_BASELINE_MS: f32 = 10.0;
const CALIBRATION_ITERATIONS: u32 = 200_000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MemorySample {
    pub used_bytes: u64,
    pub limit_bytes: u64,
}

impl MemorySample {
    pub fn used_mb(&self) -> f64 {
        self.used_bytes as f64 / (1024.0 * 1024.0)
    }

    pub fn percent(&self) -> f64 {
        if self.limit_bytes == 0 {
            return 0.0;
        }
        self.used_bytes as f64 * 100.0 / self.limit_bytes as f64
    }
}

/// Source of process memory readings.
pub trait MemoryProbe: Send {
    fn sample(&mut self) -> Option<MemorySample>;
}

/// Resident memory of this process against total system memory, or against
/// an explicit limit when one is configured.
pub struct SysinfoProbe {
    system: System,
    pid: Pid,
    limit_bytes: Option<u64>,
}

impl SysinfoProbe {
    pub fn new(limit_mb: Option<u64>) -> Self {
        Self {
            system: System::new(),
            pid: Pid::from_u32(std::process::id()),
            limit_bytes: limit_mb.map(|mb| mb * 1024 * 1024),
        }
    }
}

impl MemoryProbe for SysinfoProbe {
    fn sample(&mut self) -> Option<MemorySample> {
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);
        let used_bytes = self.system.process(self.pid)?.memory();
        let limit_bytes = match self.limit_bytes {
            Some(limit) => limit,
            None => {
                self.system.refresh_memory();
                self.system.total_memory()
            }
        };
        Some(MemorySample {
            used_bytes,
            limit_bytes,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimingHandle {
    name: String,
    started: Duration,
}

impl TimingHandle {
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FrameStats {
    /// Interval since the previous frame started, in ms.
    pub frame_time: f32,
    /// Time between `start_frame` and `end_frame`, in ms.
    pub work_time: f32,
    /// Set once per second with the frame rate over that second.
    pub fps: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceReport {
    pub fps: f32,
    pub average_frame_time: f32,
    pub average_work_time: f32,
    pub status: PerformanceStatus,
    pub frames: u64,
    pub budget_total: f32,
    pub device_score: Option<f32>,
    pub timings: HashMap<String, f32>,
}

/// Frame timing, sub-budgets and periodic FPS.
pub struct PerformanceMonitor {
    budgets: BudgetConfig,
    frame_times: VecDeque<f32>,
    work_times: VecDeque<f32>,
    frame_start: Option<Duration>,
    previous_start: Option<Duration>,
    fps_window_start: Option<Duration>,
    frames_in_window: u32,
    fps: f32,
    fps_history: VecDeque<(Duration, f32)>,
    frame_history: VecDeque<(Duration, f32)>,
    timings: HashMap<String, f32>,
    frames: u64,
    device_score: Option<f32>,
    memory: Option<Box<dyn MemoryProbe>>,
    last_memory_check: Option<Duration>,
}

impl PerformanceMonitor {
    pub fn new(config: &PerformanceConfig) -> Self {
        Self {
            budgets: config.budgets.clone(),
            frame_times: VecDeque::with_capacity(MOVING_AVERAGE_FRAMES),
            work_times: VecDeque::with_capacity(MOVING_AVERAGE_FRAMES),
            frame_start: None,
            previous_start: None,
            fps_window_start: None,
            frames_in_window: 0,
            fps: 0.0,
            fps_history: VecDeque::new(),
            frame_history: VecDeque::new(),
            timings: HashMap::new(),
            frames: 0,
            device_score: None,
            memory: None,
            last_memory_check: None,
        }
    }

    pub fn with_memory_probe(mut self, probe: Box<dyn MemoryProbe>) -> Self {
        self.memory = Some(probe);
        self
    }

    pub fn budgets(&self) -> &BudgetConfig {
        &self.budgets
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn fps(&self) -> f32 {
        self.fps
    }

    pub fn status(&self) -> PerformanceStatus {
        PerformanceStatus::from_fps(self.fps)
    }

    pub fn device_score(&self) -> Option<f32> {
        self.device_score
    }

    pub fn average_frame_time(&self) -> f32 {
        average(&self.frame_times)
    }

    pub fn average_work_time(&self) -> f32 {
        average(&self.work_times)
    }

    pub fn fps_history(&self) -> impl Iterator<Item = &(Duration, f32)> {
        self.fps_history.iter()
    }

    pub fn frame_history(&self) -> impl Iterator<Item = &(Duration, f32)> {
        self.frame_history.iter()
    }

    /// Marks the start of a frame. Returns seconds since the previous frame
    /// started (0 for the first frame).
    pub fn start_frame(&mut self, now: Duration) -> f32 {
        self.timings.clear();
        self.frame_start = Some(now);
        let delta = self
            .previous_start
            .map(|prev| now.saturating_sub(prev))
            .unwrap_or_default();
        if self.previous_start.is_some() {
            let ms = delta.as_secs_f32() * 1000.0;
            push_capped(&mut self.frame_times, ms);
            self.frame_history.push_back((now, ms));
            trim_history(&mut self.frame_history, now);
        }
        self.previous_start = Some(now);
        self.fps_window_start.get_or_insert(now);
        delta.as_secs_f32()
    }

    /// Frame rate implied by the last frame interval.
    pub fn instantaneous_fps(&self) -> Option<f32> {
        let last = *self.frame_times.back()?;
        (last > 0.0).then(|| 1000.0 / last)
    }

    pub fn end_frame(&mut self, now: Duration) -> FrameStats {
        let work = self
            .frame_start
            .take()
            .map(|start| now.saturating_sub(start).as_secs_f32() * 1000.0)
            .unwrap_or_default();
        push_capped(&mut self.work_times, work);
        self.frames += 1;
        self.frames_in_window += 1;

        let mut fps = None;
        if let Some(window_start) = self.fps_window_start {
            let elapsed = now.saturating_sub(window_start);
            if elapsed >= FPS_INTERVAL {
                let value = self.frames_in_window as f32 / elapsed.as_secs_f32();
                self.fps = value;
                self.fps_history.push_back((now, value));
                trim_history(&mut self.fps_history, now);
                self.frames_in_window = 0;
                self.fps_window_start = Some(now);
                fps = Some(value);
            }
        }

        FrameStats {
            frame_time: self.frame_times.back().copied().unwrap_or_default(),
            work_time: work,
            fps,
        }
    }

    pub fn start_timing(&self, name: impl Into<String>, now: Duration) -> TimingHandle {
        TimingHandle {
            name: name.into(),
            started: now,
        }
    }

    /// Records the elapsed ms under the handle's name for this frame.
    pub fn end_timing(&mut self, handle: TimingHandle, now: Duration) -> f32 {
        let ms = now.saturating_sub(handle.started).as_secs_f32() * 1000.0;
        *self.timings.entry(handle.name).or_default() += ms;
        ms
    }

    pub fn timing(&self, name: &str) -> Option<f32> {
        self.timings.get(name).copied()
    }

    /// Milliseconds left in the current frame's total budget.
    pub fn remaining_budget(&self, now: Duration) -> f32 {
        let spent = self
            .frame_start
            .map(|start| now.saturating_sub(start).as_secs_f32() * 1000.0)
            .unwrap_or_default();
        self.budgets.total - spent
    }

    /// `false` once recent frames spend more than the total budget on work.
    pub fn can_continue(&self) -> bool {
        self.work_times.is_empty() || self.average_work_time() <= self.budgets.total
    }

    /// Time-dilation factor for animation, in `(0, 1]`.
    pub fn animation_budget_scale(&self) -> f32 {
        let avg = self.average_work_time();
        if avg <= self.budgets.total || avg <= 0.0 {
            1.0
        } else {
            (self.budgets.total / avg).clamp(0.25, 1.0)
        }
    }

    /// Runs the synthetic loop and applies its score.
    pub fn calibrate(&mut self) -> f32 {
        let started = Instant::now();
        let mut acc = 0.0f64;
        for i in 0..CALIBRATION_ITERATIONS {
            let x = f64::from(i) * 0.001;
            acc += x.sin() * x.sqrt();
        }
        std::hint::black_box(acc);
        let observed = started.elapsed().as_secs_f32() * 1000.0;
        self.apply_calibration(observed)
    }

    /// Scores a device from the observed calibration time and relaxes the
    /// total budget on slow devices. Returns the score.
    pub fn apply_calibration(&mut self, observed_ms: f32) -> f32 {
        let score = CALIBRATION_BASELINE_MS / observed_ms.max(f32::EPSILON);
        let total = if score < 0.5 {
            1000.0 / 30.0
        } else if score < 1.0 {
            1000.0 / 50.0
        } else {
            self.budgets.total
        };
        if total > self.budgets.total {
            tracing::info!(
                "Device score {:.2}; frame budget raised to {:.2} ms",
                score,
                total
            );
            self.budgets.total = total;
        }
        self.device_score = Some(score);
        score
    }

    /// Samples memory at most once per second. Returns the sample when usage
    /// is above 90% of the limit.
    pub fn check_memory(&mut self, now: Duration) -> Option<MemorySample> {
        if self
            .last_memory_check
            .is_some_and(|last| now.saturating_sub(last) < MEMORY_INTERVAL)
        {
            return None;
        }
        self.last_memory_check = Some(now);
        let sample = self.memory.as_mut()?.sample()?;
        (sample.percent() > MEMORY_PRESSURE_PERCENT).then_some(sample)
    }

    pub fn report(&self) -> PerformanceReport {
        PerformanceReport {
            fps: self.fps,
            average_frame_time: self.average_frame_time(),
            average_work_time: self.average_work_time(),
            status: self.status(),
            frames: self.frames,
            budget_total: self.budgets.total,
            device_score: self.device_score,
            timings: self.timings.clone(),
        }
    }
}

fn push_capped(samples: &mut VecDeque<f32>, value: f32) {
    if samples.len() == MOVING_AVERAGE_FRAMES {
        samples.pop_front();
    }
    samples.push_back(value);
}

fn trim_history(history: &mut VecDeque<(Duration, f32)>, now: Duration) {
    while history
        .front()
        .is_some_and(|(at, _)| now.saturating_sub(*at) > HISTORY_WINDOW)
    {
        history.pop_front();
    }
}

fn average(samples: &VecDeque<f32>) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f32>() / samples.len() as f32
}
