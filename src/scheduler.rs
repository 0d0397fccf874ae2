//! Adaptive frame scheduler.
//!
//! One call to `run_cycle` is one tick of the detection loop:
//!
//! 1. **Skip** when less than the adaptive delay has passed since the last
//!    accepted cycle. Nothing is captured; the caller retries after the
//!    remaining time.
//! 2. **Defer** when the source is not ready. The last-accepted timestamp does
//!    not move, so the loop keeps retrying at the current cadence.
//! 3. Otherwise capture into the working buffer, run the detector, re-project,
//!    render, record metrics, and set the next delay to
//!    `clamp(processing * 1.2, min, max)`.
//!
//! A detector error never leaves the cycle: the delay falls back to a fixed value
//! and the next tick proceeds normally. Exactly one detector call is in flight at
//! a time because every step runs on `&mut self`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::clock::Clock;
use crate::detect::DetectorBackend;
use crate::error::{OverlayError, OverlayResult};
use crate::frame::{FrameJob, WorkingFrame};
use crate::geometry::{reproject_all, Dimensions};
use crate::ingest::VideoSource;
use crate::metrics::{MetricsAggregator, Snapshot, DEFAULT_WINDOW};
use crate::sink::{LogRenderer, LogTelemetry, Renderer, TelemetrySink};

pub const MIN_DELAY: Duration = Duration::from_millis(30);
pub const MAX_DELAY: Duration = Duration::from_millis(200);
pub const FALLBACK_DELAY: Duration = Duration::from_millis(100);
pub const DEFAULT_TARGET_FPS: u32 = 15;
pub const DEFAULT_WORKING_SIZE: Dimensions = Dimensions::new(320, 240);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub target_fps: u32,
    /// Resolution frames are resampled to before detection.
    pub working_size: Dimensions,
    pub min_delay: Duration,
    pub max_delay: Duration,
    /// Delay applied after a failed detection call.
    pub fallback_delay: Duration,
    /// Number of latency samples kept for the tail percentile.
    pub window: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            target_fps: DEFAULT_TARGET_FPS,
            working_size: DEFAULT_WORKING_SIZE,
            min_delay: MIN_DELAY,
            max_delay: MAX_DELAY,
            fallback_delay: FALLBACK_DELAY,
            window: DEFAULT_WINDOW,
        }
    }
}

impl SchedulerConfig {
    pub fn clamp_delay(&self, delay: Duration) -> Duration {
        delay.clamp(self.min_delay, self.max_delay)
    }

    /// Static target interval `1000 / target_fps` ms, within bounds.
    pub fn initial_delay(&self) -> Duration {
        if self.target_fps == 0 {
            return self.max_delay;
        }
        self.clamp_delay(Duration::from_secs(1) / self.target_fps)
    }

    /// Next delay for a cycle that took `processing`.
    pub fn adapted_delay(&self, processing: Duration) -> Duration {
        let padded = processing
            .checked_mul(6)
            .map(|d| d / 5)
            .unwrap_or(self.max_delay);
        self.clamp_delay(padded)
    }
}

/// Asked once a detector call returns, before its result is used.
pub trait CycleGate {
    /// False when the session left `Active` while the call was in flight.
    fn still_active(&mut self) -> bool;
}

/// Gate for callers that run the scheduler without a session.
#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysActive;

impl CycleGate for AlwaysActive {
    fn still_active(&mut self) -> bool {
        true
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum CycleOutcome {
    /// Minimum interval not yet elapsed.
    Skipped { retry_in: Duration },
    /// Source not ready; nothing was captured.
    Deferred { retry_in: Duration },
    Completed {
        detections: usize,
        snapshot: Option<Snapshot>,
        retry_in: Duration,
    },
    /// Detector raised an error; fallback delay applied.
    Failed { retry_in: Duration },
    /// Session left `Active` during the call; result dropped.
    Discarded,
    /// Scheduler is not running.
    Stopped,
}

impl CycleOutcome {
    /// When the next tick should fire, if at all.
    pub fn retry_in(&self) -> Option<Duration> {
        match self {
            CycleOutcome::Skipped { retry_in }
            | CycleOutcome::Deferred { retry_in }
            | CycleOutcome::Completed { retry_in, .. }
            | CycleOutcome::Failed { retry_in } => Some(*retry_in),
            CycleOutcome::Discarded | CycleOutcome::Stopped => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub skipped: u64,
    pub deferred: u64,
    pub completed: u64,
    pub failed: u64,
    pub discarded: u64,
}

pub struct AdaptiveScheduler {
    config: SchedulerConfig,
    clock: Arc<dyn Clock>,
    source: Box<dyn VideoSource>,
    detector: Box<dyn DetectorBackend>,
    renderer: Box<dyn Renderer>,
    telemetry: Box<dyn TelemetrySink>,
    working: WorkingFrame,
    metrics: MetricsAggregator,
    delay: Duration,
    last_accepted: Option<Instant>,
    running: bool,
    warmed_up: bool,
    stats: SchedulerStats,
}

impl AdaptiveScheduler {
    pub fn new(
        config: SchedulerConfig,
        source: Box<dyn VideoSource>,
        detector: Box<dyn DetectorBackend>,
        clock: Arc<dyn Clock>,
    ) -> OverlayResult<Self> {
        config.working_size.ensure_non_zero()?;
        Ok(Self {
            working: WorkingFrame::new(config.working_size),
            metrics: MetricsAggregator::new(config.window),
            delay: config.initial_delay(),
            config,
            clock,
            source,
            detector,
            renderer: Box::new(LogRenderer),
            telemetry: Box::new(LogTelemetry::default()),
            last_accepted: None,
            running: false,
            warmed_up: false,
            stats: SchedulerStats::default(),
        })
    }

    pub fn with_renderer(mut self, renderer: Box<dyn Renderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Box<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Permit cycles. The delay restarts from the static target interval.
    pub fn start(&mut self) {
        if !self.warmed_up {
            if let Err(e) = self.detector.warm_up() {
                log::warn!("detector {} warm-up failed: {:#}", self.detector.name(), e);
            }
            self.warmed_up = true;
        }
        self.running = true;
        self.delay = self.config.initial_delay();
        self.last_accepted = None;
        log::info!(
            "scheduler started: backend={} working={} initial_delay={}ms",
            self.detector.name(),
            self.config.working_size,
            self.delay.as_millis()
        );
    }

    pub fn stop(&mut self) {
        if self.running {
            log::info!("scheduler stopped: {:?}", self.stats);
        }
        self.running = false;
    }

    /// Stop and free the working buffer.
    pub fn release(&mut self) {
        self.stop();
        self.working.release();
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn adaptive_delay(&self) -> Duration {
        self.delay
    }

    pub fn metrics(&self) -> &MetricsAggregator {
        &self.metrics
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn working_frame(&self) -> &WorkingFrame {
        &self.working
    }

    pub fn run_cycle(&mut self, gate: &mut dyn CycleGate) -> CycleOutcome {
        if !self.running {
            return CycleOutcome::Stopped;
        }

        let now = self.clock.now();
        if let Some(last) = self.last_accepted {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.delay {
                self.stats.skipped += 1;
                return CycleOutcome::Skipped {
                    retry_in: self.delay - elapsed,
                };
            }
        }

        if !self.source.is_ready() {
            self.stats.deferred += 1;
            log::debug!("{}", OverlayError::SourceNotReady);
            return CycleOutcome::Deferred {
                retry_in: self.delay,
            };
        }

        let display = self.source.natural_dimensions();
        let captured = match self.source.current_frame() {
            Ok(pixels) => self.working.fill_from(pixels, display),
            Err(e) => Err(e),
        };
        if let Err(e) = captured {
            self.stats.deferred += 1;
            log::warn!("frame capture failed, deferring: {:#}", e);
            return CycleOutcome::Deferred {
                retry_in: self.delay,
            };
        }

        self.last_accepted = Some(now);
        let mut job = FrameJob::submit(self.clock.now());
        let result = self.working.run_detector(self.detector.as_mut());
        job.mark_inferred(self.clock.now());

        if !gate.still_active() {
            self.stats.discarded += 1;
            log::debug!("session left active during detection; result dropped");
            return CycleOutcome::Discarded;
        }

        let raw = match result {
            Ok(raw) => raw,
            Err(e) => return self.fail(OverlayError::DetectionFailure(format!("{:#}", e))),
        };

        let overlays = match reproject_all(&raw, self.working.size(), display) {
            Ok(overlays) => overlays,
            Err(e) => return self.fail(e),
        };
        self.renderer.render(&overlays);
        job.complete(self.clock.now());

        let snapshot = match self.metrics.record_job(&job) {
            Ok(snapshot) => {
                self.telemetry.publish(&snapshot);
                Some(snapshot)
            }
            Err(e) => {
                log::warn!("metrics sample rejected: {}", e);
                None
            }
        };

        self.delay = self.config.adapted_delay(job.processing_time());
        self.stats.completed += 1;

        CycleOutcome::Completed {
            detections: overlays.len(),
            snapshot,
            retry_in: self.delay,
        }
    }

    fn fail(&mut self, error: OverlayError) -> CycleOutcome {
        self.stats.failed += 1;
        self.delay = self.config.fallback_delay;
        log::warn!(
            "{} (backend={}); retrying in {}ms",
            error,
            self.detector.name(),
            self.delay.as_millis()
        );
        CycleOutcome::Failed {
            retry_in: self.delay,
        }
    }
}
