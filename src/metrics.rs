//! Live telemetry: throughput, latency, and windowed tail latency.
//!
//! The aggregator keeps a bounded FIFO of the most recent latency samples. The
//! tail percentile is computed over that window only, so it follows recent
//! behaviour rather than the whole session history.

use serde::Serialize;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::error::{OverlayError, OverlayResult};
use crate::frame::FrameJob;

/// Default number of latency samples retained (20 seconds at 15 fps).
pub const DEFAULT_WINDOW: usize = 300;

/// Telemetry published once per recorded frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Snapshot {
    /// Frames per second since the first recorded frame, one decimal place.
    pub fps: f64,
    /// Latency of the frame just recorded.
    pub latency_ms: u64,
    /// 95th percentile over the current window.
    pub p95_latency_ms: u64,
    /// Time spent inside the detector, when known.
    pub inference_ms: Option<u64>,
    pub frames_processed: u64,
}

/// Bounded FIFO of latency samples. Oldest samples are evicted first.
#[derive(Clone, Debug)]
pub struct LatencyWindow {
    samples: VecDeque<Duration>,
    capacity: usize,
}

impl LatencyWindow {
    /// Create a window holding at most `capacity` samples (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push a sample, returning the evicted sample when the window was full.
    pub fn push(&mut self, sample: Duration) -> Option<Duration> {
        let evicted = if self.samples.len() >= self.capacity {
            self.samples.pop_front()
        } else {
            None
        };
        self.samples.push_back(sample);
        evicted
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Duration> {
        self.samples.iter()
    }

    /// Sample at sorted rank `floor(0.95 * len)`.
    pub fn p95(&self) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }
        let mut sorted: Vec<Duration> = self.samples.iter().copied().collect();
        sorted.sort_unstable();
        let rank = sorted.len() * 95 / 100;
        sorted.get(rank).copied()
    }
}

#[derive(Debug)]
pub struct MetricsAggregator {
    window: LatencyWindow,
    frames_processed: u64,
    session_start: Option<Instant>,
}

impl MetricsAggregator {
    pub fn new(window: usize) -> Self {
        Self {
            window: LatencyWindow::new(window),
            frames_processed: 0,
            session_start: None,
        }
    }

    /// Record one completed frame.
    ///
    /// A completion earlier than its capture yields `OutOfOrderTimestamp` and
    /// leaves the aggregator untouched.
    pub fn record(
        &mut self,
        capture_ts: Instant,
        completion_ts: Instant,
    ) -> OverlayResult<Snapshot> {
        let latency = match completion_ts.checked_duration_since(capture_ts) {
            Some(latency) => latency,
            None => {
                return Err(OverlayError::OutOfOrderTimestamp {
                    behind: capture_ts.duration_since(completion_ts),
                })
            }
        };

        let start = *self.session_start.get_or_insert(capture_ts);
        self.window.push(latency);
        self.frames_processed += 1;

        let elapsed = completion_ts.saturating_duration_since(start).as_secs_f64();
        let fps = if elapsed > 0.0 {
            round_one_decimal(self.frames_processed as f64 / elapsed)
        } else {
            0.0
        };
        let p95 = self.window.p95().unwrap_or(latency);

        Ok(Snapshot {
            fps,
            latency_ms: round_ms(latency),
            p95_latency_ms: round_ms(p95),
            inference_ms: None,
            frames_processed: self.frames_processed,
        })
    }

    /// Record a finished job, including the detector's share of its latency.
    pub fn record_job(&mut self, job: &FrameJob) -> OverlayResult<Snapshot> {
        let mut snapshot = self.record(job.submitted_at, job.completion())?;
        snapshot.inference_ms = job.inference_time().map(round_ms);
        Ok(snapshot)
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn window(&self) -> &LatencyWindow {
        &self.window
    }
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

fn round_ms(duration: Duration) -> u64 {
    (duration.as_secs_f64() * 1000.0).round() as u64
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
