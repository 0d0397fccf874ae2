//! Output collaborators: overlay rendering and telemetry display.
//!
//! Both are push-only. The scheduler never reads anything back from them, and
//! implementations must return promptly since they run inside the cycle.

use std::sync::{Arc, Mutex};

use crate::geometry::ReprojectedDetection;
use crate::metrics::Snapshot;

/// Draws re-projected detections on the display surface.
pub trait Renderer: Send {
    fn render(&mut self, detections: &[ReprojectedDetection]);
}

/// Displays live telemetry.
pub trait TelemetrySink: Send {
    fn publish(&mut self, snapshot: &Snapshot);
}

/// Renderer that logs overlay captions at debug level.
#[derive(Debug, Default)]
pub struct LogRenderer;

impl Renderer for LogRenderer {
    fn render(&mut self, detections: &[ReprojectedDetection]) {
        for d in detections {
            log::debug!(
                "overlay {} at ({:.0},{:.0}) {:.0}x{:.0}",
                d.caption(),
                d.bbox.x,
                d.bbox.y,
                d.bbox.width,
                d.bbox.height
            );
        }
    }
}

/// Telemetry sink that logs every `every`-th snapshot at info level.
#[derive(Debug)]
pub struct LogTelemetry {
    every: u64,
}

impl LogTelemetry {
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
        }
    }
}

impl Default for LogTelemetry {
    fn default() -> Self {
        Self::new(15)
    }
}

impl TelemetrySink for LogTelemetry {
    fn publish(&mut self, snapshot: &Snapshot) {
        if snapshot.frames_processed % self.every != 0 {
            return;
        }
        log::info!(
            "fps={:.1} latency={}ms p95={}ms inference={} frames={}",
            snapshot.fps,
            snapshot.latency_ms,
            snapshot.p95_latency_ms,
            snapshot
                .inference_ms
                .map(|ms| format!("{}ms", ms))
                .unwrap_or_else(|| "-".to_string()),
            snapshot.frames_processed
        );
    }
}

/// Shared in-memory sink. Clones observe the same buffers.
#[derive(Clone, Debug, Default)]
pub struct RecordingSink {
    renders: Arc<Mutex<Vec<Vec<ReprojectedDetection>>>>,
    snapshots: Arc<Mutex<Vec<Snapshot>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn renders(&self) -> Vec<Vec<ReprojectedDetection>> {
        self.renders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn snapshots(&self) -> Vec<Snapshot> {
        self.snapshots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Renderer for RecordingSink {
    fn render(&mut self, detections: &[ReprojectedDetection]) {
        self.renders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(detections.to_vec());
    }
}

impl TelemetrySink for RecordingSink {
    fn publish(&mut self, snapshot: &Snapshot) {
        self.snapshots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(snapshot.clone());
    }
}
