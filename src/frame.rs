//! Working-resolution frame buffer and per-cycle frame jobs.
//!
//! - `WorkingFrame`: the single RGB buffer the scheduler hands to the detector.
//!   It is resampled in place every cycle and never reallocated once sized.
//! - `FrameJob`: timestamps of one detection attempt. Lives for one cycle.

use anyhow::{anyhow, Result};
use std::time::{Duration, Instant};

use crate::detect::{DetectorBackend, RawDetection};
use crate::geometry::Dimensions;

/// Bytes per pixel of every frame crossing the source/detector boundary (RGB8).
pub const BYTES_PER_PIXEL: usize = 3;

/// Scheduler-owned working image.
///
/// Not `Clone`: exactly one working buffer exists per scheduler.
pub struct WorkingFrame {
    data: Vec<u8>,
    size: Dimensions,
}

impl WorkingFrame {
    /// Allocate a buffer for `size`. The allocation is reused across cycles.
    pub fn new(size: Dimensions) -> Self {
        Self {
            data: Vec::with_capacity(size.area() * BYTES_PER_PIXEL),
            size,
        }
    }

    pub fn size(&self) -> Dimensions {
        self.size
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// Resample an RGB8 frame of `source` dimensions into this buffer
    /// (nearest neighbour).
    pub fn fill_from(&mut self, pixels: &[u8], source: Dimensions) -> Result<()> {
        if source.is_empty() || self.size.is_empty() {
            return Err(anyhow!(
                "cannot resample {} frame into {} working frame",
                source,
                self.size
            ));
        }
        let expected = source.area() * BYTES_PER_PIXEL;
        if pixels.len() < expected {
            return Err(anyhow!(
                "source frame has {} bytes, expected {} for {}",
                pixels.len(),
                expected,
                source
            ));
        }

        self.data.resize(self.size.area() * BYTES_PER_PIXEL, 0);

        let (dw, dh) = (self.size.width as usize, self.size.height as usize);
        let (sw, sh) = (source.width as usize, source.height as usize);
        for y in 0..dh {
            let sy = y * sh / dh;
            for x in 0..dw {
                let sx = x * sw / dw;
                let src = (sy * sw + sx) * BYTES_PER_PIXEL;
                let dst = (y * dw + x) * BYTES_PER_PIXEL;
                self.data[dst..dst + BYTES_PER_PIXEL]
                    .copy_from_slice(&pixels[src..src + BYTES_PER_PIXEL]);
            }
        }
        Ok(())
    }

    /// Run a detector over the current contents.
    pub fn run_detector(&self, detector: &mut dyn DetectorBackend) -> Result<Vec<RawDetection>> {
        detector.detect(&self.data, self.size.width, self.size.height)
    }

    /// Free the pixel allocation. The next `fill_from` allocates again.
    pub fn release(&mut self) {
        self.data = Vec::new();
    }

    /// Bytes currently reserved for pixels.
    pub fn memory_bytes(&self) -> usize {
        self.data.capacity()
    }
}

/// Timestamps of one detection attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameJob {
    pub submitted_at: Instant,
    pub inferred_at: Option<Instant>,
    pub completed_at: Option<Instant>,
}

impl FrameJob {
    pub fn submit(at: Instant) -> Self {
        Self {
            submitted_at: at,
            inferred_at: None,
            completed_at: None,
        }
    }

    pub fn mark_inferred(&mut self, at: Instant) {
        self.inferred_at = Some(at);
    }

    pub fn complete(&mut self, at: Instant) {
        self.completed_at = Some(at);
    }

    /// Completion instant, falling back to the latest stamp recorded.
    pub fn completion(&self) -> Instant {
        self.completed_at
            .or(self.inferred_at)
            .unwrap_or(self.submitted_at)
    }

    pub fn inference_time(&self) -> Option<Duration> {
        self.inferred_at
            .map(|at| at.saturating_duration_since(self.submitted_at))
    }

    pub fn processing_time(&self) -> Duration {
        self.completion().saturating_duration_since(self.submitted_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(size: Dimensions) -> Vec<u8> {
        let mut pixels = Vec::with_capacity(size.area() * BYTES_PER_PIXEL);
        for y in 0..size.height {
            for x in 0..size.width {
                pixels.extend_from_slice(&[x as u8, y as u8, 0]);
            }
        }
        pixels
    }

    #[test]
    fn downscales_by_nearest_neighbour() {
        let source = Dimensions::new(4, 4);
        let mut frame = WorkingFrame::new(Dimensions::new(2, 2));
        frame.fill_from(&gradient(source), source).unwrap();
        assert_eq!(
            frame.pixels(),
            &[0, 0, 0, 2, 0, 0, 0, 2, 0, 2, 2, 0][..]
        );
    }

    #[test]
    fn buffer_is_reused_across_fills() {
        let source = Dimensions::new(64, 48);
        let pixels = gradient(source);
        let mut frame = WorkingFrame::new(Dimensions::new(32, 24));
        frame.fill_from(&pixels, source).unwrap();
        let ptr = frame.pixels().as_ptr();
        let capacity = frame.memory_bytes();
        for _ in 0..5 {
            frame.fill_from(&pixels, source).unwrap();
        }
        assert_eq!(frame.pixels().as_ptr(), ptr);
        assert_eq!(frame.memory_bytes(), capacity);
    }

    #[test]
    fn short_source_is_rejected() {
        let mut frame = WorkingFrame::new(Dimensions::new(2, 2));
        assert!(frame.fill_from(&[0u8; 10], Dimensions::new(4, 4)).is_err());
    }

    #[test]
    fn release_frees_pixels() {
        let source = Dimensions::new(8, 8);
        let mut frame = WorkingFrame::new(Dimensions::new(4, 4));
        frame.fill_from(&gradient(source), source).unwrap();
        frame.release();
        assert_eq!(frame.memory_bytes(), 0);
        assert!(frame.pixels().is_empty());
    }

    #[test]
    fn job_times() {
        let base = Instant::now();
        let mut job = FrameJob::submit(base);
        assert_eq!(job.processing_time(), Duration::ZERO);
        job.mark_inferred(base + Duration::from_millis(30));
        job.complete(base + Duration::from_millis(34));
        assert_eq!(job.inference_time(), Some(Duration::from_millis(30)));
        assert_eq!(job.processing_time(), Duration::from_millis(34));
    }
}
