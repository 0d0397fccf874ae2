use anyhow::{anyhow, Result};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::RawDetection;
use crate::frame::BYTES_PER_PIXEL;
use crate::geometry::BoundingBox;

/// Per-pixel luma change that counts as motion.
const DEFAULT_THRESHOLD: u8 = 24;
/// Fraction of changed pixels below which a frame is treated as static.
const DEFAULT_MIN_FRACTION: f32 = 0.002;

/// CPU backend for motion detection.
///
/// Differences the luma of consecutive working frames and reports one `motion`
/// box around every changed pixel. The score is the changed share of the box.
pub struct MotionBackend {
    previous: Vec<u8>,
    previous_size: (u32, u32),
    threshold: u8,
    min_fraction: f32,
}

impl MotionBackend {
    pub fn new() -> Self {
        Self {
            previous: Vec::new(),
            previous_size: (0, 0),
            threshold: DEFAULT_THRESHOLD,
            min_fraction: DEFAULT_MIN_FRACTION,
        }
    }
}

impl Default for MotionBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn luma(rgb: &[u8]) -> u8 {
    ((rgb[0] as u32 * 77 + rgb[1] as u32 * 150 + rgb[2] as u32 * 29) >> 8) as u8
}

impl DetectorBackend for MotionBackend {
    fn name(&self) -> &'static str {
        "motion"
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<RawDetection>> {
        let area = width as usize * height as usize;
        if pixels.len() < area * BYTES_PER_PIXEL {
            return Err(anyhow!(
                "frame has {} bytes, expected {} for {}x{}",
                pixels.len(),
                area * BYTES_PER_PIXEL,
                width,
                height
            ));
        }

        let comparable = self.previous_size == (width, height) && self.previous.len() == area;
        if !comparable {
            self.previous.clear();
            self.previous.resize(area, 0);
            self.previous_size = (width, height);
        }

        let mut changed = 0usize;
        let (mut min_x, mut min_y) = (u32::MAX, u32::MAX);
        let (mut max_x, mut max_y) = (0u32, 0u32);

        for (i, rgb) in pixels.chunks_exact(BYTES_PER_PIXEL).take(area).enumerate() {
            let y = luma(rgb);
            let prev = std::mem::replace(&mut self.previous[i], y);
            if comparable && y.abs_diff(prev) > self.threshold {
                let px = (i % width as usize) as u32;
                let py = (i / width as usize) as u32;
                changed += 1;
                min_x = min_x.min(px);
                min_y = min_y.min(py);
                max_x = max_x.max(px);
                max_y = max_y.max(py);
            }
        }

        if changed == 0 || (changed as f32) < area as f32 * self.min_fraction {
            return Ok(Vec::new());
        }

        let bbox = BoundingBox::new(
            min_x as f32,
            min_y as f32,
            (max_x - min_x + 1) as f32,
            (max_y - min_y + 1) as f32,
        );
        let score = changed as f32 / (bbox.width * bbox.height);
        Ok(vec![RawDetection::new("motion", score, bbox)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_with_square(width: u32, height: u32, at: (u32, u32), side: u32) -> Vec<u8> {
        let mut pixels = vec![0u8; (width * height) as usize * BYTES_PER_PIXEL];
        for y in at.1..(at.1 + side) {
            for x in at.0..(at.0 + side) {
                let i = (y * width + x) as usize * BYTES_PER_PIXEL;
                pixels[i..i + BYTES_PER_PIXEL].copy_from_slice(&[255, 255, 255]);
            }
        }
        pixels
    }

    #[test]
    fn motion_backend_boxes_changed_region() {
        let mut backend = MotionBackend::default();

        let r1 = backend.detect(&frame_with_square(32, 24, (2, 2), 4), 32, 24).unwrap();
        assert!(r1.is_empty(), "first frame has nothing to compare against");

        let r2 = backend.detect(&frame_with_square(32, 24, (10, 8), 4), 32, 24).unwrap();
        assert_eq!(r2.len(), 1);
        assert_eq!(r2[0].label, "motion");
        // Union of the square that left and the square that arrived.
        assert_eq!(r2[0].bbox, BoundingBox::new(2.0, 2.0, 12.0, 10.0));
        assert!(r2[0].score > 0.0 && r2[0].score <= 1.0);

        let r3 = backend.detect(&frame_with_square(32, 24, (10, 8), 4), 32, 24).unwrap();
        assert!(r3.is_empty());
    }

    #[test]
    fn size_change_resets_reference() {
        let mut backend = MotionBackend::default();
        backend.detect(&frame_with_square(32, 24, (0, 0), 4), 32, 24).unwrap();
        let out = backend.detect(&frame_with_square(16, 12, (8, 8), 4), 16, 12).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn short_frame_is_an_error() {
        let mut backend = MotionBackend::default();
        assert!(backend.detect(&[0u8; 5], 4, 4).is_err());
    }
}
