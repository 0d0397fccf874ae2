use anyhow::Result;
use std::time::Duration;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::RawDetection;
use crate::geometry::{Dimensions, NormalizedBox};

/// Stub backend for testing and demos.
///
/// Reports a fixed set of relative boxes, scaled to whatever working frame it is
/// given, after an optional simulated inference delay.
pub struct StubBackend {
    objects: Vec<(String, f32, NormalizedBox)>,
    latency: Duration,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            objects: vec![(
                "person".to_string(),
                0.92,
                NormalizedBox {
                    xmin: 0.25,
                    ymin: 0.2,
                    xmax: 0.55,
                    ymax: 0.9,
                },
            )],
            latency: Duration::ZERO,
        }
    }

    /// Replace the reported objects.
    pub fn with_objects(mut self, objects: Vec<(String, f32, NormalizedBox)>) -> Self {
        self.objects = objects;
        self
    }

    /// Block each `detect` call for `latency` to imitate model cost.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _pixels: &[u8], width: u32, height: u32) -> Result<Vec<RawDetection>> {
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        let size = Dimensions::new(width, height);
        Ok(self
            .objects
            .iter()
            .map(|(label, score, rel)| {
                RawDetection::new(label.clone(), *score, rel.to_pixels(size))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoundingBox;

    #[test]
    fn stub_scales_objects_to_frame() {
        let mut backend = StubBackend::new().with_objects(vec![(
            "cup".to_string(),
            0.5,
            NormalizedBox {
                xmin: 0.5,
                ymin: 0.5,
                xmax: 1.0,
                ymax: 1.0,
            },
        )]);
        let out = backend.detect(&[], 320, 240).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].label, "cup");
        assert_eq!(out[0].bbox, BoundingBox::new(160.0, 120.0, 160.0, 120.0));
    }
}
