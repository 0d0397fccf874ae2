//! Coordinate re-projection from the working frame to the display surface.
//!
//! Detection runs on a (possibly downscaled) working frame; overlays are drawn on
//! the full-resolution display surface. Each axis is scaled independently, so a
//! working frame with a different aspect ratio than the display stretches boxes.
//! That stretch is the expected output, not something to correct here.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::detect::RawDetection;
use crate::error::{OverlayError, OverlayResult};

/// Pixel dimensions of a frame or surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Parse a `WIDTHxHEIGHT` string such as `320x240`.
    pub fn parse(value: &str) -> Result<Self> {
        let (w, h) = value
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| anyhow!("dimensions must look like WIDTHxHEIGHT, got '{}'", value))?;
        let width: u32 = w
            .trim()
            .parse()
            .map_err(|_| anyhow!("invalid width in '{}'", value))?;
        let height: u32 = h
            .trim()
            .parse()
            .map_err(|_| anyhow!("invalid height in '{}'", value))?;
        Ok(Self { width, height })
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn ensure_non_zero(&self) -> OverlayResult<()> {
        if self.is_empty() {
            return Err(OverlayError::InvalidDimension {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }

    /// Number of pixels (width × height).
    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Axis-aligned box as left/top corner plus width/height, in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Edge form in `[0, 1]` relative to `size`.
    pub fn normalized(&self, size: Dimensions) -> OverlayResult<NormalizedBox> {
        size.ensure_non_zero()?;
        let w = size.width as f32;
        let h = size.height as f32;
        Ok(NormalizedBox {
            xmin: self.x / w,
            ymin: self.y / h,
            xmax: (self.x + self.width) / w,
            ymax: (self.y + self.height) / h,
        })
    }
}

/// Box expressed as relative edges. Values outside `[0, 1]` are kept as-is.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBox {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
}

impl NormalizedBox {
    pub fn to_pixels(&self, size: Dimensions) -> BoundingBox {
        let w = size.width as f32;
        let h = size.height as f32;
        BoundingBox {
            x: self.xmin * w,
            y: self.ymin * h,
            width: (self.xmax - self.xmin) * w,
            height: (self.ymax - self.ymin) * h,
        }
    }
}

/// A detection whose box has been scaled into display coordinates.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReprojectedDetection {
    pub label: String,
    pub score: f32,
    pub bbox: BoundingBox,
}

impl ReprojectedDetection {
    /// Overlay caption, e.g. `person (92%)`.
    pub fn caption(&self) -> String {
        format!("{} ({}%)", self.label, (self.score * 100.0).round() as i32)
    }
}

/// Scale `bbox` from `working` pixels to `display` pixels, per axis.
pub fn reproject(
    bbox: BoundingBox,
    working: Dimensions,
    display: Dimensions,
) -> OverlayResult<BoundingBox> {
    working.ensure_non_zero()?;
    let scale_x = display.width as f32 / working.width as f32;
    let scale_y = display.height as f32 / working.height as f32;
    Ok(BoundingBox {
        x: bbox.x * scale_x,
        y: bbox.y * scale_y,
        width: bbox.width * scale_x,
        height: bbox.height * scale_y,
    })
}

pub fn reproject_detection(
    detection: &RawDetection,
    working: Dimensions,
    display: Dimensions,
) -> OverlayResult<ReprojectedDetection> {
    Ok(ReprojectedDetection {
        label: detection.label.clone(),
        score: detection.score,
        bbox: reproject(detection.bbox, working, display)?,
    })
}

/// Re-project every detection, keeping the detector's order.
pub fn reproject_all(
    detections: &[RawDetection],
    working: Dimensions,
    display: Dimensions,
) -> OverlayResult<Vec<ReprojectedDetection>> {
    detections
        .iter()
        .map(|d| reproject_detection(d, working, display))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-3;

    fn assert_box_close(a: BoundingBox, b: BoundingBox) {
        assert!((a.x - b.x).abs() < EPS, "x: {} vs {}", a.x, b.x);
        assert!((a.y - b.y).abs() < EPS, "y: {} vs {}", a.y, b.y);
        assert!((a.width - b.width).abs() < EPS, "w: {} vs {}", a.width, b.width);
        assert!((a.height - b.height).abs() < EPS, "h: {} vs {}", a.height, b.height);
    }

    #[test]
    fn doubles_box_from_qvga_to_vga() {
        let out = reproject(
            BoundingBox::new(10.0, 10.0, 50.0, 80.0),
            Dimensions::new(320, 240),
            Dimensions::new(640, 480),
        )
        .unwrap();
        assert_eq!(out, BoundingBox::new(20.0, 20.0, 100.0, 160.0));
    }

    #[test]
    fn zero_working_dimension_is_rejected() {
        let bbox = BoundingBox::new(1.0, 2.0, 3.0, 4.0);
        for h in [0, 1, 240, u32::MAX] {
            let err = reproject(bbox, Dimensions::new(0, h), Dimensions::new(640, 480))
                .unwrap_err();
            assert!(matches!(err, OverlayError::InvalidDimension { width: 0, .. }));
        }
        let err = reproject(bbox, Dimensions::new(320, 0), Dimensions::new(640, 480)).unwrap_err();
        assert_eq!(
            err,
            OverlayError::InvalidDimension {
                width: 320,
                height: 0
            }
        );
    }

    #[test]
    fn axes_scale_independently() {
        // 4:3 working frame onto a 16:9 display stretches horizontally.
        let out = reproject(
            BoundingBox::new(40.0, 30.0, 40.0, 40.0),
            Dimensions::new(320, 240),
            Dimensions::new(1280, 720),
        )
        .unwrap();
        assert_box_close(out, BoundingBox::new(160.0, 90.0, 160.0, 120.0));
        assert!((out.width / out.height - 1.0).abs() > 0.1);
    }

    #[test]
    fn reciprocal_scale_restores_box() {
        let working = Dimensions::new(300, 224);
        let display = Dimensions::new(1920, 1080);
        let boxes = [
            BoundingBox::new(0.0, 0.0, 300.0, 224.0),
            BoundingBox::new(12.5, 7.25, 33.0, 91.0),
            BoundingBox::new(299.0, 223.0, 1.0, 1.0),
        ];
        for bbox in boxes {
            let there = reproject(bbox, working, display).unwrap();
            let back = reproject(there, display, working).unwrap();
            assert_box_close(back, bbox);
        }
    }

    #[test]
    fn reprojection_is_linear_per_axis() {
        let working = Dimensions::new(320, 240);
        let display = Dimensions::new(800, 600);
        let a = BoundingBox::new(10.0, 20.0, 30.0, 40.0);
        let b = BoundingBox::new(5.0, 1.0, 2.0, 8.0);
        let sum = BoundingBox::new(a.x + b.x, a.y + b.y, a.width + b.width, a.height + b.height);

        let ra = reproject(a, working, display).unwrap();
        let rb = reproject(b, working, display).unwrap();
        let rsum = reproject(sum, working, display).unwrap();
        assert_box_close(
            rsum,
            BoundingBox::new(ra.x + rb.x, ra.y + rb.y, ra.width + rb.width, ra.height + rb.height),
        );
    }

    #[test]
    fn normalized_round_trip_matches_direct_reprojection() {
        let working = Dimensions::new(320, 240);
        let display = Dimensions::new(1280, 720);
        let bbox = BoundingBox::new(64.0, 48.0, 32.0, 24.0);

        let via_edges = bbox.normalized(working).unwrap().to_pixels(display);
        let direct = reproject(bbox, working, display).unwrap();
        assert_box_close(via_edges, direct);
    }

    #[test]
    fn reproject_all_preserves_order() {
        let detections = vec![
            RawDetection::new("person", 0.9, BoundingBox::new(0.0, 0.0, 10.0, 10.0)),
            RawDetection::new("dog", 0.4, BoundingBox::new(5.0, 5.0, 1.0, 1.0)),
            RawDetection::new("cup", 0.7, BoundingBox::new(2.0, 3.0, 4.0, 5.0)),
        ];
        let out = reproject_all(&detections, Dimensions::new(10, 10), Dimensions::new(20, 20))
            .unwrap();
        let labels: Vec<_> = out.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, vec!["person", "dog", "cup"]);
        assert_eq!(out[1].bbox, BoundingBox::new(10.0, 10.0, 2.0, 2.0));
    }

    #[test]
    fn caption_rounds_score_to_percent() {
        let d = ReprojectedDetection {
            label: "person".to_string(),
            score: 0.916,
            bbox: BoundingBox::default(),
        };
        assert_eq!(d.caption(), "person (92%)");
    }

    #[test]
    fn parses_dimensions() {
        assert_eq!(Dimensions::parse("320x240").unwrap(), Dimensions::new(320, 240));
        assert_eq!(Dimensions::parse(" 1280 X 720 ").unwrap(), Dimensions::new(1280, 720));
        assert!(Dimensions::parse("320").is_err());
        assert!(Dimensions::parse("axb").is_err());
    }
}
