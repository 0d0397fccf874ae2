use serde::{Deserialize, Serialize};

use crate::geometry::BoundingBox;

/// One object reported by a detector, in working-frame pixels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub label: String,
    /// Confidence in `[0, 1]`.
    pub score: f32,
    pub bbox: BoundingBox,
}

impl RawDetection {
    pub fn new(label: impl Into<String>, score: f32, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            score: score.clamp(0.0, 1.0),
            bbox,
        }
    }
}
