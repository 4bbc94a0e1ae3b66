//! Perception results

use serde::{Deserialize, Serialize};
use video_frame::BoundingBox;

/// Region reported by the detector or the tracker
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObjectObservation {
    /// Normalized region
    pub bounding_box: BoundingBox,

    /// Confidence (0-1)
    pub confidence: f32,
}

impl ObjectObservation {
    pub fn new(bounding_box: BoundingBox, confidence: f32) -> Self {
        Self {
            bounding_box,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// One reading proposed by the text recognizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextCandidate {
    /// Recognized characters
    pub text: String,

    /// Confidence (0-1)
    pub confidence: f32,
}

impl TextCandidate {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}
