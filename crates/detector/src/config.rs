//! Detector configuration

use serde::{Deserialize, Serialize};

/// Detector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Minimum detection confidence
    pub detection_confidence: f32,

    /// Minimum sign height (normalized to frame height)
    pub minimum_height: f32,

    /// Allowed deviation of the pixel aspect ratio from 1:1
    pub max_aspect_ratio_deviation: f32,

    /// Minimum tracking confidence
    pub tracking_confidence: f32,

    /// Border band (normalized) the tracked sign must not enter
    pub escape_margin: f32,

    /// Minimum text recognition confidence
    pub recognition_confidence: f32,

    /// Recognition rounds per tracking session, including the first one
    pub max_recognition_attempts: u32,

    /// Frames after which an unanswered perception call is given up on
    pub call_timeout_frames: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            detection_confidence: 0.6,
            minimum_height: 0.04,
            max_aspect_ratio_deviation: 0.2,
            tracking_confidence: 0.6,
            escape_margin: 0.02,
            recognition_confidence: 0.6,
            max_recognition_attempts: 10,
            call_timeout_frames: 90,
        }
    }
}
