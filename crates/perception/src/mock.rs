//! Model-free capabilities
//!
//! Replays a speed-limit sign drifting from the middle of the frame toward
//! the right edge, the way a roadside sign moves while driving past it.

use std::sync::atomic::{AtomicU32, Ordering};

use image::GrayImage;
use tracing::debug;
use video_frame::{BoundingBox, VideoFrame};

use crate::capability::{Detector, Recognizer, TrackSequence, Tracker};
use crate::{ObjectObservation, PerceptionError, TextCandidate};

/// Detector reporting one square sign plus a weak decoy
pub struct MockDetector {
    /// Sign height (normalized)
    pub sign_height: f32,
    /// Confidence of the sign
    pub confidence: f32,
}

impl Default for MockDetector {
    fn default() -> Self {
        Self {
            sign_height: 0.12,
            confidence: 0.92,
        }
    }
}

impl Detector for MockDetector {
    fn detect(&self, frame: &VideoFrame) -> Result<Vec<ObjectObservation>, PerceptionError> {
        if frame.width == 0 || frame.height == 0 {
            return Err(PerceptionError::InvalidFrame);
        }

        // Square in pixels, so narrower than tall on a landscape frame
        let height = self.sign_height;
        let width = height * frame.height as f32 / frame.width as f32;
        let sign = BoundingBox::new(0.5 - width / 2.0, 0.4, width, height)
            .map_err(|e| PerceptionError::Inference(e.to_string()))?;
        let decoy = BoundingBox::new(0.1, 0.7, width, height)
            .map_err(|e| PerceptionError::Inference(e.to_string()))?;

        Ok(vec![
            ObjectObservation::new(decoy, 0.35),
            ObjectObservation::new(sign, self.confidence),
        ])
    }
}

/// Tracker whose sessions push the reference a little to the right on every call
pub struct MockTracker {
    /// Horizontal drift per tracked frame (normalized)
    pub drift: f32,
    /// Reported confidence
    pub confidence: f32,
}

impl Default for MockTracker {
    fn default() -> Self {
        Self {
            drift: 0.01,
            confidence: 0.9,
        }
    }
}

impl Tracker for MockTracker {
    fn begin_session(&self) -> Result<Box<dyn TrackSequence>, PerceptionError> {
        Ok(Box::new(MockSequence {
            drift: self.drift,
            confidence: self.confidence,
            steps: 0,
        }))
    }
}

struct MockSequence {
    drift: f32,
    confidence: f32,
    steps: u32,
}

impl TrackSequence for MockSequence {
    fn track(
        &mut self,
        _frame: &VideoFrame,
        reference: &ObjectObservation,
    ) -> Result<Vec<ObjectObservation>, PerceptionError> {
        self.steps += 1;
        let bbox = reference.bounding_box;
        let x = (bbox.x() + self.drift).min(1.0 - bbox.width());
        let moved = BoundingBox::new(x, bbox.y(), bbox.width(), bbox.height())
            .map_err(|e| PerceptionError::Inference(e.to_string()))?;

        debug!("Mock track step {} -> x={:.3}", self.steps, x);
        Ok(vec![ObjectObservation::new(moved, self.confidence)])
    }
}

/// Recognizer returning a fixed reading, after an optional number of misreads
pub struct MockRecognizer {
    text: String,
    confidence: f32,
    misreads: AtomicU32,
}

impl MockRecognizer {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
            misreads: AtomicU32::new(0),
        }
    }

    /// Answer the first `count` calls with an unreadable low-confidence result
    pub fn with_misreads(self, count: u32) -> Self {
        self.misreads.store(count, Ordering::Relaxed);
        self
    }
}

impl Default for MockRecognizer {
    fn default() -> Self {
        // "O" for "0" is the most common confusion on real signs
        Self::new("6O", 0.82).with_misreads(2)
    }
}

impl Recognizer for MockRecognizer {
    fn recognize(&self, image: &GrayImage) -> Result<Vec<TextCandidate>, PerceptionError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(PerceptionError::InvalidFrame);
        }

        let misread = self
            .misreads
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok();
        if misread {
            return Ok(vec![TextCandidate::new("?", 0.3)]);
        }

        Ok(vec![TextCandidate::new(self.text.clone(), self.confidence)])
    }
}
