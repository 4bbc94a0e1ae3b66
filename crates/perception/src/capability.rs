//! Capability traits implemented by the vision models

use std::sync::Arc;

use image::GrayImage;
use video_frame::VideoFrame;

use crate::mock::{MockDetector, MockRecognizer, MockTracker};
use crate::{ObjectObservation, PerceptionError, TextCandidate};

/// Sign detector (full-frame search)
pub trait Detector: Send + Sync {
    /// Find candidate sign regions in a frame
    fn detect(&self, frame: &VideoFrame) -> Result<Vec<ObjectObservation>, PerceptionError>;
}

/// Tracker factory. Each tracking session gets its own sequence context.
pub trait Tracker: Send + Sync {
    /// Create the per-session sequence context
    fn begin_session(&self) -> Result<Box<dyn TrackSequence>, PerceptionError>;
}

/// Stateful tracking context reused for the lifetime of one session
pub trait TrackSequence: Send {
    /// Propagate `reference` into `frame`
    fn track(
        &mut self,
        frame: &VideoFrame,
        reference: &ObjectObservation,
    ) -> Result<Vec<ObjectObservation>, PerceptionError>;
}

/// Text recognizer working on a preprocessed crop
pub trait Recognizer: Send + Sync {
    /// Read text candidates, best first
    fn recognize(&self, image: &GrayImage) -> Result<Vec<TextCandidate>, PerceptionError>;
}

/// The three capabilities a gateway dispatches to
#[derive(Clone)]
pub struct Capabilities {
    pub detector: Arc<dyn Detector>,
    pub tracker: Arc<dyn Tracker>,
    pub recognizer: Arc<dyn Recognizer>,
}

impl Capabilities {
    pub fn new(
        detector: Arc<dyn Detector>,
        tracker: Arc<dyn Tracker>,
        recognizer: Arc<dyn Recognizer>,
    ) -> Self {
        Self {
            detector,
            tracker,
            recognizer,
        }
    }

    /// Model-free capabilities replaying a sign passing by
    pub fn mock() -> Self {
        Self::new(
            Arc::new(MockDetector::default()),
            Arc::new(MockTracker::default()),
            Arc::new(MockRecognizer::default()),
        )
    }
}
