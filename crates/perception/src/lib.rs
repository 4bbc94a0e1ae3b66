//! Perception Capabilities
//!
//! Interfaces to the three machine-perception stages the sign reader relies on:
//! - Object detection (find a sign-shaped region in a full frame)
//! - Object tracking (follow that region from frame to frame)
//! - Text recognition (read the characters inside the region)
//!
//! The models themselves live behind the [`Detector`], [`Tracker`] and
//! [`Recognizer`] traits. Calls are issued through a [`PerceptionGateway`]
//! and answered later with a [`Completion`].

pub mod capability;
pub mod gateway;
pub mod mock;
pub mod observation;
pub mod preprocess;

pub use capability::{Capabilities, Detector, Recognizer, TrackSequence, Tracker};
pub use gateway::{CallId, Completion, PerceptionGateway, RecordingGateway, TokioGateway};
pub use observation::{ObjectObservation, TextCandidate};
pub use preprocess::PreprocessConfig;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Perception error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PerceptionError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Invalid frame format")]
    InvalidFrame,

    #[error("Image preprocessing failed: {0}")]
    Preprocessing(String),

    #[error("{capability} call could not be started: {reason}")]
    NotStarted {
        capability: Capability,
        reason: String,
    },
}

/// The perception stage a call belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    Detector,
    Tracker,
    Recognizer,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Detector => "detector",
            Capability::Tracker => "tracker",
            Capability::Recognizer => "recognizer",
        };
        f.write_str(name)
    }
}
