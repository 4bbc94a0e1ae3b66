//! Video Frame Types
//!
//! Frames handed over by the capture layer and the normalized geometry
//! used to describe regions inside them:
//! - RGB frame buffer with capture metadata
//! - Normalized bounding boxes in [0, 1]²
//! - Pixel-space projection and cropping

pub mod frame;
pub mod geometry;

pub use frame::VideoFrame;
pub use geometry::{BoundingBox, PixelRect};

use thiserror::Error;

/// Geometry error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("Bounding box must have positive size, got {width}x{height}")]
    EmptyBox { width: f32, height: f32 },

    #[error("Bounding box ({x}, {y}, {width}, {height}) leaves the unit square")]
    OutOfBounds {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },

    #[error("Frame has no pixels ({width}x{height})")]
    EmptyFrame { width: u32, height: u32 },
}
