//! Normalized region geometry

use serde::{Deserialize, Serialize};
use crate::GeometryError;

/// Slack allowed on the unit-square containment check (float noise from models)
const CONTAINMENT_EPSILON: f32 = 1e-4;

/// Rectangle normalized to the frame bounds.
///
/// `x`/`y` locate the top-left corner. Width and height are strictly
/// positive and the whole rectangle lies inside [0, 1]².
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
}

/// Rectangle in pixel coordinates of a concrete frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    /// Create a validated bounding box
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Result<Self, GeometryError> {
        if !(width > 0.0 && height > 0.0) {
            return Err(GeometryError::EmptyBox { width, height });
        }

        let inside = x >= -CONTAINMENT_EPSILON
            && y >= -CONTAINMENT_EPSILON
            && x + width <= 1.0 + CONTAINMENT_EPSILON
            && y + height <= 1.0 + CONTAINMENT_EPSILON;
        if !inside {
            return Err(GeometryError::OutOfBounds { x, y, width, height });
        }

        Ok(Self { x, y, width, height })
    }

    pub fn x(&self) -> f32 {
        self.x
    }

    pub fn y(&self) -> f32 {
        self.y
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    /// Horizontal center
    pub fn center_x(&self) -> f32 {
        self.x + self.width / 2.0
    }

    /// Vertical center
    pub fn center_y(&self) -> f32 {
        self.y + self.height / 2.0
    }

    /// Width/height ratio measured in pixels of a `frame_width` x `frame_height` frame.
    ///
    /// Normalized coordinates stretch non-square frames, so a square sign
    /// only has ratio 1.0 in pixel space.
    pub fn pixel_aspect_ratio(&self, frame_width: u32, frame_height: u32) -> f32 {
        let width_px = self.width * frame_width as f32;
        let height_px = self.height * frame_height as f32;
        width_px / height_px
    }

    /// Check whether the box has left the central safe zone.
    ///
    /// The zone shrinks by `margin` on every side; a box escapes as soon as
    /// its center is farther from 0.5 than half of what is left of the frame
    /// once the margin and the box's own half extent are taken off.
    pub fn escapes(&self, margin: f32) -> bool {
        let limit_x = 0.5 - margin - self.width / 2.0;
        let limit_y = 0.5 - margin - self.height / 2.0;
        (self.center_x() - 0.5).abs() > limit_x || (self.center_y() - 0.5).abs() > limit_y
    }

    /// Project onto a frame of the given pixel size.
    ///
    /// The result is clamped to the frame and is never smaller than one pixel.
    pub fn to_pixel_rect(&self, frame_width: u32, frame_height: u32) -> Result<PixelRect, GeometryError> {
        if frame_width == 0 || frame_height == 0 {
            return Err(GeometryError::EmptyFrame {
                width: frame_width,
                height: frame_height,
            });
        }

        let fw = frame_width as f32;
        let fh = frame_height as f32;

        let x = ((self.x * fw).round() as u32).min(frame_width - 1);
        let y = ((self.y * fh).round() as u32).min(frame_height - 1);
        let width = ((self.width * fw).round() as u32).clamp(1, frame_width - x);
        let height = ((self.height * fh).round() as u32).clamp(1, frame_height - y);

        Ok(PixelRect { x, y, width, height })
    }
}
