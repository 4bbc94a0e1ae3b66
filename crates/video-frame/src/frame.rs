//! Video frame buffer

use image::RgbImage;
use crate::geometry::{BoundingBox, PixelRect};
use crate::GeometryError;

/// Decoded RGB video frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// RGB pixel data (width * height * 3)
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Capture timestamp (nanoseconds)
    pub timestamp_ns: u64,
    /// Frame sequence number
    pub sequence: u32,
}

impl VideoFrame {
    /// Create a new video frame from raw RGB data
    pub fn new(data: Vec<u8>, width: u32, height: u32, timestamp_ns: u64, sequence: u32) -> Self {
        Self {
            data,
            width,
            height,
            timestamp_ns,
            sequence,
        }
    }

    /// Create a uniformly colored frame
    pub fn filled(width: u32, height: u32, rgb: [u8; 3], timestamp_ns: u64, sequence: u32) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take((width * height * 3) as usize)
            .collect();
        Self::new(data, width, height, timestamp_ns, sequence)
    }

    /// Get pixel at (x, y)
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y * self.width + x) * 3) as usize;
        Some([self.data[idx], self.data[idx + 1], self.data[idx + 2]])
    }

    /// Crop a region of the frame
    pub fn crop(&self, x: u32, y: u32, w: u32, h: u32) -> Option<VideoFrame> {
        if x + w > self.width || y + h > self.height {
            return None;
        }

        let mut cropped = Vec::with_capacity((w * h * 3) as usize);
        for row in y..(y + h) {
            let start = ((row * self.width + x) * 3) as usize;
            let end = start + (w * 3) as usize;
            cropped.extend_from_slice(self.data.get(start..end)?);
        }

        Some(VideoFrame {
            data: cropped,
            width: w,
            height: h,
            timestamp_ns: self.timestamp_ns,
            sequence: self.sequence,
        })
    }

    /// Pixel rectangle covered by a normalized region of this frame
    pub fn pixel_rect(&self, region: &BoundingBox) -> Result<PixelRect, GeometryError> {
        region.to_pixel_rect(self.width, self.height)
    }

    /// Crop the part of the frame covered by a normalized region
    pub fn crop_region(&self, region: &BoundingBox) -> Result<VideoFrame, GeometryError> {
        let rect = self.pixel_rect(region)?;
        self.crop(rect.x, rect.y, rect.width, rect.height)
            .ok_or(GeometryError::EmptyFrame {
                width: self.width,
                height: self.height,
            })
    }

    /// Convert into an `image` buffer, `None` if the data length does not match the size
    pub fn into_rgb_image(self) -> Option<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> VideoFrame {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[x as u8, y as u8, 0]);
            }
        }
        VideoFrame::new(data, width, height, 7, 3)
    }

    #[test]
    fn test_crop_region() {
        let frame = gradient(100, 50);
        let region = BoundingBox::new(0.5, 0.2, 0.1, 0.4).unwrap();

        let crop = frame.crop_region(&region).unwrap();
        assert_eq!((crop.width, crop.height), (10, 20));
        assert_eq!(crop.get_pixel(0, 0), Some([50, 10, 0]));
        assert_eq!(crop.sequence, 3);
    }

    #[test]
    fn test_crop_rejects_overflow() {
        let frame = gradient(10, 10);
        assert!(frame.crop(5, 5, 6, 2).is_none());
    }

    #[test]
    fn test_short_buffer_is_not_an_image() {
        let frame = VideoFrame::new(vec![0; 5], 2, 2, 0, 0);
        assert!(frame.into_rgb_image().is_none());

        let frame = VideoFrame::filled(4, 3, [1, 2, 3], 0, 0);
        let image = frame.into_rgb_image().unwrap();
        assert_eq!(image.get_pixel(3, 2).0, [1, 2, 3]);
    }
}
