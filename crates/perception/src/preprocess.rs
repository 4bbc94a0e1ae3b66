//! Recognition preprocessing
//!
//! Fixed pipeline run on the sign crop before text recognition:
//! 1. Crop the region in pixel space
//! 2. Desaturate
//! 3. Exposure adjustment
//! 4. Highlight compression
//! 5. Brightness / contrast
//! 6. Highlight compression again
//! 7. Box blur to knock out sensor noise

use image::GrayImage;
use serde::{Deserialize, Serialize};
use video_frame::{BoundingBox, VideoFrame};

use crate::PerceptionError;

/// Tones above this level count as highlights
const HIGHLIGHT_KNEE: f32 = 0.5;

/// Preprocessing parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Exposure adjustment in EV stops
    pub exposure_ev: f32,

    /// How much of the highlight range to keep (1 leaves it untouched, 0 halves it)
    pub highlight_amount: f32,

    /// Brightness offset (-1..1)
    pub brightness: f32,

    /// Contrast multiplier around mid-gray
    pub contrast: f32,

    /// Box blur radius (pixels)
    pub blur_radius: u32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            exposure_ev: 2.0,
            highlight_amount: 0.0,
            brightness: 0.45,
            contrast: 2.0,
            blur_radius: 4,
        }
    }
}

/// Crop `region` out of `frame` and prepare it for the recognizer
pub fn prepare(
    frame: &VideoFrame,
    region: &BoundingBox,
    config: &PreprocessConfig,
) -> Result<GrayImage, PerceptionError> {
    let crop = frame
        .crop_region(region)
        .map_err(|e| PerceptionError::Preprocessing(e.to_string()))?;
    let rgb = crop.into_rgb_image().ok_or(PerceptionError::InvalidFrame)?;

    let mut gray = image::imageops::grayscale(&rgb);

    let gain = 2f32.powf(config.exposure_ev);
    for pixel in gray.pixels_mut() {
        let value = pixel.0[0] as f32 / 255.0;
        let exposed = compress_highlights((value * gain).min(1.0), config.highlight_amount);
        let adjusted = (exposed + config.brightness - 0.5) * config.contrast + 0.5;
        let adjusted = compress_highlights(adjusted.clamp(0.0, 1.0), config.highlight_amount);
        pixel.0[0] = (adjusted * 255.0).round() as u8;
    }

    if config.blur_radius == 0 {
        return Ok(gray);
    }
    Ok(imageproc::filter::box_filter(
        &gray,
        config.blur_radius,
        config.blur_radius,
    ))
}

/// Pull tones above the knee towards it
fn compress_highlights(value: f32, amount: f32) -> f32 {
    if value <= HIGHLIGHT_KNEE {
        return value;
    }
    let keep = 0.5 + 0.5 * amount.clamp(0.0, 1.0);
    HIGHLIGHT_KNEE + (value - HIGHLIGHT_KNEE) * keep
}

#[cfg(test)]
mod tests {
    use super::*;

    fn half_dark_frame() -> VideoFrame {
        // Left half black, right half white
        let (width, height) = (40u32, 20u32);
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for _ in 0..height {
            for x in 0..width {
                let v = if x < width / 2 { 0 } else { 255 };
                data.extend_from_slice(&[v, v, v]);
            }
        }
        VideoFrame::new(data, width, height, 0, 0)
    }

    #[test]
    fn test_output_matches_crop_size() {
        let frame = half_dark_frame();
        let region = BoundingBox::new(0.25, 0.0, 0.5, 1.0).unwrap();

        let image = prepare(&frame, &region, &PreprocessConfig::default()).unwrap();
        assert_eq!(image.dimensions(), (20, 20));
    }

    #[test]
    fn test_dark_stays_darker_than_bright() {
        let frame = half_dark_frame();
        let region = BoundingBox::new(0.0, 0.0, 1.0, 1.0).unwrap();
        let config = PreprocessConfig {
            blur_radius: 0,
            ..Default::default()
        };

        let image = prepare(&frame, &region, &config).unwrap();
        let dark = image.get_pixel(0, 0).0[0];
        let bright = image.get_pixel(39, 0).0[0];
        assert!(dark < bright);
        assert!(bright < 255);
    }

    #[test]
    fn test_highlights_are_compressed() {
        let frame = half_dark_frame();
        let region = BoundingBox::new(0.0, 0.0, 1.0, 1.0).unwrap();
        let untouched = PreprocessConfig {
            highlight_amount: 1.0,
            blur_radius: 0,
            ..Default::default()
        };
        let compressed = PreprocessConfig {
            highlight_amount: 0.0,
            ..untouched.clone()
        };

        let bright = |config: &PreprocessConfig| prepare(&frame, &region, config).unwrap().get_pixel(39, 0).0[0];
        assert_eq!(bright(&untouched), 255);
        // White ends up three quarters of the way up
        assert_eq!(bright(&compressed), 191);

        // Shadows are left alone
        let dark = prepare(&frame, &region, &compressed).unwrap().get_pixel(0, 0).0[0];
        assert_eq!(dark, 102);
    }

    #[test]
    fn test_compress_highlights_keeps_shadows() {
        assert_eq!(compress_highlights(0.3, 0.0), 0.3);
        assert_eq!(compress_highlights(1.0, 1.0), 1.0);
        assert_eq!(compress_highlights(1.0, 0.0), 0.75);
    }

    #[test]
    fn test_truncated_frame_is_rejected() {
        let frame = VideoFrame::new(vec![0; 10], 40, 20, 0, 0);
        let region = BoundingBox::new(0.0, 0.0, 1.0, 1.0).unwrap();
        assert!(prepare(&frame, &region, &PreprocessConfig::default()).is_err());
    }
}
