//! Owned page bitmaps handed from stage to stage.

use crate::error::PipelineError;
use image::{DynamicImage, GrayImage, RgbImage};

/// A single page bitmap, either one-channel luminance or three-channel RGB.
///
/// Every stage takes a `RasterImage` by value and returns a new one, so the
/// caller's buffer is never aliased or mutated behind its back.
#[derive(Debug, Clone)]
pub struct RasterImage {
    image: DynamicImage,
}

impl RasterImage {
    /// Decode an encoded image (PNG, JPEG, GIF, BMP, WebP, TIFF) from memory.
    pub fn decode(data: &[u8]) -> Result<Self, PipelineError> {
        let image = image::load_from_memory(data)
            .map_err(|e| PipelineError::ImageRead(format!("Failed to decode image: {}", e)))?;
        Ok(Self::from_dynamic(image))
    }

    /// Wrap any decoded image, reducing exotic pixel formats to gray or RGB.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        let image = match image {
            DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => image,
            DynamicImage::ImageLuma16(_)
            | DynamicImage::ImageLumaA8(_)
            | DynamicImage::ImageLumaA16(_) => DynamicImage::ImageLuma8(image.to_luma8()),
            other => DynamicImage::ImageRgb8(other.to_rgb8()),
        };
        Self { image }
    }

    pub fn from_luma(image: GrayImage) -> Self {
        Self {
            image: DynamicImage::ImageLuma8(image),
        }
    }

    pub fn from_rgb(image: RgbImage) -> Self {
        Self {
            image: DynamicImage::ImageRgb8(image),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Number of channels in the pixel buffer (1 or 3).
    pub fn channels(&self) -> u8 {
        self.image.color().channel_count()
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.image
    }

    pub fn into_dynamic(self) -> DynamicImage {
        self.image
    }
}
