use crate::error::PipelineError;
use image::DynamicImage;

/// Reduce to single-channel luminance
pub fn apply(image: DynamicImage) -> Result<DynamicImage, PipelineError> {
    Ok(match image {
        DynamicImage::ImageLuma8(_) => image,
        other => DynamicImage::ImageLuma8(other.to_luma8()),
    })
}
