use crate::config::EnhanceConfig;
use crate::error::PipelineError;
use image::DynamicImage;
use imageproc::filter::bilateral_filter;

/// Edge-preserving bilateral smoothing.
///
/// Neighbours are weighted both by distance and by how close their intensity
/// is to the centre pixel, so glyph edges stay sharp while flat paper noise is
/// averaged out.
pub fn apply(image: DynamicImage, config: &EnhanceConfig) -> Result<DynamicImage, PipelineError> {
    let gray = image.to_luma8();
    if gray.width() == 0 || gray.height() == 0 {
        return Err(PipelineError::Enhancement("image has no pixels".to_string()));
    }

    let denoised = bilateral_filter(
        &gray,
        config.denoise_diameter.max(1),
        config.denoise_sigma_color.max(f32::EPSILON),
        config.denoise_sigma_space.max(f32::EPSILON),
    );
    Ok(DynamicImage::ImageLuma8(denoised))
}
