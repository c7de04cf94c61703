use crate::config::EnhanceConfig;
use crate::error::PipelineError;
use image::{imageops::FilterType, DynamicImage, GenericImageView};

/// Longest side allowed after upscaling, to bound memory on large scans
const MAX_DIMENSION: u32 = 8000;

/// Upscale by the configured factor so small glyphs survive binarization
pub fn apply(image: DynamicImage, config: &EnhanceConfig) -> Result<DynamicImage, PipelineError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(PipelineError::Enhancement("image has no pixels".to_string()));
    }

    let factor = config.upscale_factor;
    if !factor.is_finite() || factor <= 0.0 {
        return Err(PipelineError::Enhancement(format!(
            "invalid upscale factor {}",
            factor
        )));
    }

    let (new_width, new_height) = target_dimensions(width, height, factor);
    if (new_width, new_height) == (width, height) {
        return Ok(image);
    }

    Ok(image.resize_exact(new_width, new_height, FilterType::Lanczos3))
}

fn target_dimensions(width: u32, height: u32, factor: f32) -> (u32, u32) {
    let mut scale = factor;

    // Clamp to max dimension
    let longest = width.max(height) as f32 * scale;
    if longest > MAX_DIMENSION as f32 {
        scale *= MAX_DIMENSION as f32 / longest;
        tracing::debug!(
            "Upscale clamped to {:.2}x for {}x{} page",
            scale,
            width,
            height
        );
    }

    let new_width = ((width as f32 * scale).round() as u32).max(1);
    let new_height = ((height as f32 * scale).round() as u32).max(1);
    (new_width, new_height)
}
