use crate::config::EnhanceConfig;
use crate::error::PipelineError;
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};

/// Boost contrast by pushing every channel away from the mean luminance.
///
/// `out = mean + factor * (pixel - mean)`, clamped to 0..=255. A factor of
/// 1.0 leaves the image unchanged; 0.0 yields a flat gray page.
pub fn apply(image: DynamicImage, config: &EnhanceConfig) -> Result<DynamicImage, PipelineError> {
    let factor = config.contrast_factor;
    let mean = mean_luminance(&image.to_luma8());

    let stretch = |v: u8| -> u8 {
        (mean + factor * (v as f32 - mean))
            .round()
            .clamp(0.0, 255.0) as u8
    };

    Ok(match image {
        DynamicImage::ImageLuma8(gray) => {
            let out = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
                Luma([stretch(gray.get_pixel(x, y).0[0])])
            });
            DynamicImage::ImageLuma8(out)
        }
        other => {
            let rgb = other.to_rgb8();
            let out = RgbImage::from_fn(rgb.width(), rgb.height(), |x, y| {
                let Rgb([r, g, b]) = *rgb.get_pixel(x, y);
                Rgb([stretch(r), stretch(g), stretch(b)])
            });
            DynamicImage::ImageRgb8(out)
        }
    })
}

fn mean_luminance(gray: &GrayImage) -> f32 {
    let count = gray.width() as u64 * gray.height() as u64;
    if count == 0 {
        return 0.0;
    }
    let sum: u64 = gray.pixels().map(|p| p.0[0] as u64).sum();
    (sum as f32 / count as f32).round()
}
