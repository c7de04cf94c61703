use crate::config::EnhanceConfig;
use crate::error::PipelineError;
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use imageproc::definitions::Image;
use imageproc::filter::filter3x3;

/// Smoothing kernel the sharpness blend is measured against (weights sum to 13)
const SMOOTH_KERNEL: [f32; 9] = [1.0, 1.0, 1.0, 1.0, 5.0, 1.0, 1.0, 1.0, 1.0];
const SMOOTH_WEIGHT: f32 = 13.0;

/// Sharpen by extrapolating away from a smoothed copy.
///
/// `out = smooth + factor * (pixel - smooth)`. A factor of 1.0 returns the
/// input, larger factors exaggerate edges.
pub fn apply(image: DynamicImage, config: &EnhanceConfig) -> Result<DynamicImage, PipelineError> {
    let factor = config.sharpness_factor;
    let blend = |orig: u8, smooth_sum: f32| -> u8 {
        let s = smooth_sum / SMOOTH_WEIGHT;
        (s + factor * (orig as f32 - s)).round().clamp(0.0, 255.0) as u8
    };

    Ok(match image {
        DynamicImage::ImageLuma8(gray) => {
            let smooth: Image<Luma<f32>> = filter3x3(&gray, &SMOOTH_KERNEL);
            let out = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
                Luma([blend(gray.get_pixel(x, y).0[0], smooth.get_pixel(x, y).0[0])])
            });
            DynamicImage::ImageLuma8(out)
        }
        other => {
            let rgb = other.to_rgb8();
            let smooth: Image<Rgb<f32>> = filter3x3(&rgb, &SMOOTH_KERNEL);
            let out = RgbImage::from_fn(rgb.width(), rgb.height(), |x, y| {
                let o = rgb.get_pixel(x, y).0;
                let s = smooth.get_pixel(x, y).0;
                Rgb([blend(o[0], s[0]), blend(o[1], s[1]), blend(o[2], s[2])])
            });
            DynamicImage::ImageRgb8(out)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sharpen_enhances_edges() {
        // Create image with an edge (left half dark, right half light)
        let img = GrayImage::from_fn(20, 10, |x, _| {
            if x < 10 {
                Luma([50])
            } else {
                Luma([200])
            }
        });

        let result = apply(DynamicImage::ImageLuma8(img), &EnhanceConfig::default()).unwrap();
        let result_gray = result.to_luma8();

        let edge_left = result_gray.get_pixel(9, 5).0[0];
        let edge_right = result_gray.get_pixel(10, 5).0[0];

        let original_diff = 200i32 - 50;
        let result_diff = (edge_right as i32 - edge_left as i32).abs();

        assert!(
            result_diff > original_diff,
            "Edge should be enhanced: {} > {}",
            result_diff,
            original_diff
        );
    }

    #[test]
    fn test_flat_regions_are_untouched() {
        let img = GrayImage::from_pixel(8, 8, Luma([90]));
        let result = apply(DynamicImage::ImageLuma8(img), &EnhanceConfig::default()).unwrap();
        assert!(result.to_luma8().pixels().all(|p| p.0[0] == 90));
    }
}
