use crate::config::EnhanceConfig;
use crate::error::PipelineError;
use image::{DynamicImage, GrayImage, Luma};
use imageproc::contrast::otsu_level;
use imageproc::definitions::Image;
use imageproc::integral_image::{integral_image, sum_image_pixels};

const INK: u8 = 0;
const PAPER: u8 = 255;

/// Dual thresholding: a pixel becomes ink only when both the global (Otsu)
/// and the locally adaptive threshold classify it as ink.
pub fn apply(image: DynamicImage, config: &EnhanceConfig) -> Result<DynamicImage, PipelineError> {
    let gray = image.to_luma8();
    let global = global(&gray);
    let local = adaptive_mean(&gray, config.adaptive_block_size, config.adaptive_bias);
    Ok(DynamicImage::ImageLuma8(intersect_ink(&global, &local)))
}

/// Global Otsu binarization; pixels above the level become paper
pub fn global(gray: &GrayImage) -> GrayImage {
    let level = otsu_level(gray);
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y).0[0] > level {
            Luma([PAPER])
        } else {
            Luma([INK])
        }
    })
}

/// Mean-based adaptive threshold: paper when `pixel > local_mean - bias`
pub fn adaptive_mean(gray: &GrayImage, block_size: u32, bias: i32) -> GrayImage {
    let (width, height) = gray.dimensions();
    let half = block_size.max(3) / 2;
    let integral: Image<Luma<u64>> = integral_image(gray);

    GrayImage::from_fn(width, height, |x, y| {
        let (left, top) = (x.saturating_sub(half), y.saturating_sub(half));
        let right = (x + half).min(width - 1);
        let bottom = (y + half).min(height - 1);

        let [sum] = sum_image_pixels(&integral, left, top, right, bottom);
        let area = ((right - left + 1) * (bottom - top + 1)) as f64;
        let threshold = sum as f64 / area - bias as f64;

        if gray.get_pixel(x, y).0[0] as f64 > threshold {
            Luma([PAPER])
        } else {
            Luma([INK])
        }
    })
}

fn intersect_ink(a: &GrayImage, b: &GrayImage) -> GrayImage {
    GrayImage::from_fn(a.width(), a.height(), |x, y| {
        if a.get_pixel(x, y).0[0] == INK && b.get_pixel(x, y).0[0] == INK {
            Luma([INK])
        } else {
            Luma([PAPER])
        }
    })
}
