use crate::config::EnhanceConfig;
use crate::error::PipelineError;
use image::{DynamicImage, GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::morphology::close;

/// Morphological cleanup of a binarized page (dark ink on white paper).
///
/// An "open" with a small square element removes isolated specks, then a
/// "close" with a larger square element reconnects broken strokes.
pub fn apply(image: DynamicImage, config: &EnhanceConfig) -> Result<DynamicImage, PipelineError> {
    // imageproc treats non-zero pixels as foreground, so work on inverted ink
    let ink = invert(&image.to_luma8());
    let opened = open_square(&ink, config.open_size);
    let closed = close(&opened, Norm::LInf, config.close_radius);
    Ok(DynamicImage::ImageLuma8(invert(&closed)))
}

fn invert(img: &GrayImage) -> GrayImage {
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        Luma([255 - img.get_pixel(x, y).0[0]])
    })
}

/// Opening with a `size` x `size` square, which may be even-sized
fn open_square(img: &GrayImage, size: u32) -> GrayImage {
    if size <= 1 {
        return img.clone();
    }
    let eroded = sweep(img, size, false);
    sweep(&eroded, size, true)
}

/// Erosion (min) over the window anchored at the pixel's top-left, or
/// dilation (max) over the mirrored window anchored at its bottom-right.
fn sweep(img: &GrayImage, size: u32, dilate: bool) -> GrayImage {
    let (width, height) = img.dimensions();
    let span = size as i64 - 1;

    GrayImage::from_fn(width, height, |x, y| {
        let (x0, y0) = if dilate {
            (x as i64 - span, y as i64 - span)
        } else {
            (x as i64, y as i64)
        };

        let mut acc = if dilate { 0u8 } else { 255u8 };
        for sy in y0..=y0 + span {
            for sx in x0..=x0 + span {
                let inside = sx >= 0 && sy >= 0 && sx < width as i64 && sy < height as i64;
                // Outside the image counts as background for both passes
                let v = if inside {
                    img.get_pixel(sx as u32, sy as u32).0[0]
                } else {
                    0
                };
                acc = if dilate { acc.max(v) } else { acc.min(v) };
            }
        }
        Luma([acc])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paper(width: u32, height: u32) -> GrayImage {
        GrayImage::from_pixel(width, height, Luma([255]))
    }

    fn fill(img: &mut GrayImage, xs: std::ops::Range<u32>, ys: std::ops::Range<u32>) {
        for y in ys {
            for x in xs.clone() {
                img.put_pixel(x, y, Luma([0]));
            }
        }
    }

    #[test]
    fn test_isolated_speck_is_removed() {
        let mut img = paper(20, 20);
        img.put_pixel(10, 10, Luma([0]));

        let result = apply(DynamicImage::ImageLuma8(img), &EnhanceConfig::default()).unwrap();
        assert!(result.to_luma8().pixels().all(|p| p.0[0] == 255));
    }

    #[test]
    fn test_two_pixel_stroke_survives() {
        let mut img = paper(30, 12);
        fill(&mut img, 5..25, 5..7);

        let result = apply(DynamicImage::ImageLuma8(img), &EnhanceConfig::default()).unwrap();
        let gray = result.to_luma8();
        assert_eq!(gray.get_pixel(15, 5).0[0], 0);
        assert_eq!(gray.get_pixel(15, 6).0[0], 0);
    }

    #[test]
    fn test_broken_stroke_is_reconnected() {
        let mut img = paper(40, 24);
        fill(&mut img, 5..15, 5..15);
        fill(&mut img, 16..26, 5..15);

        let result = apply(DynamicImage::ImageLuma8(img), &EnhanceConfig::default()).unwrap();
        assert_eq!(result.to_luma8().get_pixel(15, 10).0[0], 0);
    }
}
