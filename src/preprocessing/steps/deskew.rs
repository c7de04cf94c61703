use crate::config::EnhanceConfig;
use crate::error::PipelineError;
use image::{DynamicImage, GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::geometry::{contour_area, min_area_rect};
use imageproc::point::Point;

/// Deskew a binarized page.
///
/// The largest connected ink region is boxed with its minimum-area
/// rectangle; the rectangle's tilt is the page skew. Pages tilted by no more
/// than the configured threshold, or with no ink at all, are returned as-is.
pub fn apply(image: DynamicImage, config: &EnhanceConfig) -> Result<DynamicImage, PipelineError> {
    let gray = image.to_luma8();

    let Some(angle) = detect_skew_angle(&gray) else {
        tracing::debug!("Deskew skipped: no foreground contour");
        return Ok(DynamicImage::ImageLuma8(gray));
    };

    if angle.abs() <= config.deskew_threshold_deg {
        tracing::debug!("Deskew skipped: {:.2} degrees is within threshold", angle);
        return Ok(DynamicImage::ImageLuma8(gray));
    }

    tracing::debug!("Deskewing page by {:.2} degrees", angle);
    Ok(DynamicImage::ImageLuma8(rotate_replicate(
        &gray,
        angle.to_radians(),
    )))
}

/// Correction angle in degrees, to be applied as a clockwise rotation in
/// image coordinates. `None` when the page has no ink.
pub fn detect_skew_angle(gray: &GrayImage) -> Option<f32> {
    // Contours are traced around non-zero pixels, so mark dark ink as 255
    let ink = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y).0[0] < 128 {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    });

    let contours = find_contours::<i32>(&ink);
    let largest = contours
        .iter()
        .filter(|c| c.border_type == BorderType::Outer)
        .map(|c| (contour_area(&c.points), c))
        .max_by(|(a, ca), (b, cb)| {
            a.total_cmp(b)
                .then_with(|| ca.points.len().cmp(&cb.points.len()))
        })?
        .1;

    let rect_angle = min_area_rect_angle(&largest.points)?;
    Some(correction_angle(rect_angle))
}

/// Map a rectangle edge direction onto the correction angle.
///
/// The direction is first folded into [-90, 0). Angles below -45 are
/// normalized by adding 90 and negating, the rest are negated directly.
fn correction_angle(edge_deg: f32) -> f32 {
    let folded = edge_deg.rem_euclid(90.0) - 90.0;
    if folded < -45.0 {
        -(90.0 + folded)
    } else {
        -folded
    }
}

/// Direction (degrees, y pointing down) of the long edge of the minimum-area
/// rectangle enclosing `points`.
fn min_area_rect_angle(points: &[Point<i32>]) -> Option<f32> {
    if points.is_empty() {
        return None;
    }
    let corners = min_area_rect(points);
    let origin = corners[0];

    // Corners come back rounded to whole pixels, so measure the longer edge
    let mut neighbours: Vec<(i64, i64)> = corners[1..]
        .iter()
        .map(|c| ((c.x - origin.x) as i64, (c.y - origin.y) as i64))
        .collect();
    neighbours.sort_by_key(|&(dx, dy)| dx * dx + dy * dy);
    neighbours.truncate(2);

    let (dx, dy) = neighbours
        .into_iter()
        .max_by_key(|&(dx, dy)| dx * dx + dy * dy)
        .filter(|&(dx, dy)| dx != 0 || dy != 0)?;
    Some((dy as f64).atan2(dx as f64).to_degrees() as f32)
}

/// Rotate clockwise (image coordinates) about the centre with bilinear
/// sampling. Samples falling outside the page replicate the nearest edge.
fn rotate_replicate(img: &GrayImage, theta: f32) -> GrayImage {
    let (width, height) = img.dimensions();
    let cx = (width as f32 - 1.0) / 2.0;
    let cy = (height as f32 - 1.0) / 2.0;
    let (sin, cos) = theta.sin_cos();
    let max_x = width as f32 - 1.0;
    let max_y = height as f32 - 1.0;

    GrayImage::from_fn(width, height, |x, y| {
        let dx = x as f32 - cx;
        let dy = y as f32 - cy;
        let sx = (cx + cos * dx + sin * dy).clamp(0.0, max_x);
        let sy = (cy - sin * dx + cos * dy).clamp(0.0, max_y);

        let x0 = sx.floor() as u32;
        let y0 = sy.floor() as u32;
        let x1 = (x0 + 1).min(width - 1);
        let y1 = (y0 + 1).min(height - 1);
        let fx = sx - x0 as f32;
        let fy = sy - y0 as f32;

        let p = |px: u32, py: u32| img.get_pixel(px, py).0[0] as f32;
        let top = p(x0, y0) * (1.0 - fx) + p(x1, y0) * fx;
        let bottom = p(x0, y1) * (1.0 - fx) + p(x1, y1) * fx;
        Luma([(top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// White page with a dark bar whose long axis is tilted `deg` degrees
    /// clockwise from horizontal.
    fn tilted_bar(deg: f32) -> GrayImage {
        let (width, height) = (420u32, 300u32);
        let (cx, cy) = (width as f32 / 2.0, height as f32 / 2.0);
        let (sin, cos) = deg.to_radians().sin_cos();
        GrayImage::from_fn(width, height, |x, y| {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            let along = cos * dx + sin * dy;
            let across = -sin * dx + cos * dy;
            if along.abs() <= 160.0 && across.abs() <= 12.0 {
                Luma([0])
            } else {
                Luma([255])
            }
        })
    }

    #[test]
    fn test_correction_angle_normalization() {
        assert!((correction_angle(5.0) + 5.0).abs() < 1e-4);
        assert!((correction_angle(-5.0) - 5.0).abs() < 1e-4);
        assert!(correction_angle(0.0).abs() < 1e-4);
        assert!(correction_angle(90.0).abs() < 1e-4);
        assert!((correction_angle(95.0) + 5.0).abs() < 1e-4);
    }

    #[test]
    fn test_detects_tilt_of_bar() {
        let angle = detect_skew_angle(&tilted_bar(5.0)).unwrap();
        assert!((angle + 5.0).abs() < 0.5, "expected about -5, got {}", angle);
    }

    #[test]
    fn test_level_page_is_left_alone() {
        let img = tilted_bar(0.0);
        assert!(detect_skew_angle(&img).unwrap().abs() < 0.5);
        let result = apply(DynamicImage::ImageLuma8(img.clone()), &EnhanceConfig::default())
            .unwrap()
            .to_luma8();
        assert_eq!(result, img);
    }

    #[test]
    fn test_tilt_within_threshold_is_left_alone() {
        let config = EnhanceConfig {
            deskew_threshold_deg: 4.0,
            ..EnhanceConfig::default()
        };
        let img = tilted_bar(3.0);
        let result = apply(DynamicImage::ImageLuma8(img.clone()), &config)
            .unwrap()
            .to_luma8();
        assert_eq!(result, img);
    }

    #[test]
    fn test_five_degree_tilt_is_corrected() {
        let img = tilted_bar(5.0);
        let result = apply(DynamicImage::ImageLuma8(img), &EnhanceConfig::default())
            .unwrap()
            .to_luma8();

        let residual = detect_skew_angle(&result).unwrap();
        assert!(residual.abs() < 1.0, "residual skew {}", residual);
    }

    #[test]
    fn test_blank_page_is_skipped() {
        let img = GrayImage::from_pixel(50, 40, Luma([255]));
        assert!(detect_skew_angle(&img).is_none());

        let result = apply(DynamicImage::ImageLuma8(img.clone()), &EnhanceConfig::default())
            .unwrap()
            .to_luma8();
        assert_eq!(result, img);
    }

    #[test]
    fn test_deskew_preserves_dimensions() {
        let result = apply(
            DynamicImage::ImageLuma8(tilted_bar(-7.0)),
            &EnhanceConfig::default(),
        )
        .unwrap();
        assert_eq!((result.width(), result.height()), (420, 300));
    }
}
