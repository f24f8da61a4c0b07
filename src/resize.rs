//! Target dimension calculation for bounded resizing

use crate::{Error, Result};

/// Compute output dimensions that fit within `max_width` x `max_height`.
///
/// Images already inside the bounds keep their size (no upscaling). Larger
/// images are scaled by the tighter of the two axis ratios, so the aspect
/// ratio is preserved up to rounding and every side stays at least 1px.
pub fn compute_target(
    src_width: u32,
    src_height: u32,
    max_width: u32,
    max_height: u32,
) -> Result<(u32, u32)> {
    if src_width == 0 || src_height == 0 || max_width == 0 || max_height == 0 {
        return Err(Error::InvalidDimension(format!(
            "source {}x{} and bounds {}x{} must all be positive",
            src_width, src_height, max_width, max_height
        )));
    }

    if src_width <= max_width && src_height <= max_height {
        return Ok((src_width, src_height));
    }

    let scale = f64::min(
        max_width as f64 / src_width as f64,
        max_height as f64 / src_height as f64,
    );

    let width = ((src_width as f64 * scale).round() as u32).clamp(1, max_width);
    let height = ((src_height as f64 * scale).round() as u32).clamp(1, max_height);

    Ok((width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_landscape_photo_bounded_by_height() {
        assert_eq!(compute_target(4000, 3000, 1920, 1080).unwrap(), (1440, 1080));
    }

    #[test]
    fn test_wide_image_bounded_by_width() {
        assert_eq!(compute_target(4000, 1000, 1920, 1080).unwrap(), (1920, 480));
    }

    #[test]
    fn test_portrait_photo() {
        assert_eq!(compute_target(3024, 4032, 1920, 1080).unwrap(), (810, 1080));
    }

    #[test]
    fn test_no_upscaling_within_bounds() {
        assert_eq!(compute_target(800, 600, 1920, 1080).unwrap(), (800, 600));
        assert_eq!(compute_target(1920, 1080, 1920, 1080).unwrap(), (1920, 1080));
    }

    #[test]
    fn test_extreme_aspect_ratio_clamps_to_one_pixel() {
        assert_eq!(compute_target(100_000, 10, 1000, 1000).unwrap(), (1000, 1));
        assert_eq!(compute_target(1, 50_000, 100, 100).unwrap(), (1, 100));
    }

    #[test]
    fn test_zero_dimension_rejected() {
        assert!(matches!(
            compute_target(0, 100, 1920, 1080),
            Err(Error::InvalidDimension(_))
        ));
        assert!(matches!(
            compute_target(100, 100, 1920, 0),
            Err(Error::InvalidDimension(_))
        ));
    }

    #[test]
    fn test_downscaled_output_fits_bounds_and_keeps_aspect() {
        let sizes = [(4032, 3024), (3024, 4032), (5000, 200), (1921, 1081), (2500, 2500)];
        let bounds = [(1920, 1080), (1080, 1920), (640, 480), (100, 100)];

        for &(src_w, src_h) in &sizes {
            for &(max_w, max_h) in &bounds {
                let (w, h) = compute_target(src_w, src_h, max_w, max_h).unwrap();
                assert!(w <= max_w && h <= max_h, "{}x{} exceeds {}x{}", w, h, max_w, max_h);
                assert!(w >= 1 && h >= 1);

                // Height implied by the source ratio should be within a pixel
                let expected_h = w as f64 * src_h as f64 / src_w as f64;
                let expected_w = h as f64 * src_w as f64 / src_h as f64;
                assert!(
                    (expected_h - h as f64).abs() <= 1.0 || (expected_w - w as f64).abs() <= 1.0,
                    "{}x{} -> {}x{} distorts aspect ratio",
                    src_w,
                    src_h,
                    w,
                    h
                );
            }
        }
    }
}
