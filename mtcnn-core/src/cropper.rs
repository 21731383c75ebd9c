//! Crop-rectangle computation for face thumbnails.
//!
//! Expands a detected box by a pixel margin (half per side) and clamps the
//! result to the image. Clamped edges are truncated to whole pixels; the
//! truncation (rather than rounding) is applied consistently so thumbnail
//! output stays pixel-exact across runs.

use crate::detection::BoundingBox;

/// Integer crop rectangle, clamped to the image, with `left < right` and
/// `top < bottom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    /// Left edge, inclusive.
    pub left: u32,
    /// Top edge, inclusive.
    pub top: u32,
    /// Right edge, exclusive.
    pub right: u32,
    /// Bottom edge, exclusive.
    pub bottom: u32,
}

impl CropRect {
    /// Width of the rectangle.
    pub fn width(&self) -> u32 {
        self.right - self.left
    }

    /// Height of the rectangle.
    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }
}

/// Expand `bbox` by `margin` pixels (half per side) and clamp to the image.
///
/// Returns `None` when clamping leaves a zero-area rectangle (a pathological
/// box on a tiny image); callers treat that as a failed detection for the
/// image, not an error.
pub fn expanded_crop(
    bbox: &BoundingBox,
    img_width: u32,
    img_height: u32,
    margin: u32,
) -> Option<CropRect> {
    let half = margin as f32 / 2.0;

    let left = (bbox.x1 - half).max(0.0).floor() as u32;
    let top = (bbox.y1 - half).max(0.0).floor() as u32;
    let right = (bbox.x2 + half).min(img_width as f32).floor() as u32;
    let bottom = (bbox.y2 + half).min(img_height as f32).floor() as u32;

    (right > left && bottom > top).then_some(CropRect {
        left,
        top,
        right,
        bottom,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x1: f32, y1: f32, x2: f32, y2: f32) -> BoundingBox {
        BoundingBox { x1, y1, x2, y2 }
    }

    #[test]
    fn margin_expands_half_per_side() {
        let rect = expanded_crop(&bbox(20.0, 30.0, 40.0, 50.0), 100, 100, 12).expect("rect");
        assert_eq!(
            rect,
            CropRect {
                left: 14,
                top: 24,
                right: 46,
                bottom: 56,
            }
        );
        assert_eq!(rect.width(), 32);
        assert_eq!(rect.height(), 32);
    }

    #[test]
    fn negative_coordinates_clamp_to_zero() {
        // x1 = -5 with margin 12 would reach -11; the left edge clamps to 0.
        let rect = expanded_crop(&bbox(-5.0, 10.0, 30.0, 40.0), 50, 50, 12).expect("rect");
        assert_eq!(rect.left, 0);
        assert_eq!(rect.top, 4);
    }

    #[test]
    fn right_and_bottom_clamp_to_image_size() {
        let rect = expanded_crop(&bbox(30.0, 30.0, 48.0, 49.0), 50, 50, 12).expect("rect");
        assert_eq!(rect.right, 50);
        assert_eq!(rect.bottom, 50);
    }

    #[test]
    fn odd_margin_truncates_consistently() {
        // Half of 13 is 6.5; edges land on x.5 values and truncate down.
        let rect = expanded_crop(&bbox(20.0, 20.0, 40.0, 40.0), 100, 100, 13).expect("rect");
        assert_eq!(rect.left, 13);
        assert_eq!(rect.top, 13);
        assert_eq!(rect.right, 46);
        assert_eq!(rect.bottom, 46);
    }

    #[test]
    fn degenerate_result_is_none() {
        // A box entirely past the right edge collapses after clamping.
        assert!(expanded_crop(&bbox(60.0, 10.0, 80.0, 30.0), 50, 50, 0).is_none());
        // A zero-size image accepts nothing.
        assert!(expanded_crop(&bbox(0.0, 0.0, 10.0, 10.0), 0, 0, 12).is_none());
    }
}
