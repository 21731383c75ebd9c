//! Preprocessing utilities for the cascade.
//!
//! The helpers in this module normalize channel layout, build the image
//! pyramid levels, and convert pixels into the normalized NCHW tensors the
//! stage networks expect.

use image::{DynamicImage, RgbImage, imageops, imageops::FilterType};
use ndarray::Array4;

use crate::detection::BoundingBox;

const PIXEL_OFFSET: f32 = 127.5;
const PIXEL_SCALE: f32 = 0.0078125; // 1 / 128

/// Normalize any decoded image to 3-channel RGB.
///
/// Single-channel inputs are replicated across the three channels; this is
/// the caller's responsibility, not the detector's.
pub fn to_rgb(image: &DynamicImage) -> RgbImage {
    image.to_rgb8()
}

/// Resize an image by `scale` for one pyramid level, bilinear.
pub fn scale_image(image: &RgbImage, scale: f32) -> RgbImage {
    let width = ((image.width() as f32) * scale).ceil().max(1.0) as u32;
    let height = ((image.height() as f32) * scale).ceil().max(1.0) as u32;
    imageops::resize(image, width, height, FilterType::Triangle)
}

/// Map one pixel channel value into the stage-network input range.
pub fn normalize_pixel(value: u8) -> f32 {
    (f32::from(value) - PIXEL_OFFSET) * PIXEL_SCALE
}

/// Convert an RGB image into a normalized `(1, 3, h, w)` tensor.
pub fn image_tensor(image: &RgbImage) -> Array4<f32> {
    let (width, height) = image.dimensions();
    let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));
    for (x, y, pixel) in image.enumerate_pixels() {
        let (xi, yi) = (x as usize, y as usize);
        for channel in 0..3 {
            tensor[[0, channel, yi, xi]] = normalize_pixel(pixel[channel]);
        }
    }
    tensor
}

/// Extract the patch under `bbox` resized to `size`x`size`.
///
/// Box edges are floored to integers. Portions outside the image are
/// zero-padded so boxes hanging past a border still produce a full patch.
pub fn extract_patch(image: &RgbImage, bbox: &BoundingBox, size: u32) -> RgbImage {
    let x1 = bbox.x1.floor() as i64;
    let y1 = bbox.y1.floor() as i64;
    let x2 = bbox.x2.floor() as i64;
    let y2 = bbox.y2.floor() as i64;

    let width = (x2 - x1).max(0) as u32;
    let height = (y2 - y1).max(0) as u32;
    if width == 0 || height == 0 {
        return RgbImage::new(size, size);
    }

    let img_w = i64::from(image.width());
    let img_h = i64::from(image.height());

    let src_x1 = x1.clamp(0, img_w);
    let src_y1 = y1.clamp(0, img_h);
    let src_x2 = x2.clamp(0, img_w);
    let src_y2 = y2.clamp(0, img_h);

    let mut canvas = RgbImage::new(width, height);
    if src_x2 > src_x1 && src_y2 > src_y1 {
        let offset_x = (src_x1 - x1) as u32;
        let offset_y = (src_y1 - y1) as u32;
        for y in 0..(src_y2 - src_y1) as u32 {
            for x in 0..(src_x2 - src_x1) as u32 {
                let pixel = image.get_pixel(src_x1 as u32 + x, src_y1 as u32 + y);
                canvas.put_pixel(offset_x + x, offset_y + y, *pixel);
            }
        }
    }

    imageops::resize(&canvas, size, size, FilterType::Triangle)
}

/// Build a normalized `(n, 3, size, size)` batch of patches, one per box.
pub fn patch_batch(image: &RgbImage, boxes: &[BoundingBox], size: u32) -> Array4<f32> {
    let side = size as usize;
    let mut batch = Array4::<f32>::zeros((boxes.len(), 3, side, side));
    for (index, bbox) in boxes.iter().enumerate() {
        let patch = extract_patch(image, bbox, size);
        for (x, y, pixel) in patch.enumerate_pixels() {
            let (xi, yi) = (x as usize, y as usize);
            for channel in 0..3 {
                batch[[index, channel, yi, xi]] = normalize_pixel(pixel[channel]);
            }
        }
    }
    batch
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn grayscale_is_replicated_to_three_channels() {
        let gray = DynamicImage::ImageLuma8(image::GrayImage::from_pixel(4, 4, image::Luma([90])));
        let rgb = to_rgb(&gray);
        let pixel = rgb.get_pixel(1, 1);
        assert_eq!(pixel[0], 90);
        assert_eq!(pixel[1], 90);
        assert_eq!(pixel[2], 90);
    }

    #[test]
    fn scale_image_rounds_up_and_never_hits_zero() {
        let image = RgbImage::new(10, 7);
        let scaled = scale_image(&image, 0.5);
        assert_eq!(scaled.dimensions(), (5, 4));

        let tiny = scale_image(&image, 0.01);
        assert_eq!(tiny.dimensions(), (1, 1));
    }

    #[test]
    fn normalization_maps_pixel_range_to_unit_interval() {
        assert!((normalize_pixel(0) + 0.99609375).abs() < f32::EPSILON);
        assert!((normalize_pixel(255) - 0.99609375).abs() < f32::EPSILON);
        assert!(normalize_pixel(127).abs() < 0.01);
    }

    #[test]
    fn image_tensor_is_nchw() {
        let mut image = RgbImage::new(3, 2);
        image.put_pixel(2, 1, Rgb([255, 0, 0]));
        let tensor = image_tensor(&image);
        assert_eq!(tensor.shape(), &[1, 3, 2, 3]);
        assert!(tensor[[0, 0, 1, 2]] > 0.99);
        assert!(tensor[[0, 1, 1, 2]] < -0.99);
    }

    #[test]
    fn out_of_bounds_patch_is_zero_padded() {
        let image = RgbImage::from_pixel(10, 10, Rgb([200, 200, 200]));
        let bbox = BoundingBox {
            x1: -5.0,
            y1: -5.0,
            x2: 5.0,
            y2: 5.0,
        };
        let patch = extract_patch(&image, &bbox, 10);
        assert_eq!(patch.dimensions(), (10, 10));
        // Top-left quadrant comes from outside the image and stays black.
        assert_eq!(patch.get_pixel(1, 1)[0], 0);
        assert!(patch.get_pixel(8, 8)[0] > 150);
    }

    #[test]
    fn degenerate_box_yields_black_patch() {
        let image = RgbImage::from_pixel(10, 10, Rgb([200, 200, 200]));
        let bbox = BoundingBox {
            x1: 3.0,
            y1: 3.0,
            x2: 3.0,
            y2: 9.0,
        };
        let patch = extract_patch(&image, &bbox, 4);
        assert_eq!(patch.dimensions(), (4, 4));
        assert!(patch.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn patch_batch_matches_box_count() {
        let image = RgbImage::from_pixel(20, 20, Rgb([100, 100, 100]));
        let boxes = [
            BoundingBox {
                x1: 0.0,
                y1: 0.0,
                x2: 10.0,
                y2: 10.0,
            },
            BoundingBox {
                x1: 5.0,
                y1: 5.0,
                x2: 15.0,
                y2: 15.0,
            },
        ];
        let batch = patch_batch(&image, &boxes, 24);
        assert_eq!(batch.shape(), &[2, 3, 24, 24]);
    }
}
