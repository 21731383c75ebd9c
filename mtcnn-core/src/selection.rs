//! Primary-face selection.
//!
//! When an image yields several detections, exactly one must become the
//! thumbnail subject. Large faces are preferred, but off-center detections
//! are penalized more heavily than size alone would reward, biasing the
//! choice toward the intended subject of a portrait dataset.

use crate::detection::Detection;

/// Pick the primary face among `detections` for an image of the given size.
///
/// Returns the index of the winning detection, or `None` for an empty
/// slice. A single candidate is always selected. With multiple candidates
/// the winner maximizes `area - 2 * squared distance to the image center`;
/// ties keep the earliest index.
pub fn select_primary(detections: &[Detection], img_width: u32, img_height: u32) -> Option<usize> {
    if detections.len() <= 1 {
        return if detections.is_empty() { None } else { Some(0) };
    }

    let center_x = img_width as f32 / 2.0;
    let center_y = img_height as f32 / 2.0;

    let mut best_index = 0;
    let mut best_score = f32::NEG_INFINITY;
    for (index, detection) in detections.iter().enumerate() {
        let (cx, cy) = detection.bbox.center();
        let offset_squared = (cx - center_x).powi(2) + (cy - center_y).powi(2);
        let score = 2.0f32.mul_add(-offset_squared, detection.bbox.area());
        if score > best_score {
            best_index = index;
            best_score = score;
        }
    }
    Some(best_index)
}
