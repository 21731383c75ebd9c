use std::cmp::Ordering;

/// Axis-aligned bounding box in pixel coordinates, `x2 > x1` and `y2 > y1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// The x-coordinate of the left edge.
    pub x1: f32,
    /// The y-coordinate of the top edge.
    pub y1: f32,
    /// The x-coordinate of the right edge.
    pub x2: f32,
    /// The y-coordinate of the bottom edge.
    pub y2: f32,
}

impl BoundingBox {
    /// Width of the box.
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    /// Height of the box.
    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// Area of the box, zero for degenerate rectangles.
    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// Geometric center `(x, y)` of the box.
    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) * 0.5, (self.y1 + self.y2) * 0.5)
    }

    /// Overlap ratio with another box under the given suppression mode.
    ///
    /// `Union` divides the intersection by the union area (IoU); `Min`
    /// divides by the smaller of the two areas, which suppresses boxes
    /// nested inside larger ones more aggressively.
    pub fn overlap(&self, other: &Self, mode: SuppressionMode) -> f32 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);

        let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        if intersection <= 0.0 {
            return 0.0;
        }

        let denominator = match mode {
            SuppressionMode::Union => self.area() + other.area() - intersection,
            SuppressionMode::Min => self.area().min(other.area()),
        };
        if denominator <= 0.0 {
            0.0
        } else {
            intersection / denominator
        }
    }

    /// Shift each edge by the stage regression offsets, scaled by box size.
    pub fn adjusted(&self, reg: [f32; 4]) -> Self {
        let w = self.width();
        let h = self.height();
        Self {
            x1: reg[0].mul_add(w, self.x1),
            y1: reg[1].mul_add(h, self.y1),
            x2: reg[2].mul_add(w, self.x2),
            y2: reg[3].mul_add(h, self.y2),
        }
    }

    /// Expand the box to a square with side `max(width, height)`, preserving
    /// its center. The cascade squares boxes between stages so the fixed-size
    /// patch inputs are not distorted.
    pub fn to_square(&self) -> Self {
        let side = self.width().max(self.height());
        let (cx, cy) = self.center();
        let half = side * 0.5;
        Self {
            x1: cx - half,
            y1: cy - half,
            x2: cx + half,
            y2: cy + half,
        }
    }
}

/// Denominator used when computing overlap during suppression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressionMode {
    /// Intersection over union.
    Union,
    /// Intersection over the smaller area.
    Min,
}

/// Facial landmark coordinate (x, y) in image space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landmark {
    /// The x-coordinate of the landmark.
    pub x: f32,
    /// The y-coordinate of the landmark.
    pub y: f32,
}

/// A single cascade detection: bounding box, confidence score and, when the
/// output stage produced them, five facial landmarks (right eye, left eye,
/// nose tip, right mouth corner, left mouth corner).
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// The bounding box of the detected face.
    pub bbox: BoundingBox,
    /// The confidence score in `[0, 1]`.
    pub score: f32,
    /// Landmark coordinates when available.
    pub landmarks: Option<[Landmark; 5]>,
}

/// Greedy non-maximum suppression.
///
/// Returns the indices of the retained boxes in descending score order.
/// Boxes whose overlap with an already-retained box exceeds `threshold`
/// are suppressed.
pub fn non_max_suppression(
    boxes: &[BoundingBox],
    scores: &[f32],
    threshold: f32,
    mode: SuppressionMode,
) -> Vec<usize> {
    debug_assert_eq!(boxes.len(), scores.len());

    let mut order: Vec<usize> = (0..boxes.len()).collect();
    order.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(Ordering::Equal)
    });

    let mut keep: Vec<usize> = Vec::with_capacity(order.len());
    for candidate in order {
        let suppressed = keep
            .iter()
            .any(|&kept| boxes[candidate].overlap(&boxes[kept], mode) > threshold);
        if !suppressed {
            keep.push(candidate);
        }
    }
    keep
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bbox(x1: f32, y1: f32, x2: f32, y2: f32) -> BoundingBox {
        BoundingBox { x1, y1, x2, y2 }
    }

    #[test]
    fn area_and_center() {
        let b = bbox(10.0, 20.0, 30.0, 60.0);
        assert_eq!(b.area(), 800.0);
        assert_eq!(b.center(), (20.0, 40.0));
    }

    #[test]
    fn union_overlap_of_disjoint_boxes_is_zero() {
        let a = bbox(0.0, 0.0, 10.0, 10.0);
        let b = bbox(20.0, 20.0, 30.0, 30.0);
        assert_eq!(a.overlap(&b, SuppressionMode::Union), 0.0);
    }

    #[test]
    fn min_overlap_of_nested_box_is_one() {
        let outer = bbox(0.0, 0.0, 100.0, 100.0);
        let inner = bbox(10.0, 10.0, 20.0, 20.0);
        assert!((inner.overlap(&outer, SuppressionMode::Min) - 1.0).abs() < f32::EPSILON);
        assert!(inner.overlap(&outer, SuppressionMode::Union) < 0.05);
    }

    #[test]
    fn regression_offsets_scale_with_box_size() {
        let b = bbox(0.0, 0.0, 10.0, 20.0);
        let adjusted = b.adjusted([0.1, 0.1, -0.1, -0.1]);
        assert!((adjusted.x1 - 1.0).abs() < f32::EPSILON);
        assert!((adjusted.y1 - 2.0).abs() < f32::EPSILON);
        assert!((adjusted.x2 - 9.0).abs() < f32::EPSILON);
        assert!((adjusted.y2 - 18.0).abs() < f32::EPSILON);
    }

    #[test]
    fn to_square_preserves_center_and_longest_side() {
        let b = bbox(0.0, 0.0, 10.0, 30.0);
        let square = b.to_square();
        assert_eq!(square.center(), b.center());
        assert!((square.width() - 30.0).abs() < f32::EPSILON);
        assert!((square.height() - 30.0).abs() < f32::EPSILON);
    }

    #[test]
    fn nms_keeps_highest_scoring_of_overlapping_pair() {
        let boxes = [bbox(0.0, 0.0, 10.0, 10.0), bbox(1.0, 1.0, 11.0, 11.0)];
        let scores = [0.8, 0.9];
        let keep = non_max_suppression(&boxes, &scores, 0.3, SuppressionMode::Union);
        assert_eq!(keep, vec![1]);
    }

    #[test]
    fn nms_keeps_distant_boxes() {
        let boxes = [
            bbox(0.0, 0.0, 10.0, 10.0),
            bbox(50.0, 50.0, 60.0, 60.0),
            bbox(0.5, 0.5, 10.5, 10.5),
        ];
        let scores = [0.9, 0.5, 0.8];
        let keep = non_max_suppression(&boxes, &scores, 0.3, SuppressionMode::Union);
        assert_eq!(keep, vec![0, 1]);
    }
}
