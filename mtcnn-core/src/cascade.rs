//! Three-stage cascade driver.
//!
//! Runs the proposal network over an image pyramid, then funnels surviving
//! candidates through the refinement and final classification networks.
//! Each stage filters by score threshold and non-maximum suppression; box
//! regression and re-squaring happen between stages so the fixed-size patch
//! inputs stay undistorted.

use anyhow::Result;
use image::RgbImage;
use log::Level;

use mtcnn_utils::config::DetectionSettings;
use mtcnn_utils::timing_guard;

use crate::detection::{
    BoundingBox, Detection, Landmark, SuppressionMode, non_max_suppression,
};
use crate::preprocess::{image_tensor, patch_batch, scale_image};
use crate::stages::{CascadeStages, ProposalOutput};

/// Default minimum detectable face size in pixels.
pub const DEFAULT_MIN_FACE_SIZE: u32 = 20;
/// Default per-stage score thresholds (proposal, refinement, output).
pub const DEFAULT_THRESHOLDS: [f32; 3] = [0.6, 0.7, 0.7];
/// Default pyramid downscale factor.
pub const DEFAULT_SCALE_FACTOR: f32 = 0.709;

/// Receptive cell of the proposal network in pixels.
const CELL_SIZE: f32 = 12.0;
/// Stride of the proposal map relative to its input.
const CELL_STRIDE: f32 = 2.0;

/// Patch side length fed to the refinement network.
const REFINE_PATCH: u32 = 24;
/// Patch side length fed to the final classification network.
const OUTPUT_PATCH: u32 = 48;

const PER_SCALE_NMS: f32 = 0.5;
const CROSS_SCALE_NMS: f32 = 0.7;
const REFINE_NMS: f32 = 0.7;
const FINAL_NMS: f32 = 0.7;

/// Top-level detection parameters of the cascade.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorConfig {
    /// Minimum detectable face size in pixels; drives the pyramid depth.
    pub min_face_size: u32,
    /// Score thresholds for the proposal, refinement and output stages.
    pub thresholds: [f32; 3],
    /// Pyramid downscale factor, strictly between 0 and 1.
    pub scale_factor: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_face_size: DEFAULT_MIN_FACE_SIZE,
            thresholds: DEFAULT_THRESHOLDS,
            scale_factor: DEFAULT_SCALE_FACTOR,
        }
    }
}

impl From<DetectionSettings> for DetectorConfig {
    fn from(settings: DetectionSettings) -> Self {
        DetectorConfig {
            min_face_size: settings.min_face_size,
            thresholds: settings.thresholds,
            scale_factor: settings.scale_factor,
        }
    }
}

impl From<&DetectionSettings> for DetectorConfig {
    fn from(settings: &DetectionSettings) -> Self {
        settings.clone().into()
    }
}

/// A box surviving some stage of the cascade, with the regression offsets
/// produced alongside it.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    bbox: BoundingBox,
    score: f32,
    reg: [f32; 4],
}

/// Cascaded face detector: stage networks plus detection parameters.
///
/// The detector is an explicitly constructed value passed by reference into
/// the pipeline; independent instances can coexist (test isolation, one per
/// worker). Detection is deterministic for a fixed image and configuration.
#[derive(Debug)]
pub struct MtcnnDetector<S> {
    stages: S,
    config: DetectorConfig,
}

impl<S: CascadeStages> MtcnnDetector<S> {
    /// Construct a detector from a stage backend and configuration.
    pub fn new(stages: S, config: DetectorConfig) -> Self {
        Self { stages, config }
    }

    /// Construct a detector with the default MTCNN parameters.
    pub fn with_defaults(stages: S) -> Self {
        Self::new(stages, DetectorConfig::default())
    }

    /// Access the detection configuration.
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Detect faces in a 3-channel image.
    ///
    /// Returns every face surviving all three stages, in no guaranteed
    /// order. An image too small for the pyramid, or one where any stage
    /// filters out every candidate, yields an empty vector.
    pub fn detect(&self, image: &RgbImage) -> Result<Vec<Detection>> {
        let _guard = timing_guard("mtcnn_core::detect", Level::Debug);

        let candidates = self.proposal_stage(image)?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let candidates = self.refine_stage(image, candidates)?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        self.final_stage(image, candidates)
    }

    /// Stage one: proposal network over the image pyramid.
    fn proposal_stage(&self, image: &RgbImage) -> Result<Vec<Candidate>> {
        let min_side = image.width().min(image.height()) as f32;
        let scales = scale_pyramid(min_side, self.config.min_face_size, self.config.scale_factor);

        let mut collected: Vec<Candidate> = Vec::new();
        for scale in scales {
            let level = scale_image(image, scale);
            if level.width() < CELL_SIZE as u32 || level.height() < CELL_SIZE as u32 {
                continue;
            }
            let maps = self.stages.propose(&image_tensor(&level))?;
            let candidates = generate_candidates(&maps, scale, self.config.thresholds[0]);
            collected.extend(suppress(candidates, PER_SCALE_NMS, SuppressionMode::Union));
        }

        if collected.is_empty() {
            return Ok(Vec::new());
        }

        let survivors = suppress(collected, CROSS_SCALE_NMS, SuppressionMode::Union);
        Ok(regress_and_square(survivors))
    }

    /// Stage two: refinement network over 24x24 candidate patches.
    fn refine_stage(&self, image: &RgbImage, candidates: Vec<Candidate>) -> Result<Vec<Candidate>> {
        let boxes: Vec<BoundingBox> = candidates.iter().map(|c| c.bbox).collect();
        let batch = patch_batch(image, &boxes, REFINE_PATCH);
        let output = self.stages.refine(&batch)?;
        anyhow::ensure!(
            output.scores.len() == candidates.len() && output.regs.dim() == (candidates.len(), 4),
            "refinement output shape mismatch: {} candidates, {} scores",
            candidates.len(),
            output.scores.len()
        );

        let threshold = self.config.thresholds[1];
        let mut kept: Vec<Candidate> = Vec::new();
        for (index, candidate) in candidates.iter().enumerate() {
            let score = output.scores[index];
            if score <= threshold {
                continue;
            }
            kept.push(Candidate {
                bbox: candidate.bbox,
                score,
                reg: [
                    output.regs[(index, 0)],
                    output.regs[(index, 1)],
                    output.regs[(index, 2)],
                    output.regs[(index, 3)],
                ],
            });
        }

        let survivors = suppress(kept, REFINE_NMS, SuppressionMode::Union);
        Ok(regress_and_square(survivors))
    }

    /// Stage three: final classification over 48x48 patches, producing
    /// landmarks and the regressed output boxes.
    fn final_stage(&self, image: &RgbImage, candidates: Vec<Candidate>) -> Result<Vec<Detection>> {
        let boxes: Vec<BoundingBox> = candidates.iter().map(|c| c.bbox).collect();
        let batch = patch_batch(image, &boxes, OUTPUT_PATCH);
        let output = self.stages.finalize(&batch)?;
        anyhow::ensure!(
            output.scores.len() == candidates.len()
                && output.regs.dim() == (candidates.len(), 4)
                && output.landmarks.dim() == (candidates.len(), 10),
            "final stage output shape mismatch for {} candidates",
            candidates.len()
        );

        let threshold = self.config.thresholds[2];
        let mut detections: Vec<Detection> = Vec::new();
        for (index, candidate) in candidates.iter().enumerate() {
            let score = output.scores[index];
            if score <= threshold {
                continue;
            }

            // Landmarks are anchored on the candidate box before regression
            // is applied to it.
            let width = candidate.bbox.width();
            let height = candidate.bbox.height();
            let mut landmarks = [Landmark { x: 0.0, y: 0.0 }; 5];
            for (point, landmark) in landmarks.iter_mut().enumerate() {
                landmark.x = output.landmarks[(index, point)].mul_add(width, candidate.bbox.x1);
                landmark.y =
                    output.landmarks[(index, point + 5)].mul_add(height, candidate.bbox.y1);
            }

            let reg = [
                output.regs[(index, 0)],
                output.regs[(index, 1)],
                output.regs[(index, 2)],
                output.regs[(index, 3)],
            ];
            detections.push(Detection {
                bbox: candidate.bbox.adjusted(reg),
                score,
                landmarks: Some(landmarks),
            });
        }

        if detections.len() > 1 {
            let boxes: Vec<BoundingBox> = detections.iter().map(|d| d.bbox).collect();
            let scores: Vec<f32> = detections.iter().map(|d| d.score).collect();
            let keep = non_max_suppression(&boxes, &scores, FINAL_NMS, SuppressionMode::Min);
            detections = keep.into_iter().map(|i| detections[i].clone()).collect();
        }

        Ok(detections)
    }
}

/// Pyramid scales for an image with shorter side `min_side`.
///
/// The first scale maps a face of `min_face_size` pixels onto the proposal
/// cell; each following level shrinks by `factor` until the scaled shorter
/// side falls below the cell size.
fn scale_pyramid(min_side: f32, min_face_size: u32, factor: f32) -> Vec<f32> {
    let base = CELL_SIZE / min_face_size.max(1) as f32;
    let mut scales = Vec::new();
    let mut remaining = min_side * base;
    let mut level = 0i32;
    while remaining >= CELL_SIZE {
        scales.push(base * factor.powi(level));
        remaining *= factor;
        level += 1;
    }
    scales
}

/// Convert proposal maps into candidate boxes in original image coordinates.
fn generate_candidates(maps: &ProposalOutput, scale: f32, threshold: f32) -> Vec<Candidate> {
    let (rows, cols) = maps.probs.dim();
    debug_assert_eq!(maps.regs.dim(), (4, rows, cols));

    let mut candidates = Vec::new();
    for row in 0..rows {
        for col in 0..cols {
            let score = maps.probs[(row, col)];
            if score < threshold {
                continue;
            }
            let x1 = ((CELL_STRIDE * col as f32 + 1.0) / scale).floor();
            let y1 = ((CELL_STRIDE * row as f32 + 1.0) / scale).floor();
            let x2 = ((CELL_STRIDE * col as f32 + CELL_SIZE) / scale).floor();
            let y2 = ((CELL_STRIDE * row as f32 + CELL_SIZE) / scale).floor();
            candidates.push(Candidate {
                bbox: BoundingBox { x1, y1, x2, y2 },
                score,
                reg: [
                    maps.regs[(0, row, col)],
                    maps.regs[(1, row, col)],
                    maps.regs[(2, row, col)],
                    maps.regs[(3, row, col)],
                ],
            });
        }
    }
    candidates
}

/// Apply NMS to a candidate list, keeping score order.
fn suppress(candidates: Vec<Candidate>, threshold: f32, mode: SuppressionMode) -> Vec<Candidate> {
    if candidates.len() <= 1 {
        return candidates;
    }
    let boxes: Vec<BoundingBox> = candidates.iter().map(|c| c.bbox).collect();
    let scores: Vec<f32> = candidates.iter().map(|c| c.score).collect();
    non_max_suppression(&boxes, &scores, threshold, mode)
        .into_iter()
        .map(|i| candidates[i])
        .collect()
}

/// Apply the stage regression to each box and re-square it, consuming the
/// stored offsets.
fn regress_and_square(candidates: Vec<Candidate>) -> Vec<Candidate> {
    candidates
        .into_iter()
        .map(|c| Candidate {
            bbox: c.bbox.adjusted(c.reg).to_square(),
            score: c.score,
            reg: [0.0; 4],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SyntheticStages;
    use image::Rgb;
    use ndarray::{Array2, Array3};

    fn bright_image(width: u32, height: u32) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb([230, 230, 230]))
    }

    #[test]
    fn pyramid_starts_at_cell_over_min_face_and_shrinks_monotonically() {
        let scales = scale_pyramid(250.0, 20, 0.709);
        assert!(!scales.is_empty());
        assert!((scales[0] - 12.0 / 20.0).abs() < 1e-6);
        for pair in scales.windows(2) {
            assert!(pair[1] < pair[0]);
        }
        // Smallest level still leaves the shorter side at or above the cell.
        let last = *scales.last().unwrap();
        assert!(250.0 * last >= 12.0);
        assert!(250.0 * last * 0.709 < 12.0);
    }

    #[test]
    fn pyramid_is_empty_for_images_smaller_than_a_face() {
        assert!(scale_pyramid(10.0, 20, 0.709).is_empty());
    }

    #[test]
    fn candidates_come_from_cells_above_threshold() {
        let mut probs = Array2::<f32>::zeros((3, 4));
        probs[(1, 2)] = 0.9;
        probs[(2, 0)] = 0.4;
        let mut regs = Array3::<f32>::zeros((4, 3, 4));
        regs[(0, 1, 2)] = 0.1;

        let maps = ProposalOutput { probs, regs };
        let candidates = generate_candidates(&maps, 0.5, 0.6);
        assert_eq!(candidates.len(), 1);

        let candidate = &candidates[0];
        // Cell (row 1, col 2) at scale 0.5: x1 = floor((2*2+1)/0.5) = 10.
        assert_eq!(candidate.bbox.x1, 10.0);
        assert_eq!(candidate.bbox.y1, 6.0);
        assert_eq!(candidate.bbox.x2, 32.0);
        assert_eq!(candidate.bbox.y2, 28.0);
        assert_eq!(candidate.reg[0], 0.1);
        assert_eq!(candidate.score, 0.9);
    }

    #[test]
    fn detect_finds_faces_in_bright_images() {
        let detector = MtcnnDetector::with_defaults(SyntheticStages::detecting());
        let detections = detector.detect(&bright_image(120, 100)).expect("detect");
        assert!(!detections.is_empty());
        for detection in &detections {
            assert!(detection.score > 0.7);
            assert!(detection.bbox.width() > 0.0);
            assert!(detection.bbox.height() > 0.0);
            assert!(detection.landmarks.is_some());
        }
    }

    #[test]
    fn detect_returns_empty_for_dark_images() {
        let detector = MtcnnDetector::with_defaults(SyntheticStages::detecting());
        let image = RgbImage::from_pixel(120, 100, Rgb([10, 10, 10]));
        let detections = detector.detect(&image).expect("detect");
        assert!(detections.is_empty());
    }

    #[test]
    fn detect_returns_empty_when_every_stage_scores_low() {
        let detector = MtcnnDetector::with_defaults(SyntheticStages::blind());
        let detections = detector.detect(&bright_image(120, 100)).expect("detect");
        assert!(detections.is_empty());
    }

    #[test]
    fn detect_is_deterministic_for_fixed_inputs() {
        let detector = MtcnnDetector::with_defaults(SyntheticStages::detecting());
        let image = bright_image(90, 110);
        let first = detector.detect(&image).expect("detect");
        let second = detector.detect(&image).expect("detect");
        assert_eq!(first, second);
    }

    #[test]
    fn tiny_images_yield_no_detections() {
        let detector = MtcnnDetector::with_defaults(SyntheticStages::detecting());
        let detections = detector.detect(&bright_image(8, 8)).expect("detect");
        assert!(detections.is_empty());
    }

    #[test]
    fn config_converts_from_settings() {
        let settings = DetectionSettings {
            min_face_size: 32,
            thresholds: [0.5, 0.6, 0.8],
            scale_factor: 0.6,
        };
        let config: DetectorConfig = (&settings).into();
        assert_eq!(config.min_face_size, 32);
        assert_eq!(config.thresholds, [0.5, 0.6, 0.8]);
        assert_eq!(config.scale_factor, 0.6);
    }
}
