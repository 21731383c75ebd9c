//! The functional contract between the cascade driver and its stage networks.
//!
//! The three-stage cascade reaches its networks exclusively through
//! [`CascadeStages`]: three pure functions, each mapping an image batch to
//! detection tensors. Any conforming backend (different weights, different
//! inference framework) is substitutable without touching the cascade logic.

use anyhow::Result;
use ndarray::{Array1, Array2, Array3, Array4};

/// Output of the proposal network for one pyramid level.
#[derive(Debug, Clone)]
pub struct ProposalOutput {
    /// Face-probability map, shape `(rows, cols)`.
    pub probs: Array2<f32>,
    /// Bounding-box regression map, shape `(4, rows, cols)`.
    pub regs: Array3<f32>,
}

/// Output of the refinement network for a candidate batch.
#[derive(Debug, Clone)]
pub struct RefineOutput {
    /// Per-candidate face probability, shape `(n)`.
    pub scores: Array1<f32>,
    /// Per-candidate bounding-box regression, shape `(n, 4)`.
    pub regs: Array2<f32>,
}

/// Output of the final classification network for a candidate batch.
#[derive(Debug, Clone)]
pub struct FinalOutput {
    /// Per-candidate face probability, shape `(n)`.
    pub scores: Array1<f32>,
    /// Per-candidate bounding-box regression, shape `(n, 4)`.
    pub regs: Array2<f32>,
    /// Per-candidate landmark coordinates, shape `(n, 10)`: five x values
    /// followed by five y values, each normalized to the candidate box.
    pub landmarks: Array2<f32>,
}

/// The three stage networks of the cascade.
///
/// Inputs are NCHW RGB batches with pixel values normalized to
/// `(v - 127.5) * 0.0078125` by the caller. Implementations must be
/// deterministic for fixed inputs: repeated runs over the same dataset
/// must produce identical detections. Scores are probabilities in `[0, 1]`.
pub trait CascadeStages {
    /// Run the fully-convolutional proposal network on a single image of
    /// shape `(1, 3, h, w)` with `h, w >= 12`. The returned maps cover the
    /// input at stride 2 with a 12-pixel cell size.
    fn propose(&self, input: &Array4<f32>) -> Result<ProposalOutput>;

    /// Run the refinement network on a batch of shape `(n, 3, 24, 24)`.
    fn refine(&self, batch: &Array4<f32>) -> Result<RefineOutput>;

    /// Run the final classification network on a batch of shape
    /// `(n, 3, 48, 48)`.
    fn finalize(&self, batch: &Array4<f32>) -> Result<FinalOutput>;
}
