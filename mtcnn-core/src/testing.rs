//! Deterministic stage stubs for exercising the cascade without weights.
//!
//! [`SyntheticStages`] answers like a trained backend on synthetic inputs:
//! bright images (positive mean after normalization) produce constant-score
//! detections everywhere, dark images produce none. This keeps pipeline and
//! walker tests independent of model files.

use anyhow::Result;
use ndarray::{Array1, Array2, Array3, Array4, s};

use crate::stages::{CascadeStages, FinalOutput, ProposalOutput, RefineOutput};

/// Stage backend with fixed per-stage scores, gated on input brightness.
#[derive(Debug, Clone, Copy)]
pub struct SyntheticStages {
    /// Score reported by the proposal network for bright inputs.
    pub proposal_score: f32,
    /// Score reported by the refinement network for bright inputs.
    pub refine_score: f32,
    /// Score reported by the final network for bright inputs.
    pub final_score: f32,
}

impl SyntheticStages {
    /// A backend that detects faces in every bright image.
    pub fn detecting() -> Self {
        Self {
            proposal_score: 0.9,
            refine_score: 0.92,
            final_score: 0.95,
        }
    }

    /// A backend that never crosses any stage threshold.
    pub fn blind() -> Self {
        Self {
            proposal_score: 0.0,
            refine_score: 0.0,
            final_score: 0.0,
        }
    }

    fn gate(&self, mean: f32, score: f32) -> f32 {
        if mean > 0.0 { score } else { 0.0 }
    }
}

impl CascadeStages for SyntheticStages {
    fn propose(&self, input: &Array4<f32>) -> Result<ProposalOutput> {
        let shape = input.shape();
        anyhow::ensure!(
            shape[0] == 1 && shape[1] == 3 && shape[2] >= 12 && shape[3] >= 12,
            "proposal input must be (1, 3, h>=12, w>=12), got {:?}",
            shape
        );
        let rows = (shape[2] - 12) / 2 + 1;
        let cols = (shape[3] - 12) / 2 + 1;
        let mean = input.mean().unwrap_or(-1.0);
        Ok(ProposalOutput {
            probs: Array2::from_elem((rows, cols), self.gate(mean, self.proposal_score)),
            regs: Array3::zeros((4, rows, cols)),
        })
    }

    fn refine(&self, batch: &Array4<f32>) -> Result<RefineOutput> {
        let n = batch.shape()[0];
        let mut scores = Array1::<f32>::zeros(n);
        for index in 0..n {
            let mean = batch.slice(s![index, .., .., ..]).mean().unwrap_or(-1.0);
            scores[index] = self.gate(mean, self.refine_score);
        }
        Ok(RefineOutput {
            scores,
            regs: Array2::zeros((n, 4)),
        })
    }

    fn finalize(&self, batch: &Array4<f32>) -> Result<FinalOutput> {
        let n = batch.shape()[0];
        let mut scores = Array1::<f32>::zeros(n);
        for index in 0..n {
            let mean = batch.slice(s![index, .., .., ..]).mean().unwrap_or(-1.0);
            scores[index] = self.gate(mean, self.final_score);
        }
        Ok(FinalOutput {
            scores,
            regs: Array2::zeros((n, 4)),
            landmarks: Array2::from_elem((n, 10), 0.5),
        })
    }
}
