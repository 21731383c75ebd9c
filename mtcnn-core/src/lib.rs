//! Core MTCNN detection and alignment primitives.
//!
//! This crate runs the three-stage face detection cascade through a fixed
//! functional stage interface (with an ONNX-backed implementation via
//! `tract-onnx`), and provides the selection, crop-geometry and thumbnail
//! helpers that turn detections into fixed-size face crops.

/// Three-stage cascade driver over an image pyramid.
pub mod cascade;
/// Crop-rectangle computation with margin expansion and clamping.
pub mod cropper;
/// Detection results, bounding boxes and non-maximum suppression.
pub mod detection;
/// ONNX stage-network loading and execution.
pub mod model;
/// Image normalization, pyramid scaling and tensor conversion.
pub mod preprocess;
/// Primary-face selection among multiple detections.
pub mod selection;
/// Deterministic stage stubs for exercising the cascade without weights.
pub mod testing;
/// Thumbnail rendering and idempotent persistence.
pub mod thumbnail;

/// Stage-network contract implemented by cascade backends.
pub mod stages;

pub use cascade::{DetectorConfig, MtcnnDetector};
pub use cropper::{CropRect, expanded_crop};
pub use detection::{BoundingBox, Detection, Landmark, SuppressionMode, non_max_suppression};
pub use model::OnnxStages;
pub use selection::select_primary;
pub use stages::{CascadeStages, FinalOutput, ProposalOutput, RefineOutput};
pub use thumbnail::{render_thumbnail, write_thumbnail};

/// Returns the crate version for diagnostics.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
