//! Shared configuration types consumed across the MTCNN alignment workspace.
//!
//! These structures provide a common representation for cascade detection and
//! thumbnail settings that can be serialized to disk and overridden from the
//! command line.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Detection parameters mirroring the canonical MTCNN defaults.
///
/// These settings control the image pyramid and the per-stage score filtering
/// of the cascade.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectionSettings {
    /// Minimum detectable face size in pixels.
    pub min_face_size: u32,
    /// Score thresholds for the proposal, refinement and output stages.
    pub thresholds: [f32; 3],
    /// Pyramid downscale factor, strictly between 0 and 1.
    pub scale_factor: f32,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            min_face_size: 20,
            thresholds: [0.6, 0.7, 0.7],
            scale_factor: 0.709,
        }
    }
}

/// Settings for the thumbnail written per aligned face.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ThumbnailSettings {
    /// Output size (height and width) in pixels.
    pub image_size: u32,
    /// Extra pixels around the detected box, split across both sides.
    pub margin: u32,
}

impl Default for ThumbnailSettings {
    fn default() -> Self {
        Self {
            image_size: 182,
            margin: 12,
        }
    }
}

/// Persistent application settings consumed by the CLI.
///
/// This struct aggregates all user-configurable parameters, allowing them to
/// be loaded from and saved to a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct AppSettings {
    /// Optional override for the directory holding the stage network weights.
    /// If `None`, the CLI default is used.
    pub model_dir: Option<String>,
    /// The parameters for cascade detection.
    pub detection: DetectionSettings,
    /// The parameters for thumbnail extraction.
    pub thumbnail: ThumbnailSettings,
}

impl AppSettings {
    /// Load settings from a JSON file.
    ///
    /// If the file does not exist or cannot be parsed, an error is returned.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        let settings: AppSettings = serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse settings JSON at {}", path.display()))?;
        Ok(settings)
    }

    /// Serialize settings to disk in pretty-printed JSON.
    ///
    /// This will overwrite the file if it already exists.
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let payload =
            serde_json::to_string_pretty(self).context("failed to serialize settings JSON")?;
        fs::write(path, payload)
            .with_context(|| format!("failed to write settings file {}", path.display()))?;
        Ok(())
    }

    /// Resolve the model directory, falling back to `default` when unset.
    pub fn model_dir_or<P: AsRef<Path>>(&self, default: P) -> PathBuf {
        self.model_dir
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| default.as_ref().to_path_buf())
    }
}
