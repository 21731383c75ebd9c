/// Common utilities for CLI integration tests.
use std::{fs, path::Path, path::PathBuf};

use image::{Rgb, RgbImage};

/// Locate a directory holding the three stage networks, if any.
///
/// Integration tests that need real weights skip themselves when this
/// returns `None`.
pub fn find_model_dir() -> Option<PathBuf> {
    let candidates = vec!["models", "../models"];
    candidates
        .into_iter()
        .map(PathBuf::from)
        .find(|dir| dir.join("det1.onnx").exists())
}

/// Create `<input_dir>/<class>/<name>` as a small solid-color image.
#[allow(dead_code)]
pub fn seed_image(input_dir: &Path, class: &str, name: &str, value: u8) {
    let class_dir = input_dir.join(class);
    fs::create_dir_all(&class_dir).expect("create class dir");
    RgbImage::from_pixel(64, 64, Rgb([value, value, value]))
        .save(class_dir.join(name))
        .expect("save seed image");
}
