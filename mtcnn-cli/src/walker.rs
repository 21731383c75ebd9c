//! Dataset walking and per-image orchestration.
//!
//! Iterates classes and image paths in a freshly shuffled order every run,
//! skips work whose output already exists, and funnels each remaining image
//! through detection, selection, crop geometry and thumbnail persistence.
//! Every per-image condition is recovered locally; only failures to create
//! the output tree abort the run.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::{debug, info, warn};
use rand::{Rng, seq::SliceRandom};

use mtcnn_core::preprocess::to_rgb;
use mtcnn_core::stages::CascadeStages;
use mtcnn_core::{
    MtcnnDetector, expanded_crop, render_thumbnail, select_primary, write_thumbnail,
};
use mtcnn_utils::ImageClass;

/// Thumbnail parameters for one run.
#[derive(Debug, Clone, Copy)]
pub struct AlignOptions {
    /// Output size (height and width) in pixels.
    pub image_size: u32,
    /// Extra pixels around the detected box, split across both sides.
    pub margin: u32,
}

/// Per-run accumulators, reset every run and recomputed on resume.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunCounters {
    /// Images seen.
    pub total: u64,
    /// Images newly aligned this run.
    pub aligned: u64,
    /// Images whose thumbnail already existed.
    pub prealigned: u64,
    /// Images where no face survived the cascade (or the crop collapsed).
    pub no_face: u64,
    /// Images that could not be decoded or detected on.
    pub failed: u64,
}

/// What happened to a single image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageOutcome {
    /// A thumbnail was written.
    Aligned,
    /// The destination already existed; nothing was touched.
    AlreadyAligned,
    /// The cascade found no face, or the crop rectangle collapsed.
    NoFace,
    /// The image could not be decoded or the detector backend errored.
    Failed,
}

/// Walk the dataset and align every image, resumably.
///
/// Classes and per-class image paths are shuffled in place with `rng`, so
/// repeated interrupted runs diversify partial progress instead of always
/// processing the same prefix. The final output set does not depend on the
/// order.
pub fn align_dataset<S: CascadeStages, R: Rng>(
    detector: &MtcnnDetector<S>,
    classes: &mut [ImageClass],
    output_dir: &Path,
    options: &AlignOptions,
    rng: &mut R,
) -> Result<RunCounters> {
    let mut counters = RunCounters::default();

    classes.shuffle(rng);
    for class in classes.iter_mut() {
        let class_dir = output_dir.join(&class.name);
        fs::create_dir_all(&class_dir)
            .with_context(|| format!("failed to create class directory {}", class_dir.display()))?;

        class.image_paths.shuffle(rng);
        for image_path in &class.image_paths {
            counters.total += 1;
            let Some(destination) = destination_path(&class_dir, image_path) else {
                warn!("skipping image with unusable name: {}", image_path.display());
                counters.failed += 1;
                continue;
            };

            match process_image(detector, image_path, &destination, options) {
                ImageOutcome::Aligned => {
                    counters.aligned += 1;
                    info!("{}", image_path.display());
                }
                ImageOutcome::AlreadyAligned => counters.prealigned += 1,
                ImageOutcome::NoFace => {
                    counters.no_face += 1;
                    warn!("Unable to align {}", image_path.display());
                }
                ImageOutcome::Failed => counters.failed += 1,
            }
        }
    }

    Ok(counters)
}

/// Destination `<class_dir>/<stem>.png` for an input image.
fn destination_path(class_dir: &Path, image_path: &Path) -> Option<PathBuf> {
    let stem = image_path.file_stem()?.to_str()?;
    Some(class_dir.join(format!("{stem}.png")))
}

/// Run one image through the pipeline.
///
/// All conditions are local to the image: the caller keeps walking
/// regardless of the outcome.
pub fn process_image<S: CascadeStages>(
    detector: &MtcnnDetector<S>,
    image_path: &Path,
    destination: &Path,
    options: &AlignOptions,
) -> ImageOutcome {
    // Fast resumability path: no decode, no detection.
    if destination.exists() {
        return ImageOutcome::AlreadyAligned;
    }

    let image = match image::open(image_path) {
        Ok(image) => image,
        Err(err) => {
            warn!("{}: {err}", image_path.display());
            return ImageOutcome::Failed;
        }
    };
    let rgb = to_rgb(&image);

    let detections = match detector.detect(&rgb) {
        Ok(detections) => detections,
        Err(err) => {
            warn!("detection failed for {}: {err:#}", image_path.display());
            return ImageOutcome::Failed;
        }
    };

    let Some(index) = select_primary(&detections, rgb.width(), rgb.height()) else {
        return ImageOutcome::NoFace;
    };

    let Some(rect) = expanded_crop(
        &detections[index].bbox,
        rgb.width(),
        rgb.height(),
        options.margin,
    ) else {
        debug!("crop collapsed to zero area for {}", image_path.display());
        return ImageOutcome::NoFace;
    };

    let thumbnail = render_thumbnail(&image, rect, options.image_size);
    match write_thumbnail(destination, &thumbnail) {
        Ok(true) => ImageOutcome::Aligned,
        Ok(false) => ImageOutcome::AlreadyAligned,
        Err(err) => {
            warn!("{}: {err:#}", destination.display());
            ImageOutcome::Failed
        }
    }
}
