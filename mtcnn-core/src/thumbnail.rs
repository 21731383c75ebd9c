//! Thumbnail rendering and idempotent persistence.
//!
//! Crops the selected region out of the source image, resamples it to a
//! fixed square size with bilinear filtering, and writes it as a lossless
//! PNG. Writes are create-if-absent: an existing thumbnail is never
//! overwritten, which makes interrupted dataset runs resumable.

use std::{
    fs::OpenOptions,
    io::{self, BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat, imageops::FilterType};

use crate::cropper::CropRect;

/// Crop `rect` out of `image` and resample it to `size`x`size`, bilinear.
///
/// Channel depth and order follow the source image; no color conversion is
/// applied here.
pub fn render_thumbnail(image: &DynamicImage, rect: CropRect, size: u32) -> DynamicImage {
    let cropped = image.crop_imm(rect.left, rect.top, rect.width(), rect.height());
    cropped.resize_exact(size, size, FilterType::Triangle)
}

/// Write `thumbnail` to `path` as PNG, unless the file already exists.
///
/// Returns `Ok(true)` when the file was created and `Ok(false)` when a
/// thumbnail was already present. The existence check and creation are a
/// single atomic `create_new` open, so two concurrent writers cannot both
/// claim the same destination.
pub fn write_thumbnail<P: AsRef<Path>>(path: P, thumbnail: &DynamicImage) -> Result<bool> {
    let path = path.as_ref();
    let file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to create thumbnail {}", path.display()));
        }
    };

    let mut writer = BufWriter::new(file);
    thumbnail
        .write_to(&mut writer, ImageFormat::Png)
        .with_context(|| format!("failed to encode thumbnail {}", path.display()))?;
    writer
        .flush()
        .with_context(|| format!("failed to flush thumbnail {}", path.display()))?;
    Ok(true)
}
