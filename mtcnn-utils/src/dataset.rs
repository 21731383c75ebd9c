//! Labeled dataset enumeration.
//!
//! A dataset is a directory of class subdirectories, each holding the images
//! of one identity. Enumeration is deterministic (sorted); the per-run
//! shuffle is applied by the caller so repeated runs diversify their order.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

/// File extensions accepted as dataset images.
pub const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

/// One class of the dataset: a label and the image paths below it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageClass {
    /// Class label, unique within a dataset snapshot (the directory name).
    pub name: String,
    /// Paths of the images belonging to this class.
    pub image_paths: Vec<PathBuf>,
}

/// Returns `true` when the path carries a recognized image extension.
pub fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Enumerate the class subdirectories of `input_dir` and their images.
///
/// Classes and image paths are returned sorted by name. Non-directory
/// entries at the top level and non-image files inside classes are ignored.
pub fn load_dataset<P: AsRef<Path>>(input_dir: P) -> Result<Vec<ImageClass>> {
    let input_dir = input_dir.as_ref();
    anyhow::ensure!(
        input_dir.is_dir(),
        "input path is not a directory: {}",
        input_dir.display()
    );

    let mut classes = Vec::new();
    for entry in fs::read_dir(input_dir)
        .with_context(|| format!("failed to read dataset directory {}", input_dir.display()))?
    {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        let image_paths = class_images(&entry.path())?;
        classes.push(ImageClass { name, image_paths });
    }

    classes.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(classes)
}

fn class_images(class_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut images = Vec::new();
    for entry in fs::read_dir(class_dir)
        .with_context(|| format!("failed to read class directory {}", class_dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file() && has_image_extension(&path) {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::write(path, b"x").expect("write file");
    }

    #[test]
    fn recognizes_image_extensions() {
        assert!(has_image_extension(Path::new("a/b/c.JPG")));
        assert!(has_image_extension(Path::new("c.png")));
        assert!(!has_image_extension(Path::new("c.txt")));
        assert!(!has_image_extension(Path::new("noext")));
    }

    #[test]
    fn enumerates_classes_sorted_with_images() {
        let dir = TempDir::new().expect("tempdir");
        for class in ["carol", "alice", "bob"] {
            fs::create_dir(dir.path().join(class)).expect("class dir");
        }
        touch(&dir.path().join("alice/2.jpg"));
        touch(&dir.path().join("alice/1.png"));
        touch(&dir.path().join("alice/notes.txt"));
        touch(&dir.path().join("bob/b.webp"));
        touch(&dir.path().join("stray.jpg"));

        let classes = load_dataset(dir.path()).expect("load");
        let names: Vec<&str> = classes.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["alice", "bob", "carol"]);
        assert_eq!(classes[0].image_paths.len(), 2);
        assert!(classes[0].image_paths[0].ends_with("1.png"));
        assert_eq!(classes[1].image_paths.len(), 1);
        assert!(classes[2].image_paths.is_empty());
    }

    #[test]
    fn missing_input_dir_is_an_error() {
        let dir = TempDir::new().expect("tempdir");
        let missing = dir.path().join("nope");
        assert!(load_dataset(&missing).is_err());
    }
}
