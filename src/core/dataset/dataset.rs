use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{CurationError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetSplit {
    Train,
    Val,
    Test,
}

impl DatasetSplit {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetSplit::Train => "train",
            DatasetSplit::Val => "val",
            DatasetSplit::Test => "test",
        }
    }

    pub fn all() -> [DatasetSplit; 3] {
        [DatasetSplit::Train, DatasetSplit::Val, DatasetSplit::Test]
    }
}

/// One image file and the class it belongs to.
///
/// Samples only reference file content; the pipeline reads them and writes
/// derived copies elsewhere, it never touches the source file.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub path: PathBuf,
    pub label: String,
}

impl Sample {
    pub fn new(path: PathBuf, label: impl Into<String>) -> Self {
        Self {
            path,
            label: label.into(),
        }
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Class directory with the samples found inside it.
#[derive(Debug, Clone)]
pub struct ClassDirectory {
    pub label: String,
    pub path: PathBuf,
    pub samples: Vec<Sample>,
}

impl ClassDirectory {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Check a file name against the accepted extensions, ignoring case.
///
/// Extensions may be given with or without the leading dot.
pub fn has_accepted_extension(path: &Path, extensions: &[String]) -> bool {
    let Some(ext) = path.extension() else {
        return false;
    };
    let ext = ext.to_string_lossy().to_lowercase();
    extensions
        .iter()
        .any(|accepted| accepted.trim_start_matches('.').to_lowercase() == ext)
}

/// List the class directories directly below `root`, sorted by name.
pub fn list_class_labels(root: &Path) -> Result<Vec<String>> {
    let entries = fs::read_dir(root).map_err(|e| CurationError::io(root, e))?;

    let mut labels = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            // Split roots and hidden dirs are not classes
            if name.starts_with('.') {
                continue;
            }
            labels.push(name.to_string());
        }
    }

    // Sort for consistent ordering
    labels.sort();
    Ok(labels)
}

/// Collect every accepted image file in a class directory, sorted by path.
///
/// A missing or unreadable directory yields an empty list.
pub fn list_images(class_dir: &Path, extensions: &[String]) -> Vec<PathBuf> {
    let mut image_files = Vec::new();

    match fs::read_dir(class_dir) {
        Ok(entries) => {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_file() && has_accepted_extension(&path, extensions) {
                    image_files.push(path);
                }
            }
        }
        Err(e) => {
            warn!("Failed to read directory {:?}: {}", class_dir, e);
        }
    }

    image_files.sort();
    image_files
}

/// Enumerate a stage input laid out as `root/<class>/<image>`.
///
/// Fails with [`CurationError::EmptyInput`] when the root is missing or has
/// no class directories at all; empty class directories are kept.
pub fn load_classes(root: &Path, extensions: &[String]) -> Result<Vec<ClassDirectory>> {
    if !root.is_dir() {
        return Err(CurationError::EmptyInput(root.to_path_buf()));
    }

    let labels = list_class_labels(root)?;
    if labels.is_empty() {
        return Err(CurationError::EmptyInput(root.to_path_buf()));
    }

    info!("Reading {} classes from: {:?}", labels.len(), root);

    let classes = labels
        .into_iter()
        .map(|label| {
            let path = root.join(&label);
            let samples = list_images(&path, extensions)
                .into_iter()
                .map(|p| Sample::new(p, label.clone()))
                .collect::<Vec<_>>();
            debug!("Class {}: found {} images", label, samples.len());
            ClassDirectory {
                label,
                path,
                samples,
            }
        })
        .collect();

    Ok(classes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exts() -> Vec<String> {
        vec![".jpg".to_string(), "png".to_string()]
    }

    #[test]
    fn test_accepted_extension_is_case_insensitive() {
        assert!(has_accepted_extension(Path::new("a/b.JPG"), &exts()));
        assert!(has_accepted_extension(Path::new("a/b.png"), &exts()));
        assert!(!has_accepted_extension(Path::new("a/b.gif"), &exts()));
        assert!(!has_accepted_extension(Path::new("a/noext"), &exts()));
    }

    #[test]
    fn test_load_classes_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("rust")).unwrap();
        fs::create_dir_all(root.join("healthy")).unwrap();
        fs::create_dir_all(root.join("empty")).unwrap();
        fs::write(root.join("rust/b.jpg"), b"x").unwrap();
        fs::write(root.join("rust/a.PNG"), b"x").unwrap();
        fs::write(root.join("rust/notes.txt"), b"x").unwrap();
        fs::write(root.join("healthy/c.jpg"), b"x").unwrap();
        fs::write(root.join("stats.json"), b"{}").unwrap();

        let classes = load_classes(root, &exts()).unwrap();
        let labels: Vec<_> = classes.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec!["empty", "healthy", "rust"]);

        let rust = &classes[2];
        assert_eq!(rust.len(), 2);
        assert_eq!(rust.samples[0].file_name(), "a.PNG");
        assert_eq!(rust.samples[1].file_name(), "b.jpg");
        assert!(classes[0].is_empty());
    }

    #[test]
    fn test_load_classes_rejects_empty_root() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_classes(dir.path(), &exts()),
            Err(CurationError::EmptyInput(_))
        ));
        assert!(matches!(
            load_classes(&dir.path().join("missing"), &exts()),
            Err(CurationError::EmptyInput(_))
        ));
    }

    #[test]
    fn test_split_names() {
        let names: Vec<_> = DatasetSplit::all().iter().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["train", "val", "test"]);
    }
}
