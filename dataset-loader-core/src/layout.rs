//! Discovery of an extracted dataset tree.
//!
//! ```text
//! <data_dir>/
//!   ontology/**/*.json   optional
//!   items/**/*           item binaries
//!   json/**/*.json       annotation sidecars
//! ```
//!
//! Items and sidecars are paired purely by position in their sorted listings. Nothing
//! checks that file stems match; a naming mismatch silently misaligns the pairs.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub const ONTOLOGY_DIR: &str = "ontology";
pub const ITEMS_DIR: &str = "items";
pub const ANNOTATIONS_DIR: &str = "json";

/// One item binary and the sidecar it was paired with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemPair {
    pub item: PathBuf,
    pub annotation: PathBuf,
}

impl ItemPair {
    /// Remote directory for the item: `/` followed by the stem of its parent directory.
    pub fn remote_path(&self) -> String {
        let parent = self
            .item
            .parent()
            .and_then(|p| p.file_stem())
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("/{}", parent)
    }
}

/// What the dataset's `ontology/` directory holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OntologySource {
    /// No ontology directory.
    Absent,
    /// The directory exists but has no JSON file.
    Empty(PathBuf),
    /// First JSON file in sorted order.
    File(PathBuf),
}

#[derive(Debug, Clone)]
pub struct DatasetLayout {
    pub root: PathBuf,
}

impl DatasetLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn ontology_dir(&self) -> PathBuf {
        self.root.join(ONTOLOGY_DIR)
    }

    pub fn ontology_source(&self) -> OntologySource {
        let dir = self.ontology_dir();
        if !dir.exists() {
            debug!(path = %dir.display(), "No ontology directory in dataset");
            return OntologySource::Absent;
        }
        match sorted_files(&dir, Some("json")).into_iter().next() {
            Some(file) => OntologySource::File(file),
            None => OntologySource::Empty(dir),
        }
    }

    pub fn item_files(&self) -> Vec<PathBuf> {
        sorted_files(&self.root.join(ITEMS_DIR), None)
    }

    pub fn annotation_files(&self) -> Vec<PathBuf> {
        sorted_files(&self.root.join(ANNOTATIONS_DIR), Some("json"))
    }

    /// Pair the sorted item listing with the sorted sidecar listing. The shorter
    /// listing bounds the result.
    pub fn pairs(&self) -> Vec<ItemPair> {
        let items = self.item_files();
        let annotations = self.annotation_files();
        if items.len() != annotations.len() {
            warn!(
                items = items.len(),
                annotations = annotations.len(),
                "Item and annotation counts differ; extra files will be skipped"
            );
        }
        let pairs: Vec<ItemPair> = items
            .into_iter()
            .zip(annotations)
            .map(|(item, annotation)| ItemPair { item, annotation })
            .collect();
        info!(root = %self.root.display(), pairs = pairs.len(), "Paired items with annotations");
        pairs
    }
}

/// Every regular file under `dir` (recursively), optionally filtered by extension,
/// in lexicographic path order. A missing directory yields an empty list.
fn sorted_files(dir: &Path, extension: Option<&str>) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable path while listing dataset");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| match extension {
            Some(ext) => path.extension().and_then(|e| e.to_str()) == Some(ext),
            None => true,
        })
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn pairs_by_sorted_position() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("items/images/b.jpg"));
        touch(&root.join("items/images/a.jpg"));
        touch(&root.join("json/images/b.json"));
        touch(&root.join("json/images/a.json"));
        touch(&root.join("json/images/notes.txt"));

        let pairs = DatasetLayout::new(root).pairs();
        assert_eq!(pairs.len(), 2);
        assert!(pairs[0].item.ends_with("a.jpg"));
        assert!(pairs[0].annotation.ends_with("a.json"));
        assert!(pairs[1].item.ends_with("b.jpg"));
        assert!(pairs[1].annotation.ends_with("b.json"));
        assert_eq!(pairs[0].remote_path(), "/images");
    }

    #[test]
    fn shorter_listing_bounds_pairs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("items/x/1.png"));
        touch(&root.join("items/x/2.png"));
        touch(&root.join("json/x/1.json"));

        assert_eq!(DatasetLayout::new(root).pairs().len(), 1);
    }

    #[test]
    fn ontology_discovery() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DatasetLayout::new(dir.path());
        assert_eq!(layout.ontology_source(), OntologySource::Absent);

        fs::create_dir_all(layout.ontology_dir()).unwrap();
        assert_eq!(
            layout.ontology_source(),
            OntologySource::Empty(layout.ontology_dir())
        );

        touch(&layout.ontology_dir().join("nested/labels.json"));
        match layout.ontology_source() {
            OntologySource::File(found) => assert!(found.ends_with("labels.json")),
            other => panic!("expected ontology file, got {other:?}"),
        }
    }

    #[test]
    fn missing_directories_list_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DatasetLayout::new(dir.path().join("absent"));
        assert!(layout.item_files().is_empty());
        assert!(layout.pairs().is_empty());
    }
}
