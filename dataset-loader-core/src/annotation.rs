//! Annotation sidecar parsing.
//!
//! Each item binary ships with a JSON sidecar holding its caption, tags, user metadata
//! and precomputed feature vectors. This module turns one sidecar into the payload the
//! uploader needs.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, error};

/// Raw shape of an annotation sidecar. Unknown keys are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Annotation {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: AnnotationMetadata,
    #[serde(default, rename = "itemVectors")]
    pub item_vectors: Vec<ItemVector>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnnotationMetadata {
    #[serde(default)]
    pub user: Option<Value>,
    #[serde(default)]
    pub system: Option<SystemMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SystemMetadata {
    #[serde(default)]
    pub tags: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemVector {
    pub value: Vec<f64>,
}

/// Everything extracted from a sidecar for one upload.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemPayload {
    pub metadata: Value,
    pub caption: Option<String>,
    pub feature: Vec<f64>,
}

#[derive(Debug, thiserror::Error)]
pub enum AnnotationError {
    #[error("failed to read annotation {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("annotation {path:?} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("annotation {0:?} has no itemVectors entry")]
    EmptyItemVectors(PathBuf),
}

impl Annotation {
    pub fn from_file(path: &Path) -> Result<Self, AnnotationError> {
        let raw = fs::read_to_string(path).map_err(|source| {
            error!(error = ?source, path = %path.display(), "Failed to read annotation file");
            AnnotationError::Read {
                path: path.to_path_buf(),
                source,
            }
        })?;
        serde_json::from_str(&raw).map_err(|source| {
            error!(error = %source, path = %path.display(), "Failed to parse annotation JSON");
            AnnotationError::Parse {
                path: path.to_path_buf(),
                source,
            }
        })
    }

    /// Item metadata document: always a `user` object, plus `system.tags` when the
    /// sidecar carries tags.
    pub fn item_metadata(&self) -> Value {
        let mut doc = Map::new();
        doc.insert(
            "user".to_string(),
            self.metadata.user.clone().unwrap_or_else(|| json!({})),
        );
        if let Some(tags) = self.metadata.system.as_ref().and_then(|s| s.tags.clone()) {
            doc.insert("system".to_string(), json!({ "tags": tags }));
        }
        Value::Object(doc)
    }

    /// The first feature vector. Only the first entry is ever uploaded.
    pub fn first_vector(&self) -> Option<&[f64]> {
        self.item_vectors.first().map(|v| v.value.as_slice())
    }

    /// Build the upload payload; `path` is only used for error reporting.
    pub fn into_payload(self, path: &Path) -> Result<ItemPayload, AnnotationError> {
        let metadata = self.item_metadata();
        let feature = match self.item_vectors.into_iter().next() {
            Some(v) => v.value,
            None => {
                error!(path = %path.display(), "Annotation has an empty itemVectors list");
                return Err(AnnotationError::EmptyItemVectors(path.to_path_buf()));
            }
        };
        debug!(path = %path.display(), dims = feature.len(), "Extracted item payload");
        Ok(ItemPayload {
            metadata,
            caption: self.description,
            feature,
        })
    }
}

/// Read and convert the sidecar at `path` in one go.
pub fn read_payload(path: &Path) -> Result<ItemPayload, AnnotationError> {
    Annotation::from_file(path)?.into_payload(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> Annotation {
        serde_json::from_str(raw).expect("valid annotation")
    }

    #[test]
    fn full_annotation_yields_metadata_caption_and_first_vector() {
        let ann = parse(
            r#"{
                "description": "a crater",
                "metadata": {
                    "user": {"sol": 42},
                    "system": {"tags": {"train": true}}
                },
                "itemVectors": [{"value": [0.5, 1.5]}, {"value": [9.0, 9.0]}]
            }"#,
        );
        let payload = ann.into_payload(Path::new("a.json")).unwrap();
        assert_eq!(
            payload.metadata,
            json!({"user": {"sol": 42}, "system": {"tags": {"train": true}}})
        );
        assert_eq!(payload.caption.as_deref(), Some("a crater"));
        assert_eq!(payload.feature, vec![0.5, 1.5]);
    }

    #[test]
    fn missing_optional_fields_default() {
        let ann = parse(r#"{"itemVectors": [{"value": [1.0]}]}"#);
        let payload = ann.into_payload(Path::new("b.json")).unwrap();
        assert_eq!(payload.metadata, json!({"user": {}}));
        assert_eq!(payload.caption, None);
    }

    #[test]
    fn system_without_tags_is_omitted() {
        let ann = parse(
            r#"{"metadata": {"system": {"other": 1}}, "itemVectors": [{"value": []}]}"#,
        );
        assert_eq!(ann.item_metadata(), json!({"user": {}}));
    }

    #[test]
    fn feature_values_keep_full_precision() {
        let ann = parse(r#"{"itemVectors": [{"value": [0.012345678901234567, 123456789.0]}]}"#);
        let payload = ann.into_payload(Path::new("p.json")).unwrap();
        assert_eq!(payload.feature, vec![0.012345678901234567, 123456789.0]);

        let wire = serde_json::to_string(&payload.feature).unwrap();
        assert!(wire.contains("123456789.0"), "got {wire}");
        let reparsed: Vec<f64> = serde_json::from_str(&wire).unwrap();
        assert_eq!(reparsed, payload.feature);
    }

    #[test]
    fn empty_item_vectors_is_an_error() {
        let ann = parse(r#"{"description": "x", "itemVectors": []}"#);
        assert!(ann.first_vector().is_none());
        let err = ann.into_payload(Path::new("c.json")).unwrap_err();
        assert!(matches!(err, AnnotationError::EmptyItemVectors(p) if p == Path::new("c.json")));

        let err = parse("{}").into_payload(Path::new("d.json")).unwrap_err();
        assert!(matches!(err, AnnotationError::EmptyItemVectors(_)));
    }

    #[test]
    fn read_payload_reports_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{not json").unwrap();
        let err = read_payload(&path).unwrap_err();
        assert!(matches!(err, AnnotationError::Parse { .. }));
    }
}
