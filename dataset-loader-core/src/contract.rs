//! # contract: interfaces between the load pipeline and the outside world
//!
//! The pipeline never talks to the network directly. It goes through two traits:
//! - [`DatasetClient`]: the remote dataset-management service (datasets, ontologies,
//!   feature sets, items, features).
//! - [`Downloader`]: fetches and unpacks the dataset archive onto local disk.
//!
//! Both traits are annotated for `mockall`, so tests (and downstream crates with the
//! `test-export-mocks` feature) get `MockDatasetClient` / `MockDownloader`.
//!
//! Request and response types are plain owned data; they carry no transport detail.

use std::path::PathBuf;

use async_trait::async_trait;
use mockall::automock;
use serde::Serialize;

/// Opaque handle to a remote dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetHandle {
    pub id: String,
    pub project_id: String,
    pub name: String,
}

/// Handle to an ontology attached to a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ontology {
    pub id: String,
}

/// Request for a new feature set in a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFeatureSet {
    pub project_id: String,
    pub name: String,
    /// Dimension of every vector stored in the set.
    pub size: usize,
    pub entity_type: String,
    pub set_type: String,
}

/// A remote feature set, as returned by create or lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureSet {
    pub id: String,
    pub name: String,
    pub size: usize,
}

/// Request to upload a single binary item into a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct NewItem {
    pub dataset_id: String,
    /// The file on local disk to upload.
    pub local_path: PathBuf,
    /// Remote directory the item lands in, e.g. `/images`.
    pub remote_path: String,
    /// Item metadata document (`user`, optionally `system.tags`).
    pub metadata: serde_json::Value,
    pub description: Option<String>,
}

/// An uploaded item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedItem {
    pub id: String,
    pub filename: String,
    pub remote_path: String,
}

/// Request to register a feature vector against an entity.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFeature {
    pub value: Vec<f64>,
    pub project_id: String,
    pub feature_set_id: String,
    pub entity_id: String,
}

/// A registered feature vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feature {
    pub id: String,
    pub entity_id: String,
}

/// Errors surfaced by a [`DatasetClient`] implementation.
///
/// `Conflict` is kept distinct from other status failures: feature-set acquisition
/// branches on it.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("resource already exists: {0}")]
    Conflict(String),
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for the remote dataset-management service.
///
/// Implementors must be safe to share between concurrent upload tasks.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait DatasetClient: Send + Sync {
    /// Resolve a dataset id into a full handle (including its project).
    async fn get_dataset(&self, dataset_id: &str) -> Result<DatasetHandle, ApiError>;

    /// List the ontologies attached to a dataset, in service order.
    async fn list_ontologies(&self, dataset_id: &str) -> Result<Vec<Ontology>, ApiError>;

    /// Replace an ontology's content with the given ontology document.
    async fn update_ontology(
        &self,
        ontology_id: &str,
        ontology_json: serde_json::Value,
    ) -> Result<(), ApiError>;

    /// Create a feature set. Must return [`ApiError::Conflict`] if the name is taken.
    async fn create_feature_set(&self, req: NewFeatureSet) -> Result<FeatureSet, ApiError>;

    /// Look up an existing feature set by name within a project.
    async fn get_feature_set_by_name(
        &self,
        project_id: &str,
        name: &str,
    ) -> Result<FeatureSet, ApiError>;

    /// Upload one binary item.
    async fn upload_item(&self, req: NewItem) -> Result<UploadedItem, ApiError>;

    /// Register a feature vector against an uploaded item.
    async fn create_feature(&self, req: NewFeature) -> Result<Feature, ApiError>;
}

/// Result of a download: where the archive landed and where it was extracted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedArchive {
    pub archive_path: PathBuf,
    pub data_dir: PathBuf,
}

/// Trait for fetching and unpacking the dataset archive.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Fetch the configured archive and extract it, returning the local layout.
    async fn download_all(&self) -> Result<DownloadedArchive, crate::download::DownloadError>;
}
