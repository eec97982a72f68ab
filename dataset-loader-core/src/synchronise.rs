//! High-level pipeline: download → pair → upload for one dataset archive.
//!
//! This module wires the other pieces together:
//!   - Fetches and extracts the archive through a [`Downloader`]
//!   - Uploads the ontology, if the archive ships one
//!   - Acquires the project's feature set (see [`crate::feature_set`])
//!   - Pairs item binaries with annotation sidecars (see [`crate::layout`])
//!   - Uploads every pair concurrently, registering each item's feature vector
//!
//! # Error Handling
//! Everything before the dispatch step is fail-fast. During dispatch all uploads run
//! to completion; if any of them failed, the first failure in submission order is
//! returned and the rest are only logged.
//!
//! # Navigation
//! - Entrypoints: [`load_unannotated`], [`upload_dataset`]
//! - Per item: [`upload_pair`]

use std::fs;
use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{debug, error, info};

use crate::annotation::{self, AnnotationError};
use crate::config::LoadOptions;
use crate::contract::{
    ApiError, DatasetClient, DatasetHandle, Downloader, FeatureSet, NewFeature, NewItem,
};
use crate::download::DownloadError;
use crate::feature_set::{acquire_feature_set, FeatureSetError};
use crate::layout::{DatasetLayout, ItemPair, OntologySource};

const PROGRESS_TEMPLATE: &str =
    "{prefix:>12.cyan.bold} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({eta}) {msg}";

/// Outcome of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct UploadReport {
    pub dataset_id: String,
    pub feature_set_id: String,
    pub feature_set_name: String,
    pub ontology_uploaded: bool,
    pub items: Vec<ItemReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemReport {
    pub item_id: String,
    pub item_name: String,
    pub remote_path: String,
    pub feature_id: String,
}

/// Why a single pair failed.
#[derive(Debug, thiserror::Error)]
pub enum ItemError {
    #[error(transparent)]
    Annotation(#[from] AnnotationError),
    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("download failed: {0}")]
    Download(#[from] DownloadError),
    #[error("ontology directory {0:?} contains no JSON file")]
    MissingOntologyFile(PathBuf),
    #[error("dataset {0} has no ontology to update")]
    NoOntology(String),
    #[error("failed to read ontology {path:?}: {reason}")]
    OntologyFile { path: PathBuf, reason: String },
    #[error(transparent)]
    FeatureSet(#[from] FeatureSetError),
    #[error("remote call failed: {0}")]
    Api(#[from] ApiError),
    #[error("upload of {item:?} failed: {source}")]
    Item { item: PathBuf, source: ItemError },
}

/// Fetch the archive through `downloader`, extract it, and upload its contents into
/// `dataset`.
pub async fn load_unannotated<C, D>(
    client: &C,
    downloader: &D,
    dataset: &DatasetHandle,
    options: &LoadOptions,
) -> Result<UploadReport, LoadError>
where
    C: DatasetClient + ?Sized,
    D: Downloader + ?Sized,
{
    info!(dataset = %dataset.id, status = "Preparing data", "[LOAD] Starting dataset load");
    let manifest = downloader.download_all().await.map_err(|e| {
        error!(error = %e, "[LOAD][ERROR] Download failed");
        e
    })?;
    info!(
        archive = %manifest.archive_path.display(),
        data_dir = %manifest.data_dir.display(),
        "[LOAD] Archive downloaded and extracted"
    );

    info!(status = "Uploading dataset with features", "[LOAD] Starting upload");
    upload_dataset(client, dataset, &manifest.data_dir, options).await
}

/// Upload an already-extracted dataset tree rooted at `data_dir`.
pub async fn upload_dataset<C>(
    client: &C,
    dataset: &DatasetHandle,
    data_dir: &Path,
    options: &LoadOptions,
) -> Result<UploadReport, LoadError>
where
    C: DatasetClient + ?Sized,
{
    let layout = DatasetLayout::new(data_dir);

    let ontology_uploaded = upload_ontology(client, dataset, &layout).await?;

    let pairs = layout.pairs();

    let feature_set = acquire_feature_set(
        client,
        &dataset.project_id,
        &options.feature_set,
        &options.conflict_policy,
    )
    .await?;
    info!(
        feature_set = %feature_set.name,
        id = %feature_set.id,
        "[UPLOAD] Using feature set"
    );

    let progress = progress_bar(pairs.len() as u64, options.quiet);
    let items = dispatch_uploads(
        client,
        dataset,
        &feature_set,
        pairs,
        options.workers(),
        &progress,
    )
    .await;
    match &items {
        Ok(done) => progress.finish_with_message(format!("{} items uploaded", done.len())),
        Err(_) => progress.abandon_with_message("upload failed"),
    }
    let items = items?;

    Ok(UploadReport {
        dataset_id: dataset.id.clone(),
        feature_set_id: feature_set.id,
        feature_set_name: feature_set.name,
        ontology_uploaded,
        items,
    })
}

/// Apply the dataset's ontology file, if there is one, to the dataset's first
/// ontology. Returns whether an upload happened.
async fn upload_ontology<C>(
    client: &C,
    dataset: &DatasetHandle,
    layout: &DatasetLayout,
) -> Result<bool, LoadError>
where
    C: DatasetClient + ?Sized,
{
    let path = match layout.ontology_source() {
        OntologySource::Absent => {
            info!("[ONTOLOGY] No ontology directory, skipping ontology upload");
            return Ok(false);
        }
        OntologySource::Empty(dir) => {
            error!(dir = %dir.display(), "[ONTOLOGY][ERROR] Ontology directory has no JSON file");
            return Err(LoadError::MissingOntologyFile(dir));
        }
        OntologySource::File(path) => path,
    };

    let ontology_json = read_json(&path)?;
    let ontology = client
        .list_ontologies(&dataset.id)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| {
            error!(dataset = %dataset.id, "[ONTOLOGY][ERROR] Dataset has no ontology");
            LoadError::NoOntology(dataset.id.clone())
        })?;

    client.update_ontology(&ontology.id, ontology_json).await?;
    info!(ontology = %ontology.id, path = %path.display(), "[ONTOLOGY] Ontology uploaded");
    Ok(true)
}

fn read_json(path: &Path) -> Result<serde_json::Value, LoadError> {
    let raw = fs::read_to_string(path).map_err(|e| LoadError::OntologyFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&raw).map_err(|e| LoadError::OntologyFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Upload all pairs with at most `workers` in flight. Every upload runs to the end;
/// the first failure in submission order is returned.
pub async fn dispatch_uploads<C>(
    client: &C,
    dataset: &DatasetHandle,
    feature_set: &FeatureSet,
    pairs: Vec<ItemPair>,
    workers: usize,
    progress: &ProgressBar,
) -> Result<Vec<ItemReport>, LoadError>
where
    C: DatasetClient + ?Sized,
{
    let total = pairs.len();
    info!(total, workers, "[UPLOAD] Dispatching item uploads");

    let mut results: Vec<(usize, Result<ItemReport, LoadError>)> =
        stream::iter(pairs.into_iter().enumerate())
            .map(|(index, pair)| async move {
                let result = upload_pair(client, dataset, feature_set, &pair)
                    .await
                    .map_err(|source| {
                        error!(item = %pair.item.display(), error = %source, "[UPLOAD][ERROR] Item upload failed");
                        LoadError::Item {
                            item: pair.item.clone(),
                            source,
                        }
                    });
                progress.inc(1);
                (index, result)
            })
            .buffer_unordered(workers.max(1))
            .collect()
            .await;
    results.sort_by_key(|(index, _)| *index);

    let failed = results.iter().filter(|(_, r)| r.is_err()).count();
    let mut items = Vec::with_capacity(total);
    let mut first_error = None;
    for (_, result) in results {
        match result {
            Ok(report) => items.push(report),
            Err(e) if first_error.is_none() => first_error = Some(e),
            Err(_) => {}
        }
    }

    if let Some(e) = first_error {
        error!(total, failed, "[UPLOAD][ERROR] Some item uploads failed");
        return Err(e);
    }
    info!(uploaded = items.len(), "[UPLOAD] All items uploaded");
    Ok(items)
}

/// Upload one item binary and register the first feature vector from its sidecar.
pub async fn upload_pair<C>(
    client: &C,
    dataset: &DatasetHandle,
    feature_set: &FeatureSet,
    pair: &ItemPair,
) -> Result<ItemReport, ItemError>
where
    C: DatasetClient + ?Sized,
{
    let payload = annotation::read_payload(&pair.annotation)?;
    let remote_path = pair.remote_path();

    let item = client
        .upload_item(NewItem {
            dataset_id: dataset.id.clone(),
            local_path: pair.item.clone(),
            remote_path: remote_path.clone(),
            metadata: payload.metadata,
            description: payload.caption,
        })
        .await?;
    debug!(item = %item.id, filename = %item.filename, "[UPLOAD] Item uploaded");

    let feature = client
        .create_feature(NewFeature {
            value: payload.feature,
            project_id: dataset.project_id.clone(),
            feature_set_id: feature_set.id.clone(),
            entity_id: item.id.clone(),
        })
        .await?;

    let report = ItemReport {
        item_id: item.id,
        item_name: item.filename,
        remote_path,
        feature_id: feature.id,
    };
    match serde_json::to_string(&report) {
        Ok(json) => debug!(json = %json, "[UPLOAD] Item and feature registered"),
        Err(e) => error!(error = ?e, "[UPLOAD] Failed to serialize item report"),
    }
    Ok(report)
}

fn progress_bar(len: u64, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(len);
    let pb = match ProgressStyle::with_template(PROGRESS_TEMPLATE) {
        Ok(style) => pb.with_style(style),
        Err(_) => pb,
    };
    pb.with_prefix("Uploading")
        .with_message("items and features")
}
