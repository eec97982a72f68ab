/// # dataset-loader CLI Interface (Module)
///
/// Command parsing and the async entrypoint shared by `main` and the integration tests.
/// All pipeline logic lives in `dataset-loader-core`; this module only wires the
/// loaded config, the HTTP client and the core entrypoints together.
///
/// - `load`: fetch the configured archive, extract it, upload it.
/// - `upload`: upload an already-extracted dataset directory.
use crate::client::DatasetApiClient;
use crate::load_config::{load_config, CliConfig};
use anyhow::Result;
use clap::{Parser, Subcommand};
use dataset_loader_core::contract::DatasetClient;
use dataset_loader_core::download::ArchiveDownloader;
use dataset_loader_core::synchronise::{load_unannotated, upload_dataset, UploadReport};
use std::path::PathBuf;

/// CLI for dataset-loader: load zipped datasets with precomputed features into a dataset service.
#[derive(Parser)]
#[clap(
    name = "dataset-loader",
    version,
    about = "Download a zipped dataset and upload its items, annotations, ontology and feature vectors"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download the configured archive and upload its contents
    Load {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
    /// Upload an already-extracted dataset directory
    Upload {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Directory containing items/, json/ and optionally ontology/
        #[clap(long)]
        data_dir: PathBuf,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    let report = match cli.command {
        Commands::Load { config } => {
            let config = load_config(config)?;
            tracing::info!(command = "load", "Starting dataset load");
            let client = client_from_env()?;
            let dataset = resolve_dataset(&client, &config).await?;
            let downloader = ArchiveDownloader::new(config.download.clone());
            load_unannotated(&client, &downloader, &dataset, &config.upload.options).await
        }
        Commands::Upload { config, data_dir } => {
            let config = load_config(config)?;
            tracing::info!(command = "upload", data_dir = %data_dir.display(), "Starting dataset upload");
            let client = client_from_env()?;
            let dataset = resolve_dataset(&client, &config).await?;
            upload_dataset(&client, &dataset, &data_dir, &config.upload.options).await
        }
    };

    match report {
        Ok(report) => {
            summarise(&report);
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "Dataset load failed");
            Err(anyhow::Error::new(e))
        }
    }
}

fn client_from_env() -> Result<DatasetApiClient> {
    DatasetApiClient::new_from_env().map_err(|e| anyhow::anyhow!("Failed to construct client: {e}"))
}

async fn resolve_dataset(
    client: &DatasetApiClient,
    config: &CliConfig,
) -> Result<dataset_loader_core::contract::DatasetHandle> {
    let dataset = client
        .get_dataset(&config.upload.dataset_id)
        .await
        .map_err(|e| {
            anyhow::anyhow!(
                "Failed to resolve dataset {}: {e}",
                config.upload.dataset_id
            )
        })?;
    tracing::info!(
        dataset = %dataset.id,
        project = %dataset.project_id,
        name = %dataset.name,
        "Resolved target dataset"
    );
    Ok(dataset)
}

fn summarise(report: &UploadReport) {
    tracing::info!(
        dataset = %report.dataset_id,
        feature_set = %report.feature_set_name,
        ontology_uploaded = report.ontology_uploaded,
        items = report.items.len(),
        "Dataset load complete"
    );
    println!(
        "Uploaded {} items with features to dataset {} (feature set {}).",
        report.items.len(),
        report.dataset_id,
        report.feature_set_name
    );
}
