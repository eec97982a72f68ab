/// `load_config` module: parses the static YAML run configuration into typed structs.
///
/// The file carries no secrets. The service URL and token are read from the
/// environment by [`crate::client::DatasetApiClient::new_from_env`].
///
/// Accepted shape:
///
/// ```yaml
/// download:
///   source: "https://example.com/dataset.zip"
///   work_dir: ./tmp
/// upload:
///   dataset_id: "ds-123"
///   concurrency: 8
///   feature_set:
///     name: openai-clip
///     size: 512
///   conflict_policy:
///     type: retry_then_lookup
///     attempts: 3
///     backoff_ms: 1000
/// ```
///
/// Everything under `upload` except `dataset_id` is optional.
use anyhow::Result;
use dataset_loader_core::config::LoadOptions;
use dataset_loader_core::download::DownloadConfig;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{error, info};

#[derive(Debug, Deserialize)]
pub struct CliConfig {
    pub download: DownloadConfig,
    pub upload: UploadSection,
}

#[derive(Debug, Deserialize)]
pub struct UploadSection {
    pub dataset_id: String,
    #[serde(flatten)]
    pub options: LoadOptions,
}

/// Loads a static YAML config file (no secrets).
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let config: CliConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    if config.upload.dataset_id.trim().is_empty() {
        error!(config_path = ?path_ref, "upload.dataset_id is empty");
        anyhow::bail!("upload.dataset_id must not be empty");
    }

    info!(
        source = %config.download.source,
        work_dir = %config.download.work_dir.display(),
        dataset_id = %config.upload.dataset_id,
        "Config loaded"
    );
    config.upload.options.trace_loaded();
    Ok(config)
}
