//! Feature-set acquisition: get hold of the project's feature set, whether or not a
//! previous run already created it.
//!
//! Two conflict policies exist and are deliberately not merged:
//! - [`ConflictPolicy::RetryThenLookup`] retries transient failures with a fixed
//!   backoff and falls back to a lookup by name when the set already exists.
//! - [`ConflictPolicy::RandomSuffix`] treats any create failure as a naming clash
//!   and creates a fresh set under a suffixed name.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::contract::{ApiError, DatasetClient, FeatureSet, NewFeatureSet};

/// Length of the random name suffix used by [`ConflictPolicy::RandomSuffix`].
pub const SUFFIX_LEN: usize = 5;

/// What feature set to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSetSpec {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_size")]
    pub size: usize,
    #[serde(default = "default_entity_type")]
    pub entity_type: String,
    #[serde(default = "default_set_type")]
    pub set_type: String,
}

fn default_name() -> String {
    "openai-clip".to_string()
}

fn default_size() -> usize {
    512
}

fn default_entity_type() -> String {
    "item".to_string()
}

fn default_set_type() -> String {
    "clip".to_string()
}

impl Default for FeatureSetSpec {
    fn default() -> Self {
        Self {
            name: default_name(),
            size: default_size(),
            entity_type: default_entity_type(),
            set_type: default_set_type(),
        }
    }
}

impl FeatureSetSpec {
    fn request(&self, project_id: &str, name: &str) -> NewFeatureSet {
        NewFeatureSet {
            project_id: project_id.to_string(),
            name: name.to_string(),
            size: self.size,
            entity_type: self.entity_type.clone(),
            set_type: self.set_type.clone(),
        }
    }
}

/// How to react when creating the feature set fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Retry non-conflict failures up to `attempts` times, sleeping `backoff_ms`
    /// between tries. A conflict is resolved by fetching the existing set by name.
    RetryThenLookup {
        #[serde(default = "default_attempts")]
        attempts: u32,
        #[serde(default = "default_backoff_ms")]
        backoff_ms: u64,
    },
    /// On any failure, create a new set named `<name>-<random suffix>`.
    RandomSuffix,
}

fn default_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    1000
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        ConflictPolicy::RetryThenLookup {
            attempts: default_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FeatureSetError {
    #[error("failed to create or get feature set after {attempts} attempts: {source}")]
    Exhausted { attempts: u32, source: ApiError },
    #[error("feature set {name:?} exists but could not be fetched: {source}")]
    Lookup { name: String, source: ApiError },
    #[error("failed to create feature set {name:?}: {source}")]
    Create { name: String, source: ApiError },
}

/// Create the feature set described by `spec` in `project_id`, resolving failures
/// according to `policy`.
pub async fn acquire_feature_set<C>(
    client: &C,
    project_id: &str,
    spec: &FeatureSetSpec,
    policy: &ConflictPolicy,
) -> Result<FeatureSet, FeatureSetError>
where
    C: DatasetClient + ?Sized,
{
    match policy {
        ConflictPolicy::RetryThenLookup {
            attempts,
            backoff_ms,
        } => {
            retry_then_lookup(
                client,
                project_id,
                spec,
                (*attempts).max(1),
                Duration::from_millis(*backoff_ms),
            )
            .await
        }
        ConflictPolicy::RandomSuffix => random_suffix(client, project_id, spec).await,
    }
}

async fn retry_then_lookup<C>(
    client: &C,
    project_id: &str,
    spec: &FeatureSetSpec,
    attempts: u32,
    backoff: Duration,
) -> Result<FeatureSet, FeatureSetError>
where
    C: DatasetClient + ?Sized,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match client
            .create_feature_set(spec.request(project_id, &spec.name))
            .await
        {
            Ok(set) => {
                info!(name = %set.name, id = %set.id, "Created new feature set");
                return Ok(set);
            }
            Err(ApiError::Conflict(reason)) => {
                info!(name = %spec.name, %reason, "Feature set already exists, fetching it by name");
                return client
                    .get_feature_set_by_name(project_id, &spec.name)
                    .await
                    .map_err(|source| {
                        error!(name = %spec.name, error = %source, "Failed to fetch existing feature set");
                        FeatureSetError::Lookup {
                            name: spec.name.clone(),
                            source,
                        }
                    });
            }
            Err(source) if attempt >= attempts => {
                error!(attempts, error = %source, "Failed to create or get feature set");
                return Err(FeatureSetError::Exhausted { attempts, source });
            }
            Err(e) => {
                warn!(attempt, error = %e, "Feature set creation failed, retrying");
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

async fn random_suffix<C>(
    client: &C,
    project_id: &str,
    spec: &FeatureSetSpec,
) -> Result<FeatureSet, FeatureSetError>
where
    C: DatasetClient + ?Sized,
{
    match client
        .create_feature_set(spec.request(project_id, &spec.name))
        .await
    {
        Ok(set) => {
            info!(name = %set.name, id = %set.id, "Created new feature set");
            Ok(set)
        }
        Err(e) => {
            let name = suffixed_name(&spec.name);
            warn!(
                error = %e,
                original = %spec.name,
                renamed = %name,
                "Feature set creation failed, creating under a new name"
            );
            client
                .create_feature_set(spec.request(project_id, &name))
                .await
                .map_err(|source| {
                    error!(name = %name, error = %source, "Failed to create renamed feature set");
                    FeatureSetError::Create { name, source }
                })
        }
    }
}

/// `<name>-` followed by [`SUFFIX_LEN`] random lowercase alphanumerics. The suffix
/// is taken from a v4 uuid, so in practice it is lowercase hex (`[0-9a-f]`).
pub fn suffixed_name(name: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", name, &suffix[..SUFFIX_LEN])
}
