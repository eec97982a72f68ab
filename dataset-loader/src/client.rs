#![doc = "HTTP implementation of the core `DatasetClient` contract, talking to the dataset-management REST API."]
//
//! # Dataset API client
//!
//! [`DatasetApiClient`] is what the CLI hands to the core pipeline. It owns a single
//! `reqwest::Client` (connection pool shared by all concurrent uploads) and a bearer
//! token.
//!
//! - Construct it with [`DatasetApiClient::new_from_env`] (`DATASET_API_URL`,
//!   `DATASET_API_TOKEN`) or [`DatasetApiClient::new`].
//! - Creating a feature set whose name is taken answers 400 or 409; both are mapped to
//!   [`ApiError::Conflict`] so the core's conflict policies can react.

use std::env;
use std::path::Path;

use async_trait::async_trait;
use dataset_loader_core::contract::{
    ApiError, DatasetClient, DatasetHandle, Feature, FeatureSet, NewFeature, NewFeatureSet,
    NewItem, Ontology, UploadedItem,
};
use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const ENV_API_URL: &str = "DATASET_API_URL";
pub const ENV_API_TOKEN: &str = "DATASET_API_TOKEN";

pub struct DatasetApiClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiDataset {
    id: String,
    project_id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiOntology {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiFeatureSet {
    id: String,
    name: String,
    size: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateFeatureSetBody<'a> {
    name: &'a str,
    size: usize,
    entity_type: &'a str,
    #[serde(rename = "type")]
    set_type: &'a str,
    project: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiItem {
    id: String,
    filename: String,
    #[serde(default)]
    dir: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateFeatureBody<'a> {
    value: &'a [f64],
    project_id: &'a str,
    feature_set_id: &'a str,
    entity_id: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiFeature {
    id: String,
    entity_id: String,
}

impl From<ApiFeatureSet> for FeatureSet {
    fn from(api: ApiFeatureSet) -> Self {
        FeatureSet {
            id: api.id,
            name: api.name,
            size: api.size,
        }
    }
}

impl DatasetApiClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        DatasetApiClient {
            http: reqwest::Client::new(),
            base_url,
            token: token.into(),
        }
    }

    pub fn new_from_env() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        dotenvy::dotenv().ok(); // loads environment variables from .env if present
        match (env::var(ENV_API_URL), env::var(ENV_API_TOKEN)) {
            (Ok(base_url), Ok(token)) => {
                tracing::info!(
                    base_url = %base_url,
                    token_set = !token.is_empty(),
                    "Initialized DatasetApiClient from environment"
                );
                Ok(DatasetApiClient::new(base_url, token))
            }
            (Err(e), _) => {
                tracing::error!(error = ?e, "{ENV_API_URL} missing in environment");
                Err(format!("{ENV_API_URL} environment variable not set: {e}").into())
            }
            (_, Err(e)) => {
                tracing::error!(error = ?e, "{ENV_API_TOKEN} missing in environment");
                Err(format!("{ENV_API_TOKEN} environment variable not set: {e}").into())
            }
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response, ApiError> {
        request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(transport)
    }
}

fn transport(e: reqwest::Error) -> ApiError {
    ApiError::Transport(e.to_string())
}

/// Map a non-success status to an [`ApiError`]. `conflict_on_bad_request` treats 400
/// like 409, which is how the service reports a duplicate feature-set name.
fn status_error(status: StatusCode, body: String, conflict_on_bad_request: bool) -> ApiError {
    match status {
        StatusCode::CONFLICT => ApiError::Conflict(body),
        StatusCode::BAD_REQUEST if conflict_on_bad_request => ApiError::Conflict(body),
        StatusCode::NOT_FOUND => ApiError::NotFound(body),
        other => ApiError::Status {
            status: other.as_u16(),
            body,
        },
    }
}

async fn ensure_success(
    response: Response,
    conflict_on_bad_request: bool,
) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| String::from("<Failed to decode response body>"));
    Err(status_error(status, body, conflict_on_bad_request))
}

async fn json_or_error<T: serde::de::DeserializeOwned>(
    response: Response,
    conflict_on_bad_request: bool,
) -> Result<T, ApiError> {
    ensure_success(response, conflict_on_bad_request)
        .await?
        .json::<T>()
        .await
        .map_err(transport)
}

fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "item".to_string())
}

#[async_trait]
impl DatasetClient for DatasetApiClient {
    async fn get_dataset(&self, dataset_id: &str) -> Result<DatasetHandle, ApiError> {
        tracing::info!(dataset_id, "Fetching dataset");
        let response = self
            .send(self.http.get(self.url(&format!("datasets/{dataset_id}"))))
            .await?;
        let api: ApiDataset = json_or_error(response, false).await.map_err(|e| {
            tracing::error!(error = %e, dataset_id, "Failed to fetch dataset");
            e
        })?;
        Ok(DatasetHandle {
            id: api.id,
            project_id: api.project_id,
            name: api.name,
        })
    }

    async fn list_ontologies(&self, dataset_id: &str) -> Result<Vec<Ontology>, ApiError> {
        let response = self
            .send(
                self.http
                    .get(self.url(&format!("datasets/{dataset_id}/ontologies"))),
            )
            .await?;
        let api: Vec<ApiOntology> = json_or_error(response, false).await?;
        tracing::info!(dataset_id, count = api.len(), "Listed dataset ontologies");
        Ok(api.into_iter().map(|o| Ontology { id: o.id }).collect())
    }

    async fn update_ontology(
        &self,
        ontology_id: &str,
        ontology_json: serde_json::Value,
    ) -> Result<(), ApiError> {
        tracing::info!(ontology_id, "Updating ontology");
        let response = self
            .send(
                self.http
                    .put(self.url(&format!("ontologies/{ontology_id}")))
                    .json(&ontology_json),
            )
            .await?;
        ensure_success(response, false).await.map_err(|e| {
            tracing::error!(error = %e, ontology_id, "Failed to update ontology");
            e
        })?;
        Ok(())
    }

    async fn create_feature_set(&self, req: NewFeatureSet) -> Result<FeatureSet, ApiError> {
        tracing::info!(name = %req.name, project = %req.project_id, "Creating feature set");
        let body = CreateFeatureSetBody {
            name: &req.name,
            size: req.size,
            entity_type: &req.entity_type,
            set_type: &req.set_type,
            project: &req.project_id,
        };
        let response = self
            .send(
                self.http
                    .post(self.url(&format!("projects/{}/feature-sets", req.project_id)))
                    .json(&body),
            )
            .await?;
        let api: ApiFeatureSet = json_or_error(response, true).await?;
        Ok(api.into())
    }

    async fn get_feature_set_by_name(
        &self,
        project_id: &str,
        name: &str,
    ) -> Result<FeatureSet, ApiError> {
        tracing::info!(project_id, name, "Fetching feature set by name");
        let response = self
            .send(
                self.http
                    .get(self.url(&format!("projects/{project_id}/feature-sets")))
                    .query(&[("name", name)]),
            )
            .await?;
        let sets: Vec<ApiFeatureSet> = json_or_error(response, false).await?;
        sets.into_iter()
            .find(|s| s.name == name)
            .map(FeatureSet::from)
            .ok_or_else(|| ApiError::NotFound(format!("feature set {name:?}")))
    }

    async fn upload_item(&self, req: NewItem) -> Result<UploadedItem, ApiError> {
        let bytes = tokio::fs::read(&req.local_path).await.map_err(|e| {
            tracing::error!(error = ?e, path = %req.local_path.display(), "Failed to read item file");
            e
        })?;
        let hash = content_hash(&bytes);
        let name = file_name(&req.local_path);
        tracing::debug!(
            file = %name,
            remote_path = %req.remote_path,
            size = bytes.len(),
            "Uploading item"
        );

        let mut form = Form::new()
            .part("file", Part::bytes(bytes).file_name(name.clone()))
            .text("remotePath", req.remote_path.clone())
            .text("metadata", req.metadata.to_string())
            .text("contentHash", hash);
        if let Some(description) = req.description {
            form = form.text("description", description);
        }

        let response = self
            .send(
                self.http
                    .post(self.url(&format!("datasets/{}/items", req.dataset_id)))
                    .multipart(form),
            )
            .await?;
        let api: ApiItem = json_or_error(response, false).await.map_err(|e| {
            tracing::error!(error = %e, file = %name, "API error uploading item");
            e
        })?;
        let remote_path = if api.dir.is_empty() {
            req.remote_path
        } else {
            api.dir
        };
        Ok(UploadedItem {
            id: api.id,
            filename: api.filename,
            remote_path,
        })
    }

    async fn create_feature(&self, req: NewFeature) -> Result<Feature, ApiError> {
        let body = CreateFeatureBody {
            value: &req.value,
            project_id: &req.project_id,
            feature_set_id: &req.feature_set_id,
            entity_id: &req.entity_id,
        };
        let response = self
            .send(self.http.post(self.url("features")).json(&body))
            .await?;
        let api: ApiFeature = json_or_error(response, false).await.map_err(|e| {
            tracing::error!(error = %e, entity = %req.entity_id, "API error creating feature");
            e
        })?;
        Ok(Feature {
            id: api.id,
            entity_id: api.entity_id,
        })
    }
}
