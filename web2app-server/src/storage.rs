//! Asset storage for uploaded logos.
//!
//! The build service fetches the logo by URL, so the upload has to land
//! somewhere publicly readable first. [`AppwriteStore`] talks to an
//! Appwrite-compatible storage REST API; tests substitute their own
//! [`AssetStore`].

use std::future::Future;
use std::time::Duration;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::config::ServerConfig;
use crate::error::{Error, Result, upstream_message};

/// A stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredAsset {
    /// Opaque storage identifier.
    pub id: String,
    /// Stable, publicly retrievable URL.
    pub url: String,
}

/// The asset-storage collaborator.
pub trait AssetStore: Send + Sync {
    fn upload(
        &self,
        bytes: Vec<u8>,
        content_type: &str,
        filename: &str,
    ) -> impl Future<Output = Result<StoredAsset>> + Send;
}

/// Replace characters that break storage URLs (`#`, whitespace) with `_`.
pub fn safe_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if c == '#' || c.is_whitespace() { '_' } else { c })
        .collect()
}

/// 20 hex chars; valid as a storage file id (alphanumeric, <= 36 chars).
fn unique_file_id() -> String {
    let mut bytes = [0u8; 10];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[derive(Deserialize)]
struct CreateFileResponse {
    #[serde(rename = "$id")]
    id: String,
}

/// Appwrite storage client (`POST /storage/buckets/{bucket}/files`).
#[derive(Clone)]
pub struct AppwriteStore {
    endpoint: String,
    project_id: String,
    api_key: String,
    bucket_id: String,
    http: reqwest::Client,
}

impl AppwriteStore {
    pub fn new(
        endpoint: &str,
        project_id: &str,
        api_key: &str,
        bucket_id: &str,
        timeout: Duration,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            project_id: project_id.to_string(),
            api_key: api_key.to_string(),
            bucket_id: bucket_id.to_string(),
            http,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            &config.storage_endpoint,
            &config.storage_project_id,
            &config.storage_api_key,
            &config.storage_bucket_id,
            config.upload_timeout(),
        )
    }

    /// Public view URL for a stored file.
    pub fn view_url(&self, file_id: &str) -> String {
        format!(
            "{}/storage/buckets/{}/files/{}/view?project={}",
            self.endpoint, self.bucket_id, file_id, self.project_id
        )
    }
}

impl AssetStore for AppwriteStore {
    async fn upload(
        &self,
        bytes: Vec<u8>,
        content_type: &str,
        filename: &str,
    ) -> Result<StoredAsset> {
        let file_name = safe_file_name(filename);
        let size = bytes.len();
        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name.clone());
        let part = match part.mime_str(content_type) {
            Ok(p) => p,
            Err(_) => {
                return Err(Error::validation(format!("Invalid content type: {content_type}")));
            }
        };
        let form = reqwest::multipart::Form::new()
            .text("fileId", unique_file_id())
            .part("file", part);

        let url = format!("{}/storage/buckets/{}/files", self.endpoint, self.bucket_id);
        let resp = self
            .http
            .post(&url)
            .header("X-Appwrite-Project", &self.project_id)
            .header("X-Appwrite-Key", &self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "Storage request failed");
                Error::Upload(e.to_string())
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = upstream_message(&body);
            tracing::warn!(%status, %message, "Storage rejected upload");
            return Err(Error::Upload(if message.is_empty() {
                format!("storage returned {status}")
            } else {
                message
            }));
        }

        let created: CreateFileResponse = resp
            .json()
            .await
            .map_err(|e| Error::Upload(format!("Invalid storage response: {e}")))?;

        let asset = StoredAsset { url: self.view_url(&created.id), id: created.id };
        tracing::info!(id = %asset.id, file = %file_name, size, "Logo stored");
        Ok(asset)
    }
}
