//! Client for the remote APK build service.
//!
//! One request, one response: the service answers only once the APK is
//! built (which takes minutes), so the call is awaited with a long timeout
//! and never retried.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result, upstream_message};

/// Body of `POST /build-apk`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildPayload {
    pub app_name: String,
    pub app_url: String,
    pub logo_url: String,
    pub package_name: String,
}

#[derive(Debug, Deserialize)]
struct BuildResponse {
    #[serde(rename = "downloadUrl", alias = "download_url")]
    download_url: Option<String>,
}

/// The build collaborator. Resolves to the artifact's download URL.
pub trait BuildService: Send + Sync {
    fn build(&self, payload: &BuildPayload) -> impl Future<Output = Result<String>> + Send;
}

#[derive(Clone)]
pub struct RemoteBuilder {
    base_url: String,
    http: reqwest::Client,
}

impl RemoteBuilder {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { base_url: base_url.trim_end_matches('/').to_string(), http }
    }

    fn endpoint(&self) -> String {
        format!("{}/build-apk", self.base_url)
    }
}

impl BuildService for RemoteBuilder {
    async fn build(&self, payload: &BuildPayload) -> Result<String> {
        tracing::info!(
            app = %payload.app_name,
            url = %payload.app_url,
            package = %payload.package_name,
            "Sending build request"
        );

        let resp = self
            .http
            .post(self.endpoint())
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "Build server unreachable");
                Error::Build { status: None, message: e.to_string() }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let message = upstream_message(&body);
            tracing::warn!(%status, %message, "Build server error");
            return Err(Error::Build {
                status: Some(status.as_u16()),
                message: if message.is_empty() { status.to_string() } else { message },
            });
        }

        let parsed: BuildResponse = resp.json().await.map_err(|e| Error::Build {
            status: Some(status.as_u16()),
            message: format!("Invalid build server response: {e}"),
        })?;

        match parsed.download_url.filter(|u| !u.is_empty()) {
            Some(url) => {
                tracing::info!(package = %payload.package_name, download = %url, "Build finished");
                Ok(url)
            }
            None => Err(Error::Build {
                status: Some(status.as_u16()),
                message: "No download URL received".to_string(),
            }),
        }
    }
}
