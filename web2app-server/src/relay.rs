//! Download relay.
//!
//! Browsers cannot save the APK straight from the build server (different
//! origin, wrong headers), so the artifact is fetched here and streamed
//! back as an attachment. The body is never buffered in full.

use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

use crate::config::DEFAULT_DOWNLOAD_FILENAME;
use crate::error::{Error, Result};

pub const APK_CONTENT_TYPE: &str = "application/vnd.android.package-archive";

/// Path of the relay endpoint.
pub const RELAY_PATH: &str = "/api/download-apk";

/// Drop characters that would break out of the quoted header parameter.
pub fn header_safe_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !c.is_control() && *c != '"' && *c != '\\')
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        DEFAULT_DOWNLOAD_FILENAME.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Relative link that downloads `download_url` through the relay.
pub fn relay_link(download_url: &str, filename: &str) -> String {
    format!(
        "{RELAY_PATH}?url={}&filename={}",
        utf8_percent_encode(download_url, NON_ALPHANUMERIC),
        utf8_percent_encode(filename, NON_ALPHANUMERIC)
    )
}

#[derive(Clone)]
pub struct Relay {
    http: reqwest::Client,
    allowed_hosts: Vec<String>,
}

impl Relay {
    /// `idle_timeout` bounds connecting and each wait for the next body
    /// chunk. There is no overall deadline: a large artifact may take as
    /// long as it needs while bytes keep arriving.
    pub fn new(idle_timeout: Duration, allowed_hosts: Vec<String>) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(idle_timeout)
            .read_timeout(idle_timeout)
            .build()
            .unwrap_or_default();
        let allowed_hosts = allowed_hosts
            .into_iter()
            .map(|h| h.trim().to_ascii_lowercase())
            .filter(|h| !h.is_empty())
            .collect();
        Self { http, allowed_hosts }
    }

    /// True when any http(s) host may be fetched.
    pub fn is_unrestricted(&self) -> bool {
        self.allowed_hosts.is_empty()
    }

    /// Validate the caller-supplied source URL.
    pub fn check_source(&self, source_url: &str) -> Result<url::Url> {
        let parsed = url::Url::parse(source_url)
            .map_err(|_| Error::validation("Download URL is not a valid URL"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::validation("Download URL must use http or https"));
        }
        if !self.allowed_hosts.is_empty() {
            let host = parsed.host_str().unwrap_or("").to_ascii_lowercase();
            if !self.allowed_hosts.iter().any(|h| *h == host) {
                return Err(Error::validation("Download host is not allowed"));
            }
        }
        Ok(parsed)
    }

    /// Fetch `source_url` and stream it back as `filename`.
    pub async fn relay(&self, source_url: &str, filename: Option<&str>) -> Result<Response> {
        let source = self.check_source(source_url)?;
        let filename = header_safe_filename(filename.unwrap_or(DEFAULT_DOWNLOAD_FILENAME));

        let upstream = self.http.get(source.clone()).send().await.map_err(|e| {
            tracing::warn!(url = %source, error = %e, "Relay fetch failed");
            Error::Relay(e.to_string())
        })?;

        let status = upstream.status();
        if !status.is_success() {
            tracing::warn!(url = %source, %status, "Relay upstream error");
            return Err(Error::Relay(format!("upstream returned {status}")));
        }

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(APK_CONTENT_TYPE));
        let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{filename}\""))
            .map_err(|_| Error::validation("Invalid filename"))?;
        headers.insert(header::CONTENT_DISPOSITION, disposition);
        if let Some(len) = upstream.headers().get(header::CONTENT_LENGTH) {
            headers.insert(header::CONTENT_LENGTH, len.clone());
        }

        tracing::info!(
            url = %source,
            file = %filename,
            length = ?upstream.content_length(),
            "Relaying artifact"
        );
        let body = Body::from_stream(upstream.bytes_stream());
        Ok((StatusCode::OK, headers, body).into_response())
    }
}
