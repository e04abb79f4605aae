//! Error taxonomy for build requests and the download relay.
//!
//! Every variant is terminal for the request that produced it. Handlers
//! return these directly; [`IntoResponse`] turns them into a JSON body of
//! the form `{"error": ..., "details": ...}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Missing or malformed input. Never reaches a collaborator.
    #[error("{0}")]
    Validation(String),

    /// The asset-storage collaborator rejected the logo or was unreachable.
    #[error("Logo upload failed: {0}")]
    Upload(String),

    /// The build collaborator failed. `status` is the upstream HTTP status
    /// when one was received.
    #[error("Failed to build APK: {message}")]
    Build { status: Option<u16>, message: String },

    /// The relay could not fetch the upstream artifact.
    #[error("Failed to download file: {0}")]
    Relay(String),

    /// No valid session.
    #[error("Authentication required")]
    Auth,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse error class, used in progress streams and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Upload,
    Build,
    Relay,
    Auth,
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::Upload(_) => ErrorKind::Upload,
            Error::Build { .. } => ErrorKind::Build,
            Error::Relay(_) => ErrorKind::Relay,
            Error::Auth => ErrorKind::Auth,
        }
    }

    /// The collaborator-provided detail, without the category prefix.
    pub fn detail(&self) -> Option<&str> {
        match self {
            Error::Upload(m) | Error::Relay(m) => Some(m),
            Error::Build { message, .. } => Some(message),
            Error::Validation(_) | Error::Auth => None,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Auth => StatusCode::UNAUTHORIZED,
            Error::Upload(_) | Error::Relay(_) => StatusCode::BAD_GATEWAY,
            // Pass the build server's own error status through.
            Error::Build { status, .. } => status
                .and_then(|s| StatusCode::from_u16(s).ok())
                .filter(|s| s.is_client_error() || s.is_server_error())
                .unwrap_or(StatusCode::BAD_GATEWAY),
        }
    }
}

/// Pick the human-readable part of a collaborator's error body.
///
/// JSON bodies are searched for `error`, `message` and `detail` (in that
/// order); anything else is returned trimmed, as-is.
pub(crate) fn upstream_message(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["error", "message", "detail"] {
            if let Some(msg) = json.get(key).and_then(|v| v.as_str()) {
                return msg.to_string();
            }
        }
    }
    body.trim().to_string()
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a str>,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            error: self.to_string(),
            details: self.detail(),
        };
        (status, Json(body)).into_response()
    }
}
