//! HTTP API.
//!
//! - `POST /api/upload-logo`   multipart `file` → stored logo URL
//! - `POST /api/generate-app`  JSON, logo already uploaded → download URL
//! - `POST /api/builds`        multipart, whole flow, NDJSON progress stream
//! - `GET  /api/download-apk`  streaming relay for the finished APK
//!
//! The three POST routes require a session; see [`crate::auth`].

use std::convert::Infallible;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;

use crate::auth::AuthSession;
use crate::builder::RemoteBuilder;
use crate::config::ServerConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::orchestrator::{BuildInput, BuildRequest, BuildResult, LogoFile, Orchestrator};
use crate::progress::{Pacing, ProgressEvent};
use crate::relay::{self, Relay};
use crate::storage::{AppwriteStore, AssetStore};

/// Immutable per-process state. Holds no per-request data.
pub struct AppState {
    pub config: ServerConfig,
    pub store: AppwriteStore,
    pub builder: RemoteBuilder,
    pub relay: Relay,
    pub pacing: Pacing,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let store = AppwriteStore::from_config(&config);
        let builder = RemoteBuilder::new(&config.build_url, config.build_timeout());
        let relay = Relay::new(config.relay_timeout(), config.relay_allowed_hosts.clone());
        let pacing = Pacing::from_millis(config.step_delay_ms, config.finish_delay_ms);
        Self { config, store, builder, relay, pacing }
    }

    pub fn orchestrator(&self) -> Orchestrator<'_, AppwriteStore, RemoteBuilder> {
        Orchestrator::new(&self.store, &self.builder, &self.config.package_namespace, self.pacing)
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    // Multipart overhead on top of the logo itself.
    let body_limit = state.config.max_logo_bytes + 64 * 1024;

    let mut app = Router::new()
        .route("/health", get(health))
        .route("/api/upload-logo", post(upload_logo))
        .route("/api/generate-app", post(generate_app))
        .route("/api/builds", post(start_build))
        .route(relay::RELAY_PATH, get(download_apk))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer({
            use axum::http::Method;
            use tower_http::cors::AllowOrigin;
            let origins = state.config.cors_origins();
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins.iter().filter_map(|o| o.parse().ok())))
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
                .allow_credentials(true)
        });

    if let Some(ref web_dir) = state.config.web_static_dir {
        let dir = std::path::PathBuf::from(web_dir);
        if dir.exists() {
            tracing::info!("Serving web front-end from {}", dir.display());
            let index_path = dir.join("index.html");
            let serve = tower_http::services::ServeDir::new(&dir)
                .append_index_html_on_directories(true)
                .fallback(tower_http::services::ServeFile::new(index_path));
            app = app.fallback_service(serve);
        } else {
            tracing::warn!("Web static dir not found: {}", dir.display());
        }
    }

    app.with_state(state)
        .layer(axum::middleware::from_fn(security_headers))
}

async fn health() -> &'static str {
    "ok"
}

// ── Multipart ──────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct BuildForm {
    website_url: String,
    app_name: String,
    logo: Option<LogoFile>,
}

async fn read_form(mut multipart: Multipart, max_logo_bytes: usize) -> Result<BuildForm> {
    let mut form = BuildForm::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::validation(format!("Multipart error: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" | "logo" => {
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let filename = field.file_name().unwrap_or("logo").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| Error::validation(format!("File read error: {e}")))?;
                if bytes.len() > max_logo_bytes {
                    return Err(Error::validation(format!(
                        "File too large (max {} bytes)",
                        max_logo_bytes
                    )));
                }
                if !content_type.starts_with("image/") {
                    return Err(Error::validation("Logo must be an image"));
                }
                form.logo = Some(LogoFile { bytes: bytes.to_vec(), content_type, filename });
            }
            "websiteUrl" => {
                form.website_url = field
                    .text()
                    .await
                    .map_err(|e| Error::validation(format!("Field read error: {e}")))?;
            }
            "appName" => {
                form.app_name = field
                    .text()
                    .await
                    .map_err(|e| Error::validation(format!("Field read error: {e}")))?;
            }
            _ => {}
        }
    }
    Ok(form)
}

// ── Upload ─────────────────────────────────────────────────────────────

async fn upload_logo(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
    multipart: Multipart,
) -> Result<Json<serde_json::Value>> {
    let form = read_form(multipart, state.config.max_logo_bytes).await?;
    let logo = form
        .logo
        .filter(|l| !l.bytes.is_empty())
        .ok_or_else(|| Error::validation("No file provided"))?;

    let asset = state
        .store
        .upload(logo.bytes, &logo.content_type, &logo.filename)
        .await?;
    tracing::info!(user = %session.user_id, id = %asset.id, "Logo uploaded");

    Ok(Json(serde_json::json!({
        "success": true,
        "fileId": asset.id,
        "fileUrl": asset.url,
    })))
}

// ── Build (logo uploaded separately) ───────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    #[serde(default)]
    website_url: String,
    #[serde(default)]
    app_name: String,
    /// URL returned by `/api/upload-logo`.
    #[serde(default)]
    logo_file: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    success: bool,
    download_url: String,
    relay_url: String,
    package_name: String,
    message: &'static str,
}

const LOGO_REQUIRED: &str = "Please upload a logo image before generating the app.";

fn apk_filename(app_name: &str) -> String {
    format!("{}.apk", app_name.trim())
}

async fn generate_app(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>> {
    // The logo is checked before anything else, as in the streamed flow.
    let logo_url = req
        .logo_file
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| Error::validation(LOGO_REQUIRED))?;
    let mut request =
        BuildRequest::new(&req.website_url, &req.app_name, &state.config.package_namespace)?;
    request.logo_asset_url = Some(logo_url);

    tracing::info!(user = %session.user_id, package = %request.package_name, "Build requested");
    let download_url = state.orchestrator().build_request(&request).await?;

    Ok(Json(GenerateResponse {
        success: true,
        relay_url: relay::relay_link(&download_url, &apk_filename(&request.app_name)),
        download_url,
        package_name: request.package_name,
        message: "APK built successfully",
    }))
}

// ── Build (whole flow, streamed) ───────────────────────────────────────

/// One line of the `/api/builds` NDJSON stream.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum StreamEvent {
    Progress {
        step: usize,
        label: &'static str,
    },
    #[serde(rename_all = "camelCase")]
    Complete {
        download_url: String,
        relay_url: String,
    },
    Failed {
        kind: ErrorKind,
        message: String,
    },
}

impl StreamEvent {
    fn finished(result: BuildResult, filename: &str) -> Self {
        match result.into_result() {
            Ok(download_url) => StreamEvent::Complete {
                relay_url: relay::relay_link(&download_url, filename),
                download_url,
            },
            Err(e) => StreamEvent::Failed { kind: e.kind(), message: e.to_string() },
        }
    }

    fn to_line(&self) -> String {
        let mut line = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        line.push('\n');
        line
    }
}

impl From<ProgressEvent> for StreamEvent {
    fn from(ev: ProgressEvent) -> Self {
        StreamEvent::Progress { step: ev.step, label: ev.label }
    }
}

async fn start_build(
    State(state): State<Arc<AppState>>,
    session: AuthSession,
    multipart: Multipart,
) -> Result<Response> {
    let form = read_form(multipart, state.config.max_logo_bytes).await?;

    // Report input errors as a plain 400 before the stream starts.
    if form.logo.as_ref().is_none_or(|l| l.bytes.is_empty()) {
        return Err(Error::validation(LOGO_REQUIRED));
    }
    let request =
        BuildRequest::new(&form.website_url, &form.app_name, &state.config.package_namespace)?;
    let filename = apk_filename(&request.app_name);
    tracing::info!(user = %session.user_id, package = %request.package_name, "Build stream started");

    let input = BuildInput {
        target_url: form.website_url,
        app_name: form.app_name,
        logo: form.logo,
    };
    let (tx, rx) = mpsc::unbounded_channel();
    let task_state = state.clone();
    // Runs to completion even if the client disconnects.
    let handle = tokio::spawn(async move { task_state.orchestrator().run(input, Some(tx)).await });

    let stream = futures::stream::unfold(Some((rx, handle)), move |pending| {
        let filename = filename.clone();
        async move {
            let (mut rx, handle) = pending?;
            let event = match rx.recv().await {
                Some(progress) => {
                    let line = StreamEvent::from(progress).to_line();
                    return Some((Ok::<_, Infallible>(line), Some((rx, handle))));
                }
                None => match handle.await {
                    Ok(result) => StreamEvent::finished(result, &filename),
                    Err(e) => {
                        tracing::error!(error = %e, "Build task panicked");
                        StreamEvent::Failed {
                            kind: ErrorKind::Build,
                            message: "Build task aborted".to_string(),
                        }
                    }
                },
            };
            Some((Ok(event.to_line()), None))
        }
    });

    let mut resp = Body::from_stream(stream).into_response();
    let headers = resp.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/x-ndjson"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    *resp.status_mut() = StatusCode::OK;
    Ok(resp)
}

// ── Relay ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct DownloadQuery {
    url: Option<String>,
    filename: Option<String>,
}

async fn download_apk(
    State(state): State<Arc<AppState>>,
    Query(q): Query<DownloadQuery>,
) -> Result<Response> {
    let url = q
        .url
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| Error::validation("Download URL is required"))?;
    state.relay.relay(url.trim(), q.filename.as_deref()).await
}

// ── Middleware ─────────────────────────────────────────────────────────

async fn security_headers(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let mut resp = next.run(req).await;
    let headers = resp.headers_mut();
    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert(
        "Referrer-Policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(
        "Strict-Transport-Security",
        HeaderValue::from_static("max-age=63072000; includeSubDomains"),
    );
    resp
}
