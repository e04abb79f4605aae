//! Build request orchestration: validate → upload logo → build → ready.
//!
//! Each call to [`Orchestrator::run`] owns its own [`BuildRequest`] and
//! [`ProgressTracker`]; nothing is shared between requests and nothing is
//! kept afterwards. Every failure is terminal and is reported in the
//! returned [`BuildResult`].

use serde::Serialize;
use tokio::sync::mpsc;

use crate::builder::{BuildPayload, BuildService};
use crate::error::{Error, Result};
use crate::package;
use crate::progress::{Pacing, ProgressEvent, ProgressTracker};
use crate::storage::AssetStore;

/// A logo as received from the user, not yet uploaded.
#[derive(Debug, Clone)]
pub struct LogoFile {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub filename: String,
}

/// What the user submitted.
#[derive(Debug, Clone, Default)]
pub struct BuildInput {
    pub target_url: String,
    pub app_name: String,
    pub logo: Option<LogoFile>,
}

/// The validated request, filled in as the steps run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    pub target_url: String,
    pub app_name: String,
    pub package_name: String,
    pub logo_asset_url: Option<String>,
}

impl BuildRequest {
    /// Validate the text fields and derive the package name.
    pub fn new(target_url: &str, app_name: &str, namespace: &str) -> Result<Self> {
        let app_name = app_name.trim();
        if app_name.is_empty() {
            return Err(Error::validation("App name is required"));
        }
        if package::sanitize_app_name(app_name).is_empty() {
            return Err(Error::validation("App name must contain at least one letter or digit"));
        }

        let target_url = target_url.trim();
        if target_url.is_empty() {
            return Err(Error::validation("Website URL is required"));
        }
        let parsed = url::Url::parse(target_url)
            .map_err(|_| Error::validation(format!("Invalid website URL: {target_url}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::validation("Website URL must use http or https"));
        }

        Ok(Self {
            target_url: target_url.to_string(),
            app_name: app_name.to_string(),
            package_name: package::derive_package_name(namespace, app_name),
            logo_asset_url: None,
        })
    }

    /// The build call body. Fails if the logo has not been uploaded yet.
    pub fn payload(&self) -> Result<BuildPayload> {
        let logo_url = self
            .logo_asset_url
            .clone()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| Error::validation("A logo image is required"))?;
        Ok(BuildPayload {
            app_name: self.app_name.clone(),
            app_url: self.target_url.clone(),
            logo_url,
            package_name: self.package_name.clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Pending,
    Success,
    Failed,
}

/// Outcome of one build request.
#[derive(Debug, Clone)]
pub struct BuildResult {
    pub status: BuildStatus,
    pub download_url: Option<String>,
    pub error: Option<Error>,
    /// Progress labels shown, in order.
    pub steps: Vec<&'static str>,
}

impl BuildResult {
    fn failed(error: Error, progress: &ProgressTracker) -> Self {
        Self {
            status: BuildStatus::Failed,
            download_url: None,
            error: Some(error),
            steps: progress.labels(),
        }
    }

    pub fn into_result(self) -> Result<String> {
        match (self.status, self.download_url, self.error) {
            (BuildStatus::Success, Some(url), _) => Ok(url),
            (_, _, Some(err)) => Err(err),
            _ => Err(Error::Build { status: None, message: "Build did not complete".into() }),
        }
    }
}

/// Sequences the collaborators for one request at a time.
pub struct Orchestrator<'a, S, B> {
    store: &'a S,
    builder: &'a B,
    namespace: &'a str,
    pacing: Pacing,
}

impl<'a, S: AssetStore, B: BuildService> Orchestrator<'a, S, B> {
    pub fn new(store: &'a S, builder: &'a B, namespace: &'a str, pacing: Pacing) -> Self {
        Self { store, builder, namespace, pacing }
    }

    /// Run the whole flow. Progress transitions go to `progress` if given.
    pub async fn run(
        &self,
        input: BuildInput,
        progress: Option<mpsc::UnboundedSender<ProgressEvent>>,
    ) -> BuildResult {
        let mut tracker = ProgressTracker::new(progress);

        // The logo check comes first: without it nothing may be sent anywhere.
        let Some(logo) = input.logo.filter(|l| !l.bytes.is_empty()) else {
            return BuildResult::failed(
                Error::validation("Please upload a logo image before generating the app."),
                &tracker,
            );
        };
        let mut request = match BuildRequest::new(&input.target_url, &input.app_name, self.namespace) {
            Ok(r) => r,
            Err(e) => return BuildResult::failed(e, &tracker),
        };

        match self.store.upload(logo.bytes, &logo.content_type, &logo.filename).await {
            Ok(asset) => request.logo_asset_url = Some(asset.url),
            Err(e) => {
                tracing::warn!(app = %request.app_name, error = %e, "Build aborted at upload");
                return BuildResult::failed(e, &tracker);
            }
        }

        tracker.run_until_building(self.pacing).await;

        let download_url = match self.build_request(&request).await {
            Ok(url) => url,
            Err(e) => return BuildResult::failed(e, &tracker),
        };

        tracker.run_to_ready(self.pacing).await;

        BuildResult {
            status: BuildStatus::Success,
            download_url: Some(download_url),
            error: None,
            steps: tracker.labels(),
        }
    }

    /// Step 3 alone, for callers that uploaded the logo separately.
    pub async fn build_request(&self, request: &BuildRequest) -> Result<String> {
        let payload = request.payload()?;
        self.builder.build(&payload).await.inspect_err(|e| {
            tracing::warn!(package = %request.package_name, error = %e, "Build failed");
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::progress::{BUILD_STEPS, BUILDING_STEP, READY_STEP};
    use crate::storage::StoredAsset;

    #[derive(Default)]
    struct StubStore {
        calls: AtomicUsize,
        fail_with: Option<String>,
    }

    impl AssetStore for StubStore {
        async fn upload(&self, _bytes: Vec<u8>, _ct: &str, _name: &str) -> Result<StoredAsset> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.fail_with {
                Some(ref msg) => Err(Error::Upload(msg.clone())),
                None => Ok(StoredAsset { id: "x".into(), url: "https://store/x.png".into() }),
            }
        }
    }

    enum Reply {
        Url(&'static str),
        Fail(u16, &'static str),
    }

    struct StubBuilder {
        reply: Reply,
        calls: AtomicUsize,
        last: Mutex<Option<BuildPayload>>,
    }

    impl StubBuilder {
        fn new(reply: Reply) -> Self {
            Self { reply, calls: AtomicUsize::new(0), last: Mutex::new(None) }
        }
    }

    impl BuildService for StubBuilder {
        async fn build(&self, payload: &BuildPayload) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some(payload.clone());
            match self.reply {
                Reply::Url(u) => Ok(u.to_string()),
                Reply::Fail(status, msg) => Err(Error::Build {
                    status: Some(status),
                    message: msg.to_string(),
                }),
            }
        }
    }

    fn logo() -> LogoFile {
        LogoFile {
            bytes: vec![0x89, b'P', b'N', b'G'],
            content_type: "image/png".into(),
            filename: "logo.png".into(),
        }
    }

    fn demo_input() -> BuildInput {
        BuildInput {
            target_url: "https://example.com".into(),
            app_name: "Demo".into(),
            logo: Some(logo()),
        }
    }

    #[tokio::test]
    async fn missing_logo_makes_no_calls() {
        let store = StubStore::default();
        let builder = StubBuilder::new(Reply::Url("https://build/demo.apk"));
        let orch = Orchestrator::new(&store, &builder, "web2app", Pacing::immediate());

        let input = BuildInput { logo: None, ..demo_input() };
        let result = orch.run(input, None).await;

        assert_eq!(result.status, BuildStatus::Failed);
        assert!(matches!(result.error, Some(Error::Validation(_))));
        assert!(result.download_url.is_none());
        assert!(result.steps.is_empty());
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
        assert_eq!(builder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn invalid_fields_make_no_calls() {
        let store = StubStore::default();
        let builder = StubBuilder::new(Reply::Url("https://build/demo.apk"));
        let orch = Orchestrator::new(&store, &builder, "web2app", Pacing::immediate());

        for input in [
            BuildInput { target_url: "not a url".into(), ..demo_input() },
            BuildInput { target_url: "ftp://example.com".into(), ..demo_input() },
            BuildInput { app_name: "   ".into(), ..demo_input() },
            BuildInput { app_name: "!!!".into(), ..demo_input() },
        ] {
            let result = orch.run(input, None).await;
            assert!(matches!(result.error, Some(Error::Validation(_))));
        }
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
        assert_eq!(builder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn upload_failure_skips_build() {
        let store = StubStore { fail_with: Some("Bucket not found".into()), ..Default::default() };
        let builder = StubBuilder::new(Reply::Url("https://build/demo.apk"));
        let orch = Orchestrator::new(&store, &builder, "web2app", Pacing::immediate());

        let result = orch.run(demo_input(), None).await;

        assert_eq!(result.status, BuildStatus::Failed);
        assert_eq!(result.error, Some(Error::Upload("Bucket not found".into())));
        assert_eq!(builder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn demo_build_succeeds() {
        let store = StubStore::default();
        let builder = StubBuilder::new(Reply::Url("https://build/demo.apk"));
        let orch = Orchestrator::new(&store, &builder, "web2app", Pacing::immediate());

        let result = orch.run(demo_input(), None).await;

        assert_eq!(result.status, BuildStatus::Success);
        assert_eq!(result.download_url.as_deref(), Some("https://build/demo.apk"));
        assert_eq!(builder.calls.load(Ordering::SeqCst), 1);

        let sent = builder.last.lock().unwrap().clone().unwrap();
        assert_eq!(
            sent,
            BuildPayload {
                app_name: "Demo".into(),
                app_url: "https://example.com".into(),
                logo_url: "https://store/x.png".into(),
                package_name: "com.web2app.demo".into(),
            }
        );
    }

    #[tokio::test]
    async fn build_failure_surfaces_message() {
        let store = StubStore::default();
        let builder = StubBuilder::new(Reply::Fail(500, "template missing"));
        let orch = Orchestrator::new(&store, &builder, "web2app", Pacing::immediate());

        let result = orch.run(demo_input(), None).await;

        assert_eq!(result.status, BuildStatus::Failed);
        assert!(result.download_url.is_none());
        let err = result.error.clone().unwrap();
        assert!(err.to_string().contains("template missing"));
        // The build label was shown, the completion labels were not.
        assert_eq!(result.steps.last(), Some(&BUILD_STEPS[BUILDING_STEP]));
        assert!(result.into_result().is_err());
    }

    #[tokio::test]
    async fn progress_is_ordered_and_waits_for_build() {
        let store = StubStore::default();
        let builder = StubBuilder::new(Reply::Url("https://build/demo.apk"));
        let orch = Orchestrator::new(&store, &builder, "web2app", Pacing::immediate());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let result = orch.run(demo_input(), Some(tx)).await;
        assert_eq!(result.status, BuildStatus::Success);

        let mut seen = Vec::new();
        while let Some(ev) = rx.recv().await {
            seen.push(ev.step);
        }
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        let building = seen.iter().position(|&s| s == BUILDING_STEP).unwrap();
        let first_after = seen.iter().position(|&s| s > BUILDING_STEP).unwrap();
        assert!(building < first_after);
        assert_eq!(seen.last(), Some(&READY_STEP));
    }

    #[tokio::test]
    async fn build_request_requires_logo_url() {
        let store = StubStore::default();
        let builder = StubBuilder::new(Reply::Url("https://build/demo.apk"));
        let orch = Orchestrator::new(&store, &builder, "web2app", Pacing::immediate());

        let request = BuildRequest::new("https://example.com", "Demo", "web2app").unwrap();
        assert!(matches!(orch.build_request(&request).await, Err(Error::Validation(_))));
        assert_eq!(builder.calls.load(Ordering::SeqCst), 0);
    }
}
