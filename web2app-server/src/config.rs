//! Server configuration.
//!
//! Every option can be given on the command line or through the matching
//! `WEB2APP_*` environment variable. Collaborator credentials are usually
//! supplied through the environment.

use std::time::Duration;

use clap::Parser;

/// Default Android package namespace (`com.<namespace>.<app>`).
pub const DEFAULT_NAMESPACE: &str = "web2app";
/// Filename used by the relay when the caller does not pick one.
pub const DEFAULT_DOWNLOAD_FILENAME: &str = "app.apk";

#[derive(Parser, Debug, Clone)]
#[command(name = "web2app-server", about = "Website-to-APK conversion service")]
pub struct ServerConfig {
    /// Address for the HTTP API.
    #[arg(long, env = "WEB2APP_LISTEN_ADDR", default_value = "127.0.0.1:8080")]
    pub listen_addr: String,

    /// Public origin of this service (used in CORS and logs).
    #[arg(long, env = "WEB2APP_PUBLIC_URL")]
    pub public_url: Option<String>,

    /// Base URL of the asset storage API (e.g. https://cloud.appwrite.io/v1).
    #[arg(long, env = "APPWRITE_ENDPOINT", default_value = "http://127.0.0.1:8090/v1")]
    pub storage_endpoint: String,

    /// Storage project identifier.
    #[arg(long, env = "APPWRITE_PROJECT_ID", default_value = "")]
    pub storage_project_id: String,

    /// Storage API key.
    #[arg(long, env = "APPWRITE_API_KEY", default_value = "", hide_env_values = true)]
    pub storage_api_key: String,

    /// Bucket that receives uploaded logos.
    #[arg(long, env = "APPWRITE_BUCKET_ID", default_value = "")]
    pub storage_bucket_id: String,

    /// Base URL of the APK build service.
    #[arg(long, env = "WEB2APP_BUILD_URL", default_value = "http://127.0.0.1:8091")]
    pub build_url: String,

    /// Namespace segment of generated package names.
    #[arg(long, env = "WEB2APP_PACKAGE_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    pub package_namespace: String,

    /// Shared secret used to verify session tokens from the identity provider.
    /// Without it every authenticated route answers 401.
    #[arg(long, env = "WEB2APP_SESSION_SECRET", hide_env_values = true)]
    pub session_secret: Option<String>,

    /// Largest accepted logo upload, in bytes.
    #[arg(long, env = "WEB2APP_MAX_LOGO_BYTES", default_value_t = 5 * 1024 * 1024)]
    pub max_logo_bytes: usize,

    /// Timeout for the build call. Builds routinely take several minutes.
    #[arg(long, env = "WEB2APP_BUILD_TIMEOUT_SECS", default_value_t = 900)]
    pub build_timeout_secs: u64,

    /// Timeout for storage uploads.
    #[arg(long, env = "WEB2APP_UPLOAD_TIMEOUT_SECS", default_value_t = 60)]
    pub upload_timeout_secs: u64,

    /// Relay connect and idle-read timeout. Not a total deadline: slow but
    /// steady downloads are never cut off.
    #[arg(long, env = "WEB2APP_RELAY_TIMEOUT_SECS", default_value_t = 300)]
    pub relay_timeout_secs: u64,

    /// Hosts the download relay may fetch from (repeatable). Empty = any host.
    #[arg(long = "relay-allow-host", env = "WEB2APP_RELAY_ALLOWED_HOSTS", value_delimiter = ',')]
    pub relay_allowed_hosts: Vec<String>,

    /// Delay between the early progress steps, in milliseconds.
    #[arg(long, env = "WEB2APP_STEP_DELAY_MS", default_value_t = 400)]
    pub step_delay_ms: u64,

    /// Delay between the closing progress steps, in milliseconds.
    #[arg(long, env = "WEB2APP_FINISH_DELAY_MS", default_value_t = 350)]
    pub finish_delay_ms: u64,

    /// Directory with a prebuilt web front-end to serve at `/`.
    #[arg(long, env = "WEB2APP_WEB_STATIC_DIR")]
    pub web_static_dir: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            public_url: None,
            storage_endpoint: "http://127.0.0.1:8090/v1".to_string(),
            storage_project_id: String::new(),
            storage_api_key: String::new(),
            storage_bucket_id: String::new(),
            build_url: "http://127.0.0.1:8091".to_string(),
            package_namespace: DEFAULT_NAMESPACE.to_string(),
            session_secret: None,
            max_logo_bytes: 5 * 1024 * 1024,
            build_timeout_secs: 900,
            upload_timeout_secs: 60,
            relay_timeout_secs: 300,
            relay_allowed_hosts: Vec::new(),
            step_delay_ms: 400,
            finish_delay_ms: 350,
            web_static_dir: None,
        }
    }
}

impl ServerConfig {
    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    pub fn relay_timeout(&self) -> Duration {
        Duration::from_secs(self.relay_timeout_secs)
    }

    pub fn auth_enabled(&self) -> bool {
        self.session_secret.as_deref().is_some_and(|s| !s.is_empty())
    }

    /// Allowed CORS origins: the public URL plus local dev servers.
    pub fn cors_origins(&self) -> Vec<String> {
        let mut origins = vec![
            "http://127.0.0.1:3000".to_string(), // next/vite dev
            "http://localhost:3000".to_string(),
        ];
        if let Some(ref public) = self.public_url {
            origins.push(public.trim_end_matches('/').to_string());
        }
        origins
    }
}
