//! Website-to-APK conversion service.
//!
//! A user submits a website URL, an app name and a logo. The logo goes to
//! asset storage, the build service turns the three into an APK, and the
//! APK is relayed back to the browser as a download.
//!
//! - `orchestrator` — one request: validate, upload, build, progress
//! - `relay` — streaming download proxy
//! - `web` — axum routes; `server` — listener lifecycle

pub mod auth;
pub mod builder;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod package;
pub mod progress;
pub mod relay;
pub mod server;
pub mod storage;
pub mod web;

pub use error::{Error, Result};
