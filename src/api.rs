//! HTTP surface for the X-ray assistant
//!
//! Serves the single page UI and the JSON endpoints it talks to.

mod assets;
mod handlers;
mod submission;
mod types;

pub use handlers::create_router;
#[allow(unused_imports)] // Public API re-exports
pub use types::*;

use crate::config::AppConfig;
use crate::gateway::InferenceGateway;
use crate::session::SessionStore;
use std::path::PathBuf;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<InferenceGateway>,
    pub sessions: Arc<SessionStore>,
    pub scratch_dir: PathBuf,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(gateway: InferenceGateway, config: &AppConfig) -> Self {
        Self {
            gateway: Arc::new(gateway),
            sessions: Arc::new(SessionStore::new(config.session_idle_timeout)),
            scratch_dir: config.scratch_dir.clone(),
            max_upload_bytes: config.max_upload_bytes,
        }
    }
}
