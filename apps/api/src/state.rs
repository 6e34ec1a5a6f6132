use std::sync::Arc;

use crate::config::Config;
use crate::pipeline::Pipeline;
use crate::storage::ArtifactStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    /// Present when `S3_BUCKET` is configured; rendered PDFs are then uploaded.
    pub store: Option<Arc<dyn ArtifactStore>>,
    pub config: Config,
}
