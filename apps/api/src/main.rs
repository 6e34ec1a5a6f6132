mod artifacts;
mod compiler;
mod config;
mod errors;
mod extraction;
mod models;
mod pipeline;
mod routes;
mod state;
mod storage;
mod synthesis;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::compiler::PdflatexBackend;
use crate::config::Config;
use crate::pipeline::Pipeline;
use crate::routes::build_router;
use crate::state::AppState;
use crate::storage::{ArtifactStore, S3ArtifactStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on malformed env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Vitae v{}", env!("CARGO_PKG_VERSION"));

    // Initialize compiler backend and pipeline
    let engine = Arc::new(config.engine.clone());
    let backend = Arc::new(PdflatexBackend::new(engine.pdflatex_path.clone()));
    info!(
        "Compiler: {} (timeout {:?}, {} retries, {} concurrent)",
        engine.pdflatex_path.display(),
        engine.compile_timeout,
        engine.max_compile_retries,
        engine.max_concurrent_compiles
    );
    let pipeline = Arc::new(Pipeline::new(engine, backend));

    // Workspaces left behind by a crashed process
    let swept = pipeline.artifacts().sweep_stale();
    if swept > 0 {
        info!(
            "Removed {swept} stale workspaces under {}",
            pipeline.artifacts().root().display()
        );
    }

    // Initialize S3 / MinIO (optional)
    let store: Option<Arc<dyn ArtifactStore>> = match &config.storage {
        Some(storage) => {
            let store: Arc<dyn ArtifactStore> = Arc::new(S3ArtifactStore::from_config(storage).await);
            info!("S3 artifact store initialized (bucket: {})", storage.bucket);
            Some(store)
        }
        None => {
            info!("S3_BUCKET not set, PDFs are returned inline");
            None
        }
    };

    // Build app state
    let state = AppState {
        pipeline,
        store,
        config: config.clone(),
    };

    let app = build_router(state);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, draining in-flight requests");
}
