use std::net::SocketAddr;
use std::sync::Arc;

use axum::{Router, routing::get, routing::post};
use tokio::net::TcpListener;
use tower_http::{decompression::RequestDecompressionLayer, trace::TraceLayer};
use tracing::{info, warn};

use super::{
    services::{health, serve_video, stream_job_events, submit_download},
    state::AppState,
};
use crate::config::Config;
use crate::extractor::{SystemRunner, ToolRunner};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Router with every endpoint, for the server and for tests
pub fn build_router(state: AppState) -> Router {
    let prefix = state.config.storage.public_prefix.trim_end_matches('/');
    let video_route = format!("{prefix}/{{filename}}");

    Router::new()
        .route("/api/download-video", post(submit_download))
        .route("/api/jobs/{job_id}/events", get(stream_job_events))
        .route(&video_route, get(serve_video))
        .route("/health", get(health))
        .with_state(state)
        .layer(RequestDecompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}

pub async fn run(config: Config, address: Option<SocketAddr>) -> Result<(), AnyError> {
    let address = address.unwrap_or(config.server.bind_addr);

    let runner = SystemRunner::new(config.extractor.binary.clone());
    match runner.version().await {
        Ok(version) => info!(
            binary = %config.extractor.binary.display(),
            %version,
            "Extraction tool found"
        ),
        // Jobs fail fast with DependencyUnavailable until the tool is installed
        Err(e) => warn!(error = %e, "Extraction tool is not runnable"),
    }

    let state = AppState::new(config, Arc::new(runner))?;
    let app = build_router(state);

    let listener = TcpListener::bind(address).await?;
    info!(%address, "vidfetch listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
