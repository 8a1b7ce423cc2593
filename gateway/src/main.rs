// gateway/src/main.rs

//! API gateway binary.
//!
//! This binary exposes a small HTTP API on top of the `aav` crate:
//!
//! - `GET /health`
//! - `GET /metrics`
//! - `POST /runs`
//!
//! It embeds one `Orchestrator` shared by all requests and a Prometheus
//! metrics exporter on `/metrics`.

mod config;
mod routes;
mod state;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tokio::signal;

use aav::{MetricsRegistry, Orchestrator, run_prometheus_http_server};
use config::ApiConfig;
use routes::{health, runs};
use state::{AppState, SharedState};

#[tokio::main]
async fn main() {
    // Basic tracing setup.
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "aav_gateway=info,aav=info".to_string()),
        )
        .init();

    if let Err(e) = run().await {
        eprintln!("fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let api_cfg = ApiConfig::from_env()?;
    let aav_cfg = &api_cfg.aav;

    // ---------------------------
    // Metrics
    // ---------------------------

    let metrics = Arc::new(
        MetricsRegistry::new()
            .map_err(|e| format!("failed to initialise metrics registry: {e}"))?,
    );

    if aav_cfg.metrics.enabled {
        let metrics_clone = metrics.clone();
        let addr = aav_cfg.metrics.listen_addr;
        tokio::spawn(async move {
            if let Err(e) = run_prometheus_http_server(metrics_clone, addr).await {
                tracing::error!("metrics HTTP server error: {e}");
            }
        });
        tracing::info!("metrics exporter listening on http://{}/metrics", addr);
    }

    // ---------------------------
    // Orchestrator
    // ---------------------------

    let orchestrator = Orchestrator::from_config(aav_cfg)
        .map_err(|e| format!("failed to initialise orchestrator: {e}"))?
        .with_metrics(metrics.clone());

    tracing::info!(
        provider = %aav_cfg.crypto.base_url,
        channel = %aav_cfg.ledger.channel,
        peers = aav_cfg.ledger.peers.len(),
        "orchestrator ready"
    );

    let app_state: SharedState = Arc::new(AppState {
        orchestrator,
        metrics,
    });

    // ---------------------------
    // HTTP router
    // ---------------------------

    let app = Router::new()
        .route("/health", get(health::health))
        .route("/metrics", get(health::metrics))
        .route("/runs", post(runs::start_run))
        .with_state(app_state);

    tracing::info!("API gateway listening on http://{}", api_cfg.listen_addr);

    let listener = tokio::net::TcpListener::bind(api_cfg.listen_addr)
        .await
        .map_err(|e| format!("failed to bind {}: {e}", api_cfg.listen_addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| format!("API server error: {e}"))?;

    Ok(())
}

/// Waits for Ctrl-C and returns, used for graceful shutdown.
async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
