//! Shared application state.

use std::sync::Arc;

use aav::{MetricsRegistry, Orchestrator};

/// Shared state held by the request handlers.
///
/// This is wrapped in an [`Arc`] and passed to request handlers via Axum's
/// `State` extractor. Runs are independent; the orchestrator only shares
/// HTTP clients and the identity cache between them.
pub struct AppState {
    pub orchestrator: Orchestrator,
    /// Metrics registry shared between the orchestrator and the exporter.
    pub metrics: Arc<MetricsRegistry>,
}

/// Thread-safe alias for `AppState`.
pub type SharedState = Arc<AppState>;
