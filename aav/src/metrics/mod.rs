//! Metrics and instrumentation for protocol runs.
//!
//! This module defines Prometheus-compatible metrics for the orchestrator
//! and the ledger client, and exposes a small HTTP exporter that serves
//! `/metrics` in Prometheus text format.
//!
//! Typical usage:
//!
//! ```ignore
//! use std::sync::Arc;
//! use aav::metrics::{MetricsRegistry, run_prometheus_http_server};
//!
//! let registry = Arc::new(MetricsRegistry::new()?);
//! tokio::spawn(run_prometheus_http_server(registry.clone(), cfg.metrics.listen_addr));
//!
//! let orchestrator = Orchestrator::new(/* ... */).with_metrics(registry.clone());
//! ```

pub mod prometheus;

pub use prometheus::{MetricsRegistry, ProtocolMetrics, run_prometheus_http_server};
