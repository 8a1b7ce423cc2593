//! Prometheus-backed metrics and HTTP exporter.
//!
//! This module defines a [`MetricsRegistry`] that owns a Prometheus
//! registry and the protocol metrics, and an async HTTP exporter that
//! serves `/metrics` using `hyper`.

use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use bytes::Bytes;
use http_body_util::Full;
use hyper::{
    Method, Request, Response, StatusCode, body::Incoming, header, server::conn::http1,
    service::service_fn,
};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{error, warn};

use prometheus::{
    self, Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts,
    Registry, TextEncoder,
};

/// Protocol run metrics.
///
/// Registered into a [`Registry`] and updated by the orchestrator.
#[derive(Clone)]
pub struct ProtocolMetrics {
    /// Latency of each protocol step, labelled by step name, in seconds.
    pub step_seconds: HistogramVec,
    /// Latency of whole runs that reached a terminal state, in seconds.
    pub run_seconds: Histogram,
    /// Runs that reached `Done`, labelled `committed` = "true" / "false".
    pub runs_completed: IntCounterVec,
    /// Failed runs, labelled by the step that failed.
    pub run_failures: IntCounterVec,
    /// Anchoring attempts vetoed by an endorsing peer.
    pub endorsement_rejections: IntCounter,
    /// Anchoring attempts that never saw a commit event.
    pub commit_timeouts: IntCounter,
}

impl ProtocolMetrics {
    /// Registers protocol metrics into the given `Registry`.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        // Provider calls are slow (pairing operations), ledger commits slower.
        let step_seconds = HistogramVec::new(
            HistogramOpts::new(
                "protocol_step_seconds",
                "Time spent in one protocol step in seconds",
            )
            .buckets(vec![
                0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
            ]),
            &["step"],
        )?;
        registry.register(Box::new(step_seconds.clone()))?;

        let run_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "protocol_run_seconds",
                "Time from run start to a terminal state in seconds",
            )
            .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
        )?;
        registry.register(Box::new(run_seconds.clone()))?;

        let runs_completed = IntCounterVec::new(
            Opts::new(
                "protocol_runs_completed",
                "Total number of runs that reached Done, by commit validity",
            ),
            &["committed"],
        )?;
        registry.register(Box::new(runs_completed.clone()))?;

        let run_failures = IntCounterVec::new(
            Opts::new(
                "protocol_run_failures",
                "Total number of failed runs, by failing step",
            ),
            &["step"],
        )?;
        registry.register(Box::new(run_failures.clone()))?;

        let endorsement_rejections = IntCounter::with_opts(Opts::new(
            "ledger_endorsement_rejections",
            "Total number of transactions vetoed during endorsement",
        ))?;
        registry.register(Box::new(endorsement_rejections.clone()))?;

        let commit_timeouts = IntCounter::with_opts(Opts::new(
            "ledger_commit_timeouts",
            "Total number of transactions without a commit event before the timeout",
        ))?;
        registry.register(Box::new(commit_timeouts.clone()))?;

        Ok(Self {
            step_seconds,
            run_seconds,
            runs_completed,
            run_failures,
            endorsement_rejections,
            commit_timeouts,
        })
    }
}

/// Wrapper around a Prometheus registry and the protocol metrics.
///
/// This is the main handle passed to the orchestrator. It can be wrapped
/// in an [`Arc`] and shared across tasks.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    pub protocol: ProtocolMetrics,
}

impl MetricsRegistry {
    /// Creates a new `MetricsRegistry` with a fresh underlying `Registry`
    /// and registers the protocol metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("aav".to_string()), None)?;
        let protocol = ProtocolMetrics::register(&registry)?;
        Ok(Self { registry, protocol })
    }

    /// Encodes all metrics in this registry into the Prometheus text format.
    pub fn gather_text(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            error!(error = %e, "failed to encode Prometheus metrics");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Runs an HTTP server that exposes Prometheus metrics.
///
/// The server listens on `addr` and serves `GET /metrics` with the
/// Prometheus text exposition format. All other paths return 404.
pub async fn run_prometheus_http_server(
    metrics: Arc<MetricsRegistry>,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let svc = service_fn(move |req| {
                let metrics = metrics.clone();
                handle_request(req, metrics)
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, svc).await {
                warn!(error = %err, "prometheus HTTP connection error");
            }
        });
    }
}

fn text_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(body.into()));
    *resp.status_mut() = status;
    resp
}

async fn handle_request(
    req: Request<Incoming>,
    metrics: Arc<MetricsRegistry>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let mut resp = text_response(StatusCode::OK, metrics.gather_text());
            resp.headers_mut().insert(
                header::CONTENT_TYPE,
                header::HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            Ok(resp)
        }
        _ => Ok(text_response(StatusCode::NOT_FOUND, "not found")),
    }
}
