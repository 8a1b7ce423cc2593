// src/main.rs
//
// Demo client that wires up the aav library and performs one protocol run:
//
// - configuration from the TOML file named by AAV_CONFIG (defaults otherwise)
// - HTTP crypto provider, membership service and ledger adapters
// - optional Prometheus exporter on /metrics
// - exit code 0 when the decision was committed as valid, 2 when the ledger
//   marked it invalid, 1 on any failure (structured JSON on stderr).

use std::process::ExitCode;
use std::sync::Arc;

use aav::{AavConfig, MetricsRegistry, Orchestrator, run_prometheus_http_server};

const EXIT_REJECTED: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "aav=info".to_string()))
        .with_writer(std::io::stderr)
        .init();

    match run_once().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("fatal error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_once() -> Result<ExitCode, String> {
    let cfg = AavConfig::from_env().map_err(|e| format!("failed to load configuration: {e}"))?;

    let mut orchestrator = Orchestrator::from_config(&cfg)
        .map_err(|e| format!("failed to initialise clients: {e}"))?;

    // ---------------------------
    // Metrics registry + exporter
    // ---------------------------

    if cfg.metrics.enabled {
        let metrics = Arc::new(
            MetricsRegistry::new()
                .map_err(|e| format!("failed to initialise metrics registry: {e}"))?,
        );
        let addr = cfg.metrics.listen_addr;
        let exporter = metrics.clone();
        tokio::spawn(async move {
            if let Err(e) = run_prometheus_http_server(exporter, addr).await {
                tracing::error!("metrics HTTP server error: {e}");
            }
        });
        tracing::info!("metrics exporter listening on http://{}/metrics", addr);
        orchestrator = orchestrator.with_metrics(metrics);
    }

    // ---------------------------
    // One protocol run
    // ---------------------------

    let control = orchestrator.control();
    match orchestrator.run(&control).await {
        Ok(report) => {
            let json = serde_json::to_string_pretty(&report)
                .map_err(|e| format!("failed to encode report: {e}"))?;
            println!("{json}");
            if report.is_accepted() {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(EXIT_REJECTED))
            }
        }
        Err(failure) => {
            eprintln!("{}", failure.to_json());
            Ok(ExitCode::FAILURE)
        }
    }
}
