//! Anonymous attribute verification library crate.
//!
//! This crate provides the building blocks for running the anonymous
//! attribute verification protocol, in which a user proves possession of
//! an attribute without revealing it and the verifier's decision is
//! anchored on a permissioned ledger:
//!
//! - strongly-typed protocol and ledger types (`types`),
//! - a client for the external crypto capability provider (`crypto_client`),
//! - ledger identity enrollment and caching (`identity`),
//! - endorsed transaction submission and queries (`ledger`),
//! - the protocol orchestrator (`protocol`),
//! - Prometheus-based metrics (`metrics`),
//! - and a top-level configuration (`config`).
//!
//! Binaries compose these pieces with [`Orchestrator::from_config`].

use std::sync::Arc;

pub mod config;
pub mod crypto_client;
pub mod identity;
pub mod ledger;
pub mod metrics;
pub mod protocol;
pub mod types;

// Re-export top-level configuration types.
pub use config::{
    AavConfig, ConfigError, CryptoClientConfig, EndpointConfig, LedgerConfig, MembershipConfig,
    MetricsConfig, ProtocolConfig,
};

// Re-export client interfaces and their HTTP implementations.
pub use crypto_client::{CryptoError, CryptoProvider, HttpCryptoProvider};
pub use identity::{
    HttpMembershipService, IdentityCache, IdentityError, IdentityManager, LedgerIdentity,
    MembershipService, Role,
};
pub use ledger::{
    CommitEventSource, CommitSubscription, EndorsingPeer, LedgerAnchor, LedgerError,
    LedgerNetwork, OrderingService, QueryClient, TransactionSubmitter,
};

// Re-export the orchestrator and its run types.
pub use protocol::{
    Orchestrator, ProtocolError, RunControl, RunFailure, RunReport, RunState, Step,
};

// Re-export metrics registry and exporter.
pub use metrics::{MetricsRegistry, ProtocolMetrics, run_prometheus_http_server};

// Re-export domain types at the crate root for convenience.
pub use types::*;

/// Errors that can occur while wiring up an orchestrator from configuration.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl Orchestrator {
    /// Builds an orchestrator backed by the HTTP clients described in `cfg`.
    pub fn from_config(cfg: &AavConfig) -> Result<Self, SetupError> {
        cfg.validate()?;

        let crypto = HttpCryptoProvider::new(cfg.crypto.base_url.clone(), cfg.crypto.timeout())?;
        let membership =
            HttpMembershipService::new(cfg.membership.ca_url.clone(), cfg.membership.timeout())?;
        let identities = IdentityManager::new(cfg.membership.clone(), Arc::new(membership));
        let network = LedgerNetwork::from_config(&cfg.ledger)?;

        Ok(Orchestrator::new(
            Arc::new(crypto),
            Arc::new(identities),
            Arc::new(TransactionSubmitter::new(network)),
            &cfg.ledger,
            cfg.protocol.clone(),
        ))
    }
}
