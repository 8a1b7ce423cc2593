//! Top-level configuration for the orchestrator.
//!
//! This module aggregates configuration for:
//!
//! - the crypto capability client (provider URL + timeout),
//! - the ledger network (channel, program, peers, orderer, timeouts),
//! - the membership service and identity cache,
//! - protocol constants (attribute value, run deadline, ledger principal),
//! - the metrics exporter (enable flag + listen address).
//!
//! Every field has a default matching the reference deployment, so a TOML
//! file only needs the keys it overrides. Binaries read the file named by
//! the `AAV_CONFIG` environment variable.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable naming the TOML configuration file.
pub const CONFIG_ENV: &str = "AAV_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration for the crypto capability client.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CryptoClientConfig {
    /// Base URL of the provider, e.g. `"http://127.0.0.1:8000"`.
    #[serde(default = "default_crypto_url")]
    pub base_url: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_crypto_timeout")]
    pub timeout_secs: u64,
}

fn default_crypto_url() -> String {
    "http://127.0.0.1:8000".to_string()
}

fn default_crypto_timeout() -> u64 {
    600
}

impl CryptoClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for CryptoClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_crypto_url(),
            timeout_secs: default_crypto_timeout(),
        }
    }
}

/// A named ledger network endpoint (peer or orderer).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub name: String,
    pub url: String,
    /// Hex Ed25519 key the peer signs endorsements with. Without it no
    /// endorsement from this peer counts as verified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

impl EndpointConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            public_key: None,
        }
    }

    /// Parses [`public_key`](Self::public_key), if set.
    pub fn verifying_key(&self) -> Result<Option<VerifyingKey>, ConfigError> {
        let Some(encoded) = &self.public_key else {
            return Ok(None);
        };
        let invalid = |reason: String| {
            ConfigError::Invalid(format!("public_key of {}: {reason}", self.name))
        };
        let bytes: [u8; 32] = hex::decode(encoded)
            .map_err(|e| invalid(e.to_string()))?
            .try_into()
            .map_err(|b: Vec<u8>| invalid(format!("expected 32 bytes, got {}", b.len())))?;
        VerifyingKey::from_bytes(&bytes)
            .map(Some)
            .map_err(|e| invalid(e.to_string()))
    }
}

/// Ledger network configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default = "default_channel")]
    pub channel: String,
    /// Deployed ledger program the anchoring transaction invokes.
    #[serde(default = "default_program_id")]
    pub program_id: String,
    #[serde(default = "default_function")]
    pub function: String,
    /// Endorsing peers. The first one also serves commit events.
    #[serde(default = "default_peers")]
    pub peers: Vec<EndpointConfig>,
    #[serde(default = "default_orderer")]
    pub orderer: EndpointConfig,
    #[serde(default = "default_proposal_timeout")]
    pub proposal_timeout_secs: u64,
    #[serde(default = "default_commit_timeout")]
    pub commit_timeout_secs: u64,
}

fn default_channel() -> String {
    "mychannel".to_string()
}

fn default_program_id() -> String {
    "aav".to_string()
}

fn default_function() -> String {
    "verify".to_string()
}

fn default_peers() -> Vec<EndpointConfig> {
    vec![EndpointConfig::new("peer1-Org1", "http://127.0.0.1:7151")]
}

fn default_orderer() -> EndpointConfig {
    EndpointConfig::new("orderer.example.com", "http://127.0.0.1:7050")
}

fn default_proposal_timeout() -> u64 {
    100
}

fn default_commit_timeout() -> u64 {
    60
}

impl LedgerConfig {
    pub fn proposal_timeout(&self) -> Duration {
        Duration::from_secs(self.proposal_timeout_secs)
    }

    pub fn commit_timeout(&self) -> Duration {
        Duration::from_secs(self.commit_timeout_secs)
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            channel: default_channel(),
            program_id: default_program_id(),
            function: default_function(),
            peers: default_peers(),
            orderer: default_orderer(),
            proposal_timeout_secs: default_proposal_timeout(),
            commit_timeout_secs: default_commit_timeout(),
        }
    }
}

/// Membership service and identity cache configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct MembershipConfig {
    #[serde(default = "default_ca_url")]
    pub ca_url: String,
    #[serde(default = "default_ca_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_affiliation")]
    pub affiliation: String,
    #[serde(default = "default_msp_id")]
    pub msp_id: String,
    /// Cache name of the registrar identity.
    #[serde(default = "default_admin_name")]
    pub admin_name: String,
    /// Bootstrap enrollment id of the registrar.
    #[serde(default = "default_admin_login")]
    pub admin_login: String,
    #[serde(default = "default_admin_password")]
    pub admin_password: String,
    /// Directory holding one cache file per identity.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
}

fn default_ca_url() -> String {
    "http://127.0.0.1:7054".to_string()
}

fn default_ca_timeout() -> u64 {
    60
}

fn default_affiliation() -> String {
    "org1".to_string()
}

fn default_msp_id() -> String {
    "Org1MSP".to_string()
}

fn default_admin_name() -> String {
    "admin".to_string()
}

fn default_admin_login() -> String {
    "rca-org0-admin".to_string()
}

fn default_admin_password() -> String {
    "rca-org0-adminpw".to_string()
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("wallet")
}

impl MembershipConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for MembershipConfig {
    fn default() -> Self {
        Self {
            ca_url: default_ca_url(),
            timeout_secs: default_ca_timeout(),
            affiliation: default_affiliation(),
            msp_id: default_msp_id(),
            admin_name: default_admin_name(),
            admin_login: default_admin_login(),
            admin_password: default_admin_password(),
            cache_dir: default_cache_dir(),
        }
    }
}

impl std::fmt::Debug for MembershipConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MembershipConfig")
            .field("ca_url", &self.ca_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("affiliation", &self.affiliation)
            .field("msp_id", &self.msp_id)
            .field("admin_name", &self.admin_name)
            .field("admin_login", &self.admin_login)
            .field("admin_password", &"<redacted>")
            .field("cache_dir", &self.cache_dir)
            .finish()
    }
}

/// Protocol run parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Attribute value the user commits to and proves.
    #[serde(default = "default_attribute")]
    pub attribute: String,
    /// Optional wall-clock bound for a whole run.
    #[serde(default)]
    pub run_timeout_secs: Option<u64>,
    /// Fixed ledger principal. When unset each run enrolls `user-<run id>`.
    #[serde(default)]
    pub principal: Option<String>,
}

fn default_attribute() -> String {
    "21".to_string()
}

impl ProtocolConfig {
    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            attribute: default_attribute(),
            run_timeout_secs: None,
            principal: None,
        }
    }
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Whether to run a `/metrics` HTTP exporter.
    #[serde(default)]
    pub enabled: bool,
    /// Address to bind the metrics HTTP server to.
    #[serde(default = "default_metrics_addr")]
    pub listen_addr: SocketAddr,
}

fn default_metrics_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9898))
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: default_metrics_addr(),
        }
    }
}

/// Top-level configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AavConfig {
    #[serde(default)]
    pub crypto: CryptoClientConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
    #[serde(default)]
    pub membership: MembershipConfig,
    #[serde(default)]
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl AavConfig {
    /// Loads the file named by `AAV_CONFIG`, or defaults when it is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: AavConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ledger.peers.is_empty() {
            return Err(ConfigError::Invalid(
                "ledger.peers must name at least one endorsing peer".into(),
            ));
        }
        for peer in &self.ledger.peers {
            peer.verifying_key()?;
        }
        let timeouts = [
            ("crypto.timeout_secs", self.crypto.timeout_secs),
            ("ledger.proposal_timeout_secs", self.ledger.proposal_timeout_secs),
            ("ledger.commit_timeout_secs", self.ledger.commit_timeout_secs),
            ("membership.timeout_secs", self.membership.timeout_secs),
        ];
        for (key, value) in timeouts {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{key} must be > 0")));
            }
        }
        if self.protocol.run_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "protocol.run_timeout_secs must be > 0 when set".into(),
            ));
        }
        if self.protocol.attribute.is_empty() {
            return Err(ConfigError::Invalid("protocol.attribute is empty".into()));
        }
        if let Some(principal) = &self.protocol.principal {
            crate::identity::validate_name(principal)
                .map_err(|e| ConfigError::Invalid(format!("protocol.principal: {e}")))?;
            if *principal == self.membership.admin_name {
                return Err(ConfigError::Invalid(
                    "protocol.principal must differ from membership.admin_name".into(),
                ));
            }
        }
        Ok(())
    }
}
