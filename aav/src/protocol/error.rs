//! Error taxonomy of a protocol run.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use super::state::{RunState, Step};
use crate::crypto_client::CryptoError;
use crate::identity::IdentityError;
use crate::ledger::LedgerError;
use crate::types::RunId;

/// Why a run failed. Every variant is fatal to the run.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A remote call failed, timed out or could not be reached.
    #[error("transport error: {0}")]
    Transport(String),

    /// A verification returned `false`, or the provider refused to issue.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("endorsement rejected by {peer}: status {status}, message {message:?}, verified {verified}")]
    Endorsement {
        peer: String,
        status: i32,
        message: String,
        verified: bool,
    },

    #[error("no commit event within {0:?}")]
    CommitTimeout(Duration),

    /// The ledger identity could not be obtained.
    #[error("identity error: {0}")]
    IdentityCache(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("{0}")]
    Cancelled(String),
}

impl ProtocolError {
    /// Stable name of the error kind, used in structured failure output.
    pub fn kind(&self) -> &'static str {
        match self {
            ProtocolError::Transport(_) => "TransportError",
            ProtocolError::ProtocolViolation(_) => "ProtocolViolationError",
            ProtocolError::Endorsement { .. } => "EndorsementError",
            ProtocolError::CommitTimeout(_) => "CommitTimeoutError",
            ProtocolError::IdentityCache(_) => "IdentityCacheError",
            ProtocolError::Serialization(_) => "SerializationError",
            ProtocolError::Cancelled(_) => "Cancelled",
        }
    }
}

impl From<CryptoError> for ProtocolError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::Transport(m) => ProtocolError::Transport(m),
            CryptoError::Serialization(m) => ProtocolError::Serialization(m),
            CryptoError::Refused(m) => ProtocolError::ProtocolViolation(m),
        }
    }
}

impl From<IdentityError> for ProtocolError {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::Serialization(m) => ProtocolError::Serialization(m),
            other => ProtocolError::IdentityCache(other.to_string()),
        }
    }
}

impl From<LedgerError> for ProtocolError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Transport(m) => ProtocolError::Transport(m),
            LedgerError::Ordering(m) => {
                ProtocolError::Transport(format!("ordering service refused transaction: {m}"))
            }
            LedgerError::Endorsement {
                peer,
                status,
                message,
                verified,
            } => ProtocolError::Endorsement {
                peer,
                status,
                message,
                verified,
            },
            LedgerError::CommitTimeout(d) => ProtocolError::CommitTimeout(d),
            LedgerError::Serialization(m) => ProtocolError::Serialization(m),
        }
    }
}

/// A failed run: where it failed, what it was calling, and why.
#[derive(Debug, Error)]
#[error("run {run_id} failed at {step} ({operation}): {error}")]
pub struct RunFailure {
    pub run_id: RunId,
    pub step: Step,
    /// External operation in flight when the run failed.
    pub operation: &'static str,
    pub error: ProtocolError,
    /// States the run went through, ending with `Failed`.
    pub states: Vec<RunState>,
}

#[derive(Serialize)]
struct FailureRecord<'a> {
    run_id: String,
    step: &'a str,
    operation: &'a str,
    kind: &'a str,
    cause: String,
}

impl RunFailure {
    /// Structured form: `{run_id, step, operation, kind, cause}`.
    pub fn to_json(&self) -> serde_json::Value {
        let record = FailureRecord {
            run_id: self.run_id.to_string(),
            step: self.step.as_str(),
            operation: self.operation,
            kind: self.error.kind(),
            cause: self.error.to_string(),
        };
        serde_json::to_value(record).unwrap_or(serde_json::Value::Null)
    }
}
