//! Run states, steps and the run control handle.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use super::error::ProtocolError;

/// A unit of work the orchestrator performs.
///
/// Every step except [`Step::IdentityResolution`] moves the run into the
/// [`RunState`] of the same name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Step {
    /// Resolving the ledger identity that will sign the anchoring
    /// transaction. Happens before any cryptographic step.
    IdentityResolution,
    KeysGenerated,
    Committed,
    SignatureIssued,
    SignatureVerified,
    ProofsGenerated,
    ProofsVerified,
    CertificateIssued,
    CertificateVerified,
    Blinded,
    BlindVerified,
    Anchored,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::IdentityResolution => "IdentityResolution",
            Step::KeysGenerated => "KeysGenerated",
            Step::Committed => "Committed",
            Step::SignatureIssued => "SignatureIssued",
            Step::SignatureVerified => "SignatureVerified",
            Step::ProofsGenerated => "ProofsGenerated",
            Step::ProofsVerified => "ProofsVerified",
            Step::CertificateIssued => "CertificateIssued",
            Step::CertificateVerified => "CertificateVerified",
            Step::Blinded => "Blinded",
            Step::BlindVerified => "BlindVerified",
            Step::Anchored => "Anchored",
        }
    }

    /// State reached when this step succeeds.
    pub fn target(&self) -> Option<RunState> {
        let state = match self {
            Step::IdentityResolution => return None,
            Step::KeysGenerated => RunState::KeysGenerated,
            Step::Committed => RunState::Committed,
            Step::SignatureIssued => RunState::SignatureIssued,
            Step::SignatureVerified => RunState::SignatureVerified,
            Step::ProofsGenerated => RunState::ProofsGenerated,
            Step::ProofsVerified => RunState::ProofsVerified,
            Step::CertificateIssued => RunState::CertificateIssued,
            Step::CertificateVerified => RunState::CertificateVerified,
            Step::Blinded => RunState::Blinded,
            Step::BlindVerified => RunState::BlindVerified,
            Step::Anchored => RunState::Anchored,
        };
        Some(state)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position of a run in the protocol.
///
/// Runs move strictly forward through the variants in declaration order;
/// `Failed` is reachable from any non-terminal state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state")]
pub enum RunState {
    Init,
    KeysGenerated,
    Committed,
    SignatureIssued,
    SignatureVerified,
    ProofsGenerated,
    ProofsVerified,
    CertificateIssued,
    CertificateVerified,
    Blinded,
    BlindVerified,
    Anchored,
    Done,
    Failed { step: Step, cause: String },
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed { .. })
    }
}

/// Cancellation handle for one run.
///
/// Clones share the same flag, so a caller can keep one clone and cancel
/// the run from another task. An optional deadline cancels the run once
/// it passes.
#[derive(Clone, Debug, Default)]
pub struct RunControl {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fails with [`ProtocolError::Cancelled`] once the run was cancelled
    /// or its deadline passed.
    pub fn check(&self) -> Result<(), ProtocolError> {
        if self.is_cancelled() {
            return Err(ProtocolError::Cancelled("run cancelled".to_string()));
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(ProtocolError::Cancelled("run deadline exceeded".to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_step_but_identity_has_a_target_state() {
        assert_eq!(Step::IdentityResolution.target(), None);
        assert_eq!(Step::KeysGenerated.target(), Some(RunState::KeysGenerated));
        assert_eq!(Step::Anchored.target(), Some(RunState::Anchored));
    }

    #[test]
    fn cancel_is_shared_between_clones() {
        let control = RunControl::new();
        let other = control.clone();
        assert!(control.check().is_ok());

        other.cancel();
        assert!(control.is_cancelled());
        assert!(matches!(control.check(), Err(ProtocolError::Cancelled(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_cancels_after_it_passes() {
        let control = RunControl::new().with_timeout(Duration::from_secs(5));
        assert!(control.check().is_ok());

        tokio::time::advance(Duration::from_secs(5)).await;
        let err = control.check().expect_err("deadline passed");
        assert!(err.to_string().contains("deadline"));
    }

    #[test]
    fn states_serialize_with_tag() {
        let json = serde_json::to_value(RunState::Failed {
            step: Step::SignatureVerified,
            cause: "verifySignature returned false".to_string(),
        })
        .expect("serialize");
        assert_eq!(json["state"], "Failed");
        assert_eq!(json["step"], "SignatureVerified");
        assert!(RunState::Done.is_terminal());
        assert!(!RunState::Anchored.is_terminal());
    }
}
