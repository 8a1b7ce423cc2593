//! Proposal construction and signing.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use rand::RngCore;

use super::LedgerError;
use crate::identity::LedgerIdentity;
use crate::types::{
    ChaincodeInvocation, Proposal, ProposalResponse, SignedProposal, TransactionEnvelope,
    TransactionPayload, TxId,
};

/// Nonce length in bytes.
pub const NONCE_LEN: usize = 24;

/// Builds a fresh proposal for `invocation` on `channel` and signs it with
/// `creator`'s key.
pub fn build_signed(
    creator: &LedgerIdentity,
    channel: &str,
    invocation: ChaincodeInvocation,
) -> Result<SignedProposal, LedgerError> {
    let mut nonce = vec![0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    let creator_record = creator.creator();
    let proposal = Proposal {
        tx_id: TxId::derive(&nonce, &creator_record),
        channel: channel.to_string(),
        invocation,
        creator: creator_record,
        nonce,
        timestamp: current_unix_timestamp(),
    };

    let signature = creator.sign(&proposal.canonical_bytes()?);
    Ok(SignedProposal {
        proposal,
        signature,
    })
}

/// Wraps a signed proposal and its endorsements into an envelope signed by
/// `creator`.
pub fn build_envelope(
    creator: &LedgerIdentity,
    proposal: SignedProposal,
    endorsements: Vec<ProposalResponse>,
) -> Result<TransactionEnvelope, LedgerError> {
    let payload = TransactionPayload {
        proposal,
        endorsements,
    };
    let signature = creator.sign(&payload.canonical_bytes()?);
    Ok(TransactionEnvelope { payload, signature })
}

/// Checks a proposal's signature against `key`.
pub fn verify_signed(signed: &SignedProposal, key: &VerifyingKey) -> Result<bool, LedgerError> {
    let bytes = signed.proposal.canonical_bytes()?;
    let Ok(signature) = Signature::from_slice(&signed.signature) else {
        return Ok(false);
    };
    Ok(key.verify(&bytes, &signature).is_ok())
}

/// Checks a peer's endorsement of `signed` against the peer's key.
///
/// An answer without a signature, or from a peer with no known key, is
/// unverified.
pub fn verify_endorsement(
    signed: &SignedProposal,
    response: &ProposalResponse,
    key: Option<&VerifyingKey>,
) -> bool {
    let (Some(key), Some(endorsement)) = (key, &response.endorsement) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(&endorsement.signature) else {
        return false;
    };
    match response.endorsed_bytes(signed.proposal.tx_id) {
        Ok(bytes) => key.verify(&bytes, &signature).is_ok(),
        Err(_) => false,
    }
}

/// Returns the current wall-clock time as seconds since Unix epoch.
///
/// On error (system clock before epoch) this falls back to 0.
fn current_unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_secs()
}
