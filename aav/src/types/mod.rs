//! Core domain types used by the protocol.
//!
//! This module defines the key material, commitments, proofs and
//! certificates exchanged between the User, Identity Validator (IV),
//! Certificate Provider (CP) and Service Provider (SP) roles. All values
//! produced by the crypto capability provider are opaque encoded strings;
//! the orchestrator never interprets them, it only threads them from one
//! step into the next. Wrapping them in dedicated types keeps a proof from
//! being passed where a commitment is expected.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ledger-side types: proposals, endorsements, commit events.
pub mod ledger;

pub use ledger::{
    ChaincodeInvocation, CommitEvent, Creator, EndorsementSignature, Proposal, ProposalResponse,
    SignedProposal, TransactionEnvelope, TransactionOutcome, TransactionPayload, TxId,
};

/// Length in bytes of all 256-bit hash types used in this crate.
pub const HASH_LEN: usize = 32;

/// Strongly-typed 256-bit hash wrapper (BLAKE3-256).
///
/// Used as the backing representation for transaction identifiers.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Hash256(pub [u8; HASH_LEN]);

impl Hash256 {
    /// Computes a new [`Hash256`] as the BLAKE3-256 hash of `data`.
    pub fn compute(data: &[u8]) -> Self {
        let h = blake3::hash(data);
        Hash256(*h.as_bytes())
    }

    /// Hashes several byte slices as if they were concatenated.
    pub fn compute_parts(parts: &[&[u8]]) -> Self {
        let mut hasher = blake3::Hasher::new();
        for part in parts {
            hasher.update(part);
        }
        Hash256(*hasher.finalize().as_bytes())
    }

    /// Returns the underlying 32-byte hash as a borrowed array.
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }
}

/// Identifier of a single protocol run.
///
/// Generated fresh when a run starts and passed explicitly to everything
/// the run touches (logs, ledger principal name, reports).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    pub fn generate() -> Self {
        RunId(Uuid::new_v4())
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Asymmetric key material for a principal (User or IV).
///
/// Both halves are hex strings produced by the provider. The private half
/// never leaves the run: it is only sent back to the provider for signing.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub private_key: String,
    pub public_key: String,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("private_key", &"<redacted>")
            .field("public_key", &self.public_key)
            .finish()
    }
}

/// Bilinear-pairing key material (User or CP).
#[derive(Clone, PartialEq, Eq)]
pub struct PairingKeyPair {
    pub private_key: String,
    /// Public key in the first pairing group.
    pub g1_public: String,
    /// Public key in the second pairing group.
    pub g2_public: String,
}

impl fmt::Debug for PairingKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PairingKeyPair")
            .field("private_key", &"<redacted>")
            .field("g1_public", &self.g1_public)
            .field("g2_public", &self.g2_public)
            .finish()
    }
}

/// Hiding commitment to the protected attribute.
#[derive(Clone, PartialEq, Eq)]
pub struct Commitment {
    pub value: String,
    /// Opening randomness. Proven in zero knowledge, never disclosed.
    pub randomness: String,
}

impl fmt::Debug for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Commitment")
            .field("value", &self.value)
            .field("randomness", &"<redacted>")
            .finish()
    }
}

/// The Identity Validator's signature over a commitment.
#[derive(Clone, PartialEq, Eq)]
pub struct Signature {
    /// `s` component.
    pub value: String,
    /// `r` component.
    pub randomness: String,
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signature")
            .field("value", &self.value)
            .field("randomness", &"<redacted>")
            .finish()
    }
}

/// Which committed secret a zero-knowledge proof is about.
///
/// The provider exposes one endpoint per secret, so the kind selects the
/// route as well as labelling logs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SecretKind {
    /// The commitment's opening randomness.
    Randomness,
    /// The protected attribute value itself.
    Attribute,
}

impl SecretKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecretKind::Randomness => "randomness",
            SecretKind::Attribute => "attribute",
        }
    }
}

impl fmt::Display for SecretKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Proof of knowledge of a committed value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZkProof {
    pub kind: SecretKind,
    pub a: String,
    pub t: String,
    /// `secret * G`, the public image of the proven secret.
    pub public_secret: String,
}

/// Credential issued by the Certificate Provider over the commitment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Certificate(pub String);

impl Certificate {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Self-blinded, unlinkable version of a [`Certificate`].
///
/// Only the public parts are anchored on the ledger; `user_private` and
/// `factor` stay with the holder.
#[derive(Clone, PartialEq, Eq)]
pub struct BlindCertificate {
    pub commitment: String,
    pub certificate: String,
    pub cp_pub_g1: String,
    pub user_pub_g2: String,
    pub user_private: String,
    pub generator: String,
    pub factor: String,
}

impl BlindCertificate {
    /// Arguments of the on-chain `verify` call, in the order the ledger
    /// program reads them.
    pub fn ledger_args(&self) -> Vec<String> {
        vec![
            self.commitment.clone(),
            self.certificate.clone(),
            self.cp_pub_g1.clone(),
            self.user_pub_g2.clone(),
            self.generator.clone(),
        ]
    }
}

impl fmt::Debug for BlindCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlindCertificate")
            .field("commitment", &self.commitment)
            .field("certificate", &self.certificate)
            .field("cp_pub_g1", &self.cp_pub_g1)
            .field("user_pub_g2", &self.user_pub_g2)
            .field("user_private", &"<redacted>")
            .field("generator", &self.generator)
            .field("factor", &"<redacted>")
            .finish()
    }
}
