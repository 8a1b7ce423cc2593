//! Clients for the external crypto capability provider.
//!
//! The provider implements every cryptographic primitive the protocol
//! needs: key generation, commitments, the Identity Validator's signature,
//! zero-knowledge proofs, pairing-based certificates and their blinding.
//! This crate treats it as an opaque, correct black box; [`CryptoProvider`]
//! is the typed boundary the orchestrator talks to, and
//! [`HttpCryptoProvider`] is the JSON-over-HTTP implementation.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{
    BlindCertificate, Certificate, Commitment, KeyPair, PairingKeyPair, SecretKind, Signature,
    ZkProof,
};

pub mod http;

pub use http::HttpCryptoProvider;

/// Errors that can occur while calling the crypto capability provider.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Connection failure, timeout or non-2xx status.
    #[error("transport error: {0}")]
    Transport(String),

    /// The provider answered, but the body could not be decoded.
    #[error("malformed provider response: {0}")]
    Serialization(String),

    /// The provider declined to perform the operation (e.g. returned its
    /// `"false"` marker instead of a certificate).
    #[error("provider refused: {0}")]
    Refused(String),
}

/// Typed boundary to the crypto capability provider.
///
/// Verification operations return the provider's verdict as a `bool`; the
/// caller decides what a negative verdict means. All values are opaque
/// encoded strings that are threaded from one call into the next.
#[async_trait]
pub trait CryptoProvider: Send + Sync {
    /// Fresh asymmetric keypair (User or IV).
    async fn generate_key(&self) -> Result<KeyPair, CryptoError>;

    /// Fresh bilinear-pairing keypair (User or CP).
    async fn generate_key_pairing(&self) -> Result<PairingKeyPair, CryptoError>;

    /// Commits to `attribute` under the user's public key.
    async fn commit(&self, user_public: &str, attribute: &str) -> Result<Commitment, CryptoError>;

    /// Identity Validator signature over a commitment value.
    async fn sign(&self, commitment: &str, iv_keys: &KeyPair) -> Result<Signature, CryptoError>;

    async fn verify_signature(
        &self,
        signature: &Signature,
        iv_public: &str,
        commitment: &str,
    ) -> Result<bool, CryptoError>;

    /// Proof of knowledge of `secret`; `kind` selects which committed
    /// secret is proven.
    async fn generate_zkp(
        &self,
        kind: SecretKind,
        secret: &str,
        user_public: &str,
    ) -> Result<ZkProof, CryptoError>;

    async fn verify_proof(&self, proof: &ZkProof, user_public: &str) -> Result<bool, CryptoError>;

    /// Certificate Provider issues a credential over the commitment.
    ///
    /// A refusal is reported as [`CryptoError::Refused`].
    async fn generate_certificate(
        &self,
        commitment: &str,
        cp_private: &str,
        user_g2_public: &str,
    ) -> Result<Certificate, CryptoError>;

    async fn verify_certificate(
        &self,
        commitment: &str,
        certificate: &Certificate,
        cp_g1_public: &str,
        user_g2_public: &str,
    ) -> Result<bool, CryptoError>;

    async fn blind_certificate(
        &self,
        commitment: &str,
        certificate: &Certificate,
        cp_g1_public: &str,
        user_g2_public: &str,
        user_private: &str,
    ) -> Result<BlindCertificate, CryptoError>;

    /// Service Provider check of the blinded credential.
    async fn verify_blind_certificate(&self, blind: &BlindCertificate) -> Result<bool, CryptoError>;
}
