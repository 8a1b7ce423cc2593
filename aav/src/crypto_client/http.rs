//! HTTP-based crypto capability client.
//!
//! This implementation of [`CryptoProvider`] talks to the provider's JSON
//! API. Each operation is one route; key generation uses `GET`, everything
//! else `POST`s a flat JSON object, e.g.:
//!
//! ```json
//! POST /iv/verifySignature
//! { "s": "...", "r": "...", "pub": "...", "commitment": "..." }
//!
//! Response:
//! { "verify": "true" }
//! ```
//!
//! The reference provider reports verdicts as the strings `"true"` /
//! `"false"`; JSON booleans are accepted as well.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{CryptoError, CryptoProvider};
use crate::types::{
    BlindCertificate, Certificate, Commitment, KeyPair, PairingKeyPair, SecretKind, Signature,
    ZkProof,
};

/// Marker the provider returns instead of a certificate when it refuses to
/// issue one.
const REFUSAL_MARKER: &str = "false";

/// HTTP-based crypto capability provider client.
///
/// Cheap to clone and safe to share between concurrent runs; the inner
/// `reqwest` client pools connections.
#[derive(Clone)]
pub struct HttpCryptoProvider {
    base_url: String,
    client: Client,
}

impl HttpCryptoProvider {
    /// Constructs a new client pointing at `base_url`.
    ///
    /// `base_url` should be the root of the provider, e.g.
    /// `"http://127.0.0.1:8000"`. Every request is bounded by `timeout`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, CryptoError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CryptoError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn get<R: DeserializeOwned>(&self, path: &str) -> Result<R, CryptoError> {
        let url = self.endpoint(path);
        debug!(%url, "provider GET");

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CryptoError::Transport(format!("HTTP GET {url} failed: {e}")))?;

        decode(&url, resp).await
    }

    async fn post<B: Serialize + Sync, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, CryptoError> {
        let url = self.endpoint(path);
        debug!(%url, "provider POST");

        let resp = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| CryptoError::Transport(format!("HTTP POST {url} failed: {e}")))?;

        decode(&url, resp).await
    }
}

async fn decode<R: DeserializeOwned>(url: &str, resp: reqwest::Response) -> Result<R, CryptoError> {
    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| CryptoError::Transport(format!("reading body from {url} failed: {e}")))?;

    if !status.is_success() {
        return Err(CryptoError::Transport(format!(
            "provider returned HTTP status {status} for {url}: {body}"
        )));
    }

    serde_json::from_str(&body)
        .map_err(|e| CryptoError::Serialization(format!("failed to parse response from {url}: {e}")))
}

fn zkp_route(kind: SecretKind) -> &'static str {
    match kind {
        SecretKind::Randomness => "/user/generateZKP/random",
        SecretKind::Attribute => "/user/generateZKP/age",
    }
}

fn verify_proof_route(kind: SecretKind) -> &'static str {
    match kind {
        SecretKind::Randomness => "/CP/verifyProof/random",
        SecretKind::Attribute => "/CP/verifyProof/age",
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct KeyResponse {
    #[serde(rename = "priv")]
    private_key: String,
    #[serde(rename = "pub")]
    public_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyPairingResponse {
    #[serde(rename = "priv")]
    private_key: String,
    g1_pub: String,
    g2_pub: String,
}

#[derive(Debug, Serialize)]
struct CommitRequest<'a> {
    #[serde(rename = "pub")]
    public_key: &'a str,
    age: &'a str,
}

#[derive(Debug, Deserialize)]
struct CommitResponse {
    commitment: String,
    random: String,
}

#[derive(Debug, Serialize)]
struct SignRequest<'a> {
    commitment: &'a str,
    #[serde(rename = "priv")]
    private_key: &'a str,
    #[serde(rename = "pub")]
    public_key: &'a str,
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    s: String,
    r: String,
}

#[derive(Debug, Serialize)]
struct VerifySignatureRequest<'a> {
    s: &'a str,
    r: &'a str,
    #[serde(rename = "pub")]
    public_key: &'a str,
    commitment: &'a str,
}

#[derive(Debug, Serialize)]
struct ZkpRequest<'a> {
    secret: &'a str,
    #[serde(rename = "pub")]
    public_key: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ZkpResponse {
    #[serde(rename = "A")]
    a: String,
    t: String,
    pub_secret: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyProofRequest<'a> {
    #[serde(rename = "A")]
    a: &'a str,
    t: &'a str,
    #[serde(rename = "pub")]
    public_key: &'a str,
    pub_secret: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateCertificateRequest<'a> {
    commitment: &'a str,
    #[serde(rename = "privCP")]
    priv_cp: &'a str,
    pub_g2_user: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateCertificateResponse {
    certificate: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyCertificateRequest<'a> {
    commitment: &'a str,
    certificate: &'a str,
    #[serde(rename = "pubG1CP")]
    pub_g1_cp: &'a str,
    pub_g2_user: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BlindCertificateRequest<'a> {
    commitment: &'a str,
    certificate: &'a str,
    #[serde(rename = "pubG1CP")]
    pub_g1_cp: &'a str,
    pub_g2_user: &'a str,
    priv_user: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlindCertificateResponse {
    blind_commitment: String,
    blind_certificate: String,
    #[serde(rename = "blindPubG1CP")]
    blind_pub_g1_cp: String,
    blind_pub_g2_user: String,
    blind_priv_user: String,
    blind_generator: String,
    blind_factor: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyBlindCertificateRequest<'a> {
    blind_commitment: &'a str,
    #[serde(rename = "blindPubG1CP")]
    blind_pub_g1_cp: &'a str,
    blind_pub_g2_user: &'a str,
    blind_certificate: &'a str,
    blind_generator: &'a str,
}

/// Verdict as the provider encodes it.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum VerifyFlag {
    Bool(bool),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    verify: VerifyFlag,
}

impl VerifyResponse {
    fn verdict(self) -> Result<bool, CryptoError> {
        match self.verify {
            VerifyFlag::Bool(b) => Ok(b),
            VerifyFlag::Text(s) => match s.trim() {
                "true" => Ok(true),
                "false" => Ok(false),
                other => Err(CryptoError::Serialization(format!(
                    "unexpected verify value {other:?}"
                ))),
            },
        }
    }
}

#[async_trait]
impl CryptoProvider for HttpCryptoProvider {
    async fn generate_key(&self) -> Result<KeyPair, CryptoError> {
        let body: KeyResponse = self.get("/user/generateKey").await?;
        Ok(KeyPair {
            private_key: body.private_key,
            public_key: body.public_key,
        })
    }

    async fn generate_key_pairing(&self) -> Result<PairingKeyPair, CryptoError> {
        let body: KeyPairingResponse = self.get("/user/generateKeyPairing").await?;
        Ok(PairingKeyPair {
            private_key: body.private_key,
            g1_public: body.g1_pub,
            g2_public: body.g2_pub,
        })
    }

    async fn commit(&self, user_public: &str, attribute: &str) -> Result<Commitment, CryptoError> {
        let req = CommitRequest {
            public_key: user_public,
            age: attribute,
        };
        let body: CommitResponse = self.post("/user/commitment", &req).await?;
        Ok(Commitment {
            value: body.commitment,
            randomness: body.random,
        })
    }

    async fn sign(&self, commitment: &str, iv_keys: &KeyPair) -> Result<Signature, CryptoError> {
        let req = SignRequest {
            commitment,
            private_key: &iv_keys.private_key,
            public_key: &iv_keys.public_key,
        };
        let body: SignResponse = self.post("/iv/signCommitment", &req).await?;
        Ok(Signature {
            value: body.s,
            randomness: body.r,
        })
    }

    async fn verify_signature(
        &self,
        signature: &Signature,
        iv_public: &str,
        commitment: &str,
    ) -> Result<bool, CryptoError> {
        let req = VerifySignatureRequest {
            s: &signature.value,
            r: &signature.randomness,
            public_key: iv_public,
            commitment,
        };
        let body: VerifyResponse = self.post("/iv/verifySignature", &req).await?;
        body.verdict()
    }

    async fn generate_zkp(
        &self,
        kind: SecretKind,
        secret: &str,
        user_public: &str,
    ) -> Result<ZkProof, CryptoError> {
        let req = ZkpRequest {
            secret,
            public_key: user_public,
        };
        let body: ZkpResponse = self.post(zkp_route(kind), &req).await?;
        Ok(ZkProof {
            kind,
            a: body.a,
            t: body.t,
            public_secret: body.pub_secret,
        })
    }

    async fn verify_proof(&self, proof: &ZkProof, user_public: &str) -> Result<bool, CryptoError> {
        let req = VerifyProofRequest {
            a: &proof.a,
            t: &proof.t,
            public_key: user_public,
            pub_secret: &proof.public_secret,
        };
        let body: VerifyResponse = self.post(verify_proof_route(proof.kind), &req).await?;
        body.verdict()
    }

    async fn generate_certificate(
        &self,
        commitment: &str,
        cp_private: &str,
        user_g2_public: &str,
    ) -> Result<Certificate, CryptoError> {
        let req = GenerateCertificateRequest {
            commitment,
            priv_cp: cp_private,
            pub_g2_user: user_g2_public,
        };
        let body: GenerateCertificateResponse =
            self.post("/CP/generateCertificate", &req).await?;

        if body.certificate.trim() == REFUSAL_MARKER {
            return Err(CryptoError::Refused(
                "certificate provider declined to issue a certificate".to_string(),
            ));
        }
        Ok(Certificate(body.certificate))
    }

    async fn verify_certificate(
        &self,
        commitment: &str,
        certificate: &Certificate,
        cp_g1_public: &str,
        user_g2_public: &str,
    ) -> Result<bool, CryptoError> {
        let req = VerifyCertificateRequest {
            commitment,
            certificate: certificate.as_str(),
            pub_g1_cp: cp_g1_public,
            pub_g2_user: user_g2_public,
        };
        let body: VerifyResponse = self.post("/user/verifyCertificate", &req).await?;
        body.verdict()
    }

    async fn blind_certificate(
        &self,
        commitment: &str,
        certificate: &Certificate,
        cp_g1_public: &str,
        user_g2_public: &str,
        user_private: &str,
    ) -> Result<BlindCertificate, CryptoError> {
        let req = BlindCertificateRequest {
            commitment,
            certificate: certificate.as_str(),
            pub_g1_cp: cp_g1_public,
            pub_g2_user: user_g2_public,
            priv_user: user_private,
        };
        let body: BlindCertificateResponse = self.post("/user/blindCertificate", &req).await?;
        Ok(BlindCertificate {
            commitment: body.blind_commitment,
            certificate: body.blind_certificate,
            cp_pub_g1: body.blind_pub_g1_cp,
            user_pub_g2: body.blind_pub_g2_user,
            user_private: body.blind_priv_user,
            generator: body.blind_generator,
            factor: body.blind_factor,
        })
    }

    async fn verify_blind_certificate(&self, blind: &BlindCertificate) -> Result<bool, CryptoError> {
        let req = VerifyBlindCertificateRequest {
            blind_commitment: &blind.commitment,
            blind_pub_g1_cp: &blind.cp_pub_g1,
            blind_pub_g2_user: &blind.user_pub_g2,
            blind_certificate: &blind.certificate,
            blind_generator: &blind.generator,
        };
        let body: VerifyResponse = self.post("/SP/verifyBlindCertificate", &req).await?;
        body.verdict()
    }
}
