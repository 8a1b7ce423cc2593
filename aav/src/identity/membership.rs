//! Membership service (certificate authority) client.
//!
//! Registration creates a principal and returns a one-time enrollment
//! secret; enrollment exchanges that secret and a public key for a signed
//! certificate. The HTTP client speaks a Fabric-CA shaped JSON API:
//!
//! ```text
//! POST /api/v1/register   Authorization: <token>
//!   { "id": "user-...", "affiliation": "org1", "type": "client" }
//!   -> { "success": true, "result": { "secret": "..." }, "errors": [] }
//!
//! POST /api/v1/enroll     Authorization: Basic id:secret
//!   { "public_key": "<base64 Ed25519 public key>" }
//!   -> { "success": true, "result": { "Cert": "<base64 PEM>" }, "errors": [] }
//! ```
//!
//! The registration token is `base64(registrar cert PEM) "." base64(sig)`
//! where `sig` is the registrar's signature over the exact request body.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use ed25519_dalek::VerifyingKey;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{IdentityError, LedgerIdentity};

/// Registration of a new principal, issued by a registrar.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub id: String,
    pub affiliation: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Membership service operations needed to obtain ledger identities.
#[async_trait]
pub trait MembershipService: Send + Sync {
    /// Registers `request.id` on behalf of `registrar`; returns the one-time
    /// enrollment secret.
    async fn register(
        &self,
        registrar: &LedgerIdentity,
        request: &RegistrationRequest,
    ) -> Result<String, IdentityError>;

    /// Enrolls `enrollment_id` and returns the issued certificate PEM for
    /// `public_key`.
    async fn enroll(
        &self,
        enrollment_id: &str,
        secret: &str,
        public_key: &VerifyingKey,
    ) -> Result<String, IdentityError>;
}

/// HTTP membership service client.
pub struct HttpMembershipService {
    base_url: String,
    client: Client,
}

impl HttpMembershipService {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, IdentityError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IdentityError::Membership(format!("failed to build HTTP client: {e}")))?;

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
}

#[derive(Debug, Deserialize)]
struct CaMessage {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct CaResponse<T> {
    success: bool,
    result: Option<T>,
    #[serde(default)]
    errors: Vec<CaMessage>,
}

impl<T> CaResponse<T> {
    fn into_result(self, op: &str) -> Result<T, IdentityError> {
        if !self.success {
            let detail = self
                .errors
                .iter()
                .map(|m| format!("[{}] {}", m.code, m.message))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(IdentityError::Membership(format!("{op} rejected: {detail}")));
        }
        self.result
            .ok_or_else(|| IdentityError::Membership(format!("{op} response has no result")))
    }
}

#[derive(Debug, Deserialize)]
struct RegisterResult {
    secret: String,
}

#[derive(Debug, Serialize)]
struct EnrollRequest {
    public_key: String,
}

#[derive(Debug, Deserialize)]
struct EnrollResult {
    #[serde(rename = "Cert")]
    cert: String,
}

async fn read_response<T: DeserializeOwned>(
    url: &str,
    resp: reqwest::Response,
) -> Result<CaResponse<T>, IdentityError> {
    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| IdentityError::Membership(format!("reading body from {url} failed: {e}")))?;

    // The CA reports failures in the envelope, often with a 4xx status;
    // prefer the envelope when it parses.
    match serde_json::from_str::<CaResponse<T>>(&body) {
        Ok(parsed) => Ok(parsed),
        Err(_) if !status.is_success() => Err(IdentityError::Membership(format!(
            "{url} returned HTTP status {status}: {body}"
        ))),
        Err(e) => Err(IdentityError::Membership(format!(
            "failed to parse response from {url}: {e}"
        ))),
    }
}

/// Builds the registration `Authorization` token for `body`.
pub fn registration_token(registrar: &LedgerIdentity, body: &[u8]) -> String {
    format!(
        "{}.{}",
        STANDARD.encode(registrar.certificate_pem.as_bytes()),
        STANDARD.encode(registrar.sign(body))
    )
}

#[async_trait]
impl MembershipService for HttpMembershipService {
    async fn register(
        &self,
        registrar: &LedgerIdentity,
        request: &RegistrationRequest,
    ) -> Result<String, IdentityError> {
        let url = self.endpoint("/api/v1/register");
        let body = serde_json::to_vec(request).map_err(|e| {
            IdentityError::Membership(format!("failed to encode registration: {e}"))
        })?;
        let token = registration_token(registrar, &body);

        let resp = self
            .client
            .post(&url)
            .header(reqwest::header::AUTHORIZATION, token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| IdentityError::Membership(format!("HTTP POST {url} failed: {e}")))?;

        let result: RegisterResult = read_response(&url, resp).await?.into_result("register")?;
        Ok(result.secret)
    }

    async fn enroll(
        &self,
        enrollment_id: &str,
        secret: &str,
        public_key: &VerifyingKey,
    ) -> Result<String, IdentityError> {
        let url = self.endpoint("/api/v1/enroll");
        let req = EnrollRequest {
            public_key: STANDARD.encode(public_key.as_bytes()),
        };

        let resp = self
            .client
            .post(&url)
            .basic_auth(enrollment_id, Some(secret))
            .json(&req)
            .send()
            .await
            .map_err(|e| IdentityError::Membership(format!("HTTP POST {url} failed: {e}")))?;

        let result: EnrollResult = read_response(&url, resp).await?.into_result("enroll")?;
        let pem = STANDARD
            .decode(result.cert.trim())
            .map_err(|e| IdentityError::Membership(format!("certificate is not base64: {e}")))?;
        String::from_utf8(pem)
            .map_err(|e| IdentityError::Membership(format!("certificate is not UTF-8: {e}")))
    }
}
