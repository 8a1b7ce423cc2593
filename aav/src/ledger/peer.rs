//! HTTP endorsing peer.
//!
//! `POST {url}/proposals` with a JSON [`SignedProposal`]; the peer answers
//! with a [`ProposalResponse`]. A rejected endorsement is a normal answer
//! (HTTP 200, non-200 `status` in the body); only transport problems are
//! errors here. The peer's key, when configured, is what endorsement
//! signatures are checked against.

use std::time::Duration;

use async_trait::async_trait;
use ed25519_dalek::VerifyingKey;
use reqwest::Client;

use super::{EndorsingPeer, LedgerError};
use crate::types::{ProposalResponse, SignedProposal};

pub struct HttpPeer {
    name: String,
    base_url: String,
    key: Option<VerifyingKey>,
    client: Client,
}

impl HttpPeer {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LedgerError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LedgerError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into(),
            key: None,
            client,
        })
    }

    pub fn with_key(mut self, key: VerifyingKey) -> Self {
        self.key = Some(key);
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl EndorsingPeer for HttpPeer {
    fn name(&self) -> &str {
        &self.name
    }

    fn verifying_key(&self) -> Option<&VerifyingKey> {
        self.key.as_ref()
    }

    async fn process_proposal(
        &self,
        proposal: &SignedProposal,
    ) -> Result<ProposalResponse, LedgerError> {
        let url = self.endpoint("/proposals");

        let resp = self
            .client
            .post(&url)
            .json(proposal)
            .send()
            .await
            .map_err(|e| LedgerError::Transport(format!("HTTP POST {url} failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(LedgerError::Transport(format!(
                "peer {} returned HTTP status {status}",
                self.name
            )));
        }

        let mut body = resp.json::<ProposalResponse>().await.map_err(|e| {
            LedgerError::Serialization(format!("failed to parse response from {url}: {e}"))
        })?;
        if body.peer.is_empty() {
            body.peer = self.name.clone();
        }
        Ok(body)
    }
}
