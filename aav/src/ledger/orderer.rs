//! HTTP ordering service client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{LedgerError, OrderingService};
use crate::types::TransactionEnvelope;

/// Broadcast status the orderer uses for an accepted envelope.
const STATUS_SUCCESS: &str = "SUCCESS";

/// Ordering service reached over `POST {url}/broadcast`.
pub struct HttpOrderer {
    name: String,
    base_url: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct BroadcastResponse {
    status: String,
    #[serde(default)]
    info: String,
}

impl HttpOrderer {
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
            client,
        })
    }
}

#[async_trait]
impl OrderingService for HttpOrderer {
    async fn broadcast(&self, envelope: &TransactionEnvelope) -> Result<(), LedgerError> {
        let url = format!("{}/broadcast", self.base_url.trim_end_matches('/'));

        let resp = self
            .client
            .post(&url)
            .json(envelope)
            .send()
            .await
            .map_err(|e| LedgerError::Transport(format!("HTTP POST {url} failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(LedgerError::Transport(format!(
                "orderer {} returned HTTP status {status}",
                self.name
            )));
        }

        let body = resp.json::<BroadcastResponse>().await.map_err(|e| {
            LedgerError::Serialization(format!("failed to parse response from {url}: {e}"))
        })?;
        check_broadcast(&self.name, body)?;

        debug!(orderer = %self.name, tx_id = %envelope.tx_id(), "envelope accepted");
        Ok(())
    }
}

fn check_broadcast(orderer: &str, body: BroadcastResponse) -> Result<(), LedgerError> {
    if body.status == STATUS_SUCCESS {
        Ok(())
    } else {
        Err(LedgerError::Ordering(format!(
            "{orderer} answered {}: {}",
            body.status, body.info
        )))
    }
}
