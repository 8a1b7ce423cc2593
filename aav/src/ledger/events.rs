//! Commit notifications over HTTP long polling.
//!
//! `GET {peer}/events/transactions/{tx_id}` blocks until the transaction is
//! in a block and then answers with its [`CommitEvent`]. The request is
//! issued from a spawned task as soon as the caller subscribes; the caller
//! applies its own bound when waiting.

use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::oneshot;
use tracing::debug;

use super::{CommitEventSource, CommitSubscription, LedgerError};
use crate::types::{CommitEvent, TxId};

pub struct HttpCommitEvents {
    base_url: String,
    client: Client,
}

impl HttpCommitEvents {
    /// No request timeout is set; the subscriber bounds the wait.
    pub fn new(base_url: impl Into<String>) -> Result<Self, LedgerError> {
        let client = Client::builder()
            .build()
            .map_err(|e| LedgerError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }
}

async fn poll_commit(client: Client, url: String, tx_id: TxId) -> Result<CommitEvent, LedgerError> {
    let resp = client
        .get(&url)
        .send()
        .await
        .map_err(|e| LedgerError::Transport(format!("HTTP GET {url} failed: {e}")))?;

    let status = resp.status();
    if !status.is_success() {
        return Err(LedgerError::Transport(format!(
            "event stream returned HTTP status {status}"
        )));
    }

    let event = resp.json::<CommitEvent>().await.map_err(|e| {
        LedgerError::Serialization(format!("failed to parse commit event: {e}"))
    })?;
    if event.tx_id != tx_id {
        return Err(LedgerError::Transport(format!(
            "event stream delivered {} while waiting for {tx_id}",
            event.tx_id
        )));
    }
    Ok(event)
}

#[async_trait]
impl CommitEventSource for HttpCommitEvents {
    async fn subscribe(&self, tx_id: TxId) -> Result<CommitSubscription, LedgerError> {
        let url = format!(
            "{}/events/transactions/{tx_id}",
            self.base_url.trim_end_matches('/')
        );
        debug!(%tx_id, "subscribing to commit event");

        let (tx, rx) = oneshot::channel();
        let client = self.client.clone();
        let task = tokio::spawn(async move {
            let result = poll_commit(client, url, tx_id).await;
            // The receiver is gone when the subscriber timed out.
            let _ = tx.send(result);
        });

        Ok(CommitSubscription::with_task(rx, task))
    }
}
