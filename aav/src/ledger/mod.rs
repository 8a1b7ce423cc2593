//! Ledger network client: endorsed transaction submission and queries.
//!
//! The network is reached through three seams so tests can substitute
//! in-memory doubles:
//!
//! - [`EndorsingPeer`]: simulates a proposal and answers with a
//!   [`ProposalResponse`],
//! - [`OrderingService`]: accepts an endorsed [`TransactionEnvelope`],
//! - [`CommitEventSource`]: delivers the [`CommitEvent`] for a transaction.
//!
//! [`LedgerNetwork`] bundles them with the channel name and the timeouts
//! that bound every call. HTTP implementations of the three seams live in
//! [`peer`], [`orderer`] and [`events`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ed25519_dalek::VerifyingKey;
use futures::future::join_all;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::LedgerConfig;
use crate::identity::LedgerIdentity;
use crate::types::{
    ChaincodeInvocation, CommitEvent, ProposalResponse, SignedProposal, TransactionEnvelope,
    TransactionOutcome, TxId,
};

pub mod events;
pub mod orderer;
pub mod peer;
pub mod proposal;
pub mod query;
pub mod submitter;

pub use events::HttpCommitEvents;
pub use orderer::HttpOrderer;
pub use peer::HttpPeer;
pub use query::QueryClient;
pub use submitter::TransactionSubmitter;

/// Errors raised while talking to the ledger network.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// A peer, the orderer or the event stream could not be reached, or
    /// timed out.
    #[error("ledger transport error: {0}")]
    Transport(String),

    /// At least one endorsing peer rejected the proposal.
    #[error("endorsement rejected by {peer}: status {status}, message {message:?}, verified {verified}")]
    Endorsement {
        peer: String,
        status: i32,
        message: String,
        verified: bool,
    },

    /// The ordering service refused the envelope.
    #[error("ordering service refused transaction: {0}")]
    Ordering(String),

    /// No commit notification arrived within the bound.
    #[error("no commit event within {0:?}")]
    CommitTimeout(Duration),

    #[error("ledger serialization error: {0}")]
    Serialization(String),
}

impl From<bincode::error::EncodeError> for LedgerError {
    fn from(e: bincode::error::EncodeError) -> Self {
        LedgerError::Serialization(format!("canonical encoding failed: {e}"))
    }
}

/// A peer that endorses (simulates) proposals.
#[async_trait]
pub trait EndorsingPeer: Send + Sync {
    fn name(&self) -> &str;

    /// Key the peer signs endorsements with, if known.
    fn verifying_key(&self) -> Option<&VerifyingKey> {
        None
    }

    async fn process_proposal(
        &self,
        proposal: &SignedProposal,
    ) -> Result<ProposalResponse, LedgerError>;
}

/// The service that orders endorsed transactions into blocks.
#[async_trait]
pub trait OrderingService: Send + Sync {
    async fn broadcast(&self, envelope: &TransactionEnvelope) -> Result<(), LedgerError>;
}

/// Source of per-transaction commit notifications.
#[async_trait]
pub trait CommitEventSource: Send + Sync {
    /// Registers interest in `tx_id`. Must be called before the envelope
    /// is broadcast so the event cannot be missed.
    async fn subscribe(&self, tx_id: TxId) -> Result<CommitSubscription, LedgerError>;
}

/// One-shot commit notification for a single transaction.
///
/// Dropping the subscription stops any background task feeding it.
pub struct CommitSubscription {
    rx: oneshot::Receiver<Result<CommitEvent, LedgerError>>,
    task: Option<JoinHandle<()>>,
}

impl CommitSubscription {
    pub fn new(rx: oneshot::Receiver<Result<CommitEvent, LedgerError>>) -> Self {
        Self { rx, task: None }
    }

    /// Subscription fed by a spawned task; the task is aborted on drop.
    pub fn with_task(
        rx: oneshot::Receiver<Result<CommitEvent, LedgerError>>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            rx,
            task: Some(task),
        }
    }

    /// Waits for the event. A stream that closes without one is a
    /// transport error.
    pub async fn wait(mut self) -> Result<CommitEvent, LedgerError> {
        match (&mut self.rx).await {
            Ok(result) => result,
            Err(_) => Err(LedgerError::Transport(
                "commit event stream closed before delivering an event".to_string(),
            )),
        }
    }
}

impl Drop for CommitSubscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Anchors a protocol decision on the ledger.
#[async_trait]
pub trait LedgerAnchor: Send + Sync {
    async fn anchor(
        &self,
        creator: &LedgerIdentity,
        invocation: ChaincodeInvocation,
    ) -> Result<TransactionOutcome, LedgerError>;
}

/// Connection to one channel of the ledger network.
#[derive(Clone)]
pub struct LedgerNetwork {
    pub channel: String,
    pub peers: Vec<Arc<dyn EndorsingPeer>>,
    pub orderer: Arc<dyn OrderingService>,
    pub events: Arc<dyn CommitEventSource>,
    /// Bound on each peer call and on the orderer call.
    pub proposal_timeout: Duration,
    /// Bound on the wait for the commit event.
    pub commit_timeout: Duration,
}

impl LedgerNetwork {
    /// Builds HTTP adapters for every endpoint in `cfg`.
    pub fn from_config(cfg: &LedgerConfig) -> Result<Self, LedgerError> {
        let proposal_timeout = cfg.proposal_timeout();

        let peers = cfg
            .peers
            .iter()
            .map(|p| {
                let key = p
                    .verifying_key()
                    .map_err(|e| LedgerError::Serialization(e.to_string()))?;
                let peer = HttpPeer::new(p.name.clone(), p.url.clone(), proposal_timeout)?;
                let peer = match key {
                    Some(key) => peer.with_key(key),
                    None => peer,
                };
                Ok::<_, LedgerError>(Arc::new(peer) as Arc<dyn EndorsingPeer>)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let event_peer = cfg
            .peers
            .first()
            .ok_or_else(|| LedgerError::Transport("no endorsing peers configured".to_string()))?;

        Ok(Self {
            channel: cfg.channel.clone(),
            peers,
            orderer: Arc::new(HttpOrderer::new(
                cfg.orderer.name.clone(),
                cfg.orderer.url.clone(),
                proposal_timeout,
            )?),
            events: Arc::new(HttpCommitEvents::new(event_peer.url.clone())?),
            proposal_timeout,
            commit_timeout: cfg.commit_timeout(),
        })
    }

    /// Sends `proposal` to every peer in parallel and returns the answers
    /// in peer order.
    ///
    /// A peer that cannot be reached within the proposal timeout fails the
    /// whole call; a peer that answers with a non-success status does not.
    /// Each answer's `verified` flag is recomputed from its endorsement
    /// signature and the peer's configured key.
    pub async fn endorse(
        &self,
        proposal: &SignedProposal,
    ) -> Result<Vec<ProposalResponse>, LedgerError> {
        let bound = self.proposal_timeout;
        let calls = self.peers.iter().map(|peer| async move {
            match tokio::time::timeout(bound, peer.process_proposal(proposal)).await {
                Ok(result) => result,
                Err(_) => Err(LedgerError::Transport(format!(
                    "peer {} did not answer within {bound:?}",
                    peer.name()
                ))),
            }
        });

        let mut responses = Vec::with_capacity(self.peers.len());
        for (peer, result) in self.peers.iter().zip(join_all(calls).await) {
            match result {
                Ok(mut resp) => {
                    resp.verified =
                        proposal::verify_endorsement(proposal, &resp, peer.verifying_key());
                    if !resp.verified {
                        debug!(peer = peer.name(), status = resp.status, "endorsement not verified");
                    }
                    responses.push(resp);
                }
                Err(e) => {
                    warn!(peer = peer.name(), error = %e, "peer call failed");
                    return Err(e);
                }
            }
        }
        Ok(responses)
    }
}
