//! Endorsed transaction submission.
//!
//! [`TransactionSubmitter::submit`] runs the full write path:
//!
//! 1. build and sign a proposal,
//! 2. collect endorsements from every peer in parallel,
//! 3. abort on the first rejection (strict unanimity: nothing reaches the
//!    orderer unless every peer endorsed),
//! 4. subscribe to the commit event, broadcast the envelope, and wait for
//!    the event within the commit timeout.
//!
//! Broadcasting is not idempotent and is never retried here.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{LedgerAnchor, LedgerError, LedgerNetwork, proposal};
use crate::identity::LedgerIdentity;
use crate::types::{ChaincodeInvocation, ProposalResponse, TransactionOutcome};

pub struct TransactionSubmitter {
    network: LedgerNetwork,
}

impl TransactionSubmitter {
    pub fn new(network: LedgerNetwork) -> Self {
        Self { network }
    }

    pub fn network(&self) -> &LedgerNetwork {
        &self.network
    }

    pub async fn submit(
        &self,
        creator: &LedgerIdentity,
        invocation: ChaincodeInvocation,
    ) -> Result<TransactionOutcome, LedgerError> {
        let signed = proposal::build_signed(creator, &self.network.channel, invocation)?;
        let tx_id = signed.proposal.tx_id;
        debug!(
            %tx_id,
            program = %signed.proposal.invocation.program_id,
            function = %signed.proposal.invocation.function,
            "sending proposal to {} peer(s)",
            self.network.peers.len()
        );

        let responses = self.network.endorse(&signed).await?;
        let (accepted, rejected): (Vec<ProposalResponse>, Vec<ProposalResponse>) =
            responses.into_iter().partition(ProposalResponse::is_success);

        for resp in &accepted {
            debug!(%tx_id, peer = %resp.peer, verified = resp.verified, "endorsement accepted");
        }
        if let Some(first) = rejected.into_iter().next() {
            warn!(
                %tx_id,
                peer = %first.peer,
                status = first.status,
                message = %first.message,
                "endorsement rejected; transaction not sent for ordering"
            );
            return Err(LedgerError::Endorsement {
                peer: first.peer,
                status: first.status,
                message: first.message,
                verified: first.verified,
            });
        }

        let subscription = self.network.events.subscribe(tx_id).await?;
        let envelope = proposal::build_envelope(creator, signed, accepted.clone())?;

        match tokio::time::timeout(
            self.network.proposal_timeout,
            self.network.orderer.broadcast(&envelope),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(LedgerError::Transport(format!(
                    "orderer did not answer within {:?}",
                    self.network.proposal_timeout
                )));
            }
        }
        debug!(%tx_id, "transaction broadcast; waiting for commit");

        let bound = self.network.commit_timeout;
        let event = match tokio::time::timeout(bound, subscription.wait()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(%tx_id, ?bound, "no commit event before timeout");
                return Err(LedgerError::CommitTimeout(bound));
            }
        };

        info!(
            %tx_id,
            valid = event.valid,
            block = event.block_number,
            code = %event.validation_code,
            "transaction committed"
        );

        Ok(TransactionOutcome {
            tx_id,
            committed: event.valid,
            block_number: event.block_number,
            validation_code: event.validation_code,
            endorsements: accepted,
        })
    }
}

#[async_trait]
impl LedgerAnchor for TransactionSubmitter {
    async fn anchor(
        &self,
        creator: &LedgerIdentity,
        invocation: ChaincodeInvocation,
    ) -> Result<TransactionOutcome, LedgerError> {
        self.submit(creator, invocation).await
    }
}
