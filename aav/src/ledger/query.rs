//! Read-only ledger queries.

use tracing::debug;

use super::{LedgerError, LedgerNetwork, proposal};
use crate::identity::LedgerIdentity;
use crate::types::{ChaincodeInvocation, ProposalResponse};

/// Evaluates ledger program functions without ordering or commit.
///
/// Every configured peer is asked; the answers come back verbatim, in
/// peer order. Divergent answers are the caller's business.
pub struct QueryClient {
    network: LedgerNetwork,
}

impl QueryClient {
    pub fn new(network: LedgerNetwork) -> Self {
        Self { network }
    }

    pub async fn query(
        &self,
        creator: &LedgerIdentity,
        invocation: ChaincodeInvocation,
    ) -> Result<Vec<ProposalResponse>, LedgerError> {
        let signed = proposal::build_signed(creator, &self.network.channel, invocation)?;
        let responses = self.network.endorse(&signed).await?;

        for resp in &responses {
            debug!(
                tx_id = %signed.proposal.tx_id,
                peer = %resp.peer,
                status = resp.status,
                payload = %resp.payload,
                "query response"
            );
        }
        Ok(responses)
    }
}
