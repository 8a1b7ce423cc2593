//! Ledger transaction types.
//!
//! This module defines what travels between the client and the ledger
//! network when the protocol anchors its decision:
//!
//! - a [`Proposal`] invoking a ledger program, signed by its creator,
//! - the [`ProposalResponse`] each endorsing peer answers with,
//! - the [`TransactionEnvelope`] handed to the ordering service,
//! - the [`CommitEvent`] the network emits once the transaction is in a
//!   block, and the [`TransactionOutcome`] reported to callers.
//!
//! Signed payloads use a canonical **bincode 2** encoding (`standard()`
//! config, `serde` integration); the JSON shape is only the wire format.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::Hash256;

/// Status code a peer uses for a successful endorsement.
pub const STATUS_SUCCESS: i32 = 200;

/// Transaction identifier.
///
/// Derived as `BLAKE3(nonce || creator certificate)`, so the same creator
/// never produces the same id twice as long as nonces are fresh. Encoded
/// as lowercase hex on the wire.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct TxId(pub Hash256);

impl TxId {
    pub fn derive(nonce: &[u8], creator: &Creator) -> Self {
        TxId(Hash256::compute_parts(&[
            nonce,
            creator.certificate_pem.as_bytes(),
        ]))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0.as_bytes())
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl From<TxId> for String {
    fn from(id: TxId) -> Self {
        id.to_hex()
    }
}

impl TryFrom<String> for TxId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let bytes = hex::decode(&value).map_err(|e| format!("invalid tx id {value:?}: {e}"))?;
        let arr: [u8; super::HASH_LEN] = bytes
            .try_into()
            .map_err(|_| format!("tx id {value:?} is not 32 bytes"))?;
        Ok(TxId(Hash256(arr)))
    }
}

/// A call into a deployed ledger program.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChaincodeInvocation {
    /// Name of the deployed ledger program (chaincode id).
    pub program_id: String,
    pub function: String,
    pub args: Vec<String>,
}

/// Identity of whoever signs a proposal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Creator {
    pub msp_id: String,
    pub certificate_pem: String,
}

/// Unsigned transaction proposal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    pub tx_id: TxId,
    pub channel: String,
    pub invocation: ChaincodeInvocation,
    pub creator: Creator,
    #[serde(with = "hex::serde")]
    pub nonce: Vec<u8>,
    /// Seconds since Unix epoch at proposal creation.
    pub timestamp: u64,
}

impl Proposal {
    /// Returns the canonical byte representation that gets signed.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, bincode::error::EncodeError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
    }
}

/// Proposal together with the creator's signature over
/// [`Proposal::canonical_bytes`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedProposal {
    pub proposal: Proposal,
    #[serde(with = "hex::serde")]
    pub signature: Vec<u8>,
}

/// A peer's signature over [`ProposalResponse::endorsed_bytes`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndorsementSignature {
    pub endorser: String,
    #[serde(with = "hex::serde")]
    pub signature: Vec<u8>,
}

/// One peer's answer to a proposal, kept verbatim.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalResponse {
    /// Name of the answering peer.
    pub peer: String,
    pub status: i32,
    #[serde(default)]
    pub message: String,
    /// Program response payload (query result, or empty for invokes).
    #[serde(default)]
    pub payload: String,
    /// Whether the endorsement signature checked out against the peer's
    /// configured key. Set by the client after receipt; any value the peer
    /// sends is overwritten.
    #[serde(default)]
    pub verified: bool,
    #[serde(default)]
    pub endorsement: Option<EndorsementSignature>,
}

impl ProposalResponse {
    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }

    /// Bytes an endorsing peer signs: the transaction id, its status and
    /// the program payload.
    pub fn endorsed_bytes(&self, tx_id: TxId) -> Result<Vec<u8>, bincode::error::EncodeError> {
        bincode::serde::encode_to_vec(
            (tx_id, self.status, &self.payload),
            bincode::config::standard(),
        )
    }
}

/// Payload the creator signs when submitting to the ordering service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPayload {
    pub proposal: SignedProposal,
    pub endorsements: Vec<ProposalResponse>,
}

impl TransactionPayload {
    pub fn canonical_bytes(&self) -> Result<Vec<u8>, bincode::error::EncodeError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
    }
}

/// Endorsed transaction as sent to the ordering service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEnvelope {
    pub payload: TransactionPayload,
    #[serde(with = "hex::serde")]
    pub signature: Vec<u8>,
}

impl TransactionEnvelope {
    pub fn tx_id(&self) -> TxId {
        self.payload.proposal.proposal.tx_id
    }
}

/// Notification that a transaction made it into a block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitEvent {
    pub tx_id: TxId,
    /// `false` when the block contains the transaction but validation
    /// (e.g. endorsement policy, MVCC) marked it invalid.
    pub valid: bool,
    #[serde(default)]
    pub block_number: u64,
    #[serde(default)]
    pub validation_code: String,
}

/// Result of a submitted transaction. Not persisted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionOutcome {
    pub tx_id: TxId,
    /// Mirrors [`CommitEvent::valid`]; callers must branch on it.
    pub committed: bool,
    pub block_number: u64,
    pub validation_code: String,
    pub endorsements: Vec<ProposalResponse>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creator() -> Creator {
        Creator {
            msp_id: "Org1MSP".to_string(),
            certificate_pem: "-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n"
                .to_string(),
        }
    }

    #[test]
    fn tx_id_depends_on_nonce_and_creator() {
        let c = creator();
        let a = TxId::derive(b"nonce-a", &c);
        let b = TxId::derive(b"nonce-b", &c);
        assert_ne!(a, b);
        assert_eq!(a, TxId::derive(b"nonce-a", &c));
        assert_eq!(a.to_hex().len(), 64);
    }

    #[test]
    fn tx_id_is_hex_on_the_wire() {
        let id = TxId::derive(b"n", &creator());
        let json = serde_json::to_string(&id).expect("serialize tx id");
        assert_eq!(json, format!("\"{}\"", id.to_hex()));

        let back: TxId = serde_json::from_str(&json).expect("deserialize tx id");
        assert_eq!(back, id);

        assert!(serde_json::from_str::<TxId>("\"abcd\"").is_err());
        assert!(serde_json::from_str::<TxId>("\"not-hex\"").is_err());
    }

    #[test]
    fn proposal_canonical_bytes_are_stable() {
        let c = creator();
        let proposal = Proposal {
            tx_id: TxId::derive(b"n", &c),
            channel: "mychannel".to_string(),
            invocation: ChaincodeInvocation {
                program_id: "aav".to_string(),
                function: "verify".to_string(),
                args: vec!["a".to_string(), "b".to_string()],
            },
            creator: c,
            nonce: b"n".to_vec(),
            timestamp: 1_700_000_000,
        };

        let first = proposal.canonical_bytes().expect("encode");
        let second = proposal.clone().canonical_bytes().expect("encode");
        assert_eq!(first, second);

        let mut other = proposal;
        other.invocation.args.push("c".to_string());
        assert_ne!(first, other.canonical_bytes().expect("encode"));
    }

    #[test]
    fn proposal_response_tolerates_missing_optional_fields() {
        let json = r#"{ "peer": "peer1-Org1", "status": 500 }"#;
        let resp: ProposalResponse = serde_json::from_str(json).expect("parse response");
        assert!(!resp.is_success());
        assert!(!resp.verified);
        assert!(resp.endorsement.is_none());
        assert!(resp.message.is_empty());
    }
}
