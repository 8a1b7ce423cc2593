//! In-memory test doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use aav::ledger::{
    CommitEventSource, CommitSubscription, EndorsingPeer, LedgerError, LedgerNetwork,
    OrderingService,
};
use aav::{
    BlindCertificate, Certificate, CommitEvent, Commitment, CryptoError, CryptoProvider,
    EndorsementSignature, IdentityError, IdentityManager, KeyPair, LedgerIdentity,
    MembershipConfig, MembershipService, PairingKeyPair, ProposalResponse, Role, RunControl,
    SecretKind, Signature, SignedProposal, TransactionEnvelope, TxId, ZkProof,
};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use ed25519_dalek::{Signer as _, SigningKey, VerifyingKey};
use tokio::sync::oneshot;

// ---------------------------------------------------------------------------
// Crypto provider
// ---------------------------------------------------------------------------

/// One recorded provider call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Call {
    pub op: &'static str,
    pub args: Vec<String>,
}

/// Provider double answering with fixed, recognisable values:
/// commitment `C1` / `R1`, signature `S1` / `R2`, certificate `CERT1` and
/// blind certificate `BC1`..`BC7`.
#[derive(Default)]
pub struct ScriptedProvider {
    calls: Mutex<Vec<Call>>,
    key_counter: AtomicUsize,
    /// Verification operations that answer `false`.
    rejecting: Mutex<Vec<&'static str>>,
    refuse_certificate: Mutex<bool>,
    /// Cancels the given control while answering the given operation.
    cancel_on: Mutex<Option<(&'static str, RunControl)>>,
}

impl ScriptedProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reject(&self, op: &'static str) {
        self.rejecting.lock().unwrap().push(op);
    }

    pub fn refuse_certificate(&self) {
        *self.refuse_certificate.lock().unwrap() = true;
    }

    pub fn cancel_during(&self, op: &'static str, control: RunControl) {
        *self.cancel_on.lock().unwrap() = Some((op, control));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn ops(&self) -> Vec<&'static str> {
        self.calls().into_iter().map(|c| c.op).collect()
    }

    fn record(&self, op: &'static str, args: &[&str]) {
        self.calls.lock().unwrap().push(Call {
            op,
            args: args.iter().map(|s| s.to_string()).collect(),
        });
        if let Some((cancel_op, control)) = self.cancel_on.lock().unwrap().as_ref() {
            if *cancel_op == op {
                control.cancel();
            }
        }
    }

    fn verdict(&self, op: &'static str) -> bool {
        !self.rejecting.lock().unwrap().contains(&op)
    }
}

#[async_trait]
impl CryptoProvider for ScriptedProvider {
    async fn generate_key(&self) -> Result<KeyPair, CryptoError> {
        self.record("generateKey", &[]);
        let n = self.key_counter.fetch_add(1, Ordering::SeqCst);
        Ok(KeyPair {
            private_key: format!("PRIV{n}"),
            public_key: format!("PUB{n}"),
        })
    }

    async fn generate_key_pairing(&self) -> Result<PairingKeyPair, CryptoError> {
        self.record("generateKeyPairing", &[]);
        let n = self.key_counter.fetch_add(1, Ordering::SeqCst);
        Ok(PairingKeyPair {
            private_key: format!("PPRIV{n}"),
            g1_public: format!("G1_{n}"),
            g2_public: format!("G2_{n}"),
        })
    }

    async fn commit(&self, user_public: &str, attribute: &str) -> Result<Commitment, CryptoError> {
        self.record("commit", &[user_public, attribute]);
        Ok(Commitment {
            value: "C1".to_string(),
            randomness: "R1".to_string(),
        })
    }

    async fn sign(&self, commitment: &str, iv_keys: &KeyPair) -> Result<Signature, CryptoError> {
        self.record(
            "sign",
            &[commitment, iv_keys.private_key.as_str(), iv_keys.public_key.as_str()],
        );
        Ok(Signature {
            value: "S1".to_string(),
            randomness: "R2".to_string(),
        })
    }

    async fn verify_signature(
        &self,
        signature: &Signature,
        iv_public: &str,
        commitment: &str,
    ) -> Result<bool, CryptoError> {
        self.record(
            "verifySignature",
            &[signature.value.as_str(), signature.randomness.as_str(), iv_public, commitment],
        );
        Ok(self.verdict("verifySignature"))
    }

    async fn generate_zkp(
        &self,
        kind: SecretKind,
        secret: &str,
        user_public: &str,
    ) -> Result<ZkProof, CryptoError> {
        self.record("generateZKP", &[kind.as_str(), secret, user_public]);
        Ok(ZkProof {
            kind,
            a: format!("A_{kind}"),
            t: format!("T_{kind}"),
            public_secret: format!("PS_{kind}"),
        })
    }

    async fn verify_proof(&self, proof: &ZkProof, user_public: &str) -> Result<bool, CryptoError> {
        self.record(
            "verifyProof",
            &[
                proof.kind.as_str(),
                proof.a.as_str(),
                proof.t.as_str(),
                user_public,
                proof.public_secret.as_str(),
            ],
        );
        Ok(self.verdict("verifyProof"))
    }

    async fn generate_certificate(
        &self,
        commitment: &str,
        cp_private: &str,
        user_g2_public: &str,
    ) -> Result<Certificate, CryptoError> {
        self.record("generateCertificate", &[commitment, cp_private, user_g2_public]);
        if *self.refuse_certificate.lock().unwrap() {
            return Err(CryptoError::Refused("certificate refused".to_string()));
        }
        Ok(Certificate("CERT1".to_string()))
    }

    async fn verify_certificate(
        &self,
        commitment: &str,
        certificate: &Certificate,
        cp_g1_public: &str,
        user_g2_public: &str,
    ) -> Result<bool, CryptoError> {
        self.record(
            "verifyCertificate",
            &[commitment, certificate.as_str(), cp_g1_public, user_g2_public],
        );
        Ok(self.verdict("verifyCertificate"))
    }

    async fn blind_certificate(
        &self,
        commitment: &str,
        certificate: &Certificate,
        cp_g1_public: &str,
        user_g2_public: &str,
        user_private: &str,
    ) -> Result<BlindCertificate, CryptoError> {
        self.record(
            "blindCertificate",
            &[
                commitment,
                certificate.as_str(),
                cp_g1_public,
                user_g2_public,
                user_private,
            ],
        );
        Ok(BlindCertificate {
            commitment: "BC1".to_string(),
            certificate: "BC2".to_string(),
            cp_pub_g1: "BC3".to_string(),
            user_pub_g2: "BC4".to_string(),
            user_private: "BC5".to_string(),
            generator: "BC6".to_string(),
            factor: "BC7".to_string(),
        })
    }

    async fn verify_blind_certificate(&self, blind: &BlindCertificate) -> Result<bool, CryptoError> {
        self.record(
            "verifyBlindCertificate",
            &[
                blind.commitment.as_str(),
                blind.cp_pub_g1.as_str(),
                blind.user_pub_g2.as_str(),
                blind.certificate.as_str(),
                blind.generator.as_str(),
            ],
        );
        Ok(self.verdict("verifyBlindCertificate"))
    }
}

// ---------------------------------------------------------------------------
// Membership service
// ---------------------------------------------------------------------------

/// Certificate PEM the fake CA issues for `subject`.
pub fn fake_certificate(subject: &str) -> String {
    format!(
        "-----BEGIN CERTIFICATE-----\n{}\n-----END CERTIFICATE-----\n",
        STANDARD.encode(format!("cert for {subject}"))
    )
}

/// Membership double counting registrations and enrollments.
#[derive(Default)]
pub struct CountingMembership {
    pub registrations: AtomicUsize,
    pub enrollments: AtomicUsize,
    /// Registered ids, in order.
    pub registered: Mutex<Vec<String>>,
    /// When set, every call fails as if the CA were unreachable.
    pub unavailable: Mutex<bool>,
    /// Artificial latency per call, to widen race windows.
    pub delay: Duration,
}

impl CountingMembership {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Self::default()
        })
    }

    pub fn registrations(&self) -> usize {
        self.registrations.load(Ordering::SeqCst)
    }

    pub fn enrollments(&self) -> usize {
        self.enrollments.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), IdentityError> {
        if *self.unavailable.lock().unwrap() {
            Err(IdentityError::Membership("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MembershipService for CountingMembership {
    async fn register(
        &self,
        registrar: &LedgerIdentity,
        request: &aav::identity::RegistrationRequest,
    ) -> Result<String, IdentityError> {
        self.check_available()?;
        assert!(registrar.roles.contains(&Role::Admin), "registrar must be admin");
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.registrations.fetch_add(1, Ordering::SeqCst);
        self.registered.lock().unwrap().push(request.id.clone());
        Ok(format!("secret-{}", request.id))
    }

    async fn enroll(
        &self,
        enrollment_id: &str,
        _secret: &str,
        _public_key: &VerifyingKey,
    ) -> Result<String, IdentityError> {
        self.check_available()?;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.enrollments.fetch_add(1, Ordering::SeqCst);
        Ok(fake_certificate(enrollment_id))
    }
}

pub fn membership_config(cache_dir: &Path) -> MembershipConfig {
    MembershipConfig {
        cache_dir: cache_dir.to_path_buf(),
        ..MembershipConfig::default()
    }
}

pub fn identity_manager(cache_dir: &Path, membership: Arc<CountingMembership>) -> IdentityManager {
    IdentityManager::new(membership_config(cache_dir), membership)
}

pub fn test_identity(name: &str) -> LedgerIdentity {
    LedgerIdentity::new(
        name,
        "Org1MSP",
        vec![Role::Client],
        "org1",
        SigningKey::generate(&mut rand::rngs::OsRng),
        fake_certificate(name),
    )
}

// ---------------------------------------------------------------------------
// Ledger network
// ---------------------------------------------------------------------------

/// Peer double answering every proposal with a fixed status.
///
/// Every answer claims to be verified; the client is expected to ignore
/// the claim. A peer built with [`MockPeer::signing`] signs its answers.
pub struct MockPeer {
    pub name: String,
    pub status: i32,
    pub payload: String,
    pub delay: Duration,
    pub unreachable: bool,
    /// Key answers are signed with.
    pub signer: Option<SigningKey>,
    /// Key the client is told to check answers against.
    pub key: Option<VerifyingKey>,
    pub calls: AtomicUsize,
    pub seen: Mutex<Vec<SignedProposal>>,
}

impl MockPeer {
    fn base(name: &str, status: i32) -> Self {
        Self {
            name: name.to_string(),
            status,
            payload: String::new(),
            delay: Duration::ZERO,
            unreachable: false,
            signer: None,
            key: None,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn new(name: &str, status: i32) -> Arc<Self> {
        Arc::new(Self::base(name, status))
    }

    pub fn answering(name: &str, payload: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            payload: payload.to_string(),
            delay,
            ..Self::base(name, 200)
        })
    }

    pub fn unreachable(name: &str) -> Arc<Self> {
        Arc::new(Self {
            unreachable: true,
            ..Self::base(name, 200)
        })
    }

    /// Signs answers with `signer`, whose public half is the configured key.
    pub fn signing(name: &str, status: i32, signer: SigningKey) -> Arc<Self> {
        let key = signer.verifying_key();
        Self::signing_for(name, status, signer, key)
    }

    /// Signs answers with `signer` while the client expects `key`.
    pub fn signing_for(
        name: &str,
        status: i32,
        signer: SigningKey,
        key: VerifyingKey,
    ) -> Arc<Self> {
        Arc::new(Self {
            signer: Some(signer),
            key: Some(key),
            ..Self::base(name, status)
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_args(&self) -> Option<Vec<String>> {
        self.seen
            .lock()
            .unwrap()
            .last()
            .map(|p| p.proposal.invocation.args.clone())
    }
}

#[async_trait]
impl EndorsingPeer for MockPeer {
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
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(proposal.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.unreachable {
            return Err(LedgerError::Transport(format!("{} unreachable", self.name)));
        }
        let mut response = ProposalResponse {
            peer: self.name.clone(),
            status: self.status,
            message: if self.status == 200 {
                String::new()
            } else {
                "chaincode error".to_string()
            },
            payload: self.payload.clone(),
            verified: true,
            endorsement: None,
        };
        if let Some(signer) = &self.signer {
            let bytes = response
                .endorsed_bytes(proposal.proposal.tx_id)
                .expect("encode endorsement");
            response.endorsement = Some(EndorsementSignature {
                endorser: self.name.clone(),
                signature: signer.sign(&bytes).to_bytes().to_vec(),
            });
        }
        Ok(response)
    }
}

/// Event source double: subscriptions stay pending until `deliver`.
#[derive(Default)]
pub struct MockEvents {
    pending: Mutex<HashMap<TxId, oneshot::Sender<Result<CommitEvent, LedgerError>>>>,
    pub subscriptions: AtomicUsize,
}

impl MockEvents {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn deliver(&self, tx_id: TxId, valid: bool) {
        if let Some(tx) = self.pending.lock().unwrap().remove(&tx_id) {
            let _ = tx.send(Ok(CommitEvent {
                tx_id,
                valid,
                block_number: 1,
                validation_code: if valid { "VALID" } else { "MVCC_READ_CONFLICT" }.to_string(),
            }));
        }
    }

    /// Closes the stream for `tx_id` without an event.
    pub fn close(&self, tx_id: TxId) {
        self.pending.lock().unwrap().remove(&tx_id);
    }
}

#[async_trait]
impl CommitEventSource for MockEvents {
    async fn subscribe(&self, tx_id: TxId) -> Result<CommitSubscription, LedgerError> {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(tx_id, tx);
        Ok(CommitSubscription::new(rx))
    }
}

/// What the orderer double does with an accepted envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitBehaviour {
    /// Deliver a commit event with the given validity.
    Commit { valid: bool },
    /// Never deliver an event.
    Silent,
    /// Close the event stream without an event.
    Close,
    /// Refuse the envelope.
    Refuse,
}

pub struct MockOrderer {
    pub events: Arc<MockEvents>,
    pub behaviour: CommitBehaviour,
    pub broadcasts: AtomicUsize,
    pub envelopes: Mutex<Vec<TransactionEnvelope>>,
}

impl MockOrderer {
    pub fn new(events: Arc<MockEvents>, behaviour: CommitBehaviour) -> Arc<Self> {
        Arc::new(Self {
            events,
            behaviour,
            broadcasts: AtomicUsize::new(0),
            envelopes: Mutex::new(Vec::new()),
        })
    }

    pub fn broadcasts(&self) -> usize {
        self.broadcasts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrderingService for MockOrderer {
    async fn broadcast(&self, envelope: &TransactionEnvelope) -> Result<(), LedgerError> {
        self.broadcasts.fetch_add(1, Ordering::SeqCst);
        self.envelopes.lock().unwrap().push(envelope.clone());
        let tx_id = envelope.tx_id();
        match self.behaviour {
            CommitBehaviour::Commit { valid } => self.events.deliver(tx_id, valid),
            CommitBehaviour::Silent => {}
            CommitBehaviour::Close => self.events.close(tx_id),
            CommitBehaviour::Refuse => {
                return Err(LedgerError::Ordering("BAD_REQUEST: bad signature".to_string()));
            }
        }
        Ok(())
    }
}

/// Ledger network over the given doubles.
pub fn network(
    peers: &[Arc<MockPeer>],
    orderer: Arc<MockOrderer>,
    commit_timeout: Duration,
) -> LedgerNetwork {
    LedgerNetwork {
        channel: "mychannel".to_string(),
        peers: peers
            .iter()
            .map(|p| p.clone() as Arc<dyn EndorsingPeer>)
            .collect(),
        events: orderer.events.clone(),
        orderer,
        proposal_timeout: Duration::from_secs(100),
        commit_timeout,
    }
}
