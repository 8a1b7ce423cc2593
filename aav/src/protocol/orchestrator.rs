//! The credential protocol orchestrator.
//!
//! One call to [`Orchestrator::run`] performs one complete protocol run:
//!
//! ```text
//! Init → KeysGenerated → Committed → SignatureIssued → SignatureVerified
//!      → ProofsGenerated → ProofsVerified → CertificateIssued
//!      → CertificateVerified → Blinded → BlindVerified → Anchored → Done
//! ```
//!
//! Every remote call is awaited before the next one is built, so no two
//! provider calls are ever in flight for the same run. The first failure
//! ends the run; nothing after it is attempted and nothing reaches the
//! ledger unless every verification before `Anchored` succeeded.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{Instrument, debug, info, info_span, warn};

use super::error::{ProtocolError, RunFailure};
use super::state::{RunControl, RunState, Step};
use crate::config::{LedgerConfig, ProtocolConfig};
use crate::crypto_client::CryptoProvider;
use crate::identity::{IdentityManager, Role};
use crate::ledger::LedgerAnchor;
use crate::metrics::MetricsRegistry;
use crate::types::{BlindCertificate, ChaincodeInvocation, RunId, SecretKind, TransactionOutcome};

/// Result of a run that reached `Done`.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    /// Ledger principal that signed the anchoring transaction.
    pub principal: String,
    pub states: Vec<RunState>,
    #[serde(skip)]
    pub blind_certificate: BlindCertificate,
    pub outcome: TransactionOutcome,
}

impl RunReport {
    /// `true` when the anchoring transaction was committed as valid.
    ///
    /// A run can reach `Done` with a transaction the ledger marked invalid;
    /// callers must not treat that as an accepted verification.
    pub fn is_accepted(&self) -> bool {
        self.outcome.committed
    }
}

/// Drives protocol runs against a crypto provider and a ledger.
///
/// Shared collaborators are held behind `Arc`, so one orchestrator can
/// serve many concurrent runs; all per-run state lives inside
/// [`Orchestrator::run`] and is dropped when it returns.
pub struct Orchestrator {
    crypto: Arc<dyn CryptoProvider>,
    identities: Arc<IdentityManager>,
    anchor: Arc<dyn LedgerAnchor>,
    program_id: String,
    function: String,
    protocol: ProtocolConfig,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl Orchestrator {
    pub fn new(
        crypto: Arc<dyn CryptoProvider>,
        identities: Arc<IdentityManager>,
        anchor: Arc<dyn LedgerAnchor>,
        ledger: &LedgerConfig,
        protocol: ProtocolConfig,
    ) -> Self {
        Self {
            crypto,
            identities,
            anchor,
            program_id: ledger.program_id.clone(),
            function: ledger.function.clone(),
            protocol,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn protocol(&self) -> &ProtocolConfig {
        &self.protocol
    }

    /// Control handle honouring the configured run deadline, if any.
    pub fn control(&self) -> RunControl {
        match self.protocol.run_timeout() {
            Some(timeout) => RunControl::new().with_timeout(timeout),
            None => RunControl::new(),
        }
    }

    /// Runs the protocol for the configured attribute value.
    pub async fn run(&self, control: &RunControl) -> Result<RunReport, RunFailure> {
        self.run_with(&self.protocol.attribute, control).await
    }

    /// Runs the protocol for `attribute`.
    pub async fn run_with(
        &self,
        attribute: &str,
        control: &RunControl,
    ) -> Result<RunReport, RunFailure> {
        let run_id = RunId::generate();
        let span = info_span!("run", %run_id);
        self.execute(run_id, attribute, control).instrument(span).await
    }

    fn principal_for(&self, run_id: RunId) -> String {
        self.protocol
            .principal
            .clone()
            .unwrap_or_else(|| format!("user-{run_id}"))
    }

    async fn execute(
        &self,
        run_id: RunId,
        attribute: &str,
        control: &RunControl,
    ) -> Result<RunReport, RunFailure> {
        let mut run = Run::new(run_id, control, self.metrics.as_deref());
        info!(%run_id, "protocol run started");

        run.begin(Step::IdentityResolution);
        let principal = self.principal_for(run_id);
        let identity = run
            .call(
                "resolveIdentity",
                self.identities.resolve(&principal, Role::Client),
            )
            .await?;
        debug!(%run_id, name = %principal, "ledger identity ready");

        run.begin(Step::KeysGenerated);
        let user_keys = run.call("generateKey(User)", self.crypto.generate_key()).await?;
        let iv_keys = run.call("generateKey(IV)", self.crypto.generate_key()).await?;
        let user_pairing = run
            .call("generateKeyPairing(User)", self.crypto.generate_key_pairing())
            .await?;
        let cp_pairing = run
            .call("generateKeyPairing(CP)", self.crypto.generate_key_pairing())
            .await?;
        run.reach();

        run.begin(Step::Committed);
        let commitment = run
            .call("commit", self.crypto.commit(&user_keys.public_key, attribute))
            .await?;
        run.reach();

        run.begin(Step::SignatureIssued);
        let signature = run
            .call("sign", self.crypto.sign(&commitment.value, &iv_keys))
            .await?;
        run.reach();

        run.begin(Step::SignatureVerified);
        let verdict = run
            .call(
                "verifySignature",
                self.crypto
                    .verify_signature(&signature, &iv_keys.public_key, &commitment.value),
            )
            .await?;
        run.require("verifySignature", verdict)?;
        run.reach();

        run.begin(Step::ProofsGenerated);
        let randomness_proof = run
            .call(
                "generateZKP(randomness)",
                self.crypto.generate_zkp(
                    SecretKind::Randomness,
                    &commitment.randomness,
                    &user_keys.public_key,
                ),
            )
            .await?;
        let attribute_proof = run
            .call(
                "generateZKP(attribute)",
                self.crypto
                    .generate_zkp(SecretKind::Attribute, attribute, &user_keys.public_key),
            )
            .await?;
        run.reach();

        run.begin(Step::ProofsVerified);
        for proof in [&randomness_proof, &attribute_proof] {
            let operation = match proof.kind {
                SecretKind::Randomness => "verifyProof(randomness)",
                SecretKind::Attribute => "verifyProof(attribute)",
            };
            let verdict = run
                .call(operation, self.crypto.verify_proof(proof, &user_keys.public_key))
                .await?;
            run.require(operation, verdict)?;
        }
        run.reach();

        run.begin(Step::CertificateIssued);
        let certificate = run
            .call(
                "generateCertificate",
                self.crypto.generate_certificate(
                    &commitment.value,
                    &cp_pairing.private_key,
                    &user_pairing.g2_public,
                ),
            )
            .await?;
        run.reach();

        run.begin(Step::CertificateVerified);
        let verdict = run
            .call(
                "verifyCertificate",
                self.crypto.verify_certificate(
                    &commitment.value,
                    &certificate,
                    &cp_pairing.g1_public,
                    &user_pairing.g2_public,
                ),
            )
            .await?;
        run.require("verifyCertificate", verdict)?;
        run.reach();

        run.begin(Step::Blinded);
        let blind = run
            .call(
                "blindCertificate",
                self.crypto.blind_certificate(
                    &commitment.value,
                    &certificate,
                    &cp_pairing.g1_public,
                    &user_pairing.g2_public,
                    &user_pairing.private_key,
                ),
            )
            .await?;
        run.reach();

        run.begin(Step::BlindVerified);
        let verdict = run
            .call(
                "verifyBlindCertificate",
                self.crypto.verify_blind_certificate(&blind),
            )
            .await?;
        run.require("verifyBlindCertificate", verdict)?;
        run.reach();

        run.begin(Step::Anchored);
        let invocation = ChaincodeInvocation {
            program_id: self.program_id.clone(),
            function: self.function.clone(),
            args: blind.ledger_args(),
        };
        let outcome = run
            .call("submitTransaction", self.anchor.anchor(&identity, invocation))
            .await?;
        run.reach();

        Ok(run.finish(principal, blind, outcome))
    }
}

/// Per-run bookkeeping: state trace, cancellation checks, step timing.
struct Run<'a> {
    id: RunId,
    control: &'a RunControl,
    metrics: Option<&'a MetricsRegistry>,
    states: Vec<RunState>,
    step: Step,
    run_started: Instant,
    step_started: Instant,
}

impl<'a> Run<'a> {
    fn new(id: RunId, control: &'a RunControl, metrics: Option<&'a MetricsRegistry>) -> Self {
        let now = Instant::now();
        Self {
            id,
            control,
            metrics,
            states: vec![RunState::Init],
            step: Step::IdentityResolution,
            run_started: now,
            step_started: now,
        }
    }

    fn begin(&mut self, step: Step) {
        self.step = step;
        self.step_started = Instant::now();
    }

    /// Awaits one remote call. Cancellation is checked before the call is
    /// issued and again once it returns; a result that arrives after
    /// cancellation is discarded.
    async fn call<T, E, F>(&mut self, operation: &'static str, call: F) -> Result<T, RunFailure>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<ProtocolError>,
    {
        if let Err(e) = self.control.check() {
            return Err(self.fail(operation, e));
        }
        debug!(run_id = %self.id, step = %self.step, operation, "calling");

        let result = call.await;

        if let Err(e) = self.control.check() {
            return Err(self.fail(operation, e));
        }
        result.map_err(|e| self.fail(operation, e.into()))
    }

    /// Turns a negative verification verdict into a protocol violation.
    fn require(&mut self, operation: &'static str, verdict: bool) -> Result<(), RunFailure> {
        if verdict {
            Ok(())
        } else {
            Err(self.fail(
                operation,
                ProtocolError::ProtocolViolation(format!("{operation} returned false")),
            ))
        }
    }

    fn reach(&mut self) {
        let elapsed = self.step_started.elapsed();
        if let Some(m) = self.metrics {
            m.protocol
                .step_seconds
                .with_label_values(&[self.step.as_str()])
                .observe(elapsed.as_secs_f64());
        }
        if let Some(state) = self.step.target() {
            info!(run_id = %self.id, step = %self.step, ?elapsed, "step completed");
            self.states.push(state);
        }
    }

    fn fail(&mut self, operation: &'static str, error: ProtocolError) -> RunFailure {
        warn!(
            run_id = %self.id,
            step = %self.step,
            operation,
            kind = error.kind(),
            error = %error,
            "protocol run failed"
        );

        if let Some(m) = self.metrics {
            m.protocol
                .run_failures
                .with_label_values(&[self.step.as_str()])
                .inc();
            m.protocol
                .run_seconds
                .observe(self.run_started.elapsed().as_secs_f64());
            match &error {
                ProtocolError::Endorsement { .. } => m.protocol.endorsement_rejections.inc(),
                ProtocolError::CommitTimeout(_) => m.protocol.commit_timeouts.inc(),
                _ => {}
            }
        }

        self.states.push(RunState::Failed {
            step: self.step,
            cause: error.to_string(),
        });
        RunFailure {
            run_id: self.id,
            step: self.step,
            operation,
            error,
            states: std::mem::take(&mut self.states),
        }
    }

    fn finish(
        mut self,
        principal: String,
        blind_certificate: BlindCertificate,
        outcome: TransactionOutcome,
    ) -> RunReport {
        self.states.push(RunState::Done);
        let elapsed = self.run_started.elapsed();

        if let Some(m) = self.metrics {
            let committed = if outcome.committed { "true" } else { "false" };
            m.protocol
                .runs_completed
                .with_label_values(&[committed])
                .inc();
            m.protocol.run_seconds.observe(elapsed.as_secs_f64());
        }

        if outcome.committed {
            info!(run_id = %self.id, tx_id = %outcome.tx_id, ?elapsed, "protocol run done");
        } else {
            warn!(
                run_id = %self.id,
                tx_id = %outcome.tx_id,
                code = %outcome.validation_code,
                "protocol run done but the ledger marked the transaction invalid"
            );
        }

        RunReport {
            run_id: self.id,
            principal,
            states: self.states,
            blind_certificate,
            outcome,
        }
    }
}
