use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use aav::RunReport;

use crate::state::SharedState;

/// Request body for `POST /runs`.
///
/// `attribute` overrides the configured attribute value for this run.
#[derive(Debug, Default, Deserialize)]
pub struct StartRunRequest {
    #[serde(default)]
    pub attribute: Option<String>,
}

/// Status for a run that reached `Done`.
///
/// The ledger can commit the anchoring transaction as invalid; that is
/// reported as a conflict rather than a success.
pub fn report_status(report: &RunReport) -> StatusCode {
    if report.is_accepted() {
        StatusCode::OK
    } else {
        StatusCode::CONFLICT
    }
}

/// `POST /runs`
///
/// Performs one protocol run and answers once it reached a terminal state:
///
/// - `200` with the run report when the decision was committed as valid,
/// - `409` with the run report when the ledger marked it invalid,
/// - `502` with `{run_id, step, operation, kind, cause}` when the run failed.
///
/// Dropping the connection drops the run; no further step is issued.
pub async fn start_run(
    State(state): State<SharedState>,
    Json(body): Json<StartRunRequest>,
) -> Response {
    let orchestrator = &state.orchestrator;
    let attribute = match body.attribute {
        Some(a) if a.trim().is_empty() => {
            return (StatusCode::BAD_REQUEST, "attribute must not be empty").into_response();
        }
        Some(a) => a,
        None => orchestrator.protocol().attribute.clone(),
    };

    let control = orchestrator.control();
    match orchestrator.run_with(&attribute, &control).await {
        Ok(report) => {
            tracing::info!(
                run_id = %report.run_id,
                accepted = report.is_accepted(),
                "run finished"
            );
            (report_status(&report), Json(report)).into_response()
        }
        Err(failure) => (StatusCode::BAD_GATEWAY, Json(failure.to_json())).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aav::{BlindCertificate, Hash256, RunId, RunState, TransactionOutcome, TxId};

    fn report(committed: bool) -> RunReport {
        RunReport {
            run_id: RunId::generate(),
            principal: "user-1".to_string(),
            states: vec![RunState::Init, RunState::Anchored, RunState::Done],
            blind_certificate: BlindCertificate {
                commitment: "BC1".to_string(),
                certificate: "BC2".to_string(),
                cp_pub_g1: "BC3".to_string(),
                user_pub_g2: "BC4".to_string(),
                user_private: "BC5".to_string(),
                generator: "BC6".to_string(),
                factor: "BC7".to_string(),
            },
            outcome: TransactionOutcome {
                tx_id: TxId(Hash256::compute(b"tx")),
                committed,
                block_number: 7,
                validation_code: if committed { "VALID" } else { "MVCC_READ_CONFLICT" }
                    .to_string(),
                endorsements: Vec::new(),
            },
        }
    }

    #[test]
    fn committed_runs_are_ok_and_invalid_commits_conflict() {
        assert_eq!(report_status(&report(true)), StatusCode::OK);
        assert_eq!(report_status(&report(false)), StatusCode::CONFLICT);
    }

    #[test]
    fn report_json_omits_private_blinding_material() {
        let json = serde_json::to_string(&report(true)).expect("serialize report");
        assert!(!json.contains("BC5"));
        assert!(!json.contains("BC7"));
        assert!(json.contains("\"committed\":true"));
    }

    #[test]
    fn empty_body_uses_configured_attribute() {
        let req: StartRunRequest = serde_json::from_str("{}").expect("parse");
        assert!(req.attribute.is_none());
    }
}
