//! `HttpCryptoProvider` against an in-process fake provider.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use aav::{Certificate, CryptoError, CryptoProvider, HttpCryptoProvider, SecretKind};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};

#[derive(Clone, Default)]
struct Fake {
    /// Request bodies in arrival order, keyed by route.
    seen: Arc<Mutex<Vec<(&'static str, Value)>>>,
    certificate: Arc<Mutex<String>>,
}

impl Fake {
    fn body(&self, route: &str) -> Value {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .find(|(r, _)| *r == route)
            .map(|(_, v)| v.clone())
            .unwrap_or_else(|| panic!("{route} was not called"))
    }
}

fn record(fake: &Fake, route: &'static str, body: Value) {
    fake.seen.lock().unwrap().push((route, body));
}

async fn spawn_fake(fake: Fake) -> SocketAddr {
    let app = Router::new()
        .route(
            "/user/generateKey",
            get(|| async { Json(json!({ "priv": "PRIV", "pub": "PUB" })) }),
        )
        .route(
            "/user/generateKeyPairing",
            get(|| async { Json(json!({ "priv": "PPRIV", "g1Pub": "G1", "g2Pub": "G2" })) }),
        )
        .route(
            "/user/commitment",
            post(|State(f): State<Fake>, Json(b): Json<Value>| async move {
                record(&f, "commitment", b);
                Json(json!({ "commitment": "C1", "random": "R1" }))
            }),
        )
        .route(
            "/iv/verifySignature",
            post(|State(f): State<Fake>, Json(b): Json<Value>| async move {
                record(&f, "verifySignature", b);
                Json(json!({ "verify": "true" }))
            }),
        )
        .route(
            "/user/generateZKP/random",
            post(|State(f): State<Fake>, Json(b): Json<Value>| async move {
                record(&f, "zkpRandom", b);
                Json(json!({ "A": "A1", "t": "T1", "pubSecret": "PS1" }))
            }),
        )
        .route(
            "/CP/verifyProof/age",
            post(|State(f): State<Fake>, Json(b): Json<Value>| async move {
                record(&f, "verifyProofAge", b);
                Json(json!({ "verify": false }))
            }),
        )
        .route(
            "/CP/generateCertificate",
            post(|State(f): State<Fake>, Json(b): Json<Value>| async move {
                record(&f, "generateCertificate", b);
                let certificate = f.certificate.lock().unwrap().clone();
                Json(json!({ "certificate": certificate }))
            }),
        )
        .route(
            "/user/blindCertificate",
            post(|| async {
                Json(json!({
                    "blindCommitment": "BC1",
                    "blindCertificate": "BC2",
                    "blindPubG1CP": "BC3",
                    "blindPubG2User": "BC4",
                    "blindPrivUser": "BC5",
                    "blindGenerator": "BC6",
                    "blindFactor": "BC7"
                }))
            }),
        )
        .route(
            "/SP/verifyBlindCertificate",
            post(|State(f): State<Fake>, Json(b): Json<Value>| async move {
                record(&f, "verifyBlindCertificate", b);
                Json(json!({ "verify": "true" }))
            }),
        )
        .route(
            "/user/verifyCertificate",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "pairing failed") }),
        )
        .route("/iv/signCommitment", post(|| async { "not json" }))
        .with_state(fake);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fake provider");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("fake provider");
    });
    addr
}

async fn client(fake: &Fake) -> HttpCryptoProvider {
    let addr = spawn_fake(fake.clone()).await;
    HttpCryptoProvider::new(format!("http://{addr}"), Duration::from_secs(5)).expect("client")
}

#[tokio::test]
async fn key_generation_and_commitment_decode_provider_fields() {
    let fake = Fake::default();
    let provider = client(&fake).await;

    let keys = provider.generate_key().await.expect("generateKey");
    assert_eq!(keys.private_key, "PRIV");
    assert_eq!(keys.public_key, "PUB");

    let pairing = provider.generate_key_pairing().await.expect("generateKeyPairing");
    assert_eq!(pairing.g1_public, "G1");
    assert_eq!(pairing.g2_public, "G2");

    let commitment = provider.commit("PUB", "21").await.expect("commit");
    assert_eq!(commitment.value, "C1");
    assert_eq!(commitment.randomness, "R1");
    assert_eq!(fake.body("commitment"), json!({ "pub": "PUB", "age": "21" }));
}

#[tokio::test]
async fn verdicts_accept_string_and_boolean_encodings() {
    let fake = Fake::default();
    let provider = client(&fake).await;

    let signature = aav::Signature {
        value: "S1".to_string(),
        randomness: "R2".to_string(),
    };
    assert!(
        provider
            .verify_signature(&signature, "IVPUB", "C1")
            .await
            .expect("verifySignature")
    );
    assert_eq!(
        fake.body("verifySignature"),
        json!({ "s": "S1", "r": "R2", "pub": "IVPUB", "commitment": "C1" })
    );

    let proof = aav::ZkProof {
        kind: SecretKind::Attribute,
        a: "A".to_string(),
        t: "T".to_string(),
        public_secret: "PS".to_string(),
    };
    assert!(!provider.verify_proof(&proof, "PUB").await.expect("verifyProof"));
    assert_eq!(
        fake.body("verifyProofAge"),
        json!({ "A": "A", "t": "T", "pub": "PUB", "pubSecret": "PS" })
    );
}

#[tokio::test]
async fn proof_kind_selects_the_route() {
    let fake = Fake::default();
    let provider = client(&fake).await;

    let proof = provider
        .generate_zkp(SecretKind::Randomness, "R1", "PUB")
        .await
        .expect("generateZKP");

    assert_eq!(proof.kind, SecretKind::Randomness);
    assert_eq!(proof.a, "A1");
    assert_eq!(proof.public_secret, "PS1");
    assert_eq!(fake.body("zkpRandom"), json!({ "secret": "R1", "pub": "PUB" }));
}

#[tokio::test]
async fn false_marker_is_a_certificate_refusal() {
    let fake = Fake::default();
    *fake.certificate.lock().unwrap() = "false".to_string();
    let provider = client(&fake).await;

    let err = provider
        .generate_certificate("C1", "CPPRIV", "G2")
        .await
        .expect_err("refused");

    assert!(matches!(err, CryptoError::Refused(_)));
    assert_eq!(
        fake.body("generateCertificate"),
        json!({ "commitment": "C1", "privCP": "CPPRIV", "pubG2User": "G2" })
    );
}

#[tokio::test]
async fn blinded_certificate_round_trips_to_verification() {
    let fake = Fake::default();
    *fake.certificate.lock().unwrap() = "CERT1".to_string();
    let provider = client(&fake).await;

    let certificate = provider
        .generate_certificate("C1", "CPPRIV", "G2")
        .await
        .expect("certificate");
    assert_eq!(certificate, Certificate("CERT1".to_string()));

    let blind = provider
        .blind_certificate("C1", &certificate, "G1", "G2", "UPRIV")
        .await
        .expect("blind");
    assert_eq!(blind.ledger_args(), vec!["BC1", "BC2", "BC3", "BC4", "BC6"]);

    assert!(
        provider
            .verify_blind_certificate(&blind)
            .await
            .expect("verifyBlindCertificate")
    );
    assert_eq!(
        fake.body("verifyBlindCertificate"),
        json!({
            "blindCommitment": "BC1",
            "blindPubG1CP": "BC3",
            "blindPubG2User": "BC4",
            "blindCertificate": "BC2",
            "blindGenerator": "BC6"
        })
    );
}

#[tokio::test]
async fn error_status_is_a_transport_error_with_body() {
    let fake = Fake::default();
    let provider = client(&fake).await;

    let err = provider
        .verify_certificate("C1", &Certificate("CERT1".to_string()), "G1", "G2")
        .await
        .expect_err("500");

    match err {
        CryptoError::Transport(msg) => assert!(msg.contains("pairing failed"), "{msg}"),
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn malformed_body_is_a_serialization_error() {
    let fake = Fake::default();
    let provider = client(&fake).await;
    let keys = aav::KeyPair {
        private_key: "IVPRIV".to_string(),
        public_key: "IVPUB".to_string(),
    };

    let err = provider.sign("C1", &keys).await.expect_err("bad body");

    assert!(matches!(err, CryptoError::Serialization(_)));
}

#[tokio::test]
async fn unreachable_provider_is_a_transport_error() {
    // Bind and drop a listener to get a port nobody is serving.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    let provider =
        HttpCryptoProvider::new(format!("http://{addr}"), Duration::from_secs(1)).expect("client");

    let err = provider.generate_key().await.expect_err("connection refused");

    assert!(matches!(err, CryptoError::Transport(_)));
}
