//! On-disk identity cache.
//!
//! One JSON file per identity name, `<dir>/<name>.json`:
//!
//! ```json
//! {
//!   "version": 1,
//!   "name": "admin",
//!   "mspId": "Org1MSP",
//!   "roles": ["admin"],
//!   "affiliation": "org1",
//!   "algorithm": "Ed25519",
//!   "encodedPrivateKey": "<base64 PKCS#8 DER>",
//!   "certificatePem": "-----BEGIN CERTIFICATE-----\n..."
//! }
//! ```
//!
//! A missing file means "never enrolled". A file that exists but fails any
//! check is an error, never a miss.

use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use ed25519_dalek::SigningKey;
use ed25519_dalek::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use serde::{Deserialize, Serialize};
use tokio::fs;
use uuid::Uuid;

use super::{IdentityError, KEY_ALGORITHM, LedgerIdentity, Role, validate_name};

/// Current on-disk schema version.
pub const CACHE_VERSION: u32 = 1;

const PEM_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const PEM_END: &str = "-----END CERTIFICATE-----";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CachedIdentity {
    version: u32,
    name: String,
    msp_id: String,
    roles: Vec<Role>,
    affiliation: String,
    algorithm: String,
    encoded_private_key: String,
    certificate_pem: String,
}

/// File-backed identity cache rooted at a directory.
#[derive(Clone, Debug)]
pub struct IdentityCache {
    dir: PathBuf,
}

impl IdentityCache {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entry_path(&self, name: &str) -> Result<PathBuf, IdentityError> {
        validate_name(name)?;
        Ok(self.dir.join(format!("{name}.json")))
    }

    /// Loads the identity cached under `name`, or `None` if there is none.
    pub async fn load(&self, name: &str) -> Result<Option<LedgerIdentity>, IdentityError> {
        let path = self.entry_path(name)?;
        let raw = match fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let record: CachedIdentity = serde_json::from_slice(&raw).map_err(|e| {
            IdentityError::Serialization(format!("{}: malformed entry: {e}", path.display()))
        })?;

        decode(name, record)
            .map(Some)
            .map_err(|msg| IdentityError::Serialization(format!("{}: {msg}", path.display())))
    }

    /// Persists `identity`, replacing any previous entry atomically.
    pub async fn store(&self, identity: &LedgerIdentity) -> Result<(), IdentityError> {
        let path = self.entry_path(&identity.name)?;
        let record = encode(identity)?;
        let json = serde_json::to_vec_pretty(&record)
            .map_err(|e| IdentityError::Serialization(format!("failed to encode entry: {e}")))?;

        fs::create_dir_all(&self.dir).await?;
        let tmp = self
            .dir
            .join(format!(".{}.{}.tmp", identity.name, Uuid::new_v4().simple()));
        fs::write(&tmp, &json).await?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

fn encode(identity: &LedgerIdentity) -> Result<CachedIdentity, IdentityError> {
    let der = identity
        .signing_key()
        .to_pkcs8_der()
        .map_err(|e| IdentityError::Serialization(format!("failed to encode private key: {e}")))?;

    Ok(CachedIdentity {
        version: CACHE_VERSION,
        name: identity.name.clone(),
        msp_id: identity.msp_id.clone(),
        roles: identity.roles.clone(),
        affiliation: identity.affiliation.clone(),
        algorithm: identity.algorithm().to_string(),
        encoded_private_key: STANDARD.encode(der.as_bytes()),
        certificate_pem: identity.certificate_pem.clone(),
    })
}

fn decode(name: &str, record: CachedIdentity) -> Result<LedgerIdentity, String> {
    if record.version != CACHE_VERSION {
        return Err(format!("unsupported schema version {}", record.version));
    }
    if record.name != name {
        return Err(format!(
            "entry belongs to {:?}, expected {name:?}",
            record.name
        ));
    }
    if record.algorithm != KEY_ALGORITHM {
        return Err(format!("unsupported key algorithm {:?}", record.algorithm));
    }

    let der = STANDARD
        .decode(record.encoded_private_key.trim())
        .map_err(|e| format!("private key is not valid base64: {e}"))?;
    let signing_key = SigningKey::from_pkcs8_der(&der)
        .map_err(|e| format!("private key is not valid PKCS#8: {e}"))?;

    validate_certificate_pem(&record.certificate_pem)?;

    Ok(LedgerIdentity::new(
        record.name,
        record.msp_id,
        record.roles,
        record.affiliation,
        signing_key,
        record.certificate_pem,
    ))
}

/// Checks that `pem` is a single PEM certificate block with a base64 body.
pub fn validate_certificate_pem(pem: &str) -> Result<(), String> {
    let body = pem
        .trim()
        .strip_prefix(PEM_BEGIN)
        .and_then(|rest| rest.strip_suffix(PEM_END))
        .ok_or_else(|| "certificate is not a PEM CERTIFICATE block".to_string())?;

    let b64: String = body.split_whitespace().collect();
    if b64.is_empty() {
        return Err("certificate PEM has an empty body".to_string());
    }
    STANDARD
        .decode(b64.as_bytes())
        .map_err(|e| format!("certificate PEM body is not valid base64: {e}"))?;
    Ok(())
}
