//! Ledger identities: enrollment, caching and resolution.
//!
//! A [`LedgerIdentity`] is what signs ledger proposals: an Ed25519 signing
//! key plus the certificate the membership service issued for its public
//! half. Identities are expensive to obtain (registration and enrollment
//! against the membership service) and long-lived, so
//! [`IdentityManager::resolve`] persists them in an on-disk
//! [`IdentityCache`] and reuses them on later runs.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, PoisonError};

use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::MembershipConfig;
use crate::types::Creator;

pub mod cache;
pub mod membership;

pub use cache::IdentityCache;
pub use membership::{HttpMembershipService, MembershipService, RegistrationRequest};

/// Key algorithm recorded for every identity this crate creates.
pub const KEY_ALGORITHM: &str = "Ed25519";

/// Errors raised while resolving a ledger identity.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Registration or enrollment against the membership service failed.
    #[error("membership service error: {0}")]
    Membership(String),

    /// A cache entry exists but cannot be decoded.
    #[error("identity cache entry is unreadable: {0}")]
    Serialization(String),

    #[error("identity cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid identity name {0:?}: only [A-Za-z0-9._-] is allowed")]
    InvalidName(String),

    /// A client identity was requested under the registrar's name.
    #[error("identity name {0:?} is reserved for the registrar")]
    ReservedName(String),
}

/// Role an identity holds within its organisation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Registrar; enrolled with bootstrap credentials.
    Admin,
    /// Regular principal; registered by the admin, then enrolled.
    Client,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Client => "client",
        }
    }
}

/// Enrollment credential for ledger access.
#[derive(Clone)]
pub struct LedgerIdentity {
    pub name: String,
    pub msp_id: String,
    pub roles: Vec<Role>,
    pub affiliation: String,
    pub certificate_pem: String,
    signing_key: SigningKey,
}

impl LedgerIdentity {
    pub fn new(
        name: impl Into<String>,
        msp_id: impl Into<String>,
        roles: Vec<Role>,
        affiliation: impl Into<String>,
        signing_key: SigningKey,
        certificate_pem: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            msp_id: msp_id.into(),
            roles,
            affiliation: affiliation.into(),
            certificate_pem: certificate_pem.into(),
            signing_key,
        }
    }

    pub fn algorithm(&self) -> &'static str {
        KEY_ALGORITHM
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Signs `message` and returns the raw 64-byte signature.
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing_key.sign(message).to_bytes().to_vec()
    }

    /// Creator record embedded in proposals signed by this identity.
    pub fn creator(&self) -> Creator {
        Creator {
            msp_id: self.msp_id.clone(),
            certificate_pem: self.certificate_pem.clone(),
        }
    }
}

impl PartialEq for LedgerIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.msp_id == other.msp_id
            && self.roles == other.roles
            && self.affiliation == other.affiliation
            && self.certificate_pem == other.certificate_pem
            && self.signing_key.to_bytes() == other.signing_key.to_bytes()
    }
}

impl Eq for LedgerIdentity {}

impl fmt::Debug for LedgerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerIdentity")
            .field("name", &self.name)
            .field("msp_id", &self.msp_id)
            .field("roles", &self.roles)
            .field("affiliation", &self.affiliation)
            .field("algorithm", &KEY_ALGORITHM)
            .field("signing_key", &"<redacted>")
            .finish()
    }
}

/// Names map one-to-one onto cache files, so they are restricted to a
/// filesystem-safe alphabet.
pub fn validate_name(name: &str) -> Result<(), IdentityError> {
    let ok = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if ok {
        Ok(())
    } else {
        Err(IdentityError::InvalidName(name.to_string()))
    }
}

/// Resolves ledger identities, enrolling them on first use.
///
/// Resolution of one name is serialized: concurrent callers asking for the
/// same name wait for the first one and then read its cache entry, so the
/// membership service sees exactly one registration.
pub struct IdentityManager {
    cache: IdentityCache,
    membership: Arc<dyn MembershipService>,
    cfg: MembershipConfig,
    locks: NameLocks,
}

type NameLocks = std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>;

/// Handle on one name's resolution lock. Dropping it forgets the name
/// once no other caller holds or awaits the lock, even when the resolving
/// future is dropped mid-flight.
struct NameLock<'a> {
    locks: &'a NameLocks,
    name: String,
    lock: Arc<Mutex<()>>,
}

impl Drop for NameLock<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Two references left: the map's and ours.
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.name);
        }
    }
}

impl IdentityManager {
    pub fn new(cfg: MembershipConfig, membership: Arc<dyn MembershipService>) -> Self {
        Self {
            cache: IdentityCache::new(&cfg.cache_dir),
            membership,
            cfg,
            locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn cache(&self) -> &IdentityCache {
        &self.cache
    }

    /// Returns the identity cached under `name`, creating it if absent.
    ///
    /// A corrupt cache entry is reported as
    /// [`IdentityError::Serialization`]; it is never silently replaced.
    pub async fn resolve(&self, name: &str, role: Role) -> Result<LedgerIdentity, IdentityError> {
        validate_name(name)?;
        match role {
            Role::Admin => self.resolve_admin(name).await,
            Role::Client => {
                if name == self.cfg.admin_name {
                    return Err(IdentityError::ReservedName(name.to_string()));
                }
                self.load_or_create(name, self.register_client(name)).await
            }
        }
    }

    async fn resolve_admin(&self, name: &str) -> Result<LedgerIdentity, IdentityError> {
        self.load_or_create(name, self.enroll_admin(name)).await
    }

    async fn load_or_create<F>(&self, name: &str, create: F) -> Result<LedgerIdentity, IdentityError>
    where
        F: Future<Output = Result<LedgerIdentity, IdentityError>>,
    {
        let entry = self.lock_for(name);
        let _guard = entry.lock.lock().await;
        match self.cache.load(name).await? {
            Some(identity) => {
                debug!(name, "ledger identity loaded from cache");
                Ok(identity)
            }
            None => {
                let identity = create.await?;
                self.cache.store(&identity).await?;
                info!(name, msp_id = %identity.msp_id, "ledger identity enrolled and cached");
                Ok(identity)
            }
        }
    }

    fn lock_for(&self, name: &str) -> NameLock<'_> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        let lock = locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        NameLock {
            locks: &self.locks,
            name: name.to_string(),
            lock,
        }
    }

    async fn enroll_admin(&self, name: &str) -> Result<LedgerIdentity, IdentityError> {
        let signing_key = SigningKey::generate(&mut rand::rngs::OsRng);
        let certificate_pem = self
            .membership
            .enroll(
                &self.cfg.admin_login,
                &self.cfg.admin_password,
                &signing_key.verifying_key(),
            )
            .await?;
        cache::validate_certificate_pem(&certificate_pem).map_err(IdentityError::Membership)?;

        Ok(LedgerIdentity::new(
            name,
            self.cfg.msp_id.clone(),
            vec![Role::Admin],
            self.cfg.affiliation.clone(),
            signing_key,
            certificate_pem,
        ))
    }

    async fn register_client(&self, name: &str) -> Result<LedgerIdentity, IdentityError> {
        let registrar = self.resolve_admin(&self.cfg.admin_name).await?;

        let request = RegistrationRequest {
            id: name.to_string(),
            affiliation: self.cfg.affiliation.clone(),
            kind: Role::Client.as_str().to_string(),
        };
        let secret = self.membership.register(&registrar, &request).await?;
        debug!(name, "ledger identity registered");

        let signing_key = SigningKey::generate(&mut rand::rngs::OsRng);
        let certificate_pem = self
            .membership
            .enroll(name, &secret, &signing_key.verifying_key())
            .await?;
        cache::validate_certificate_pem(&certificate_pem).map_err(IdentityError::Membership)?;

        Ok(LedgerIdentity::new(
            name,
            self.cfg.msp_id.clone(),
            vec![Role::Client],
            self.cfg.affiliation.clone(),
            signing_key,
            certificate_pem,
        ))
    }
}
