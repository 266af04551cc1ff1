use std::collections::HashMap;

use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use async_trait::async_trait;
use parking_lot::RwLock;
use password_hash::{PasswordHash, SaltString};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::principal::{Identity, NewProfile, Profile, ProfileChanges};
use super::session::{Session, SessionChange, SessionChangeHub, SessionEvent, SessionManager};
use crate::error::BackendError;

const MIN_PASSWORD_LEN: usize = 6;

/// Result of creating a credential record.
#[derive(Debug, Clone)]
pub struct SignUpOutcome {
    pub identity: Identity,
    /// Present when the store signed the new identity in straight away.
    pub session: Option<Session>,
}

/// Credential checks, token issuance and session persistence.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn current_session(&self) -> Result<Option<Session>, BackendError>;
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError>;
    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, BackendError>;
    async fn sign_out(&self) -> Result<(), BackendError>;
    async fn refresh_session(&self) -> Result<Session, BackendError>;
    /// Every state transition after this call is delivered, in order, exactly once per transition.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<SessionChange>;
}

/// The `profiles` table.
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn get_by_id(&self, id: &Identity) -> Result<Option<Profile>, BackendError>;
    async fn insert(&self, profile: NewProfile) -> Result<Profile, BackendError>;
    async fn update(&self, id: &Identity, changes: ProfileChanges) -> Result<Profile, BackendError>;
    async fn delete(&self, id: &Identity) -> Result<(), BackendError>;
    /// Newest first.
    async fn list(&self) -> Result<Vec<Profile>, BackendError>;
}

pub(crate) fn hash_password(password: &str) -> Result<String, BackendError> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|e| BackendError::Unavailable(e.to_string()))?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| BackendError::Unavailable(e.to_string()))?;
    let argon2 = Argon2::default();
    let phc = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| BackendError::Unavailable(e.to_string()))?
        .to_string();
    Ok(phc)
}

pub(crate) fn verify_password(hash: &str, password: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(hash) {
        Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok()
    } else { false }
}

#[derive(Debug, Clone)]
struct Credential {
    identity: Identity,
    email: String,
    password_hash: String,
}

/// In-process session store: a credential table with Argon2 hashes, a token
/// manager, and the single "current session" a client holds.
pub struct LocalSessionStore {
    credentials: RwLock<HashMap<String, Credential>>,
    sessions: SessionManager,
    current: RwLock<Option<Session>>,
    hub: SessionChangeHub,
}

impl Default for LocalSessionStore {
    fn default() -> Self { Self::new(SessionManager::default()) }
}

impl LocalSessionStore {
    pub fn new(sessions: SessionManager) -> Self {
        Self {
            credentials: RwLock::new(HashMap::new()),
            sessions,
            current: RwLock::new(None),
            hub: SessionChangeHub::new(),
        }
    }

    fn key(email: &str) -> String { email.trim().to_ascii_lowercase() }

    /// Register a credential without signing it in. Used for seeding.
    pub fn register(&self, email: &str, password: &str) -> Result<Identity, BackendError> {
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(BackendError::Rejected {
                status: 422,
                message: format!("password must be at least {} characters", MIN_PASSWORD_LEN),
            });
        }
        let key = Self::key(email);
        if key.is_empty() || !key.contains('@') {
            return Err(BackendError::Rejected { status: 422, message: "a valid email is required".into() });
        }
        let password_hash = hash_password(password)?;
        let mut creds = self.credentials.write();
        if creds.contains_key(&key) {
            return Err(BackendError::AlreadyExists(format!("user {}", key)));
        }
        let identity = Identity::new(uuid::Uuid::new_v4().to_string());
        creds.insert(key.clone(), Credential { identity: identity.clone(), email: key, password_hash });
        Ok(identity)
    }

    fn set_current(&self, event: SessionEvent, session: Option<Session>) {
        *self.current.write() = session.clone();
        self.hub.publish(SessionChange::new(event, session));
    }
}

#[async_trait]
impl SessionStore for LocalSessionStore {
    async fn current_session(&self) -> Result<Option<Session>, BackendError> {
        let held = self.current.read().clone();
        Ok(held.and_then(|s| self.sessions.validate(&s.access_token)))
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        let cred = self.credentials.read().get(&Self::key(email)).cloned();
        let Some(cred) = cred else { return Err(BackendError::InvalidCredentials); };
        if !verify_password(&cred.password_hash, password) {
            return Err(BackendError::InvalidCredentials);
        }
        let session = self.sessions.issue(cred.identity.clone(), &cred.email)?;
        info!(target: "fleetwatch::auth", user = %cred.identity, "signed in");
        self.set_current(SessionEvent::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, BackendError> {
        let identity = self.register(email, password)?;
        let session = self.sessions.issue(identity.clone(), &Self::key(email))?;
        debug!(target: "fleetwatch::auth", user = %identity, "credential created");
        self.set_current(SessionEvent::SignedIn, Some(session.clone()));
        Ok(SignUpOutcome { identity, session: Some(session) })
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        let held = self.current.read().clone();
        let Some(session) = held else { return Err(BackendError::NoSession); };
        self.sessions.logout(&session.access_token);
        self.set_current(SessionEvent::SignedOut, None);
        Ok(())
    }

    async fn refresh_session(&self) -> Result<Session, BackendError> {
        let held = self.current.read().clone();
        let Some(rt) = held.and_then(|s| s.refresh_token) else { return Err(BackendError::NoSession); };
        let session = self.sessions.refresh(&rt)?;
        self.set_current(SessionEvent::TokenRefreshed, Some(session.clone()));
        Ok(session)
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<SessionChange> { self.hub.subscribe() }
}
