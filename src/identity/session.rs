use std::collections::{HashMap, HashSet};
use std::fmt;

use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, error};

use super::principal::Identity;
use crate::error::BackendError;

pub type SessionToken = String;

#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub identity: Identity,
    pub email: String,
    pub access_token: SessionToken,
    pub refresh_token: Option<SessionToken>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool { self.expires_at <= now }
}

// Tokens stay out of logs.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("identity", &self.identity)
            .field("email", &self.email)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

/// One state transition of a session store: the event and the session after it.
#[derive(Debug, Clone)]
pub struct SessionChange {
    pub event: SessionEvent,
    pub session: Option<Session>,
}

impl SessionChange {
    pub fn new(event: SessionEvent, session: Option<Session>) -> Self { Self { event, session } }
    pub fn signed_out() -> Self { Self { event: SessionEvent::SignedOut, session: None } }
}

/// Fan-out of session changes to every live subscriber, in publish order.
#[derive(Default)]
pub struct SessionChangeHub {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<SessionChange>>>,
}

impl SessionChangeHub {
    pub fn new() -> Self { Self::default() }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SessionChange> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Returns how many subscribers received the change.
    pub fn publish(&self, change: SessionChange) -> usize {
        let mut subs = self.subscribers.lock();
        subs.retain(|tx| tx.send(change.clone()).is_ok());
        debug!(target: "fleetwatch::auth", event = ?change.event, subscribers = subs.len(), "session change published");
        subs.len()
    }

    pub fn subscriber_count(&self) -> usize {
        let mut subs = self.subscribers.lock();
        subs.retain(|tx| !tx.is_closed());
        subs.len()
    }
}

pub(crate) fn gen_token() -> Result<SessionToken, BackendError> {
    // 256-bit random token base64url without padding
    let mut buf = [0u8; 32];
    getrandom::getrandom(&mut buf).map_err(|e| {
        error!(target: "fleetwatch::operator", error = %e, "system randomness unavailable; no token issued");
        BackendError::Unavailable(format!("token generation failed: {}", e))
    })?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
}

/// Issues, validates, refreshes and revokes bearer tokens for the in-process store.
pub struct SessionManager {
    pub ttl: Duration,
    by_access: RwLock<HashMap<SessionToken, Session>>,
    by_refresh: RwLock<HashMap<SessionToken, SessionToken>>,
    revoked: RwLock<HashSet<SessionToken>>,
}

impl Default for SessionManager {
    fn default() -> Self { Self::with_ttl(Duration::hours(1)) }
}

impl SessionManager {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            by_access: RwLock::new(HashMap::new()),
            by_refresh: RwLock::new(HashMap::new()),
            revoked: RwLock::new(HashSet::new()),
        }
    }

    pub fn issue(&self, identity: Identity, email: &str) -> Result<Session, BackendError> {
        let now = Utc::now();
        let sess = Session {
            identity: identity.clone(),
            email: email.to_string(),
            access_token: gen_token()?,
            refresh_token: Some(gen_token()?),
            issued_at: now,
            expires_at: now + self.ttl,
        };
        self.by_access.write().insert(sess.access_token.clone(), sess.clone());
        if let Some(rt) = &sess.refresh_token {
            self.by_refresh.write().insert(rt.clone(), sess.access_token.clone());
        }
        debug!(target: "fleetwatch::auth", user = %identity, ttl_secs = self.ttl.num_seconds(), "session issued");
        Ok(sess)
    }

    pub fn validate(&self, token: &str) -> Option<Session> {
        if self.revoked.read().contains(token) { return None; }
        let now = Utc::now();
        let found = self.by_access.read().get(token).cloned();
        match found {
            Some(sess) if !sess.is_expired_at(now) => Some(sess),
            Some(_) => {
                self.by_access.write().remove(token);
                None
            }
            None => None,
        }
    }

    /// Trade a refresh token for a new session; the old access token is revoked.
    /// Unknown or spent refresh tokens give `NoSession`.
    pub fn refresh(&self, refresh_token: &str) -> Result<Session, BackendError> {
        let access = self.by_refresh.write().remove(refresh_token).ok_or(BackendError::NoSession)?;
        let old = self.by_access.read().get(&access).cloned().ok_or(BackendError::NoSession)?;
        self.logout(&access);
        self.issue(old.identity, &old.email)
    }

    pub fn logout(&self, token: &str) -> bool {
        let Some(sess) = self.by_access.write().remove(token) else { return false; };
        if let Some(rt) = &sess.refresh_token {
            self.by_refresh.write().remove(rt);
        }
        self.revoked.write().insert(token.to_string());
        true
    }
}
