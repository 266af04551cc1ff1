//! Scripted collaborators for the integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Semaphore};

use fleetwatch::activity::{ActivityLogEntry, ActivityLogRepository, ActivityQuery, ActivityRecorder, NewActivity};
use fleetwatch::error::BackendError;
use fleetwatch::identity::{
    AuthContext, Identity, NewProfile, Profile, ProfileChanges, ProfileRepository, Role, Session, SessionChange,
    SessionChangeHub, SessionEvent, SessionStore, SignUpOutcome,
};
use fleetwatch::storage::MemoryBackend;

pub const WAIT: Duration = Duration::from_secs(5);

pub fn session_for(id: &str) -> Session {
    let now = Utc::now();
    Session {
        identity: Identity::new(id),
        email: format!("{}@x.com", id),
        access_token: format!("at-{}", id),
        refresh_token: Some(format!("rt-{}", id)),
        issued_at: now,
        expires_at: now + chrono::Duration::hours(1),
    }
}

pub fn identity_for_email(email: &str) -> Identity { Identity::new(format!("id-{}", email)) }

/// Poll `cond` until it holds or `WAIT` elapses.
pub async fn eventually<F: FnMut() -> bool>(mut cond: F) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}

/// Session store whose transitions are pushed by the test.
#[derive(Default)]
pub struct ScriptedStore {
    hub: SessionChangeHub,
    current: Mutex<Option<Session>>,
    pub fail_sign_up: AtomicBool,
    pub fail_sign_out: AtomicBool,
    pub fail_current: AtomicBool,
    pub sign_up_calls: AtomicUsize,
    pub sign_out_calls: AtomicUsize,
}

impl ScriptedStore {
    pub fn new() -> Arc<Self> { Arc::new(Self::default()) }

    /// Replace the held session and notify subscribers.
    pub fn push(&self, session: Option<Session>) {
        let event = if session.is_some() { SessionEvent::SignedIn } else { SessionEvent::SignedOut };
        *self.current.lock() = session.clone();
        self.hub.publish(SessionChange::new(event, session));
    }

    /// Set the held session without notifying anyone.
    pub fn hold(&self, session: Option<Session>) { *self.current.lock() = session; }
}

#[async_trait]
impl SessionStore for ScriptedStore {
    async fn current_session(&self) -> Result<Option<Session>, BackendError> {
        if self.fail_current.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("session storage offline".into()));
        }
        Ok(self.current.lock().clone())
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        if password == "wrong" {
            return Err(BackendError::InvalidCredentials);
        }
        let mut session = session_for(identity_for_email(email).as_str());
        session.email = email.to_string();
        self.push(Some(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, email: &str, _password: &str) -> Result<SignUpOutcome, BackendError> {
        self.sign_up_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_sign_up.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("auth service down".into()));
        }
        let mut session = session_for(identity_for_email(email).as_str());
        session.email = email.to_string();
        self.push(Some(session.clone()));
        Ok(SignUpOutcome { identity: session.identity.clone(), session: Some(session) })
    }

    /// A failing sign-out leaves the store's own state untouched.
    async fn sign_out(&self) -> Result<(), BackendError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_sign_out.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("logout endpoint unreachable".into()));
        }
        if self.current.lock().is_none() {
            return Err(BackendError::NoSession);
        }
        self.push(None);
        Ok(())
    }

    async fn refresh_session(&self) -> Result<Session, BackendError> {
        let held = self.current.lock().clone().ok_or(BackendError::NoSession)?;
        let session = Session { access_token: format!("{}-refreshed", held.access_token), ..held };
        *self.current.lock() = Some(session.clone());
        self.hub.publish(SessionChange::new(SessionEvent::TokenRefreshed, Some(session.clone())));
        Ok(session)
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<SessionChange> { self.hub.subscribe() }
}

/// Profile repository over `MemoryBackend` whose lookups can be held back per
/// identity, and whose inserts or lookups can be made to fail.
pub struct GatedProfiles {
    inner: MemoryBackend,
    gates: Mutex<HashMap<Identity, Arc<Semaphore>>>,
    failing_lookups: Mutex<HashSet<Identity>>,
    started: Mutex<Vec<Identity>>,
    pub fail_inserts: AtomicBool,
    pub insert_calls: AtomicUsize,
}

impl GatedProfiles {
    pub fn new(inner: MemoryBackend) -> Arc<Self> {
        Arc::new(Self {
            inner,
            gates: Mutex::new(HashMap::new()),
            failing_lookups: Mutex::new(HashSet::new()),
            started: Mutex::new(Vec::new()),
            fail_inserts: AtomicBool::new(false),
            insert_calls: AtomicUsize::new(0),
        })
    }

    /// Lookups for `id` block until `release(id)`.
    pub fn gate(&self, id: &Identity) { self.gates.lock().insert(id.clone(), Arc::new(Semaphore::new(0))); }

    /// Let every pending and future lookup for `id` through.
    pub fn release(&self, id: &Identity) {
        if let Some(gate) = self.gates.lock().remove(id) {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    pub fn fail_lookups_for(&self, id: &Identity) { self.failing_lookups.lock().insert(id.clone()); }

    pub fn lookups_started(&self, id: &Identity) -> usize { self.started.lock().iter().filter(|s| *s == id).count() }

    pub async fn seed(&self, id: &str, role: Role) -> Profile {
        let row = NewProfile { id: Identity::new(id), name: id.to_uppercase(), email: format!("{}@x.com", id), role };
        ProfileRepository::insert(&self.inner, row).await.unwrap()
    }
}

#[async_trait]
impl ProfileRepository for GatedProfiles {
    async fn get_by_id(&self, id: &Identity) -> Result<Option<Profile>, BackendError> {
        self.started.lock().push(id.clone());
        let gate = self.gates.lock().get(id).cloned();
        if let Some(gate) = gate {
            let _permit = gate.acquire().await.map_err(|_| BackendError::Unavailable("gate closed".into()))?;
        }
        if self.failing_lookups.lock().contains(id) {
            return Err(BackendError::Unavailable("profiles table offline".into()));
        }
        ProfileRepository::get_by_id(&self.inner, id).await
    }

    async fn insert(&self, profile: NewProfile) -> Result<Profile, BackendError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(BackendError::Rejected { status: 500, message: "insert failed".into() });
        }
        ProfileRepository::insert(&self.inner, profile).await
    }

    async fn update(&self, id: &Identity, changes: ProfileChanges) -> Result<Profile, BackendError> {
        ProfileRepository::update(&self.inner, id, changes).await
    }

    async fn delete(&self, id: &Identity) -> Result<(), BackendError> { ProfileRepository::delete(&self.inner, id).await }

    async fn list(&self) -> Result<Vec<Profile>, BackendError> { ProfileRepository::list(&self.inner).await }
}

/// Activity log that rejects every write.
pub struct FailingLog;

#[async_trait]
impl ActivityLogRepository for FailingLog {
    async fn insert(&self, _entry: NewActivity) -> Result<(), BackendError> {
        Err(BackendError::Rejected { status: 503, message: "activity_logs unavailable".into() })
    }

    async fn query(&self, _query: &ActivityQuery) -> Result<Vec<ActivityLogEntry>, BackendError> {
        Err(BackendError::Unavailable("activity_logs unavailable".into()))
    }
}

/// A context over a scripted store and gated profiles, logging into `db`.
pub struct Harness {
    pub db: MemoryBackend,
    pub store: Arc<ScriptedStore>,
    pub profiles: Arc<GatedProfiles>,
    pub auth: AuthContext,
}

impl Harness {
    pub fn new() -> Self {
        let db = MemoryBackend::new();
        let store = ScriptedStore::new();
        let profiles = GatedProfiles::new(db.clone());
        let recorder = ActivityRecorder::new(Arc::new(db.clone()));
        let auth = AuthContext::new(store.clone(), profiles.clone(), recorder);
        Self { db, store, profiles, auth }
    }

    pub fn with_log(log: Arc<dyn ActivityLogRepository>) -> Self {
        let db = MemoryBackend::new();
        let store = ScriptedStore::new();
        let profiles = GatedProfiles::new(db.clone());
        let auth = AuthContext::new(store.clone(), profiles.clone(), ActivityRecorder::new(log));
        Self { db, store, profiles, auth }
    }
}
