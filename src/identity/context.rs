//! Process-wide "who is signed in and what may they do" view.
//!
//! The session store publishes transitions on a channel. A single consumer task
//! takes them in arrival order and stamps each with the next generation number
//! before starting the profile resolution for it. Resolutions run concurrently;
//! one is applied only if its generation is still the latest, so a slow, older
//! resolution can never overwrite the state of a newer notification. Local
//! mutations (sign-out, reload) take a generation too, which discards anything
//! still in flight. Sign-in adopts its session at once, and sign-out revokes the
//! held token so a notification still queued for it is skipped.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::actor::Actor;
use super::authorizer::Capabilities;
use super::principal::{Identity, NewProfile, Profile, ProfileId, Role};
use super::provider::{ProfileRepository, SessionStore};
use super::session::{Session, SessionChange, SessionToken};
use crate::activity::{ActivityRecorder, NewActivity};
use crate::error::{AuthError, AuthResult, SignUpError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthPhase {
    #[default]
    Uninitialized,
    Loading,
    Anonymous,
    Authenticated,
}

#[derive(Debug, Clone, Default)]
pub struct AuthState {
    pub phase: AuthPhase,
    pub session: Option<Session>,
    /// `None` while authenticated means the profile could not be resolved yet.
    pub profile: Option<Profile>,
    pub capabilities: Capabilities,
    pub generation: u64,
}

impl AuthState {
    pub fn is_loading(&self) -> bool {
        matches!(self.phase, AuthPhase::Uninitialized | AuthPhase::Loading)
    }

    pub fn is_authenticated(&self) -> bool { self.phase == AuthPhase::Authenticated }

    pub fn is_admin(&self) -> bool { self.capabilities.is_admin }

    pub fn identity(&self) -> Option<&Identity> { self.session.as_ref().map(|s| &s.identity) }

    /// Role falls back to `user` while the profile is unresolved.
    pub fn actor(&self) -> Option<Actor> {
        let session = self.session.as_ref()?;
        let mut actor = Actor::new(session.identity.clone(), self.profile.as_ref().map(|p| p.role).unwrap_or_default());
        actor.name = self.profile.as_ref().map(|p| p.name.clone());
        actor.email = Some(self.profile.as_ref().map(|p| p.email.clone()).unwrap_or_else(|| session.email.clone()));
        Some(actor)
    }
}

#[derive(Debug)]
pub(crate) enum Resolution {
    Anonymous,
    Resolved { session: Session, profile: Profile },
    Unresolved { session: Session },
}

pub(crate) struct Shared {
    latest: Mutex<u64>,
    state: watch::Sender<AuthState>,
    discarded: AtomicU64,
    revoked: Mutex<HashSet<SessionToken>>,
}

impl Shared {
    pub(crate) fn new() -> Self {
        let (state, _) = watch::channel(AuthState::default());
        Self { latest: Mutex::new(0), state, discarded: AtomicU64::new(0), revoked: Mutex::new(HashSet::new()) }
    }

    /// Enter `Loading` for a new transition and return its generation.
    pub(crate) fn begin(&self, session: Option<Session>) -> u64 {
        let mut latest = self.latest.lock();
        self.begin_locked(&mut latest, session)
    }

    /// Hold a session returned by a local sign-in before its notification
    /// arrives. No-op when that identity is already held.
    pub(crate) fn adopt(&self, session: Session) -> Option<u64> {
        let mut latest = self.latest.lock();
        self.revoked.lock().remove(&session.access_token);
        if self.state.borrow().identity() == Some(&session.identity) {
            return None;
        }
        Some(self.begin_locked(&mut latest, Some(session)))
    }

    fn begin_locked(&self, latest: &mut u64, session: Option<Session>) -> u64 {
        *latest += 1;
        let generation = *latest;
        self.state.send_modify(|s| {
            let same_identity = match (s.identity(), session.as_ref()) {
                (Some(held), Some(next)) => held == &next.identity,
                _ => false,
            };
            if !same_identity {
                s.profile = None;
                s.capabilities = Capabilities::default();
            }
            s.phase = AuthPhase::Loading;
            s.session = session;
            s.generation = generation;
        });
        generation
    }

    /// Apply a resolution if no newer transition began since `generation`.
    pub(crate) fn apply(&self, generation: u64, resolution: Resolution) -> bool {
        let latest = self.latest.lock();
        if *latest != generation {
            self.discarded.fetch_add(1, Ordering::Relaxed);
            debug!(target: "fleetwatch::auth", generation, latest = *latest, "stale resolution discarded");
            return false;
        }
        self.state.send_modify(|s| match resolution {
            Resolution::Anonymous => {
                s.phase = AuthPhase::Anonymous;
                s.session = None;
                s.profile = None;
                s.capabilities = Capabilities::default();
            }
            Resolution::Resolved { session, profile } => {
                s.phase = AuthPhase::Authenticated;
                s.session = Some(session);
                s.capabilities = Capabilities::from_profile(Some(&profile));
                s.profile = Some(profile);
            }
            Resolution::Unresolved { session } => {
                s.phase = AuthPhase::Authenticated;
                s.session = Some(session);
                s.profile = None;
                s.capabilities = Capabilities::default();
            }
        });
        true
    }

    /// Drop every piece of local identity state. The held access token is
    /// revoked so late notifications carrying it are ignored.
    pub(crate) fn clear(&self) {
        let mut latest = self.latest.lock();
        let held = self.state.borrow().session.as_ref().map(|s| s.access_token.clone());
        if let Some(token) = held {
            self.revoked.lock().insert(token);
        }
        *latest += 1;
        let generation = *latest;
        self.state.send_modify(|s| {
            *s = AuthState { phase: AuthPhase::Anonymous, generation, ..AuthState::default() };
        });
    }

    pub(crate) fn snapshot(&self) -> AuthState { self.state.borrow().clone() }

    pub(crate) fn is_revoked(&self, session: &Session) -> bool { self.revoked.lock().contains(&session.access_token) }

    pub(crate) fn discarded(&self) -> u64 { self.discarded.load(Ordering::Relaxed) }
}

async fn resolve(
    shared: Arc<Shared>,
    profiles: Arc<dyn ProfileRepository>,
    generation: u64,
    session: Option<Session>,
) -> bool {
    let resolution = match session {
        None => Resolution::Anonymous,
        Some(session) => match profiles.get_by_id(&session.identity).await {
            Ok(Some(profile)) => Resolution::Resolved { session, profile },
            Ok(None) => {
                warn!(target: "fleetwatch::operator", user = %session.identity, "session has no profile row");
                Resolution::Unresolved { session }
            }
            Err(e) => {
                error!(target: "fleetwatch::operator", user = %session.identity, error = %e, "profile resolution failed");
                Resolution::Unresolved { session }
            }
        },
    };
    shared.apply(generation, resolution)
}

async fn consume_changes(
    shared: Arc<Shared>,
    profiles: Arc<dyn ProfileRepository>,
    mut rx: mpsc::UnboundedReceiver<SessionChange>,
) {
    while let Some(change) = rx.recv().await {
        if change.session.as_ref().is_some_and(|s| shared.is_revoked(s)) {
            debug!(target: "fleetwatch::auth", event = ?change.event, "notification for a signed-out session skipped");
            continue;
        }
        let generation = shared.begin(change.session.clone());
        debug!(target: "fleetwatch::auth", event = ?change.event, generation, "session change");
        match change.session {
            None => {
                shared.apply(generation, Resolution::Anonymous);
            }
            session @ Some(_) => {
                tokio::spawn(resolve(shared.clone(), profiles.clone(), generation, session));
            }
        }
    }
    debug!(target: "fleetwatch::auth", "session change stream closed");
}

pub struct AuthContext {
    shared: Arc<Shared>,
    store: Arc<dyn SessionStore>,
    profiles: Arc<dyn ProfileRepository>,
    recorder: ActivityRecorder,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl AuthContext {
    pub fn new(store: Arc<dyn SessionStore>, profiles: Arc<dyn ProfileRepository>, recorder: ActivityRecorder) -> Self {
        Self { shared: Arc::new(Shared::new()), store, profiles, recorder, consumer: Mutex::new(None) }
    }

    /// Subscribe to the store, then resolve whatever session it already holds.
    /// Returns once that first resolution has completed (or was superseded).
    pub async fn initialize(&self) {
        {
            let mut consumer = self.consumer.lock();
            if consumer.is_some() {
                warn!(target: "fleetwatch::auth", "auth context already initialized");
                return;
            }
            let rx = self.store.subscribe();
            *consumer = Some(tokio::spawn(consume_changes(self.shared.clone(), self.profiles.clone(), rx)));
        }
        let generation = self.shared.begin(None);
        let session = match self.store.current_session().await {
            Ok(s) => s,
            Err(e) => {
                error!(target: "fleetwatch::operator", error = %e, "could not read the current session");
                None
            }
        };
        resolve(self.shared.clone(), self.profiles.clone(), generation, session).await;
        info!(target: "fleetwatch::auth", phase = ?self.shared.snapshot().phase, "auth context initialized");
    }

    pub fn state(&self) -> AuthState { self.shared.snapshot() }

    pub fn subscribe(&self) -> watch::Receiver<AuthState> { self.shared.state.subscribe() }

    pub fn is_loading(&self) -> bool { self.shared.snapshot().is_loading() }

    pub fn is_admin(&self) -> bool { self.shared.snapshot().is_admin() }

    pub fn actor(&self) -> Option<Actor> { self.shared.snapshot().actor() }

    /// Stale resolutions dropped because a newer transition arrived first.
    pub fn discarded_resolutions(&self) -> u64 { self.shared.discarded() }

    /// Wait until `predicate` holds for the published state, or the timeout elapses.
    pub async fn wait_until<F>(&self, timeout: Duration, mut predicate: F) -> Option<AuthState>
    where
        F: FnMut(&AuthState) -> bool,
    {
        let mut rx = self.subscribe();
        let found = match tokio::time::timeout(timeout, rx.wait_for(|s| predicate(s))).await {
            Ok(Ok(state)) => Some(state.clone()),
            _ => None,
        };
        found
    }

    pub async fn settled(&self, timeout: Duration) -> Option<AuthState> {
        self.wait_until(timeout, |s| !s.is_loading()).await
    }

    /// Check credentials and record the LOGIN event. The session is held at
    /// once and its profile resolves in the background.
    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<Identity> {
        let session = self.store.sign_in_with_password(email, password).await.map_err(|e| {
            info!(target: "fleetwatch::auth", error = %e, "sign-in rejected");
            AuthError::Credential(e)
        })?;
        let identity = session.identity.clone();
        self.adopt(session);
        let role = match self.profiles.get_by_id(&identity).await {
            Ok(p) => p.map(|p| p.role),
            Err(e) => {
                warn!(target: "fleetwatch::operator", user = %identity, error = %e, "profile lookup for login audit failed");
                None
            }
        };
        self.recorder.record(NewActivity::login(identity.clone(), role, email)).await;
        Ok(identity)
    }

    /// Credential, then profile, then SIGNUP event. Not atomic: the error says
    /// which step failed so the profile step can be retried alone.
    pub async fn sign_up(&self, email: &str, password: &str, name: &str, role: Role) -> Result<ProfileId, SignUpError> {
        let outcome = self.store.sign_up(email, password).await.map_err(SignUpError::Credential)?;
        if let Some(session) = outcome.session {
            self.adopt(session);
        }
        self.complete_profile(outcome.identity, email, name, role).await
    }

    /// Profile insert and SIGNUP event for an identity whose credential exists.
    pub async fn complete_profile(&self, identity: Identity, email: &str, name: &str, role: Role) -> Result<ProfileId, SignUpError> {
        let row = NewProfile { id: identity.clone(), name: name.to_string(), email: email.to_string(), role };
        let profile = match self.profiles.insert(row).await {
            Ok(p) => p,
            Err(source) => {
                error!(target: "fleetwatch::operator", user = %identity, error = %source, "profile insert failed after credential creation");
                return Err(SignUpError::Profile { identity, source });
            }
        };
        self.recorder.record(NewActivity::signup(identity.clone(), role, email, name)).await;
        // The sign-in notification may have been resolved before the row existed.
        if self.state().identity() == Some(&identity) {
            self.reload_profile().await;
        }
        Ok(profile.id)
    }

    fn adopt(&self, session: Session) {
        if let Some(generation) = self.shared.adopt(session.clone()) {
            tokio::spawn(resolve(self.shared.clone(), self.profiles.clone(), generation, Some(session)));
        }
    }

    /// Re-resolve the held session's profile under a fresh generation.
    pub async fn reload_profile(&self) -> bool {
        let session = self.shared.snapshot().session;
        let generation = self.shared.begin(session.clone());
        resolve(self.shared.clone(), self.profiles.clone(), generation, session).await
    }

    /// Ask the store for a new token; the resulting notification re-resolves the profile.
    pub async fn refresh_session(&self) -> AuthResult<()> {
        if self.shared.snapshot().session.is_none() {
            return Err(AuthError::NotSignedIn);
        }
        self.store.refresh_session().await.map(|_| ()).map_err(AuthError::Credential)
    }

    /// Record SIGNOUT, invalidate the remote token, then clear local state no
    /// matter how the first two steps went.
    pub async fn sign_out(&self) {
        let state = self.shared.snapshot();
        let Some(identity) = state.identity().cloned() else {
            error!(target: "fleetwatch::operator", "sign-out requested while no identity is signed in");
            return;
        };
        let role = state.profile.as_ref().map(|p| p.role);
        let name = state.profile.as_ref().map(|p| p.name.clone());
        self.recorder.record(NewActivity::signout(identity.clone(), role, name.as_deref())).await;
        if let Err(e) = self.store.sign_out().await {
            error!(target: "fleetwatch::operator", user = %identity, error = %e, "remote sign-out failed; clearing local state");
        }
        self.shared.clear();
        info!(target: "fleetwatch::auth", user = %identity, "signed out");
    }
}

impl Drop for AuthContext {
    fn drop(&mut self) {
        if let Some(handle) = self.consumer.get_mut().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
