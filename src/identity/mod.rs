//! Identity and session management: who is signed in, their profile, and what
//! they may do. Keep the public surface thin and split implementation across
//! sub-modules.

mod actor;
mod authorizer;
mod context;
mod principal;
mod provider;
mod session;

pub use actor::Actor;
pub use authorizer::Capabilities;
pub use context::{AuthContext, AuthPhase, AuthState};
pub use principal::{Identity, NewProfile, Profile, ProfileChanges, ProfileId, Role};
pub use provider::{LocalSessionStore, ProfileRepository, SessionStore, SignUpOutcome};
pub use session::{Session, SessionChange, SessionChangeHub, SessionEvent, SessionManager, SessionToken};
