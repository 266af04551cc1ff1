use tracing::info;

use crate::error::BackendError;
use crate::identity::{Identity, LocalSessionStore, NewProfile, ProfileRepository, Role};

/// Bootstrap administrator for a fresh in-memory backend.
#[derive(Debug, Clone)]
pub struct AdminSeed {
    pub email: String,
    pub password: String,
    pub name: String,
}

impl Default for AdminSeed {
    fn default() -> Self {
        Self {
            email: "admin@fleetwatch.local".into(),
            password: "fleetwatch".into(),
            name: "Administrator".into(),
        }
    }
}

/// Register the credential and its admin profile without signing in, so no
/// session change is published and no activity is recorded.
pub async fn seed_admin(
    store: &LocalSessionStore,
    profiles: &dyn ProfileRepository,
    seed: &AdminSeed,
) -> Result<Identity, BackendError> {
    let identity = store.register(&seed.email, &seed.password)?;
    profiles
        .insert(NewProfile { id: identity.clone(), name: seed.name.clone(), email: seed.email.clone(), role: Role::Admin })
        .await?;
    info!(target: "fleetwatch::startup", email = %seed.email, "default admin seeded");
    Ok(identity)
}
