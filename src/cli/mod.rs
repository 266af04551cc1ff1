//! Interactive shell over the auth context, the activity feed and the fleet
//! service. Parsing and execution are plain library calls; the binary only
//! supplies the line editor.

mod command;
mod shell;
mod table;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

pub use command::{tokenize, Command, HELP};
pub use shell::{Shell, ShellOutput};
pub use table::Table;

use crate::activity::{ActivityFeed, ActivityLogRepository, ActivityRecorder};
use crate::config::{BackendMode, Config};
use crate::fleet::{FleetService, VehicleRepository};
use crate::identity::{AuthContext, LocalSessionStore, ProfileRepository, SessionStore};
use crate::remote::RestBackend;
use crate::storage::{seed_admin, AdminSeed, MemoryBackend};

/// The collaborators a shell runs against.
#[derive(Clone)]
pub struct Backends {
    pub store: Arc<dyn SessionStore>,
    pub profiles: Arc<dyn ProfileRepository>,
    pub activity: Arc<dyn ActivityLogRepository>,
    pub vehicles: Arc<dyn VehicleRepository>,
}

impl Backends {
    pub fn memory(store: Arc<LocalSessionStore>, db: MemoryBackend) -> Self {
        let db = Arc::new(db);
        Self { store, profiles: db.clone(), activity: db.clone(), vehicles: db }
    }

    pub fn remote(backend: RestBackend) -> Self {
        let backend = Arc::new(backend);
        Self { store: backend.clone(), profiles: backend.clone(), activity: backend.clone(), vehicles: backend }
    }
}

impl Shell {
    /// Build the core over `backends` and initialize the auth context.
    pub async fn start(backends: Backends, page_size: u32, settle_timeout: Duration) -> Self {
        let recorder = ActivityRecorder::new(backends.activity.clone());
        let auth = Arc::new(AuthContext::new(backends.store, backends.profiles.clone(), recorder.clone()));
        auth.initialize().await;
        let feed = ActivityFeed::new(backends.activity).with_profiles(backends.profiles.clone());
        let fleet = FleetService::new(backends.vehicles, backends.profiles, recorder);
        Shell::new(auth, feed, fleet, page_size, settle_timeout)
    }
}

/// Select and prepare the backend named by `cfg`, then start a shell over it.
pub async fn shell_from_config(cfg: &Config) -> Result<Shell> {
    let backends = match (cfg.backend_mode(), &cfg.backend_url, &cfg.anon_key) {
        (BackendMode::Remote, Some(url), Some(key)) => {
            let backend = RestBackend::new(url, key).context("configuring hosted backend")?;
            info!(target: "fleetwatch::startup", url = %backend.base_url(), "using hosted backend");
            Backends::remote(backend)
        }
        _ => {
            let store = Arc::new(LocalSessionStore::default());
            let db = MemoryBackend::new();
            if cfg.seed_admin {
                seed_admin(&store, &db, &AdminSeed::default()).await.context("seeding default admin")?;
            }
            info!(target: "fleetwatch::startup", seeded_admin = cfg.seed_admin, "using in-memory backend");
            Backends::memory(store, db)
        }
    };
    Ok(Shell::start(backends, cfg.page_size, Duration::from_millis(cfg.settle_timeout_ms)).await)
}
