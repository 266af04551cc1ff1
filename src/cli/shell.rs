use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::command::{Command, HELP};
use super::table::Table;
use crate::activity::{ActivityFeed, FeedScope, PageRequest};
use crate::error::{AppError, AppResult, FleetError};
use crate::fleet::{FleetService, Vehicle};
use crate::identity::{Actor, AuthContext, AuthPhase, AuthState, Identity, Profile};

/// What the line produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellOutput {
    Text(String),
    Exit,
}

/// Executes parsed commands against one auth context, feed and fleet service.
pub struct Shell {
    auth: Arc<AuthContext>,
    feed: ActivityFeed,
    fleet: FleetService,
    page_size: u32,
    settle_timeout: Duration,
}

fn short_time(t: &chrono::DateTime<chrono::Utc>) -> String { t.format("%Y-%m-%d %H:%M:%S").to_string() }

fn vehicle_table(vehicles: &[Vehicle], with_owner: bool) -> Table {
    let mut headers = vec!["id", "make", "model", "year", "type"];
    if with_owner {
        headers.push("owner");
    }
    let mut t = Table::new(&headers);
    for v in vehicles {
        let mut row = vec![v.id.to_string(), v.make.clone(), v.model.clone(), v.year.to_string(), v.vehicle_type.to_string()];
        if with_owner {
            row.push(v.user_id.to_string());
        }
        t.push_row(row);
    }
    t
}

fn profile_table(profiles: &[Profile]) -> Table {
    let mut t = Table::new(&["id", "name", "email", "role", "created"]);
    for p in profiles {
        t.push_row(vec![p.id.to_string(), p.name.clone(), p.email.clone(), p.role.to_string(), short_time(&p.created_at)]);
    }
    t
}

impl Shell {
    pub fn new(auth: Arc<AuthContext>, feed: ActivityFeed, fleet: FleetService, page_size: u32, settle_timeout: Duration) -> Self {
        Self { auth, feed, fleet, page_size, settle_timeout }
    }

    pub fn auth(&self) -> &Arc<AuthContext> { &self.auth }

    fn actor(&self) -> AppResult<Actor> {
        self.auth.actor().ok_or_else(|| AppError::from(FleetError::NotSignedIn))
    }

    /// Wait for the context to finish resolving `identity`.
    async fn settle_on(&self, identity: &Identity) -> Option<AuthState> {
        self.auth
            .wait_until(self.settle_timeout, |s| !s.is_loading() && s.identity() == Some(identity))
            .await
    }

    /// Parse and run one line. Errors come back as `code: message` text.
    pub async fn execute_line(&self, line: &str) -> ShellOutput {
        let result = match Command::parse(line) {
            Ok(Command::Quit) => return ShellOutput::Exit,
            Ok(cmd) => self.execute(cmd).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(text) => ShellOutput::Text(text),
            Err(e) => {
                debug!(target: "fleetwatch::cli", error = %e, "command failed");
                ShellOutput::Text(e.to_string())
            }
        }
    }

    pub async fn execute(&self, cmd: Command) -> AppResult<String> {
        match cmd {
            Command::Empty | Command::Quit => Ok(String::new()),
            Command::Help => Ok(HELP.to_string()),
            Command::SignUp { email, password, name, role } => {
                let id = self.auth.sign_up(&email, &password, &name, role).await?;
                let note = match self.settle_on(&id).await {
                    Some(_) => "signed in",
                    None => "sign-in still resolving",
                };
                Ok(format!("created {} account {} for {} ({})", role, id, email, note))
            }
            Command::Login { email, password } => {
                let id = self.auth.sign_in(&email, &password).await?;
                match self.settle_on(&id).await {
                    Some(state) => Ok(describe(&state)),
                    None => Ok(format!("signed in as {}; profile still loading", email)),
                }
            }
            Command::Logout => {
                self.auth.sign_out().await;
                Ok("signed out".to_string())
            }
            Command::WhoAmI => Ok(describe(&self.auth.state())),
            Command::Refresh => {
                let actor = self.actor()?;
                self.auth.refresh_session().await?;
                self.settle_on(&actor.identity).await;
                Ok("session refreshed".to_string())
            }
            Command::Feed { scope, page } => {
                let actor = self.actor()?;
                let scope = scope.unwrap_or_default();
                let request = PageRequest::new(page, self.page_size);
                let items = self.feed.list_page_annotated(actor.role, &actor.identity, scope, request).await?;
                let with_actor = actor.is_admin() && scope == FeedScope::Admin;
                let mut headers = vec!["time", "action", "details"];
                if with_actor {
                    headers.push("by");
                }
                let mut t = Table::new(&headers);
                for item in &items {
                    let mut row = vec![short_time(&item.entry.timestamp), item.entry.action.to_string(), item.entry.details.summary()];
                    if with_actor {
                        row.push(match &item.actor {
                            Some(a) => format!("{} <{}>", a.name, a.email),
                            None => item.entry.user_id.to_string(),
                        });
                    }
                    t.push_row(row);
                }
                Ok(format!("{}\npage {}", t.render(), page))
            }
            Command::Vehicles => {
                let actor = self.actor()?;
                let vehicles = self.fleet.list_vehicles(&actor).await?;
                Ok(vehicle_table(&vehicles, actor.is_admin()).render())
            }
            Command::AddVehicle(draft) => {
                let actor = self.actor()?;
                let v = self.fleet.add_vehicle(&actor, draft).await?;
                Ok(format!("added vehicle {}", v.id))
            }
            Command::EditVehicle { id, draft } => {
                let actor = self.actor()?;
                let v = self.fleet.update_vehicle(&actor, &id, draft).await?;
                Ok(format!("updated vehicle {}", v.id))
            }
            Command::RemoveVehicle(id) => {
                let actor = self.actor()?;
                let v = self.fleet.delete_vehicle(&actor, &id).await?;
                Ok(format!("deleted {} {} ({})", v.make, v.model, v.id))
            }
            Command::Users => {
                let actor = self.actor()?;
                let users = self.fleet.list_users(&actor).await?;
                Ok(profile_table(&users).render())
            }
            Command::EditUser { id, name, email } => {
                let actor = self.actor()?;
                let p = self.fleet.update_profile(&actor, &id, &name, &email).await?;
                if p.id == actor.identity {
                    self.auth.reload_profile().await;
                }
                Ok(format!("updated profile {}", p.id))
            }
            Command::SetRole { id, role } => {
                let actor = self.actor()?;
                let p = self.fleet.set_role(&actor, &id, role).await?;
                if p.id == actor.identity {
                    self.auth.reload_profile().await;
                }
                Ok(format!("{} is now {}", p.email, p.role))
            }
            Command::RemoveUser(id) => {
                let actor = self.actor()?;
                let p = self.fleet.delete_user(&actor, &id).await?;
                Ok(format!("deleted user {} <{}>", p.name, p.email))
            }
        }
    }
}

fn describe(state: &AuthState) -> String {
    match state.phase {
        AuthPhase::Uninitialized | AuthPhase::Loading => "loading".to_string(),
        AuthPhase::Anonymous => "not signed in".to_string(),
        AuthPhase::Authenticated => {
            let Some(actor) = state.actor() else { return "not signed in".to_string() };
            let mut t = Table::new(&["id", "name", "email", "role", "admin"]);
            t.push_row(vec![
                actor.identity.to_string(),
                actor.name.unwrap_or_else(|| "(profile unresolved)".to_string()),
                actor.email.unwrap_or_default(),
                actor.role.to_string(),
                state.is_admin().to_string(),
            ]);
            t.render()
        }
    }
}
