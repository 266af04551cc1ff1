//! Role-scoped, newest-first, offset-paginated view over the activity log.
//!
//! Scoping is decided while the repository query is built: a non-admin viewer
//! can only ever produce a query filtered to their own identity, whatever scope
//! they ask for. Admins choose between the full feed and their own entries.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use super::entry::{ActivityLogEntry, ActivityQuery};
use super::ActivityLogRepository;
use crate::error::FeedError;
use crate::identity::{Capabilities, Identity, ProfileRepository, Role};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FeedScope {
    /// Every actor's entries (admins only).
    #[default]
    Admin,
    /// The viewer's own entries.
    User,
}

impl FromStr for FeedScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" | "all" => Ok(FeedScope::Admin),
            "user" | "mine" | "self" => Ok(FeedScope::User),
            other => Err(format!("unknown feed scope '{}' (expected admin or user)", other)),
        }
    }
}

/// 1-indexed page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32) -> Self { Self { page, page_size } }

    pub fn first(page_size: u32) -> Self { Self::new(1, page_size) }

    pub fn next(&self) -> Self { Self::new(self.page.saturating_add(1), self.page_size) }

    /// Index of the first row of this page.
    pub fn offset(&self) -> Result<usize, FeedError> {
        let invalid = FeedError::InvalidPage { page: self.page, page_size: self.page_size };
        if self.page == 0 || self.page_size == 0 { return Err(invalid); }
        (self.page as usize - 1).checked_mul(self.page_size as usize).ok_or(invalid)
    }
}

/// `None` means unfiltered. Anything but an admin asking for the admin scope is self-scoped.
pub fn effective_user_filter(actor_role: Role, viewer: &Identity, scope: FeedScope) -> Option<Identity> {
    let unrestricted = Capabilities::for_role(actor_role).can_view_all_activity();
    match scope {
        FeedScope::Admin if unrestricted => None,
        _ => Some(viewer.clone()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActorSummary {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedItem {
    pub entry: ActivityLogEntry,
    /// Only attached for admin viewers.
    pub actor: Option<ActorSummary>,
}

#[derive(Clone)]
pub struct ActivityFeed {
    log: Arc<dyn ActivityLogRepository>,
    profiles: Option<Arc<dyn ProfileRepository>>,
}

impl ActivityFeed {
    pub fn new(log: Arc<dyn ActivityLogRepository>) -> Self { Self { log, profiles: None } }

    pub fn with_profiles(mut self, profiles: Arc<dyn ProfileRepository>) -> Self {
        self.profiles = Some(profiles);
        self
    }

    pub fn query_for(actor_role: Role, viewer: &Identity, scope: FeedScope, page: PageRequest) -> Result<ActivityQuery, FeedError> {
        Ok(ActivityQuery {
            offset: page.offset()?,
            limit: page.page_size as usize,
            user_id: effective_user_filter(actor_role, viewer, scope),
        })
    }

    /// A page past the end is empty, not an error.
    pub async fn list_page(
        &self,
        actor_role: Role,
        viewer: &Identity,
        scope: FeedScope,
        page: PageRequest,
    ) -> Result<Vec<ActivityLogEntry>, FeedError> {
        let query = Self::query_for(actor_role, viewer, scope, page)?;
        let mut entries = self.log.query(&query).await?;
        entries.truncate(query.limit);
        if let Some(uid) = &query.user_id {
            let before = entries.len();
            entries.retain(|e| &e.user_id == uid);
            if entries.len() != before {
                warn!(target: "fleetwatch::operator", dropped = before - entries.len(), "activity log returned rows outside the requested user filter");
            }
        }
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        debug!(
            target: "fleetwatch::activity",
            role = %actor_role, scope = ?scope, page = page.page, page_size = page.page_size, rows = entries.len(),
            "feed page listed"
        );
        Ok(entries)
    }

    /// Same page as `list_page`; admin viewers also get each actor's name and email.
    pub async fn list_page_annotated(
        &self,
        actor_role: Role,
        viewer: &Identity,
        scope: FeedScope,
        page: PageRequest,
    ) -> Result<Vec<FeedItem>, FeedError> {
        let entries = self.list_page(actor_role, viewer, scope, page).await?;
        let profiles = match (&self.profiles, actor_role) {
            (Some(p), Role::Admin) => p.clone(),
            _ => return Ok(entries.into_iter().map(|entry| FeedItem { entry, actor: None }).collect()),
        };

        let mut actors: HashMap<Identity, Option<ActorSummary>> = HashMap::new();
        for e in entries.iter() {
            if actors.contains_key(&e.user_id) { continue; }
            let summary = match profiles.get_by_id(&e.user_id).await {
                Ok(Some(p)) => Some(ActorSummary { name: p.name, email: p.email }),
                Ok(None) => None,
                Err(err) => {
                    warn!(target: "fleetwatch::operator", user = %e.user_id, error = %err, "actor lookup failed");
                    None
                }
            };
            actors.insert(e.user_id.clone(), summary);
        }
        Ok(entries
            .into_iter()
            .map(|entry| {
                let actor = actors.get(&entry.user_id).cloned().flatten();
                FeedItem { entry, actor }
            })
            .collect())
    }
}

#[cfg(test)]
#[path = "feed_tests.rs"]
mod tests;
