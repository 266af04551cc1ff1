use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

use crate::identity::{Identity, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActivityAction {
    Login,
    Signup,
    Signout,
    Add,
    Update,
    Delete,
}

impl ActivityAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityAction::Login => "LOGIN",
            ActivityAction::Signup => "SIGNUP",
            ActivityAction::Signout => "SIGNOUT",
            ActivityAction::Add => "ADD",
            ActivityAction::Update => "UPDATE",
            ActivityAction::Delete => "DELETE",
        }
    }
}

impl fmt::Display for ActivityAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Free-form payload describing the affected entity. Always carries `entity`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivityDetails(Map<String, Value>);

impl ActivityDetails {
    pub fn entity<S: Into<String>>(entity: S) -> Self {
        let mut m = Map::new();
        m.insert("entity".into(), Value::String(entity.into()));
        Self(m)
    }

    pub fn with<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> { self.0.get(key) }

    pub fn get_str(&self, key: &str) -> Option<&str> { self.0.get(key).and_then(|v| v.as_str()) }

    pub fn entity_name(&self) -> Option<&str> { self.get_str("entity") }

    /// One-line `key=value` rendering, `entity` first.
    pub fn summary(&self) -> String {
        let mut parts: Vec<String> = Vec::with_capacity(self.0.len());
        if let Some(e) = self.entity_name() { parts.push(e.to_string()); }
        for (k, v) in self.0.iter().filter(|(k, _)| k.as_str() != "entity") {
            let rendered = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            parts.push(format!("{}={}", k, rendered));
        }
        parts.join(" ")
    }
}

/// An event to append. The timestamp is the event time, captured when the
/// event is built rather than when the row is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewActivity {
    pub action: ActivityAction,
    pub timestamp: DateTime<Utc>,
    pub details: ActivityDetails,
    pub user_id: Identity,
}

fn role_entity(role: Role) -> &'static str {
    match role {
        Role::Admin => "Admin",
        Role::User => "User",
    }
}

impl NewActivity {
    pub fn new(action: ActivityAction, user_id: Identity, details: ActivityDetails) -> Self {
        Self { action, timestamp: Utc::now(), details, user_id }
    }

    /// Override the event time.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// `role` is the actor's role if the profile could be read.
    pub fn login(user_id: Identity, role: Option<Role>, email: &str) -> Self {
        let entity = role_entity(role.unwrap_or_default());
        Self::new(ActivityAction::Login, user_id, ActivityDetails::entity(entity).with("email", email))
    }

    pub fn signup(user_id: Identity, role: Role, email: &str, name: &str) -> Self {
        Self::new(
            ActivityAction::Signup,
            user_id,
            ActivityDetails::entity(role.as_str()).with("email", email).with("name", name),
        )
    }

    pub fn signout(user_id: Identity, role: Option<Role>, name: Option<&str>) -> Self {
        let entity = role.map(|r| r.as_str()).unwrap_or("Unknown");
        Self::new(
            ActivityAction::Signout,
            user_id,
            ActivityDetails::entity(entity).with("name", name.unwrap_or("Unknown")),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    pub id: Uuid,
    pub action: ActivityAction,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub details: ActivityDetails,
    pub user_id: Identity,
}

impl ActivityLogEntry {
    pub fn from_new(id: Uuid, new: NewActivity) -> Self {
        Self { id, action: new.action, timestamp: new.timestamp, details: new.details, user_id: new.user_id }
    }
}

/// Window of the log ordered by timestamp, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityQuery {
    pub offset: usize,
    pub limit: usize,
    pub user_id: Option<Identity>,
}
