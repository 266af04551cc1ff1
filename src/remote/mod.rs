//! Client for the hosted backend-as-a-service: `/auth/v1` for credentials and
//! sessions, `/rest/v1/<table>` for the `profiles`, `activity_logs` and
//! `vehicles` tables. Every request carries the project's `apikey` header and
//! a bearer token, which is the signed-in user's access token when there is
//! one and the anon key otherwise.

use parking_lot::RwLock;
use reqwest::{Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::BackendError;
use crate::identity::{Session, SessionChangeHub};

mod auth;
mod query;
mod tables;

pub use query::RestQuery;

pub struct RestBackend {
    base: Url,
    anon_key: String,
    client: reqwest::Client,
    current: RwLock<Option<Session>>,
    hub: SessionChangeHub,
}

impl RestBackend {
    pub fn new(base_url: &str, anon_key: &str) -> Result<Self, BackendError> {
        let base = Url::parse(base_url).map_err(|e| BackendError::Unavailable(format!("invalid backend url '{}': {}", base_url, e)))?;
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            base,
            anon_key: anon_key.to_string(),
            client,
            current: RwLock::new(None),
            hub: SessionChangeHub::new(),
        })
    }

    pub fn base_url(&self) -> &Url { &self.base }

    fn bearer(&self) -> String {
        match self.current.read().as_ref() {
            Some(s) => s.access_token.clone(),
            None => self.anon_key.clone(),
        }
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, BackendError> {
        let url = self.base.join(path).map_err(|e| BackendError::Unavailable(format!("invalid path '{}': {}", path, e)))?;
        Ok(self
            .client
            .request(method, url)
            .header("apikey", &self.anon_key)
            .bearer_auth(self.bearer()))
    }

    fn table_request(&self, method: Method, table: &str, query: &RestQuery) -> Result<RequestBuilder, BackendError> {
        Ok(self.request(method, &format!("/rest/v1/{}", table))?.query(query.params()))
    }

    async fn select<T: DeserializeOwned>(&self, table: &str, query: &RestQuery) -> Result<Vec<T>, BackendError> {
        let resp = self.table_request(Method::GET, table, query)?.send().await?;
        read_json(resp, table).await
    }

    /// Insert or update returning the written rows.
    async fn write<B, T>(&self, method: Method, table: &str, query: &RestQuery, body: &B) -> Result<Vec<T>, BackendError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let resp = self
            .table_request(method, table, query)?
            .header("Prefer", "return=representation")
            .json(body)
            .send()
            .await?;
        read_json(resp, table).await
    }

    async fn write_minimal<B: Serialize + ?Sized + Sync>(&self, table: &str, body: &B) -> Result<(), BackendError> {
        let resp = self
            .table_request(Method::POST, table, &RestQuery::new())?
            .header("Prefer", "return=minimal")
            .json(body)
            .send()
            .await?;
        expect_success(resp, table).await
    }

    async fn remove(&self, table: &str, query: &RestQuery) -> Result<(), BackendError> {
        let resp = self.table_request(Method::DELETE, table, query)?.send().await?;
        expect_success(resp, table).await
    }
}

async fn read_json<T: DeserializeOwned>(resp: Response, what: &str) -> Result<T, BackendError> {
    let status = resp.status();
    debug!(target: "fleetwatch::remote", %what, status = status.as_u16(), "response");
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(status_error(status.as_u16(), what, &body));
    }
    resp.json::<T>().await.map_err(|e| BackendError::Decode(format!("{}: {}", what, e)))
}

async fn expect_success(resp: Response, what: &str) -> Result<(), BackendError> {
    let status = resp.status();
    debug!(target: "fleetwatch::remote", %what, status = status.as_u16(), "response");
    if status.is_success() {
        return Ok(());
    }
    let body = resp.text().await.unwrap_or_default();
    Err(status_error(status.as_u16(), what, &body))
}

/// Human-readable message from an error body of either API.
pub(crate) fn error_message(body: &str) -> String {
    if let Ok(v) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["msg", "message", "error_description", "error"] {
            if let Some(s) = v.get(key).and_then(|x| x.as_str()) {
                return s.to_string();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() { "no response body".to_string() } else { trimmed.to_string() }
}

pub(crate) fn status_error(status: u16, what: &str, body: &str) -> BackendError {
    match status {
        404 => BackendError::NotFound(what.to_string()),
        409 => BackendError::AlreadyExists(what.to_string()),
        _ => BackendError::Rejected { status, message: error_message(body) },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_prefers_known_keys() {
        assert_eq!(error_message(r#"{"msg":"User already registered"}"#), "User already registered");
        assert_eq!(error_message(r#"{"code":"23505","message":"duplicate key"}"#), "duplicate key");
        assert_eq!(error_message(r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#), "Invalid login credentials");
        assert_eq!(error_message("  plain text  "), "plain text");
        assert_eq!(error_message(""), "no response body");
    }

    #[test]
    fn status_mapping() {
        assert_eq!(status_error(404, "profiles", ""), BackendError::NotFound("profiles".into()));
        assert_eq!(status_error(409, "profiles", ""), BackendError::AlreadyExists("profiles".into()));
        assert_eq!(
            status_error(500, "vehicles", r#"{"message":"boom"}"#),
            BackendError::Rejected { status: 500, message: "boom".into() }
        );
    }

    #[test]
    fn bearer_falls_back_to_anon_key() {
        let backend = RestBackend::new("https://project.example.co", "anon-123").unwrap();
        assert_eq!(backend.bearer(), "anon-123");
        assert!(RestBackend::new("not a url", "k").is_err());
    }
}
