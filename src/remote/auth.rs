use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::{error_message, status_error, RestBackend};
use crate::error::BackendError;
use crate::identity::{Identity, Session, SessionChange, SessionEvent, SessionStore, SignUpOutcome};

const DEFAULT_EXPIRES_IN: i64 = 3600;

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    user: AuthUser,
}

impl TokenResponse {
    fn into_session(self, fallback_email: &str) -> Session {
        let issued_at = Utc::now();
        let expires_in = self.expires_in.unwrap_or(DEFAULT_EXPIRES_IN);
        Session {
            identity: Identity::new(self.user.id),
            email: self.user.email.unwrap_or_else(|| fallback_email.to_string()),
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            issued_at,
            expires_at: issued_at + Duration::seconds(expires_in),
        }
    }
}

/// Sign-up answers with a session when email confirmation is off, and with
/// the bare user record when it is on.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(TokenResponse),
    User(AuthUser),
}

impl RestBackend {
    fn set_current(&self, event: SessionEvent, session: Option<Session>) {
        *self.current.write() = session.clone();
        self.hub.publish(SessionChange::new(event, session));
    }

    fn held_session(&self) -> Option<Session> { self.current.read().clone() }

    async fn token_grant(&self, grant: &str, body: serde_json::Value) -> Result<TokenResponse, BackendError> {
        let resp = self
            .request(Method::POST, &format!("/auth/v1/token?grant_type={}", grant))?
            .json(&body)
            .send()
            .await?;
        let status = resp.status().as_u16();
        if resp.status().is_success() {
            return resp.json::<TokenResponse>().await.map_err(|e| BackendError::Decode(format!("token response: {}", e)));
        }
        let text = resp.text().await.unwrap_or_default();
        match (grant, status) {
            ("password", 400) => Err(BackendError::InvalidCredentials),
            ("refresh_token", 400) | ("refresh_token", 401) => Err(BackendError::NoSession),
            _ => Err(status_error(status, "auth token", &text)),
        }
    }
}

#[async_trait]
impl SessionStore for RestBackend {
    async fn current_session(&self) -> Result<Option<Session>, BackendError> {
        Ok(self.held_session().filter(|s| !s.is_expired_at(Utc::now())))
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        let token = self.token_grant("password", json!({ "email": email, "password": password })).await?;
        let session = token.into_session(email);
        info!(target: "fleetwatch::remote", user = %session.identity, "signed in");
        self.set_current(SessionEvent::SignedIn, Some(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, BackendError> {
        let resp = self
            .request(Method::POST, "/auth/v1/signup")?
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = error_message(&text);
            if message.to_ascii_lowercase().contains("already registered") {
                return Err(BackendError::AlreadyExists(format!("user {}", email)));
            }
            return Err(status_error(status, "signup", &text));
        }
        let body = resp.json::<SignUpResponse>().await.map_err(|e| BackendError::Decode(format!("signup response: {}", e)))?;
        match body {
            SignUpResponse::Session(token) => {
                let session = token.into_session(email);
                let identity = session.identity.clone();
                self.set_current(SessionEvent::SignedIn, Some(session.clone()));
                Ok(SignUpOutcome { identity, session: Some(session) })
            }
            SignUpResponse::User(user) => {
                info!(target: "fleetwatch::remote", user = %user.id, "sign-up awaiting email confirmation");
                Ok(SignUpOutcome { identity: Identity::new(user.id), session: None })
            }
        }
    }

    /// Local state is cleared even when the remote call fails.
    async fn sign_out(&self) -> Result<(), BackendError> {
        if self.held_session().is_none() {
            return Err(BackendError::NoSession);
        }
        let result = match self.request(Method::POST, "/auth/v1/logout") {
            Ok(req) => match req.send().await {
                Ok(resp) if resp.status().is_success() => Ok(()),
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let text = resp.text().await.unwrap_or_default();
                    Err(status_error(status, "logout", &text))
                }
                Err(e) => Err(BackendError::from(e)),
            },
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            warn!(target: "fleetwatch::remote", error = %e, "logout request failed");
        }
        self.set_current(SessionEvent::SignedOut, None);
        result
    }

    async fn refresh_session(&self) -> Result<Session, BackendError> {
        let held = self.held_session().ok_or(BackendError::NoSession)?;
        let refresh_token = held.refresh_token.clone().ok_or(BackendError::NoSession)?;
        let token = self.token_grant("refresh_token", json!({ "refresh_token": refresh_token })).await?;
        let session = token.into_session(&held.email);
        self.set_current(SessionEvent::TokenRefreshed, Some(session.clone()));
        Ok(session)
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<SessionChange> { self.hub.subscribe() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_up_response_shapes() {
        let with_session = json!({
            "access_token": "at", "token_type": "bearer", "expires_in": 60, "refresh_token": "rt",
            "user": { "id": "u-1", "email": "a@x.com" }
        });
        match serde_json::from_value::<SignUpResponse>(with_session).unwrap() {
            SignUpResponse::Session(t) => {
                let s = t.into_session("fallback@x.com");
                assert_eq!(s.identity.as_str(), "u-1");
                assert_eq!(s.email, "a@x.com");
                assert_eq!(s.refresh_token.as_deref(), Some("rt"));
                assert_eq!((s.expires_at - s.issued_at).num_seconds(), 60);
            }
            SignUpResponse::User(_) => panic!("expected a session"),
        }

        let pending = json!({ "id": "u-2", "email": "b@x.com", "confirmation_sent_at": "2024-01-01T00:00:00Z" });
        assert!(matches!(serde_json::from_value::<SignUpResponse>(pending).unwrap(), SignUpResponse::User(u) if u.id == "u-2"));
    }

    #[tokio::test]
    async fn sign_out_without_session_is_no_session() {
        let backend = RestBackend::new("http://127.0.0.1:9", "anon").unwrap();
        assert_eq!(backend.sign_out().await, Err(BackendError::NoSession));
        assert_eq!(backend.current_session().await, Ok(None));
    }

    #[tokio::test]
    async fn failed_remote_sign_out_still_clears_local_session() {
        // Nothing listens on the discard port, so the logout call fails.
        let backend = RestBackend::new("http://127.0.0.1:9", "anon").unwrap();
        let mut rx = backend.subscribe();
        let now = Utc::now();
        *backend.current.write() = Some(Session {
            identity: Identity::new("u-1"),
            email: "a@x.com".into(),
            access_token: "at".into(),
            refresh_token: None,
            issued_at: now,
            expires_at: now + Duration::hours(1),
        });
        let result = backend.sign_out().await;
        assert!(matches!(result, Err(BackendError::Unavailable(_))));
        assert!(backend.held_session().is_none());
        let change = rx.recv().await.unwrap();
        assert_eq!(change.event, SessionEvent::SignedOut);
        assert!(change.session.is_none());
    }
}
