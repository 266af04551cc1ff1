//! Unified application error model and the typed errors of the core.
//! Domain operations return the narrow error of their concern; the shell and any
//! other presentation surface converts them into `AppError` notifications.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use thiserror::Error;

use crate::activity::ActivityAction;
use crate::identity::Identity;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    UserInput { code: String, message: String },
    NotFound { code: String, message: String },
    Conflict { code: String, message: String },
    Auth { code: String, message: String },
    Forbidden { code: String, message: String },
    Io { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::UserInput { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Conflict { code, .. }
            | AppError::Auth { code, .. }
            | AppError::Forbidden { code, .. }
            | AppError::Io { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::UserInput { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Conflict { message, .. }
            | AppError::Auth { message, .. }
            | AppError::Forbidden { message, .. }
            | AppError::Io { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn user<S: Into<String>>(code: S, msg: S) -> Self { AppError::UserInput { code: code.into(), message: msg.into() } }
    pub fn not_found<S: Into<String>>(code: S, msg: S) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn conflict<S: Into<String>>(code: S, msg: S) -> Self { AppError::Conflict { code: code.into(), message: msg.into() } }
    pub fn auth<S: Into<String>>(code: S, msg: S) -> Self { AppError::Auth { code: code.into(), message: msg.into() } }
    pub fn forbidden<S: Into<String>>(code: S, msg: S) -> Self { AppError::Forbidden { code: code.into(), message: msg.into() } }
    pub fn io<S: Into<String>>(code: S, msg: S) -> Self { AppError::Io { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal { code: "internal_error".into(), message: err.to_string() }
    }
}

/// Failure reported by an external collaborator (session store or a table).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("invalid login credentials")]
    InvalidCredentials,
    #[error("{0} already exists")]
    AlreadyExists(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("no active session")]
    NoSession,
    #[error("backend rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("unexpected backend response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            BackendError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            BackendError::Rejected { status: status.as_u16(), message: err.to_string() }
        } else {
            BackendError::Unavailable(err.to_string())
        }
    }
}

impl From<BackendError> for AppError {
    fn from(err: BackendError) -> Self {
        let msg = err.to_string();
        match err {
            BackendError::InvalidCredentials => AppError::auth("invalid_credentials".to_string(), msg),
            BackendError::NoSession => AppError::auth("no_session".to_string(), msg),
            BackendError::AlreadyExists(_) => AppError::conflict("already_exists".to_string(), msg),
            BackendError::NotFound(_) => AppError::not_found("not_found".to_string(), msg),
            BackendError::Rejected { status, .. } if status == 401 || status == 403 => {
                AppError::forbidden("backend_denied".to_string(), msg)
            }
            BackendError::Rejected { status, .. } if (400..500).contains(&status) => {
                AppError::user("backend_rejected".to_string(), msg)
            }
            BackendError::Rejected { .. } | BackendError::Unavailable(_) => AppError::io("backend_unavailable".to_string(), msg),
            BackendError::Decode(_) => AppError::internal("backend_decode".to_string(), msg),
        }
    }
}

/// Caller-facing failure of sign-in and of other identity operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("credential check failed: {0}")]
    Credential(#[source] BackendError),
    #[error("no identity is signed in")]
    NotSignedIn,
}

pub type AuthResult<T> = Result<T, AuthError>;

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        let msg = err.to_string();
        match err {
            AuthError::Credential(inner) => {
                match inner {
                    BackendError::InvalidCredentials => AppError::auth("invalid_credentials".to_string(), msg),
                    other => AppError::from(other),
                }
            }
            AuthError::NotSignedIn => AppError::auth("not_signed_in".to_string(), msg),
        }
    }
}

/// Step result of the non-atomic sign-up sequence
/// (credential creation, then profile insert, then audit append).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignUpError {
    /// Nothing was created.
    #[error("credential step failed: {0}")]
    Credential(#[source] BackendError),
    /// The credential exists under `identity`; only the profile step needs a retry.
    #[error("profile step failed for {identity}: {source}")]
    Profile { identity: Identity, source: BackendError },
}

impl SignUpError {
    /// Identity whose credential already exists, when only the profile step failed.
    pub fn orphaned_identity(&self) -> Option<&Identity> {
        match self {
            SignUpError::Credential(_) => None,
            SignUpError::Profile { identity, .. } => Some(identity),
        }
    }
}

impl From<SignUpError> for AppError {
    fn from(err: SignUpError) -> Self {
        let msg = err.to_string();
        match err {
            SignUpError::Credential(BackendError::AlreadyExists(_)) => AppError::conflict("email_taken".to_string(), msg),
            SignUpError::Credential(BackendError::Rejected { status, .. }) if (400..500).contains(&status) => {
                AppError::user("signup_rejected".to_string(), msg)
            }
            SignUpError::Credential(_) => AppError::io("signup_credential_failed".to_string(), msg),
            SignUpError::Profile { .. } => AppError::internal("signup_profile_failed".to_string(), msg),
        }
    }
}

/// Audit-trail append failure. Never propagated past the operation it accompanies.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("failed to record {action} activity: {source}")]
pub struct AuditLogError {
    pub action: ActivityAction,
    pub source: BackendError,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FeedError {
    #[error("invalid page request: page {page}, page size {page_size}")]
    InvalidPage { page: u32, page_size: u32 },
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl From<FeedError> for AppError {
    fn from(err: FeedError) -> Self {
        let msg = err.to_string();
        match err {
            FeedError::InvalidPage { .. } => AppError::user("invalid_page".to_string(), msg),
            FeedError::Backend(inner) => AppError::from(inner),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FleetError {
    #[error("sign in first")]
    NotSignedIn,
    #[error("not allowed: {0}")]
    Forbidden(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("invalid input: {0}")]
    Invalid(String),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

pub type FleetResult<T> = Result<T, FleetError>;

impl From<FleetError> for AppError {
    fn from(err: FleetError) -> Self {
        let msg = err.to_string();
        match err {
            FleetError::NotSignedIn => AppError::auth("not_signed_in".to_string(), msg),
            FleetError::Forbidden(_) => AppError::forbidden("forbidden".to_string(), msg),
            FleetError::NotFound(_) => AppError::not_found("not_found".to_string(), msg),
            FleetError::Invalid(_) => AppError::user("invalid_input".to_string(), msg),
            FleetError::Backend(inner) => AppError::from(inner),
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
