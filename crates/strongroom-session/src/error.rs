//! Error types for the session layer.

use std::fmt;

use thiserror::Error;

/// Why a session operation was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthFailure {
    /// Bad signature, wrong password, unknown key or unknown subject.
    CredentialsInvalid,
    /// The token's expiry has passed.
    SessionExpired,
    /// The subject or its organization link is suspended.
    InactiveSubject,
    /// The token is not the subject's current session.
    NoSession,
    /// The role is not granted to the subject in this organization.
    RoleNotGranted(String),
}

impl fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthFailure::CredentialsInvalid => f.write_str("credentials_invalid"),
            AuthFailure::SessionExpired => f.write_str("session_expired"),
            AuthFailure::InactiveSubject => f.write_str("inactive_subject"),
            AuthFailure::NoSession => f.write_str("no_session"),
            AuthFailure::RoleNotGranted(role) => write!(f, "role_not_granted: {role}"),
        }
    }
}

/// Errors that can occur in the session layer.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Authentication failed.
    #[error("authentication failed: {0}")]
    Auth(AuthFailure),

    /// Concurrent updates kept winning the link swap.
    #[error("session update conflict: {0}")]
    Conflict(String),

    /// Token encoding failed.
    #[error("token error: {0}")]
    Token(String),

    /// Core error.
    #[error("core error: {0}")]
    Core(#[from] strongroom_core::CoreError),

    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] strongroom_store::StoreError),
}

impl SessionError {
    /// The auth failure kind, if this is an auth error.
    pub fn auth_failure(&self) -> Option<&AuthFailure> {
        match self {
            SessionError::Auth(kind) => Some(kind),
            _ => None,
        }
    }
}

impl From<AuthFailure> for SessionError {
    fn from(kind: AuthFailure) -> Self {
        SessionError::Auth(kind)
    }
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
