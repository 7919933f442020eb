//! Error types for the repository service.

use http::StatusCode;
use thiserror::Error;

use strongroom_core::CoreError;
use strongroom_perms::PermsError;
use strongroom_session::{AuthFailure, SessionError};
use strongroom_store::StoreError;

/// Classification of every failure the repository can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Protocol,
    Integrity,
    Auth,
    Permission,
    Validation,
    NotFound,
    Conflict,
    Internal,
}

/// Errors that can occur while serving a request.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// A header or field required by the declared mode is missing or malformed.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An integrity tag did not verify.
    #[error("integrity check failed")]
    Integrity,

    /// Authentication failed.
    #[error("authentication failed: {0}")]
    Auth(AuthFailure),

    /// The session lacks a required permission.
    #[error("permission denied: {0}")]
    Permission(String),

    /// A mutation would break an invariant. State is unchanged.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A named record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A record with the same name exists, or concurrent updates kept winning.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Anything else that is the server's fault.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RepositoryError {
    /// The failure class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RepositoryError::Protocol(_) => ErrorKind::Protocol,
            RepositoryError::Integrity => ErrorKind::Integrity,
            RepositoryError::Auth(_) => ErrorKind::Auth,
            RepositoryError::Permission(_) => ErrorKind::Permission,
            RepositoryError::Validation(_) => ErrorKind::Validation,
            RepositoryError::NotFound(_) => ErrorKind::NotFound,
            RepositoryError::Conflict(_) => ErrorKind::Conflict,
            RepositoryError::Config(_) | RepositoryError::Store(_) | RepositoryError::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// HTTP status reported for this error.
    pub fn status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Protocol | ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Integrity | ErrorKind::Auth => StatusCode::UNAUTHORIZED,
            ErrorKind::Permission => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to send to the client. Integrity and auth failures are
    /// indistinguishable from outside.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Integrity | ErrorKind::Auth => "unauthorized".to_string(),
            ErrorKind::Internal => "internal error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl From<CoreError> for RepositoryError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Integrity | CoreError::Unwrap => RepositoryError::Integrity,
            CoreError::Protocol(msg) | CoreError::Encoding(msg) => RepositoryError::Protocol(msg),
            e @ CoreError::InvalidKeyLength { .. } => RepositoryError::Protocol(e.to_string()),
            CoreError::Credentials(_) => RepositoryError::Auth(AuthFailure::CredentialsInvalid),
            CoreError::Io(e) => RepositoryError::Internal(e.to_string()),
        }
    }
}

impl From<SessionError> for RepositoryError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Auth(kind) => RepositoryError::Auth(kind),
            SessionError::Conflict(msg) => RepositoryError::Conflict(msg),
            SessionError::Token(msg) => RepositoryError::Internal(msg),
            SessionError::Core(e) => e.into(),
            SessionError::Store(e) => RepositoryError::Store(e),
        }
    }
}

impl From<PermsError> for RepositoryError {
    fn from(err: PermsError) -> Self {
        match err {
            PermsError::PermissionDenied(msg) => RepositoryError::Permission(msg),
            PermsError::Validation(msg) => RepositoryError::Validation(msg),
            e @ PermsError::UnknownPermission(_) => RepositoryError::Validation(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Protocol(format!("malformed body: {err}"))
    }
}

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, RepositoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integrity_and_auth_look_the_same() {
        let integrity = RepositoryError::Integrity;
        let auth = RepositoryError::Auth(AuthFailure::SessionExpired);

        assert_eq!(integrity.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(auth.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(integrity.public_message(), auth.public_message());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(RepositoryError::Permission("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(RepositoryError::Validation("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(RepositoryError::Protocol("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(RepositoryError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_conversions() {
        let err: RepositoryError = PermsError::Validation("last holder".into()).into();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err: RepositoryError = CoreError::Unwrap.into();
        assert_eq!(err.kind(), ErrorKind::Integrity);

        let err: RepositoryError = SessionError::Auth(AuthFailure::NoSession).into();
        assert!(matches!(err, RepositoryError::Auth(AuthFailure::NoSession)));
    }

    #[test]
    fn test_internal_details_hidden() {
        let err = RepositoryError::Store(StoreError::Backend("disk on fire".into()));
        assert_eq!(err.public_message(), "internal error");
    }
}
