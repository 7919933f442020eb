//! Error types for the authorization layer.

use thiserror::Error;

/// Errors that can occur during authorization checks and policy mutations.
#[derive(Debug, Error)]
pub enum PermsError {
    /// The session's effective permissions do not cover the request.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A mutation would break a policy invariant. State is unchanged.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A permission name did not parse.
    #[error("unknown permission: {0}")]
    UnknownPermission(String),
}

/// Result type for authorization operations.
pub type Result<T> = std::result::Result<T, PermsError>;
