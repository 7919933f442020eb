//! Error types for Strongroom core primitives.

use thiserror::Error;

/// Errors that can occur in the codec, key wrapping and credential layers.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A header or field required by the declared mode is missing or malformed.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The integrity tag did not match the ciphertext.
    #[error("integrity check failed")]
    Integrity,

    /// Base64 or escape decoding failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Key material has the wrong length.
    #[error("invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    /// A wrapped key could not be unwrapped with the given private key.
    #[error("key unwrap failed")]
    Unwrap,

    /// A credential blob could not be opened.
    #[error("credential error: {0}")]
    Credentials(String),

    /// I/O error while reading or writing a credential file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
