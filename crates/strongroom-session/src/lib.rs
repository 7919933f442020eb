//! # Strongroom Session
//!
//! Session tokens for the Strongroom repository.
//!
//! ## Lifecycle
//!
//! ```text
//! Unauthenticated --create_session--> Active(∅)
//! Active(R) --assume_role(r)--> Active(R ∪ {r})
//! Active(R) --drop_role(r)--> Active(R \ {r})
//! Active(R) --expiry | suspension | new login--> Terminal
//! ```
//!
//! Tokens are HS256 JWTs. Each change issues a new token with a new
//! session id and supersedes the previous one. Expiry is evaluated lazily
//! on [`SessionManager::validate`]; nothing runs in the background.
//!
//! The session key never travels inside the token. The token carries a key
//! seed, and the key is derived from the seed with the server's secret; the
//! client receives the key once, wrapped for its public key, at login.

pub mod error;
pub mod keys;
pub mod manager;
pub mod token;

pub use error::{AuthFailure, Result, SessionError};
pub use keys::ServerKeys;
pub use manager::{now_secs, IssuedSession, IssuedToken, SessionConfig, SessionManager};
pub use token::{Claims, SessionToken, TokenSigner};
