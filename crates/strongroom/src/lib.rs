//! # Strongroom
//!
//! A document repository whose clients talk to it over end-to-end encrypted
//! requests, authenticate with short-lived session tokens, and are
//! authorized through organization roles and per-document ACLs.
//!
//! ## Overview
//!
//! - **Envelopes**: every request path, body and response is encrypted and
//!   tagged, keyed either per request for the repository's public key or by
//!   a session key minted at login
//! - **Sessions**: signed tokens bound to a subject, an organization, key
//!   material and a set of assumed roles
//! - **Roles**: organization-scoped bundles of permissions, suspendable at
//!   any time
//! - **Documents**: client-encrypted blobs with an ACL from role to document
//!   permissions
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use http::Method;
//! use serde_json::json;
//! use strongroom::{ClientChannel, Gateway, Repository, RepositoryConfig, ServerKeys};
//! use strongroom::store::MemoryStore;
//!
//! async fn example() {
//!     let keys = Arc::new(ServerKeys::generate());
//!     let server_key = keys.public_key();
//!     let repo = Repository::new(Arc::new(MemoryStore::new()), keys, RepositoryConfig::default())
//!         .unwrap();
//!     let gateway = Gateway::new(Arc::new(repo));
//!
//!     let channel = ClientChannel::anonymous(server_key);
//!     let (request, exchange) = channel
//!         .seal_request(Method::GET, "/organization", &json!({}))
//!         .unwrap();
//!     let response = gateway.handle(request).await;
//!     let reply = channel.open_response(&exchange, &response, None).unwrap();
//!     println!("{}", reply.data);
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `strongroom::core` - Envelopes, key wrapping, credential files
//! - `strongroom::perms` - Permissions, roles, ACLs and the guard
//! - `strongroom::store` - Storage abstraction and in-memory store
//! - `strongroom::session` - Session tokens and the session manager

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod gateway;
pub mod model;
pub mod repository;

pub use strongroom_core as core;
pub use strongroom_perms as perms;
pub use strongroom_session as session;
pub use strongroom_store as store;

pub use client::{ClientChannel, Exchange, Reply};
pub use config::RepositoryConfig;
pub use error::{ErrorKind, RepositoryError, Result};
pub use gateway::{Gateway, OpenedRequest, ENCRYPTION_HEADER, IV_HEADER};
pub use model::{
    file_handle, DateOrder, DocumentFilter, DocumentSummary, LoginReply, LoginRequest,
    NewDocument, Registration, SubjectListing,
};
pub use repository::{now_millis, Repository, Session};

pub use strongroom_core::{EncryptionMode, KeyPair, PublicKey, SymmetricKey};
pub use strongroom_session::{AuthFailure, ServerKeys};
