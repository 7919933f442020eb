//! Persisted records.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use strongroom_core::PublicKey;
use strongroom_perms::DocumentAcl;

/// An organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    /// Unique name.
    pub name: String,

    /// Name of the role granted to the creator.
    pub founding_role: String,

    /// Username of the creator.
    pub founder: String,

    /// Creation time (Unix ms).
    pub created_at: i64,
}

/// A subject (user), independent of any organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// Unique username.
    pub username: String,

    /// Display name.
    pub full_name: String,

    /// Contact address.
    pub email: String,

    /// Suspended subjects cannot hold a valid session anywhere.
    pub active: bool,

    /// Every public key ever registered for this subject.
    pub public_keys: BTreeSet<PublicKey>,
}

impl Subject {
    /// A new active subject with one registered key.
    pub fn new(
        username: impl Into<String>,
        full_name: impl Into<String>,
        email: impl Into<String>,
        public_key: PublicKey,
    ) -> Self {
        Self {
            username: username.into(),
            full_name: full_name.into(),
            email: email.into(),
            active: true,
            public_keys: BTreeSet::from([public_key]),
        }
    }
}

/// Server-side authoritative state of a subject's session in one
/// organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Id of the only token currently accepted.
    pub session_id: String,

    /// Key seeds, stable for the life of one login. Index 0 is active.
    pub key_seeds: Vec<[u8; 32]>,

    /// Expiry (Unix seconds).
    pub expires_at: i64,

    /// Assumed roles.
    pub roles: BTreeSet<String>,
}

/// Membership of a subject in an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectLink {
    /// Organization name.
    pub organization: String,

    /// Subject username.
    pub username: String,

    /// Suspended links cannot hold a valid session.
    pub active: bool,

    /// The key the subject logs in with for this organization.
    pub public_key: PublicKey,

    /// Roles the subject may assume.
    pub granted_roles: BTreeSet<String>,

    /// Current session, if any.
    pub session: Option<SessionRecord>,

    /// Bumped by the store on every successful swap.
    pub version: u64,
}

impl SubjectLink {
    /// A new active link with no roles and no session.
    pub fn new(
        organization: impl Into<String>,
        username: impl Into<String>,
        public_key: PublicKey,
    ) -> Self {
        Self {
            organization: organization.into(),
            username: username.into(),
            active: true,
            public_key,
            granted_roles: BTreeSet::new(),
            session: None,
            version: 0,
        }
    }
}

/// How a client encrypted a document's blob. Opaque to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentCipherMeta {
    /// Algorithm name.
    pub alg: String,

    /// Encoded content key.
    pub key: String,

    /// Encoded IV.
    pub iv: String,
}

/// A document's metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Name, unique within the organization.
    pub name: String,

    /// Owning organization.
    pub organization: String,

    /// Username of the uploader.
    pub creator: String,

    /// Username of whoever deleted the content.
    pub deleter: Option<String>,

    /// Content address of the blob. Cleared on delete.
    pub file_handle: Option<String>,

    /// Upload time (Unix ms).
    pub created_at: i64,

    /// Client-side cipher parameters.
    pub cipher: DocumentCipherMeta,

    /// Access control list.
    pub acl: DocumentAcl,
}
