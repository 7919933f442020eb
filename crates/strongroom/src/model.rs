//! Request and response payloads of the repository operations.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use strongroom_core::PublicKey;
use strongroom_perms::DocumentAcl;
use strongroom_store::{Document, DocumentCipherMeta};

use crate::error::{RepositoryError, Result};

/// A subject registering with an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub username: String,
    pub full_name: String,
    pub email: String,
    /// Plain base64 X25519 public key.
    pub public_key: String,
}

impl Registration {
    /// Build a registration for `public_key`.
    pub fn new(
        username: impl Into<String>,
        full_name: impl Into<String>,
        email: impl Into<String>,
        public_key: &PublicKey,
    ) -> Self {
        Self {
            username: username.into(),
            full_name: full_name.into(),
            email: email.into(),
            public_key: public_key.to_base64(),
        }
    }

    /// Check the fields and decode the key.
    pub fn parsed_key(&self) -> Result<PublicKey> {
        if self.username.trim().is_empty() {
            return Err(RepositoryError::Validation("username must not be empty".into()));
        }
        PublicKey::from_base64(&self.public_key)
            .map_err(|e| RepositoryError::Validation(format!("bad public key: {e}")))
    }
}

/// Login request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub organization: String,
    pub username: String,
    pub password: String,
    /// Plain base64 credential blob.
    pub credentials: String,
}

impl LoginRequest {
    /// Decoded credential blob.
    pub fn credential_bytes(&self) -> Result<Vec<u8>> {
        decode_field("credentials", &self.credentials)
    }
}

/// Login response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginReply {
    /// Signed session token.
    pub token: String,
    /// Session key wrapped for the caller, escaped base64.
    pub wrapped_key: String,
}

/// A subject as listed within an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectListing {
    pub username: String,
    pub full_name: String,
    pub email: String,
    /// Active both globally and in this organization.
    pub active: bool,
}

/// A document upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDocument {
    pub name: String,
    /// BLAKE3 hex digest of `content`.
    pub file_handle: String,
    pub cipher: DocumentCipherMeta,
    /// Plain base64 of the already encrypted blob.
    pub content: String,
}

impl NewDocument {
    /// Build an upload of `content`, computing its handle.
    pub fn new(name: impl Into<String>, cipher: DocumentCipherMeta, content: &[u8]) -> Self {
        Self {
            name: name.into(),
            file_handle: file_handle(content),
            cipher,
            content: STANDARD.encode(content),
        }
    }

    /// Decoded blob.
    pub fn content_bytes(&self) -> Result<Vec<u8>> {
        decode_field("content", &self.content)
    }
}

/// Document metadata without the cipher parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub name: String,
    pub creator: String,
    pub deleter: Option<String>,
    pub file_handle: Option<String>,
    pub created_at: i64,
    pub acl: DocumentAcl,
}

impl From<&Document> for DocumentSummary {
    fn from(doc: &Document) -> Self {
        Self {
            name: doc.name.clone(),
            creator: doc.creator.clone(),
            deleter: doc.deleter.clone(),
            file_handle: doc.file_handle.clone(),
            created_at: doc.created_at,
            acl: doc.acl.clone(),
        }
    }
}

/// Comparison used by a document date filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateOrder {
    /// Created at or after the date.
    #[serde(rename = "nt")]
    NewerThan,
    /// Created at or before the date.
    #[serde(rename = "ot")]
    OlderThan,
    /// Created on the same UTC day.
    #[serde(rename = "et")]
    Equal,
}

/// Filter for listing documents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentFilter {
    /// Only documents created by this subject.
    pub creator: Option<String>,
    /// Date (Unix ms) and comparison.
    pub date: Option<(i64, DateOrder)>,
}

impl DocumentFilter {
    /// Whether `doc` passes the filter.
    pub fn matches(&self, doc: &Document) -> bool {
        if let Some(creator) = &self.creator {
            if &doc.creator != creator {
                return false;
            }
        }
        match self.date {
            None => true,
            Some((date, DateOrder::NewerThan)) => doc.created_at >= date,
            Some((date, DateOrder::OlderThan)) => doc.created_at <= date,
            Some((date, DateOrder::Equal)) => {
                const DAY_MS: i64 = 86_400_000;
                doc.created_at.div_euclid(DAY_MS) == date.div_euclid(DAY_MS)
            }
        }
    }
}

/// Content handle of a blob: BLAKE3 hex digest.
pub fn file_handle(content: &[u8]) -> String {
    blake3::hash(content).to_hex().to_string()
}

fn decode_field(name: &str, text: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(text.trim())
        .map_err(|e| RepositoryError::Protocol(format!("{name}: {e}")))
}
