//! Store trait: the persistence interface of the repository.
//!
//! Links are only ever updated with a compare-and-swap on their version so
//! that concurrent session changes never silently overwrite each other.
//! Changes that can shrink an organization's membership also swap the
//! organization's membership version. Roles and documents are replaced by
//! value compare-and-swap.

use async_trait::async_trait;

use strongroom_perms::OrganizationRole;

use crate::error::Result;
use crate::records::{Document, Organization, Subject, SubjectLink};

/// Result of inserting a uniquely named record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertResult {
    /// Record was inserted.
    Inserted,
    /// A record with the same key already exists. Nothing changed.
    AlreadyExists,
}

/// Result of a compare-and-swap on a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapResult {
    /// The link was replaced. Carries the new version.
    Swapped(u64),
    /// The stored version differed from the expected one. Nothing changed.
    Conflict {
        /// Version found in the store.
        current: u64,
    },
}

/// Result of a value compare-and-swap on a role or document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceResult {
    /// The record was replaced.
    Replaced,
    /// The stored record no longer equals the expected one. Nothing changed.
    Stale,
}

/// The Store trait: async interface for repository persistence.
///
/// Keys: organizations by name, subjects by username, links by
/// `(organization, username)`, roles by `(organization, role)`, documents by
/// `(organization, document)`, blobs by content handle.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Organizations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert an organization.
    async fn insert_organization(&self, organization: &Organization) -> Result<InsertResult>;

    /// Get an organization by name.
    async fn get_organization(&self, name: &str) -> Result<Option<Organization>>;

    /// List all organizations, ordered by name.
    async fn list_organizations(&self) -> Result<Vec<Organization>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Subjects and links
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert or replace a subject.
    async fn put_subject(&self, subject: &Subject) -> Result<()>;

    /// Get a subject by username.
    async fn get_subject(&self, username: &str) -> Result<Option<Subject>>;

    /// Insert a new link. Its version is stored as given.
    async fn insert_link(&self, link: &SubjectLink) -> Result<InsertResult>;

    /// Get a link.
    async fn get_link(&self, organization: &str, username: &str) -> Result<Option<SubjectLink>>;

    /// List the links of an organization, ordered by username.
    async fn list_links(&self, organization: &str) -> Result<Vec<SubjectLink>>;

    /// Replace a link if its stored version equals `expected_version`.
    ///
    /// On success the stored version becomes `expected_version + 1`,
    /// whatever `link.version` says.
    async fn swap_link(&self, expected_version: u64, link: &SubjectLink) -> Result<SwapResult>;

    /// Version of an organization's membership. Starts at 0 and is bumped by
    /// every successful [`swap_member_link`](Store::swap_member_link).
    async fn membership_version(&self, organization: &str) -> Result<u64>;

    /// Replace a link like [`swap_link`](Store::swap_link), and additionally
    /// require the organization's membership version to equal
    /// `expected_membership`. Both versions are bumped on success.
    ///
    /// A conflict on either version reports the link's stored version.
    async fn swap_member_link(
        &self,
        expected_membership: u64,
        expected_version: u64,
        link: &SubjectLink,
    ) -> Result<SwapResult>;

    // ─────────────────────────────────────────────────────────────────────────
    // Roles
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a role.
    async fn insert_role(&self, role: &OrganizationRole) -> Result<InsertResult>;

    /// Get a role.
    async fn get_role(&self, organization: &str, name: &str) -> Result<Option<OrganizationRole>>;

    /// Replace a role if the stored one still equals `current`.
    async fn swap_role(
        &self,
        current: &OrganizationRole,
        next: &OrganizationRole,
    ) -> Result<ReplaceResult>;

    /// List the roles of an organization, ordered by name.
    async fn list_roles(&self, organization: &str) -> Result<Vec<OrganizationRole>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Documents and blobs
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a document.
    async fn insert_document(&self, document: &Document) -> Result<InsertResult>;

    /// Get a document.
    async fn get_document(&self, organization: &str, name: &str) -> Result<Option<Document>>;

    /// Replace a document if the stored one still equals `current`.
    async fn swap_document(&self, current: &Document, next: &Document) -> Result<ReplaceResult>;

    /// List the documents of an organization, ordered by name.
    async fn list_documents(&self, organization: &str) -> Result<Vec<Document>>;

    /// Store a blob under its handle.
    async fn put_blob(&self, handle: &str, bytes: &[u8]) -> Result<()>;

    /// Get a blob.
    async fn get_blob(&self, handle: &str) -> Result<Option<Vec<u8>>>;

    /// Delete a blob. Deleting a missing blob is not an error.
    async fn delete_blob(&self, handle: &str) -> Result<()>;
}
