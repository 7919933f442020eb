//! # Strongroom Permissions
//!
//! Role-based authorization for the Strongroom repository.
//!
//! ## Key Concepts
//!
//! - **Permission**: an organization-wide right held by a role
//! - **DocumentPermission**: a per-document right granted through an ACL
//! - **OrganizationRole**: a named, suspendable bundle of permissions
//! - **DocumentAcl**: role name to document permissions, per document
//!
//! A session's rights are the union over the roles it has assumed, minus
//! any role that is currently suspended. The founding role of an
//! organization always holds every permission and is never suspended.

pub mod acl;
pub mod error;
pub mod guard;
pub mod permission;
pub mod role;

pub use acl::DocumentAcl;
pub use error::{PermsError, Result};
pub use guard::{active_roles, check_document_permission, check_permission, effective_permissions};
pub use permission::{DocumentPermission, Permission};
pub use role::{ensure_founding_role_kept, OrganizationRole};
