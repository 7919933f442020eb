//! Permission enumerations.
//!
//! Organization permissions and document permissions are separate types so
//! one can never be checked against the other.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PermsError;

/// Organization-wide permission held by a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Permission {
    /// Read the organization's role and ACL structure.
    RoleAcl,
    /// Register a subject in the organization.
    SubjectNew,
    /// Suspend a subject.
    SubjectDown,
    /// Reactivate a subject.
    SubjectUp,
    /// Upload a document.
    DocNew,
    /// Create a role.
    RoleNew,
    /// Suspend a role.
    RoleDown,
    /// Reactivate a role.
    RoleUp,
    /// Change a role's permissions or members.
    RoleMod,
}

impl Permission {
    /// Every organization permission.
    pub const ALL: [Permission; 9] = [
        Permission::RoleAcl,
        Permission::SubjectNew,
        Permission::SubjectDown,
        Permission::SubjectUp,
        Permission::DocNew,
        Permission::RoleNew,
        Permission::RoleDown,
        Permission::RoleUp,
        Permission::RoleMod,
    ];

    /// Wire name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Permission::RoleAcl => "ROLE_ACL",
            Permission::SubjectNew => "SUBJECT_NEW",
            Permission::SubjectDown => "SUBJECT_DOWN",
            Permission::SubjectUp => "SUBJECT_UP",
            Permission::DocNew => "DOC_NEW",
            Permission::RoleNew => "ROLE_NEW",
            Permission::RoleDown => "ROLE_DOWN",
            Permission::RoleUp => "ROLE_UP",
            Permission::RoleMod => "ROLE_MOD",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = PermsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| PermsError::UnknownPermission(s.to_string()))
    }
}

/// Per-document permission held by a role through the document's ACL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentPermission {
    /// Change the document's ACL.
    DocAcl,
    /// Read the document's metadata and key.
    DocRead,
    /// Delete the document's content.
    DocDelete,
}

impl DocumentPermission {
    /// Every document permission.
    pub const ALL: [DocumentPermission; 3] = [
        DocumentPermission::DocAcl,
        DocumentPermission::DocRead,
        DocumentPermission::DocDelete,
    ];

    /// Wire name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            DocumentPermission::DocAcl => "DOC_ACL",
            DocumentPermission::DocRead => "DOC_READ",
            DocumentPermission::DocDelete => "DOC_DELETE",
        }
    }
}

impl fmt::Display for DocumentPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentPermission {
    type Err = PermsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocumentPermission::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| PermsError::UnknownPermission(s.to_string()))
    }
}
