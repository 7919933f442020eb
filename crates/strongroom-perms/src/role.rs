//! Organization roles.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{PermsError, Result};
use crate::permission::Permission;

/// A named bundle of permissions within one organization.
///
/// The founding role is created with every permission and can be neither
/// suspended nor stripped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationRole {
    /// Owning organization.
    pub organization: String,

    /// Role name, unique within the organization.
    pub name: String,

    /// Suspended roles grant nothing.
    pub active: bool,

    /// Whether this is the organization's founding role.
    pub founding: bool,

    /// Permissions held.
    pub permissions: BTreeSet<Permission>,
}

impl OrganizationRole {
    /// A new active role with no permissions.
    pub fn new(organization: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            organization: organization.into(),
            name: name.into(),
            active: true,
            founding: false,
            permissions: BTreeSet::new(),
        }
    }

    /// The founding role, holding every permission.
    pub fn founding(organization: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            founding: true,
            permissions: Permission::ALL.into_iter().collect(),
            ..Self::new(organization, name)
        }
    }

    /// Whether this role holds `permission` right now.
    pub fn grants(&self, permission: Permission) -> bool {
        self.active && self.permissions.contains(&permission)
    }

    /// Add a permission. Adding one already held is a no-op.
    pub fn add_permission(&mut self, permission: Permission) {
        self.permissions.insert(permission);
    }

    /// Remove a permission.
    pub fn remove_permission(&mut self, permission: Permission) -> Result<()> {
        if self.founding {
            return Err(PermsError::Validation(format!(
                "cannot remove {permission} from founding role {}",
                self.name
            )));
        }
        self.permissions.remove(&permission);
        Ok(())
    }

    /// Suspend the role.
    pub fn suspend(&mut self) -> Result<()> {
        if self.founding {
            return Err(PermsError::Validation(format!(
                "cannot suspend founding role {}",
                self.name
            )));
        }
        self.active = false;
        Ok(())
    }

    /// Reactivate the role.
    pub fn reactivate(&mut self) {
        self.active = true;
    }
}

/// Reject removing `role`'s last remaining member.
///
/// `remaining_members` counts the members left after the removal.
pub fn ensure_founding_role_kept(role: &OrganizationRole, remaining_members: usize) -> Result<()> {
    if role.founding && remaining_members == 0 {
        return Err(PermsError::Validation(format!(
            "founding role {} must keep at least one subject",
            role.name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_founding_role_has_everything() {
        let role = OrganizationRole::founding("Acme", "Founders");
        for p in Permission::ALL {
            assert!(role.grants(p));
        }
    }

    #[test]
    fn test_founding_role_cannot_be_suspended() {
        let mut role = OrganizationRole::founding("Acme", "Founders");
        let before = role.clone();

        assert!(matches!(role.suspend(), Err(PermsError::Validation(_))));
        assert_eq!(role, before);
    }

    #[test]
    fn test_founding_role_cannot_be_stripped() {
        let mut role = OrganizationRole::founding("Acme", "Founders");
        let before = role.clone();

        assert!(matches!(
            role.remove_permission(Permission::RoleMod),
            Err(PermsError::Validation(_))
        ));
        assert_eq!(role, before);
    }

    #[test]
    fn test_suspended_role_grants_nothing() {
        let mut role = OrganizationRole::new("Acme", "Staff");
        role.add_permission(Permission::DocNew);
        assert!(role.grants(Permission::DocNew));

        role.suspend().unwrap();
        assert!(!role.grants(Permission::DocNew));

        role.reactivate();
        assert!(role.grants(Permission::DocNew));
    }

    #[test]
    fn test_last_founder_kept() {
        let founders = OrganizationRole::founding("Acme", "Founders");
        let staff = OrganizationRole::new("Acme", "Staff");

        assert!(ensure_founding_role_kept(&founders, 0).is_err());
        assert!(ensure_founding_role_kept(&founders, 1).is_ok());
        assert!(ensure_founding_role_kept(&staff, 0).is_ok());
    }
}
