//! Authorization guard.
//!
//! Decisions are computed at call time from the current role records, never
//! from anything baked into a session token. A role that is suspended
//! contributes nothing, whether the check is organization-wide or against a
//! document ACL.

use std::collections::BTreeSet;

use tracing::debug;

use crate::acl::DocumentAcl;
use crate::error::{PermsError, Result};
use crate::permission::{DocumentPermission, Permission};
use crate::role::OrganizationRole;

/// The assumed roles that are currently active.
pub fn active_roles<'a>(
    assumed: &BTreeSet<String>,
    roles: impl IntoIterator<Item = &'a OrganizationRole>,
) -> BTreeSet<String> {
    roles
        .into_iter()
        .filter(|role| role.active && assumed.contains(&role.name))
        .map(|role| role.name.clone())
        .collect()
}

/// Union of the permissions of every assumed, active role.
pub fn effective_permissions<'a>(
    assumed: &BTreeSet<String>,
    roles: impl IntoIterator<Item = &'a OrganizationRole>,
) -> BTreeSet<Permission> {
    roles
        .into_iter()
        .filter(|role| role.active && assumed.contains(&role.name))
        .flat_map(|role| role.permissions.iter().copied())
        .collect()
}

/// Require every permission in `required` to be covered by the session's
/// effective permissions. An empty requirement always passes.
pub fn check_permission<'a>(
    assumed: &BTreeSet<String>,
    roles: impl IntoIterator<Item = &'a OrganizationRole>,
    required: &BTreeSet<Permission>,
) -> Result<()> {
    let effective = effective_permissions(assumed, roles);
    if required.is_subset(&effective) {
        return Ok(());
    }

    let missing: Vec<String> = required
        .difference(&effective)
        .map(ToString::to_string)
        .collect();
    debug!(?missing, ?assumed, "organization permission denied");
    Err(PermsError::PermissionDenied(format!(
        "{} required",
        missing.join(", ")
    )))
}

/// Require `required` to be granted by `acl` to one of `session_roles`.
///
/// `session_roles` must already exclude suspended roles; see
/// [`active_roles`].
pub fn check_document_permission(
    required: DocumentPermission,
    acl: &DocumentAcl,
    session_roles: &BTreeSet<String>,
) -> Result<()> {
    if acl.permissions_for(session_roles).contains(&required) {
        Ok(())
    } else {
        debug!(%required, ?session_roles, "document permission denied");
        Err(PermsError::PermissionDenied(format!("{required} required")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn perms(list: &[Permission]) -> BTreeSet<Permission> {
        list.iter().copied().collect()
    }

    fn staff_with(perms: &[Permission]) -> OrganizationRole {
        let mut role = OrganizationRole::new("Acme", "Staff");
        for p in perms {
            role.add_permission(*p);
        }
        role
    }

    #[test]
    fn test_no_roles_no_permissions() {
        let roles = vec![OrganizationRole::founding("Acme", "Founders")];
        assert!(check_permission(&set(&[]), &roles, &perms(&[Permission::DocNew])).is_err());
    }

    #[test]
    fn test_assumed_role_grants() {
        let roles = vec![staff_with(&[Permission::DocNew])];
        assert!(check_permission(&set(&["Staff"]), &roles, &perms(&[Permission::DocNew])).is_ok());
        assert!(matches!(
            check_permission(&set(&["Staff"]), &roles, &perms(&[Permission::RoleMod])),
            Err(PermsError::PermissionDenied(_))
        ));
    }

    #[test]
    fn test_every_required_permission_needed() {
        let roles = vec![staff_with(&[Permission::DocNew, Permission::RoleNew])];
        let assumed = set(&["Staff"]);

        assert!(check_permission(&assumed, &roles, &perms(&[])).is_ok());
        assert!(check_permission(
            &assumed,
            &roles,
            &perms(&[Permission::DocNew, Permission::RoleNew])
        )
        .is_ok());

        let err = check_permission(
            &assumed,
            &roles,
            &perms(&[Permission::DocNew, Permission::RoleMod]),
        )
        .unwrap_err();
        match err {
            PermsError::PermissionDenied(msg) => {
                assert!(msg.contains(&Permission::RoleMod.to_string()));
                assert!(!msg.contains(&Permission::DocNew.to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unassumed_role_does_not_grant() {
        let roles = vec![staff_with(&[Permission::DocNew])];
        assert!(check_permission(&set(&["Other"]), &roles, &perms(&[Permission::DocNew])).is_err());
    }

    #[test]
    fn test_suspended_role_contributes_nothing() {
        let mut staff = staff_with(&[Permission::DocNew]);
        staff.suspend().unwrap();
        let roles = vec![staff];

        assert!(check_permission(&set(&["Staff"]), &roles, &perms(&[Permission::DocNew])).is_err());
    }

    #[test]
    fn test_document_permission_through_acl() {
        let mut acl = DocumentAcl::for_new_document("Founders");
        acl.add("Staff", DocumentPermission::DocRead);

        assert!(check_document_permission(DocumentPermission::DocRead, &acl, &set(&["Staff"])).is_ok());
        assert!(check_document_permission(DocumentPermission::DocDelete, &acl, &set(&["Staff"])).is_err());
        assert!(check_document_permission(DocumentPermission::DocRead, &acl, &set(&[])).is_err());
    }

    #[test]
    fn test_suspended_role_excluded_from_document_checks() {
        let mut acl = DocumentAcl::for_new_document("Founders");
        acl.add("Staff", DocumentPermission::DocRead);

        let mut staff = OrganizationRole::new("Acme", "Staff");
        staff.suspend().unwrap();
        let roles = vec![OrganizationRole::founding("Acme", "Founders"), staff];

        let active = active_roles(&set(&["Staff"]), &roles);
        assert!(active.is_empty());
        assert!(check_document_permission(DocumentPermission::DocRead, &acl, &active).is_err());
    }

    fn any_permission() -> impl Strategy<Value = Permission> {
        prop::sample::select(Permission::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn prop_adding_permission_only_grows(
            initial in prop::collection::btree_set(any_permission(), 0..9),
            added in any_permission(),
        ) {
            let assumed = set(&["Staff"]);
            let mut role = staff_with(&initial.iter().copied().collect::<Vec<_>>());
            let before = effective_permissions(&assumed, std::slice::from_ref(&role));

            role.add_permission(added);
            let after = effective_permissions(&assumed, std::slice::from_ref(&role));

            prop_assert!(before.is_subset(&after));
            prop_assert!(after.contains(&added));
        }

        #[test]
        fn prop_removing_permission_only_shrinks(
            initial in prop::collection::btree_set(any_permission(), 0..9),
            removed in any_permission(),
        ) {
            let assumed = set(&["Staff"]);
            let mut role = staff_with(&initial.iter().copied().collect::<Vec<_>>());
            let before = effective_permissions(&assumed, std::slice::from_ref(&role));

            role.remove_permission(removed).unwrap();
            let after = effective_permissions(&assumed, std::slice::from_ref(&role));

            prop_assert!(after.is_subset(&before));
            prop_assert!(!after.contains(&removed));
        }
    }
}
