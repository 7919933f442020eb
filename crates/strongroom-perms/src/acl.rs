//! Per-document access control lists.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{PermsError, Result};
use crate::permission::DocumentPermission;

/// Map from role name to the document permissions it holds.
///
/// At least one role always holds [`DocumentPermission::DocAcl`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentAcl {
    entries: BTreeMap<String, BTreeSet<DocumentPermission>>,
}

impl DocumentAcl {
    /// ACL of a new document: the founding role holds every document
    /// permission.
    pub fn for_new_document(founding_role: &str) -> Self {
        let mut entries = BTreeMap::new();
        entries.insert(
            founding_role.to_string(),
            DocumentPermission::ALL.into_iter().collect(),
        );
        Self { entries }
    }

    /// Permissions held by `role`, if it has an entry.
    pub fn get(&self, role: &str) -> Option<&BTreeSet<DocumentPermission>> {
        self.entries.get(role)
    }

    /// Iterate over `(role, permissions)` entries.
    pub fn entries(&self) -> impl Iterator<Item = (&String, &BTreeSet<DocumentPermission>)> {
        self.entries.iter()
    }

    /// Grant `permission` to `role`.
    pub fn add(&mut self, role: &str, permission: DocumentPermission) {
        self.entries
            .entry(role.to_string())
            .or_default()
            .insert(permission);
    }

    /// Revoke `permission` from `role`.
    ///
    /// Fails without change if no role would be left holding `DOC_ACL`.
    pub fn remove(&mut self, role: &str, permission: DocumentPermission) -> Result<()> {
        if permission == DocumentPermission::DocAcl {
            let other_holders = self
                .entries
                .iter()
                .filter(|(name, perms)| {
                    name.as_str() != role && perms.contains(&DocumentPermission::DocAcl)
                })
                .count();
            let held = self
                .entries
                .get(role)
                .is_some_and(|perms| perms.contains(&DocumentPermission::DocAcl));

            if held && other_holders == 0 {
                return Err(PermsError::Validation(format!(
                    "{role} is the last role holding DOC_ACL"
                )));
            }
        }

        if let Some(perms) = self.entries.get_mut(role) {
            perms.remove(&permission);
            if perms.is_empty() {
                self.entries.remove(role);
            }
        }
        Ok(())
    }

    /// Union of the permissions held by `roles`.
    pub fn permissions_for<'a>(
        &self,
        roles: impl IntoIterator<Item = &'a String>,
    ) -> BTreeSet<DocumentPermission> {
        roles
            .into_iter()
            .filter_map(|role| self.entries.get(role))
            .flatten()
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_document_acl() {
        let acl = DocumentAcl::for_new_document("Founders");
        let perms = acl.get("Founders").unwrap();
        assert_eq!(perms.len(), 3);
        assert!(acl.get("Staff").is_none());
    }

    #[test]
    fn test_last_acl_holder_cannot_be_removed() {
        let mut acl = DocumentAcl::for_new_document("Founders");
        let before = acl.clone();

        assert!(matches!(
            acl.remove("Founders", DocumentPermission::DocAcl),
            Err(PermsError::Validation(_))
        ));
        assert_eq!(acl, before);
    }

    #[test]
    fn test_acl_holder_removable_when_another_holds_it() {
        let mut acl = DocumentAcl::for_new_document("Founders");
        acl.add("Staff", DocumentPermission::DocAcl);

        acl.remove("Founders", DocumentPermission::DocAcl).unwrap();
        assert!(!acl.get("Founders").unwrap().contains(&DocumentPermission::DocAcl));

        assert!(acl.remove("Staff", DocumentPermission::DocAcl).is_err());
    }

    #[test]
    fn test_other_permissions_freely_removed() {
        let mut acl = DocumentAcl::for_new_document("Founders");
        acl.remove("Founders", DocumentPermission::DocRead).unwrap();
        acl.remove("Nobody", DocumentPermission::DocRead).unwrap();
        assert!(!acl.get("Founders").unwrap().contains(&DocumentPermission::DocRead));
    }

    #[test]
    fn test_empty_entry_dropped() {
        let mut acl = DocumentAcl::for_new_document("Founders");
        acl.add("Staff", DocumentPermission::DocRead);
        acl.remove("Staff", DocumentPermission::DocRead).unwrap();
        assert!(acl.get("Staff").is_none());
    }

    #[test]
    fn test_permissions_for_union() {
        let mut acl = DocumentAcl::for_new_document("Founders");
        acl.add("Staff", DocumentPermission::DocRead);

        let staff = vec!["Staff".to_string(), "Ghost".to_string()];
        let perms = acl.permissions_for(&staff);
        assert_eq!(perms.len(), 1);
        assert!(perms.contains(&DocumentPermission::DocRead));
    }
}
