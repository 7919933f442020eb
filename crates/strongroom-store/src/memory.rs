//! In-memory implementation of the Store trait.
//!
//! Used by tests and by single-process deployments. Everything is lost when
//! the store is dropped. Thread-safe via RwLock.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tracing::debug;

use strongroom_perms::OrganizationRole;

use crate::error::{Result, StoreError};
use crate::records::{Document, Organization, Subject, SubjectLink};
use crate::traits::{InsertResult, ReplaceResult, Store, SwapResult};

type OrgKey = (String, String);

/// In-memory store implementation.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    organizations: BTreeMap<String, Organization>,
    subjects: HashMap<String, Subject>,
    links: BTreeMap<OrgKey, SubjectLink>,
    membership: HashMap<String, u64>,
    roles: BTreeMap<OrgKey, OrganizationRole>,
    documents: BTreeMap<OrgKey, Document>,
    blobs: HashMap<String, Vec<u8>>,
}

fn key(organization: &str, name: &str) -> OrgKey {
    (organization.to_string(), name.to_string())
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".into()))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_organization(&self, organization: &Organization) -> Result<InsertResult> {
        let mut inner = self.write()?;
        if inner.organizations.contains_key(&organization.name) {
            return Ok(InsertResult::AlreadyExists);
        }
        inner
            .organizations
            .insert(organization.name.clone(), organization.clone());
        Ok(InsertResult::Inserted)
    }

    async fn get_organization(&self, name: &str) -> Result<Option<Organization>> {
        Ok(self.read()?.organizations.get(name).cloned())
    }

    async fn list_organizations(&self) -> Result<Vec<Organization>> {
        Ok(self.read()?.organizations.values().cloned().collect())
    }

    async fn put_subject(&self, subject: &Subject) -> Result<()> {
        self.write()?
            .subjects
            .insert(subject.username.clone(), subject.clone());
        Ok(())
    }

    async fn get_subject(&self, username: &str) -> Result<Option<Subject>> {
        Ok(self.read()?.subjects.get(username).cloned())
    }

    async fn insert_link(&self, link: &SubjectLink) -> Result<InsertResult> {
        let mut inner = self.write()?;
        let k = key(&link.organization, &link.username);
        if inner.links.contains_key(&k) {
            return Ok(InsertResult::AlreadyExists);
        }
        inner.links.insert(k, link.clone());
        Ok(InsertResult::Inserted)
    }

    async fn get_link(&self, organization: &str, username: &str) -> Result<Option<SubjectLink>> {
        Ok(self.read()?.links.get(&key(organization, username)).cloned())
    }

    async fn list_links(&self, organization: &str) -> Result<Vec<SubjectLink>> {
        Ok(self
            .read()?
            .links
            .values()
            .filter(|l| l.organization == organization)
            .cloned()
            .collect())
    }

    async fn swap_link(&self, expected_version: u64, link: &SubjectLink) -> Result<SwapResult> {
        let mut inner = self.write()?;
        swap_stored_link(&mut inner, expected_version, link)
    }

    async fn membership_version(&self, organization: &str) -> Result<u64> {
        Ok(self
            .read()?
            .membership
            .get(organization)
            .copied()
            .unwrap_or(0))
    }

    async fn swap_member_link(
        &self,
        expected_membership: u64,
        expected_version: u64,
        link: &SubjectLink,
    ) -> Result<SwapResult> {
        let mut inner = self.write()?;
        let membership = inner
            .membership
            .get(&link.organization)
            .copied()
            .unwrap_or(0);

        if membership != expected_membership {
            debug!(
                organization = %link.organization,
                expected_membership,
                membership,
                "membership swap conflict"
            );
            let current = inner
                .links
                .get(&key(&link.organization, &link.username))
                .map(|l| l.version)
                .ok_or_else(|| {
                    StoreError::NotFound(format!("link {}/{}", link.organization, link.username))
                })?;
            return Ok(SwapResult::Conflict { current });
        }

        let result = swap_stored_link(&mut inner, expected_version, link)?;
        if matches!(result, SwapResult::Swapped(_)) {
            inner
                .membership
                .insert(link.organization.clone(), membership + 1);
        }
        Ok(result)
    }

    async fn insert_role(&self, role: &OrganizationRole) -> Result<InsertResult> {
        let mut inner = self.write()?;
        let k = key(&role.organization, &role.name);
        if inner.roles.contains_key(&k) {
            return Ok(InsertResult::AlreadyExists);
        }
        inner.roles.insert(k, role.clone());
        Ok(InsertResult::Inserted)
    }

    async fn get_role(&self, organization: &str, name: &str) -> Result<Option<OrganizationRole>> {
        Ok(self.read()?.roles.get(&key(organization, name)).cloned())
    }

    async fn swap_role(
        &self,
        current: &OrganizationRole,
        next: &OrganizationRole,
    ) -> Result<ReplaceResult> {
        let mut inner = self.write()?;
        let stored = inner
            .roles
            .get_mut(&key(&current.organization, &current.name))
            .ok_or_else(|| {
                StoreError::NotFound(format!("role {}/{}", current.organization, current.name))
            })?;
        if stored != current {
            debug!(organization = %current.organization, role = %current.name, "stale role swap");
            return Ok(ReplaceResult::Stale);
        }
        *stored = next.clone();
        Ok(ReplaceResult::Replaced)
    }

    async fn list_roles(&self, organization: &str) -> Result<Vec<OrganizationRole>> {
        Ok(self
            .read()?
            .roles
            .values()
            .filter(|r| r.organization == organization)
            .cloned()
            .collect())
    }

    async fn insert_document(&self, document: &Document) -> Result<InsertResult> {
        let mut inner = self.write()?;
        let k = key(&document.organization, &document.name);
        if inner.documents.contains_key(&k) {
            return Ok(InsertResult::AlreadyExists);
        }
        inner.documents.insert(k, document.clone());
        Ok(InsertResult::Inserted)
    }

    async fn get_document(&self, organization: &str, name: &str) -> Result<Option<Document>> {
        Ok(self.read()?.documents.get(&key(organization, name)).cloned())
    }

    async fn swap_document(&self, current: &Document, next: &Document) -> Result<ReplaceResult> {
        let mut inner = self.write()?;
        let stored = inner
            .documents
            .get_mut(&key(&current.organization, &current.name))
            .ok_or_else(|| {
                StoreError::NotFound(format!(
                    "document {}/{}",
                    current.organization, current.name
                ))
            })?;
        if stored != current {
            debug!(organization = %current.organization, document = %current.name, "stale document swap");
            return Ok(ReplaceResult::Stale);
        }
        *stored = next.clone();
        Ok(ReplaceResult::Replaced)
    }

    async fn list_documents(&self, organization: &str) -> Result<Vec<Document>> {
        Ok(self
            .read()?
            .documents
            .values()
            .filter(|d| d.organization == organization)
            .cloned()
            .collect())
    }

    async fn put_blob(&self, handle: &str, bytes: &[u8]) -> Result<()> {
        self.write()?.blobs.insert(handle.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn get_blob(&self, handle: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.read()?.blobs.get(handle).cloned())
    }

    async fn delete_blob(&self, handle: &str) -> Result<()> {
        self.write()?.blobs.remove(handle);
        Ok(())
    }
}

fn swap_stored_link(
    inner: &mut MemoryStoreInner,
    expected_version: u64,
    link: &SubjectLink,
) -> Result<SwapResult> {
    let stored = inner
        .links
        .get_mut(&key(&link.organization, &link.username))
        .ok_or_else(|| {
            StoreError::NotFound(format!("link {}/{}", link.organization, link.username))
        })?;

    if stored.version != expected_version {
        debug!(
            organization = %link.organization,
            username = %link.username,
            expected_version,
            current = stored.version,
            "link swap conflict"
        );
        return Ok(SwapResult::Conflict {
            current: stored.version,
        });
    }

    let mut next = link.clone();
    next.version = expected_version + 1;
    *stored = next;
    Ok(SwapResult::Swapped(expected_version + 1))
}
