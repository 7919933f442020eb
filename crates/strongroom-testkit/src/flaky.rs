//! A store wrapper that loses link swaps on demand.
//!
//! Simulates a concurrent writer: before a forced conflict, the wrapper
//! rewrites the stored link behind the caller's back, optionally changing
//! it first. It can also yield after listing links, so that two operations
//! running under `tokio::join!` interleave between their read and their
//! swap.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use strongroom_perms::OrganizationRole;
use strongroom_store::{
    Document, InsertResult, Organization, ReplaceResult, Result, Store, Subject, SubjectLink,
    SwapResult,
};

type Interference = Box<dyn Fn(&mut SubjectLink) + Send + Sync>;

/// Delegates to `inner`, except that the next `n` link swaps conflict.
pub struct FlakyStore<S> {
    inner: S,
    pending_conflicts: AtomicU32,
    swaps_attempted: AtomicU32,
    interference: Mutex<Option<Interference>>,
    yield_after_list: AtomicBool,
}

impl<S: Store> FlakyStore<S> {
    /// Wrap a store. No conflicts are pending.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            pending_conflicts: AtomicU32::new(0),
            swaps_attempted: AtomicU32::new(0),
            interference: Mutex::new(None),
            yield_after_list: AtomicBool::new(false),
        }
    }

    /// What the simulated concurrent writer does to the stored link before
    /// each forced conflict. Without one it rewrites the link unchanged.
    pub fn interfere_with(&self, change: impl Fn(&mut SubjectLink) + Send + Sync + 'static) {
        if let Ok(mut slot) = self.interference.lock() {
            *slot = Some(Box::new(change));
        }
    }

    fn interfere(&self, link: &SubjectLink) -> SubjectLink {
        let mut changed = link.clone();
        if let Ok(slot) = self.interference.lock() {
            if let Some(change) = slot.as_ref() {
                change(&mut changed);
            }
        }
        changed
    }

    /// Yield to the runtime after every `list_links`.
    pub fn yield_after_list(&self, on: bool) {
        self.yield_after_list.store(on, Ordering::SeqCst);
    }

    /// Make the next `n` swaps conflict.
    pub fn fail_next_swaps(&self, n: u32) {
        self.pending_conflicts.store(n, Ordering::SeqCst);
    }

    /// Number of swaps attempted so far.
    pub fn swaps_attempted(&self) -> u32 {
        self.swaps_attempted.load(Ordering::SeqCst)
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: Store> Store for FlakyStore<S> {
    async fn insert_organization(&self, organization: &Organization) -> Result<InsertResult> {
        self.inner.insert_organization(organization).await
    }

    async fn get_organization(&self, name: &str) -> Result<Option<Organization>> {
        self.inner.get_organization(name).await
    }

    async fn list_organizations(&self) -> Result<Vec<Organization>> {
        self.inner.list_organizations().await
    }

    async fn put_subject(&self, subject: &Subject) -> Result<()> {
        self.inner.put_subject(subject).await
    }

    async fn get_subject(&self, username: &str) -> Result<Option<Subject>> {
        self.inner.get_subject(username).await
    }

    async fn insert_link(&self, link: &SubjectLink) -> Result<InsertResult> {
        self.inner.insert_link(link).await
    }

    async fn get_link(&self, organization: &str, username: &str) -> Result<Option<SubjectLink>> {
        self.inner.get_link(organization, username).await
    }

    async fn list_links(&self, organization: &str) -> Result<Vec<SubjectLink>> {
        let links = self.inner.list_links(organization).await;
        if self.yield_after_list.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
        links
    }

    async fn swap_link(&self, expected_version: u64, link: &SubjectLink) -> Result<SwapResult> {
        self.swaps_attempted.fetch_add(1, Ordering::SeqCst);

        let pending = self.pending_conflicts.load(Ordering::SeqCst);
        if pending > 0 {
            self.pending_conflicts.store(pending - 1, Ordering::SeqCst);
            // Another writer touched the link.
            if let Some(current) = self.inner.get_link(&link.organization, &link.username).await? {
                let changed = self.interfere(&current);
                self.inner.swap_link(current.version, &changed).await?;
            }
            debug!(username = %link.username, "injected swap conflict");
        }

        self.inner.swap_link(expected_version, link).await
    }

    async fn membership_version(&self, organization: &str) -> Result<u64> {
        self.inner.membership_version(organization).await
    }

    async fn swap_member_link(
        &self,
        expected_membership: u64,
        expected_version: u64,
        link: &SubjectLink,
    ) -> Result<SwapResult> {
        self.inner
            .swap_member_link(expected_membership, expected_version, link)
            .await
    }

    async fn insert_role(&self, role: &OrganizationRole) -> Result<InsertResult> {
        self.inner.insert_role(role).await
    }

    async fn get_role(&self, organization: &str, name: &str) -> Result<Option<OrganizationRole>> {
        self.inner.get_role(organization, name).await
    }

    async fn swap_role(
        &self,
        current: &OrganizationRole,
        next: &OrganizationRole,
    ) -> Result<ReplaceResult> {
        self.inner.swap_role(current, next).await
    }

    async fn list_roles(&self, organization: &str) -> Result<Vec<OrganizationRole>> {
        self.inner.list_roles(organization).await
    }

    async fn insert_document(&self, document: &Document) -> Result<InsertResult> {
        self.inner.insert_document(document).await
    }

    async fn get_document(&self, organization: &str, name: &str) -> Result<Option<Document>> {
        self.inner.get_document(organization, name).await
    }

    async fn swap_document(&self, current: &Document, next: &Document) -> Result<ReplaceResult> {
        self.inner.swap_document(current, next).await
    }

    async fn list_documents(&self, organization: &str) -> Result<Vec<Document>> {
        self.inner.list_documents(organization).await
    }

    async fn put_blob(&self, handle: &str, bytes: &[u8]) -> Result<()> {
        self.inner.put_blob(handle, bytes).await
    }

    async fn get_blob(&self, handle: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get_blob(handle).await
    }

    async fn delete_blob(&self, handle: &str) -> Result<()> {
        self.inner.delete_blob(handle).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{register_member, TestSubject};
    use strongroom_store::MemoryStore;

    #[tokio::test]
    async fn test_injected_conflict_then_success() {
        let store = FlakyStore::new(MemoryStore::new());
        let alice = TestSubject::new("alice");
        let link = register_member(&store, "Acme", &alice, &[]).await;

        store.fail_next_swaps(1);
        assert_eq!(
            store.swap_link(0, &link).await.unwrap(),
            SwapResult::Conflict { current: 1 }
        );
        assert_eq!(store.swap_link(1, &link).await.unwrap(), SwapResult::Swapped(2));
        assert_eq!(store.swaps_attempted(), 2);
    }

    #[tokio::test]
    async fn test_interference_changes_stored_link() {
        let store = FlakyStore::new(MemoryStore::new());
        let alice = TestSubject::new("alice");
        let link = register_member(&store, "Acme", &alice, &[]).await;

        store.interfere_with(|link| {
            link.granted_roles.insert("Auditors".into());
        });
        store.fail_next_swaps(1);
        assert!(matches!(
            store.swap_link(0, &link).await.unwrap(),
            SwapResult::Conflict { .. }
        ));

        let stored = store.get_link("Acme", "alice").await.unwrap().unwrap();
        assert!(stored.granted_roles.contains("Auditors"));
    }
}
