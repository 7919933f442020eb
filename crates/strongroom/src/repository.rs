//! The Repository: application operations of the Strongroom service.
//!
//! Brings together the store, the session manager and the authorization
//! guard. Every session operation takes an authenticated [`Session`], which
//! can only be obtained from [`Repository::authenticate`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use strongroom_core::PublicKey;
use strongroom_perms::{
    active_roles, check_document_permission, check_permission, ensure_founding_role_kept,
    DocumentAcl, DocumentPermission, OrganizationRole, Permission,
};
use strongroom_session::{IssuedSession, IssuedToken, ServerKeys, SessionManager, SessionToken};
use strongroom_store::{
    Document, InsertResult, Organization, ReplaceResult, Store, Subject, SubjectLink, SwapResult,
};

use crate::config::RepositoryConfig;
use crate::error::{RepositoryError, Result};
use crate::model::{
    file_handle, DocumentFilter, DocumentSummary, LoginRequest, NewDocument, Registration,
    SubjectListing,
};

/// A validated session.
///
/// `roles` are the assumed roles that are still granted to the subject.
/// Whether those roles are active is decided per check.
#[derive(Debug, Clone)]
pub struct Session {
    token: String,
    claims: SessionToken,
    roles: BTreeSet<String>,
}

impl Session {
    /// The signed token this session was validated from.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Decoded token contents.
    pub fn claims(&self) -> &SessionToken {
        &self.claims
    }

    /// Organization of the session.
    pub fn organization(&self) -> &str {
        &self.claims.organization
    }

    /// Subject of the session.
    pub fn username(&self) -> &str {
        &self.claims.username
    }

    /// Assumed roles that are still granted.
    pub fn roles(&self) -> &BTreeSet<String> {
        &self.roles
    }
}

/// The Strongroom repository service.
pub struct Repository<S: Store + ?Sized> {
    store: Arc<S>,
    keys: Arc<ServerKeys>,
    sessions: SessionManager<S>,
    config: RepositoryConfig,
}

impl<S: Store + ?Sized> Repository<S> {
    /// Create a repository. Fails on invalid configuration.
    pub fn new(store: Arc<S>, keys: Arc<ServerKeys>, config: RepositoryConfig) -> Result<Self> {
        config.validate()?;
        let sessions = SessionManager::new(store.clone(), keys.clone(), config.session_config());
        Ok(Self {
            store,
            keys,
            sessions,
            config,
        })
    }

    /// The store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The server secrets.
    pub fn keys(&self) -> &ServerKeys {
        &self.keys
    }

    /// The session manager.
    pub fn sessions(&self) -> &SessionManager<S> {
        &self.sessions
    }

    /// The configuration.
    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Organizations
    // ─────────────────────────────────────────────────────────────────────────

    /// Create an organization, its founding role, and the founder's
    /// membership in it.
    pub async fn create_organization(
        &self,
        name: &str,
        founder: &Registration,
    ) -> Result<Organization> {
        require_name("organization", name)?;
        let public_key = founder.parsed_key()?;

        let organization = Organization {
            name: name.to_string(),
            founding_role: self.config.founding_role.clone(),
            founder: founder.username.clone(),
            created_at: now_millis(),
        };
        if self.store.insert_organization(&organization).await? == InsertResult::AlreadyExists {
            return Err(RepositoryError::Conflict(format!("organization {name} exists")));
        }

        self.store
            .insert_role(&OrganizationRole::founding(name, &organization.founding_role))
            .await?;
        self.register_subject(founder, &public_key).await?;

        let mut link = SubjectLink::new(name, founder.username.clone(), public_key);
        link.granted_roles.insert(organization.founding_role.clone());
        self.store.insert_link(&link).await?;

        info!(organization = %name, founder = %founder.username, "organization created");
        Ok(organization)
    }

    /// All organizations.
    pub async fn list_organizations(&self) -> Result<Vec<Organization>> {
        Ok(self.store.list_organizations().await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sessions
    // ─────────────────────────────────────────────────────────────────────────

    /// Log in.
    pub async fn create_session(&self, login: &LoginRequest) -> Result<IssuedSession> {
        let credentials = login.credential_bytes()?;
        Ok(self
            .sessions
            .create_session(&login.organization, &login.username, &login.password, &credentials)
            .await?)
    }

    /// Validate a token into a [`Session`].
    pub async fn authenticate(&self, token: &str) -> Result<Session> {
        let claims = self.sessions.validate(token).await?;
        let link = self
            .require_link(&claims.organization, &claims.username)
            .await?;
        let roles = claims
            .assumed_roles
            .intersection(&link.granted_roles)
            .cloned()
            .collect();

        Ok(Session {
            token: token.to_string(),
            claims,
            roles,
        })
    }

    /// Assume a granted role. The previous token is superseded.
    pub async fn assume_role(&self, session: &Session, role: &str) -> Result<IssuedToken> {
        Ok(self.sessions.assume_role(session.token(), role).await?)
    }

    /// Drop a role. The previous token is superseded.
    pub async fn drop_role(&self, session: &Session, role: &str) -> Result<IssuedToken> {
        Ok(self.sessions.drop_role(session.token(), role).await?)
    }

    /// Roles currently assumed by the session.
    pub fn list_session_roles(&self, session: &Session) -> BTreeSet<String> {
        session.roles().clone()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Subjects
    // ─────────────────────────────────────────────────────────────────────────

    /// Register a subject in the session's organization.
    pub async fn add_subject(
        &self,
        session: &Session,
        registration: &Registration,
    ) -> Result<SubjectListing> {
        self.require(session, Permission::SubjectNew).await?;
        let public_key = registration.parsed_key()?;
        let org = session.organization();

        if self.store.get_link(org, &registration.username).await?.is_some() {
            return Err(RepositoryError::Conflict(format!(
                "{} is already a member of {org}",
                registration.username
            )));
        }
        let subject = self.register_subject(registration, &public_key).await?;

        let link = SubjectLink::new(org, registration.username.clone(), public_key);
        if self.store.insert_link(&link).await? == InsertResult::AlreadyExists {
            return Err(RepositoryError::Conflict(format!(
                "{} is already a member of {org}",
                registration.username
            )));
        }

        info!(organization = %org, username = %registration.username, by = %session.username(), "subject added");
        Ok(listing(&subject, &link))
    }

    /// Suspend a subject's membership. Its session stops validating.
    pub async fn suspend_subject(&self, session: &Session, username: &str) -> Result<()> {
        self.require(session, Permission::SubjectDown).await?;
        let org = session.organization();

        let founding = self.founding_role(org).await?;
        self.update_membership(org, username, |link, others| {
            if link.granted_roles.contains(&founding.name) {
                let others_active = others
                    .iter()
                    .filter(|l| l.active && l.granted_roles.contains(&founding.name))
                    .count();
                ensure_founding_role_kept(&founding, others_active)?;
            }
            link.active = false;
            Ok(())
        })
        .await?;

        info!(organization = %org, %username, by = %session.username(), "subject suspended");
        Ok(())
    }

    /// Reactivate a subject's membership.
    pub async fn activate_subject(&self, session: &Session, username: &str) -> Result<()> {
        self.require(session, Permission::SubjectUp).await?;
        let org = session.organization();

        self.update_link(org, username, |link| {
            link.active = true;
            Ok(())
        })
        .await?;

        info!(organization = %org, %username, by = %session.username(), "subject activated");
        Ok(())
    }

    /// Members of the session's organization, optionally only `username`.
    pub async fn list_subjects(
        &self,
        session: &Session,
        username: Option<&str>,
    ) -> Result<Vec<SubjectListing>> {
        let mut out = Vec::new();
        for link in self.store.list_links(session.organization()).await? {
            if username.is_some_and(|u| u != link.username) {
                continue;
            }
            if let Some(subject) = self.store.get_subject(&link.username).await? {
                out.push(listing(&subject, &link));
            }
        }
        Ok(out)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Roles
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a role with no permissions.
    pub async fn add_role(&self, session: &Session, name: &str) -> Result<OrganizationRole> {
        self.require(session, Permission::RoleNew).await?;
        require_name("role", name)?;

        let role = OrganizationRole::new(session.organization(), name);
        if self.store.insert_role(&role).await? == InsertResult::AlreadyExists {
            return Err(RepositoryError::Conflict(format!("role {name} exists")));
        }
        info!(organization = %session.organization(), role = %name, "role created");
        Ok(role)
    }

    /// Suspend a role. Fails on the founding role.
    pub async fn suspend_role(&self, session: &Session, name: &str) -> Result<()> {
        self.require(session, Permission::RoleDown).await?;
        self.update_role(session.organization(), name, |role| Ok(role.suspend()?))
            .await?;
        info!(organization = %session.organization(), role = %name, "role suspended");
        Ok(())
    }

    /// Reactivate a role.
    pub async fn reactivate_role(&self, session: &Session, name: &str) -> Result<()> {
        self.require(session, Permission::RoleUp).await?;
        self.update_role(session.organization(), name, |role| {
            role.reactivate();
            Ok(())
        })
        .await?;
        info!(organization = %session.organization(), role = %name, "role reactivated");
        Ok(())
    }

    /// Add an organization permission to a role.
    pub async fn add_permission(
        &self,
        session: &Session,
        role: &str,
        permission: Permission,
    ) -> Result<()> {
        self.require(session, Permission::RoleMod).await?;
        self.update_role(session.organization(), role, |record| {
            record.add_permission(permission);
            Ok(())
        })
        .await?;
        debug!(organization = %session.organization(), %role, %permission, "permission added");
        Ok(())
    }

    /// Remove an organization permission from a role. Fails on the founding
    /// role.
    pub async fn remove_permission(
        &self,
        session: &Session,
        role: &str,
        permission: Permission,
    ) -> Result<()> {
        self.require(session, Permission::RoleMod).await?;
        self.update_role(session.organization(), role, |record| {
            Ok(record.remove_permission(permission)?)
        })
        .await?;
        debug!(organization = %session.organization(), %role, %permission, "permission removed");
        Ok(())
    }

    /// Grant a role to a member.
    pub async fn add_subject_to_role(
        &self,
        session: &Session,
        role: &str,
        username: &str,
    ) -> Result<()> {
        self.require(session, Permission::RoleMod).await?;
        let org = session.organization();
        self.require_role(org, role).await?;

        self.update_link(org, username, |link| {
            link.granted_roles.insert(role.to_string());
            Ok(())
        })
        .await?;

        info!(organization = %org, %role, %username, "role granted");
        Ok(())
    }

    /// Revoke a role from a member. The founding role keeps at least one
    /// member.
    pub async fn remove_subject_from_role(
        &self,
        session: &Session,
        role: &str,
        username: &str,
    ) -> Result<()> {
        self.require(session, Permission::RoleMod).await?;
        let org = session.organization();
        let record = self.require_role(org, role).await?;

        self.update_membership(org, username, |link, others| {
            if link.granted_roles.contains(role) {
                let remaining = others
                    .iter()
                    .filter(|l| l.granted_roles.contains(role))
                    .count();
                ensure_founding_role_kept(&record, remaining)?;
            }
            link.granted_roles.remove(role);
            Ok(())
        })
        .await?;

        info!(organization = %org, %role, %username, "role revoked");
        Ok(())
    }

    /// All roles of the session's organization.
    pub async fn list_roles(&self, session: &Session) -> Result<Vec<OrganizationRole>> {
        Ok(self.store.list_roles(session.organization()).await?)
    }

    /// Permissions held by a role.
    pub async fn list_role_permissions(
        &self,
        session: &Session,
        role: &str,
    ) -> Result<BTreeSet<Permission>> {
        Ok(self
            .require_role(session.organization(), role)
            .await?
            .permissions)
    }

    /// Members granted a role.
    pub async fn list_role_subjects(&self, session: &Session, role: &str) -> Result<Vec<String>> {
        let org = session.organization();
        self.require_role(org, role).await?;
        Ok(self
            .store
            .list_links(org)
            .await?
            .into_iter()
            .filter(|l| l.granted_roles.contains(role))
            .map(|l| l.username)
            .collect())
    }

    /// Roles granted to a member.
    pub async fn list_subject_roles(
        &self,
        session: &Session,
        username: &str,
    ) -> Result<BTreeSet<String>> {
        Ok(self
            .require_link(session.organization(), username)
            .await?
            .granted_roles)
    }

    /// Roles holding an organization permission.
    pub async fn list_roles_with_permission(
        &self,
        session: &Session,
        permission: Permission,
    ) -> Result<Vec<String>> {
        Ok(self
            .store
            .list_roles(session.organization())
            .await?
            .into_iter()
            .filter(|r| r.permissions.contains(&permission))
            .map(|r| r.name)
            .collect())
    }

    /// For every document, the roles its ACL grants `permission` to.
    /// Documents where no role holds it are omitted.
    pub async fn list_document_roles_with_permission(
        &self,
        session: &Session,
        permission: DocumentPermission,
    ) -> Result<BTreeMap<String, Vec<String>>> {
        let mut out = BTreeMap::new();
        for doc in self.store.list_documents(session.organization()).await? {
            let roles: Vec<String> = doc
                .acl
                .entries()
                .filter(|(_, perms)| perms.contains(&permission))
                .map(|(role, _)| role.clone())
                .collect();
            if !roles.is_empty() {
                out.insert(doc.name, roles);
            }
        }
        Ok(out)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Documents
    // ─────────────────────────────────────────────────────────────────────────

    /// Upload a document. Its ACL grants the founding role every document
    /// permission.
    pub async fn add_document(&self, session: &Session, upload: &NewDocument) -> Result<Document> {
        self.require(session, Permission::DocNew).await?;
        require_name("document", &upload.name)?;
        let org = session.organization();

        let content = upload.content_bytes()?;
        let handle = upload.file_handle.to_ascii_lowercase();
        if file_handle(&content) != handle {
            warn!(organization = %org, document = %upload.name, "file handle does not match content");
            return Err(RepositoryError::Validation(
                "file handle does not match content".into(),
            ));
        }

        let founding = self.founding_role(org).await?;
        let document = Document {
            name: upload.name.clone(),
            organization: org.to_string(),
            creator: session.username().to_string(),
            deleter: None,
            file_handle: Some(handle.clone()),
            created_at: now_millis(),
            cipher: upload.cipher.clone(),
            acl: DocumentAcl::for_new_document(&founding.name),
        };
        if self.store.insert_document(&document).await? == InsertResult::AlreadyExists {
            return Err(RepositoryError::Conflict(format!(
                "document {} exists",
                upload.name
            )));
        }
        self.store.put_blob(&handle, &content).await?;

        info!(organization = %org, document = %document.name, creator = %document.creator, "document added");
        Ok(document)
    }

    /// Full metadata of a document, including its cipher parameters.
    pub async fn get_document_metadata(&self, session: &Session, name: &str) -> Result<Document> {
        let doc = self.require_document(session.organization(), name).await?;
        self.require_document_permission(session, &doc, DocumentPermission::DocRead)
            .await?;
        Ok(doc)
    }

    /// A blob by handle. Blobs are encrypted by their uploader; no session
    /// is needed.
    pub async fn get_document_blob(&self, handle: &str) -> Result<Vec<u8>> {
        self.store
            .get_blob(&handle.to_ascii_lowercase())
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("file {handle}")))
    }

    /// Documents of the organization passing `filter`.
    pub async fn list_documents(
        &self,
        session: &Session,
        filter: &DocumentFilter,
    ) -> Result<Vec<DocumentSummary>> {
        Ok(self
            .store
            .list_documents(session.organization())
            .await?
            .iter()
            .filter(|doc| filter.matches(doc))
            .map(DocumentSummary::from)
            .collect())
    }

    /// Grant a document permission to a role.
    pub async fn acl_add(
        &self,
        session: &Session,
        document: &str,
        role: &str,
        permission: DocumentPermission,
    ) -> Result<DocumentAcl> {
        let org = session.organization();
        let current = self.require_document(org, document).await?;
        self.require_document_permission(session, &current, DocumentPermission::DocAcl)
            .await?;
        self.require_role(org, role).await?;

        let doc = self
            .update_document(session, document, DocumentPermission::DocAcl, |doc| {
                doc.acl.add(role, permission);
                Ok(())
            })
            .await?;
        info!(organization = %org, %document, %role, %permission, "acl entry added");
        Ok(doc.acl)
    }

    /// Revoke a document permission from a role. Some role always keeps
    /// `DOC_ACL`.
    pub async fn acl_remove(
        &self,
        session: &Session,
        document: &str,
        role: &str,
        permission: DocumentPermission,
    ) -> Result<DocumentAcl> {
        let org = session.organization();
        let doc = self
            .update_document(session, document, DocumentPermission::DocAcl, |doc| {
                Ok(doc.acl.remove(role, permission)?)
            })
            .await?;
        info!(organization = %org, %document, %role, %permission, "acl entry removed");
        Ok(doc.acl)
    }

    /// Delete a document's content. The metadata stays, with the deleter
    /// recorded. Returns the former file handle.
    pub async fn delete_document(&self, session: &Session, name: &str) -> Result<String> {
        let org = session.organization();
        let mut handle = None;
        self.update_document(session, name, DocumentPermission::DocDelete, |doc| {
            let taken = doc.file_handle.take().ok_or_else(|| {
                RepositoryError::Validation(format!("document {name} already deleted"))
            })?;
            doc.deleter = Some(session.username().to_string());
            handle = Some(taken);
            Ok(())
        })
        .await?;
        let handle = handle
            .ok_or_else(|| RepositoryError::Internal(format!("document {name} kept its handle")))?;

        info!(organization = %org, document = %name, deleter = %session.username(), "document deleted");
        Ok(handle)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────────

    async fn require(&self, session: &Session, permission: Permission) -> Result<()> {
        let roles = self.store.list_roles(session.organization()).await?;
        let required = BTreeSet::from([permission]);
        check_permission(session.roles(), &roles, &required).map_err(|e| {
            warn!(
                organization = %session.organization(),
                username = %session.username(),
                %permission,
                "permission denied"
            );
            RepositoryError::from(e)
        })
    }

    async fn require_document_permission(
        &self,
        session: &Session,
        doc: &Document,
        permission: DocumentPermission,
    ) -> Result<()> {
        let roles = self.store.list_roles(session.organization()).await?;
        let active = active_roles(session.roles(), &roles);
        check_document_permission(permission, &doc.acl, &active).map_err(|e| {
            warn!(
                organization = %session.organization(),
                username = %session.username(),
                document = %doc.name,
                %permission,
                "document permission denied"
            );
            RepositoryError::from(e)
        })
    }

    /// Create the subject, or add the key to an existing one.
    async fn register_subject(
        &self,
        registration: &Registration,
        public_key: &PublicKey,
    ) -> Result<Subject> {
        let subject = match self.store.get_subject(&registration.username).await? {
            Some(mut existing) => {
                existing.public_keys.insert(*public_key);
                existing
            }
            None => Subject::new(
                registration.username.clone(),
                registration.full_name.clone(),
                registration.email.clone(),
                *public_key,
            ),
        };
        self.store.put_subject(&subject).await?;
        Ok(subject)
    }

    async fn founding_role(&self, organization: &str) -> Result<OrganizationRole> {
        let org = self
            .store
            .get_organization(organization)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("organization {organization}")))?;
        self.require_role(organization, &org.founding_role).await
    }

    async fn require_role(&self, organization: &str, name: &str) -> Result<OrganizationRole> {
        self.store
            .get_role(organization, name)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("role {name}")))
    }

    async fn require_link(&self, organization: &str, username: &str) -> Result<SubjectLink> {
        self.store
            .get_link(organization, username)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("subject {username}")))
    }

    async fn require_document(&self, organization: &str, name: &str) -> Result<Document> {
        self.store
            .get_document(organization, name)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("document {name}")))
    }

    /// Read-modify-write a link with compare-and-swap, re-applying `apply`
    /// to the fresh link after each conflict.
    async fn update_link<F>(&self, organization: &str, username: &str, mut apply: F) -> Result<SubjectLink>
    where
        F: FnMut(&mut SubjectLink) -> Result<()> + Send,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let mut link = self.require_link(organization, username).await?;
            apply(&mut link)?;

            match self.store.swap_link(link.version, &link).await? {
                SwapResult::Swapped(version) => {
                    link.version = version;
                    return Ok(link);
                }
                SwapResult::Conflict { current } => {
                    self.note_conflict(organization, username, current, attempts)?;
                }
            }
        }
    }

    /// Like [`update_link`](Self::update_link), for changes that can shrink
    /// the organization's membership. `apply` also sees every other member,
    /// and the swap only lands if no other membership change landed since
    /// they were read.
    async fn update_membership<F>(
        &self,
        organization: &str,
        username: &str,
        mut apply: F,
    ) -> Result<SubjectLink>
    where
        F: FnMut(&mut SubjectLink, &[SubjectLink]) -> Result<()> + Send,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let membership = self.store.membership_version(organization).await?;
            let (mut targets, others): (Vec<_>, Vec<_>) = self
                .store
                .list_links(organization)
                .await?
                .into_iter()
                .partition(|l| l.username == username);
            let mut link = targets
                .pop()
                .ok_or_else(|| RepositoryError::NotFound(format!("subject {username}")))?;
            apply(&mut link, &others)?;

            match self
                .store
                .swap_member_link(membership, link.version, &link)
                .await?
            {
                SwapResult::Swapped(version) => {
                    link.version = version;
                    return Ok(link);
                }
                SwapResult::Conflict { current } => {
                    self.note_conflict(organization, username, current, attempts)?;
                }
            }
        }
    }

    fn note_conflict(
        &self,
        organization: &str,
        username: &str,
        current: u64,
        attempts: u32,
    ) -> Result<()> {
        debug!(%organization, %username, current, attempt = attempts, "link update conflict");
        if attempts >= self.config.max_session_retries {
            return Err(RepositoryError::Conflict(format!(
                "{organization}/{username} changed {attempts} times in a row"
            )));
        }
        Ok(())
    }

    /// Read-modify-write a role, retrying while a concurrent change wins.
    async fn update_role<F>(
        &self,
        organization: &str,
        name: &str,
        mut apply: F,
    ) -> Result<OrganizationRole>
    where
        F: FnMut(&mut OrganizationRole) -> Result<()> + Send,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let current = self.require_role(organization, name).await?;
            let mut next = current.clone();
            apply(&mut next)?;

            match self.store.swap_role(&current, &next).await? {
                ReplaceResult::Replaced => return Ok(next),
                ReplaceResult::Stale => {
                    debug!(%organization, role = %name, attempt = attempts, "role update conflict");
                    if attempts >= self.config.max_session_retries {
                        return Err(RepositoryError::Conflict(format!(
                            "role {name} changed {attempts} times in a row"
                        )));
                    }
                }
            }
        }
    }

    /// Read-modify-write a document the session holds `permission` on. The
    /// permission is re-checked against each fresh copy.
    async fn update_document<F>(
        &self,
        session: &Session,
        name: &str,
        permission: DocumentPermission,
        mut apply: F,
    ) -> Result<Document>
    where
        F: FnMut(&mut Document) -> Result<()> + Send,
    {
        let organization = session.organization();
        let mut attempts = 0;
        loop {
            attempts += 1;
            let current = self.require_document(organization, name).await?;
            self.require_document_permission(session, &current, permission)
                .await?;
            let mut next = current.clone();
            apply(&mut next)?;

            match self.store.swap_document(&current, &next).await? {
                ReplaceResult::Replaced => return Ok(next),
                ReplaceResult::Stale => {
                    debug!(
                        %organization,
                        document = %name,
                        attempt = attempts,
                        "document update conflict"
                    );
                    if attempts >= self.config.max_session_retries {
                        return Err(RepositoryError::Conflict(format!(
                            "document {name} changed {attempts} times in a row"
                        )));
                    }
                }
            }
        }
    }
}

fn listing(subject: &Subject, link: &SubjectLink) -> SubjectListing {
    SubjectListing {
        username: subject.username.clone(),
        full_name: subject.full_name.clone(),
        email: subject.email.clone(),
        active: subject.active && link.active,
    }
}

fn require_name(what: &str, name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(RepositoryError::Validation(format!("{what} name must not be empty")));
    }
    Ok(())
}

/// Current time in Unix milliseconds.
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
