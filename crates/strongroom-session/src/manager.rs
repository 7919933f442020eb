//! Session manager: issue, validate and reissue session tokens.
//!
//! The authoritative state of a session is the [`SessionRecord`] on the
//! subject's organization link. A token is accepted only while its id
//! matches that record, so every reissue supersedes the previous token.

use std::collections::BTreeSet;
use std::sync::Arc;

use rand::RngCore;
use tracing::{debug, info, warn};
use uuid::Uuid;

use strongroom_core::{CredentialFile, SymmetricKey, WrappedKey};
use strongroom_store::{SessionRecord, Store, SubjectLink, SwapResult};

use crate::error::{AuthFailure, Result, SessionError};
use crate::keys::ServerKeys;
use crate::token::{SessionToken, TokenSigner};

/// Configuration for the session manager.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Token lifetime in seconds.
    pub ttl_secs: i64,
    /// Attempts at the link swap before giving up with a conflict.
    pub max_retries: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 30 * 60,
            max_retries: 8,
        }
    }
}

/// A freshly signed token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The signed token, as sent in the `Authorization` header.
    pub token: String,
    /// Its decoded contents.
    pub session: SessionToken,
}

/// Result of a login.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    /// The signed token.
    pub issued: IssuedToken,
    /// The session key, wrapped for the caller's verified public key.
    pub wrapped_key: WrappedKey,
}

enum RoleDelta<'a> {
    Assume(&'a str),
    Drop(&'a str),
}

/// Issues and validates session tokens against a store.
pub struct SessionManager<S: Store + ?Sized> {
    store: Arc<S>,
    keys: Arc<ServerKeys>,
    signer: TokenSigner,
    config: SessionConfig,
}

impl<S: Store + ?Sized> SessionManager<S> {
    /// Create a manager.
    pub fn new(store: Arc<S>, keys: Arc<ServerKeys>, config: SessionConfig) -> Self {
        let signer = TokenSigner::new(keys.token_secret());
        Self {
            store,
            keys,
            signer,
            config,
        }
    }

    /// The session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Login
    // ─────────────────────────────────────────────────────────────────────────

    /// Prove possession of a registered key and open a session with no roles.
    pub async fn create_session(
        &self,
        organization: &str,
        username: &str,
        password: &str,
        credentials: &[u8],
    ) -> Result<IssuedSession> {
        self.create_session_at(organization, username, password, credentials, now_secs())
            .await
    }

    /// [`create_session`](Self::create_session) with an explicit clock.
    pub async fn create_session_at(
        &self,
        organization: &str,
        username: &str,
        password: &str,
        credentials: &[u8],
        now: i64,
    ) -> Result<IssuedSession> {
        let keypair = CredentialFile::open(credentials, password).map_err(|e| {
            debug!(%organization, %username, error = %e, "credential blob rejected");
            SessionError::Auth(AuthFailure::CredentialsInvalid)
        })?;
        let public_key = keypair.public_key();

        let subject = self
            .store
            .get_subject(username)
            .await?
            .ok_or(AuthFailure::CredentialsInvalid)?;
        if !subject.public_keys.contains(&public_key) {
            warn!(%organization, %username, "login with unregistered key");
            return Err(AuthFailure::CredentialsInvalid.into());
        }

        let mut seed = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut seed);

        let mut attempts = 0;
        let session = loop {
            let mut link = self.require_link(organization, username).await?;
            if link.public_key != public_key {
                warn!(%organization, %username, "key not registered for organization");
                return Err(AuthFailure::CredentialsInvalid.into());
            }
            if !subject.active || !link.active {
                return Err(AuthFailure::InactiveSubject.into());
            }

            let record = SessionRecord {
                session_id: Uuid::new_v4().to_string(),
                key_seeds: vec![seed],
                expires_at: now + self.config.ttl_secs,
                roles: BTreeSet::new(),
            };
            link.session = Some(record.clone());

            if self.try_swap(&link, &mut attempts).await? {
                break self.token_for(&link, &record);
            }
        };

        let key = self.keys.derive_session_key(&seed);
        let wrapped_key = WrappedKey::wrap(&key, &public_key)?;
        let token = self.signer.sign(&session)?;

        info!(%organization, %username, session_id = %session.session_id, "session created");
        Ok(IssuedSession {
            issued: IssuedToken { token, session },
            wrapped_key,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Validation
    // ─────────────────────────────────────────────────────────────────────────

    /// Validate a token against the current time.
    pub async fn validate(&self, token: &str) -> Result<SessionToken> {
        self.validate_at(token, now_secs()).await
    }

    /// Validate a token: signature, expiry, subject and link active, and
    /// still the current session.
    pub async fn validate_at(&self, token: &str, now: i64) -> Result<SessionToken> {
        let session = self.signer.verify(token)?;
        let org = session.organization.as_str();
        let user = session.username.as_str();

        if session.expires_at <= now {
            debug!(organization = %org, username = %user, "session expired");
            return Err(AuthFailure::SessionExpired.into());
        }

        let subject = self
            .store
            .get_subject(user)
            .await?
            .ok_or(AuthFailure::CredentialsInvalid)?;
        let link = self
            .store
            .get_link(org, user)
            .await?
            .ok_or(AuthFailure::CredentialsInvalid)?;

        if !subject.active || !link.active {
            debug!(organization = %org, username = %user, "session of inactive subject");
            return Err(AuthFailure::InactiveSubject.into());
        }

        let current = matches!(
            &link.session,
            Some(record) if record.session_id == session.session_id
        );
        if !current {
            debug!(organization = %org, username = %user, "superseded session token");
            return Err(AuthFailure::NoSession.into());
        }
        Ok(session)
    }

    /// The active session key of a validated token.
    pub fn session_key(&self, session: &SessionToken) -> Result<SymmetricKey> {
        session
            .key_seeds
            .first()
            .map(|seed| self.keys.derive_session_key(seed))
            .ok_or_else(|| AuthFailure::NoSession.into())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Role changes
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a granted role to the session and reissue the token.
    pub async fn assume_role(&self, token: &str, role: &str) -> Result<IssuedToken> {
        self.reissue(token, RoleDelta::Assume(role), now_secs()).await
    }

    /// [`assume_role`](Self::assume_role) with an explicit clock.
    pub async fn assume_role_at(&self, token: &str, role: &str, now: i64) -> Result<IssuedToken> {
        self.reissue(token, RoleDelta::Assume(role), now).await
    }

    /// Remove a role from the session and reissue the token. Dropping a role
    /// that was never assumed still reissues.
    pub async fn drop_role(&self, token: &str, role: &str) -> Result<IssuedToken> {
        self.reissue(token, RoleDelta::Drop(role), now_secs()).await
    }

    /// [`drop_role`](Self::drop_role) with an explicit clock.
    pub async fn drop_role_at(&self, token: &str, role: &str, now: i64) -> Result<IssuedToken> {
        self.reissue(token, RoleDelta::Drop(role), now).await
    }

    async fn reissue(&self, token: &str, delta: RoleDelta<'_>, now: i64) -> Result<IssuedToken> {
        let caller = self.validate_at(token, now).await?;
        let org = caller.organization.as_str();
        let user = caller.username.as_str();

        let mut attempts = 0;
        loop {
            let mut link = self.require_link(org, user).await?;
            let current = match &link.session {
                // Same login: a concurrent reissue may have rotated the id.
                Some(record) if record.key_seeds == caller.key_seeds => record.clone(),
                _ => return Err(AuthFailure::NoSession.into()),
            };

            let mut roles = current.roles.clone();
            match delta {
                RoleDelta::Assume(role) => {
                    if !link.granted_roles.contains(role) {
                        warn!(organization = %org, username = %user, %role, "role not granted");
                        return Err(AuthFailure::RoleNotGranted(role.to_string()).into());
                    }
                    roles.insert(role.to_string());
                }
                RoleDelta::Drop(role) => {
                    roles.remove(role);
                }
            }

            let record = SessionRecord {
                session_id: Uuid::new_v4().to_string(),
                roles,
                ..current
            };
            link.session = Some(record.clone());

            if self.try_swap(&link, &mut attempts).await? {
                let session = self.token_for(&link, &record);
                let token = self.signer.sign(&session)?;
                info!(
                    organization = %org,
                    username = %user,
                    roles = ?session.assumed_roles,
                    "session reissued"
                );
                return Ok(IssuedToken { token, session });
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────────

    async fn require_link(&self, organization: &str, username: &str) -> Result<SubjectLink> {
        self.store
            .get_link(organization, username)
            .await?
            .ok_or_else(|| AuthFailure::CredentialsInvalid.into())
    }

    /// One compare-and-swap attempt. `Ok(false)` means retry.
    async fn try_swap(&self, link: &SubjectLink, attempts: &mut u32) -> Result<bool> {
        *attempts += 1;
        match self.store.swap_link(link.version, link).await? {
            SwapResult::Swapped(_) => Ok(true),
            SwapResult::Conflict { current } => {
                debug!(
                    organization = %link.organization,
                    username = %link.username,
                    expected = link.version,
                    current,
                    attempt = *attempts,
                    "session swap conflict"
                );
                if *attempts >= self.config.max_retries {
                    warn!(username = %link.username, "giving up on session update");
                    return Err(SessionError::Conflict(format!(
                        "{}/{} changed {} times in a row",
                        link.organization, link.username, attempts
                    )));
                }
                Ok(false)
            }
        }
    }

    fn token_for(&self, link: &SubjectLink, record: &SessionRecord) -> SessionToken {
        SessionToken {
            session_id: record.session_id.clone(),
            username: link.username.clone(),
            organization: link.organization.clone(),
            key_seeds: record.key_seeds.clone(),
            expires_at: record.expires_at,
            assumed_roles: record.roles.clone(),
        }
    }
}

/// Current Unix time in seconds.
pub fn now_secs() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use strongroom_store::MemoryStore;
    use strongroom_testkit::{register_member, seed_organization, set_link_active, FlakyStore, TestSubject};

    const NOW: i64 = 1_700_000_000;

    async fn setup() -> (SessionManager<MemoryStore>, Arc<MemoryStore>, TestSubject) {
        let store = Arc::new(MemoryStore::new());
        let alice = TestSubject::new("alice");
        seed_organization(store.as_ref(), "Acme", "Founders", &alice).await;

        let manager = SessionManager::new(
            store.clone(),
            Arc::new(ServerKeys::generate()),
            SessionConfig::default(),
        );
        (manager, store, alice)
    }

    async fn login(manager: &SessionManager<MemoryStore>, who: &TestSubject) -> IssuedSession {
        manager
            .create_session_at("Acme", &who.username, &who.password, &who.credentials, NOW)
            .await
            .unwrap()
    }

    fn failure(err: SessionError) -> AuthFailure {
        err.auth_failure().cloned().expect("auth failure")
    }

    #[tokio::test]
    async fn test_create_session() {
        let (manager, _, alice) = setup().await;
        let issued = login(&manager, &alice).await;

        let session = &issued.issued.session;
        assert!(session.assumed_roles.is_empty());
        assert_eq!(session.expires_at, NOW + 1800);

        let validated = manager.validate_at(&issued.issued.token, NOW).await.unwrap();
        assert_eq!(&validated, session);

        let key = alice.keypair.unwrap_key(&issued.wrapped_key).unwrap();
        assert_eq!(key, manager.session_key(&validated).unwrap());
    }

    #[tokio::test]
    async fn test_wrong_password() {
        let (manager, _, alice) = setup().await;
        let err = manager
            .create_session_at("Acme", "alice", "nope", &alice.credentials, NOW)
            .await
            .unwrap_err();
        assert_eq!(failure(err), AuthFailure::CredentialsInvalid);
    }

    #[tokio::test]
    async fn test_unregistered_key() {
        let (manager, _, _) = setup().await;
        let mallory = TestSubject::new("alice");
        let err = manager
            .create_session_at("Acme", "alice", &mallory.password, &mallory.credentials, NOW)
            .await
            .unwrap_err();
        assert_eq!(failure(err), AuthFailure::CredentialsInvalid);
    }

    #[tokio::test]
    async fn test_unknown_organization() {
        let (manager, _, alice) = setup().await;
        let err = manager
            .create_session_at("Globex", "alice", &alice.password, &alice.credentials, NOW)
            .await
            .unwrap_err();
        assert_eq!(failure(err), AuthFailure::CredentialsInvalid);
    }

    #[tokio::test]
    async fn test_inactive_link_cannot_login() {
        let (manager, store, alice) = setup().await;
        set_link_active(store.as_ref(), "Acme", "alice", false).await;

        let err = manager
            .create_session_at("Acme", "alice", &alice.password, &alice.credentials, NOW)
            .await
            .unwrap_err();
        assert_eq!(failure(err), AuthFailure::InactiveSubject);
    }

    #[tokio::test]
    async fn test_expiry_boundary() {
        let (manager, _, alice) = setup().await;
        let issued = login(&manager, &alice).await;
        let exp = issued.issued.session.expires_at;

        assert!(manager.validate_at(&issued.issued.token, exp - 1).await.is_ok());
        let err = manager
            .validate_at(&issued.issued.token, exp + 1)
            .await
            .unwrap_err();
        assert_eq!(failure(err), AuthFailure::SessionExpired);
    }

    #[tokio::test]
    async fn test_suspension_invalidates_session() {
        let (manager, store, alice) = setup().await;
        let issued = login(&manager, &alice).await;

        set_link_active(store.as_ref(), "Acme", "alice", false).await;
        let err = manager.validate_at(&issued.issued.token, NOW).await.unwrap_err();
        assert_eq!(failure(err), AuthFailure::InactiveSubject);

        set_link_active(store.as_ref(), "Acme", "alice", true).await;
        assert!(manager.validate_at(&issued.issued.token, NOW).await.is_ok());
    }

    #[tokio::test]
    async fn test_assume_role_supersedes_token() {
        let (manager, _, alice) = setup().await;
        let issued = login(&manager, &alice).await;
        let old = issued.issued.token;

        let next = manager.assume_role_at(&old, "Founders", NOW).await.unwrap();
        assert!(next.session.assumed_roles.contains("Founders"));
        assert_ne!(next.session.session_id, issued.issued.session.session_id);
        assert_eq!(next.session.key_seeds, issued.issued.session.key_seeds);

        let err = manager.validate_at(&old, NOW).await.unwrap_err();
        assert_eq!(failure(err), AuthFailure::NoSession);
        assert!(manager.validate_at(&next.token, NOW).await.is_ok());
    }

    #[tokio::test]
    async fn test_assume_ungranted_role() {
        let (manager, store, _) = setup().await;
        let bob = TestSubject::new("bob");
        register_member(store.as_ref(), "Acme", &bob, &[]).await;
        let issued = login(&manager, &bob).await;

        let err = manager
            .assume_role_at(&issued.issued.token, "Founders", NOW)
            .await
            .unwrap_err();
        assert_eq!(failure(err), AuthFailure::RoleNotGranted("Founders".into()));

        // Roles unchanged and the token still current.
        let still = manager.validate_at(&issued.issued.token, NOW).await.unwrap();
        assert!(still.assumed_roles.is_empty());
    }

    #[tokio::test]
    async fn test_drop_role() {
        let (manager, _, alice) = setup().await;
        let issued = login(&manager, &alice).await;

        let with = manager
            .assume_role_at(&issued.issued.token, "Founders", NOW)
            .await
            .unwrap();
        let without = manager.drop_role_at(&with.token, "Founders", NOW).await.unwrap();
        assert!(without.session.assumed_roles.is_empty());

        let again = manager.drop_role_at(&without.token, "Never", NOW).await.unwrap();
        assert_ne!(again.session.session_id, without.session.session_id);
    }

    #[tokio::test]
    async fn test_new_login_supersedes_old() {
        let (manager, _, alice) = setup().await;
        let first = login(&manager, &alice).await;
        let second = login(&manager, &alice).await;

        let err = manager.validate_at(&first.issued.token, NOW).await.unwrap_err();
        assert_eq!(failure(err), AuthFailure::NoSession);
        assert!(manager.validate_at(&second.issued.token, NOW).await.is_ok());
    }

    /// A store whose first forced conflict comes from a concurrent writer
    /// that assumed `Auditors` on the same login.
    async fn contended_setup() -> (
        SessionManager<FlakyStore<MemoryStore>>,
        Arc<FlakyStore<MemoryStore>>,
        IssuedSession,
    ) {
        let store = Arc::new(FlakyStore::new(MemoryStore::new()));
        let alice = TestSubject::new("alice");
        seed_organization(store.as_ref(), "Acme", "Founders", &alice).await;
        let manager = SessionManager::new(
            store.clone(),
            Arc::new(ServerKeys::generate()),
            SessionConfig::default(),
        );

        let issued = manager
            .create_session_at("Acme", "alice", &alice.password, &alice.credentials, NOW)
            .await
            .unwrap();
        store.interfere_with(|link| {
            link.granted_roles.insert("Auditors".into());
            if let Some(record) = link.session.as_mut() {
                record.roles.insert("Auditors".into());
            }
        });
        (manager, store, issued)
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_assume_retry_keeps_concurrent_role() {
        let (manager, store, issued) = contended_setup().await;
        let before = store.swaps_attempted();

        store.fail_next_swaps(1);
        let next = manager
            .assume_role_at(&issued.issued.token, "Founders", NOW)
            .await
            .unwrap();

        assert_eq!(store.swaps_attempted() - before, 2);
        assert_eq!(next.session.assumed_roles, set(&["Auditors", "Founders"]));

        let record = store
            .get_link("Acme", "alice")
            .await
            .unwrap()
            .unwrap()
            .session
            .unwrap();
        assert_eq!(record.roles, set(&["Auditors", "Founders"]));
        assert_eq!(record.session_id, next.session.session_id);
        assert!(manager.validate_at(&next.token, NOW).await.is_ok());
    }

    #[tokio::test]
    async fn test_drop_retry_keeps_concurrent_role() {
        let (manager, store, issued) = contended_setup().await;
        let with = manager
            .assume_role_at(&issued.issued.token, "Founders", NOW)
            .await
            .unwrap();

        store.fail_next_swaps(1);
        let next = manager.drop_role_at(&with.token, "Founders", NOW).await.unwrap();

        assert_eq!(next.session.assumed_roles, set(&["Auditors"]));
        let record = store
            .get_link("Acme", "alice")
            .await
            .unwrap()
            .unwrap()
            .session
            .unwrap();
        assert_eq!(record.roles, set(&["Auditors"]));
    }

    #[tokio::test]
    async fn test_persistent_conflict_gives_up() {
        let store = Arc::new(FlakyStore::new(MemoryStore::new()));
        let alice = TestSubject::new("alice");
        seed_organization(store.as_ref(), "Acme", "Founders", &alice).await;
        let config = SessionConfig {
            max_retries: 3,
            ..SessionConfig::default()
        };
        let manager = SessionManager::new(store.clone(), Arc::new(ServerKeys::generate()), config);

        let issued = manager
            .create_session_at("Acme", "alice", &alice.password, &alice.credentials, NOW)
            .await
            .unwrap();

        store.fail_next_swaps(10);
        let err = manager
            .assume_role_at(&issued.issued.token, "Founders", NOW)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Conflict(_)));
    }
}
