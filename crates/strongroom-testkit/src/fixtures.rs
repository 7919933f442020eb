//! Test fixtures and helpers.
//!
//! Common setup code for session and repository tests.

use strongroom_core::{CredentialFile, KeyPair, PublicKey};
use strongroom_perms::OrganizationRole;
use strongroom_store::{InsertResult, Organization, Store, Subject, SubjectLink, SwapResult};

/// A subject with a key pair and the credential blob that protects it.
pub struct TestSubject {
    pub username: String,
    pub password: String,
    pub keypair: KeyPair,
    pub credentials: Vec<u8>,
}

impl TestSubject {
    /// Create a subject with a random key and the password `"<username>-pw"`.
    pub fn new(username: &str) -> Self {
        let keypair = KeyPair::generate();
        let password = format!("{username}-pw");
        let credentials = CredentialFile::seal(&keypair, &password)
            .expect("sealing a fresh key pair cannot fail");
        Self {
            username: username.to_string(),
            password,
            keypair,
            credentials,
        }
    }

    /// The subject's public key.
    pub fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    /// The store record for this subject.
    pub fn record(&self) -> Subject {
        Subject::new(
            self.username.clone(),
            format!("{} Example", self.username),
            format!("{}@example.org", self.username),
            self.public_key(),
        )
    }
}

/// Write an organization, its founding role and its founder directly to
/// `store`, bypassing any authorization.
pub async fn seed_organization<S: Store + ?Sized>(
    store: &S,
    organization: &str,
    founding_role: &str,
    founder: &TestSubject,
) {
    let org = Organization {
        name: organization.to_string(),
        founding_role: founding_role.to_string(),
        founder: founder.username.clone(),
        created_at: 0,
    };
    assert_eq!(
        store.insert_organization(&org).await.unwrap(),
        InsertResult::Inserted
    );
    store
        .insert_role(&OrganizationRole::founding(organization, founding_role))
        .await
        .unwrap();

    register_member(store, organization, founder, &[founding_role]).await;
}

/// Register `subject` in `organization` with the given granted roles.
pub async fn register_member<S: Store + ?Sized>(
    store: &S,
    organization: &str,
    subject: &TestSubject,
    roles: &[&str],
) -> SubjectLink {
    store.put_subject(&subject.record()).await.unwrap();

    let mut link = SubjectLink::new(organization, subject.username.clone(), subject.public_key());
    link.granted_roles = roles.iter().map(|r| r.to_string()).collect();
    store.insert_link(&link).await.unwrap();
    link
}

/// Set a link's `active` flag.
pub async fn set_link_active<S: Store + ?Sized>(
    store: &S,
    organization: &str,
    username: &str,
    active: bool,
) {
    let mut link = store
        .get_link(organization, username)
        .await
        .unwrap()
        .expect("link exists");
    link.active = active;
    let version = link.version;
    assert!(matches!(
        store.swap_link(version, &link).await.unwrap(),
        SwapResult::Swapped(_)
    ));
}
