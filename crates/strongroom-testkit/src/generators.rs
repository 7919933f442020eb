//! Proptest generators for property-based testing.

use proptest::prelude::*;

use strongroom_core::{Iv, KeyPair, SymmetricKey};
use strongroom_perms::{DocumentPermission, Permission};

/// Generate a random symmetric key.
pub fn symmetric_key() -> impl Strategy<Value = SymmetricKey> {
    any::<[u8; 32]>().prop_map(SymmetricKey::from_bytes)
}

/// Generate a random IV.
pub fn iv() -> impl Strategy<Value = Iv> {
    any::<[u8; 12]>().prop_map(Iv::from_bytes)
}

/// Generate a key pair from a random seed.
pub fn keypair() -> impl Strategy<Value = KeyPair> {
    any::<[u8; 32]>().prop_map(KeyPair::from_secret_bytes)
}

/// Generate an organization permission.
pub fn permission() -> impl Strategy<Value = Permission> {
    prop::sample::select(Permission::ALL.to_vec())
}

/// Generate a document permission.
pub fn document_permission() -> impl Strategy<Value = DocumentPermission> {
    prop::sample::select(DocumentPermission::ALL.to_vec())
}

/// Generate a plausible role name.
pub fn role_name() -> impl Strategy<Value = String> {
    "[A-Z][a-z]{2,11}"
}

/// Generate a plausible username.
pub fn username() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{2,15}"
}

/// Generate payload bytes of specified max length.
pub fn payload(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Generate a JSON-ish request path with a query string.
pub fn request_path() -> impl Strategy<Value = String> {
    ("[a-z]{1,10}(/[a-z0-9]{1,10}){0,3}", "[a-z]{1,6}=[a-zA-Z0-9]{0,12}")
        .prop_map(|(path, query)| format!("/{path}?{query}"))
}
