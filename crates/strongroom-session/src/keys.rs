//! Server secrets.

use std::fmt;

use rand::RngCore;
use zeroize::Zeroizing;

use strongroom_core::{KeyPair, PublicKey, SymmetricKey};

const SESSION_KEY_CONTEXT: &str = "strongroom 2024-11 session key";

/// The repository's long-term secrets, built once and shared by reference.
pub struct ServerKeys {
    identity: KeyPair,
    token_secret: Zeroizing<[u8; 32]>,
}

impl ServerKeys {
    /// Create from an identity key pair and a token signing secret.
    pub fn new(identity: KeyPair, token_secret: [u8; 32]) -> Self {
        Self {
            identity,
            token_secret: Zeroizing::new(token_secret),
        }
    }

    /// Generate fresh random secrets.
    pub fn generate() -> Self {
        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        Self::new(KeyPair::generate(), secret)
    }

    /// The identity key pair used in repository mode.
    pub fn identity(&self) -> &KeyPair {
        &self.identity
    }

    /// The public half of the identity, distributed to clients out of band.
    pub fn public_key(&self) -> PublicKey {
        self.identity.public_key()
    }

    /// HS256 signing secret.
    pub fn token_secret(&self) -> &[u8; 32] {
        &self.token_secret
    }

    /// Session key for a key seed. Only the holder of the token secret can
    /// compute it.
    pub fn derive_session_key(&self, seed: &[u8; 32]) -> SymmetricKey {
        let mut hasher = blake3::Hasher::new_derive_key(SESSION_KEY_CONTEXT);
        hasher.update(self.token_secret.as_slice());
        hasher.update(seed);
        SymmetricKey::from_bytes(*hasher.finalize().as_bytes())
    }
}

impl fmt::Debug for ServerKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerKeys")
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_key_depends_on_secret() {
        let a = ServerKeys::new(KeyPair::generate(), [1; 32]);
        let b = ServerKeys::new(KeyPair::generate(), [2; 32]);
        let seed = [7; 32];

        assert_eq!(a.derive_session_key(&seed), a.derive_session_key(&seed));
        assert_ne!(a.derive_session_key(&seed), b.derive_session_key(&seed));
        assert_ne!(a.derive_session_key(&seed), a.derive_session_key(&[8; 32]));
    }
}
