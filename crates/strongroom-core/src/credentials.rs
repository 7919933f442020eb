//! Password-protected credential files.
//!
//! A credential file holds one X25519 secret key, encrypted with a key
//! stretched from the owner's password by Argon2id. The container is CBOR.

use std::path::Path;

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{CoreError, Result};
use crate::keywrap::KeyPair;

/// Current container format.
pub const CREDENTIAL_FORMAT_VERSION: u8 = 1;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;

#[derive(Serialize, Deserialize)]
struct Container {
    version: u8,
    salt: Vec<u8>,
    nonce: Vec<u8>,
    sealed: Vec<u8>,
}

/// Sealing and opening of credential blobs.
pub struct CredentialFile;

impl CredentialFile {
    /// Encrypt `keypair`'s secret under `password`.
    pub fn seal(keypair: &KeyPair, password: &str) -> Result<Vec<u8>> {
        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        rand::thread_rng().fill_bytes(&mut nonce);

        let kek = stretch(password, &salt)?;
        let secret = Zeroizing::new(keypair.secret_bytes());
        let sealed = ChaCha20Poly1305::new(Key::from_slice(kek.as_slice()))
            .encrypt(Nonce::from_slice(&nonce), secret.as_slice())
            .map_err(|_| CoreError::Credentials("encryption failed".into()))?;

        let container = Container {
            version: CREDENTIAL_FORMAT_VERSION,
            salt: salt.to_vec(),
            nonce: nonce.to_vec(),
            sealed,
        };

        let mut buf = Vec::new();
        ciborium::into_writer(&container, &mut buf)
            .map_err(|e| CoreError::Credentials(e.to_string()))?;
        Ok(buf)
    }

    /// Decrypt a credential blob. A wrong password is indistinguishable
    /// from a corrupted blob.
    pub fn open(bytes: &[u8], password: &str) -> Result<KeyPair> {
        let container: Container =
            ciborium::from_reader(bytes).map_err(|e| CoreError::Credentials(e.to_string()))?;

        if container.version != CREDENTIAL_FORMAT_VERSION {
            return Err(CoreError::Credentials(format!(
                "unsupported credential format {}",
                container.version
            )));
        }
        if container.nonce.len() != NONCE_LEN {
            return Err(CoreError::Credentials("malformed nonce".into()));
        }

        let kek = stretch(password, &container.salt)?;
        let secret = Zeroizing::new(
            ChaCha20Poly1305::new(Key::from_slice(kek.as_slice()))
                .decrypt(Nonce::from_slice(&container.nonce), container.sealed.as_slice())
                .map_err(|_| CoreError::Credentials("wrong password or corrupted file".into()))?,
        );

        let arr: [u8; 32] = secret
            .as_slice()
            .try_into()
            .map_err(|_| CoreError::Credentials("malformed secret key".into()))?;
        Ok(KeyPair::from_secret_bytes(arr))
    }

    /// Read and open a credential file.
    pub fn load(path: impl AsRef<Path>, password: &str) -> Result<KeyPair> {
        let bytes = std::fs::read(path)?;
        Self::open(&bytes, password)
    }

    /// Seal and write a credential file.
    pub fn write(path: impl AsRef<Path>, keypair: &KeyPair, password: &str) -> Result<()> {
        let bytes = Self::seal(keypair, password)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

fn stretch(password: &str, salt: &[u8]) -> Result<Zeroizing<[u8; 32]>> {
    let mut kek = Zeroizing::new([0u8; 32]);
    argon2::Argon2::default()
        .hash_password_into(password.as_bytes(), salt, kek.as_mut())
        .map_err(|e| CoreError::Credentials(format!("key derivation failed: {e}")))?;
    Ok(kek)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open() {
        let keypair = KeyPair::generate();
        let blob = CredentialFile::seal(&keypair, "correct horse").unwrap();

        let opened = CredentialFile::open(&blob, "correct horse").unwrap();
        assert_eq!(opened.public_key(), keypair.public_key());
    }

    #[test]
    fn test_wrong_password() {
        let keypair = KeyPair::generate();
        let blob = CredentialFile::seal(&keypair, "correct horse").unwrap();

        assert!(matches!(
            CredentialFile::open(&blob, "battery staple"),
            Err(CoreError::Credentials(_))
        ));
    }

    #[test]
    fn test_garbage_blob() {
        assert!(CredentialFile::open(b"\x00\x01garbage", "pw").is_err());
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alice.cred");
        let keypair = KeyPair::generate();

        CredentialFile::write(&path, &keypair, "pw").unwrap();
        let loaded = CredentialFile::load(&path, "pw").unwrap();
        assert_eq!(loaded.public_key(), keypair.public_key());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            CredentialFile::load(dir.path().join("absent"), "pw"),
            Err(CoreError::Io(_))
        ));
    }
}
