//! Symmetric envelope codec.
//!
//! ChaCha20 as a raw stream cipher (CTR semantics, no padding) plus a
//! BLAKE3 keyed-hash MAC computed over the ciphertext. The two are separate
//! steps: callers must [`verify`] before they [`decrypt`].

use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::{ChaCha20, Key, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CoreError, Result};

/// Symmetric key size in bytes.
pub const KEY_LEN: usize = 32;

/// IV size in bytes.
pub const IV_LEN: usize = 12;

/// Integrity tag size in bytes.
pub const TAG_LEN: usize = 32;

const PATH_KEY_CONTEXT: &str = "strongroom 2024-11 request path key";

/// A 256-bit symmetric key. Zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; KEY_LEN]);

impl SymmetricKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, checking the length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; KEY_LEN] = bytes.try_into().map_err(|_| CoreError::InvalidKeyLength {
            expected: KEY_LEN,
            got: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Subkey used to encrypt the request path and query.
    ///
    /// The path and the body of one request share the IV header, so they
    /// must not share a keystream.
    pub fn path_key(&self) -> SymmetricKey {
        SymmetricKey(blake3::derive_key(PATH_KEY_CONTEXT, &self.0))
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymmetricKey([REDACTED])")
    }
}

/// A 96-bit initialization vector. Must never repeat under the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Iv(pub [u8; IV_LEN]);

impl Iv {
    /// Generate a new random IV.
    pub fn generate() -> Self {
        let mut bytes = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; IV_LEN]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, checking the length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; IV_LEN] = bytes
            .try_into()
            .map_err(|_| CoreError::Protocol(format!("IV must be {IV_LEN} bytes")))?;
        Ok(Self(arr))
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; IV_LEN] {
        &self.0
    }
}

/// A 256-bit integrity tag over a ciphertext.
#[derive(Clone, Copy, Serialize, Deserialize)]
pub struct MacTag(pub [u8; TAG_LEN]);

impl MacTag {
    /// Create from a slice, checking the length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; TAG_LEN] = bytes
            .try_into()
            .map_err(|_| CoreError::Protocol(format!("tag must be {TAG_LEN} bytes")))?;
        Ok(Self(arr))
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; TAG_LEN] {
        &self.0
    }
}

impl fmt::Debug for MacTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacTag({}...)", &hex::encode(self.0)[..16])
    }
}

/// Encrypt with the ChaCha20 keystream. Output length equals input length.
pub fn encrypt(plaintext: &[u8], key: &SymmetricKey, iv: &Iv) -> Vec<u8> {
    apply_keystream(plaintext, key, iv)
}

/// Decrypt with the ChaCha20 keystream.
///
/// Provides no integrity; [`verify`] the tag first.
pub fn decrypt(ciphertext: &[u8], key: &SymmetricKey, iv: &Iv) -> Vec<u8> {
    apply_keystream(ciphertext, key, iv)
}

fn apply_keystream(input: &[u8], key: &SymmetricKey, iv: &Iv) -> Vec<u8> {
    let mut cipher = ChaCha20::new(Key::from_slice(key.as_bytes()), Nonce::from_slice(iv.as_bytes()));
    let mut buf = input.to_vec();
    cipher.apply_keystream(&mut buf);
    buf
}

/// Compute the keyed MAC over ciphertext bytes.
pub fn tag(key: &SymmetricKey, ciphertext: &[u8]) -> MacTag {
    MacTag(*blake3::keyed_hash(key.as_bytes(), ciphertext).as_bytes())
}

/// Check a tag in constant time.
pub fn verify(key: &SymmetricKey, ciphertext: &[u8], mac: &MacTag) -> bool {
    // blake3::Hash equality is constant-time.
    blake3::keyed_hash(key.as_bytes(), ciphertext) == blake3::Hash::from(mac.0)
}

/// [`verify`], mapped to [`CoreError::Integrity`] on mismatch.
pub fn verify_or_reject(key: &SymmetricKey, ciphertext: &[u8], mac: &MacTag) -> Result<()> {
    if verify(key, ciphertext, mac) {
        Ok(())
    } else {
        Err(CoreError::Integrity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_ciphertext_length_matches_plaintext() {
        let key = SymmetricKey::generate();
        let iv = Iv::generate();
        let plaintext = b"seventeen bytes!!";

        let ciphertext = encrypt(plaintext, &key, &iv);
        assert_eq!(ciphertext.len(), plaintext.len());
        assert_ne!(ciphertext.as_slice(), plaintext.as_slice());
    }

    #[test]
    fn test_different_iv_different_ciphertext() {
        let key = SymmetricKey::generate();
        let c1 = encrypt(b"same input", &key, &Iv::from_bytes([1; IV_LEN]));
        let c2 = encrypt(b"same input", &key, &Iv::from_bytes([2; IV_LEN]));
        assert_ne!(c1, c2);
    }

    #[test]
    fn test_wrong_key_tag_fails() {
        let key = SymmetricKey::generate();
        let other = SymmetricKey::generate();
        let ciphertext = encrypt(b"payload", &key, &Iv::generate());

        let mac = tag(&key, &ciphertext);
        assert!(verify(&key, &ciphertext, &mac));
        assert!(!verify(&other, &ciphertext, &mac));
        assert!(matches!(
            verify_or_reject(&other, &ciphertext, &mac),
            Err(CoreError::Integrity)
        ));
    }

    #[test]
    fn test_path_key_differs_from_key() {
        let key = SymmetricKey::from_bytes([9; KEY_LEN]);
        assert_ne!(key.path_key().as_bytes(), key.as_bytes());
        assert_eq!(key.path_key(), key.path_key());
    }

    #[test]
    fn test_key_from_slice_checks_length() {
        assert!(SymmetricKey::from_slice(&[0u8; 16]).is_err());
        assert!(SymmetricKey::from_slice(&[0u8; KEY_LEN]).is_ok());
    }

    #[test]
    fn test_debug_redacts_key() {
        let key = SymmetricKey::from_bytes([0x41; KEY_LEN]);
        assert_eq!(format!("{:?}", key), "SymmetricKey([REDACTED])");
    }

    proptest! {
        #[test]
        fn prop_decrypt_inverts_encrypt(
            plaintext in prop::collection::vec(any::<u8>(), 0..512),
            key in any::<[u8; KEY_LEN]>(),
            iv in any::<[u8; IV_LEN]>(),
        ) {
            let key = SymmetricKey::from_bytes(key);
            let iv = Iv::from_bytes(iv);
            let ciphertext = encrypt(&plaintext, &key, &iv);
            prop_assert_eq!(decrypt(&ciphertext, &key, &iv), plaintext);
        }

        #[test]
        fn prop_any_flipped_bit_fails_verify(
            plaintext in prop::collection::vec(any::<u8>(), 1..256),
            bit in any::<prop::sample::Index>(),
            in_tag in any::<bool>(),
        ) {
            let key = SymmetricKey::generate();
            let mut ciphertext = encrypt(&plaintext, &key, &Iv::generate());
            let mut mac = tag(&key, &ciphertext);

            if in_tag {
                let i = bit.index(TAG_LEN * 8);
                mac.0[i / 8] ^= 1 << (i % 8);
            } else {
                let i = bit.index(ciphertext.len() * 8);
                ciphertext[i / 8] ^= 1 << (i % 8);
            }

            prop_assert!(!verify(&key, &ciphertext, &mac));
        }
    }
}
