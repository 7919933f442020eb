//! Public-key wrapping of symmetric keys.
//!
//! A symmetric key is sealed for a recipient with an ephemeral X25519 key
//! agreement and ChaCha20-Poly1305. Only the holder of the recipient's
//! private key can recover it.
//!
//! Wire layout: `ephemeral_public (32) || nonce (12) || sealed_key (48)`.

use base64::{engine::general_purpose::STANDARD, Engine};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use x25519_dalek::{EphemeralSecret, StaticSecret};

use crate::codec::{SymmetricKey, KEY_LEN};
use crate::encoding::{decode_escaped, encode_escaped};
use crate::error::{CoreError, Result};

const WRAP_CONTEXT: &str = "strongroom 2024-11 key wrap";
const NONCE_LEN: usize = 12;
const AEAD_TAG_LEN: usize = 16;

/// Length of a wrapped key on the wire.
pub const WRAPPED_KEY_LEN: usize = 32 + NONCE_LEN + KEY_LEN + AEAD_TAG_LEN;

/// An X25519 public key (32 bytes).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PublicKey(pub [u8; 32]);

impl PublicKey {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, checking the length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| CoreError::InvalidKeyLength {
            expected: 32,
            got: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Plain base64, the form kept in subject records.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// Parse plain base64.
    pub fn from_base64(s: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(s.trim())
            .map_err(|e| CoreError::Encoding(e.to_string()))?;
        Self::from_slice(&bytes)
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    fn to_dalek(self) -> x25519_dalek::PublicKey {
        x25519_dalek::PublicKey::from(self.0)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}...)", &self.to_hex()[..16])
    }
}

impl From<x25519_dalek::PublicKey> for PublicKey {
    fn from(pk: x25519_dalek::PublicKey) -> Self {
        Self(*pk.as_bytes())
    }
}

/// An X25519 key pair used for key wrapping.
pub struct KeyPair {
    secret: StaticSecret,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a new random key pair.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self::from_secret_bytes(bytes)
    }

    /// Create from secret seed bytes.
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(x25519_dalek::PublicKey::from(&secret));
        Self { secret, public }
    }

    /// The raw secret bytes, for persisting in a credential file.
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    /// Get the public key.
    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    /// Recover a symmetric key wrapped for this key pair.
    pub fn unwrap_key(&self, wrapped: &WrappedKey) -> Result<SymmetricKey> {
        let (eph_public, nonce, sealed) = wrapped.split();
        let shared = self.secret.diffie_hellman(&eph_public.to_dalek());
        let wrap_key = derive_wrap_key(shared.as_bytes(), &eph_public, &self.public);

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&wrap_key));
        let mut key_bytes = cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| CoreError::Unwrap)?;

        let key = SymmetricKey::from_slice(&key_bytes);
        zeroize::Zeroize::zeroize(&mut key_bytes);
        key
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

/// A symmetric key sealed for one recipient.
#[derive(Clone, PartialEq, Eq)]
pub struct WrappedKey(Vec<u8>);

impl WrappedKey {
    /// Wrap `key` so that only the owner of `recipient` can recover it.
    pub fn wrap(key: &SymmetricKey, recipient: &PublicKey) -> Result<Self> {
        let ephemeral = EphemeralSecret::random_from_rng(rand::thread_rng());
        let eph_public = PublicKey::from(x25519_dalek::PublicKey::from(&ephemeral));
        let shared = ephemeral.diffie_hellman(&recipient.to_dalek());
        let wrap_key = derive_wrap_key(shared.as_bytes(), &eph_public, recipient);

        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&wrap_key));
        let sealed = cipher
            .encrypt(Nonce::from_slice(&nonce), key.as_bytes().as_slice())
            .map_err(|_| CoreError::Protocol("key wrap failed".into()))?;

        let mut out = Vec::with_capacity(WRAPPED_KEY_LEN);
        out.extend_from_slice(eph_public.as_bytes());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(Self(out))
    }

    /// Parse raw bytes, checking the length.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() != WRAPPED_KEY_LEN {
            return Err(CoreError::Protocol(format!(
                "wrapped key must be {WRAPPED_KEY_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Self(bytes))
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Header-safe text form.
    pub fn to_escaped(&self) -> String {
        encode_escaped(&self.0)
    }

    /// Parse the header-safe text form.
    pub fn from_escaped(text: &str) -> Result<Self> {
        Self::from_bytes(decode_escaped(text)?)
    }

    fn split(&self) -> (PublicKey, &[u8], &[u8]) {
        let mut eph = [0u8; 32];
        eph.copy_from_slice(&self.0[..32]);
        (
            PublicKey(eph),
            &self.0[32..32 + NONCE_LEN],
            &self.0[32 + NONCE_LEN..],
        )
    }
}

impl fmt::Debug for WrappedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WrappedKey({} bytes)", self.0.len())
    }
}

fn derive_wrap_key(shared: &[u8; 32], eph_public: &PublicKey, recipient: &PublicKey) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(WRAP_CONTEXT);
    hasher.update(shared);
    hasher.update(eph_public.as_bytes());
    hasher.update(recipient.as_bytes());
    *hasher.finalize().as_bytes()
}
