//! Encrypted message envelope.
//!
//! An envelope carries one request or response body: the declared mode, an
//! optional wrapped key, the IV, the ciphertext and its integrity tag. On the
//! wire the sealed payload is `ciphertext || tag`, escaped for transport.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::codec::{self, Iv, MacTag, SymmetricKey, TAG_LEN};
use crate::encoding::{decode_escaped, encode_escaped};
use crate::error::{CoreError, Result};
use crate::keywrap::WrappedKey;

/// The value of the `Encryption` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncryptionMode {
    /// Plaintext, no protection.
    None,
    /// Keyed by the repository's long-term key pair.
    Repository,
    /// Keyed by a session token.
    Session,
}

impl EncryptionMode {
    /// Header value for this mode.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Repository => "repository",
            Self::Session => "session",
        }
    }
}

impl FromStr for EncryptionMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "none" => Ok(Self::None),
            "repository" => Ok(Self::Repository),
            "session" => Ok(Self::Session),
            other => Err(CoreError::Protocol(format!(
                "unknown encryption mode: {other}"
            ))),
        }
    }
}

impl fmt::Display for EncryptionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sealed payload.
#[derive(Debug, Clone)]
pub struct EncryptedEnvelope {
    /// Declared mode.
    pub mode: EncryptionMode,

    /// Wrapped key, present in repository mode.
    pub wrapped_key: Option<WrappedKey>,

    /// IV, fresh per encryption.
    pub iv: Iv,

    /// Stream-cipher output, same length as the plaintext.
    pub ciphertext: Vec<u8>,

    /// MAC over `ciphertext`.
    pub tag: MacTag,
}

impl EncryptedEnvelope {
    /// Encrypt and tag `plaintext` under `key` with a fresh IV.
    pub fn seal(mode: EncryptionMode, plaintext: &[u8], key: &SymmetricKey) -> Self {
        Self::seal_with_iv(mode, plaintext, key, Iv::generate())
    }

    /// Encrypt and tag with a caller-chosen IV.
    ///
    /// Used when several parts of one message share the `IV` header; each
    /// part must then use its own key.
    pub fn seal_with_iv(mode: EncryptionMode, plaintext: &[u8], key: &SymmetricKey, iv: Iv) -> Self {
        let ciphertext = codec::encrypt(plaintext, key, &iv);
        let tag = codec::tag(key, &ciphertext);
        Self {
            mode,
            wrapped_key: None,
            iv,
            ciphertext,
            tag,
        }
    }

    /// Attach a wrapped key.
    pub fn with_wrapped_key(mut self, wrapped: WrappedKey) -> Self {
        self.wrapped_key = Some(wrapped);
        self
    }

    /// Verify the tag, then decrypt.
    pub fn open(&self, key: &SymmetricKey) -> Result<Vec<u8>> {
        codec::verify_or_reject(key, &self.ciphertext, &self.tag)?;
        Ok(codec::decrypt(&self.ciphertext, key, &self.iv))
    }

    /// The sealed payload as raw `ciphertext || tag`.
    pub fn payload_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.ciphertext.len() + TAG_LEN);
        out.extend_from_slice(&self.ciphertext);
        out.extend_from_slice(self.tag.as_bytes());
        out
    }

    /// The sealed payload in header-safe text form.
    pub fn payload_text(&self) -> String {
        encode_escaped(&self.payload_bytes())
    }

    /// Rebuild an envelope from its wire parts.
    pub fn from_wire(mode: EncryptionMode, iv: Iv, payload: &[u8]) -> Result<Self> {
        if payload.len() < TAG_LEN {
            return Err(CoreError::Protocol(format!(
                "sealed payload shorter than the {TAG_LEN}-byte tag"
            )));
        }
        let (ciphertext, tag) = payload.split_at(payload.len() - TAG_LEN);
        Ok(Self {
            mode,
            wrapped_key: None,
            iv,
            ciphertext: ciphertext.to_vec(),
            tag: MacTag::from_slice(tag)?,
        })
    }

    /// Rebuild an envelope from the header-safe text form of its payload.
    pub fn from_wire_text(mode: EncryptionMode, iv: Iv, text: &str) -> Result<Self> {
        Self::from_wire(mode, iv, &decode_escaped(text)?)
    }
}

/// Escaped base64 form of an IV, as sent in the `IV` header.
pub fn iv_to_header(iv: &Iv) -> String {
    encode_escaped(iv.as_bytes())
}

/// Parse the `IV` header.
pub fn iv_from_header(text: &str) -> Result<Iv> {
    Iv::from_slice(&decode_escaped(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse() {
        assert_eq!("none".parse::<EncryptionMode>().unwrap(), EncryptionMode::None);
        assert_eq!(
            "repository".parse::<EncryptionMode>().unwrap(),
            EncryptionMode::Repository
        );
        assert_eq!(
            " session ".parse::<EncryptionMode>().unwrap(),
            EncryptionMode::Session
        );
        assert!(matches!(
            "Session".parse::<EncryptionMode>(),
            Err(CoreError::Protocol(_))
        ));
    }

    #[test]
    fn test_seal_open() {
        let key = SymmetricKey::generate();
        let envelope = EncryptedEnvelope::seal(EncryptionMode::Session, b"{\"a\":1}", &key);

        assert_eq!(envelope.ciphertext.len(), 7);
        assert_eq!(envelope.open(&key).unwrap(), b"{\"a\":1}");
    }

    #[test]
    fn test_wire_text_roundtrip() {
        let key = SymmetricKey::generate();
        let envelope = EncryptedEnvelope::seal(EncryptionMode::Repository, b"body", &key);

        let text = envelope.payload_text();
        let iv_text = iv_to_header(&envelope.iv);

        let parsed = EncryptedEnvelope::from_wire_text(
            EncryptionMode::Repository,
            iv_from_header(&iv_text).unwrap(),
            &text,
        )
        .unwrap();
        assert_eq!(parsed.open(&key).unwrap(), b"body");
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let key = SymmetricKey::generate();
        let envelope = EncryptedEnvelope::seal(EncryptionMode::Session, b"transfer 10", &key);

        let mut payload = envelope.payload_bytes();
        payload[0] ^= 0x80;
        let tampered = EncryptedEnvelope::from_wire(EncryptionMode::Session, envelope.iv, &payload).unwrap();

        assert!(matches!(tampered.open(&key), Err(CoreError::Integrity)));
    }

    #[test]
    fn test_short_payload_rejected() {
        let result = EncryptedEnvelope::from_wire(EncryptionMode::Session, Iv::generate(), &[0u8; 10]);
        assert!(matches!(result, Err(CoreError::Protocol(_))));
    }

    #[test]
    fn test_empty_body() {
        let key = SymmetricKey::generate();
        let envelope = EncryptedEnvelope::seal(EncryptionMode::Session, b"", &key);
        assert_eq!(envelope.payload_bytes().len(), TAG_LEN);
        assert_eq!(envelope.open(&key).unwrap(), Vec::<u8>::new());
    }
}
