//! # Strongroom Core
//!
//! Cryptographic building blocks for the Strongroom repository protocol.
//!
//! ## Overview
//!
//! Every request and response between a client and the repository is
//! protected at the application layer, independent of the transport:
//!
//! - **Codec**: ChaCha20 encryption plus a BLAKE3 keyed MAC over the
//!   ciphertext. The tag is always verified before decryption.
//! - **Envelope**: mode, IV, ciphertext and tag, with the escaped base64
//!   text form used in headers and paths.
//! - **Key wrapping**: a symmetric key sealed for one X25519 public key.
//! - **Credential files**: a secret key encrypted under a password.
//!
//! ## Usage
//!
//! ```rust
//! use strongroom_core::{EncryptedEnvelope, EncryptionMode, KeyPair, SymmetricKey, WrappedKey};
//!
//! let server = KeyPair::generate();
//! let key = SymmetricKey::generate();
//! let wrapped = WrappedKey::wrap(&key, &server.public_key()).unwrap();
//!
//! let envelope = EncryptedEnvelope::seal(EncryptionMode::Repository, b"hello", &key);
//! let recovered = server.unwrap_key(&wrapped).unwrap();
//! assert_eq!(envelope.open(&recovered).unwrap(), b"hello");
//! ```

pub mod codec;
pub mod credentials;
pub mod encoding;
pub mod envelope;
pub mod error;
pub mod keywrap;

pub use codec::{Iv, MacTag, SymmetricKey, IV_LEN, KEY_LEN, TAG_LEN};
pub use credentials::CredentialFile;
pub use encoding::{decode_escaped, encode_escaped};
pub use envelope::{iv_from_header, iv_to_header, EncryptedEnvelope, EncryptionMode};
pub use error::{CoreError, Result};
pub use keywrap::{KeyPair, PublicKey, WrappedKey};
