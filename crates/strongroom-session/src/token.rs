//! Signed session tokens.
//!
//! A token is a JWT signed with HS256. Its claims are an immutable value:
//! any change produces a new token with a new `sub`.

use std::collections::BTreeSet;

use base64::{engine::general_purpose::STANDARD, Engine};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AuthFailure, Result, SessionError};

/// JWT claims as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Session id.
    pub sub: String,
    /// Subject username.
    pub username: String,
    /// Organization name.
    pub organization: String,
    /// Expiry (Unix seconds).
    pub exp: i64,
    /// Assumed roles.
    pub roles: BTreeSet<String>,
    /// Base64 key seeds. Index 0 is active.
    pub keys: Vec<String>,
}

/// The decoded contents of a session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionToken {
    pub session_id: String,
    pub username: String,
    pub organization: String,
    pub key_seeds: Vec<[u8; 32]>,
    pub expires_at: i64,
    pub assumed_roles: BTreeSet<String>,
}

impl SessionToken {
    fn to_claims(&self) -> Claims {
        Claims {
            sub: self.session_id.clone(),
            username: self.username.clone(),
            organization: self.organization.clone(),
            exp: self.expires_at,
            roles: self.assumed_roles.clone(),
            keys: self.key_seeds.iter().map(|s| STANDARD.encode(s)).collect(),
        }
    }

    fn from_claims(claims: Claims) -> Result<Self> {
        let key_seeds = claims
            .keys
            .iter()
            .map(|k| {
                STANDARD
                    .decode(k)
                    .ok()
                    .and_then(|bytes| <[u8; 32]>::try_from(bytes.as_slice()).ok())
                    .ok_or(SessionError::Auth(AuthFailure::CredentialsInvalid))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            session_id: claims.sub,
            username: claims.username,
            organization: claims.organization,
            key_seeds,
            expires_at: claims.exp,
            assumed_roles: claims.roles,
        })
    }
}

/// Signs and verifies tokens with one HS256 secret.
pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenSigner {
    /// Create a signer for `secret`.
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against an explicit clock by the manager.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Sign a token.
    pub fn sign(&self, token: &SessionToken) -> Result<String> {
        encode(&Header::new(Algorithm::HS256), &token.to_claims(), &self.encoding)
            .map_err(|e| SessionError::Token(e.to_string()))
    }

    /// Check the signature and decode. Does not check expiry.
    pub fn verify(&self, token: &str) -> Result<SessionToken> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            debug!(error = %e, "token signature rejected");
            SessionError::Auth(AuthFailure::CredentialsInvalid)
        })?;
        SessionToken::from_claims(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SessionToken {
        SessionToken {
            session_id: "s-1".into(),
            username: "alice".into(),
            organization: "Acme".into(),
            key_seeds: vec![[4; 32]],
            expires_at: 1_700_000_000,
            assumed_roles: BTreeSet::from(["Founders".to_string()]),
        }
    }

    #[test]
    fn test_sign_verify() {
        let signer = TokenSigner::new(b"secret");
        let token = signer.sign(&sample()).unwrap();

        assert_eq!(token.split('.').count(), 3);
        assert_eq!(signer.verify(&token).unwrap(), sample());
    }

    #[test]
    fn test_expired_token_still_decodes() {
        let signer = TokenSigner::new(b"secret");
        let mut old = sample();
        old.expires_at = 1;
        let token = signer.sign(&old).unwrap();
        assert_eq!(signer.verify(&token).unwrap().expires_at, 1);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = TokenSigner::new(b"secret").sign(&sample()).unwrap();
        let err = TokenSigner::new(b"other").verify(&token).unwrap_err();
        assert_eq!(err.auth_failure(), Some(&AuthFailure::CredentialsInvalid));
    }

    #[test]
    fn test_tampered_claims_rejected() {
        let signer = TokenSigner::new(b"secret");
        let token = signer.sign(&sample()).unwrap();
        let forged = signer.sign(&SessionToken {
            assumed_roles: BTreeSet::from(["Admins".to_string()]),
            ..sample()
        }).unwrap();

        // Splice the forged payload onto the original signature.
        let parts: Vec<&str> = token.split('.').collect();
        let forged_parts: Vec<&str> = forged.split('.').collect();
        let spliced = format!("{}.{}.{}", parts[0], forged_parts[1], parts[2]);

        assert!(signer.verify(&spliced).is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(TokenSigner::new(b"secret").verify("not.a.token").is_err());
    }
}
