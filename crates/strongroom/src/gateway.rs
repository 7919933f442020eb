//! Transport gateway: opens encrypted requests and seals responses.
//!
//! ```text
//! Encryption: none | repository | session
//! Authorization: <escaped wrapped key> | Bearer <token>
//! IV: <escaped iv>
//! path: "/" + escaped(enc(path?query) || tag), under the path subkey
//! body: escaped(enc(body) || tag)
//! ```
//!
//! Failures before a message key is established, and every integrity or
//! authentication failure, are answered in plaintext with a generic message.
//! Anything later is sealed like a normal response.

use std::sync::Arc;

use http::header::AUTHORIZATION;
use http::{HeaderMap, HeaderValue, Request, Response, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, warn};

use strongroom_core::{
    iv_from_header, iv_to_header, EncryptedEnvelope, EncryptionMode, Iv, PublicKey, SymmetricKey,
    WrappedKey,
};
use strongroom_store::Store;

use crate::api;
use crate::error::{ErrorKind, RepositoryError, Result};
use crate::repository::Repository;

/// Header declaring the encryption mode.
pub const ENCRYPTION_HEADER: &str = "encryption";

/// Header carrying the escaped IV.
pub const IV_HEADER: &str = "iv";

const BEARER: &str = "Bearer ";

/// A decrypted request and what is needed to answer it.
pub struct OpenedRequest {
    /// Declared mode.
    pub mode: EncryptionMode,
    /// The plaintext request.
    pub request: Request<Vec<u8>>,
    /// Bearer token, in session mode.
    pub token: Option<String>,
    key: Option<SymmetricKey>,
}

/// Server side of the transport.
pub struct Gateway<S: Store + ?Sized> {
    repo: Arc<Repository<S>>,
}

impl<S: Store + ?Sized> Gateway<S> {
    /// Create a gateway in front of `repo`.
    pub fn new(repo: Arc<Repository<S>>) -> Self {
        Self { repo }
    }

    /// The repository behind the gateway.
    pub fn repository(&self) -> &Repository<S> {
        &self.repo
    }

    /// Serve one request. Never fails; errors become responses.
    pub async fn handle(&self, request: Request<Vec<u8>>) -> Response<Vec<u8>> {
        let opened = match self.open_request(&request).await {
            Ok(opened) => opened,
            Err(err) => return reject(&err),
        };

        let (status, body, reply_to) =
            match api::dispatch(&self.repo, &opened.request, opened.token.as_deref()).await {
                Ok(handled) => (handled.status, handled.body, handled.reply_to),
                Err(err) if matches!(err.kind(), ErrorKind::Integrity | ErrorKind::Auth) => {
                    return reject(&err);
                }
                Err(err) => {
                    debug!(error = %err, "request failed");
                    (err.status(), json!({ "error": err.public_message() }), None)
                }
            };

        match self.seal_response(&opened, status, &body, reply_to.as_ref()) {
            Ok(response) => response,
            Err(err) => reject(&err),
        }
    }

    /// Check headers, establish the message key, and decrypt path and body.
    pub async fn open_request(&self, request: &Request<Vec<u8>>) -> Result<OpenedRequest> {
        let headers = request.headers();
        let mode = match header(headers, ENCRYPTION_HEADER)? {
            Some(value) => value.parse::<EncryptionMode>()?,
            None if self.repo.config().require_encryption => {
                return Err(RepositoryError::Protocol("missing Encryption header".into()));
            }
            None => EncryptionMode::None,
        };

        if mode == EncryptionMode::None {
            if self.repo.config().require_encryption {
                return Err(RepositoryError::Protocol("plaintext requests are not accepted".into()));
            }
            let token = header(headers, AUTHORIZATION.as_str())?.map(strip_bearer);
            return Ok(OpenedRequest {
                mode,
                request: copy_request(request, request.body().clone())?,
                token,
                key: None,
            });
        }

        // Presence first: no cryptography on an incomplete request.
        let authorization = header(headers, AUTHORIZATION.as_str())?
            .ok_or_else(|| RepositoryError::Protocol("missing Authorization header".into()))?;
        let iv = header(headers, IV_HEADER)?
            .ok_or_else(|| RepositoryError::Protocol("missing IV header".into()))?;
        let iv = iv_from_header(iv)?;
        let body = std::str::from_utf8(request.body())
            .map_err(|_| RepositoryError::Protocol("body is not text".into()))?;
        if body.trim().is_empty() {
            return Err(RepositoryError::Protocol("missing encrypted body".into()));
        }

        let (key, token) = match mode {
            EncryptionMode::Repository => {
                let wrapped = WrappedKey::from_escaped(authorization)?;
                let key = self.repo.keys().identity().unwrap_key(&wrapped).map_err(|e| {
                    warn!(error = %e, "request key did not unwrap");
                    RepositoryError::from(e)
                })?;
                (key, None)
            }
            EncryptionMode::Session => {
                let token = strip_bearer(authorization);
                let session = self.repo.sessions().validate(&token).await?;
                (self.repo.sessions().session_key(&session)?, Some(token))
            }
            EncryptionMode::None => {
                return Err(RepositoryError::Protocol("plaintext mode has no key".into()));
            }
        };

        let path = open_path(mode, &iv, request.uri().path(), &key)?;
        let plaintext = EncryptedEnvelope::from_wire_text(mode, iv, body)?
            .open(&key)
            .map_err(|e| {
                warn!(%mode, "request body failed integrity check");
                RepositoryError::from(e)
            })?;

        let inner = Request::builder()
            .method(request.method().clone())
            .uri(path)
            .body(plaintext)
            .map_err(|e| RepositoryError::Protocol(format!("bad request path: {e}")))?;

        Ok(OpenedRequest {
            mode,
            request: inner,
            token,
            key: Some(key),
        })
    }

    /// Seal a response for the exchange `opened` belongs to.
    ///
    /// In repository mode the response gets a fresh key wrapped for
    /// `reply_to` when one is known, and reuses the request key otherwise.
    pub fn seal_response(
        &self,
        opened: &OpenedRequest,
        status: StatusCode,
        body: &Value,
        reply_to: Option<&PublicKey>,
    ) -> Result<Response<Vec<u8>>> {
        let obfuscate = self.repo.config().obfuscate_responses;
        let (status, payload) = if obfuscate {
            let wrapped = json!({ "code": status.as_u16(), "data": body.to_string() });
            (StatusCode::OK, serde_json::to_vec(&wrapped)?)
        } else {
            (status, serde_json::to_vec(body)?)
        };

        let builder = Response::builder()
            .status(status)
            .header(ENCRYPTION_HEADER, opened.mode.as_str());

        let Some(request_key) = &opened.key else {
            return builder
                .body(payload)
                .map_err(|e| RepositoryError::Internal(e.to_string()));
        };

        let (key, builder) = match (opened.mode, reply_to) {
            (EncryptionMode::Repository, Some(recipient)) => {
                let fresh = SymmetricKey::generate();
                let wrapped = WrappedKey::wrap(&fresh, recipient)?;
                (fresh, builder.header(AUTHORIZATION, wrapped.to_escaped()))
            }
            _ => (request_key.clone(), builder),
        };

        let envelope = EncryptedEnvelope::seal(opened.mode, &payload, &key);
        builder
            .header(IV_HEADER, iv_to_header(&envelope.iv))
            .body(envelope.payload_text().into_bytes())
            .map_err(|e| RepositoryError::Internal(e.to_string()))
    }
}

/// Plaintext rejection with `Encryption: none`.
fn reject(err: &RepositoryError) -> Response<Vec<u8>> {
    match err.kind() {
        ErrorKind::Integrity | ErrorKind::Auth => warn!(error = %err, "request rejected"),
        _ => debug!(error = %err, "request rejected"),
    }

    let body = json!({ "error": err.public_message() }).to_string().into_bytes();
    let mut response = Response::new(body);
    *response.status_mut() = err.status();
    response
        .headers_mut()
        .insert(ENCRYPTION_HEADER, HeaderValue::from_static("none"));
    response
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>> {
    headers
        .get(name)
        .map(|v| {
            v.to_str()
                .map_err(|_| RepositoryError::Protocol(format!("{name} header is not text")))
        })
        .transpose()
}

fn strip_bearer(value: &str) -> String {
    value.strip_prefix(BEARER).unwrap_or(value).trim().to_string()
}

fn copy_request(request: &Request<Vec<u8>>, body: Vec<u8>) -> Result<Request<Vec<u8>>> {
    Request::builder()
        .method(request.method().clone())
        .uri(request.uri().clone())
        .body(body)
        .map_err(|e| RepositoryError::Protocol(e.to_string()))
}

fn open_path(mode: EncryptionMode, iv: &Iv, segment: &str, key: &SymmetricKey) -> Result<String> {
    let text = decode_path_segment(segment.trim_start_matches('/'));
    let bytes = EncryptedEnvelope::from_wire_text(mode, *iv, &text)?
        .open(&key.path_key())
        .map_err(|e| {
            warn!(%mode, "request path failed integrity check");
            RepositoryError::from(e)
        })?;
    let path = String::from_utf8(bytes)
        .map_err(|_| RepositoryError::Protocol("request path is not text".into()))?;
    if !path.starts_with('/') {
        return Err(RepositoryError::Protocol("request path must be absolute".into()));
    }
    Ok(path)
}

/// Make escaped base64 safe as a single path segment.
pub(crate) fn encode_path_segment(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 8);
    for c in text.chars() {
        match c {
            '\\' => out.push_str("%5C"),
            '+' => out.push_str("%2B"),
            '/' => out.push_str("%2F"),
            '=' => out.push_str("%3D"),
            c => out.push(c),
        }
    }
    out
}

/// Inverse of [`encode_path_segment`].
pub(crate) fn decode_path_segment(segment: &str) -> String {
    segment
        .replace("%5C", "\\")
        .replace("%5c", "\\")
        .replace("%2B", "+")
        .replace("%2b", "+")
        .replace("%2F", "/")
        .replace("%2f", "/")
        .replace("%3D", "=")
        .replace("%3d", "=")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use strongroom_core::encode_escaped;
    use strongroom_testkit::generators;

    #[test]
    fn test_path_segment_roundtrip() {
        let text = encode_escaped(&[0xfb; 100]);
        let segment = encode_path_segment(&text);

        assert!(!segment.contains('/'));
        assert!(!segment.contains('\\'));
        assert_eq!(decode_path_segment(&segment), text);
    }

    #[test]
    fn test_segment_is_valid_uri() {
        let text = encode_escaped(b"/document?name=report");
        let uri: http::Uri = format!("/{}", encode_path_segment(&text)).parse().unwrap();
        assert_eq!(decode_path_segment(uri.path().trim_start_matches('/')), text);
    }

    #[test]
    fn test_reject_is_plaintext() {
        let response = reject(&RepositoryError::Integrity);
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[ENCRYPTION_HEADER], "none");
        let body: Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["error"], "unauthorized");
    }

    #[test]
    fn test_strip_bearer() {
        assert_eq!(strip_bearer("Bearer abc.def"), "abc.def");
        assert_eq!(strip_bearer("abc.def"), "abc.def");
    }

    proptest! {
        #[test]
        fn prop_sealed_path_survives_uri(
            path in generators::request_path(),
            key in generators::symmetric_key(),
            iv in generators::iv(),
        ) {
            let sealed = EncryptedEnvelope::seal_with_iv(
                EncryptionMode::Session,
                path.as_bytes(),
                &key.path_key(),
                iv,
            );
            let uri: http::Uri = format!("/{}", encode_path_segment(&sealed.payload_text()))
                .parse()
                .unwrap();

            let opened = open_path(EncryptionMode::Session, &iv, uri.path(), &key).unwrap();
            prop_assert_eq!(opened, path);
        }
    }
}
