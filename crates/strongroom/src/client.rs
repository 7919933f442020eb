//! Client side of the transport.

use http::header::AUTHORIZATION;
use http::{HeaderMap, Method, Request, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use strongroom_core::{
    iv_from_header, iv_to_header, EncryptedEnvelope, EncryptionMode, Iv, KeyPair, PublicKey,
    SymmetricKey, WrappedKey,
};

use crate::error::{RepositoryError, Result};
use crate::gateway::{encode_path_segment, ENCRYPTION_HEADER, IV_HEADER};
use crate::model::LoginReply;

#[derive(Clone)]
enum Channel {
    Plain,
    Anonymous { server: PublicKey },
    Session { token: String, key: SymmetricKey },
}

/// How a client talks to the repository.
#[derive(Clone)]
pub struct ClientChannel {
    channel: Channel,
}

/// State of one request/response exchange.
pub struct Exchange {
    mode: EncryptionMode,
    key: Option<SymmetricKey>,
}

/// A decrypted response.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    /// Status of the operation, unwrapped from obfuscation.
    pub code: StatusCode,
    pub data: Value,
}

impl Reply {
    /// Whether the operation succeeded.
    pub fn is_success(&self) -> bool {
        self.code.is_success()
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct Obfuscated {
    code: u16,
    data: String,
}

impl ClientChannel {
    /// Unencrypted requests. Only accepted by servers that do not require
    /// encryption.
    pub fn plaintext() -> Self {
        Self {
            channel: Channel::Plain,
        }
    }

    /// Repository mode, keyed per request for the server's public key.
    pub fn anonymous(server: PublicKey) -> Self {
        Self {
            channel: Channel::Anonymous { server },
        }
    }

    /// Session mode.
    pub fn session(token: impl Into<String>, key: SymmetricKey) -> Self {
        Self {
            channel: Channel::Session {
                token: token.into(),
                key,
            },
        }
    }

    /// Session mode from a login reply, unwrapping the session key.
    pub fn from_login(reply: &LoginReply, identity: &KeyPair) -> Result<Self> {
        let wrapped = WrappedKey::from_escaped(&reply.wrapped_key)?;
        let key = identity.unwrap_key(&wrapped)?;
        Ok(Self::session(reply.token.clone(), key))
    }

    /// The same session with a reissued token. The key is unchanged.
    pub fn with_token(&self, token: impl Into<String>) -> Result<Self> {
        match &self.channel {
            Channel::Session { key, .. } => Ok(Self::session(token, key.clone())),
            _ => Err(RepositoryError::Protocol("not a session channel".into())),
        }
    }

    /// The mode requests are sent in.
    pub fn mode(&self) -> EncryptionMode {
        match self.channel {
            Channel::Plain => EncryptionMode::None,
            Channel::Anonymous { .. } => EncryptionMode::Repository,
            Channel::Session { .. } => EncryptionMode::Session,
        }
    }

    /// Build a request for `path_and_query` with a JSON body.
    pub fn seal_request(
        &self,
        method: Method,
        path_and_query: &str,
        body: &Value,
    ) -> Result<(Request<Vec<u8>>, Exchange)> {
        let plaintext = serde_json::to_vec(body)?;
        let builder = Request::builder()
            .method(method)
            .header(ENCRYPTION_HEADER, self.mode().as_str());

        let (key, builder) = match &self.channel {
            Channel::Plain => {
                let request = builder
                    .uri(path_and_query)
                    .body(plaintext)
                    .map_err(|e| RepositoryError::Protocol(e.to_string()))?;
                let exchange = Exchange {
                    mode: EncryptionMode::None,
                    key: None,
                };
                return Ok((request, exchange));
            }
            Channel::Anonymous { server } => {
                let key = SymmetricKey::generate();
                let wrapped = WrappedKey::wrap(&key, server)?;
                (key, builder.header(AUTHORIZATION, wrapped.to_escaped()))
            }
            Channel::Session { token, key } => (
                key.clone(),
                builder.header(AUTHORIZATION, format!("Bearer {token}")),
            ),
        };

        let mode = self.mode();
        let iv = Iv::generate();
        let path = EncryptedEnvelope::seal_with_iv(mode, path_and_query.as_bytes(), &key.path_key(), iv);
        let sealed = EncryptedEnvelope::seal_with_iv(mode, &plaintext, &key, iv);

        let request = builder
            .uri(format!("/{}", encode_path_segment(&path.payload_text())))
            .header(IV_HEADER, iv_to_header(&iv))
            .body(sealed.payload_text().into_bytes())
            .map_err(|e| RepositoryError::Protocol(e.to_string()))?;

        Ok((
            request,
            Exchange {
                mode,
                key: Some(key),
            },
        ))
    }

    /// Decrypt a response. `identity` unwraps a fresh response key in
    /// repository mode.
    ///
    /// A plaintext answer to an encrypted request is unauthenticated, so it
    /// is only accepted as a rejection: its status must be an error and its
    /// body is taken as is.
    pub fn open_response(
        &self,
        exchange: &Exchange,
        response: &Response<Vec<u8>>,
        identity: Option<&KeyPair>,
    ) -> Result<Reply> {
        let headers = response.headers();
        let mode = match header(headers, ENCRYPTION_HEADER)? {
            Some(value) => value.parse::<EncryptionMode>()?,
            None => EncryptionMode::None,
        };

        let payload = match mode {
            EncryptionMode::None if exchange.mode != EncryptionMode::None => {
                if response.status().is_success() {
                    warn!(status = %response.status(), "plaintext success to an encrypted request");
                    return Err(RepositoryError::Integrity);
                }
                return Ok(Reply {
                    code: response.status(),
                    data: serde_json::from_slice(response.body())?,
                });
            }
            EncryptionMode::None => response.body().clone(),
            _ => {
                if mode != exchange.mode {
                    return Err(RepositoryError::Protocol(format!(
                        "response in {mode} mode to a {} request",
                        exchange.mode
                    )));
                }
                let key = match (header(headers, AUTHORIZATION.as_str())?, identity) {
                    (Some(wrapped), Some(identity)) => {
                        identity.unwrap_key(&WrappedKey::from_escaped(wrapped)?)?
                    }
                    (Some(_), None) => {
                        return Err(RepositoryError::Protocol(
                            "response key wrapped but no identity given".into(),
                        ));
                    }
                    (None, _) => exchange.key.clone().ok_or_else(|| {
                        RepositoryError::Protocol("no key for encrypted response".into())
                    })?,
                };
                let iv = header(headers, IV_HEADER)?
                    .ok_or_else(|| RepositoryError::Protocol("missing IV header".into()))?;
                let text = std::str::from_utf8(response.body())
                    .map_err(|_| RepositoryError::Protocol("body is not text".into()))?;
                EncryptedEnvelope::from_wire_text(mode, iv_from_header(iv)?, text)?.open(&key)?
            }
        };

        let value: Value = serde_json::from_slice(&payload)?;
        if response.status() == StatusCode::OK {
            if let Ok(inner) = serde_json::from_value::<Obfuscated>(value.clone()) {
                let code = StatusCode::from_u16(inner.code)
                    .map_err(|e| RepositoryError::Protocol(e.to_string()))?;
                return Ok(Reply {
                    code,
                    data: serde_json::from_str(&inner.data)?,
                });
            }
        }
        Ok(Reply {
            code: response.status(),
            data: value,
        })
    }
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
