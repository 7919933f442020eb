//! Routing of decrypted requests to repository operations.
//!
//! The gateway hands over the plaintext request; parameters travel as a JSON
//! body on every route, the path only selects the operation.

use base64::{engine::general_purpose::STANDARD, Engine};
use http::{Method, Request, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use strongroom_core::PublicKey;
use strongroom_perms::{DocumentPermission, Permission};
use strongroom_session::AuthFailure;
use strongroom_store::Store;

use crate::error::{RepositoryError, Result};
use crate::model::{
    DocumentFilter, DocumentSummary, LoginReply, LoginRequest, NewDocument, Registration,
};
use crate::repository::{Repository, Session};

/// Outcome of a routed request.
#[derive(Debug, Clone)]
pub struct Handled {
    pub status: StatusCode,
    pub body: Value,
    /// Public key the response may be wrapped for, when the request carried
    /// or proved one.
    pub reply_to: Option<PublicKey>,
}

impl Handled {
    fn ok(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body,
            reply_to: None,
        }
    }

    fn created(body: Value) -> Self {
        Self {
            status: StatusCode::CREATED,
            ..Self::ok(body)
        }
    }
}

#[derive(Deserialize)]
struct NewOrganization {
    name: String,
    founder: Registration,
}

#[derive(Deserialize)]
struct RoleParam {
    role: String,
}

#[derive(Deserialize)]
struct UsernameParam {
    username: String,
}

#[derive(Deserialize)]
struct OptionalUsername {
    username: Option<String>,
}

#[derive(Deserialize)]
struct Activation {
    #[serde(alias = "role", alias = "username")]
    name: String,
    active: bool,
}

#[derive(Deserialize)]
struct RolePermission {
    role: String,
    permission: Permission,
}

#[derive(Deserialize)]
struct RoleSubject {
    role: String,
    username: String,
}

#[derive(Deserialize)]
struct PermissionQuery {
    permission: Option<String>,
}

#[derive(Deserialize)]
struct DocumentName {
    name: String,
}

#[derive(Deserialize)]
struct AclChange {
    document: String,
    role: String,
    permission: DocumentPermission,
}

#[derive(Serialize)]
struct TokenReply<'a> {
    token: &'a str,
}

/// Route a plaintext request. `token` is the bearer token of a session-mode
/// request.
pub async fn dispatch<S: Store + ?Sized>(
    repo: &Repository<S>,
    request: &Request<Vec<u8>>,
    token: Option<&str>,
) -> Result<Handled> {
    let method = request.method();
    let path = request.uri().path().trim_end_matches('/');
    let body = request.body().as_slice();
    debug!(%method, %path, "dispatching request");

    if let Some(handle) = path.strip_prefix("/file/") {
        if *method == Method::GET {
            let content = repo.get_document_blob(handle).await?;
            return Ok(Handled::ok(json!({ "content": STANDARD.encode(content) })));
        }
    }

    match (method, path) {
        (&Method::POST, "/organization") => {
            let req: NewOrganization = parse(body)?;
            let org = repo.create_organization(&req.name, &req.founder).await?;
            Ok(Handled {
                reply_to: Some(req.founder.parsed_key()?),
                ..Handled::created(serde_json::to_value(org)?)
            })
        }
        (&Method::GET, "/organization") => {
            let orgs = repo.list_organizations().await?;
            Ok(Handled::ok(serde_json::to_value(orgs)?))
        }
        (&Method::POST, "/session") => {
            let login: LoginRequest = parse(body)?;
            let issued = repo.create_session(&login).await?;
            let link = repo
                .store()
                .get_link(&login.organization, &login.username)
                .await?
                .ok_or(RepositoryError::Auth(AuthFailure::CredentialsInvalid))?;
            let reply = LoginReply {
                token: issued.issued.token,
                wrapped_key: issued.wrapped_key.to_escaped(),
            };
            Ok(Handled {
                reply_to: Some(link.public_key),
                ..Handled::created(serde_json::to_value(reply)?)
            })
        }
        _ => {
            let token = token.ok_or(RepositoryError::Auth(AuthFailure::NoSession))?;
            let session = repo.authenticate(token).await?;
            dispatch_session(repo, &session, method, path, body).await
        }
    }
}

async fn dispatch_session<S: Store + ?Sized>(
    repo: &Repository<S>,
    session: &Session,
    method: &Method,
    path: &str,
    body: &[u8],
) -> Result<Handled> {
    match (method, path) {
        // Session roles
        (&Method::POST, "/session/role") => {
            let req: RoleParam = parse(body)?;
            let issued = repo.assume_role(session, &req.role).await?;
            Ok(Handled::ok(serde_json::to_value(TokenReply { token: &issued.token })?))
        }
        (&Method::DELETE, "/session/role") => {
            let req: RoleParam = parse(body)?;
            let issued = repo.drop_role(session, &req.role).await?;
            Ok(Handled::ok(serde_json::to_value(TokenReply { token: &issued.token })?))
        }
        (&Method::GET, "/session/role") => {
            Ok(Handled::ok(serde_json::to_value(repo.list_session_roles(session))?))
        }

        // Subjects
        (&Method::POST, "/subject") => {
            let req: Registration = parse(body)?;
            let listing = repo.add_subject(session, &req).await?;
            Ok(Handled::created(serde_json::to_value(listing)?))
        }
        (&Method::PATCH, "/subject/activation") => {
            let req: Activation = parse(body)?;
            if req.active {
                repo.activate_subject(session, &req.name).await?;
            } else {
                repo.suspend_subject(session, &req.name).await?;
            }
            Ok(Handled::ok(json!({ "username": req.name, "active": req.active })))
        }
        (&Method::GET, "/subject") => {
            let req: OptionalUsername = parse(body)?;
            let subjects = repo.list_subjects(session, req.username.as_deref()).await?;
            Ok(Handled::ok(serde_json::to_value(subjects)?))
        }
        (&Method::GET, "/subject/role") => {
            let req: UsernameParam = parse(body)?;
            let roles = repo.list_subject_roles(session, &req.username).await?;
            Ok(Handled::ok(serde_json::to_value(roles)?))
        }

        // Roles
        (&Method::POST, "/role") => {
            let req: RoleParam = parse(body)?;
            let role = repo.add_role(session, &req.role).await?;
            Ok(Handled::created(serde_json::to_value(role)?))
        }
        (&Method::GET, "/role") => {
            let req: PermissionQuery = parse(body)?;
            list_roles(repo, session, req.permission.as_deref()).await
        }
        (&Method::PATCH, "/role/activation") => {
            let req: Activation = parse(body)?;
            if req.active {
                repo.reactivate_role(session, &req.name).await?;
            } else {
                repo.suspend_role(session, &req.name).await?;
            }
            Ok(Handled::ok(json!({ "role": req.name, "active": req.active })))
        }
        (&Method::POST, "/role/permission") => {
            let req: RolePermission = parse(body)?;
            repo.add_permission(session, &req.role, req.permission).await?;
            let perms = repo.list_role_permissions(session, &req.role).await?;
            Ok(Handled::ok(serde_json::to_value(perms)?))
        }
        (&Method::DELETE, "/role/permission") => {
            let req: RolePermission = parse(body)?;
            repo.remove_permission(session, &req.role, req.permission).await?;
            let perms = repo.list_role_permissions(session, &req.role).await?;
            Ok(Handled::ok(serde_json::to_value(perms)?))
        }
        (&Method::GET, "/role/permission") => {
            let req: RoleParam = parse(body)?;
            let perms = repo.list_role_permissions(session, &req.role).await?;
            Ok(Handled::ok(serde_json::to_value(perms)?))
        }
        (&Method::POST, "/role/subject") => {
            let req: RoleSubject = parse(body)?;
            repo.add_subject_to_role(session, &req.role, &req.username).await?;
            let members = repo.list_role_subjects(session, &req.role).await?;
            Ok(Handled::ok(serde_json::to_value(members)?))
        }
        (&Method::DELETE, "/role/subject") => {
            let req: RoleSubject = parse(body)?;
            repo.remove_subject_from_role(session, &req.role, &req.username)
                .await?;
            let members = repo.list_role_subjects(session, &req.role).await?;
            Ok(Handled::ok(serde_json::to_value(members)?))
        }
        (&Method::GET, "/role/subject") => {
            let req: RoleParam = parse(body)?;
            let members = repo.list_role_subjects(session, &req.role).await?;
            Ok(Handled::ok(serde_json::to_value(members)?))
        }

        // Documents
        (&Method::POST, "/document") => {
            let req: NewDocument = parse(body)?;
            let doc = repo.add_document(session, &req).await?;
            Ok(Handled::created(serde_json::to_value(DocumentSummary::from(&doc))?))
        }
        (&Method::GET, "/document") => {
            let filter: DocumentFilter = parse(body)?;
            let docs = repo.list_documents(session, &filter).await?;
            Ok(Handled::ok(serde_json::to_value(docs)?))
        }
        (&Method::DELETE, "/document") => {
            let req: DocumentName = parse(body)?;
            let handle = repo.delete_document(session, &req.name).await?;
            Ok(Handled::ok(json!({ "file_handle": handle })))
        }
        (&Method::GET, "/document/metadata") => {
            let req: DocumentName = parse(body)?;
            let doc = repo.get_document_metadata(session, &req.name).await?;
            Ok(Handled::ok(serde_json::to_value(doc)?))
        }
        (&Method::POST, "/document/acl") => {
            let req: AclChange = parse(body)?;
            let acl = repo
                .acl_add(session, &req.document, &req.role, req.permission)
                .await?;
            Ok(Handled::ok(serde_json::to_value(acl)?))
        }
        (&Method::DELETE, "/document/acl") => {
            let req: AclChange = parse(body)?;
            let acl = repo
                .acl_remove(session, &req.document, &req.role, req.permission)
                .await?;
            Ok(Handled::ok(serde_json::to_value(acl)?))
        }

        _ => Err(RepositoryError::NotFound(format!("route {method} {path}"))),
    }
}

/// `GET /role`: all roles, or the roles holding a permission. A document
/// permission lists roles per document.
async fn list_roles<S: Store + ?Sized>(
    repo: &Repository<S>,
    session: &Session,
    permission: Option<&str>,
) -> Result<Handled> {
    let Some(name) = permission else {
        let roles = repo.list_roles(session).await?;
        return Ok(Handled::ok(serde_json::to_value(roles)?));
    };

    if let Ok(permission) = name.parse::<Permission>() {
        let roles = repo.list_roles_with_permission(session, permission).await?;
        return Ok(Handled::ok(serde_json::to_value(roles)?));
    }
    let permission: DocumentPermission = name.parse()?;
    let roles = repo
        .list_document_roles_with_permission(session, permission)
        .await?;
    Ok(Handled::ok(serde_json::to_value(roles)?))
}

/// Parse a JSON body. An empty body reads as `{}`.
fn parse<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    let body = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}".as_slice()
    } else {
        body
    };
    Ok(serde_json::from_slice(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use proptest::prelude::*;
    use strongroom_testkit::generators;

    use strongroom_session::ServerKeys;
    use strongroom_store::MemoryStore;
    use strongroom_testkit::TestSubject;

    use crate::config::RepositoryConfig;
    use crate::error::ErrorKind;

    fn repo() -> Repository<MemoryStore> {
        Repository::new(
            Arc::new(MemoryStore::new()),
            Arc::new(ServerKeys::generate()),
            RepositoryConfig::default(),
        )
        .unwrap()
    }

    fn request(method: Method, path: &str, body: Value) -> Request<Vec<u8>> {
        Request::builder()
            .method(method)
            .uri(path)
            .body(serde_json::to_vec(&body).unwrap())
            .unwrap()
    }

    async fn bootstrap(repo: &Repository<MemoryStore>, alice: &TestSubject) -> String {
        let founder = Registration::new("alice", "Alice", "alice@example.org", &alice.public_key());
        let created = dispatch(
            repo,
            &request(Method::POST, "/organization", json!({ "name": "Acme", "founder": founder })),
            None,
        )
        .await
        .unwrap();
        assert_eq!(created.status, StatusCode::CREATED);
        assert_eq!(created.reply_to, Some(alice.public_key()));

        let login = json!({
            "organization": "Acme",
            "username": "alice",
            "password": alice.password,
            "credentials": STANDARD.encode(&alice.credentials),
        });
        let session = dispatch(repo, &request(Method::POST, "/session", login), None)
            .await
            .unwrap();
        let token = session.body["token"].as_str().unwrap().to_string();

        let assumed = dispatch(
            repo,
            &request(Method::POST, "/session/role", json!({ "role": "Managers" })),
            Some(&token),
        )
        .await
        .unwrap();
        assumed.body["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_anonymous_routes() {
        let repo = repo();
        let alice = TestSubject::new("alice");
        bootstrap(&repo, &alice).await;

        let orgs = dispatch(&repo, &request(Method::GET, "/organization", json!({})), None)
            .await
            .unwrap();
        assert_eq!(orgs.body[0]["name"], "Acme");
    }

    #[tokio::test]
    async fn test_session_route_needs_token() {
        let repo = repo();
        let err = dispatch(&repo, &request(Method::GET, "/subject", json!({})), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
    }

    #[tokio::test]
    async fn test_role_routes() {
        let repo = repo();
        let alice = TestSubject::new("alice");
        let token = bootstrap(&repo, &alice).await;

        let roles = dispatch(&repo, &request(Method::GET, "/session/role", json!({})), Some(&token))
            .await
            .unwrap();
        assert_eq!(roles.body, json!(["Managers"]));

        dispatch(&repo, &request(Method::POST, "/role", json!({ "role": "Clerks" })), Some(&token))
            .await
            .unwrap();
        let perms = dispatch(
            &repo,
            &request(
                Method::POST,
                "/role/permission",
                json!({ "role": "Clerks", "permission": "DOC_NEW" }),
            ),
            Some(&token),
        )
        .await
        .unwrap();
        assert_eq!(perms.body, json!(["DOC_NEW"]));

        let with_perm = dispatch(
            &repo,
            &request(Method::GET, "/role", json!({ "permission": "DOC_NEW" })),
            Some(&token),
        )
        .await
        .unwrap();
        assert_eq!(with_perm.body, json!(["Clerks", "Managers"]));
    }

    #[tokio::test]
    async fn test_document_routes() {
        let repo = repo();
        let alice = TestSubject::new("alice");
        let token = bootstrap(&repo, &alice).await;

        let upload = NewDocument::new(
            "report",
            strongroom_store::DocumentCipherMeta {
                alg: "chacha20".into(),
                key: "k".into(),
                iv: "v".into(),
            },
            b"sealed",
        );
        let created = dispatch(
            &repo,
            &request(Method::POST, "/document", serde_json::to_value(&upload).unwrap()),
            Some(&token),
        )
        .await
        .unwrap();
        assert_eq!(created.status, StatusCode::CREATED);

        let file = dispatch(
            &repo,
            &request(Method::GET, &format!("/file/{}", upload.file_handle), json!({})),
            None,
        )
        .await
        .unwrap();
        assert_eq!(file.body["content"], upload.content);

        let listed = dispatch(
            &repo,
            &request(Method::GET, "/role", json!({ "permission": "DOC_READ" })),
            Some(&token),
        )
        .await
        .unwrap();
        assert_eq!(listed.body, json!({ "report": ["Managers"] }));
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let repo = repo();
        let alice = TestSubject::new("alice");
        let token = bootstrap(&repo, &alice).await;
        let err = dispatch(&repo, &request(Method::PUT, "/nowhere", json!({})), Some(&token))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_empty_body_reads_as_object() {
        let parsed: OptionalUsername = parse(b"").unwrap();
        assert!(parsed.username.is_none());
        assert!(parse::<RoleParam>(b"{}").is_err());
    }

    proptest! {
        #[test]
        fn prop_permission_bodies_parse(
            role in generators::role_name(),
            permission in generators::permission(),
            doc_permission in generators::document_permission(),
        ) {
            let body = json!({ "role": role, "permission": permission.as_str() }).to_string();
            let parsed: RolePermission = parse(body.as_bytes()).unwrap();
            prop_assert_eq!(parsed.role, role.clone());
            prop_assert_eq!(parsed.permission, permission);

            let body = json!({
                "document": "report",
                "role": role,
                "permission": doc_permission.as_str(),
            })
            .to_string();
            let parsed: AclChange = parse(body.as_bytes()).unwrap();
            prop_assert_eq!(parsed.permission, doc_permission);
        }
    }
}
