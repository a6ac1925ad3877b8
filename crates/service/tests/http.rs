//! Router plumbing: status endpoints, headers and service wiring

mod common;

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use http::{Method, StatusCode};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use url::Url;

use ::common::deadline::Deadline;
use ::common::path::ResourcePath;

use service::{Config, VerifierConfig};

use common::{header, setup_test_env, setup_with, test_config, text, Call, ALICE, ALICE_TOKEN, BOB_TOKEN};

const ALICE_KEY: &str = include_str!("../../common/tests/fixtures/alice.key.pem");
const ALICE_JWK: &str = include_str!("../../common/tests/fixtures/alice.jwk.json");

const OPEN_ACL: &str = r#"
@prefix acl: <http://www.w3.org/ns/auth/acl#>.
@prefix foaf: <http://xmlns.com/foaf/0.1/>.

<#everyone> a acl:Authorization;
    acl:agentClass foaf:Agent;
    acl:accessTo <./>;
    acl:default <./>;
    acl:mode acl:Read, acl:Write.
"#;

#[tokio::test]
async fn test_status_endpoints() {
    let server = setup_test_env().await;

    let response = server.send(Call::new(Method::GET, "/.well-known/pod/livez")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = server.send(Call::new(Method::GET, "/.well-known/pod/readyz")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(text(response).await.contains("\"ok\""));

    let response = server.send(Call::new(Method::GET, "/.well-known/pod/version")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(text(response).await.contains("version"));
}

#[tokio::test]
async fn test_options_lists_allowed_methods() {
    let server = setup_test_env().await;
    server.seed_acl("/", OPEN_ACL).await;
    server.seed("/c/a.txt", "a", "text/plain").await;

    let response = server.send(Call::new(Method::OPTIONS, "/c/")).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let allow = header(&response, "allow").unwrap();
    assert!(allow.contains("POST"));
    assert!(allow.contains("PATCH"));

    let response = server.send(Call::new(Method::OPTIONS, "/c/a.txt")).await;
    let allow = header(&response, "allow").unwrap();
    assert!(!allow.contains("POST"));
    assert_eq!(header(&response, "accept-patch"), Some("text/n3"));
}

#[tokio::test]
async fn test_cors_preflight_is_answered_by_cors() {
    let server = setup_test_env().await;
    server.seed_acl("/", OPEN_ACL).await;

    let response = server
        .send(
            Call::new(Method::OPTIONS, "/c/")
                .header("origin", "https://app.example")
                .header("access-control-request-method", "PUT"),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(header(&response, "access-control-allow-methods")
        .unwrap()
        .contains("PUT"));
    assert!(header(&response, "allow").is_none());

    // an origin alone is not a preflight
    let response = server
        .send(Call::new(Method::OPTIONS, "/c/").header("origin", "https://app.example"))
        .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(header(&response, "allow").is_some());
}

#[tokio::test]
async fn test_post_to_document_is_not_allowed() {
    let server = setup_test_env().await;
    server.seed_acl("/", OPEN_ACL).await;
    server.seed("/a.txt", "a", "text/plain").await;

    let response = server
        .send(Call::new(Method::POST, "/a.txt").body("b", "text/plain"))
        .await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert!(header(&response, "allow").is_some());
}

#[tokio::test]
async fn test_missing_resource_and_bad_path() {
    let server = setup_test_env().await;
    server.seed_acl("/", OPEN_ACL).await;

    let response = server.send(Call::new(Method::GET, "/nothing.txt")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = server.send(Call::new(Method::GET, "/a/../../etc/passwd")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_root_is_refused() {
    let server = setup_test_env().await;
    server.seed_acl("/", OPEN_ACL).await;

    let response = server.send(Call::new(Method::DELETE, "/")).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let response = server.send(Call::new(Method::GET, "/")).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_put_under_document_is_not_found() {
    let server = setup_test_env().await;
    server.seed_acl("/", OPEN_ACL).await;
    server.seed("/a.txt", "a", "text/plain").await;

    let response = server
        .send(Call::new(Method::PUT, "/a.txt/b.txt").body("b", "text/plain"))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_cors_exposes_pod_headers() {
    let server = setup_test_env().await;
    server.seed_acl("/", OPEN_ACL).await;
    server.seed("/a.txt", "a", "text/plain").await;

    let response = server
        .send(Call::new(Method::GET, "/a.txt").header("origin", "https://app.example"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "access-control-allow-origin"), Some("*"));
    let exposed = header(&response, "access-control-expose-headers")
        .unwrap()
        .to_ascii_lowercase();
    assert!(exposed.contains("wac-allow"));
    assert!(exposed.contains("location"));
}

#[tokio::test]
async fn test_owner_gets_seeded_root_acl() {
    let server = setup_with(Config {
        owner: Some(ALICE.to_string()),
        ..test_config()
    })
    .await;

    // public read
    let response = server.send(Call::new(Method::GET, "/")).await;
    assert_eq!(response.status(), StatusCode::OK);

    // owner write, everyone else refused
    let response = server
        .send(
            Call::new(Method::PUT, "/notes.txt")
                .token(ALICE_TOKEN)
                .body("mine", "text/plain"),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let response = server
        .send(
            Call::new(Method::PUT, "/notes.txt")
                .token(BOB_TOKEN)
                .body("theirs", "text/plain"),
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // the owner controls the ACL
    let response = server
        .send(Call::new(Method::GET, "/.acl").token(ALICE_TOKEN))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // seeding again leaves an existing ACL alone
    let owner = ::common::agent::WebId::parse(ALICE).unwrap();
    assert!(!server.state.seed_root_acl(&owner).await.unwrap());
}

#[tokio::test]
async fn test_jwt_bearer_tokens() {
    let secret = "test-secret";
    let server = setup_with(Config {
        verifier: Some(VerifierConfig::Jwt {
            public_key_path: None,
            secret: Some(secret.to_string()),
            issuer: None,
            audience: None,
        }),
        ..test_config()
    })
    .await;
    server
        .seed_acl(
            "/",
            r#"
@prefix acl: <http://www.w3.org/ns/auth/acl#>.

<#alice> a acl:Authorization;
    acl:agent <https://alice.example/#me>;
    acl:accessTo </>;
    acl:default </>;
    acl:mode acl:Read.
"#,
        )
        .await;

    let exp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
        + 600;
    let token = encode(
        &Header::default(),
        &serde_json::json!({ "webid": ALICE, "exp": exp }),
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap();

    let response = server.send(Call::new(Method::GET, "/").token(&token)).await;
    assert_eq!(response.status(), StatusCode::OK);

    // an unverifiable token leaves the request anonymous
    let response = server
        .send(Call::new(Method::GET, "/").token("not-a-jwt"))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_base_path_prefix() {
    let server = setup_with(Config {
        base_url: Some(Url::parse("http://pod.example/alice/").unwrap()),
        ..test_config()
    })
    .await;
    server.seed_acl("/", OPEN_ACL).await;
    server.seed("/a.txt", "a", "text/plain").await;

    let response = server.send(Call::new(Method::GET, "/alice/a.txt")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(text(response).await, "a");

    let response = server.send(Call::new(Method::GET, "/bob/a.txt")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

fn dpop_proof(method: &str, htu: &str) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.typ = Some("dpop+jwt".to_string());
    header.jwk = Some(serde_json::from_str(ALICE_JWK).unwrap());
    encode(
        &header,
        &serde_json::json!({ "htm": method, "htu": htu, "iat": now_secs(), "jti": "p1" }),
        &EncodingKey::from_rsa_pem(ALICE_KEY.as_bytes()).unwrap(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_dpop_behind_tls_proxy() {
    let server = setup_test_env().await;
    server
        .seed_acl(
            "/",
            r#"
@prefix acl: <http://www.w3.org/ns/auth/acl#>.

<#alice> a acl:Authorization;
    acl:agent <https://alice.example/#me>;
    acl:accessTo </notes.txt>;
    acl:default </>;
    acl:mode acl:Read, acl:Write.
"#,
        )
        .await;

    // the client addressed the proxy's public https URL
    let proof = dpop_proof("PUT", "https://pod.example/notes.txt");
    let authorization = format!("DPoP {}", ALICE_TOKEN);
    let response = server
        .send(
            Call::new(Method::PUT, "/notes.txt")
                .header("authorization", &authorization)
                .header("dpop", &proof)
                .header("x-forwarded-proto", "https")
                .header("x-forwarded-host", "pod.example")
                .body("v1", "text/plain"),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    // without the forwarded headers the proof names the wrong URL
    let response = server
        .send(
            Call::new(Method::PUT, "/notes.txt")
                .header("authorization", &authorization)
                .header("dpop", &proof)
                .body("v2", "text/plain"),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(server.stored("/notes.txt").await.as_deref(), Some("v1"));
}

#[tokio::test]
async fn test_lock_timeout_is_service_unavailable() {
    let server = setup_with(Config {
        request_timeout: Duration::from_millis(50),
        ..test_config()
    })
    .await;
    server.seed_acl("/", OPEN_ACL).await;
    server.seed("/busy.txt", "a", "text/plain").await;

    let busy = ResourcePath::parse("/busy.txt").unwrap();
    let guard = server
        .state
        .locks()
        .write(&busy, &Deadline::none())
        .await
        .unwrap();

    let response = server.send(Call::new(Method::GET, "/busy.txt")).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(text(response).await, "request timed out");

    drop(guard);
    let response = server.send(Call::new(Method::GET, "/busy.txt")).await;
    assert_eq!(response.status(), StatusCode::OK);
}
