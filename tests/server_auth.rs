//! Bearer token validation against a mock JWKS endpoint.
//!
//! Tokens are signed with the RSA key in `fixtures/jwt_signing_key.pem`;
//! `fixtures/jwks.json` publishes its public half as `test-signing-key`.

use std::time::Duration;

use actix_web::http::header::AUTHORIZATION;
use actix_web::http::StatusCode;
use actix_web::test::TestRequest;
use actix_web::ResponseError;
use chrono::Utc;
use entra_vm_api::server::auth::{expected_issuers, AuthError, EntraIdAuth, Principal};
use entra_vm_api::ServerConfig;
use httpmock::prelude::*;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};

const TENANT_ID: &str = "11111111-2222-3333-4444-555555555555";
const CLIENT_ID: &str = "api://vm-api";
const KEY_ID: &str = "test-signing-key";
const JWKS_PATH: &str = "/discovery/v2.0/keys";

fn jwks_mock(server: &MockServer) -> httpmock::Mock<'_> {
    server.mock(|when, then| {
        when.method(GET).path(JWKS_PATH);
        then.status(200)
            .header("content-type", "application/json")
            .body(include_str!("fixtures/jwks.json"));
    })
}

fn auth_for(server: &MockServer) -> EntraIdAuth {
    let config = ServerConfig {
        tenant_id: Some(TENANT_ID.to_string()),
        client_id: Some(CLIENT_ID.to_string()),
        bind_addr: "127.0.0.1:0".to_string(),
    };
    EntraIdAuth::new(&config).with_jwks_url(server.url(JWKS_PATH))
}

fn claims(expires_in: i64) -> Value {
    let [v2_issuer, _] = expected_issuers(TENANT_ID);
    json!({
        "aud": CLIENT_ID,
        "iss": v2_issuer,
        "sub": "caller-app",
        "exp": Utc::now().timestamp() + expires_in,
    })
}

fn sign(kid: &str, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    let key = EncodingKey::from_rsa_pem(include_bytes!("fixtures/jwt_signing_key.pem")).unwrap();
    encode(&header, claims, &key).unwrap()
}

async fn authenticate(auth: &EntraIdAuth, token: &str) -> Result<Principal, AuthError> {
    let req = TestRequest::default()
        .insert_header((AUTHORIZATION, format!("Bearer {token}")))
        .to_http_request();
    auth.authenticate(&req).await
}

#[actix_web::test]
async fn valid_token_is_accepted() {
    let server = MockServer::start();
    let jwks = jwks_mock(&server);
    let auth = auth_for(&server);

    let principal = authenticate(&auth, &sign(KEY_ID, &claims(3600)))
        .await
        .unwrap();

    match principal {
        Principal::Token(claims) => {
            assert_eq!(claims.sub.as_deref(), Some("caller-app"));
            assert!(claims.aud.contains(CLIENT_ID));
        }
        other => panic!("expected a token principal, got {other:?}"),
    }
    jwks.assert_calls(1);
}

#[actix_web::test]
async fn expired_token_is_unauthorized() {
    let server = MockServer::start();
    jwks_mock(&server);
    let auth = auth_for(&server);

    let err = authenticate(&auth, &sign(KEY_ID, &claims(-3600)))
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::Jwt(_)), "got {err:?}");
    assert_eq!(err.error_response().status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn unknown_key_id_is_rejected() {
    let server = MockServer::start();
    let jwks = jwks_mock(&server);
    let auth = auth_for(&server);

    let err = authenticate(&auth, &sign("rotated-away", &claims(3600)))
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::UnknownKey), "got {err:?}");
    jwks.assert_calls(1);
}

#[actix_web::test]
async fn wrong_audience_is_rejected() {
    let server = MockServer::start();
    jwks_mock(&server);
    let auth = auth_for(&server);

    let mut claims = claims(3600);
    claims["aud"] = json!("api://someone-else");
    let err = authenticate(&auth, &sign(KEY_ID, &claims)).await.unwrap_err();

    assert!(matches!(err, AuthError::InvalidAudience), "got {err:?}");
}

#[actix_web::test]
async fn v1_issuer_is_accepted() {
    let server = MockServer::start();
    jwks_mock(&server);
    let auth = auth_for(&server);

    let [_, v1_issuer] = expected_issuers(TENANT_ID);
    let mut claims = claims(3600);
    claims["iss"] = json!(v1_issuer);

    let principal = authenticate(&auth, &sign(KEY_ID, &claims)).await.unwrap();
    assert!(matches!(principal, Principal::Token(_)));
}

#[actix_web::test]
async fn fresh_key_set_is_not_fetched_again() {
    let server = MockServer::start();
    let jwks = jwks_mock(&server);
    let auth = auth_for(&server);
    let token = sign(KEY_ID, &claims(3600));

    authenticate(&auth, &token).await.unwrap();
    jwks.assert_calls(1);

    authenticate(&auth, &token).await.unwrap();
    jwks.assert_calls(1);
}

#[actix_web::test]
async fn stale_key_set_is_fetched_again() {
    let server = MockServer::start();
    let jwks = jwks_mock(&server);
    let auth = auth_for(&server).with_jwks_ttl(Duration::ZERO);
    let token = sign(KEY_ID, &claims(3600));

    authenticate(&auth, &token).await.unwrap();
    authenticate(&auth, &token).await.unwrap();

    jwks.assert_calls(2);
}

#[actix_web::test]
async fn unreachable_jwks_is_unauthorized() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path(JWKS_PATH);
        then.status(500);
    });
    let auth = auth_for(&server);

    let err = authenticate(&auth, &sign(KEY_ID, &claims(3600)))
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::Jwks(_)), "got {err:?}");
    assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
}
