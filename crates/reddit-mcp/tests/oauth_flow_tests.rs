//! Integration tests for the OAuth 2.1 authorization flow.
//!
//! Drives the full lifecycle against stub upstream collaborators:
//! discovery → registration → authorize → upstream callback → token
//! exchange → refresh.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::json;
use tower::ServiceExt;
use url::Url;

use reddit_mcp::config::Config;
use reddit_mcp::server::oauth::TokenCodec;
use reddit_mcp::server::test_support::{StubApi, StubAuth};
use reddit_mcp::server::McpServer;

// RFC 7636 Appendix B test vector
const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

const CLIENT_ID: &str = "mcp-public-client";
const REDIRECT: &str = "http://localhost:5173/cb";
const ISSUER: &str = "https://gateway.example.com";

fn build_server_with(auth: Arc<StubAuth>) -> McpServer {
    McpServer::with_collaborators(
        Config::for_testing("http://mock.localhost"),
        auth,
        Arc::new(StubApi::default()),
    )
}

fn build_server() -> McpServer {
    build_server_with(Arc::new(StubAuth::default()))
}

fn codec() -> TokenCodec {
    TokenCodec::new(b"0123456789abcdef0123456789abcdef".to_vec(), ISSUER.into(), ISSUER.into())
}

fn form_encode(pairs: &[(&str, &str)]) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (k, v) in pairs {
        serializer.append_pair(k, v);
    }
    serializer.finish()
}

async fn get(server: &McpServer, uri: &str) -> axum::response::Response {
    server
        .router()
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn post_form(server: &McpServer, uri: &str, body: String) -> axum::response::Response {
    server
        .router()
        .oneshot(
            Request::post(uri)
                .header("Content-Type", "application/x-www-form-urlencoded")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn location_url(response: &axum::response::Response) -> Url {
    let location = response.headers().get("Location").unwrap().to_str().unwrap();
    Url::parse(location).unwrap()
}

fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs().find(|(k, _)| k == name).map(|(_, v)| v.into_owned())
}

/// Run the authorize step; returns the upstream `state` parameter.
async fn run_authorize(server: &McpServer) -> String {
    let uri = format!(
        "/oauth/authorize?client_id={CLIENT_ID}&redirect_uri={}&response_type=code\
         &code_challenge={CHALLENGE}&code_challenge_method=S256&state=abc",
        urlencode(REDIRECT)
    );
    let response = get(server, &uri).await;
    assert_eq!(response.status(), StatusCode::FOUND);

    let upstream = location_url(&response);
    assert!(upstream.path().ends_with("/api/v1/authorize"));
    assert_eq!(query_param(&upstream, "client_id").as_deref(), Some("test-reddit-id"));
    query_param(&upstream, "state").unwrap()
}

/// Run authorize + upstream callback; returns the one-shot code.
async fn obtain_code(server: &McpServer) -> String {
    let upstream_state = run_authorize(server).await;
    let response = get(
        server,
        &format!("/oauth/reddit/callback?code=xyz&state={upstream_state}"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FOUND);

    let back = location_url(&response);
    assert!(back.as_str().starts_with(REDIRECT));
    assert_eq!(query_param(&back, "state").as_deref(), Some("abc"));
    query_param(&back, "code").unwrap()
}

fn urlencode(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

// ─── Discovery ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_authorization_server_metadata() {
    let server = build_server();
    let response = get(&server, "/.well-known/oauth-authorization-server").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["issuer"], ISSUER);
    assert_eq!(json["authorization_endpoint"], format!("{ISSUER}/oauth/authorize"));
    assert_eq!(json["token_endpoint"], format!("{ISSUER}/oauth/token"));
    assert_eq!(json["registration_endpoint"], format!("{ISSUER}/oauth/register"));
    assert_eq!(json["token_endpoint_auth_methods_supported"], json!(["none"]));
    assert!(json["code_challenge_methods_supported"]
        .as_array()
        .unwrap()
        .contains(&json!("S256")));
    assert!(json["grant_types_supported"].as_array().unwrap().contains(&json!("refresh_token")));
}

#[tokio::test]
async fn test_protected_resource_metadata() {
    let server = build_server();
    let response = get(&server, "/.well-known/oauth-protected-resource").await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["resource"], ISSUER);
    assert!(json["authorization_servers"].as_array().unwrap().contains(&json!(ISSUER)));
}

// ─── Registration ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_register_returns_fixed_public_client() {
    let server = build_server();
    let response = server
        .router()
        .oneshot(
            Request::post("/oauth/register")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    json!({
                        "client_name": "Test Client",
                        "redirect_uris": [REDIRECT, "https://claude.ai/cb", "myapp://cb"]
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let json = body_json(response).await;
    assert_eq!(json["client_id"], CLIENT_ID);
    assert_eq!(json["token_endpoint_auth_method"], "none");
    assert!(json.get("client_secret").is_none());
}

#[tokio::test]
async fn test_register_rejects_plain_http_non_loopback() {
    let server = build_server();
    let response = server
        .router()
        .oneshot(
            Request::post("/oauth/register")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    json!({"redirect_uris": ["http://example.com/cb"]}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "invalid_request");
}

// ─── Authorize validation ────────────────────────────────────────────────────

#[tokio::test]
async fn test_authorize_requires_state() {
    let server = build_server();
    let uri = format!(
        "/oauth/authorize?client_id={CLIENT_ID}&redirect_uri={}&response_type=code\
         &code_challenge={CHALLENGE}&code_challenge_method=S256",
        urlencode(REDIRECT)
    );
    let response = get(&server, &uri).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_request");
}

#[tokio::test]
async fn test_authorize_rejects_plain_challenge_method() {
    let server = build_server();
    let uri = format!(
        "/oauth/authorize?client_id={CLIENT_ID}&redirect_uri={}&response_type=code\
         &code_challenge={CHALLENGE}&code_challenge_method=plain&state=abc",
        urlencode(REDIRECT)
    );
    let response = get(&server, &uri).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_request");
}

#[tokio::test]
async fn test_authorize_rejects_non_code_response_type() {
    let server = build_server();
    let uri = format!(
        "/oauth/authorize?client_id={CLIENT_ID}&redirect_uri={}&response_type=token\
         &code_challenge={CHALLENGE}&code_challenge_method=S256&state=abc",
        urlencode(REDIRECT)
    );
    let response = get(&server, &uri).await;
    assert_eq!(body_json(response).await["error"], "unsupported_response_type");
}

#[tokio::test]
async fn test_authorize_redirect_policy_boundaries() {
    let server = build_server();
    for (uri, allowed) in [
        ("http://127.0.0.1:3000/cb", true),
        ("myapp://cb", true),
        ("http://example.com/cb", false),
    ] {
        let request_uri = format!(
            "/oauth/authorize?client_id={CLIENT_ID}&redirect_uri={}&response_type=code\
             &code_challenge={CHALLENGE}&code_challenge_method=S256&state=abc",
            urlencode(uri)
        );
        let response = get(&server, &request_uri).await;
        if allowed {
            assert_eq!(response.status(), StatusCode::FOUND, "{uri} should be allowed");
        } else {
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri} should be rejected");
        }
    }
}

// ─── Upstream callback ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_callback_unknown_key() {
    let server = build_server();
    let response = get(&server, "/oauth/reddit/callback?code=xyz&state=deadbeef:nonce").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"], "invalid_request");
}

#[tokio::test]
async fn test_callback_nonce_mismatch_consumes_pending() {
    let server = build_server();
    let upstream_state = run_authorize(&server).await;
    let (key, _nonce) = upstream_state.split_once(':').unwrap();

    let response =
        get(&server, &format!("/oauth/reddit/callback?code=xyz&state={key}:wrong")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // The pending row was consumed; the correct nonce no longer works.
    let response =
        get(&server, &format!("/oauth/reddit/callback?code=xyz&state={upstream_state}")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_callback_upstream_denied() {
    let server = build_server();
    let upstream_state = run_authorize(&server).await;

    let response = get(
        &server,
        &format!("/oauth/reddit/callback?error=access_denied&state={upstream_state}"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FOUND);

    let back = location_url(&response);
    assert_eq!(query_param(&back, "error").as_deref(), Some("access_denied"));
    assert_eq!(query_param(&back, "state").as_deref(), Some("abc"));
}

#[tokio::test]
async fn test_callback_upstream_exchange_failure() {
    let server = build_server_with(Arc::new(StubAuth {
        fail_exchange: std::sync::atomic::AtomicBool::new(true),
        ..Default::default()
    }));
    let upstream_state = run_authorize(&server).await;

    let response =
        get(&server, &format!("/oauth/reddit/callback?code=xyz&state={upstream_state}")).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(response).await["error"], "upstream_error");
}

// ─── Token: authorization_code grant ─────────────────────────────────────────

#[tokio::test]
async fn test_happy_path_authorization() {
    let server = build_server();
    let code = obtain_code(&server).await;

    let response = post_form(
        &server,
        "/oauth/token",
        form_encode(&[
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("redirect_uri", REDIRECT),
            ("code_verifier", VERIFIER),
            ("client_id", CLIENT_ID),
        ]),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("Cache-Control").unwrap(), "no-store");

    let json = body_json(response).await;
    assert_eq!(json["token_type"], "Bearer");
    assert_eq!(json["expires_in"], 86_400);
    assert_eq!(json["scope"], "read");
    assert!(json["refresh_token"].as_str().is_some());

    let bearer = json["access_token"].as_str().unwrap();
    let claims = codec().verify(bearer, chrono::Utc::now().timestamp()).unwrap();
    assert_eq!(claims.sub, "alice");
    assert_eq!(claims.upstream_access_token, "upstream-access");
    assert_eq!(claims.upstream_refresh_token, "upstream-refresh");
}

#[tokio::test]
async fn test_pkce_failure_consumes_code() {
    let server = build_server();
    let code = obtain_code(&server).await;

    let response = post_form(
        &server,
        "/oauth/token",
        form_encode(&[
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("redirect_uri", REDIRECT),
            ("code_verifier", "wrong"),
            ("client_id", CLIENT_ID),
        ]),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "invalid_grant");
    assert_eq!(json["error_description"], "Invalid code verifier");

    // Retry with the right verifier also fails: the code is consumed.
    let response = post_form(
        &server,
        "/oauth/token",
        form_encode(&[
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("redirect_uri", REDIRECT),
            ("code_verifier", VERIFIER),
            ("client_id", CLIENT_ID),
        ]),
    )
    .await;
    assert_eq!(body_json(response).await["error"], "invalid_grant");
}

#[tokio::test]
async fn test_code_single_redemption() {
    let server = build_server();
    let code = obtain_code(&server).await;

    let body = form_encode(&[
        ("grant_type", "authorization_code"),
        ("code", &code),
        ("redirect_uri", REDIRECT),
        ("code_verifier", VERIFIER),
        ("client_id", CLIENT_ID),
    ]);

    let first = post_form(&server, "/oauth/token", body.clone()).await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = post_form(&server, "/oauth/token", body).await;
    assert_eq!(second.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(second).await["error"], "invalid_grant");
}

#[tokio::test]
async fn test_redirect_uri_mismatch() {
    let server = build_server();
    let code = obtain_code(&server).await;

    let response = post_form(
        &server,
        "/oauth/token",
        form_encode(&[
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("redirect_uri", "http://localhost:5173/other"),
            ("code_verifier", VERIFIER),
            ("client_id", CLIENT_ID),
        ]),
    )
    .await;
    assert_eq!(body_json(response).await["error"], "invalid_grant");
}

#[tokio::test]
async fn test_unsupported_grant_type() {
    let server = build_server();
    let response =
        post_form(&server, "/oauth/token", form_encode(&[("grant_type", "password")])).await;
    assert_eq!(body_json(response).await["error"], "unsupported_grant_type");
}

// ─── Token: refresh_token grant ──────────────────────────────────────────────

async fn redeem(server: &McpServer) -> serde_json::Value {
    let code = obtain_code(server).await;
    let response = post_form(
        server,
        "/oauth/token",
        form_encode(&[
            ("grant_type", "authorization_code"),
            ("code", &code),
            ("redirect_uri", REDIRECT),
            ("code_verifier", VERIFIER),
            ("client_id", CLIENT_ID),
        ]),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    body_json(response).await
}

#[tokio::test]
async fn test_refresh_grant_reissues_bearer() {
    let auth = Arc::new(StubAuth::default());
    let server = build_server_with(Arc::clone(&auth));
    let issued = redeem(&server).await;
    let refresh_token = issued["refresh_token"].as_str().unwrap();

    let response = post_form(
        &server,
        "/oauth/token",
        form_encode(&[("grant_type", "refresh_token"), ("refresh_token", refresh_token)]),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert!(json.get("refresh_token").is_none());

    let claims = codec()
        .verify(json["access_token"].as_str().unwrap(), chrono::Utc::now().timestamp())
        .unwrap();
    assert_eq!(claims.sub, "alice");
    // Far from expiry: the upstream pair is re-signed untouched.
    assert_eq!(claims.upstream_access_token, "upstream-access");
    assert_eq!(auth.refresh_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_refresh_grant_near_expiry_refreshes_upstream() {
    let auth = Arc::new(StubAuth { expires_in: 60, ..Default::default() });
    let server = build_server_with(Arc::clone(&auth));
    let issued = redeem(&server).await;
    let refresh_token = issued["refresh_token"].as_str().unwrap();

    let response = post_form(
        &server,
        "/oauth/token",
        form_encode(&[("grant_type", "refresh_token"), ("refresh_token", refresh_token)]),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    let claims = codec()
        .verify(json["access_token"].as_str().unwrap(), chrono::Utc::now().timestamp())
        .unwrap();
    assert_eq!(claims.upstream_access_token, "upstream-access-refreshed");
    assert_eq!(auth.refresh_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_refresh_grant_upstream_failure_is_upstream_error() {
    let auth = Arc::new(StubAuth {
        expires_in: 60,
        fail_refresh: std::sync::atomic::AtomicBool::new(true),
        ..Default::default()
    });
    let server = build_server_with(Arc::clone(&auth));
    let issued = redeem(&server).await;
    let refresh_token = issued["refresh_token"].as_str().unwrap().to_string();

    let body =
        form_encode(&[("grant_type", "refresh_token"), ("refresh_token", &refresh_token)]);
    let response = post_form(&server, "/oauth/token", body.clone()).await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(response).await["error"], "upstream_error");

    // The record survives the failure; a later attempt can still succeed.
    auth.fail_refresh.store(false, std::sync::atomic::Ordering::SeqCst);
    let response = post_form(&server, "/oauth/token", body).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_grant_unknown_token() {
    let server = build_server();
    let response = post_form(
        &server,
        "/oauth/token",
        form_encode(&[("grant_type", "refresh_token"), ("refresh_token", "bogus")]),
    )
    .await;
    assert_eq!(body_json(response).await["error"], "invalid_grant");
}
