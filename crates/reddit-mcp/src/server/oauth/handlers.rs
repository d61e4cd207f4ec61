//! OAuth endpoint handlers.
//!
//! Six routes: the two discovery documents, dynamic registration, authorize,
//! the upstream callback, and the token endpoint. Every handler is stateless
//! beyond the state store, the token codec, and the config.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use serde::Deserialize;
use subtle::ConstantTimeEq;
use url::Url;

use super::pkce;
use super::policy::redirect_uri_allowed;
use super::store::{CODE_TTL, PENDING_TTL, REFRESH_TTL};
use super::types::{AuthorizationCode, PendingAuthorization, RefreshTokenRecord, UpstreamTokens};
use crate::config::upstream;
use crate::error::OAuthError;
use crate::server::AppState;

/// The fixed public client identifier. PKCE is the only client
/// authentication; no secret is ever issued.
pub const PUBLIC_CLIENT_ID: &str = "mcp-public-client";

/// Default scope granted when the caller requests none.
const DEFAULT_SCOPE: &str = "read";

/// Upstream access tokens expiring within this window trigger an
/// opportunistic upstream refresh during the refresh_token grant.
const UPSTREAM_REFRESH_BUFFER_SECS: i64 = 600;

// ─── Discovery ───────────────────────────────────────────────────────────────

/// `GET /.well-known/oauth-authorization-server`
pub async fn authorization_server_metadata(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let issuer = &state.config.issuer;
    Json(serde_json::json!({
        "issuer": issuer,
        "authorization_endpoint": format!("{issuer}/oauth/authorize"),
        "token_endpoint": format!("{issuer}/oauth/token"),
        "registration_endpoint": format!("{issuer}/oauth/register"),
        "scopes_supported": [DEFAULT_SCOPE],
        "response_types_supported": ["code"],
        "grant_types_supported": ["authorization_code", "refresh_token"],
        "token_endpoint_auth_methods_supported": ["none"],
        "code_challenge_methods_supported": ["S256"]
    }))
}

/// `GET /.well-known/oauth-protected-resource`
pub async fn protected_resource_metadata(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let issuer = &state.config.issuer;
    Json(serde_json::json!({
        "resource": issuer,
        "authorization_servers": [issuer],
        "bearer_methods_supported": ["header"],
        "scopes_supported": [DEFAULT_SCOPE]
    }))
}

// ─── Dynamic Client Registration ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub client_name: Option<String>,
    pub redirect_uris: Option<Vec<String>>,
}

/// `POST /oauth/register`
///
/// Registration always resolves to the fixed public client id; its purpose
/// here is redirect-URI validation and protocol conformance for clients
/// that insist on RFC 7591.
pub async fn register(Json(req): Json<RegisterRequest>) -> Response {
    let redirect_uris = req.redirect_uris.unwrap_or_default();
    for uri in &redirect_uris {
        if !redirect_uri_allowed(uri) {
            return OAuthError::invalid_request(format!("redirect_uri not allowed: {uri}"))
                .into_response();
        }
    }

    tracing::info!(client_name = ?req.client_name, "Registered OAuth client");

    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "client_id": PUBLIC_CLIENT_ID,
            "client_name": req.client_name,
            "redirect_uris": redirect_uris,
            "grant_types": ["authorization_code", "refresh_token"],
            "response_types": ["code"],
            "token_endpoint_auth_method": "none"
        })),
    )
        .into_response()
}

// ─── Authorize ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AuthorizeQuery {
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub response_type: Option<String>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
    pub scope: Option<String>,
}

/// `GET /oauth/authorize`
///
/// Validates the caller's parameters, stores a pending authorization, and
/// redirects the user agent to the upstream consent page. The upstream state
/// parameter is `storage_key:nonce` so the callback can resolve the row.
pub async fn authorize(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AuthorizeQuery>,
) -> Response {
    let Some(client_id) = query.client_id.as_deref() else {
        return OAuthError::invalid_request("Missing client_id").into_response();
    };
    if client_id != PUBLIC_CLIENT_ID {
        return OAuthError::invalid_request("Unknown client_id").into_response();
    }
    let Some(redirect_uri) = query.redirect_uri.as_deref() else {
        return OAuthError::invalid_request("Missing redirect_uri").into_response();
    };
    if !redirect_uri_allowed(redirect_uri) {
        return OAuthError::invalid_request("redirect_uri not allowed").into_response();
    }
    if query.response_type.as_deref() != Some("code") {
        return OAuthError::UnsupportedResponseType.into_response();
    }
    let Some(code_challenge) = query.code_challenge.as_deref() else {
        return OAuthError::invalid_request("Missing code_challenge").into_response();
    };
    if query.code_challenge_method.as_deref() != Some("S256") {
        return OAuthError::invalid_request("code_challenge_method must be S256").into_response();
    }
    let Some(client_state) = query.state.as_deref() else {
        return OAuthError::invalid_request("Missing state").into_response();
    };

    let nonce = crate::server::oauth::OAuthStateStore::generate_key();
    let now = Instant::now();
    let key = state
        .store
        .insert_pending(PendingAuthorization {
            redirect_uri: redirect_uri.to_string(),
            code_challenge: code_challenge.to_string(),
            client_state: client_state.to_string(),
            upstream_nonce: nonce.clone(),
            scope: query.scope.clone().unwrap_or_else(|| DEFAULT_SCOPE.to_string()),
            created_at: now,
            expires_at: now + PENDING_TTL,
        })
        .await;

    let upstream_state = format!("{key}:{nonce}");
    let upstream_url = match Url::parse_with_params(
        &state.config.upstream_authorize_url,
        &[
            ("client_id", state.config.reddit_client_id.as_str()),
            ("response_type", "code"),
            ("redirect_uri", state.config.reddit_callback_url.as_str()),
            ("duration", "permanent"),
            ("scope", upstream::SCOPES),
            ("state", upstream_state.as_str()),
        ],
    ) {
        Ok(url) => url,
        Err(err) => {
            tracing::error!(error = %err, "Failed to build upstream authorize URL");
            return OAuthError::ServerError("failed to build upstream URL".into()).into_response();
        }
    };

    tracing::info!("Redirecting caller to upstream consent");
    (StatusCode::FOUND, [(header::LOCATION, upstream_url.to_string())]).into_response()
}

// ─── Upstream callback ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// `GET /oauth/reddit/callback`
///
/// Consumes the pending authorization atomically, exchanges the upstream
/// code, resolves the upstream identity, mints a one-shot authorization
/// code, and redirects the user agent back to the caller.
pub async fn upstream_callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let Some(upstream_state) = query.state.as_deref() else {
        return OAuthError::invalid_request("Missing state").into_response();
    };
    let Some((key, nonce)) = upstream_state.split_once(':') else {
        return OAuthError::invalid_request("Malformed state").into_response();
    };

    let Some(pending) = state.store.take_pending(key).await else {
        return OAuthError::invalid_request("Unknown or expired authorization").into_response();
    };
    let nonce_ok: bool = pending.upstream_nonce.as_bytes().ct_eq(nonce.as_bytes()).into();
    if !nonce_ok {
        return OAuthError::invalid_request("State nonce mismatch").into_response();
    }

    // Upstream declined consent: bounce the caller back with the error.
    if let Some(ref error) = query.error {
        tracing::info!(error = %error, "Upstream denied authorization");
        return redirect_with_params(
            &pending.redirect_uri,
            &[("error", "access_denied"), ("state", pending.client_state.as_str())],
        );
    }
    let Some(code) = query.code.as_deref() else {
        return OAuthError::invalid_request("Missing code").into_response();
    };

    let exchanged = match state.auth.exchange_code(code, &state.config.reddit_callback_url).await {
        Ok(tokens) => tokens,
        Err(err) => {
            tracing::warn!(error = %err, "Upstream code exchange failed");
            return OAuthError::from(err).into_response();
        }
    };
    let user_id = match state.auth.identify_user(&exchanged.access_token).await {
        Ok(user_id) => user_id,
        Err(err) => {
            tracing::warn!(error = %err, "Upstream identity lookup failed");
            return OAuthError::from(err).into_response();
        }
    };

    let now = Instant::now();
    let wall_now = chrono::Utc::now().timestamp();
    let auth_code = state
        .store
        .insert_code(AuthorizationCode {
            redirect_uri: pending.redirect_uri.clone(),
            code_challenge: pending.code_challenge,
            user_id: user_id.clone(),
            tokens: UpstreamTokens {
                access_token: exchanged.access_token,
                refresh_token: exchanged.refresh_token.unwrap_or_default(),
                expires_at: wall_now + exchanged.expires_in,
            },
            scope: pending.scope,
            created_at: now,
            expires_at: now + CODE_TTL,
        })
        .await;

    tracing::info!(user = %user_id, "Upstream consent completed");

    redirect_with_params(
        &pending.redirect_uri,
        &[("code", auth_code.as_str()), ("state", pending.client_state.as_str())],
    )
}

// ─── Token ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub grant_type: String,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub code_verifier: Option<String>,
    pub client_id: Option<String>,
    pub refresh_token: Option<String>,
}

/// `POST /oauth/token`
pub async fn token(State(state): State<Arc<AppState>>, Form(form): Form<TokenRequest>) -> Response {
    match form.grant_type.as_str() {
        "authorization_code" => authorization_code_grant(&state, &form).await,
        "refresh_token" => refresh_token_grant(&state, &form).await,
        other => OAuthError::UnsupportedGrantType(other.to_string()).into_response(),
    }
}

async fn authorization_code_grant(state: &AppState, form: &TokenRequest) -> Response {
    let Some(ref code) = form.code else {
        return OAuthError::invalid_request("Missing code").into_response();
    };
    let Some(ref redirect_uri) = form.redirect_uri else {
        return OAuthError::invalid_request("Missing redirect_uri").into_response();
    };
    let Some(ref code_verifier) = form.code_verifier else {
        return OAuthError::invalid_request("Missing code_verifier").into_response();
    };
    if form.client_id.as_deref() != Some(PUBLIC_CLIENT_ID) {
        return OAuthError::invalid_request("Missing or unknown client_id").into_response();
    }

    // One-shot consumption: a second redemption fails regardless of PKCE.
    let Some(row) = state.store.take_code(code).await else {
        return OAuthError::invalid_grant("Invalid or expired authorization code").into_response();
    };

    if row.redirect_uri != *redirect_uri {
        return OAuthError::invalid_grant("redirect_uri mismatch").into_response();
    }
    if !pkce::verify_s256(code_verifier, &row.code_challenge) {
        return OAuthError::invalid_grant("Invalid code verifier").into_response();
    }

    let now = chrono::Utc::now().timestamp();
    let bearer = state.codec.mint(
        &row.user_id,
        &row.tokens.access_token,
        &row.tokens.refresh_token,
        now,
    );

    let created = Instant::now();
    let refresh_id = state
        .store
        .insert_refresh(RefreshTokenRecord {
            user_id: row.user_id.clone(),
            tokens: row.tokens,
            scope: row.scope.clone(),
            created_at: created,
            expires_at: created + REFRESH_TTL,
        })
        .await;

    tracing::info!(user = %row.user_id, "Issued bearer token");

    token_success(serde_json::json!({
        "access_token": bearer,
        "token_type": "Bearer",
        "expires_in": crate::config::gateway::TOKEN_LIFETIME_SECS,
        "refresh_token": refresh_id,
        "scope": row.scope
    }))
}

async fn refresh_token_grant(state: &AppState, form: &TokenRequest) -> Response {
    let Some(ref refresh_token) = form.refresh_token else {
        return OAuthError::invalid_request("Missing refresh_token").into_response();
    };

    let Some(record) = state.store.get_refresh(refresh_token).await else {
        return OAuthError::invalid_grant("Invalid or expired refresh token").into_response();
    };

    let now = chrono::Utc::now().timestamp();
    let mut tokens = record.tokens.clone();

    // Opportunistic upstream refresh when the stored access token is near
    // expiry. A failing upstream surfaces upstream_error, not invalid_grant,
    // and the record stays intact for a later attempt.
    if tokens.expires_within(now, UPSTREAM_REFRESH_BUFFER_SECS) && !tokens.refresh_token.is_empty()
    {
        match state.auth.refresh_tokens(&tokens.refresh_token).await {
            Ok(refreshed) => {
                tokens = UpstreamTokens {
                    access_token: refreshed.access_token,
                    refresh_token: refreshed
                        .refresh_token
                        .unwrap_or_else(|| tokens.refresh_token.clone()),
                    expires_at: now + refreshed.expires_in,
                };
                state.store.update_refresh_tokens(refresh_token, tokens.clone()).await;
                tracing::info!(user = %record.user_id, "Refreshed upstream token pair");
            }
            Err(err) => {
                tracing::warn!(error = %err, "Upstream refresh failed");
                return OAuthError::from(err).into_response();
            }
        }
    }

    let bearer = state.codec.mint(&record.user_id, &tokens.access_token, &tokens.refresh_token, now);

    tracing::info!(user = %record.user_id, "Re-issued bearer token");

    token_success(serde_json::json!({
        "access_token": bearer,
        "token_type": "Bearer",
        "expires_in": crate::config::gateway::TOKEN_LIFETIME_SECS,
        "scope": record.scope
    }))
}

/// Token responses carry the RFC 6749 §5.1 cache headers.
fn token_success(body: serde_json::Value) -> Response {
    let mut response = Json(body).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    response
}

/// 302 back to the caller's redirect URI with the given query parameters.
fn redirect_with_params(redirect_uri: &str, params: &[(&str, &str)]) -> Response {
    match Url::parse(redirect_uri) {
        Ok(mut url) => {
            url.query_pairs_mut().extend_pairs(params);
            (StatusCode::FOUND, [(header::LOCATION, url.to_string())]).into_response()
        }
        Err(_) => OAuthError::ServerError("stored redirect_uri is invalid".into()).into_response(),
    }
}
