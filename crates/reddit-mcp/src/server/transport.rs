//! HTTP routes and streamable MCP transport.
//!
//! A single `/mcp` endpoint carries the whole protocol: POST bodies are
//! JSON-RPC requests (or client replies to server-initiated requests), the
//! GET stream carries responses, server-initiated requests, and
//! notifications, and DELETE tears the session down. The session id is
//! echoed in `Mcp-Session-Id` on every response and exposed to browsers.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware as axum_middleware, Extension, Json, Router};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use tokio_stream::wrappers::BroadcastStream;

use crate::error::{rpc_code, McpError};
use crate::protocol::{JsonRpcRequest, JsonRpcResponse, SESSION_ID_HEADER};
use crate::server::middleware::{self, MAX_BODY_BYTES};
use crate::server::oauth::handlers as oauth_handlers;
use crate::server::oauth::token::BearerClaims;
use crate::server::session::{Session, SessionTable};
use crate::server::AppState;

/// Build the full router.
pub fn create_router(state: Arc<AppState>) -> Router {
    let mcp = Router::new()
        .route("/mcp", post(handle_mcp_post).get(handle_mcp_get).delete(handle_mcp_delete))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(axum_middleware::from_fn(middleware::protocol_version))
        .layer(axum_middleware::from_fn_with_state(Arc::clone(&state), middleware::rate_limit))
        .layer(axum_middleware::from_fn_with_state(Arc::clone(&state), middleware::bearer_auth));

    Router::new()
        .route(
            "/.well-known/oauth-authorization-server",
            get(oauth_handlers::authorization_server_metadata),
        )
        .route(
            "/.well-known/oauth-protected-resource",
            get(oauth_handlers::protected_resource_metadata),
        )
        .route("/oauth/register", post(oauth_handlers::register))
        .route("/oauth/authorize", get(oauth_handlers::authorize))
        .route("/oauth/reddit/callback", get(oauth_handlers::upstream_callback))
        .route("/oauth/token", post(oauth_handlers::token))
        .route("/health", get(health))
        .route("/", get(index))
        .merge(mcp)
        .layer(tower_http::cors::CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (pending, codes, refresh) = state.store.counts().await;
    Json(serde_json::json!({
        "status": "ok",
        "service": "reddit-mcp",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": state.sessions.count().await,
        "oauth_rows": { "pending": pending, "codes": codes, "refresh_tokens": refresh },
        "capabilities": {
            "oauth": true,
            "streaming": true,
            "tools": true,
            "prompts": true,
            "resources": true,
            "sampling": true
        }
    }))
}

async fn index(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let issuer = &state.config.issuer;
    Json(serde_json::json!({
        "service": "reddit-mcp",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "mcp": format!("{issuer}/mcp"),
            "authorization": format!("{issuer}/oauth/authorize"),
            "token": format!("{issuer}/oauth/token"),
            "registration": format!("{issuer}/oauth/register"),
            "authorization_server_metadata": format!("{issuer}/.well-known/oauth-authorization-server"),
            "protected_resource_metadata": format!("{issuer}/.well-known/oauth-protected-resource"),
            "health": format!("{issuer}/health")
        }
    }))
}

fn session_id_from(headers: &HeaderMap) -> Option<&str> {
    headers.get(SESSION_ID_HEADER).and_then(|v| v.to_str().ok())
}

/// Echo the session id and expose it to browser clients.
fn with_session_headers(mut response: Response, session_id: &str) -> Response {
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(session_id) {
        headers.insert(SESSION_ID_HEADER, value);
    }
    headers.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static(SESSION_ID_HEADER),
    );
    response
}

fn rpc_error_response(status: StatusCode, err: &McpError) -> Response {
    (status, Json(JsonRpcResponse::from_mcp_error(None, err))).into_response()
}

/// POST /mcp: JSON-RPC requests and client replies to server-initiated
/// requests, multiplexed on one endpoint.
async fn handle_mcp_post(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<BearerClaims>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Ok(value) = serde_json::from_slice::<serde_json::Value>(&body) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(JsonRpcResponse::error(None, rpc_code::PARSE_ERROR, "Parse error")),
        )
            .into_response();
    };

    // A frame with an id but no method is the client's reply to a
    // server-initiated request; route it to the awaiting resolver.
    if value.get("method").is_none() {
        return handle_client_reply(&state, &headers, value).await;
    }

    let req: JsonRpcRequest = match serde_json::from_value(value) {
        Ok(req) => req,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(JsonRpcResponse::error(None, rpc_code::INVALID_REQUEST, "Invalid request")),
            )
                .into_response();
        }
    };

    let session = match state.sessions.bind_or_create(&claims, session_id_from(&headers)).await {
        Ok(session) => session,
        Err(err) => return rpc_error_response(StatusCode::NOT_FOUND, &err),
    };

    tracing::debug!(session_id = %session.id, method = %req.method, "Handling MCP request");

    match session.instance.handle_request(req).await {
        Some(response) => {
            // Mirror the response onto the stream so reconnecting clients can
            // replay; the HTTP body is authoritative for this request.
            session.instance.transport().send_response(&response).await;
            with_session_headers(Json(response).into_response(), &session.id)
        }
        None => with_session_headers(StatusCode::ACCEPTED.into_response(), &session.id),
    }
}

async fn handle_client_reply(
    state: &AppState,
    headers: &HeaderMap,
    value: serde_json::Value,
) -> Response {
    let Some(correlation_id) = value.get("id").and_then(|id| id.as_str()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(JsonRpcResponse::error(None, rpc_code::INVALID_REQUEST, "Invalid request")),
        )
            .into_response();
    };

    let Some(session_id) = session_id_from(headers) else {
        return rpc_error_response(
            StatusCode::BAD_REQUEST,
            &McpError::SessionNotFound("missing session header".to_string()),
        );
    };
    let Some(session) = state.sessions.get(session_id).await else {
        return rpc_error_response(
            StatusCode::NOT_FOUND,
            &McpError::SessionNotFound(session_id.to_string()),
        );
    };
    session.touch().await;

    if let Some(error) = value.get("error") {
        // A client-side refusal does not resolve the call; the awaiting
        // deadline does. Log and acknowledge.
        tracing::warn!(session_id = %session.id, correlation_id, ?error, "Client rejected sampling request");
        return with_session_headers(StatusCode::ACCEPTED.into_response(), &session.id);
    }

    let result = value.get("result").cloned().unwrap_or(serde_json::Value::Null);
    let resolved = session.instance.handle_client_reply(correlation_id, result).await;
    if !resolved {
        tracing::debug!(session_id = %session.id, correlation_id, "Reply for unknown correlation id");
    }
    with_session_headers(StatusCode::ACCEPTED.into_response(), &session.id)
}

/// GET /mcp: the session's event stream. Replays buffered frames after
/// `Last-Event-ID`, then delivers live frames until the client disconnects.
/// Disconnecting closes the session and resolves its pending sampling calls.
async fn handle_mcp_get(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<BearerClaims>,
    headers: HeaderMap,
) -> Response {
    let last_event_id: u64 = headers
        .get("Last-Event-ID")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    let session = match state.sessions.bind_or_create(&claims, session_id_from(&headers)).await {
        Ok(session) => session,
        Err(err) => return rpc_error_response(StatusCode::NOT_FOUND, &err),
    };

    tracing::info!(session_id = %session.id, last_event_id, "Stream connected");

    let stream = build_event_stream(Arc::clone(&session), last_event_id).await;
    let guarded = GuardedStream {
        inner: stream.boxed(),
        _guard: DisconnectGuard { sessions: state.sessions.clone(), session_id: session.id.clone() },
    };

    let response = (
        [
            ("X-Accel-Buffering", "no"),
            ("Cache-Control", "no-cache, no-store, must-revalidate"),
        ],
        Sse::new(guarded).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("ping")),
    )
        .into_response();
    with_session_headers(response, &session.id)
}

/// DELETE /mcp: explicit session teardown.
async fn handle_mcp_delete(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    let Some(session_id) = session_id_from(&headers) else {
        return rpc_error_response(
            StatusCode::BAD_REQUEST,
            &McpError::SessionNotFound("missing session header".to_string()),
        );
    };
    if state.sessions.close_session(session_id).await {
        StatusCode::NO_CONTENT.into_response()
    } else {
        rpc_error_response(StatusCode::NOT_FOUND, &McpError::SessionNotFound(session_id.to_string()))
    }
}

/// Replay missed frames, then chain the live broadcast.
async fn build_event_stream(
    session: Arc<Session>,
    last_event_id: u64,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    let transport = session.instance.transport();

    let missed = transport.events_after(last_event_id).await;
    let replay = stream::iter(missed.into_iter().map(|e| Ok::<_, Infallible>(e.to_sse_event())));

    let receiver = transport.subscribe();
    let live = BroadcastStream::new(receiver).filter_map(|result| async move {
        match result {
            Ok(event) => Some(Ok(event.to_sse_event())),
            Err(err) => {
                tracing::debug!(error = %err, "Broadcast lag, client will replay");
                None
            }
        }
    });

    replay.chain(live)
}

/// Closes the session when the client's stream goes away.
struct DisconnectGuard {
    sessions: Arc<SessionTable>,
    session_id: String,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        let sessions = Arc::clone(&self.sessions);
        let session_id = std::mem::take(&mut self.session_id);
        tokio::spawn(async move {
            if sessions.close_session(&session_id).await {
                tracing::info!(session_id = %session_id, "Stream disconnected, session closed");
            }
        });
    }
}

struct GuardedStream {
    inner: BoxStream<'static, Result<Event, Infallible>>,
    _guard: DisconnectGuard,
}

impl Stream for GuardedStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}
