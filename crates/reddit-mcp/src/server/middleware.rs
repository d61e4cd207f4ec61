//! Middleware chain for the MCP endpoint.
//!
//! Applied in fixed order: bearer verification, per-address rate limiting,
//! protocol-version check. (The request-size cap is a `DefaultBodyLimit`
//! layer installed by the router.) Verified claims are published into the
//! request extensions for downstream handlers.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, Method, Request, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::middleware::Next;
use axum::Json;
use futures::stream;
use tokio::sync::Mutex;

use crate::protocol::{PROTOCOL_VERSION, PROTOCOL_VERSION_HEADER};
use crate::server::AppState;

/// Request body cap on the MCP endpoint: 10 MiB.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

// ─── Bearer verification ─────────────────────────────────────────────────────

/// Verify the bearer token and publish its claims into the request.
///
/// Missing or invalid bearers get a 401 with a `WWW-Authenticate` header
/// pointing at the protected-resource metadata. Callers that accept an
/// event stream get the 401 as a one-shot error event instead, so clients
/// do not misread the refusal as a transport failure.
pub async fn bearer_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS {
        return next.run(request).await;
    }

    let wants_stream = request
        .headers()
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("text/event-stream"));

    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let Some(token) = token else {
        tracing::debug!("Missing bearer token");
        return unauthorized(&state, "invalid_token", "Missing access token", wants_stream);
    };

    match state.codec.verify(token, chrono::Utc::now().timestamp()) {
        Ok(claims) => {
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(err) => {
            tracing::debug!(error = %err, "Bearer verification failed");
            unauthorized(&state, "invalid_token", "Token is invalid or expired", wants_stream)
        }
    }
}

fn unauthorized(state: &AppState, error: &str, description: &str, as_stream: bool) -> Response {
    let metadata_url = format!("{}/.well-known/oauth-protected-resource", state.config.issuer);
    let body = serde_json::json!({
        "error": error,
        "error_description": description,
        "resource_metadata": metadata_url,
    });

    if as_stream {
        let event = Event::default().event("error").data(body.to_string());
        let stream = stream::once(async move { Ok::<_, Infallible>(event) });
        return Sse::new(stream).into_response();
    }

    let www_authenticate = format!(
        r#"Bearer error="{error}", error_description="{description}", resource_metadata="{metadata_url}""#
    );
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, www_authenticate)],
        Json(body),
    )
        .into_response()
}

// ─── Rate limiting ───────────────────────────────────────────────────────────

/// Fixed-window request counter per remote address.
#[derive(Clone)]
pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    counters: Arc<Mutex<HashMap<IpAddr, (Instant, u32)>>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self { window, max_requests, counters: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Record one request. Returns `Err(retry_after)` when the window is full.
    pub async fn check(&self, addr: IpAddr) -> Result<(), Duration> {
        let now = Instant::now();
        let mut counters = self.counters.lock().await;

        // Opportunistic cleanup keeps the map bounded by active addresses.
        counters.retain(|_, (start, _)| now.duration_since(*start) < self.window);

        let (start, count) = counters.entry(addr).or_insert((now, 0));
        if now.duration_since(*start) >= self.window {
            *start = now;
            *count = 0;
        }
        if *count >= self.max_requests {
            return Err(self.window.saturating_sub(now.duration_since(*start)));
        }
        *count += 1;
        Ok(())
    }

    #[must_use]
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }
}

/// Shed per-address load at the edge: 429 with the standard headers once the
/// window is exceeded.
pub async fn rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED), |info| info.0.ip());

    match state.rate_limiter.check(addr).await {
        Ok(()) => next.run(request).await,
        Err(retry_after) => {
            tracing::warn!(%addr, "Rate limit exceeded");
            let body = serde_json::json!({
                "error": "rate_limited",
                "error_description": "Too many requests",
            });
            (
                StatusCode::TOO_MANY_REQUESTS,
                [
                    (header::RETRY_AFTER, retry_after.as_secs().max(1).to_string()),
                    (
                        header::HeaderName::from_static("x-ratelimit-limit"),
                        state.rate_limiter.max_requests().to_string(),
                    ),
                    (header::HeaderName::from_static("x-ratelimit-remaining"), "0".to_string()),
                ],
                Json(body),
            )
                .into_response()
        }
    }
}

// ─── Protocol version ────────────────────────────────────────────────────────

/// Reject requests declaring a protocol version this server does not speak.
/// Requests without the header pass through.
pub async fn protocol_version(request: Request<Body>, next: Next) -> Response {
    if let Some(version) = request
        .headers()
        .get(PROTOCOL_VERSION_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        if version != PROTOCOL_VERSION {
            tracing::debug!(version, "Protocol version mismatch");
            let body = crate::protocol::JsonRpcResponse::error(
                None,
                crate::error::rpc_code::INVALID_REQUEST,
                format!("Unsupported protocol version: {version} (server speaks {PROTOCOL_VERSION})"),
            );
            return (StatusCode::BAD_REQUEST, Json(body)).into_response();
        }
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rate_limiter_fixed_window() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 3);
        let addr = IpAddr::V4(Ipv4Addr::LOCALHOST);

        for _ in 0..3 {
            assert!(limiter.check(addr).await.is_ok());
        }
        assert!(limiter.check(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_rate_limiter_isolates_addresses() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 1);
        let a = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let b = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));

        assert!(limiter.check(a).await.is_ok());
        assert!(limiter.check(a).await.is_err());
        assert!(limiter.check(b).await.is_ok());
    }

    #[tokio::test]
    async fn test_rate_limiter_window_reset() {
        let limiter = RateLimiter::new(Duration::from_millis(10), 1);
        let addr = IpAddr::V4(Ipv4Addr::LOCALHOST);

        assert!(limiter.check(addr).await.is_ok());
        assert!(limiter.check(addr).await.is_err());
        tokio::time::sleep(Duration::from_millis(15)).await;
        assert!(limiter.check(addr).await.is_ok());
    }
}
