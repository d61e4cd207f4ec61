//! OAuth flow state rows.

use std::time::Instant;

/// An upstream access/refresh token pair with its wall-clock expiry.
#[derive(Debug, Clone)]
pub struct UpstreamTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix seconds at which the upstream access token expires.
    pub expires_at: i64,
}

/// A caller's authorization request, created at `/oauth/authorize` and
/// consumed when the upstream callback fires.
#[derive(Debug, Clone)]
pub struct PendingAuthorization {
    /// Where to send the caller's user agent after the upstream hop.
    pub redirect_uri: String,
    /// The caller's S256 code challenge.
    pub code_challenge: String,
    /// The caller's opaque state, echoed back on redirect.
    pub client_state: String,
    /// Server-generated nonce embedded in the upstream state parameter.
    pub upstream_nonce: String,
    /// Requested scope.
    pub scope: String,
    pub created_at: Instant,
    pub expires_at: Instant,
}

/// A one-shot authorization code, created at the upstream callback and
/// consumed at the token endpoint.
#[derive(Debug, Clone)]
pub struct AuthorizationCode {
    pub redirect_uri: String,
    pub code_challenge: String,
    /// Resolved upstream user id.
    pub user_id: String,
    pub tokens: UpstreamTokens,
    pub scope: String,
    pub created_at: Instant,
    pub expires_at: Instant,
}

/// A refresh token record, valid for 30 days.
#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    pub user_id: String,
    pub tokens: UpstreamTokens,
    pub scope: String,
    pub created_at: Instant,
    pub expires_at: Instant,
}

impl UpstreamTokens {
    /// Whether the upstream access token expires within `buffer_secs` of `now`.
    #[must_use]
    pub fn expires_within(&self, now: i64, buffer_secs: i64) -> bool {
        now + buffer_secs >= self.expires_at
    }
}
