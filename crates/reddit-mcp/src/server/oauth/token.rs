//! Bearer token codec.
//!
//! Mints and verifies the gateway's signed bearer envelope. The token is two
//! base64url parts, `payload.signature`, where the signature is HMAC-SHA256
//! over the encoded payload with the configured signing secret. The payload
//! carries the upstream token pair so the gateway holds no per-caller state
//! between requests.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::config::gateway::TOKEN_LIFETIME_SECS;
use crate::error::OAuthError;

type HmacSha256 = Hmac<Sha256>;

/// Claims carried by a gateway bearer token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BearerClaims {
    /// Issuer (the gateway's configured issuer URL).
    pub iss: String,
    /// Audience (the configured resource identifier).
    pub aud: String,
    /// Subject: the upstream user id.
    pub sub: String,
    /// Issued-at, Unix seconds.
    pub iat: i64,
    /// Expiry, Unix seconds.
    pub exp: i64,
    /// Upstream access token, passed through to API calls.
    pub upstream_access_token: String,
    /// Upstream refresh token.
    pub upstream_refresh_token: String,
}

/// Signs and verifies bearer tokens. No network, no storage.
#[derive(Clone)]
pub struct TokenCodec {
    secret: Vec<u8>,
    issuer: String,
    audience: String,
}

impl TokenCodec {
    #[must_use]
    pub fn new(secret: Vec<u8>, issuer: String, audience: String) -> Self {
        Self { secret, issuer, audience }
    }

    /// Mint a bearer token for `subject` carrying the upstream pair.
    ///
    /// `now` is Unix seconds; the token expires `TOKEN_LIFETIME_SECS` later.
    #[must_use]
    pub fn mint(
        &self,
        subject: &str,
        upstream_access_token: &str,
        upstream_refresh_token: &str,
        now: i64,
    ) -> String {
        let claims = BearerClaims {
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            sub: subject.to_string(),
            iat: now,
            exp: now + TOKEN_LIFETIME_SECS,
            upstream_access_token: upstream_access_token.to_string(),
            upstream_refresh_token: upstream_refresh_token.to_string(),
        };

        let payload = serde_json::to_string(&claims).expect("claims serialize");
        let payload_b64 = URL_SAFE_NO_PAD.encode(payload.as_bytes());
        let signature_b64 = URL_SAFE_NO_PAD.encode(self.sign(payload_b64.as_bytes()));
        format!("{payload_b64}.{signature_b64}")
    }

    /// Verify a bearer token at time `now` (Unix seconds).
    ///
    /// # Errors
    ///
    /// Any mismatch — malformed framing, bad signature, expired or
    /// not-yet-valid window, wrong audience or issuer — fails with
    /// `invalid_token`. The description never echoes token material.
    pub fn verify(&self, token: &str, now: i64) -> Result<BearerClaims, OAuthError> {
        let (payload_b64, signature_b64) = token
            .split_once('.')
            .ok_or_else(|| invalid("malformed token"))?;

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| invalid("malformed token"))?;

        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(payload_b64.as_bytes());
        mac.verify_slice(&signature).map_err(|_| invalid("signature mismatch"))?;

        let payload = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| invalid("malformed token"))?;
        let claims: BearerClaims =
            serde_json::from_slice(&payload).map_err(|_| invalid("malformed claims"))?;

        if now < claims.iat {
            return Err(invalid("token not yet valid"));
        }
        if now > claims.exp {
            return Err(invalid("token expired"));
        }
        if claims.aud != self.audience {
            return Err(invalid("audience mismatch"));
        }
        if claims.iss != self.issuer {
            return Err(invalid("issuer mismatch"));
        }

        Ok(claims)
    }

    fn sign(&self, data: &[u8]) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(data);
        mac.finalize().into_bytes().to_vec()
    }
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec").field("issuer", &self.issuer).finish()
    }
}

fn invalid(description: &str) -> OAuthError {
    OAuthError::InvalidToken(description.to_string())
}
