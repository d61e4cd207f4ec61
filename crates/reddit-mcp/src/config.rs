//! Configuration for the Reddit MCP gateway.
//!
//! `Config` is immutable after startup. Required variables are fatal when
//! absent; everything else has a sensible default.

use std::time::Duration;

use url::Url;

/// Upstream endpoint constants.
pub mod upstream {
    use std::time::Duration;

    /// Reddit's OAuth token endpoint (www host, HTTP Basic client auth).
    pub const TOKEN_URL: &str = "https://www.reddit.com/api/v1/access_token";

    /// Reddit's user consent page.
    pub const AUTHORIZE_URL: &str = "https://www.reddit.com/api/v1/authorize";

    /// Base URL for authenticated API calls.
    pub const API_BASE_URL: &str = "https://oauth.reddit.com";

    /// Scopes requested from Reddit during the consent hop.
    pub const SCOPES: &str = "identity read history";

    /// Request timeout.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    /// Connection timeout.
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Baseline pacing between API calls (Reddit's free-tier budget).
    pub const PACING_DELAY: Duration = Duration::from_secs(1);

    /// Cache TTL for read endpoints.
    pub const CACHE_TTL: Duration = Duration::from_secs(120);

    /// Maximum cache size.
    pub const CACHE_MAX_SIZE: u64 = 500;
}

/// Defaults for the gateway's own surface.
pub mod gateway {
    /// Default listening port.
    pub const PORT: u16 = 3000;

    /// Bearer token lifetime in seconds (matches the upstream's nominal 24h).
    pub const TOKEN_LIFETIME_SECS: i64 = 86_400;

    /// Fixed-window rate limit: window length in seconds.
    pub const RATE_LIMIT_WINDOW_SECS: u64 = 60;

    /// Fixed-window rate limit: requests per window per remote address.
    pub const RATE_LIMIT_MAX_REQUESTS: u32 = 100;

    /// Minimum length for the token-signing secret, in bytes.
    pub const MIN_SIGNING_SECRET_LEN: usize = 32;
}

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Reddit application client id.
    pub reddit_client_id: String,

    /// Reddit application client secret.
    pub reddit_client_secret: String,

    /// Symmetric secret used to sign bearer tokens.
    pub signing_secret: Vec<u8>,

    /// Absolute issuer URL (also the bearer audience).
    pub issuer: String,

    /// URL Reddit redirects back to after consent.
    pub reddit_callback_url: String,

    /// Listening port.
    pub port: u16,

    /// User agent sent on every upstream request (Reddit requires one).
    pub user_agent: String,

    /// Reddit token endpoint (overridable for mock servers).
    pub upstream_token_url: String,

    /// Reddit consent page (overridable for mock servers).
    pub upstream_authorize_url: String,

    /// Authenticated API base URL (overridable for mock servers).
    pub upstream_api_url: String,

    /// Pacing between upstream API calls.
    pub pacing_delay: Duration,

    /// Fixed-window rate limit window.
    pub rate_limit_window: Duration,

    /// Fixed-window rate limit ceiling.
    pub rate_limit_max: u32,
}

impl Config {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error when a required variable is absent or validation
    /// fails (short signing secret, relative issuer URL).
    pub fn from_env() -> anyhow::Result<Self> {
        let reddit_client_id = require("REDDIT_CLIENT_ID")?;
        let reddit_client_secret = require("REDDIT_CLIENT_SECRET")?;
        let signing_secret = require("TOKEN_SIGNING_SECRET")?.into_bytes();

        let port = match std::env::var("PORT") {
            Ok(v) => v.parse()?,
            Err(_) => gateway::PORT,
        };

        let issuer = std::env::var("ISSUER_URL").unwrap_or_else(|_| format!("http://localhost:{port}"));
        let reddit_callback_url = std::env::var("REDDIT_CALLBACK_URL")
            .unwrap_or_else(|_| format!("{issuer}/oauth/reddit/callback"));
        let user_agent = std::env::var("REDDIT_USER_AGENT")
            .unwrap_or_else(|_| format!("reddit-mcp/{}", env!("CARGO_PKG_VERSION")));

        let rate_limit_window = match std::env::var("RATE_LIMIT_WINDOW_SECS") {
            Ok(v) => Duration::from_secs(v.parse()?),
            Err(_) => Duration::from_secs(gateway::RATE_LIMIT_WINDOW_SECS),
        };
        let rate_limit_max = match std::env::var("RATE_LIMIT_MAX_REQUESTS") {
            Ok(v) => v.parse()?,
            Err(_) => gateway::RATE_LIMIT_MAX_REQUESTS,
        };

        let config = Self {
            reddit_client_id,
            reddit_client_secret,
            signing_secret,
            issuer,
            reddit_callback_url,
            port,
            user_agent,
            upstream_token_url: upstream::TOKEN_URL.to_string(),
            upstream_authorize_url: upstream::AUTHORIZE_URL.to_string(),
            upstream_api_url: upstream::API_BASE_URL.to_string(),
            pacing_delay: upstream::PACING_DELAY,
            rate_limit_window,
            rate_limit_max,
        };
        config.validate()?;
        Ok(config)
    }

    /// Create a test configuration pointed at a mock upstream.
    #[must_use]
    pub fn for_testing(upstream_base: &str) -> Self {
        Self {
            reddit_client_id: "test-reddit-id".to_string(),
            reddit_client_secret: "test-reddit-secret".to_string(),
            signing_secret: b"0123456789abcdef0123456789abcdef".to_vec(),
            issuer: "https://gateway.example.com".to_string(),
            reddit_callback_url: "https://gateway.example.com/oauth/reddit/callback".to_string(),
            port: 0,
            user_agent: "reddit-mcp-tests/0.0".to_string(),
            upstream_token_url: format!("{upstream_base}/api/v1/access_token"),
            upstream_authorize_url: format!("{upstream_base}/api/v1/authorize"),
            upstream_api_url: upstream_base.to_string(),
            pacing_delay: Duration::from_millis(0),
            rate_limit_window: Duration::from_secs(gateway::RATE_LIMIT_WINDOW_SECS),
            rate_limit_max: gateway::RATE_LIMIT_MAX_REQUESTS,
        }
    }

    /// Validate invariants the rest of the process relies on.
    ///
    /// # Errors
    ///
    /// Returns an error on a short signing secret or a relative issuer URL.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.signing_secret.len() < gateway::MIN_SIGNING_SECRET_LEN {
            anyhow::bail!(
                "TOKEN_SIGNING_SECRET must be at least {} bytes",
                gateway::MIN_SIGNING_SECRET_LEN
            );
        }
        let parsed = Url::parse(&self.issuer)
            .map_err(|e| anyhow::anyhow!("ISSUER_URL is not an absolute URL: {e}"))?;
        if parsed.cannot_be_a_base() {
            anyhow::bail!("ISSUER_URL is not an absolute URL");
        }
        Ok(())
    }

    /// The audience claim placed in minted bearer tokens.
    #[must_use]
    pub fn audience(&self) -> &str {
        &self.issuer
    }
}

fn require(name: &str) -> anyhow::Result<String> {
    std::env::var(name).map_err(|_| anyhow::anyhow!("missing required environment variable {name}"))
}
