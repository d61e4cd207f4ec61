//! Reddit API client.
//!
//! Carries both halves of the upstream relationship:
//! - the auth half: authorization-code exchange, token refresh, and user
//!   identification against Reddit's OAuth endpoints with HTTP Basic client
//!   authentication;
//! - the API half: authenticated reads against `oauth.reddit.com` with ~1 s
//!   pacing and a short-TTL response cache.
//!
//! The core consumes these through the `UpstreamAuth` and `UpstreamApi`
//! traits so tests can substitute stubs.

use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use moka::future::Cache;
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::config::{upstream, Config};
use crate::error::{ClientError, ClientResult};
use crate::models::{Comment, Identity, Listing, Post, PostDetail, Thing, UserAbout};

/// Token pair returned by the upstream token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamTokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
    #[serde(default)]
    pub scope: Option<String>,
}

fn default_expires_in() -> i64 {
    86_400
}

/// Upstream authorization operations the auth server depends on.
#[async_trait::async_trait]
pub trait UpstreamAuth: Send + Sync {
    /// Exchange an upstream authorization code for a token pair.
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> ClientResult<UpstreamTokenResponse>;

    /// Refresh an upstream token pair.
    async fn refresh_tokens(&self, refresh_token: &str) -> ClientResult<UpstreamTokenResponse>;

    /// Resolve the canonical user id for an upstream access token.
    async fn identify_user(&self, access_token: &str) -> ClientResult<String>;
}

/// Upstream read operations tools and resources depend on.
#[async_trait::async_trait]
pub trait UpstreamApi: Send + Sync {
    /// Posts from one subreddit listing (`hot`, `new`, `top`, `rising`).
    async fn subreddit_posts(
        &self,
        access_token: &str,
        subreddit: &str,
        sort: &str,
        limit: u32,
    ) -> ClientResult<Vec<Post>>;

    /// Site-wide search.
    async fn search_posts(
        &self,
        access_token: &str,
        query: &str,
        limit: u32,
    ) -> ClientResult<Vec<Post>>;

    /// One post with its top-level comments.
    async fn post_detail(&self, access_token: &str, post_id: &str) -> ClientResult<PostDetail>;

    /// A user's public profile.
    async fn user_about(&self, access_token: &str, username: &str) -> ClientResult<UserAbout>;

    /// The calling user's identity.
    async fn identity(&self, access_token: &str) -> ClientResult<Identity>;
}

/// Reddit HTTP client.
#[derive(Clone)]
pub struct RedditClient {
    http: ClientWithMiddleware,
    cache: Cache<String, serde_json::Value>,
    client_id: String,
    client_secret: String,
    token_url: String,
    api_url: String,
    pacing_delay: Duration,
    last_call: Arc<Mutex<Option<Instant>>>,
}

impl RedditClient {
    /// Create a new client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if HTTP client initialization fails.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(upstream::REQUEST_TIMEOUT)
            .connect_timeout(upstream::CONNECT_TIMEOUT)
            .gzip(true)
            .build()?;

        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(Duration::from_secs(1), Duration::from_secs(10))
            .build_with_max_retries(2);

        let http = ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        let cache = Cache::builder()
            .max_capacity(upstream::CACHE_MAX_SIZE)
            .time_to_live(upstream::CACHE_TTL)
            .build();

        Ok(Self {
            http,
            cache,
            client_id: config.reddit_client_id.clone(),
            client_secret: config.reddit_client_secret.clone(),
            token_url: config.upstream_token_url.clone(),
            api_url: config.upstream_api_url.clone(),
            pacing_delay: config.pacing_delay,
            last_call: Arc::new(Mutex::new(None)),
        })
    }

    /// Wait out the pacing window since the previous API call.
    async fn pace(&self) {
        if self.pacing_delay.is_zero() {
            return;
        }
        let mut last = self.last_call.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.pacing_delay {
                tokio::time::sleep(self.pacing_delay - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn post_token_form(&self, form: &[(&str, &str)]) -> ClientResult<UpstreamTokenResponse> {
        let response = self
            .http
            .post(&self.token_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Upstream token endpoint failed");
            return Err(ClientError::upstream(status.as_u16(), "token endpoint failure"));
        }

        Ok(response.json().await?)
    }

    /// Authenticated GET with pacing and caching. The cache key mixes a
    /// digest of the access token so callers never see each other's reads.
    async fn get_json(&self, access_token: &str, url: &str) -> ClientResult<serde_json::Value> {
        let cache_key = format!("{}:{url}", token_digest(access_token));
        if let Some(cached) = self.cache.get(&cache_key).await {
            return Ok(cached);
        }

        self.pace().await;

        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ClientError::RateLimited);
        }
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "Upstream API call failed");
            return Err(ClientError::upstream(status.as_u16(), "api call failure"));
        }

        let body: serde_json::Value = response.json().await?;
        self.cache.insert(cache_key, body.clone()).await;
        Ok(body)
    }
}

#[async_trait::async_trait]
impl UpstreamAuth for RedditClient {
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> ClientResult<UpstreamTokenResponse> {
        self.post_token_form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
        ])
        .await
    }

    async fn refresh_tokens(&self, refresh_token: &str) -> ClientResult<UpstreamTokenResponse> {
        self.post_token_form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    async fn identify_user(&self, access_token: &str) -> ClientResult<String> {
        let identity = self.identity(access_token).await?;
        Ok(identity.name)
    }
}

#[async_trait::async_trait]
impl UpstreamApi for RedditClient {
    async fn subreddit_posts(
        &self,
        access_token: &str,
        subreddit: &str,
        sort: &str,
        limit: u32,
    ) -> ClientResult<Vec<Post>> {
        let url = format!("{}/r/{subreddit}/{sort}.json?limit={limit}", self.api_url);
        let body = self.get_json(access_token, &url).await?;
        let listing: Listing<Post> = serde_json::from_value(body)?;
        Ok(listing.into_items())
    }

    async fn search_posts(
        &self,
        access_token: &str,
        query: &str,
        limit: u32,
    ) -> ClientResult<Vec<Post>> {
        let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
        let url = format!("{}/search.json?q={encoded}&limit={limit}", self.api_url);
        let body = self.get_json(access_token, &url).await?;
        let listing: Listing<Post> = serde_json::from_value(body)?;
        Ok(listing.into_items())
    }

    async fn post_detail(&self, access_token: &str, post_id: &str) -> ClientResult<PostDetail> {
        let url = format!("{}/comments/{post_id}.json?limit=50", self.api_url);
        let body = self.get_json(access_token, &url).await?;

        // The comments endpoint returns a two-element array: the post
        // listing, then the comment tree.
        let parts: Vec<serde_json::Value> = serde_json::from_value(body)?;
        let mut parts = parts.into_iter();

        let post_listing: Listing<Post> = match parts.next() {
            Some(value) => serde_json::from_value(value)?,
            None => return Err(ClientError::upstream(502, "empty comments response")),
        };
        let post = post_listing
            .into_items()
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::upstream(502, "post missing from comments response"))?;

        let comments = match parts.next() {
            Some(value) => flatten_comments(&value),
            None => Vec::new(),
        };

        Ok(PostDetail { post, comments })
    }

    async fn user_about(&self, access_token: &str, username: &str) -> ClientResult<UserAbout> {
        let url = format!("{}/user/{username}/about.json", self.api_url);
        let body = self.get_json(access_token, &url).await?;
        let thing: Thing<UserAbout> = serde_json::from_value(body)?;
        Ok(thing.data)
    }

    async fn identity(&self, access_token: &str) -> ClientResult<Identity> {
        let url = format!("{}/api/v1/me", self.api_url);
        let body = self.get_json(access_token, &url).await?;
        Ok(serde_json::from_value(body)?)
    }
}

impl std::fmt::Debug for RedditClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedditClient").field("api_url", &self.api_url).finish()
    }
}

/// Top-level comments out of the comment-tree listing. `more` stubs and
/// deleted entries are skipped.
fn flatten_comments(tree: &serde_json::Value) -> Vec<Comment> {
    let Some(children) = tree.pointer("/data/children").and_then(|v| v.as_array()) else {
        return Vec::new();
    };

    children
        .iter()
        .filter(|child| child.get("kind").and_then(|k| k.as_str()) == Some("t1"))
        .filter_map(|child| serde_json::from_value(child.get("data")?.clone()).ok())
        .collect()
}

fn token_digest(access_token: &str) -> String {
    let hash = Sha256::digest(access_token.as_bytes());
    URL_SAFE_NO_PAD.encode(&hash[..8])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_comments_skips_more_stubs() {
        let tree = serde_json::json!({
            "kind": "Listing",
            "data": {
                "children": [
                    {"kind": "t1", "data": {"id": "c1", "author": "bob", "body": "hi", "score": 1}},
                    {"kind": "more", "data": {"count": 12, "children": []}},
                    {"kind": "t1", "data": {"id": "c2", "author": "eve", "body": "yo", "score": 2}}
                ]
            }
        });

        let comments = flatten_comments(&tree);
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].id, "c1");
        assert_eq!(comments[1].author, "eve");
    }

    #[test]
    fn test_flatten_comments_empty_string_tree() {
        // Reddit sends "" instead of a listing when there are no replies.
        let comments = flatten_comments(&serde_json::json!(""));
        assert!(comments.is_empty());
    }

    #[test]
    fn test_token_digest_stable_and_short() {
        let a = token_digest("token-a");
        assert_eq!(a, token_digest("token-a"));
        assert_ne!(a, token_digest("token-b"));
        assert!(a.len() < 16);
    }

    #[test]
    fn test_token_response_defaults() {
        let resp: UpstreamTokenResponse =
            serde_json::from_str(r#"{"access_token": "A"}"#).unwrap();
        assert_eq!(resp.expires_in, 86_400);
        assert!(resp.refresh_token.is_none());
    }
}
