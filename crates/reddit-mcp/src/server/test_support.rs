//! Stub collaborators for unit and integration tests.
//!
//! Mirrors `Config::for_testing`: everything here substitutes the upstream
//! so the gateway's own machinery can be driven without network access.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::client::{UpstreamApi, UpstreamAuth, UpstreamTokenResponse};
use crate::error::{ClientError, ClientResult};
use crate::models::{Comment, Identity, Post, PostDetail, UserAbout};
use crate::server::instance::McpInstance;
use crate::server::oauth::token::BearerClaims;
use crate::server::session::CredentialSnapshot;
use crate::server::Registries;

/// Canned upstream auth endpoint.
pub struct StubAuth {
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub fail_exchange: AtomicBool,
    pub fail_refresh: AtomicBool,
    pub refresh_calls: AtomicUsize,
}

impl Default for StubAuth {
    fn default() -> Self {
        Self {
            user_id: "alice".to_string(),
            access_token: "upstream-access".to_string(),
            refresh_token: "upstream-refresh".to_string(),
            expires_in: 86_400,
            fail_exchange: AtomicBool::new(false),
            fail_refresh: AtomicBool::new(false),
            refresh_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl UpstreamAuth for StubAuth {
    async fn exchange_code(
        &self,
        _code: &str,
        _redirect_uri: &str,
    ) -> ClientResult<UpstreamTokenResponse> {
        if self.fail_exchange.load(Ordering::SeqCst) {
            return Err(ClientError::upstream(500, "exchange refused"));
        }
        Ok(UpstreamTokenResponse {
            access_token: self.access_token.clone(),
            refresh_token: Some(self.refresh_token.clone()),
            expires_in: self.expires_in,
            scope: Some("identity read".to_string()),
        })
    }

    async fn refresh_tokens(&self, _refresh_token: &str) -> ClientResult<UpstreamTokenResponse> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(ClientError::upstream(502, "refresh refused"));
        }
        Ok(UpstreamTokenResponse {
            access_token: format!("{}-refreshed", self.access_token),
            refresh_token: Some(self.refresh_token.clone()),
            expires_in: self.expires_in,
            scope: Some("identity read".to_string()),
        })
    }

    async fn identify_user(&self, _access_token: &str) -> ClientResult<String> {
        Ok(self.user_id.clone())
    }
}

/// Canned upstream API.
#[derive(Default)]
pub struct StubApi {
    pub calls: AtomicUsize,
}

fn stub_post(id: &str, title: &str) -> Post {
    Post {
        id: id.to_string(),
        title: title.to_string(),
        author: "someone".to_string(),
        subreddit: "rust".to_string(),
        selftext: String::new(),
        url: None,
        score: 1,
        num_comments: 0,
        permalink: format!("/r/rust/comments/{id}/"),
        created_utc: 0.0,
        over_18: false,
    }
}

#[async_trait::async_trait]
impl UpstreamApi for StubApi {
    async fn subreddit_posts(
        &self,
        _access_token: &str,
        subreddit: &str,
        _sort: &str,
        _limit: u32,
    ) -> ClientResult<Vec<Post>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![stub_post("p1", &format!("Top of r/{subreddit}"))])
    }

    async fn search_posts(
        &self,
        _access_token: &str,
        query: &str,
        _limit: u32,
    ) -> ClientResult<Vec<Post>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![stub_post("s1", &format!("Result for {query}"))])
    }

    async fn post_detail(&self, _access_token: &str, post_id: &str) -> ClientResult<PostDetail> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(PostDetail {
            post: stub_post(post_id, "A post"),
            comments: vec![Comment {
                id: "c1".to_string(),
                author: "bob".to_string(),
                body: "First".to_string(),
                score: 2,
                created_utc: 0.0,
            }],
        })
    }

    async fn user_about(&self, _access_token: &str, username: &str) -> ClientResult<UserAbout> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(UserAbout {
            name: username.to_string(),
            total_karma: Some(100),
            link_karma: Some(60),
            comment_karma: Some(40),
            created_utc: None,
        })
    }

    async fn identity(&self, _access_token: &str) -> ClientResult<Identity> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Identity { name: "alice".to_string(), total_karma: Some(100), created_utc: None })
    }
}

/// Claims for a freshly minted bearer.
#[must_use]
pub fn test_claims(user: &str) -> BearerClaims {
    let now = chrono::Utc::now().timestamp();
    BearerClaims {
        iss: "https://gateway.example.com".to_string(),
        aud: "https://gateway.example.com".to_string(),
        sub: user.to_string(),
        iat: now,
        exp: now + 86_400,
        upstream_access_token: "upstream-access".to_string(),
        upstream_refresh_token: "upstream-refresh".to_string(),
    }
}

/// Registries over stub collaborators.
#[must_use]
pub fn test_registries() -> Arc<Registries> {
    Arc::new(Registries::new(Arc::new(StubApi::default())))
}

/// A bound instance with live credentials.
#[must_use]
pub fn test_instance(user: &str) -> Arc<McpInstance> {
    McpInstance::new(
        "test-session".to_string(),
        CredentialSnapshot::from(&test_claims(user)),
        test_registries(),
    )
}

/// A bound instance whose credential snapshot carries no authority.
#[must_use]
pub fn test_instance_without_credentials() -> Arc<McpInstance> {
    McpInstance::new(
        "test-session".to_string(),
        CredentialSnapshot {
            user_id: String::new(),
            access_token: String::new(),
            refresh_token: String::new(),
            issued_at: 0,
        },
        test_registries(),
    )
}
