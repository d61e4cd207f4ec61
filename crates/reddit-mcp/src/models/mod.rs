//! Reddit data models.
//!
//! Reddit wraps everything in `kind`/`data` "thing" envelopes; listings nest
//! one more level. Fields the gateway does not use are simply not declared.

use serde::{Deserialize, Serialize};

/// A `kind`/`data` envelope around any Reddit object.
#[derive(Debug, Clone, Deserialize)]
pub struct Thing<T> {
    #[serde(default)]
    pub kind: String,
    pub data: T,
}

/// A listing envelope: `{"kind": "Listing", "data": {"children": [...]}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct Listing<T> {
    pub data: ListingData<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListingData<T> {
    #[serde(default = "Vec::new")]
    pub children: Vec<Thing<T>>,
    #[serde(default)]
    pub after: Option<String>,
}

impl<T> Listing<T> {
    /// Unwrap the children out of their envelopes.
    #[must_use]
    pub fn into_items(self) -> Vec<T> {
        self.data.children.into_iter().map(|t| t.data).collect()
    }
}

/// The authenticated user's identity (`/api/v1/me`).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Identity {
    pub name: String,
    #[serde(default)]
    pub total_karma: Option<i64>,
    #[serde(default)]
    pub created_utc: Option<f64>,
}

/// A link/self post.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Post {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub subreddit: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub num_comments: i64,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub created_utc: f64,
    #[serde(default)]
    pub over_18: bool,
}

/// A comment on a post. Replies arrive as a nested listing or an empty
/// string; both deserialize through `serde_json::Value` and are flattened
/// by the client.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Comment {
    pub id: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub created_utc: f64,
}

/// Subreddit metadata (`/r/<name>/about`).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Subreddit {
    pub display_name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub public_description: String,
    #[serde(default)]
    pub subscribers: Option<i64>,
}

/// A user's public profile (`/user/<name>/about`).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserAbout {
    pub name: String,
    #[serde(default)]
    pub total_karma: Option<i64>,
    #[serde(default)]
    pub link_karma: Option<i64>,
    #[serde(default)]
    pub comment_karma: Option<i64>,
    #[serde(default)]
    pub created_utc: Option<f64>,
}

/// A post together with its top-level comments.
#[derive(Debug, Clone, Serialize)]
pub struct PostDetail {
    pub post: Post,
    pub comments: Vec<Comment>,
}
