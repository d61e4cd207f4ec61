//! Browsing tools: browse_subreddit, search_reddit.

use serde::Deserialize;
use serde_json::json;

use super::{McpTool, ToolContext};
use crate::error::ToolResult;
use crate::formatters;

fn default_limit() -> u32 {
    10
}

fn default_sort() -> String {
    "hot".to_string()
}

#[derive(Debug, Deserialize)]
struct BrowseSubredditInput {
    subreddit: String,
    #[serde(default = "default_sort")]
    sort: String,
    #[serde(default = "default_limit")]
    limit: u32,
}

/// Subreddit listing tool.
pub struct BrowseSubredditTool;

#[async_trait::async_trait]
impl McpTool for BrowseSubredditTool {
    fn name(&self) -> &'static str {
        "browse_subreddit"
    }

    fn description(&self) -> &'static str {
        "Fetch posts from a subreddit listing. Sort by hot, new, top, or rising."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "subreddit": {
                    "type": "string",
                    "description": "Subreddit name without the r/ prefix (e.g., 'rust')"
                },
                "sort": {
                    "type": "string",
                    "enum": ["hot", "new", "top", "rising"],
                    "default": "hot"
                },
                "limit": {
                    "type": "integer",
                    "default": 10,
                    "description": "Number of posts to return (max 100)"
                }
            },
            "required": ["subreddit"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: BrowseSubredditInput = serde_json::from_value(input)?;
        let limit = params.limit.min(100);

        ctx.notify_progress(0, 1, "fetching listing").await;
        let posts = ctx
            .api
            .subreddit_posts(&ctx.credentials.access_token, &params.subreddit, &params.sort, limit)
            .await?;
        ctx.notify_progress(1, 1, "done").await;

        Ok(formatters::format_posts_markdown(&posts))
    }
}

#[derive(Debug, Deserialize)]
struct SearchRedditInput {
    query: String,
    #[serde(default = "default_limit")]
    limit: u32,
}

/// Site-wide search tool.
pub struct SearchRedditTool;

#[async_trait::async_trait]
impl McpTool for SearchRedditTool {
    fn name(&self) -> &'static str {
        "search_reddit"
    }

    fn description(&self) -> &'static str {
        "Search Reddit posts site-wide by keyword."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query"
                },
                "limit": {
                    "type": "integer",
                    "default": 10
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: SearchRedditInput = serde_json::from_value(input)?;
        let posts = ctx
            .api
            .search_posts(&ctx.credentials.access_token, &params.query, params.limit.min(100))
            .await?;

        Ok(formatters::format_posts_markdown(&posts))
    }
}
