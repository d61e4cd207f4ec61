//! Content tools: get_post, get_user.

use serde::Deserialize;
use serde_json::json;

use super::{McpTool, ToolContext};
use crate::error::ToolResult;
use crate::formatters;

#[derive(Debug, Deserialize)]
struct GetPostInput {
    post_id: String,
}

/// Post detail tool: one post plus its top-level comments.
pub struct GetPostTool;

#[async_trait::async_trait]
impl McpTool for GetPostTool {
    fn name(&self) -> &'static str {
        "get_post"
    }

    fn description(&self) -> &'static str {
        "Fetch a post and its top-level comments by post id."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "post_id": {
                    "type": "string",
                    "description": "Base-36 post id (e.g., '1abcde')"
                }
            },
            "required": ["post_id"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: GetPostInput = serde_json::from_value(input)?;
        let detail = ctx.api.post_detail(&ctx.credentials.access_token, &params.post_id).await?;
        Ok(formatters::format_post_detail_markdown(&detail))
    }
}

#[derive(Debug, Deserialize)]
struct GetUserInput {
    username: String,
}

/// User profile tool.
pub struct GetUserTool;

#[async_trait::async_trait]
impl McpTool for GetUserTool {
    fn name(&self) -> &'static str {
        "get_user"
    }

    fn description(&self) -> &'static str {
        "Fetch a Reddit user's public profile."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "username": {
                    "type": "string",
                    "description": "Username without the u/ prefix"
                }
            },
            "required": ["username"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: GetUserInput = serde_json::from_value(input)?;
        let user = ctx.api.user_about(&ctx.credentials.access_token, &params.username).await?;
        Ok(formatters::format_user_markdown(&user))
    }
}
