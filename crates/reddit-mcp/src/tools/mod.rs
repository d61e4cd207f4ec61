//! MCP tool implementations.
//!
//! Each tool declares a name, description, and input schema, and executes
//! against the upstream through the handler context. Arguments are validated
//! against the declared schema before execution reaches the upstream.

mod browse;
mod content;
mod sampling;
pub mod schema;

pub use browse::*;
pub use content::*;
pub use sampling::*;

use std::sync::Arc;

use serde_json::Value;

use crate::client::UpstreamApi;
use crate::error::{ToolError, ToolResult};
use crate::protocol::JsonRpcNotification;
use crate::server::instance::McpInstance;
use crate::server::session::CredentialSnapshot;

/// Tool execution context.
///
/// Carries the upstream credential snapshot captured at session bind time,
/// the session id for correlation, and the instance handle for progress
/// notifications and sampling round-trips.
pub struct ToolContext {
    pub api: Arc<dyn UpstreamApi>,
    pub credentials: CredentialSnapshot,
    pub session_id: String,
    pub instance: Arc<McpInstance>,
    /// Progress correlation token from the request's `_meta`, if any.
    pub progress_token: Option<Value>,
}

impl ToolContext {
    /// Emit a progress notification on the session's stream. A no-op when
    /// the caller supplied no progress token.
    pub async fn notify_progress(&self, progress: u64, total: u64, message: &str) {
        let Some(ref token) = self.progress_token else {
            return;
        };
        let notification = JsonRpcNotification::new(
            "notifications/progress",
            Some(serde_json::json!({
                "progressToken": token,
                "progress": progress,
                "total": total,
                "message": message,
            })),
        );
        self.instance.transport().send_notification(&notification).await;
    }
}

/// Trait for MCP tools.
#[async_trait::async_trait]
pub trait McpTool: Send + Sync {
    /// Tool name (e.g., "browse_subreddit").
    fn name(&self) -> &'static str;

    /// Tool description for the LLM.
    fn description(&self) -> &'static str;

    /// JSON Schema for input parameters.
    fn input_schema(&self) -> Value;

    /// Execute the tool with validated input.
    async fn execute(&self, ctx: &ToolContext, input: Value) -> ToolResult<String>;
}

/// Validate arguments against a tool's declared schema.
///
/// # Errors
///
/// `InvalidArguments` naming each offending field path. Nothing reaches the
/// upstream when validation fails.
pub fn validate_arguments(tool: &dyn McpTool, arguments: &Value) -> ToolResult<()> {
    schema::validate(&tool.input_schema(), arguments)
        .map_err(|paths| ToolError::InvalidArguments { paths })
}

/// Register all tools.
#[must_use]
pub fn register_all_tools() -> Vec<Arc<dyn McpTool>> {
    vec![
        Arc::new(browse::BrowseSubredditTool),
        Arc::new(browse::SearchRedditTool),
        Arc::new(content::GetPostTool),
        Arc::new(content::GetUserTool),
        Arc::new(sampling::SamplingExampleTool),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_names_are_unique() {
        let tools = register_all_tools();
        let mut names: Vec<_> = tools.iter().map(|t| t.name()).collect();
        names.sort_unstable();
        let len = names.len();
        names.dedup();
        assert_eq!(names.len(), len);
    }

    #[test]
    fn test_every_schema_is_an_object() {
        for tool in register_all_tools() {
            let schema = tool.input_schema();
            assert_eq!(schema["type"], "object", "tool {}", tool.name());
        }
    }
}
