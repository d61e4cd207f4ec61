//! MCP wire types.
//!
//! JSON-RPC 2.0 framing plus the MCP request/result shapes the gateway
//! speaks, including the server-initiated `sampling/createMessage`
//! round-trip. See: <https://spec.modelcontextprotocol.io/>

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::McpError;

/// MCP protocol version the gateway declares.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Session id response/request header.
pub const SESSION_ID_HEADER: &str = "Mcp-Session-Id";

/// Protocol version request header.
pub const PROTOCOL_VERSION_HEADER: &str = "MCP-Protocol-Version";

/// JSON-RPC 2.0 request (or notification when `id` is absent).
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub id: Option<Value>,
}

impl JsonRpcRequest {
    /// Check if this is a notification (no response expected).
    #[must_use]
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: Cow<'static, str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    /// JSON-RPC version constant.
    const VERSION: &'static str = "2.0";

    #[must_use]
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self { jsonrpc: Cow::Borrowed(Self::VERSION), result: Some(result), error: None, id }
    }

    #[must_use]
    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: Cow::Borrowed(Self::VERSION),
            result: None,
            error: Some(JsonRpcError { code, message: message.into(), data: None }),
            id,
        }
    }

    /// Build an error response from a typed MCP error.
    #[must_use]
    pub fn from_mcp_error(id: Option<Value>, err: &McpError) -> Self {
        Self {
            jsonrpc: Cow::Borrowed(Self::VERSION),
            result: None,
            error: Some(JsonRpcError { code: err.code(), message: err.to_string(), data: err.data() }),
            id,
        }
    }
}

/// A server-initiated JSON-RPC request (sampling).
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcServerRequest {
    pub jsonrpc: Cow<'static, str>,
    pub id: String,
    pub method: Cow<'static, str>,
    pub params: Value,
}

impl JsonRpcServerRequest {
    #[must_use]
    pub fn new(id: String, method: &'static str, params: Value) -> Self {
        Self { jsonrpc: Cow::Borrowed("2.0"), id, method: Cow::Borrowed(method), params }
    }
}

/// A server-to-client notification (no id, fire-and-forget).
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: Cow<'static, str>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self { jsonrpc: Cow::Borrowed("2.0"), method: method.into(), params }
    }
}

/// Tool descriptor for `tools/list`.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Prompt descriptor for `prompts/list`.
#[derive(Debug, Clone, Serialize)]
pub struct PromptInfo {
    pub name: String,
    pub description: String,
    pub arguments: Vec<PromptArgumentInfo>,
}

/// One declared prompt argument.
#[derive(Debug, Clone, Serialize)]
pub struct PromptArgumentInfo {
    pub name: String,
    pub description: String,
    pub required: bool,
}

/// Resource descriptor for `resources/list`.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceInfo {
    pub uri: String,
    pub name: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

/// A role-tagged message in a sampling exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingMessage {
    pub role: String,
    pub content: MessageContent,
}

/// Message content block.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MessageContent {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image")]
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

impl MessageContent {
    /// The text payload, if this is a text block.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Image { .. } => None,
        }
    }
}

fn default_max_tokens() -> u32 {
    8192
}

/// Parameters for `sampling/createMessage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageParams {
    pub messages: Vec<SamplingMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_preferences: Option<Value>,
    /// Carries the server-side continuation tag under `callback`.
    #[serde(rename = "_meta", skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl CreateMessageParams {
    /// Build minimal params from one user message.
    #[must_use]
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            messages: vec![SamplingMessage {
                role: "user".to_string(),
                content: MessageContent::Text { text: text.into() },
            }],
            system_prompt: None,
            max_tokens: default_max_tokens(),
            temperature: None,
            top_p: None,
            top_k: None,
            stop_sequences: None,
            model_preferences: None,
            meta: None,
        }
    }

    /// The `_meta.callback` continuation tag, if present.
    #[must_use]
    pub fn callback_tag(&self) -> Option<&str> {
        self.meta.as_ref()?.get("callback")?.as_str()
    }

    /// Attach a continuation tag.
    #[must_use]
    pub fn with_callback(mut self, tag: &str) -> Self {
        self.meta = Some(serde_json::json!({ "callback": tag }));
        self
    }
}

/// Result of `sampling/createMessage`, returned by the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageResult {
    pub role: String,
    pub content: MessageContent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_default_params() {
        let req: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"tools/list","id":1}"#).unwrap();
        assert_eq!(req.method, "tools/list");
        assert!(req.params.is_null());
        assert!(!req.is_notification());
    }

    #[test]
    fn test_notification_has_no_id() {
        let req: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
                .unwrap();
        assert!(req.is_notification());
    }

    #[test]
    fn test_error_response_shape() {
        let resp = JsonRpcResponse::error(Some(serde_json::json!(7)), -32601, "Method not found");
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"code\":-32601"));
        assert!(!json.contains("\"result\""));
    }

    #[test]
    fn test_mcp_error_response_carries_paths() {
        let err = McpError::invalid_arguments(vec!["subreddit".into()]);
        let resp = JsonRpcResponse::from_mcp_error(Some(serde_json::json!(1)), &err);
        let data = resp.error.unwrap().data.unwrap();
        assert_eq!(data["paths"][0], "subreddit");
    }

    #[test]
    fn test_create_message_defaults() {
        let params: CreateMessageParams = serde_json::from_value(serde_json::json!({
            "messages": [{"role": "user", "content": {"type": "text", "text": "hi"}}]
        }))
        .unwrap();
        assert_eq!(params.max_tokens, 8192);
        assert!(params.callback_tag().is_none());
    }

    #[test]
    fn test_callback_tag_round_trip() {
        let params = CreateMessageParams::user_text("Summarize: X").with_callback("suggest_action");
        assert_eq!(params.callback_tag(), Some("suggest_action"));

        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["_meta"]["callback"], "suggest_action");
        assert_eq!(json["maxTokens"], 8192);
    }

    #[test]
    fn test_create_message_result_text() {
        let result: CreateMessageResult = serde_json::from_value(serde_json::json!({
            "role": "assistant",
            "content": {"type": "text", "text": "{\"action\":\"reply\"}"},
            "model": "local-llm",
            "stopReason": "endTurn"
        }))
        .unwrap();
        assert_eq!(result.content.as_text().unwrap(), "{\"action\":\"reply\"}");
    }
}
