//! Sampling demonstration tool and its continuation.
//!
//! `sampling_example` asks the connected client's LLM to suggest an action
//! for a piece of text, then hands the reply to the `suggest_action`
//! continuation, which validates the structured payload and emits a
//! `sampling/complete` notification on the session.

use serde::Deserialize;
use serde_json::json;

use super::{McpTool, ToolContext};
use crate::error::{ToolError, ToolResult};
use crate::protocol::CreateMessageParams;
use crate::server::sampling::CallbackSpec;

/// Continuation tag used by `sampling_example`.
pub const SUGGEST_ACTION: &str = "suggest_action";

/// Register the continuations the tools rely on.
#[must_use]
pub fn register_callbacks() -> Vec<CallbackSpec> {
    vec![CallbackSpec {
        name: SUGGEST_ACTION,
        description: "Structured action suggestion for a piece of content",
        output_schema: json!({
            "type": "object",
            "properties": {
                "action": {"type": "string", "enum": ["reply", "ignore", "escalate"]},
                "reasoning": {"type": "string"},
                "content": {"type": "string"}
            },
            "required": ["action", "reasoning"]
        }),
    }]
}

#[derive(Debug, Deserialize)]
struct SamplingExampleInput {
    text: String,
    #[serde(default)]
    temperature: Option<f64>,
}

/// End-to-end sampling round-trip demonstration.
pub struct SamplingExampleTool;

#[async_trait::async_trait]
impl McpTool for SamplingExampleTool {
    fn name(&self) -> &'static str {
        "sampling_example"
    }

    fn description(&self) -> &'static str {
        "Ask the connected client's LLM to suggest an action for the given text. \
         Demonstrates the server-initiated sampling round-trip."
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "text": {
                    "type": "string",
                    "description": "Content to analyze"
                },
                "temperature": {
                    "type": "number",
                    "description": "Sampling temperature hint"
                }
            },
            "required": ["text"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: serde_json::Value) -> ToolResult<String> {
        let params: SamplingExampleInput = serde_json::from_value(input)?;

        let mut request = CreateMessageParams::user_text(format!(
            "Suggest an action for the following content. Respond with a JSON object \
             with keys \"action\" (reply|ignore|escalate), \"reasoning\", and \
             optionally \"content\".\n\n{}",
            params.text
        ))
        .with_callback(SUGGEST_ACTION);
        request.system_prompt =
            Some("You are a triage assistant for Reddit content.".to_string());
        request.temperature = params.temperature;

        let result = ctx
            .instance
            .create_message(request, None)
            .await
            .map_err(ToolError::Sampling)?;

        let reply_text = result.content.as_text().unwrap_or_default();
        let summary = json!({
            "flow": {
                "session": ctx.session_id,
                "callback": SUGGEST_ACTION,
                "model": result.model,
                "stopReason": result.stop_reason,
            },
            "result": serde_json::from_str::<serde_json::Value>(reply_text)
                .unwrap_or_else(|_| json!(reply_text)),
        });

        Ok(serde_json::to_string_pretty(&summary)?)
    }
}
