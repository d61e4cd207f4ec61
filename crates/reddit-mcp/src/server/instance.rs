//! Per-session MCP protocol engine.
//!
//! One instance per session: dispatches JSON-RPC methods through the shared
//! registries, initiates sampling round-trips on its own transport, and
//! resolves client replies back to the awaiting calls.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde_json::Value;

use crate::error::McpError;
use crate::protocol::{
    CreateMessageParams, CreateMessageResult, JsonRpcRequest, JsonRpcResponse,
    JsonRpcServerRequest, PROTOCOL_VERSION,
};
use crate::server::sampling::{SamplingCoordinator, SamplingOutcome, DEFAULT_SAMPLING_DEADLINE};
use crate::server::session::{CredentialSnapshot, StreamTransport};
use crate::server::Registries;
use crate::tools::{self, ToolContext};

/// A single caller's protocol engine.
pub struct McpInstance {
    session_id: String,
    transport: Arc<StreamTransport>,
    credentials: tokio::sync::RwLock<CredentialSnapshot>,
    sampling: SamplingCoordinator,
    registries: Arc<Registries>,
    /// Handle to self for tool contexts; set by `new`.
    self_weak: Weak<McpInstance>,
}

impl McpInstance {
    #[must_use]
    pub fn new(
        session_id: String,
        credentials: CredentialSnapshot,
        registries: Arc<Registries>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            session_id,
            transport: Arc::new(StreamTransport::new()),
            credentials: tokio::sync::RwLock::new(credentials),
            sampling: SamplingCoordinator::new(),
            registries,
            self_weak: weak.clone(),
        })
    }

    #[must_use]
    pub fn transport(&self) -> &Arc<StreamTransport> {
        &self.transport
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// The current credential snapshot.
    pub async fn credentials(&self) -> CredentialSnapshot {
        self.credentials.read().await.clone()
    }

    /// Offer a snapshot from an inbound request. The stored snapshot is only
    /// replaced by a strictly fresher one; it is never cleared or weakened.
    pub async fn offer_credentials(&self, snapshot: CredentialSnapshot) {
        if !snapshot.is_present() {
            return;
        }
        let mut current = self.credentials.write().await;
        if !current.is_present() || snapshot.issued_at > current.issued_at {
            *current = snapshot;
        }
    }

    /// Close the engine: no further frames, every pending sampling call
    /// resolves `transport_closed`. Idempotent.
    pub async fn close(&self) {
        self.transport.close();
        self.sampling.fail_all_closed().await;
    }

    /// Number of sampling calls in flight (health/tests).
    pub async fn pending_sampling(&self) -> usize {
        self.sampling.pending_count().await
    }

    /// Route a client reply (a JSON-RPC response frame) to the awaiting
    /// sampling call. Returns false for unknown correlation ids.
    pub async fn handle_client_reply(&self, correlation_id: &str, result: Value) -> bool {
        match serde_json::from_value::<CreateMessageResult>(result) {
            Ok(parsed) => self.sampling.resolve(correlation_id, parsed).await,
            Err(err) => {
                tracing::warn!(correlation_id, error = %err, "Malformed sampling reply");
                // A malformed reply still consumes the call so the awaiting
                // side does not hang until its deadline.
                self.sampling.abandon(correlation_id).await;
                false
            }
        }
    }

    /// Initiate a `sampling/createMessage` round-trip and suspend until the
    /// client replies, the deadline elapses, or the transport closes.
    ///
    /// # Errors
    ///
    /// `transport_closed` or `deadline_exceeded`.
    pub async fn create_message(
        &self,
        params: CreateMessageParams,
        deadline: Option<Duration>,
    ) -> Result<CreateMessageResult, McpError> {
        if self.transport.is_closed() {
            return Err(McpError::TransportClosed);
        }

        let callback_tag = params.callback_tag().map(str::to_string);
        let (correlation_id, rx) = self.sampling.register().await;

        let request = JsonRpcServerRequest::new(
            correlation_id.clone(),
            "sampling/createMessage",
            serde_json::to_value(&params).map_err(|_| McpError::Internal)?,
        );
        if self.transport.send_server_request(&request).await.is_none() {
            self.sampling.abandon(&correlation_id).await;
            return Err(McpError::TransportClosed);
        }

        let deadline = deadline.unwrap_or(DEFAULT_SAMPLING_DEADLINE);
        let outcome = match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => return Err(McpError::TransportClosed),
            Err(_) => {
                self.sampling.abandon(&correlation_id).await;
                return Err(McpError::DeadlineExceeded);
            }
        };

        match outcome {
            SamplingOutcome::Reply(result) => {
                if let Some(tag) = callback_tag {
                    self.registries.callbacks.dispatch(&tag, &result, &self.transport).await;
                }
                Ok(*result)
            }
            SamplingOutcome::Closed => Err(McpError::TransportClosed),
        }
    }

    /// Dispatch one client-initiated request. Returns `None` for accepted
    /// notifications (no response is owed).
    pub async fn handle_request(&self, req: JsonRpcRequest) -> Option<JsonRpcResponse> {
        if req.method.starts_with("notifications/") {
            return None;
        }
        let id = req.id.clone();

        let result = match req.method.as_str() {
            "initialize" => Ok(self.handle_initialize(&req.params)),
            "ping" => Ok(serde_json::json!({})),
            "tools/list" => Ok(self.handle_tools_list()),
            "tools/call" => self.handle_tools_call(&req.params).await,
            "prompts/list" => Ok(serde_json::json!({ "prompts": self.registries.prompts.list() })),
            "prompts/get" => self.handle_prompts_get(&req.params).await,
            "resources/list" => {
                Ok(serde_json::json!({ "resources": self.registries.resources.list() }))
            }
            "resources/read" => self.handle_resources_read(&req.params).await,
            other => Err(McpError::MethodNotFound(other.to_string())),
        };

        Some(match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(err) => JsonRpcResponse::from_mcp_error(id, &err),
        })
    }

    fn handle_initialize(&self, params: &Value) -> Value {
        let client_version = params
            .get("protocolVersion")
            .and_then(Value::as_str)
            .unwrap_or(PROTOCOL_VERSION);
        tracing::info!(session_id = %self.session_id, client_version, "MCP initialize");

        serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": { "listChanged": false },
                "prompts": { "listChanged": false },
                "resources": { "subscribe": false, "listChanged": false }
            },
            "serverInfo": {
                "name": "reddit-mcp",
                "version": env!("CARGO_PKG_VERSION")
            }
        })
    }

    fn handle_tools_list(&self) -> Value {
        let mut tools: Vec<_> = self
            .registries
            .tools
            .iter()
            .map(|t| crate::protocol::ToolInfo {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        serde_json::json!({ "tools": tools })
    }

    async fn handle_tools_call(&self, params: &Value) -> Result<Value, McpError> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| McpError::invalid_arguments(vec!["name".to_string()]))?;
        let arguments = params.get("arguments").cloned().unwrap_or_else(|| serde_json::json!({}));

        let credentials = self.credentials().await;
        if !credentials.is_present() {
            return Err(McpError::AuthenticationRequired);
        }

        let tool = self
            .registries
            .tools
            .iter()
            .find(|t| t.name() == name)
            .ok_or_else(|| McpError::NotFound(name.to_string()))?;

        tools::validate_arguments(tool.as_ref(), &arguments).map_err(McpError::from)?;

        let instance = self.self_weak.upgrade().ok_or(McpError::Internal)?;
        let ctx = ToolContext {
            api: Arc::clone(&self.registries.api),
            credentials,
            session_id: self.session_id.clone(),
            instance,
            progress_token: params.pointer("/_meta/progressToken").cloned(),
        };

        tracing::info!(session_id = %self.session_id, tool = %name, "Executing tool");

        match tool.execute(&ctx, arguments).await {
            Ok(text) => Ok(serde_json::json!({
                "content": [{ "type": "text", "text": text }],
                "isError": false
            })),
            Err(err) => {
                tracing::warn!(session_id = %self.session_id, tool = %name, error = %err, "Tool execution failed");
                Err(err.into())
            }
        }
    }

    async fn handle_prompts_get(&self, params: &Value) -> Result<Value, McpError> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| McpError::invalid_arguments(vec!["name".to_string()]))?;

        let arguments: HashMap<String, String> = params
            .get("arguments")
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        let credentials = self.credentials().await;
        let creds_ref = credentials.is_present().then_some(&credentials);

        self.registries
            .prompts
            .get(name, &arguments, &self.registries.resources, creds_ref)
            .await
    }

    async fn handle_resources_read(&self, params: &Value) -> Result<Value, McpError> {
        let uri = params
            .get("uri")
            .and_then(Value::as_str)
            .ok_or_else(|| McpError::invalid_arguments(vec!["uri".to_string()]))?;

        let credentials = self.credentials().await;
        let creds_ref = credentials.is_present().then_some(&credentials);

        let body = self.registries.resources.read(uri, creds_ref).await?;
        let mime_type = self.registries.resources.mime_type(uri).unwrap_or("text/plain");

        Ok(serde_json::json!({
            "contents": [{ "uri": uri, "mimeType": mime_type, "text": body }]
        }))
    }
}

impl std::fmt::Debug for McpInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpInstance").field("session_id", &self.session_id).finish()
    }
}
