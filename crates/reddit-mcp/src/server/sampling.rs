//! Server-initiated sampling round-trips.
//!
//! A sampling call is a rendezvous: the server emits a correlated request on
//! the session's stream, suspends on a one-shot resolver, and resumes when
//! the client replies (or the deadline elapses, or the transport closes).
//! Each call resolves exactly once; late replies are dropped.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};

use crate::error::McpError;
use crate::protocol::{CreateMessageResult, JsonRpcNotification};
use crate::server::session::StreamTransport;
use crate::tools::schema;

/// Default deadline for a sampling round-trip.
pub const DEFAULT_SAMPLING_DEADLINE: Duration = Duration::from_secs(120);

/// How a sampling call resolved.
#[derive(Debug)]
pub enum SamplingOutcome {
    /// The client replied on the correlation id.
    Reply(Box<CreateMessageResult>),
    /// The transport closed while the call was pending.
    Closed,
}

/// Pending sampling calls for one session, keyed by correlation id.
pub struct SamplingCoordinator {
    pending: Mutex<HashMap<String, oneshot::Sender<SamplingOutcome>>>,
}

impl SamplingCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self { pending: Mutex::new(HashMap::new()) }
    }

    /// Register a new call; returns its correlation id and resolver.
    pub async fn register(&self) -> (String, oneshot::Receiver<SamplingOutcome>) {
        let id = format!("samp-{}", uuid::Uuid::new_v4());
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);
        (id, rx)
    }

    /// Resolve a pending call with the client's reply. Returns false when the
    /// correlation id is unknown (already resolved, timed out, or bogus).
    pub async fn resolve(&self, correlation_id: &str, result: CreateMessageResult) -> bool {
        match self.pending.lock().await.remove(correlation_id) {
            Some(tx) => tx.send(SamplingOutcome::Reply(Box::new(result))).is_ok(),
            None => false,
        }
    }

    /// Drop a call after its deadline so a late reply cannot resolve it.
    pub async fn abandon(&self, correlation_id: &str) {
        self.pending.lock().await.remove(correlation_id);
    }

    /// Resolve every pending call as transport-closed.
    pub async fn fail_all_closed(&self) {
        let drained: Vec<_> = self.pending.lock().await.drain().collect();
        for (_, tx) in drained {
            let _ = tx.send(SamplingOutcome::Closed);
        }
    }

    /// Number of calls in flight.
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

impl Default for SamplingCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// A named server-side continuation for a sampling reply.
///
/// The continuation parses the reply's text block as JSON, validates it
/// against the declared output schema, and emits a `sampling/complete`
/// notification on the session's transport.
pub struct CallbackSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub output_schema: serde_json::Value,
}

/// Registry of named continuations.
pub struct CallbackRegistry {
    callbacks: HashMap<&'static str, Arc<CallbackSpec>>,
}

impl CallbackRegistry {
    #[must_use]
    pub fn new(specs: Vec<CallbackSpec>) -> Self {
        Self { callbacks: specs.into_iter().map(|s| (s.name, Arc::new(s))).collect() }
    }

    #[must_use]
    pub fn get(&self, tag: &str) -> Option<Arc<CallbackSpec>> {
        self.callbacks.get(tag).cloned()
    }

    /// Dispatch a sampling reply to the named continuation.
    ///
    /// Unknown tags are logged and ignored. Returns the validated payload
    /// when the continuation accepted the reply.
    pub async fn dispatch(
        &self,
        tag: &str,
        result: &CreateMessageResult,
        transport: &StreamTransport,
    ) -> Option<serde_json::Value> {
        let Some(spec) = self.get(tag) else {
            tracing::warn!(callback = %tag, "Unknown sampling callback tag, ignoring");
            return None;
        };

        let payload = match parse_reply_payload(result) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(callback = %tag, error = %err, "Sampling reply payload rejected");
                emit_complete(transport, tag, Err(err)).await;
                return None;
            }
        };

        if let Err(paths) = schema::validate(&spec.output_schema, &payload) {
            let err = McpError::invalid_arguments(paths);
            tracing::warn!(callback = %tag, error = %err, "Sampling reply failed schema validation");
            emit_complete(transport, tag, Err(err)).await;
            return None;
        }

        emit_complete(transport, tag, Ok(payload.clone())).await;
        Some(payload)
    }
}

/// Extract the JSON payload from the reply's text block.
fn parse_reply_payload(result: &CreateMessageResult) -> Result<serde_json::Value, McpError> {
    let text = result
        .content
        .as_text()
        .ok_or_else(|| McpError::invalid_arguments(vec!["content".to_string()]))?;
    serde_json::from_str(text)
        .map_err(|_| McpError::invalid_arguments(vec!["content.text".to_string()]))
}

async fn emit_complete(
    transport: &StreamTransport,
    tag: &str,
    outcome: Result<serde_json::Value, McpError>,
) {
    let params = match outcome {
        Ok(payload) => serde_json::json!({ "callback": tag, "result": payload }),
        Err(err) => serde_json::json!({
            "callback": tag,
            "error": { "code": err.code(), "message": err.to_string() },
        }),
    };
    transport
        .send_notification(&JsonRpcNotification::new("sampling/complete", Some(params)))
        .await;
}
