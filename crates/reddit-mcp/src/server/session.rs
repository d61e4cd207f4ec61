//! Session management for the streamable MCP transport.
//!
//! Implements the "mailbox" pattern: every session owns a ring buffer of
//! recent frames for replay plus a broadcast channel for live delivery.
//! The session table is the only way sessions are created, resolved, or
//! evicted; a janitor task sweeps idle sessions.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::response::sse::Event;
use tokio::sync::{broadcast, RwLock};

use crate::error::McpError;
use crate::protocol::{JsonRpcNotification, JsonRpcResponse, JsonRpcServerRequest};
use crate::server::instance::McpInstance;
use crate::server::oauth::token::BearerClaims;
use crate::server::Registries;

/// Maximum number of frames kept for replay per session.
const HISTORY_SIZE: usize = 100;

/// Idle timeout after which a session is evicted.
pub const SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(3600);

/// Janitor interval.
const JANITOR_INTERVAL: Duration = Duration::from_secs(300);

/// Upstream credentials captured from a verified bearer at bind time.
///
/// A snapshot is only ever replaced by a fresher one (later `issued_at`),
/// never cleared.
#[derive(Debug, Clone)]
pub struct CredentialSnapshot {
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: String,
    pub issued_at: i64,
}

impl CredentialSnapshot {
    /// Whether the snapshot actually carries upstream authority.
    #[must_use]
    pub fn is_present(&self) -> bool {
        !self.access_token.is_empty()
    }
}

impl From<&BearerClaims> for CredentialSnapshot {
    fn from(claims: &BearerClaims) -> Self {
        Self {
            user_id: claims.sub.clone(),
            access_token: claims.upstream_access_token.clone(),
            refresh_token: claims.upstream_refresh_token.clone(),
            issued_at: claims.iat,
        }
    }
}

/// A buffered frame with an id for replay support.
#[derive(Clone, Debug)]
pub struct BufferedEvent {
    /// Monotonically increasing per session.
    pub id: u64,
    /// SSE event type (always "message" for JSON-RPC frames).
    pub event_type: String,
    /// JSON payload.
    pub data: String,
}

impl BufferedEvent {
    /// Convert to an axum SSE event.
    #[must_use]
    pub fn to_sse_event(&self) -> Event {
        Event::default().id(self.id.to_string()).event(self.event_type.clone()).data(self.data.clone())
    }
}

/// Server-to-client framing over a single streaming connection.
///
/// Frames are JSON-RPC responses, server-initiated requests, and
/// notifications; the client correlates by id. Once closed, a transport
/// accepts no further frames.
pub struct StreamTransport {
    tx: broadcast::Sender<BufferedEvent>,
    history: RwLock<VecDeque<BufferedEvent>>,
    next_event_id: AtomicU64,
    closed: AtomicBool,
}

impl StreamTransport {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            tx,
            history: RwLock::new(VecDeque::with_capacity(HISTORY_SIZE)),
            next_event_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Push a frame. Returns the event id, or `None` when the transport is
    /// closed (frames after close are dropped, never reordered).
    pub async fn push(&self, data: String) -> Option<u64> {
        if self.is_closed() {
            return None;
        }
        let id = self.next_event_id.fetch_add(1, Ordering::SeqCst);
        let event = BufferedEvent { id, event_type: "message".to_string(), data };

        {
            let mut history = self.history.write().await;
            if history.len() >= HISTORY_SIZE {
                history.pop_front();
            }
            history.push_back(event.clone());
        }

        let _ = self.tx.send(event);
        Some(id)
    }

    /// Emit a response frame.
    pub async fn send_response(&self, response: &JsonRpcResponse) {
        if let Ok(data) = serde_json::to_string(response) {
            self.push(data).await;
        }
    }

    /// Emit a server-initiated request frame.
    pub async fn send_server_request(&self, request: &JsonRpcServerRequest) -> Option<u64> {
        let data = serde_json::to_string(request).ok()?;
        self.push(data).await
    }

    /// Emit a fire-and-forget notification frame.
    pub async fn send_notification(&self, notification: &JsonRpcNotification) {
        if let Ok(data) = serde_json::to_string(notification) {
            self.push(data).await;
        }
    }

    /// Frames after a given id, for replay on reconnection.
    pub async fn events_after(&self, last_event_id: u64) -> Vec<BufferedEvent> {
        let history = self.history.read().await;
        history.iter().filter(|e| e.id > last_event_id).cloned().collect()
    }

    /// Subscribe to live frames.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BufferedEvent> {
        self.tx.subscribe()
    }

    /// Close the transport. Idempotent.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Default for StreamTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// A single caller's session: protocol engine plus activity bookkeeping.
pub struct Session {
    pub id: String,
    pub instance: Arc<McpInstance>,
    pub created_at: Instant,
    last_active: RwLock<Instant>,
}

impl Session {
    fn new(id: String, instance: Arc<McpInstance>) -> Self {
        Self { id, instance, created_at: Instant::now(), last_active: RwLock::new(Instant::now()) }
    }

    /// Update the last-touched timestamp.
    pub async fn touch(&self) {
        *self.last_active.write().await = Instant::now();
    }

    /// Whether the session has been idle longer than `timeout`.
    pub async fn is_stale(&self, timeout: Duration) -> bool {
        self.last_active.read().await.elapsed() > timeout
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("id", &self.id).finish()
    }
}

/// Concurrent map of session id → session.
#[derive(Clone)]
pub struct SessionTable {
    sessions: Arc<RwLock<HashMap<String, Arc<Session>>>>,
    registries: Arc<Registries>,
    idle_timeout: Duration,
}

impl SessionTable {
    #[must_use]
    pub fn new(registries: Arc<Registries>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            registries,
            idle_timeout: SESSION_IDLE_TIMEOUT,
        }
    }

    /// Override the idle timeout (tests).
    #[must_use]
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Bind a request to its session.
    ///
    /// With no session id a new session is minted and its id must be echoed
    /// to the caller. With an id, the existing session is returned, its
    /// last-touched timestamp updated, and its credential snapshot replaced
    /// when the request carries a fresher one.
    ///
    /// # Errors
    ///
    /// `session_not_found` when the id is unknown (including evicted ids).
    pub async fn bind_or_create(
        &self,
        claims: &BearerClaims,
        session_id: Option<&str>,
    ) -> Result<Arc<Session>, McpError> {
        if let Some(id) = session_id {
            let session = self
                .get(id)
                .await
                .ok_or_else(|| McpError::SessionNotFound(id.to_string()))?;
            session.touch().await;
            session.instance.offer_credentials(CredentialSnapshot::from(claims)).await;
            return Ok(session);
        }

        let id = uuid::Uuid::new_v4().to_string();
        let instance = McpInstance::new(
            id.clone(),
            CredentialSnapshot::from(claims),
            Arc::clone(&self.registries),
        );
        let session = Arc::new(Session::new(id.clone(), instance));
        self.sessions.write().await.insert(id.clone(), Arc::clone(&session));

        tracing::info!(session_id = %id, "Created new session");
        Ok(session)
    }

    /// Get an existing session by id.
    pub async fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Close and remove a session.
    pub async fn close_session(&self, id: &str) -> bool {
        let removed = self.sessions.write().await.remove(id);
        match removed {
            Some(session) => {
                session.instance.close().await;
                tracing::info!(session_id = %id, "Closed session");
                true
            }
            None => false,
        }
    }

    /// Evict sessions idle past the timeout. Returns the eviction count.
    pub async fn evict_stale(&self) -> usize {
        let mut stale = Vec::new();
        {
            let sessions = self.sessions.read().await;
            for (id, session) in sessions.iter() {
                if session.is_stale(self.idle_timeout).await {
                    stale.push(id.clone());
                }
            }
        }

        let mut evicted = 0;
        for id in stale {
            if self.close_session(&id).await {
                evicted += 1;
            }
        }
        if evicted > 0 {
            tracing::info!(count = evicted, "Evicted idle sessions");
        }
        evicted
    }

    /// Session count, for the health endpoint.
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Start the background janitor task.
    pub fn start_janitor(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(JANITOR_INTERVAL);
            loop {
                interval.tick().await;
                self.evict_stale().await;
            }
        });
    }

    /// Close every session (server shutdown).
    pub async fn shutdown(&self) {
        let ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        for id in ids {
            self.close_session(&id).await;
        }
    }
}

impl std::fmt::Debug for SessionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTable").finish()
    }
}
