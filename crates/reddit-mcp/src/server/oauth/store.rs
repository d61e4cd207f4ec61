//! In-memory OAuth state store.
//!
//! Three tables keyed by 32-byte random hex identifiers: pending
//! authorizations (10 min), one-shot authorization codes (10 min), refresh
//! token records (30 days). Single-use rows are removed atomically on read
//! so a replayed key is indistinguishable from an unknown one. A background
//! sweeper prunes expired rows; each table is capacity-bounded.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::RngCore;
use tokio::sync::RwLock;

use super::types::{AuthorizationCode, PendingAuthorization, RefreshTokenRecord, UpstreamTokens};

/// Pending authorization lifetime: 10 minutes.
pub const PENDING_TTL: Duration = Duration::from_secs(600);
/// Authorization code lifetime: 10 minutes.
pub const CODE_TTL: Duration = Duration::from_secs(600);
/// Refresh token lifetime: 30 days.
pub const REFRESH_TTL: Duration = Duration::from_secs(30 * 24 * 3600);
/// Sweep interval: 1 minute.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);
/// Per-table capacity bound.
const TABLE_CAPACITY: usize = 4096;

/// In-memory OAuth state store.
#[derive(Clone)]
pub struct OAuthStateStore {
    pending: Arc<RwLock<HashMap<String, PendingAuthorization>>>,
    codes: Arc<RwLock<HashMap<String, AuthorizationCode>>>,
    refresh: Arc<RwLock<HashMap<String, RefreshTokenRecord>>>,
}

impl OAuthStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: Arc::new(RwLock::new(HashMap::new())),
            codes: Arc::new(RwLock::new(HashMap::new())),
            refresh: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Generate a 32-byte random identifier, hex-encoded.
    #[must_use]
    pub fn generate_key() -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Store a pending authorization; returns its storage key.
    pub async fn insert_pending(&self, row: PendingAuthorization) -> String {
        let key = Self::generate_key();
        let mut table = self.pending.write().await;
        evict_for_capacity(&mut table, |r| (r.created_at, r.expires_at));
        table.insert(key.clone(), row);
        key
    }

    /// Atomically take a pending authorization. Expired rows are dropped.
    pub async fn take_pending(&self, key: &str) -> Option<PendingAuthorization> {
        let row = self.pending.write().await.remove(key)?;
        (row.expires_at > Instant::now()).then_some(row)
    }

    /// Store an authorization code row; returns the code.
    pub async fn insert_code(&self, row: AuthorizationCode) -> String {
        let code = Self::generate_key();
        let mut table = self.codes.write().await;
        evict_for_capacity(&mut table, |r| (r.created_at, r.expires_at));
        table.insert(code.clone(), row);
        code
    }

    /// Atomically consume an authorization code (one-time use).
    pub async fn take_code(&self, code: &str) -> Option<AuthorizationCode> {
        let row = self.codes.write().await.remove(code)?;
        (row.expires_at > Instant::now()).then_some(row)
    }

    /// Store a refresh token record; returns its opaque identifier.
    pub async fn insert_refresh(&self, row: RefreshTokenRecord) -> String {
        let id = Self::generate_key();
        let mut table = self.refresh.write().await;
        evict_for_capacity(&mut table, |r| (r.created_at, r.expires_at));
        table.insert(id.clone(), row);
        id
    }

    /// Look up a refresh token record without consuming it.
    pub async fn get_refresh(&self, id: &str) -> Option<RefreshTokenRecord> {
        let table = self.refresh.read().await;
        let row = table.get(id)?;
        (row.expires_at > Instant::now()).then(|| row.clone())
    }

    /// Replace the upstream pair on a refresh record after an upstream refresh.
    pub async fn update_refresh_tokens(&self, id: &str, tokens: UpstreamTokens) {
        if let Some(row) = self.refresh.write().await.get_mut(id) {
            row.tokens = tokens;
        }
    }

    /// Remove a refresh record (used when rotation invalidates the prior id).
    pub async fn remove_refresh(&self, id: &str) -> bool {
        self.refresh.write().await.remove(id).is_some()
    }

    /// Start the background sweeper task.
    pub fn start_sweeper(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                self.sweep().await;
            }
        });
    }

    /// Remove expired rows from every table.
    pub async fn sweep(&self) {
        let now = Instant::now();

        let removed = {
            let mut table = self.pending.write().await;
            let before = table.len();
            table.retain(|_, row| row.expires_at > now);
            before - table.len()
        };
        if removed > 0 {
            tracing::debug!(count = removed, "Swept expired pending authorizations");
        }

        let removed = {
            let mut table = self.codes.write().await;
            let before = table.len();
            table.retain(|_, row| row.expires_at > now);
            before - table.len()
        };
        if removed > 0 {
            tracing::debug!(count = removed, "Swept expired authorization codes");
        }

        let removed = {
            let mut table = self.refresh.write().await;
            let before = table.len();
            table.retain(|_, row| row.expires_at > now);
            before - table.len()
        };
        if removed > 0 {
            tracing::debug!(count = removed, "Swept expired refresh tokens");
        }
    }

    /// Row counts, for the health endpoint.
    pub async fn counts(&self) -> (usize, usize, usize) {
        (
            self.pending.read().await.len(),
            self.codes.read().await.len(),
            self.refresh.read().await.len(),
        )
    }
}

/// Make room in a full table: drop the oldest expired row first, otherwise
/// the oldest row outright (its in-flight flow will observe a missing row).
fn evict_for_capacity<T>(
    table: &mut HashMap<String, T>,
    meta: impl Fn(&T) -> (Instant, Instant),
) {
    if table.len() < TABLE_CAPACITY {
        return;
    }
    let now = Instant::now();

    // Oldest expired row first, otherwise the oldest row outright.
    let mut victim: Option<(String, Instant, bool)> = None;
    for (key, row) in table.iter() {
        let (created, expires) = meta(row);
        let expired = expires <= now;
        let better = match victim {
            None => true,
            Some((_, best_created, best_expired)) => {
                (expired && !best_expired) || (expired == best_expired && created < best_created)
            }
        };
        if better {
            victim = Some((key.clone(), created, expired));
        }
    }

    if let Some((key, _, _)) = victim {
        tracing::warn!("OAuth table at capacity, evicting oldest row");
        table.remove(&key);
    }
}

impl Default for OAuthStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OAuthStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthStateStore").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstream_tokens() -> UpstreamTokens {
        UpstreamTokens {
            access_token: "A".into(),
            refresh_token: "R".into(),
            expires_at: i64::MAX,
        }
    }

    fn pending_row() -> PendingAuthorization {
        let now = Instant::now();
        PendingAuthorization {
            redirect_uri: "http://localhost:5173/cb".into(),
            code_challenge: "challenge".into(),
            client_state: "abc".into(),
            upstream_nonce: "nonce".into(),
            scope: "read".into(),
            created_at: now,
            expires_at: now + PENDING_TTL,
        }
    }

    fn code_row() -> AuthorizationCode {
        let now = Instant::now();
        AuthorizationCode {
            redirect_uri: "http://localhost:5173/cb".into(),
            code_challenge: "challenge".into(),
            user_id: "alice".into(),
            tokens: upstream_tokens(),
            scope: "read".into(),
            created_at: now,
            expires_at: now + CODE_TTL,
        }
    }

    #[test]
    fn test_generate_key_is_64_hex_chars() {
        let key = OAuthStateStore::generate_key();
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(key, OAuthStateStore::generate_key());
    }

    #[tokio::test]
    async fn test_pending_single_consumption() {
        let store = OAuthStateStore::new();
        let key = store.insert_pending(pending_row()).await;

        assert!(store.take_pending(&key).await.is_some());
        assert!(store.take_pending(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_code_single_use() {
        let store = OAuthStateStore::new();
        let code = store.insert_code(code_row()).await;

        let row = store.take_code(&code).await.unwrap();
        assert_eq!(row.user_id, "alice");
        assert!(store.take_code(&code).await.is_none());
    }

    #[tokio::test]
    async fn test_expired_code_not_returned() {
        let store = OAuthStateStore::new();
        let mut row = code_row();
        row.expires_at = Instant::now() - Duration::from_secs(1);
        let code = store.insert_code(row).await;

        assert!(store.take_code(&code).await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_consumption_resolves_once() {
        let store = Arc::new(OAuthStateStore::new());
        let key = store.insert_pending(pending_row()).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            let key = key.clone();
            handles.push(tokio::spawn(async move { store.take_pending(&key).await.is_some() }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_refresh_lookup_does_not_consume() {
        let store = OAuthStateStore::new();
        let now = Instant::now();
        let id = store
            .insert_refresh(RefreshTokenRecord {
                user_id: "alice".into(),
                tokens: upstream_tokens(),
                scope: "read".into(),
                created_at: now,
                expires_at: now + REFRESH_TTL,
            })
            .await;

        assert!(store.get_refresh(&id).await.is_some());
        assert!(store.get_refresh(&id).await.is_some());
        assert!(store.remove_refresh(&id).await);
        assert!(store.get_refresh(&id).await.is_none());
    }

    #[tokio::test]
    async fn test_sweep_removes_expired() {
        let store = OAuthStateStore::new();
        let mut row = pending_row();
        row.expires_at = Instant::now() - Duration::from_secs(1);
        store.insert_pending(row).await;
        store.insert_pending(pending_row()).await;

        store.sweep().await;
        let (pending, _, _) = store.counts().await;
        assert_eq!(pending, 1);
    }

    #[tokio::test]
    async fn test_update_refresh_tokens() {
        let store = OAuthStateStore::new();
        let now = Instant::now();
        let id = store
            .insert_refresh(RefreshTokenRecord {
                user_id: "alice".into(),
                tokens: upstream_tokens(),
                scope: "read".into(),
                created_at: now,
                expires_at: now + REFRESH_TTL,
            })
            .await;

        store
            .update_refresh_tokens(
                &id,
                UpstreamTokens {
                    access_token: "A2".into(),
                    refresh_token: "R2".into(),
                    expires_at: i64::MAX,
                },
            )
            .await;

        let row = store.get_refresh(&id).await.unwrap();
        assert_eq!(row.tokens.access_token, "A2");
    }
}
