//! Gateway server wiring.
//!
//! Builds the collaborator registries, the shared application state, and the
//! HTTP router, and owns process lifecycle: background sweepers start here
//! and graceful shutdown closes every session.

pub mod instance;
pub mod middleware;
pub mod oauth;
pub mod sampling;
pub mod session;
pub mod transport;

#[doc(hidden)]
pub mod test_support;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::client::{RedditClient, UpstreamApi, UpstreamAuth};
use crate::config::Config;
use crate::prompts::PromptRegistry;
use crate::resources::ResourceRegistry;
use crate::tools::{self, McpTool};
use middleware::RateLimiter;
use oauth::{OAuthStateStore, TokenCodec};
use sampling::CallbackRegistry;
use session::SessionTable;

/// The collaborator ports every session's engine dispatches through.
pub struct Registries {
    pub tools: Vec<Arc<dyn McpTool>>,
    pub prompts: PromptRegistry,
    pub resources: ResourceRegistry,
    pub callbacks: CallbackRegistry,
    pub api: Arc<dyn UpstreamApi>,
}

impl Registries {
    #[must_use]
    pub fn new(api: Arc<dyn UpstreamApi>) -> Self {
        Self {
            tools: tools::register_all_tools(),
            prompts: PromptRegistry::new(),
            resources: ResourceRegistry::new(Arc::clone(&api)),
            callbacks: CallbackRegistry::new(tools::register_callbacks()),
            api,
        }
    }
}

/// Shared state behind every handler.
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<OAuthStateStore>,
    pub codec: TokenCodec,
    pub auth: Arc<dyn UpstreamAuth>,
    pub sessions: Arc<SessionTable>,
    pub rate_limiter: RateLimiter,
}

/// The MCP gateway server.
pub struct McpServer {
    state: Arc<AppState>,
}

impl McpServer {
    /// Create a server backed by the real Reddit client.
    ///
    /// # Errors
    ///
    /// Returns an error when config validation or client construction fails.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        config.validate()?;
        let client = Arc::new(RedditClient::new(&config)?);
        let auth: Arc<dyn UpstreamAuth> = Arc::clone(&client) as Arc<dyn UpstreamAuth>;
        let api: Arc<dyn UpstreamApi> = client;
        Ok(Self::with_collaborators(config, auth, api))
    }

    /// Create a server with explicit collaborators (tests).
    #[must_use]
    pub fn with_collaborators(
        config: Config,
        auth: Arc<dyn UpstreamAuth>,
        api: Arc<dyn UpstreamApi>,
    ) -> Self {
        let config = Arc::new(config);
        let codec = TokenCodec::new(
            config.signing_secret.clone(),
            config.issuer.clone(),
            config.audience().to_string(),
        );
        let registries = Arc::new(Registries::new(api));
        let state = Arc::new(AppState {
            codec,
            store: Arc::new(OAuthStateStore::new()),
            auth,
            sessions: Arc::new(SessionTable::new(registries)),
            rate_limiter: RateLimiter::new(config.rate_limit_window, config.rate_limit_max),
            config,
        });
        Self { state }
    }

    /// The shared state (tests).
    #[must_use]
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Build the router.
    #[must_use]
    pub fn router(&self) -> axum::Router {
        transport::create_router(Arc::clone(&self.state))
    }

    /// Serve until ctrl-c, then close every session.
    ///
    /// # Errors
    ///
    /// Returns an error on bind or serve failure.
    pub async fn run(self) -> anyhow::Result<()> {
        Arc::clone(&self.state.store).start_sweeper();
        Arc::clone(&self.state.sessions).start_janitor();

        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.port));
        let router = self
            .router()
            .into_make_service_with_connect_info::<SocketAddr>();

        tracing::info!(%addr, issuer = %self.state.config.issuer, "Gateway listening");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).with_graceful_shutdown(shutdown_signal()).await?;

        self.state.sessions.shutdown().await;
        tracing::info!("Gateway shut down");
        Ok(())
    }
}

impl std::fmt::Debug for McpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServer").finish()
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.expect("Failed to install CTRL+C handler");
    tracing::info!("Received shutdown signal");
}
