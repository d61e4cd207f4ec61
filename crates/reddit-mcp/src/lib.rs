//! Reddit MCP gateway.
//!
//! A network-exposed Model Context Protocol server that brokers Reddit on
//! behalf of each authenticated caller. Callers complete an OAuth 2.1
//! authorization-code flow with PKCE against the embedded authorization
//! server; the minted bearer carries the upstream token pair, and every
//! subsequent MCP request routes to a per-caller protocol engine over
//! streaming HTTP.
//!
//! # Features
//!
//! - **Embedded OAuth 2.1 server**: discovery, dynamic registration,
//!   PKCE-bound authorization codes, refresh grants
//! - **Per-session engines**: tools, prompts, resources, and
//!   server-initiated LLM sampling round-trips
//! - **Streamable HTTP**: one `/mcp` endpoint with SSE replay and
//!   keep-alives
//!
//! # Example
//!
//! ```no_run
//! use reddit_mcp::{config::Config, server::McpServer};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     McpServer::new(config)?.run().await
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod formatters;
pub mod models;
pub mod prompts;
pub mod protocol;
pub mod resources;
pub mod server;
pub mod tools;

pub use client::RedditClient;
pub use config::Config;
pub use error::{ClientError, McpError, OAuthError, ToolError};
