//! Reddit MCP gateway - entry point.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use reddit_mcp::{config::Config, server::McpServer};

#[derive(Parser, Debug)]
#[command(name = "reddit-mcp")]
#[command(about = "MCP gateway for Reddit with an embedded OAuth 2.1 authorization server")]
#[command(version)]
struct Cli {
    /// HTTP server port (overrides the PORT environment variable)
    #[arg(long)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        subscriber.with(tracing_subscriber::fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.json_logs);

    let mut config = Config::from_env()?;
    if let Some(port) = cli.port {
        config.port = port;
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.port,
        issuer = %config.issuer,
        "Starting Reddit MCP gateway"
    );

    McpServer::new(config)?.run().await
}
