use anyhow::{Context, Result};
use chat_relay::AppState;
use chat_relay::config::{FileConfig, RuntimeOverrides, ServerConfig, load_config};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(name = "chat-relay")]
#[command(about = "Broadcast chat over WebSockets with history replay")]
struct Cli {
    /// Config file (defaults to ./chat-relay.toml, missing is fine)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// HTML page served at /
    #[arg(long)]
    page: Option<PathBuf>,

    /// Enable debug logging (frame dumps at trace via RUST_LOG)
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let default_directive = if cli.debug {
        "chat_relay=debug,ws_wire=debug,tower_http=debug,info"
    } else {
        "chat_relay=info,ws_wire=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    let file_config: FileConfig = load_config(cli.config.as_deref())
        .extract()
        .context("Failed to load configuration")?;
    let overrides = RuntimeOverrides {
        host: cli.host,
        port: cli.port,
        page: cli.page,
    };
    let config = ServerConfig::resolve(&file_config, &overrides)?;

    let state = AppState::from_config(&config);
    let app = chat_relay::router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    let actual_addr = listener.local_addr()?;

    info!("Chat relay listening on http://{}", actual_addr);
    info!("  GET /        - {}", config.page_path.display());
    info!("  GET /chat   - WebSocket endpoint");
    info!("  GET /health - relay status");

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received shutdown signal");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error")?;

    info!("Shutdown complete");
    Ok(())
}
