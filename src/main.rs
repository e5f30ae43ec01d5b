//! UDP Chat Hub
//!
//! Runs the chat hub on a single UDP socket.
//!
//! Usage:
//!   cargo run                                  # Listen on 0.0.0.0:5000, in-memory store
//!   cargo run -- --listen 127.0.0.1:6000       # Listen elsewhere
//!   cargo run -- --store ./data/chat.db        # Persist to SQLite
//!   RUST_LOG=debug cargo run

use std::net::SocketAddr;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use udpchat::{ChatConfig, Listener, open_store};

#[derive(Parser, Debug)]
#[command(name = "udpchat", version, about = "Multi-user chat hub over UDP")]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:5000")]
    listen: SocketAddr,

    /// Store endpoint: `memory` or a SQLite database path
    #[arg(long, default_value = "memory")]
    store: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let config = ChatConfig {
        bind_addr: args.listen,
        ..Default::default()
    };
    config.validate()?;

    info!("Configuration:");
    info!("  - Bind address: {}", config.bind_addr);
    info!("  - Store: {}", args.store);
    info!("  - History limit: {}", config.history_limit);
    info!("  - Max frame size: {} bytes", config.max_frame_size);

    let store = open_store(&args.store).with_context(|| format!("opening store {}", args.store))?;
    let listener = Listener::bind(config, store).await?;

    let stats = listener.hub().stats().await?;
    info!(
        "Hub ready: {} known clients, {} messages in history",
        stats.registered, stats.history_len
    );

    listener
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    Ok(())
}
