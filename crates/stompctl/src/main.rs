use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use stompconf::Config;
use stomprack::{Rack, RackMode, RackOptions};

/// Mirror a pedalboard host and keep its effect chain wired.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file path (default: discovered, see stompconf docs)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host REST URL, overriding config and STOMPRACK_SERVER
    #[arg(short, long)]
    server: Option<String>,

    /// Watch only: mirror state but never rewire the host
    #[arg(long)]
    observer: bool,

    /// Log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let mut config = Config::load(cli.config.as_deref()).context("failed to load config")?;
    if let Some(server) = cli.server {
        config.server.url = server;
    }
    tracing::info!(
        server = %config.server.url,
        feed = %config.server.feed_addr(),
        plugins = config.plugins.len(),
        "starting"
    );

    let mode = if cli.observer {
        RackMode::Observer
    } else {
        RackMode::Manager
    };
    let rack = Rack::new(
        config,
        RackOptions {
            mode,
            ..RackOptions::default()
        },
    )
    .context("failed to build rack")?;

    // Print the chain whenever its order settles.
    let mut orders = rack.subscribe_order_changes();
    tokio::spawn(async move {
        while let Ok(order) = orders.recv().await {
            if order.is_empty() {
                tracing::info!("chain: (empty)");
            } else {
                tracing::info!(chain = %order.join(" -> "), "chain order");
            }
        }
    });

    rack.connect();
    tracing::info!("connected, press ctrl-c to stop");

    tokio::signal::ctrl_c().await.context("signal handler")?;
    tracing::info!("shutting down");
    rack.disconnect();

    Ok(())
}
