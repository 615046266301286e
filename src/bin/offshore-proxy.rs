//! Offshore proxy.
//!
//! Accepts framed links from ship proxies, performs the real HTTP requests
//! and opens CONNECT tunnels on their behalf.

use clap::Parser;
use std::path::PathBuf;

use shipline::config::{self, OffshoreConfig};
use shipline::lifecycle::{signals, Shutdown};
use shipline::net::Listener;
use shipline::observability::{logging, metrics};
use shipline::offshore::{HttpForwarder, OffshoreDispatcher};

#[derive(Parser, Debug)]
#[command(name = "offshore-proxy", version, about = "Offshore end of the ship link")]
struct Cli {
    /// Address to bind [default: 0.0.0.0]
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on for ship links [default: 9999]
    #[arg(long)]
    port: Option<u16>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => config::load_offshore_config(path)?,
        None => OffshoreConfig::default(),
    };
    if cli.host.is_some() || cli.port.is_some() {
        config.server.bind_address =
            config::override_address(&config.server.bind_address, cli.host.as_deref(), cli.port);
    }
    if cli.verbose {
        config.observability.log_level = "debug".to_string();
    }
    let config = config::finalize_offshore_config(config)?;

    logging::init(&config.observability.log_level);
    tracing::info!("offshore-proxy v{} starting", env!("CARGO_PKG_VERSION"));

    if let Some(address) = &config.observability.metrics_address {
        match address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(metrics_address = %address, "Failed to parse metrics address"),
        }
    }

    let forwarder = HttpForwarder::new(&config.forward)?;
    let listener = Listener::bind(&config.server.bind_address, config.server.max_connections).await?;

    let shutdown = Shutdown::new();
    let drain_timeout = config.shutdown.drain_timeout();
    let dispatcher = OffshoreDispatcher::new(forwarder, config);
    let tracker = dispatcher.tracker();
    let mut server = tokio::spawn(dispatcher.run(listener, shutdown.subscribe()));

    tokio::select! {
        _ = signals::wait_for_signal() => {}
        res = &mut server => {
            if let Ok(Err(e)) = res {
                tracing::error!(error = %e, "Offshore proxy failed");
            }
        }
    }

    tracing::info!("Shutting down");
    shutdown.trigger();
    if !server.is_finished() {
        let _ = server.await;
    }

    if !tracker.drain(drain_timeout).await {
        tracing::warn!(
            remaining = tracker.active_count(),
            "Drain timeout elapsed with links still open"
        );
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
