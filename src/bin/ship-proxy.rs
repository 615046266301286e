//! Ship-side proxy.
//!
//! Accepts HTTP/HTTPS proxy requests from ship clients and carries them,
//! one at a time, over a single persistent link to the offshore proxy.

use clap::Parser;
use std::path::PathBuf;

use shipline::config::{self, ShipConfig};
use shipline::lifecycle::{signals, Shutdown};
use shipline::net::Listener;
use shipline::observability::{logging, metrics};
use shipline::ship::{LocalFrontend, UplinkSession};

#[derive(Parser, Debug)]
#[command(name = "ship-proxy", version, about = "Ship-side proxy over a single offshore link")]
struct Cli {
    /// Offshore proxy host
    #[arg(long, required_unless_present = "config")]
    offshore_host: Option<String>,

    /// Offshore proxy port [default: 9999]
    #[arg(long)]
    offshore_port: Option<u16>,

    /// Local proxy port [default: 8080]
    #[arg(long)]
    listen_port: Option<u16>,

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
        Some(path) => config::load_ship_config(path)?,
        None => ShipConfig::default(),
    };
    if cli.offshore_host.is_some() || cli.offshore_port.is_some() {
        config.link.offshore_address = config::override_address(
            &config.link.offshore_address,
            cli.offshore_host.as_deref(),
            cli.offshore_port,
        );
    }
    if cli.listen_port.is_some() {
        config.local.bind_address = config::override_address(&config.local.bind_address, None, cli.listen_port);
    }
    if cli.verbose {
        config.observability.log_level = "debug".to_string();
    }
    let config = config::finalize_ship_config(config)?;

    logging::init(&config.observability.log_level);
    tracing::info!("ship-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        listen = %config.local.bind_address,
        offshore = %config.link.offshore_address,
        request_timeout_secs = config.local.request_timeout_secs,
        "Configuration loaded"
    );

    if let Some(address) = &config.observability.metrics_address {
        match address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(metrics_address = %address, "Failed to parse metrics address"),
        }
    }

    let listener = Listener::bind(&config.local.bind_address, config.local.max_connections).await?;

    let shutdown = Shutdown::new();
    let (uplink, worker) = UplinkSession::spawn(config.link.clone(), shutdown.subscribe());
    let frontend = LocalFrontend::new(uplink, config.local.clone(), config.tunnel.clone());
    let tracker = frontend.tracker();
    let mut server = tokio::spawn(frontend.run(listener, shutdown.subscribe()));

    tokio::select! {
        _ = signals::wait_for_signal() => {}
        res = &mut server => {
            if let Ok(Err(e)) = res {
                tracing::error!(error = %e, "Local proxy failed");
            }
        }
    }

    tracing::info!("Shutting down");
    shutdown.trigger();
    if !server.is_finished() {
        let _ = server.await;
    }
    let _ = worker.await;

    if !tracker.drain(config.shutdown.drain_timeout()).await {
        tracing::warn!(
            remaining = tracker.active_count(),
            "Drain timeout elapsed with clients still connected"
        );
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
