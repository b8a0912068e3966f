use anyhow::Result;
use clap::Parser;
use registrar_core::{BusClient, CancellationToken, Registrar, SignalBridge};
use registrar_nats::NatsTransport;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod config;

use config::Config;

/// Advertise a route to the router over NATS until terminated
#[derive(Parser, Debug)]
#[command(name = "route-registrar", version)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(long, env = "ROUTE_REGISTRAR_CONFIG")]
    config: PathBuf,

    /// Emit logs as JSON
    #[arg(long, env = "ROUTE_REGISTRAR_JSON_LOGS")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    info!("Starting route-registrar...");

    let config = Config::load(&args.config)?;
    let registrar_config = config.registrar_config()?;
    info!("Configuration loaded from {}", args.config.display());

    // Armed before connecting so a signal during startup still ends in an unregister.
    let shutdown = CancellationToken::new();
    let _signals = SignalBridge::new(shutdown.clone()).listen()?;

    let bus = BusClient::new(Arc::new(NatsTransport::new()));
    let registrar = Registrar::new(registrar_config, bus);

    if let Err(e) = registrar.run(shutdown).await {
        error!("Route registrar failed: {}", e);
        return Err(e.into());
    }

    info!("route-registrar stopped");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
