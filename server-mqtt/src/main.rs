use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use matter_gateway::{outbox::Outbox, Gateway, GatewayConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::{
    config::{Args, Settings},
    fabric::OfflineFabric,
    mqtt::MqttBridge,
    storage::RedbStore,
};

mod config;
mod fabric;
mod mqtt;
mod storage;

fn init_tracing(args: &Args) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    if args.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args);
    let settings = Settings::from_args(&args)?;

    let store = RedbStore::open(&settings.cache_path)
        .with_context(|| format!("opening {}", settings.cache_path.display()))?;
    let mut config = GatewayConfig::new(settings.mac.clone());
    config.max_cache_size = settings.cache_max_size;

    let (outbox, outbox_rx) = Outbox::channel();
    let (gateway, handle) = Gateway::start(
        config,
        Arc::new(OfflineFabric),
        Arc::new(store),
        outbox,
    );
    let restored = gateway.restore().await;
    info!(
        mac = %settings.mac,
        broker = %settings.broker.host,
        port = settings.broker.port,
        restored,
        "gateway ready"
    );

    let bridge = MqttBridge::new(&settings.broker, gateway.topics().clone())?;
    tokio::select! {
        _ = bridge.run(gateway, outbox_rx) => {}
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!(error = %e, "could not listen for shutdown signal");
            }
            info!("shutting down");
        }
    }

    // Dropping the connection without a DISCONNECT lets the broker publish our will
    handle.shutdown().await;
    Ok(())
}
