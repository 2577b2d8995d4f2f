use anyhow::{Context, Result};
use clap::Parser;
use drone_action::action::ActionDispatcher;
use drone_action::config::ServiceConfig;
use drone_action::gateway::mav::MavlinkGateway;
use drone_action::gateway::{ack_channel, VehicleId};
use drone_action::rpc::{ActionService, RpcServer};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Action command server for MAVLink vehicles
#[derive(Parser, Debug)]
#[command(name = "action-server", version, about)]
struct Args {
    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// RPC listen address, e.g. 127.0.0.1:50051
    #[arg(short, long)]
    listen: Option<String>,

    /// MAVLink connection string, e.g. udpin:0.0.0.0:14540 or serial:/dev/ttyACM0:57600
    #[arg(long)]
    connection: Option<String>,

    /// System id used when a request names system 0
    #[arg(long)]
    target: Option<u8>,

    /// Default acknowledgment timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,
}

impl Args {
    fn into_config(self) -> Result<ServiceConfig> {
        let mut config = match &self.config {
            Some(path) => ServiceConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => ServiceConfig::default(),
        };

        if let Some(listen) = self.listen {
            config.rpc.listen = listen;
        }
        if let Some(connection) = self.connection {
            config.vehicle.connection = connection;
        }
        if let Some(target) = self.target {
            config.vehicle.default_target = target;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.timeouts.default_ms = timeout_ms;
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = Args::parse().into_config()?;

    info!("Action server starting");
    info!("  Vehicle link: {}", config.vehicle.connection);
    info!("  Default target: system {}", config.vehicle.default_target);
    info!(
        "  Timeouts: default {:?}",
        Duration::from_millis(config.timeouts.default_ms)
    );

    let (ack_tx, ack_rx) = ack_channel();
    let gateway = MavlinkGateway::start(config.vehicle.clone(), config.parameters.clone(), ack_tx);
    let dispatcher = ActionDispatcher::new(gateway, config.timeouts.clone(), ack_rx);
    let service = ActionService::new(dispatcher, VehicleId(config.vehicle.default_target));

    let server = RpcServer::bind(&config.rpc.listen)
        .await
        .with_context(|| format!("binding {}", config.rpc.listen))?;

    tokio::select! {
        result = server.run(service) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Shutting down");
        }
    }

    Ok(())
}
