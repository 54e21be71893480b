//! OpenFlow VIP load balancer controller.
//!
//! # Architecture Overview
//!
//! ```text
//!                       ┌──────────────────────────────────────────────────┐
//!                       │                   CONTROLLER                      │
//!                       │                                                   │
//!   OpenFlow switch     │  ┌──────────┐    ┌──────────┐    ┌─────────────┐ │
//!   ────────────────────┼─▶│   net    │───▶│ openflow │───▶│ controller  │ │
//!   PACKET_IN           │  │ listener │    │  codec   │    │ classify    │ │
//!                       │  │ session  │    └──────────┘    └──────┬──────┘ │
//!                       │  └──────────┘                          │        │
//!                       │                                         ▼        │
//!                       │                ┌──────────┐    ┌─────────────┐  │
//!   PACKET_OUT          │                │  packet  │◀───│load_balancer│  │
//!   FLOW_MOD            │                │ ARP forge│    │ round robin │  │
//!   ◀───────────────────┼────────────────┴──────────┘    └─────────────┘  │
//!                       │                                                   │
//!                       │  ┌──────────┐ ┌──────────────┐ ┌──────────────┐  │
//!                       │  │  config  │ │observability │ │  lifecycle   │  │
//!                       │  └──────────┘ └──────────────┘ └──────────────┘  │
//!                       └──────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;

use ofp_balancer::config::{load_config, ControllerConfig};
use ofp_balancer::lifecycle::{self, Shutdown};
use ofp_balancer::observability::logging;

#[derive(Parser)]
#[command(name = "ofp-balancer")]
#[command(about = "OpenFlow controller for a transparent VIP load balancer", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "controller.toml")]
    config: PathBuf,

    /// Override the configured log level.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config: ControllerConfig = load_config(&args.config)?;

    let level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.observability.log_level);
    logging::init_logging(level);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "ofp-balancer starting");
    tracing::info!(
        config = %args.config.display(),
        bind_address = %config.listener.bind_address,
        virtual_ip = %config.service.virtual_ip,
        servers = config.servers.len(),
        policy = ?config.session.policy,
        "Configuration loaded"
    );

    let shutdown = Shutdown::new();
    lifecycle::spawn_signal_handler(shutdown.clone());

    lifecycle::start(config, shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
