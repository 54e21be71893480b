//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the controller from validated configuration
//! - Start background services (metrics, admin API)
//! - Bind the OpenFlow listener and begin accepting switches
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - The listener starts last, so no switch is served before the controller exists

use std::net::SocketAddr;
use std::sync::Arc;

use crate::admin::{serve_admin, AdminState};
use crate::config::ControllerConfig;
use crate::controller::{ControllerError, FlowController};
use crate::lifecycle::Shutdown;
use crate::net::{ControllerServer, Listener, ListenerError};
use crate::observability::metrics;

/// Error that prevents the controller from starting.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("controller: {0}")]
    Controller(#[from] ControllerError),

    #[error("listener: {0}")]
    Listener(#[from] ListenerError),

    #[error("metrics: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("invalid {field} address {value:?}")]
    Address { field: &'static str, value: String },
}

fn parse_addr(field: &'static str, value: &str) -> Result<SocketAddr, StartupError> {
    value.parse().map_err(|_| StartupError::Address {
        field,
        value: value.to_string(),
    })
}

/// Bring every subsystem up and serve until `shutdown` fires.
pub async fn start(config: ControllerConfig, shutdown: Shutdown) -> Result<(), StartupError> {
    let config = Arc::new(config);

    let controller = Arc::new(FlowController::new(&config)?);

    if config.observability.metrics_enabled {
        let addr = parse_addr("observability.metrics_address", &config.observability.metrics_address)?;
        metrics::init_metrics(addr)?;
    }

    let server = ControllerServer::new(controller.clone(), config.clone());

    if config.admin.enabled {
        let addr = parse_addr("admin.bind_address", &config.admin.bind_address)?;
        if config.admin.api_key == crate::config::AdminConfig::default().api_key {
            tracing::warn!("Admin API is using the default key; set admin.api_key");
        }
        let state = AdminState {
            controller: controller.clone(),
            tracker: server.tracker(),
            api_key: Arc::from(config.admin.api_key.as_str()),
        };
        let admin_shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_admin(addr, state, admin_shutdown).await {
                tracing::error!(error = %e, "Admin API failed");
            }
        });
    }

    let listener = Listener::bind(&config.listener).await?;
    server.run(listener, shutdown).await?;
    Ok(())
}
