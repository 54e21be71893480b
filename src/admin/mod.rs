//! Read-only admin API over the controller's state.
//!
//! # Routes
//! - `GET /admin/status`   version, VIP, policy, switch and table counts
//! - `GET /admin/servers`  pool in rotation order with selection counts
//! - `GET /admin/bindings` client → server bindings
//! - `GET /admin/flows`    installed rule pairs
//!
//! Every route requires `Authorization: Bearer <admin.api_key>`.

pub mod auth;
pub mod handlers;

use axum::{middleware, routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::controller::SharedController;
use crate::lifecycle::Shutdown;
use crate::net::connection::ConnectionTracker;

/// State injected into admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub controller: SharedController,
    pub tracker: ConnectionTracker,
    pub api_key: Arc<str>,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/servers", get(get_servers))
        .route("/admin/bindings", get(get_bindings))
        .route("/admin/flows", get(get_flows))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the admin API until shutdown.
pub async fn serve_admin(addr: SocketAddr, state: AdminState, shutdown: Shutdown) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(address = %listener.local_addr()?, "Admin API listening");

    let mut stop = shutdown.subscribe();
    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(async move {
            let _ = stop.recv().await;
        })
        .await
}
