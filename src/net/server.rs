//! OpenFlow controller server.
//!
//! # Responsibilities
//! - Accept switch connections from the bounded listener
//! - Spawn one session task per switch
//! - Run the table sweeper alongside
//! - Drain sessions on shutdown

use std::sync::Arc;
use std::time::Duration;

use crate::config::ControllerConfig;
use crate::controller::{SharedController, Sweeper};
use crate::lifecycle::Shutdown;
use crate::net::connection::ConnectionTracker;
use crate::net::listener::{Listener, ListenerError};
use crate::net::session::SwitchSession;

/// How long shutdown waits for sessions to close.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ControllerServer {
    controller: SharedController,
    config: Arc<ControllerConfig>,
    tracker: ConnectionTracker,
}

impl ControllerServer {
    pub fn new(controller: SharedController, config: Arc<ControllerConfig>) -> Self {
        Self {
            controller,
            config,
            tracker: ConnectionTracker::new(),
        }
    }

    pub fn tracker(&self) -> ConnectionTracker {
        self.tracker.clone()
    }

    /// Accept switches until `shutdown` fires.
    pub async fn run(self, listener: Listener, shutdown: Shutdown) -> Result<(), ListenerError> {
        let addr = listener.local_addr().map_err(ListenerError::Accept)?;
        tracing::info!(address = %addr, "Controller server starting");

        let sweeper = Sweeper::new(
            self.controller.clone(),
            Duration::from_secs(self.config.session.sweep_interval_secs),
        );
        let sweeper_task = tokio::spawn(sweeper.run(shutdown.subscribe()));

        let mut stop = shutdown.subscribe();
        let result = loop {
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = stop.recv() => break Ok(()),
            };

            let (stream, peer, permit) = match accepted {
                Ok(conn) => conn,
                Err(ListenerError::Accept(e)) => {
                    tracing::warn!(error = %e, "Accept failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
                Err(e) => break Err(e),
            };

            let guard = self.tracker.track();
            let session = SwitchSession::new(
                guard.id(),
                peer,
                self.controller.clone(),
                self.config.listener.max_message_bytes,
            );
            let session_shutdown = shutdown.subscribe();

            tokio::spawn(async move {
                let _permit = permit;
                let _guard = guard;
                match session.run(stream, session_shutdown).await {
                    Ok(()) => tracing::info!(peer_addr = %peer, "Switch session ended"),
                    Err(e) => tracing::warn!(peer_addr = %peer, error = %e, "Switch session failed"),
                }
            });
        };

        if !self.tracker.wait_for_drain(DRAIN_TIMEOUT).await {
            tracing::warn!(active = self.tracker.active_count(), "Sessions still open after drain timeout");
        }
        let _ = sweeper_task.await;

        tracing::info!("Controller server stopped");
        result
    }
}
