//! Periodic table maintenance.
//!
//! # Responsibilities
//! - Evict client bindings that outlived their idle timeout
//! - Release installed-pair keys whose rules the switch has expired

use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time;

use crate::controller::SharedController;

pub struct Sweeper {
    controller: SharedController,
    interval: Duration,
}

impl Sweeper {
    pub fn new(controller: SharedController, interval: Duration) -> Self {
        Self {
            controller,
            interval: interval.max(Duration::from_millis(10)),
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Sweeper starting");

        let mut ticker = time::interval(self.interval);
        // The first tick fires immediately and there is nothing to sweep yet.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.controller.sweep();
                }
                _ = shutdown.recv() => {
                    tracing::info!("Sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
