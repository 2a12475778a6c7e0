use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{debug, error, info};

use crate::manager::ReservationManager;

/// Background backstop for the saga: reclaims inventory from holds the
/// orchestrator never confirmed or cancelled (crash, timeout, abandoned
/// checkout). One sweeper runs per inventory kind.
pub struct ExpirySweeper {
    manager: Arc<ReservationManager>,
    tick: Duration,
}

impl ExpirySweeper {
    pub fn new(manager: Arc<ReservationManager>, tick_seconds: u64) -> Self {
        Self {
            manager,
            tick: Duration::from_secs(tick_seconds),
        }
    }

    /// Runs forever; a failed sweep is logged and retried on the next tick.
    pub async fn run(self) {
        let kind = self.manager.kind().as_str();
        info!(kind, tick_seconds = self.tick.as_secs(), "expiry sweeper started");

        let mut ticker = interval(self.tick);
        loop {
            ticker.tick().await;
            match self.manager.sweep_expired().await {
                Ok(0) => debug!(kind, "expiry sweep found nothing to reclaim"),
                Ok(reclaimed) => info!(kind, reclaimed, "expiry sweep reclaimed lapsed holds"),
                Err(e) => error!(kind, error = %e, "expiry sweep failed"),
            }
        }
    }
}
