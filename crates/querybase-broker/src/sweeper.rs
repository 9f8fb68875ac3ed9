//! Background idle sweeper (§4.9): scans the active map every 30 s.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::transaction::TransactionBroker;

const SCAN_INTERVAL: Duration = Duration::from_secs(30);

/// Owns the spawned sweep loop; dropping this does not stop it, call
/// [`IdleSweeper::stop`] explicitly during shutdown.
pub struct IdleSweeper {
    handle: JoinHandle<()>,
}

impl IdleSweeper {
    /// Spawn the periodic sweep loop against `broker`.
    pub fn spawn(broker: Arc<TransactionBroker>) -> Self {
        let handle = tokio::spawn(async move {
            loop {
                tokio::time::sleep(SCAN_INTERVAL).await;
                let swept = broker.sweep_idle().await;
                if swept > 0 {
                    tracing::info!(swept, "idle sweep rolled back stale held transactions");
                }
            }
        });
        Self { handle }
    }

    /// Stop the sweep loop.
    pub fn stop(self) {
        self.handle.abort();
    }
}
