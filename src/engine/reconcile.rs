use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use super::TicketEngine;

/// Periodically reconciles every lot's counter with its active tickets.
/// Failures are logged and the next tick tries again.
pub fn spawn_reconciler(engine: Arc<TicketEngine>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it so startup stays quiet.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match engine.reconcile_all().await {
                Ok(reports) => {
                    let corrected = reports.iter().filter(|r| r.drifted).count();
                    if corrected > 0 {
                        info!(lots = reports.len(), corrected, "Reconciliation pass corrected drift");
                    } else {
                        debug!(lots = reports.len(), "Reconciliation pass clean");
                    }
                }
                Err(err) => error!(error = %err, "Reconciliation pass failed"),
            }
        }
    })
}
