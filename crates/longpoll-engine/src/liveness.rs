use std::sync::Arc;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::engine::DeliveryEngine;

/// Start the liveness monitor: one [`DeliveryEngine::sweep`] per configured interval,
/// until `cancel` fires.
///
/// Runs independently of request traffic and never waits on held polls.
pub fn start_monitor(
    engine: Arc<DeliveryEngine>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let period = engine.config().sweep_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // consume first immediate tick

        tracing::info!(
            period_ms = period.as_millis() as u64,
            sessions = engine.registry().len(),
            "liveness monitor started"
        );
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => engine.sweep().await,
            }
        }
        tracing::info!("liveness monitor stopped");
    })
}
