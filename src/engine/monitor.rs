use crate::engine::PolicyEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Running monitor task. Dropping the handle stops ticking without restoring anything.
pub struct MonitorHandle {
    engine: Arc<PolicyEngine>,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn engine(&self) -> &Arc<PolicyEngine> {
        &self.engine
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stops scheduling ticks, waits for the current one, then shuts the engine down.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!("Monitor task ended abnormally: {}", e);
        }
        self.engine.shutdown().await;
    }
}

/// Ticks `engine` every `tickIntervalSecs`. A tick that overruns the interval
/// makes the monitor skip the missed ticks instead of bursting.
pub fn spawn_monitor(engine: Arc<PolicyEngine>) -> MonitorHandle {
    let (stop_tx, stop_rx) = watch::channel(false);
    let task = tokio::spawn(run_monitor(engine.clone(), stop_rx));
    MonitorHandle {
        engine,
        stop_tx,
        task,
    }
}

async fn run_monitor(engine: Arc<PolicyEngine>, mut stop_rx: watch::Receiver<bool>) {
    let mut period_secs = engine.config().read().await.tick_interval_secs.max(1);
    let mut interval = tokio::time::interval(Duration::from_secs(period_secs));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tracing::info!("Policy monitor started, ticking every {}s", period_secs);

    loop {
        tokio::select! {
            biased;
            _ = stop_rx.changed() => break,
            _ = interval.tick() => {}
        }

        let report = engine.tick().await;
        if !report.skipped && !report.enumeration_failed {
            tracing::debug!(
                "Tick: {} processes, {} dispatched, {} applied, {} failed",
                report.processes,
                report.dispatched,
                report.harvest.applied,
                report.harvest.failed
            );
        }

        let configured = engine.config().read().await.tick_interval_secs.max(1);
        if configured != period_secs {
            tracing::info!("Tick interval changed from {}s to {}s", period_secs, configured);
            period_secs = configured;
            interval = tokio::time::interval_at(
                tokio::time::Instant::now() + Duration::from_secs(period_secs),
                Duration::from_secs(period_secs),
            );
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        }
    }
}
