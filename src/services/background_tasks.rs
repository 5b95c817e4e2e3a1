// Background task management: the periodic job-table sweep and the billing
// reconciliation loop. Each loop runs on its own task and stops on a single
// signal; a tick already in progress completes before the task returns.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::info;

use crate::app_config::AppConfig;
use crate::services::billing::BillingService;
use crate::services::scheduler::LifecycleScheduler;

/// Stop signal for one background loop.
pub struct StopHandle {
    tx: mpsc::Sender<()>,
}

impl StopHandle {
    /// Request the loop to stop after any tick in progress. Repeated calls
    /// are harmless.
    pub fn stop(&self) {
        let _ = self.tx.try_send(());
    }
}

fn ticker(every: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(every);
    // A missed period runs one catch-up tick; ticks never stack.
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

/// Spawn the periodic sweep reclaiming fired one-shot jobs.
pub fn spawn_sweep_loop(scheduler: Arc<LifecycleScheduler>, every: Duration) -> StopHandle {
    let (tx, mut rx) = mpsc::channel::<()>(1);

    tokio::spawn(async move {
        info!("Sweep loop started, interval {:?}", every);
        let mut interval = ticker(every);
        // The first interval tick completes immediately; consume it so the
        // first sweep happens one period in.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => scheduler.sweep(),
                _ = rx.recv() => {
                    info!("Sweep loop stopped");
                    return;
                }
            }
        }
    });

    StopHandle { tx }
}

/// Spawn the loop re-checking every outstanding invoice against the billing
/// gateway.
pub fn spawn_reconciliation_loop(billing: Arc<BillingService>, every: Duration) -> StopHandle {
    let (tx, mut rx) = mpsc::channel::<()>(1);

    tokio::spawn(async move {
        info!("Billing reconciliation loop started, interval {:?}", every);
        let mut interval = ticker(every);
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => billing.reconcile_outstanding().await,
                _ = rx.recv() => {
                    info!("Billing reconciliation loop stopped");
                    return;
                }
            }
        }
    });

    StopHandle { tx }
}

/// Handles for all long-lived background loops.
pub struct BackgroundTasks {
    sweep: StopHandle,
    reconciliation: StopHandle,
}

impl BackgroundTasks {
    pub fn stop_all(&self) {
        self.sweep.stop();
        self.reconciliation.stop();
    }
}

/// Start all background tasks (call once at startup).
pub fn start_background_tasks(
    scheduler: Arc<LifecycleScheduler>,
    billing: Arc<BillingService>,
    config: &AppConfig,
) -> BackgroundTasks {
    BackgroundTasks {
        sweep: spawn_sweep_loop(scheduler, config.scheduler.sweep_interval),
        reconciliation: spawn_reconciliation_loop(billing, config.billing.poll_interval),
    }
}
