//! Background reclamation of lapsed holds. Correctness never depends on
//! this task running (the allocator's lazy check covers the gap); it keeps
//! seat maps visibly accurate and the reservation table small.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::lifecycle::ReservationLifecycle;

pub struct ExpirySweeper {
    lifecycle: Arc<ReservationLifecycle>,
    interval: Duration,
    /// Every Nth tick additionally reconciles seat maps against dead
    /// reservations; 0 disables the reconcile pass.
    reconcile_every_ticks: u64,
}

impl ExpirySweeper {
    pub fn new(lifecycle: Arc<ReservationLifecycle>) -> Self {
        let rules = lifecycle.rules();
        Self {
            interval: Duration::from_secs(rules.sweep_interval_seconds),
            reconcile_every_ticks: rules.reconcile_every_ticks,
            lifecycle,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Expiry sweeper started, interval {}s",
                self.interval.as_secs()
            );
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut tick: u64 = 0;

            loop {
                ticker.tick().await;
                tick += 1;

                let summary = self.lifecycle.expire_stale_holds(Utc::now()).await;
                if summary.expired > 0 || summary.failed > 0 {
                    info!(
                        "Sweep released {} expired hold(s), {} failed",
                        summary.expired, summary.failed
                    );
                }

                if self.reconcile_every_ticks > 0 && tick % self.reconcile_every_ticks == 0 {
                    let released = self.lifecycle.reconcile_all().await;
                    if released > 0 {
                        info!("Reconciliation released {} orphaned seat(s)", released);
                    }
                }
            }
        })
    }

    /// One synchronous pass, for operational tooling and tests.
    pub async fn run_once(lifecycle: &ReservationLifecycle) -> crate::lifecycle::ExpirySummary {
        lifecycle.expire_stale_holds(Utc::now()).await
    }
}
