//! Periodic sweep: expire unpaid groups, complete finished meetups, and
//! (when enabled) reveal covered venues. Refunds owed by expirations are
//! handed to the gateway after the sweep commits, and the HTTP list cache
//! is dropped whenever a sweep changed anything.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crew_lifecycle::SweepReport;
use crew_payments::{dispatch_refunds, PaymentGateway};
use crew_rpc::RpcState;
use crew_store::CrewStore;

pub struct Sweeper<S, G> {
    state: Arc<RpcState<S, G>>,
    interval: Duration,
}

impl<S: CrewStore + 'static, G: PaymentGateway> Sweeper<S, G> {
    /// Sweep through the same engine, gateway, metrics and cache the HTTP
    /// handlers use.
    pub fn new(state: Arc<RpcState<S, G>>, interval: Duration) -> Self {
        Self { state, interval }
    }

    /// Run one sweep and dispatch the refunds it produced.
    ///
    /// Returns `None` when the sweep could not read the store; the next
    /// tick tries again.
    pub async fn tick(&self) -> Option<SweepReport> {
        let state = &self.state;
        let now = state.engine.now();
        let report = match state.engine.scheduled_sweep(now) {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "sweep failed");
                return None;
            }
        };
        state.metrics.observe_sweep(&report);

        if report.is_empty() {
            debug!("sweep found nothing due");
        } else {
            state.invalidate_lists();
            info!(
                expired = report.expired.len(),
                completed = report.completed.len(),
                revealed = report.revealed.len(),
                failed = report.failed,
                "sweep applied"
            );
        }

        if !report.refunds.is_empty() {
            let summary = dispatch_refunds(&*state.gateway, &report.refunds).await;
            state.metrics.observe_refunds(&summary);
            if !summary.is_clean() {
                warn!(
                    failed = summary.failed.len(),
                    "some sweep refunds were not accepted by the gateway"
                );
            }
        }
        Some(report)
    }

    /// Tick until shutdown is signalled.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = self.interval.as_secs(), "sweeper started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = shutdown.recv() => {
                    info!("sweeper stopping");
                    break;
                }
            }
        }
    }
}
