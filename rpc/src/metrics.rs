//! Prometheus metrics for the crew service.
//!
//! [`ServiceMetrics`] owns a dedicated [`Registry`] that `GET /metrics`
//! encodes in the text exposition format. The sweeper in the daemon shares
//! the same instance.

use prometheus::{
    register_int_counter_vec_with_registry, register_int_counter_with_registry, Encoder,
    IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

pub struct ServiceMetrics {
    pub registry: Registry,

    /// Groups created by operators.
    pub groups_created: IntCounter,
    /// Status transitions, labelled by target status.
    pub transitions: IntCounterVec,
    /// Payment ledger applications, labelled by outcome
    /// (inserted, replaced, duplicate, stale).
    pub ledger_writes: IntCounterVec,
    /// Webhook deliveries, labelled by disposition.
    pub webhook_deliveries: IntCounterVec,
    /// Sweep actions, labelled by rule (expired, completed, revealed, failed).
    pub sweep_actions: IntCounterVec,
    /// Refund requests handed to the gateway, labelled by result.
    pub refunds: IntCounterVec,
}

impl ServiceMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let groups_created = register_int_counter_with_registry!(
            Opts::new("crew_groups_created_total", "Groups created"),
            registry
        )
        .expect("failed to register groups_created counter");

        let transitions = register_int_counter_vec_with_registry!(
            Opts::new("crew_status_transitions_total", "Group status transitions"),
            &["to"],
            registry
        )
        .expect("failed to register transitions counter");

        let ledger_writes = register_int_counter_vec_with_registry!(
            Opts::new(
                "crew_payment_ledger_total",
                "Payment facts applied to the ledger"
            ),
            &["outcome"],
            registry
        )
        .expect("failed to register ledger_writes counter");

        let webhook_deliveries = register_int_counter_vec_with_registry!(
            Opts::new("crew_webhook_deliveries_total", "Gateway webhook deliveries"),
            &["disposition"],
            registry
        )
        .expect("failed to register webhook_deliveries counter");

        let sweep_actions = register_int_counter_vec_with_registry!(
            Opts::new("crew_sweep_actions_total", "Groups moved by the sweep"),
            &["rule"],
            registry
        )
        .expect("failed to register sweep_actions counter");

        let refunds = register_int_counter_vec_with_registry!(
            Opts::new("crew_refund_requests_total", "Refund requests sent to the gateway"),
            &["result"],
            registry
        )
        .expect("failed to register refunds counter");

        Self {
            registry,
            groups_created,
            transitions,
            ledger_writes,
            webhook_deliveries,
            sweep_actions,
            refunds,
        }
    }

    /// Record what one sweep did.
    pub fn observe_sweep(&self, report: &crew_lifecycle::SweepReport) {
        let rules = [
            ("expired", report.expired.len()),
            ("completed", report.completed.len()),
            ("revealed", report.revealed.len()),
            ("failed", report.failed),
        ];
        for (rule, count) in rules {
            self.sweep_actions
                .with_label_values(&[rule])
                .inc_by(count as u64);
        }
    }

    pub fn observe_refunds(&self, summary: &crew_payments::RefundSummary) {
        self.refunds
            .with_label_values(&["requested"])
            .inc_by(summary.requested as u64);
        self.refunds
            .with_label_values(&["failed"])
            .inc_by(summary.failed.len() as u64);
    }

    /// Text exposition of every registered metric.
    pub fn encode(&self) -> String {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buf) {
            tracing::error!(error = %e, "failed to encode metrics");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}
