//! Hand refund requests to the gateway.
//!
//! The ledger is not touched here. A row flips to `refunded` only when the
//! gateway's `charge.refunded` notification is reconciled.

use tracing::{error, info};

use crew_lifecycle::RefundRequest;

use crate::gateway::PaymentGateway;
use crate::GatewayError;

#[derive(Debug, Default)]
pub struct RefundSummary {
    pub requested: usize,
    pub failed: Vec<(RefundRequest, GatewayError)>,
}

impl RefundSummary {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Request every refund in turn. A failure does not stop the rest; the
/// gateway's idempotency key makes a later retry safe.
pub async fn dispatch_refunds<G: PaymentGateway>(
    gateway: &G,
    requests: &[RefundRequest],
) -> RefundSummary {
    let mut summary = RefundSummary::default();
    for request in requests {
        match gateway.refund(request).await {
            Ok(receipt) => {
                info!(
                    group_id = %request.group_id,
                    user_id = %request.user_id,
                    refund_id = %receipt.refund_id,
                    status = %receipt.status,
                    "refund requested"
                );
                summary.requested += 1;
            }
            Err(e) => {
                error!(
                    group_id = %request.group_id,
                    user_id = %request.user_id,
                    error = %e,
                    "refund request failed"
                );
                summary.failed.push((request.clone(), e));
            }
        }
    }
    summary
}
