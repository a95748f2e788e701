//! Inbound reconciliation: one verified gateway event, at most one ledger
//! write.
//!
//! Redelivery is safe because the ledger itself is idempotent per
//! (group, user) and ordered by the event's creation time.

use std::sync::Arc;

use tracing::{error, info, warn};
use zeroize::Zeroizing;

use crew_crypto::verify_webhook_signature;
use crew_lifecycle::{Applied, LifecycleEngine, PaymentFact, RefundRequest};
use crew_store::CrewStore;

use crate::event::{parse_event, GatewayEvent};
use crate::ReconcileError;

/// Signatures older or newer than this are rejected.
pub const DEFAULT_TOLERANCE_SECS: u64 = 300;

/// Header names carrying the signature.
pub const SIGNATURE_HEADERS: [&str; 2] = ["signature", "stripe-signature"];

/// What a delivery did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookAck {
    Payment {
        applied: Applied,
        /// The deposit arrived after the group was cancelled, or the member
        /// had already paid through another checkout.
        refund: Option<RefundRequest>,
    },
    Refund {
        applied: Applied,
    },
    Ignored {
        kind: String,
    },
}

impl WebhookAck {
    /// Short label for metrics.
    pub fn disposition(&self) -> &'static str {
        match self {
            Self::Payment { applied, .. } | Self::Refund { applied } => applied.as_str(),
            Self::Ignored { .. } => "ignored",
        }
    }
}

pub struct WebhookReconciler<S> {
    engine: Arc<LifecycleEngine<S>>,
    secret: Zeroizing<Vec<u8>>,
    tolerance_secs: u64,
}

impl<S: CrewStore> WebhookReconciler<S> {
    pub fn new(
        engine: Arc<LifecycleEngine<S>>,
        secret: Zeroizing<Vec<u8>>,
        tolerance_secs: u64,
    ) -> Self {
        Self {
            engine,
            secret,
            tolerance_secs,
        }
    }

    /// Verify, parse and apply one delivery.
    ///
    /// `payload` must be the raw request body; re-serialised JSON will not
    /// verify.
    pub fn handle(&self, payload: &[u8], signature: &str) -> Result<WebhookAck, ReconcileError> {
        let now = self.engine.now().as_secs();
        if let Err(e) =
            verify_webhook_signature(payload, signature, &self.secret, now, self.tolerance_secs)
        {
            warn!(error = %e, "webhook signature rejected");
            return Err(e.into());
        }

        let event = parse_event(payload).inspect_err(|e| {
            warn!(error = %e, "webhook payload rejected");
        })?;
        let event_id = event.event_id().to_string();

        let result = self.apply(event);
        match &result {
            Ok(ack) => info!(event_id = %event_id, outcome = ack.disposition(), "webhook reconciled"),
            Err(e) if e.is_retryable() => {
                error!(event_id = %event_id, error = %e, "webhook not applied; store failure")
            }
            Err(e) => warn!(event_id = %event_id, error = %e, kind = e.kind(), "webhook does not match the ledger"),
        }
        result
    }

    fn apply(&self, event: GatewayEvent) -> Result<WebhookAck, ReconcileError> {
        match event {
            GatewayEvent::CheckoutPaid {
                event_id,
                created,
                session_id,
                payment_ref,
                amount_cents,
                binding,
            } => {
                let amount = amount_cents.unwrap_or(self.engine.params().deposit_cents);
                let mut fact =
                    PaymentFact::paid(binding.group_id, binding.user_id, session_id, amount, created)
                        .with_event_id(event_id);
                if let Some(reference) = payment_ref {
                    fact = fact.with_payment_ref(reference);
                }
                let outcome = self.engine.record_payment(fact)?;
                Ok(WebhookAck::Payment {
                    applied: outcome.applied,
                    refund: outcome.refund,
                })
            }
            GatewayEvent::ChargeRefunded {
                event_id,
                created,
                payment_ref,
                binding,
            } => {
                let outcome = self.engine.record_refund(
                    binding.group_id,
                    &binding.user_id,
                    payment_ref.as_deref(),
                    &event_id,
                    created,
                )?;
                Ok(WebhookAck::Refund {
                    applied: outcome.applied,
                })
            }
            GatewayEvent::Ignored { kind, reason, .. } => {
                info!(kind = %kind, reason, "webhook ignored");
                Ok(WebhookAck::Ignored { kind })
            }
        }
    }
}
