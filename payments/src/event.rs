//! Gateway event parsing.
//!
//! Events arrive as `{id, type, created, data: {object}}`. Only the fields
//! the ledger needs are extracted. The (group, user) binding always comes
//! from the metadata attached when the checkout was created.

use serde::Deserialize;
use serde_json::Value;

use crew_types::{GroupId, Timestamp, UserId};

use crate::ReconcileError;

pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";
pub const CHECKOUT_ASYNC_SUCCEEDED: &str = "checkout.session.async_payment_succeeded";
pub const CHARGE_REFUNDED: &str = "charge.refunded";

/// Metadata keys written at checkout time.
pub const META_GROUP: &str = "groupId";
pub const META_USER: &str = "userId";

/// The (group, user) pair a payment belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Binding {
    pub group_id: GroupId,
    pub user_id: UserId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GatewayEvent {
    /// A checkout whose funds have been captured.
    CheckoutPaid {
        event_id: String,
        created: Timestamp,
        session_id: String,
        payment_ref: Option<String>,
        amount_cents: Option<u64>,
        binding: Binding,
    },
    /// A charge refunded in full.
    ChargeRefunded {
        event_id: String,
        created: Timestamp,
        payment_ref: Option<String>,
        binding: Binding,
    },
    /// Anything else; acknowledged and dropped.
    Ignored {
        event_id: String,
        kind: String,
        reason: &'static str,
    },
}

impl GatewayEvent {
    pub fn event_id(&self) -> &str {
        match self {
            Self::CheckoutPaid { event_id, .. }
            | Self::ChargeRefunded { event_id, .. }
            | Self::Ignored { event_id, .. } => event_id,
        }
    }
}

#[derive(Deserialize)]
struct Envelope {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    created: u64,
    data: EnvelopeData,
}

#[derive(Deserialize)]
struct EnvelopeData {
    object: Value,
}

#[derive(Deserialize)]
struct SessionObject {
    id: String,
    #[serde(default)]
    payment_intent: Option<String>,
    #[serde(default)]
    amount_total: Option<u64>,
    #[serde(default)]
    payment_status: Option<String>,
    #[serde(default)]
    metadata: Option<Value>,
}

#[derive(Deserialize)]
struct ChargeObject {
    #[serde(default)]
    payment_intent: Option<String>,
    #[serde(default)]
    refunded: bool,
    #[serde(default)]
    metadata: Option<Value>,
}

/// Parse a verified payload.
pub fn parse_event(payload: &[u8]) -> Result<GatewayEvent, ReconcileError> {
    let envelope: Envelope = serde_json::from_slice(payload)
        .map_err(|e| ReconcileError::Malformed(format!("event envelope: {e}")))?;
    let created = Timestamp::new(envelope.created);

    match envelope.kind.as_str() {
        CHECKOUT_COMPLETED | CHECKOUT_ASYNC_SUCCEEDED => {
            let session: SessionObject = serde_json::from_value(envelope.data.object)
                .map_err(|e| ReconcileError::Malformed(format!("checkout session: {e}")))?;
            // Delayed payment methods complete the session before the money
            // arrives; the async_payment_succeeded event follows.
            if session.payment_status.as_deref() == Some("unpaid") {
                return Ok(GatewayEvent::Ignored {
                    event_id: envelope.id,
                    kind: envelope.kind,
                    reason: "payment still pending",
                });
            }
            Ok(GatewayEvent::CheckoutPaid {
                binding: binding_from(session.metadata.as_ref())?,
                event_id: envelope.id,
                created,
                session_id: session.id,
                payment_ref: session.payment_intent,
                amount_cents: session.amount_total,
            })
        }
        CHARGE_REFUNDED => {
            let charge: ChargeObject = serde_json::from_value(envelope.data.object)
                .map_err(|e| ReconcileError::Malformed(format!("charge: {e}")))?;
            if !charge.refunded {
                return Ok(GatewayEvent::Ignored {
                    event_id: envelope.id,
                    kind: envelope.kind,
                    reason: "partial refund",
                });
            }
            Ok(GatewayEvent::ChargeRefunded {
                binding: binding_from(charge.metadata.as_ref())?,
                event_id: envelope.id,
                created,
                payment_ref: charge.payment_intent,
            })
        }
        _ => Ok(GatewayEvent::Ignored {
            event_id: envelope.id,
            kind: envelope.kind,
            reason: "irrelevant event type",
        }),
    }
}

fn binding_from(metadata: Option<&Value>) -> Result<Binding, ReconcileError> {
    let field = |key: &str| {
        metadata
            .and_then(|m| m.get(key))
            .and_then(Value::as_str)
            .ok_or_else(|| ReconcileError::Malformed(format!("metadata.{key} missing")))
    };
    let group_id = field(META_GROUP)?
        .parse::<GroupId>()
        .map_err(|e| ReconcileError::Malformed(format!("metadata.{META_GROUP}: {e}")))?;
    let user_id = UserId::parse(field(META_USER)?)
        .map_err(|e| ReconcileError::Malformed(format!("metadata.{META_USER}: {e}")))?;
    Ok(Binding { group_id, user_id })
}
