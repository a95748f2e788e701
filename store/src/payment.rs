//! Payment ledger records.

use crew_types::{GroupId, PaymentStatus, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// Deposit state of one member of one group. At most one per (group, user).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub group_id: GroupId,
    pub user_id: UserId,
    pub status: PaymentStatus,
    /// Gateway checkout session that produced the payment.
    pub external_session_id: String,
    /// Gateway handle used to request a refund (payment intent).
    pub payment_ref: Option<String>,
    pub amount_cents: u64,
    /// Id of the last gateway event applied to this row.
    pub event_id: String,
    /// Creation time of that event; the ordering key for redeliveries.
    pub event_at: Timestamp,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
