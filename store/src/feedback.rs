//! Feedback ledger records.

use crew_types::{GroupId, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// Post-event rating from one member.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub group_id: GroupId,
    pub user_id: UserId,
    /// 1 to 5.
    pub stars: u8,
    pub would_meet_again: Option<bool>,
    pub comment: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
