//! RSVP ledger records.

use crew_types::{GroupId, RsvpAnswer, Timestamp, UserId};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rsvp {
    pub group_id: GroupId,
    pub user_id: UserId,
    pub answer: RsvpAnswer,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
