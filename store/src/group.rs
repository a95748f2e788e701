//! Group records.

use crew_types::{GroupId, GroupStatus, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// The central lifecycle entity.
///
/// `member_ids` is written once at creation. Only creation and status
/// advances write a group; the satellite ledgers reference it by id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub status: GroupStatus,
    pub member_ids: Vec<UserId>,
    pub event_datetime: Option<Timestamp>,
    pub venue_name: Option<String>,
    pub venue_address: Option<String>,
    pub campus: Option<String>,
    pub created_at: Timestamp,
    /// When the group entered its current status.
    pub status_changed_at: Timestamp,
}

impl Group {
    pub fn is_member(&self, user: &UserId) -> bool {
        self.member_ids.contains(user)
    }
}
