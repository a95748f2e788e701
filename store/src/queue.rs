//! Queue records.

use crew_types::{Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// A user waiting to be matched. At most one per user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub user_id: UserId,
    /// Campus / locale tag the operator matches on.
    pub campus: String,
    pub joined_at: Timestamp,
}
