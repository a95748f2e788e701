//! Member selection.
//!
//! A [`Matcher`] proposes who should form the next group, given the current
//! queue. The engine validates every proposal against its own invariants,
//! so a matcher never needs to be trusted.

use crew_store::QueueEntry;
use crew_types::UserId;

use crate::LifecycleError;

pub trait Matcher {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Propose member ids from `queue` (ordered by join time).
    fn propose(&self, queue: &[QueueEntry]) -> Result<Vec<UserId>, LifecycleError>;
}

/// The operator picked the members by hand.
#[derive(Debug, Clone)]
pub struct ManualSelection {
    members: Vec<UserId>,
}

impl ManualSelection {
    pub fn new(members: Vec<UserId>) -> Self {
        Self { members }
    }
}

impl Matcher for ManualSelection {
    fn name(&self) -> &'static str {
        "manual"
    }

    fn propose(&self, _queue: &[QueueEntry]) -> Result<Vec<UserId>, LifecycleError> {
        Ok(self.members.clone())
    }
}
