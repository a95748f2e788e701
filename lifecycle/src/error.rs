use crew_store::StoreError;
use crew_types::{GroupId, GroupStatus, UserId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("invalid membership: {0}")]
    InvalidMembership(String),

    #[error("illegal transition from {from} to {to}")]
    IllegalTransition { from: GroupStatus, to: GroupStatus },

    #[error("user {user} is not a member of group {group}")]
    NotAMember { group: GroupId, user: UserId },

    #[error("user {user} already paid for group {group}")]
    AlreadyPaid { group: GroupId, user: UserId },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("user {0} is already queued")]
    AlreadyQueued(UserId),

    #[error("group {group} is {status} and not awaiting payment")]
    NotPayable { group: GroupId, status: GroupStatus },

    #[error("payment coverage not met: {paid} of {required} required members paid")]
    CoverageNotMet { paid: usize, required: usize },

    #[error("group {group} is {status}; the {ledger} ledger is not open yet")]
    LedgerNotOpen {
        group: GroupId,
        status: GroupStatus,
        ledger: &'static str,
    },

    #[error("group {group} is cancelled; the {ledger} ledger is closed")]
    LedgerClosed { group: GroupId, ledger: &'static str },

    #[error("invalid feedback: {0}")]
    InvalidFeedback(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("operator authorization failed")]
    OperatorDenied,

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl LifecycleError {
    pub(crate) fn group_not_found(id: GroupId) -> Self {
        Self::NotFound(format!("group {id}"))
    }

    /// Whether the failure comes from the backing store rather than the request.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}
