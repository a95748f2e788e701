//! State enums for groups and their satellite ledgers.

use crate::TypesError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a group.
///
/// Transitions follow a DAG:
///
/// ```text
/// forming -> pending_payment -> location_revealed -> completed
///    \             |                    |
///     +------------+--------------------+--> cancelled
/// ```
///
/// `completed` and `cancelled` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    /// Members are still being assembled. Reserved for incremental matchers;
    /// manual creation installs groups directly in `PendingPayment`.
    Forming,
    /// Member list is final; waiting for deposits.
    PendingPayment,
    /// Venue is visible to members; RSVPs open.
    LocationRevealed,
    /// The meetup happened; feedback open.
    Completed,
    /// Abandoned. Never erased.
    Cancelled,
}

impl GroupStatus {
    pub const ALL: [GroupStatus; 5] = [
        Self::Forming,
        Self::PendingPayment,
        Self::LocationRevealed,
        Self::Completed,
        Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forming => "forming",
            Self::PendingPayment => "pending_payment",
            Self::LocationRevealed => "location_revealed",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Legal next states.
    pub fn successors(&self) -> &'static [GroupStatus] {
        match self {
            Self::Forming => &[Self::PendingPayment, Self::Cancelled],
            Self::PendingPayment => &[Self::LocationRevealed, Self::Cancelled],
            Self::LocationRevealed => &[Self::Completed, Self::Cancelled],
            Self::Completed | Self::Cancelled => &[],
        }
    }

    /// Whether `next` is a single legal step from `self`.
    pub fn can_advance_to(&self, next: GroupStatus) -> bool {
        self.successors().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        self.successors().is_empty()
    }

    /// Active groups still hold their members: a member of an active group
    /// may not re-enter the queue or join another group.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Forming | Self::PendingPayment | Self::LocationRevealed
        )
    }

    /// Whether members may see the venue.
    pub fn reveals_venue(&self) -> bool {
        matches!(self, Self::LocationRevealed | Self::Completed)
    }

    /// Whether RSVPs are accepted.
    pub fn accepts_rsvp(&self) -> bool {
        matches!(self, Self::LocationRevealed | Self::Completed)
    }

    /// Whether feedback is accepted.
    pub fn accepts_feedback(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for GroupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupStatus {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| TypesError::UnknownStatus(s.to_string()))
    }
}

/// Payment ledger status for one (group, user) pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Paid => "paid",
            Self::Refunded => "refunded",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "paid" => Ok(Self::Paid),
            "refunded" => Ok(Self::Refunded),
            other => Err(TypesError::UnknownPaymentStatus(other.to_string())),
        }
    }
}

/// Attendance intent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RsvpAnswer {
    Yes,
    No,
}

impl RsvpAnswer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
        }
    }
}

impl FromStr for RsvpAnswer {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "yes" => Ok(Self::Yes),
            "no" => Ok(Self::No),
            other => Err(TypesError::UnknownAnswer(other.to_string())),
        }
    }
}
