//! Read-side views. Pure reads over the latest committed state.

use serde::Serialize;

use crew_store::{CrewStore, Feedback, Group, Payment, QueueEntry, ReadTxn, Rsvp};
use crew_types::{GroupId, GroupStatus, PaymentStatus, Timestamp, UserId};

use crate::engine::{load_group, load_membership, sort_queue, LifecycleEngine};
use crate::operator::Operator;
use crate::LifecycleError;

/// Payment state of one member, `Unpaid` when no row exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    Unpaid,
    Paid,
    Refunded,
}

impl From<PaymentStatus> for PaymentState {
    fn from(status: PaymentStatus) -> Self {
        match status {
            PaymentStatus::Paid => Self::Paid,
            PaymentStatus::Refunded => Self::Refunded,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Coverage {
    pub paid: Vec<UserId>,
    /// Members without a `paid` row, refunded ones included.
    pub unpaid: Vec<UserId>,
    /// Paid members the coverage policy asks for, `None` under the operator policy.
    pub required: Option<usize>,
    pub satisfied: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Venue {
    pub name: Option<String>,
    pub address: Option<String>,
}

/// A group as its members see it. The venue stays hidden until revealed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GroupView {
    pub id: GroupId,
    pub status: GroupStatus,
    pub member_ids: Vec<UserId>,
    pub event_datetime: Option<Timestamp>,
    pub campus: Option<String>,
    pub venue: Option<Venue>,
    pub created_at: Timestamp,
}

impl From<Group> for GroupView {
    fn from(group: Group) -> Self {
        let venue = group.status.reveals_venue().then(|| Venue {
            name: group.venue_name,
            address: group.venue_address,
        });
        Self {
            id: group.id,
            status: group.status,
            member_ids: group.member_ids,
            event_datetime: group.event_datetime,
            campus: group.campus,
            venue,
            created_at: group.created_at,
        }
    }
}

/// Everything about a group, joined at read time. Operator only.
#[derive(Clone, Debug, Serialize)]
pub struct GroupDetail {
    pub group: Group,
    pub payments: Vec<Payment>,
    pub rsvps: Vec<Rsvp>,
    pub feedback: Vec<Feedback>,
    pub coverage: Coverage,
}

impl<S: CrewStore> LifecycleEngine<S> {
    /// Queue entries ordered by join time, ties by user id.
    pub fn list_queue(&self) -> Result<Vec<QueueEntry>, LifecycleError> {
        let mut entries = self
            .store()
            .read(|txn| Ok::<_, LifecycleError>(txn.queue_entries()?))?;
        sort_queue(&mut entries);
        Ok(entries)
    }

    pub fn queue_entry(&self, user: &UserId) -> Result<Option<QueueEntry>, LifecycleError> {
        self.store()
            .read(|txn| Ok::<_, LifecycleError>(txn.queue_entry(user)?))
    }

    /// Groups in forming, pending_payment or location_revealed.
    pub fn list_active_groups_for_user(
        &self,
        user: &UserId,
    ) -> Result<Vec<GroupView>, LifecycleError> {
        self.groups_for_user(user, |status| status.is_active())
    }

    /// Groups in completed or cancelled.
    pub fn list_past_groups_for_user(
        &self,
        user: &UserId,
    ) -> Result<Vec<GroupView>, LifecycleError> {
        self.groups_for_user(user, |status| status.is_terminal())
    }

    fn groups_for_user(
        &self,
        user: &UserId,
        keep: impl Fn(GroupStatus) -> bool,
    ) -> Result<Vec<GroupView>, LifecycleError> {
        self.store().read(|txn| {
            let mut out = Vec::new();
            for id in txn.group_ids_for_user(user)? {
                if let Some(group) = txn.group(id)? {
                    if keep(group.status) && group.is_member(user) {
                        out.push(GroupView::from(group));
                    }
                }
            }
            Ok(out)
        })
    }

    /// All groups, optionally filtered by status. Operator only.
    pub fn list_groups(
        &self,
        _operator: &Operator,
        status: Option<GroupStatus>,
    ) -> Result<Vec<Group>, LifecycleError> {
        let groups = self
            .store()
            .read(|txn| Ok::<_, LifecycleError>(txn.groups()?))?;
        Ok(groups
            .into_iter()
            .filter(|g| status.map_or(true, |s| g.status == s))
            .collect())
    }

    /// A member's payment state in a group.
    pub fn payment_status(
        &self,
        group_id: GroupId,
        user: &UserId,
    ) -> Result<PaymentState, LifecycleError> {
        self.store().read(|txn| {
            load_membership(txn, group_id, user)?;
            Ok(txn
                .payment(group_id, user)?
                .map_or(PaymentState::Unpaid, |p| p.status.into()))
        })
    }

    pub fn coverage(&self, group_id: GroupId) -> Result<Coverage, LifecycleError> {
        self.store().read(|txn| {
            let group = load_group(txn, group_id)?;
            self.coverage_in(txn, &group)
        })
    }

    fn coverage_in(&self, txn: &dyn ReadTxn, group: &Group) -> Result<Coverage, LifecycleError> {
        let payments = txn.payments_for_group(group.id)?;
        let (paid, unpaid): (Vec<UserId>, Vec<UserId>) =
            group.member_ids.iter().cloned().partition(|member| {
                payments
                    .iter()
                    .any(|p| &p.user_id == member && p.status == PaymentStatus::Paid)
            });
        let members = group.member_ids.len();
        Ok(Coverage {
            required: self.params().coverage.required(members),
            satisfied: self.params().coverage.is_satisfied(paid.len(), members),
            paid,
            unpaid,
        })
    }

    /// The member view of a group.
    pub fn group_view(&self, group_id: GroupId, viewer: &UserId) -> Result<GroupView, LifecycleError> {
        let group = self
            .store()
            .read(|txn| load_membership(txn, group_id, viewer))?;
        Ok(group.into())
    }

    /// The group plus its ledgers. Operator only.
    pub fn group_detail(
        &self,
        _operator: &Operator,
        group_id: GroupId,
    ) -> Result<GroupDetail, LifecycleError> {
        self.store().read(|txn| {
            let group = load_group(txn, group_id)?;
            let coverage = self.coverage_in(txn, &group)?;
            Ok(GroupDetail {
                payments: txn.payments_for_group(group_id)?,
                rsvps: txn.rsvps_for_group(group_id)?,
                feedback: txn.feedback_for_group(group_id)?,
                coverage,
                group,
            })
        })
    }
}
