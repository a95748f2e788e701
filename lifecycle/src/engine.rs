//! Queue membership, group creation and status transitions.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crew_store::{CrewStore, Group, QueueEntry, ReadTxn, WriteTxn};
use crew_types::{
    Clock, GroupId, GroupStatus, LifecycleParams, PaymentStatus, Timestamp, UserId,
};

use crate::matcher::{ManualSelection, Matcher};
use crate::operator::Operator;
use crate::LifecycleError;

/// Campus recorded when a user joins without naming one.
pub const DEFAULT_CAMPUS: &str = "Unknown Campus";

/// Schedule and venue for a new group.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GroupPlan {
    #[serde(default)]
    pub event_datetime: Option<Timestamp>,
    pub venue_name: String,
    #[serde(default)]
    pub venue_address: Option<String>,
    /// Defaults to the first member's queue campus.
    #[serde(default)]
    pub campus: Option<String>,
}

/// A deposit that must be returned through the gateway.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRequest {
    pub group_id: GroupId,
    pub user_id: UserId,
    pub external_session_id: String,
    pub payment_ref: Option<String>,
    pub amount_cents: u64,
}

/// Result of [`LifecycleEngine::advance_status`].
#[derive(Clone, Debug)]
pub struct Transition {
    pub group: Group,
    /// `false` when the group was already in the target status.
    pub changed: bool,
    /// Paid deposits to return, non-empty only on cancellation.
    pub refunds: Vec<RefundRequest>,
}

pub struct LifecycleEngine<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    params: LifecycleParams,
}

impl<S: CrewStore> LifecycleEngine<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, params: LifecycleParams) -> Self {
        Self {
            store,
            clock,
            params,
        }
    }

    pub fn params(&self) -> &LifecycleParams {
        &self.params
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    // ── Queue ───────────────────────────────────────────────────────────

    /// Put `user` in the queue.
    ///
    /// Fails with `AlreadyQueued` for a second entry and with
    /// `InvalidMembership` while the user belongs to an active group.
    pub fn join_queue(
        &self,
        user: &UserId,
        campus: Option<&str>,
    ) -> Result<QueueEntry, LifecycleError> {
        let campus = match campus.map(str::trim) {
            None => DEFAULT_CAMPUS.to_string(),
            Some("") => {
                return Err(LifecycleError::Validation("campus must not be empty".to_string()))
            }
            Some(name) => name.to_string(),
        };
        let entry = QueueEntry {
            user_id: user.clone(),
            campus,
            joined_at: self.now(),
        };

        self.store.write(|txn| {
            if txn.queue_entry(user)?.is_some() {
                return Err(LifecycleError::AlreadyQueued(user.clone()));
            }
            if let Some(group) = active_group_of(&*txn, user)? {
                return Err(LifecycleError::InvalidMembership(format!(
                    "user {user} already belongs to active group {group}"
                )));
            }
            txn.put_queue_entry(&entry)?;
            Ok(())
        })?;

        info!(user_id = %user, campus = %entry.campus, "joined queue");
        Ok(entry)
    }

    /// Withdraw `user` from the queue. Returns whether an entry was removed.
    pub fn leave_queue(&self, user: &UserId) -> Result<bool, LifecycleError> {
        let removed = self
            .store
            .write(|txn| Ok::<_, LifecycleError>(txn.delete_queue_entry(user)?))?;
        if removed {
            info!(user_id = %user, "left queue");
        }
        Ok(removed)
    }

    // ── Group creation ──────────────────────────────────────────────────

    /// Create a group from hand-picked queued users.
    pub fn create_group(
        &self,
        operator: &Operator,
        members: &[UserId],
        plan: GroupPlan,
    ) -> Result<Group, LifecycleError> {
        self.create_group_with(operator, &ManualSelection::new(members.to_vec()), plan)
    }

    /// Create a group from the members `matcher` proposes.
    ///
    /// In one transaction: validate the selection, allocate an id, insert the
    /// group in `pending_payment` and drain the members from the queue. Any
    /// failure commits nothing.
    pub fn create_group_with(
        &self,
        operator: &Operator,
        matcher: &dyn Matcher,
        plan: GroupPlan,
    ) -> Result<Group, LifecycleError> {
        let venue_name = plan.venue_name.trim().to_string();
        if venue_name.is_empty() {
            return Err(LifecycleError::Validation("venue_name is required".to_string()));
        }
        let venue_address = non_empty(plan.venue_address);
        let planned_campus = non_empty(plan.campus);
        let now = self.now();

        let group = self.store.write(|txn| {
            let mut queue = txn.queue_entries()?;
            sort_queue(&mut queue);
            let members = matcher.propose(&queue)?;
            self.check_selection(&members)?;

            let mut entries = Vec::with_capacity(members.len());
            for member in &members {
                let entry = txn.queue_entry(member)?.ok_or_else(|| {
                    LifecycleError::InvalidMembership(format!("user {member} is not in the queue"))
                })?;
                if let Some(group) = active_group_of(&*txn, member)? {
                    return Err(LifecycleError::InvalidMembership(format!(
                        "user {member} already belongs to active group {group}"
                    )));
                }
                entries.push(entry);
            }

            let campus = planned_campus
                .clone()
                .or_else(|| entries.first().map(|e| e.campus.clone()));
            let group = Group {
                id: txn.next_group_id()?,
                status: GroupStatus::PendingPayment,
                member_ids: members,
                event_datetime: plan.event_datetime,
                venue_name: Some(venue_name.clone()),
                venue_address: venue_address.clone(),
                campus,
                created_at: now,
                status_changed_at: now,
            };
            txn.put_group(&group)?;
            for member in &group.member_ids {
                txn.delete_queue_entry(member)?;
            }
            Ok(group)
        })?;

        info!(
            group_id = %group.id,
            members = group.member_ids.len(),
            matcher = matcher.name(),
            operator = operator.label(),
            to = %group.status,
            "group created"
        );
        Ok(group)
    }

    fn check_selection(&self, members: &[UserId]) -> Result<(), LifecycleError> {
        let (min, max) = (self.params.min_group_size, self.params.max_group_size);
        if members.len() < min || members.len() > max {
            return Err(LifecycleError::InvalidMembership(format!(
                "a group needs {min} to {max} members, got {}",
                members.len()
            )));
        }
        let mut seen = HashSet::with_capacity(members.len());
        for member in members {
            if !seen.insert(member) {
                return Err(LifecycleError::InvalidMembership(format!(
                    "user {member} selected twice"
                )));
            }
        }
        Ok(())
    }

    // ── Status ──────────────────────────────────────────────────────────

    /// Move a group one legal step along the status DAG.
    ///
    /// Re-applying the current status is a no-op success. Revealing the venue
    /// checks the coverage policy; cancelling returns refund requests for
    /// every paid deposit.
    pub fn advance_status(
        &self,
        operator: &Operator,
        id: GroupId,
        target: GroupStatus,
    ) -> Result<Transition, LifecycleError> {
        let now = self.now();
        let (transition, from) = self.store.write(|txn| {
            let group = load_group(&*txn, id)?;
            let from = group.status;
            let transition = self.apply_transition(txn, group, target, now)?;
            Ok::<_, LifecycleError>((transition, from))
        })?;

        if transition.changed {
            info!(
                group_id = %id,
                from = %from,
                to = %target,
                refunds = transition.refunds.len(),
                operator = operator.label(),
                "group status advanced"
            );
        }
        Ok(transition)
    }

    /// Validate and write one transition inside `txn`.
    pub(crate) fn apply_transition(
        &self,
        txn: &mut dyn WriteTxn,
        mut group: Group,
        target: GroupStatus,
        now: Timestamp,
    ) -> Result<Transition, LifecycleError> {
        if group.status == target {
            return Ok(Transition {
                group,
                changed: false,
                refunds: Vec::new(),
            });
        }
        if !group.status.can_advance_to(target) {
            return Err(LifecycleError::IllegalTransition {
                from: group.status,
                to: target,
            });
        }

        if target == GroupStatus::LocationRevealed {
            let paid = paid_member_count(&*txn, &group)?;
            let members = group.member_ids.len();
            if let Some(required) = self.params.coverage.required(members) {
                if paid < required {
                    return Err(LifecycleError::CoverageNotMet { paid, required });
                }
            }
        }

        let refunds = if target == GroupStatus::Cancelled {
            refunds_for(&*txn, group.id)?
        } else {
            Vec::new()
        };

        group.status = target;
        group.status_changed_at = now;
        txn.put_group(&group)?;
        Ok(Transition {
            group,
            changed: true,
            refunds,
        })
    }
}

pub(crate) fn load_group<T: ReadTxn + ?Sized>(txn: &T, id: GroupId) -> Result<Group, LifecycleError> {
    txn.group(id)?
        .ok_or_else(|| LifecycleError::group_not_found(id))
}

/// Load a group and check that `user` belongs to it.
pub(crate) fn load_membership<T: ReadTxn + ?Sized>(
    txn: &T,
    id: GroupId,
    user: &UserId,
) -> Result<Group, LifecycleError> {
    let group = load_group(txn, id)?;
    if !group.is_member(user) {
        return Err(LifecycleError::NotAMember {
            group: id,
            user: user.clone(),
        });
    }
    Ok(group)
}

/// The user's active group, if any.
fn active_group_of<T: ReadTxn + ?Sized>(
    txn: &T,
    user: &UserId,
) -> Result<Option<GroupId>, LifecycleError> {
    for id in txn.group_ids_for_user(user)? {
        match txn.group(id)? {
            Some(group) if group.status.is_active() => return Ok(Some(id)),
            Some(_) => {}
            None => warn!(group_id = %id, user_id = %user, "user index names a missing group"),
        }
    }
    Ok(None)
}

pub(crate) fn paid_member_count<T: ReadTxn + ?Sized>(
    txn: &T,
    group: &Group,
) -> Result<usize, LifecycleError> {
    Ok(txn
        .payments_for_group(group.id)?
        .iter()
        .filter(|p| p.status == PaymentStatus::Paid && group.is_member(&p.user_id))
        .count())
}

pub(crate) fn refunds_for<T: ReadTxn + ?Sized>(
    txn: &T,
    id: GroupId,
) -> Result<Vec<RefundRequest>, LifecycleError> {
    Ok(txn
        .payments_for_group(id)?
        .into_iter()
        .filter(|p| p.status == PaymentStatus::Paid)
        .map(|p| RefundRequest {
            group_id: p.group_id,
            user_id: p.user_id,
            external_session_id: p.external_session_id,
            payment_ref: p.payment_ref,
            amount_cents: p.amount_cents,
        })
        .collect())
}

pub(crate) fn sort_queue(entries: &mut [QueueEntry]) {
    entries.sort_by(|a, b| {
        a.joined_at
            .cmp(&b.joined_at)
            .then_with(|| a.user_id.cmp(&b.user_id))
    });
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
