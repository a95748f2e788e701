//! Scheduled sweep.
//!
//! Three rules, each applied to one group per write transaction:
//! 1. `pending_payment` past the payment window → `cancelled`, with a refund
//!    request for every paid deposit. A group whose coverage is met by then is
//!    never cancelled: it is revealed under `auto_reveal` and otherwise left
//!    for the operator;
//! 2. `location_revealed` past `event_datetime + completion_grace` → `completed`;
//! 3. with `auto_reveal`, `pending_payment` meeting the coverage policy →
//!    `location_revealed`.
//!
//! Each group is re-read inside its transaction, so a group the operator
//! moved in the meantime is skipped rather than overwritten.

use serde::Serialize;
use tracing::{error, info};

use crew_store::{CrewStore, Group};
use crew_types::{CoveragePolicy, GroupId, GroupStatus, Timestamp};

use crate::engine::{load_group, paid_member_count, LifecycleEngine, RefundRequest};
use crate::operator::Operator;
use crate::LifecycleError;

#[derive(Clone, Debug, Default, Serialize)]
pub struct SweepReport {
    pub expired: Vec<GroupId>,
    pub completed: Vec<GroupId>,
    pub revealed: Vec<GroupId>,
    pub refunds: Vec<RefundRequest>,
    /// Groups whose transaction failed; they are retried on the next sweep.
    pub failed: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.expired.is_empty()
            && self.completed.is_empty()
            && self.revealed.is_empty()
            && self.failed == 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Rule {
    Expire,
    Complete,
    Reveal,
}

impl Rule {
    fn target(self) -> GroupStatus {
        match self {
            Rule::Expire => GroupStatus::Cancelled,
            Rule::Complete => GroupStatus::Completed,
            Rule::Reveal => GroupStatus::LocationRevealed,
        }
    }
}

impl<S: CrewStore> LifecycleEngine<S> {
    /// The sweep run by the daemon's timer, under its own internal identity.
    pub fn scheduled_sweep(&self, now: Timestamp) -> Result<SweepReport, LifecycleError> {
        self.sweep(&Operator::internal("sweep"), now)
    }

    /// Run every sweep rule as of `now`.
    pub fn sweep(&self, operator: &Operator, now: Timestamp) -> Result<SweepReport, LifecycleError> {
        let groups = self
            .store()
            .read(|txn| Ok::<_, LifecycleError>(txn.groups()?))?;

        let mut report = SweepReport::default();
        for group in groups {
            let Some(rule) = self.due_rule(&group, now) else {
                continue;
            };
            match self.sweep_group(group.id, group.status, rule, now) {
                Ok(Some((rule, refunds))) => {
                    info!(
                        group_id = %group.id,
                        from = %group.status,
                        to = %rule.target(),
                        refunds = refunds.len(),
                        operator = operator.label(),
                        "sweep advanced group"
                    );
                    match rule {
                        Rule::Expire => report.expired.push(group.id),
                        Rule::Complete => report.completed.push(group.id),
                        Rule::Reveal => report.revealed.push(group.id),
                    }
                    report.refunds.extend(refunds);
                }
                Ok(None) => {}
                Err(e) => {
                    error!(group_id = %group.id, error = %e, "sweep failed for group");
                    report.failed += 1;
                }
            }
        }
        Ok(report)
    }

    /// The time-based rule due for `group`, judged from the snapshot.
    fn due_rule(&self, group: &Group, now: Timestamp) -> Option<Rule> {
        let params = self.params();
        match group.status {
            GroupStatus::PendingPayment
                if group
                    .status_changed_at
                    .has_expired(params.payment_window_secs, now) =>
            {
                Some(Rule::Expire)
            }
            GroupStatus::PendingPayment
                if params.auto_reveal && params.coverage != CoveragePolicy::Operator =>
            {
                Some(Rule::Reveal)
            }
            GroupStatus::LocationRevealed => group
                .event_datetime
                .filter(|at| now > at.saturating_add(params.completion_grace_secs))
                .map(|_| Rule::Complete),
            _ => None,
        }
    }

    /// Apply `rule` to one group, returning the rule actually applied.
    /// `Ok(None)` means nothing was due any more.
    fn sweep_group(
        &self,
        id: GroupId,
        seen: GroupStatus,
        rule: Rule,
        now: Timestamp,
    ) -> Result<Option<(Rule, Vec<RefundRequest>)>, LifecycleError> {
        let params = self.params();
        self.store().write(|txn| {
            let group = load_group(&*txn, id)?;
            if group.status != seen {
                return Ok(None);
            }
            let rule = match rule {
                Rule::Complete => Rule::Complete,
                Rule::Expire | Rule::Reveal => {
                    let members = group.member_ids.len();
                    let paid = paid_member_count(&*txn, &group)?;
                    let can_reveal =
                        params.auto_reveal && params.coverage != CoveragePolicy::Operator;
                    if !is_covered(params.coverage, paid, members) {
                        if rule == Rule::Reveal {
                            return Ok(None);
                        }
                        Rule::Expire
                    } else if can_reveal {
                        Rule::Reveal
                    } else {
                        info!(
                            group_id = %id,
                            paid,
                            members,
                            "payment window closed on a covered group; left for the operator"
                        );
                        return Ok(None);
                    }
                }
            };
            let transition = self.apply_transition(txn, group, rule.target(), now)?;
            Ok(transition.changed.then_some((rule, transition.refunds)))
        })
    }
}

/// Whether the deposits collected so far meet `policy`. Under the operator
/// policy that means every member paid.
fn is_covered(policy: CoveragePolicy, paid: usize, members: usize) -> bool {
    paid >= policy.required(members).unwrap_or(members)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_policy_counts_as_covered_only_when_everyone_paid() {
        assert!(!is_covered(CoveragePolicy::Operator, 2, 3));
        assert!(is_covered(CoveragePolicy::Operator, 3, 3));
        assert!(is_covered(CoveragePolicy::Full, 3, 3));
        assert!(!is_covered(CoveragePolicy::Full, 2, 3));
        assert!(is_covered(CoveragePolicy::Minimum(2), 2, 3));
    }
}
