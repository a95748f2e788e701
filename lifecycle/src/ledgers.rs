//! Satellite ledgers: payments, RSVPs and feedback.
//!
//! Every row belongs to exactly one (group, user) pair and is only written
//! for a member of that group. Payment rows are ordered by the gateway's
//! event time so a redelivered or out-of-order event never regresses a row.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crew_store::{CrewStore, Feedback, Group, Payment, Rsvp, WriteTxn};
use crew_types::{GroupId, GroupStatus, PaymentStatus, RsvpAnswer, Timestamp, UserId};

use crate::engine::{load_membership, LifecycleEngine, RefundRequest};
use crate::LifecycleError;

/// A payment or refund fact reported by the gateway.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentFact {
    pub group_id: GroupId,
    pub user_id: UserId,
    pub status: PaymentStatus,
    pub external_session_id: String,
    pub payment_ref: Option<String>,
    pub amount_cents: u64,
    pub event_id: String,
    pub event_at: Timestamp,
}

impl PaymentFact {
    /// A completed checkout. The event id defaults to the session id.
    pub fn paid(
        group_id: GroupId,
        user_id: UserId,
        session_id: impl Into<String>,
        amount_cents: u64,
        event_at: Timestamp,
    ) -> Self {
        let external_session_id = session_id.into();
        Self {
            group_id,
            user_id,
            status: PaymentStatus::Paid,
            event_id: external_session_id.clone(),
            external_session_id,
            payment_ref: None,
            amount_cents,
            event_at,
        }
    }

    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = event_id.into();
        self
    }

    pub fn with_payment_ref(mut self, payment_ref: impl Into<String>) -> Self {
        self.payment_ref = Some(payment_ref.into());
        self
    }
}

/// How an incoming fact was applied to the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Applied {
    /// First row for the pair.
    Inserted,
    /// A newer fact replaced the row.
    Replaced,
    /// The row already reflects this fact.
    Duplicate,
    /// The fact is older than the row, or concerns a charge the row no
    /// longer tracks, and was ignored.
    Stale,
    /// A second charge for a pair that already holds a paid row. The row is
    /// kept and the new charge comes back as a refund request.
    Surplus,
}

impl Applied {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inserted => "inserted",
            Self::Replaced => "replaced",
            Self::Duplicate => "duplicate",
            Self::Stale => "stale",
            Self::Surplus => "surplus",
        }
    }

    pub fn wrote(&self) -> bool {
        matches!(self, Self::Inserted | Self::Replaced)
    }
}

#[derive(Clone, Debug)]
pub struct PaymentOutcome {
    /// The row as stored after the call.
    pub payment: Payment,
    pub applied: Applied,
    /// Set when a deposit landed on a group that was already cancelled, or
    /// when the pair had already paid through another session.
    pub refund: Option<RefundRequest>,
}

/// Decide how `fact` applies on top of `row`.
///
/// Within one session the event time orders facts, and a refund wins a tie
/// against a payment. A paid fact from another session is a separate charge:
/// it is surplus while the row is paid and replaces a refunded row.
pub(crate) fn classify(row: Option<&Payment>, fact: &PaymentFact) -> Applied {
    let Some(row) = row else {
        return Applied::Inserted;
    };
    if row.external_session_id != fact.external_session_id {
        return match (row.status, fact.status) {
            (PaymentStatus::Paid, PaymentStatus::Paid) => Applied::Surplus,
            (PaymentStatus::Refunded, PaymentStatus::Paid) => Applied::Replaced,
            (_, PaymentStatus::Refunded) => Applied::Stale,
        };
    }
    if row.status == fact.status {
        return Applied::Duplicate;
    }
    if fact.event_at < row.event_at {
        return Applied::Stale;
    }
    if fact.event_at == row.event_at
        && row.status == PaymentStatus::Refunded
        && fact.status == PaymentStatus::Paid
    {
        return Applied::Stale;
    }
    Applied::Replaced
}

fn refund_of(fact: &PaymentFact) -> RefundRequest {
    RefundRequest {
        group_id: fact.group_id,
        user_id: fact.user_id.clone(),
        external_session_id: fact.external_session_id.clone(),
        payment_ref: fact.payment_ref.clone(),
        amount_cents: fact.amount_cents,
    }
}

/// Apply `fact` against `existing` inside `txn`.
fn write_fact(
    txn: &mut dyn WriteTxn,
    group: &Group,
    existing: Option<Payment>,
    fact: &PaymentFact,
    now: Timestamp,
) -> Result<PaymentOutcome, LifecycleError> {
    let applied = classify(existing.as_ref(), fact);

    let payment = match (applied, existing) {
        (Applied::Inserted, _) | (Applied::Replaced, None) => Payment {
            group_id: fact.group_id,
            user_id: fact.user_id.clone(),
            status: fact.status,
            external_session_id: fact.external_session_id.clone(),
            payment_ref: fact.payment_ref.clone(),
            amount_cents: fact.amount_cents,
            event_id: fact.event_id.clone(),
            event_at: fact.event_at,
            created_at: now,
            updated_at: now,
        },
        (Applied::Replaced, Some(row)) => Payment {
            status: fact.status,
            external_session_id: fact.external_session_id.clone(),
            payment_ref: fact.payment_ref.clone().or(row.payment_ref),
            amount_cents: fact.amount_cents,
            event_id: fact.event_id.clone(),
            event_at: fact.event_at,
            updated_at: now,
            ..row
        },
        (Applied::Duplicate | Applied::Stale | Applied::Surplus, Some(row)) => row,
        (Applied::Duplicate | Applied::Stale | Applied::Surplus, None) => {
            return Err(LifecycleError::NotFound("payment row".to_string()))
        }
    };
    if applied.wrote() {
        txn.put_payment(&payment)?;
    }

    let refund = if applied == Applied::Surplus {
        Some(refund_of(fact))
    } else {
        (applied.wrote()
            && payment.status == PaymentStatus::Paid
            && group.status == GroupStatus::Cancelled)
            .then(|| refund_of(fact))
    };

    Ok(PaymentOutcome {
        payment,
        applied,
        refund,
    })
}

/// Feedback as submitted by a member.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FeedbackInput {
    pub stars: u8,
    #[serde(default)]
    pub would_meet_again: Option<bool>,
    #[serde(default)]
    pub comment: Option<String>,
}

/// What the gateway needs to open a checkout for one member.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CheckoutTicket {
    pub group_id: GroupId,
    pub user_id: UserId,
    pub amount_cents: u64,
    pub currency: String,
}

impl<S: CrewStore> LifecycleEngine<S> {
    /// Apply a verified `paid` fact from the gateway.
    ///
    /// Never changes the group's status. A payment that lands on a cancelled
    /// group is still recorded and comes back with a refund request.
    pub fn record_payment(&self, fact: PaymentFact) -> Result<PaymentOutcome, LifecycleError> {
        if fact.status != PaymentStatus::Paid {
            return Err(LifecycleError::Validation(
                "record_payment takes a paid fact; use record_refund".to_string(),
            ));
        }
        self.apply_payment_fact(fact)
    }

    /// Apply a verified refund for the pair's existing payment.
    ///
    /// `payment_ref` names the refunded charge. When it differs from the
    /// charge the row tracks, the row is left alone (`Stale`). A refund for a
    /// pair that never paid is `NotFound`.
    pub fn record_refund(
        &self,
        group_id: GroupId,
        user_id: &UserId,
        payment_ref: Option<&str>,
        event_id: &str,
        event_at: Timestamp,
    ) -> Result<PaymentOutcome, LifecycleError> {
        let now = self.now();
        let (fact, outcome) = self.store().write(|txn| {
            let group = load_membership(&*txn, group_id, user_id)?;
            let row = txn.payment(group_id, user_id)?.ok_or_else(|| {
                LifecycleError::NotFound(format!(
                    "payment for user {user_id} in group {group_id}"
                ))
            })?;
            let fact = PaymentFact {
                group_id,
                user_id: user_id.clone(),
                status: PaymentStatus::Refunded,
                external_session_id: row.external_session_id.clone(),
                payment_ref: payment_ref
                    .map(str::to_string)
                    .or_else(|| row.payment_ref.clone()),
                amount_cents: row.amount_cents,
                event_id: event_id.to_string(),
                event_at,
            };
            let other_charge = matches!(
                (payment_ref, row.payment_ref.as_deref()),
                (Some(refunded), Some(tracked)) if refunded != tracked
            );
            if other_charge {
                let outcome = PaymentOutcome {
                    payment: row,
                    applied: Applied::Stale,
                    refund: None,
                };
                return Ok((fact, outcome));
            }
            let outcome = write_fact(txn, &group, Some(row), &fact, now)?;
            Ok::<_, LifecycleError>((fact, outcome))
        })?;
        log_outcome(&fact, &outcome);
        Ok(outcome)
    }

    fn apply_payment_fact(&self, fact: PaymentFact) -> Result<PaymentOutcome, LifecycleError> {
        let now = self.now();
        let outcome = self.store().write(|txn| {
            let group = load_membership(&*txn, fact.group_id, &fact.user_id)?;
            let existing = txn.payment(fact.group_id, &fact.user_id)?;
            write_fact(txn, &group, existing, &fact, now)
        })?;
        log_outcome(&fact, &outcome);
        Ok(outcome)
    }

    /// Record or replace a member's RSVP.
    ///
    /// Open once the venue is revealed; closed for cancelled groups.
    pub fn record_rsvp(
        &self,
        group_id: GroupId,
        user_id: &UserId,
        answer: RsvpAnswer,
    ) -> Result<Rsvp, LifecycleError> {
        let now = self.now();
        let rsvp = self.store().write(|txn| {
            let group = load_membership(&*txn, group_id, user_id)?;
            gate(&group.status, group_id, "rsvp", GroupStatus::accepts_rsvp)?;
            let created_at = txn
                .rsvp(group_id, user_id)?
                .map_or(now, |existing| existing.created_at);
            let rsvp = Rsvp {
                group_id,
                user_id: user_id.clone(),
                answer,
                created_at,
                updated_at: now,
            };
            txn.put_rsvp(&rsvp)?;
            Ok::<_, LifecycleError>(rsvp)
        })?;

        info!(group_id = %group_id, user_id = %user_id, answer = answer.as_str(), "rsvp recorded");
        Ok(rsvp)
    }

    /// Record or replace a member's feedback. Only completed groups accept it.
    pub fn record_feedback(
        &self,
        group_id: GroupId,
        user_id: &UserId,
        input: FeedbackInput,
    ) -> Result<Feedback, LifecycleError> {
        let (stars, comment) = self.validate_feedback(&input)?;
        let now = self.now();
        let feedback = self.store().write(|txn| {
            let group = load_membership(&*txn, group_id, user_id)?;
            gate(&group.status, group_id, "feedback", GroupStatus::accepts_feedback)?;
            let created_at = txn
                .feedback(group_id, user_id)?
                .map_or(now, |existing| existing.created_at);
            let feedback = Feedback {
                group_id,
                user_id: user_id.clone(),
                stars,
                would_meet_again: input.would_meet_again,
                comment: comment.clone(),
                created_at,
                updated_at: now,
            };
            txn.put_feedback(&feedback)?;
            Ok::<_, LifecycleError>(feedback)
        })?;

        info!(group_id = %group_id, user_id = %user_id, stars, "feedback recorded");
        Ok(feedback)
    }

    fn validate_feedback(
        &self,
        input: &FeedbackInput,
    ) -> Result<(u8, Option<String>), LifecycleError> {
        if !(1..=5).contains(&input.stars) {
            return Err(LifecycleError::InvalidFeedback(format!(
                "stars must be between 1 and 5, got {}",
                input.stars
            )));
        }
        let comment = input
            .comment
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        if let Some(text) = &comment {
            let max = self.params().comment_max_chars;
            let len = text.chars().count();
            if len > max {
                return Err(LifecycleError::InvalidFeedback(format!(
                    "comment is {len} characters, limit is {max}"
                )));
            }
        }
        Ok((input.stars, comment))
    }

    /// Check that `user_id` may open a checkout for `group_id`.
    pub fn checkout_precheck(
        &self,
        group_id: GroupId,
        user_id: &UserId,
    ) -> Result<CheckoutTicket, LifecycleError> {
        self.store().read(|txn| {
            let group = load_membership(txn, group_id, user_id)?;
            if let Some(payment) = txn.payment(group_id, user_id)? {
                if payment.status == PaymentStatus::Paid {
                    return Err(LifecycleError::AlreadyPaid {
                        group: group_id,
                        user: user_id.clone(),
                    });
                }
            }
            if group.status != GroupStatus::PendingPayment {
                return Err(LifecycleError::NotPayable {
                    group: group_id,
                    status: group.status,
                });
            }
            Ok(CheckoutTicket {
                group_id,
                user_id: user_id.clone(),
                amount_cents: self.params().deposit_cents,
                currency: self.params().currency.clone(),
            })
        })
    }
}

fn log_outcome(fact: &PaymentFact, outcome: &PaymentOutcome) {
    info!(
        group_id = %fact.group_id,
        user_id = %fact.user_id,
        status = %fact.status,
        event_id = %fact.event_id,
        payment_ref = fact.payment_ref.as_deref().unwrap_or("-"),
        outcome = outcome.applied.as_str(),
        "payment fact applied"
    );
    match outcome.applied {
        Applied::Surplus => warn!(
            group_id = %fact.group_id,
            user_id = %fact.user_id,
            session = %fact.external_session_id,
            "second charge for an already paid member; refund requested"
        ),
        _ if outcome.refund.is_some() => warn!(
            group_id = %fact.group_id,
            user_id = %fact.user_id,
            "deposit received for a cancelled group; refund requested"
        ),
        Applied::Stale if fact.status == PaymentStatus::Refunded => warn!(
            group_id = %fact.group_id,
            user_id = %fact.user_id,
            "refund names a charge the ledger no longer tracks"
        ),
        _ => {}
    }
}

fn gate(
    status: &GroupStatus,
    group: GroupId,
    ledger: &'static str,
    open: fn(&GroupStatus) -> bool,
) -> Result<(), LifecycleError> {
    if *status == GroupStatus::Cancelled {
        return Err(LifecycleError::LedgerClosed { group, ledger });
    }
    if !open(status) {
        return Err(LifecycleError::LedgerNotOpen {
            group,
            status: *status,
            ledger,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: PaymentStatus, session: &str, at: u64) -> Payment {
        Payment {
            group_id: GroupId::new(1),
            user_id: UserId::parse("ann").unwrap(),
            status,
            external_session_id: session.to_string(),
            payment_ref: None,
            amount_cents: 800,
            event_id: "evt".to_string(),
            event_at: Timestamp::new(at),
            created_at: Timestamp::new(at),
            updated_at: Timestamp::new(at),
        }
    }

    fn fact(status: PaymentStatus, session: &str, at: u64) -> PaymentFact {
        PaymentFact {
            status,
            ..PaymentFact::paid(
                GroupId::new(1),
                UserId::parse("ann").unwrap(),
                session,
                800,
                Timestamp::new(at),
            )
        }
    }

    #[test]
    fn first_fact_inserts() {
        assert_eq!(
            classify(None, &fact(PaymentStatus::Paid, "cs_1", 10)),
            Applied::Inserted
        );
    }

    #[test]
    fn same_session_same_status_is_duplicate() {
        let existing = row(PaymentStatus::Paid, "cs_1", 10);
        assert_eq!(
            classify(Some(&existing), &fact(PaymentStatus::Paid, "cs_1", 99)),
            Applied::Duplicate
        );
    }

    #[test]
    fn stale_paid_never_downgrades_refund() {
        let existing = row(PaymentStatus::Refunded, "cs_1", 50);
        assert_eq!(
            classify(Some(&existing), &fact(PaymentStatus::Paid, "cs_1", 10)),
            Applied::Stale
        );
        assert_eq!(
            classify(Some(&existing), &fact(PaymentStatus::Paid, "cs_1", 50)),
            Applied::Stale
        );
    }

    #[test]
    fn refund_wins_a_tie_and_newer_payment_replaces() {
        let paid = row(PaymentStatus::Paid, "cs_1", 50);
        assert_eq!(
            classify(Some(&paid), &fact(PaymentStatus::Refunded, "cs_1", 50)),
            Applied::Replaced
        );
        let refunded = row(PaymentStatus::Refunded, "cs_1", 50);
        assert_eq!(
            classify(Some(&refunded), &fact(PaymentStatus::Paid, "cs_2", 60)),
            Applied::Replaced
        );
    }

    #[test]
    fn second_paid_session_is_surplus_in_either_order() {
        let paid = row(PaymentStatus::Paid, "cs_1", 50);
        assert_eq!(
            classify(Some(&paid), &fact(PaymentStatus::Paid, "cs_2", 60)),
            Applied::Surplus
        );
        assert_eq!(
            classify(Some(&paid), &fact(PaymentStatus::Paid, "cs_2", 10)),
            Applied::Surplus
        );
        assert!(!Applied::Surplus.wrote());
    }

    #[test]
    fn refund_from_another_session_is_stale() {
        let paid = row(PaymentStatus::Paid, "cs_1", 50);
        assert_eq!(
            classify(Some(&paid), &fact(PaymentStatus::Refunded, "cs_2", 90)),
            Applied::Stale
        );
    }

    #[test]
    fn gate_distinguishes_closed_from_not_open() {
        let id = GroupId::new(1);
        assert!(matches!(
            gate(&GroupStatus::Cancelled, id, "rsvp", GroupStatus::accepts_rsvp),
            Err(LifecycleError::LedgerClosed { .. })
        ));
        assert!(matches!(
            gate(&GroupStatus::PendingPayment, id, "rsvp", GroupStatus::accepts_rsvp),
            Err(LifecycleError::LedgerNotOpen { .. })
        ));
        assert!(gate(&GroupStatus::Completed, id, "feedback", GroupStatus::accepts_feedback).is_ok());
    }
}
