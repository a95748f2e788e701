//! Group lifecycle engine for crew matching.
//!
//! The engine owns every rule that moves a user from the queue into a group,
//! advances the group along its status DAG, and attaches payment, RSVP and
//! feedback rows to it. Each operation runs as one store write transaction,
//! so concurrent callers (an operator and the payment webhook) never observe
//! a half-applied change.

pub mod engine;
pub mod error;
pub mod ledgers;
pub mod matcher;
pub mod operator;
pub mod queries;
pub mod sweep;

pub use engine::{GroupPlan, LifecycleEngine, RefundRequest, Transition};
pub use error::LifecycleError;
pub use ledgers::{Applied, CheckoutTicket, FeedbackInput, PaymentFact, PaymentOutcome};
pub use matcher::{ManualSelection, Matcher};
pub use operator::{Operator, OperatorAuthority};
pub use queries::{Coverage, GroupDetail, GroupView, PaymentState, Venue};
pub use sweep::SweepReport;
