//! Storage records and transactional store traits for crew matching.
//!
//! Every storage backend (LMDB, in-memory for testing) implements
//! [`CrewStore`]. The rest of the codebase depends only on these traits.
//!
//! All access goes through a transaction closure. [`CrewStore::write`] runs
//! its closure inside one serialisable write transaction and commits only
//! when the closure returns `Ok`; returning `Err` discards every write the
//! closure made. Multi-step operations (create a group and drain the queue,
//! validate membership and upsert a ledger row) therefore never expose a
//! partial state.

pub mod error;
pub mod feedback;
pub mod group;
pub mod payment;
pub mod queue;
pub mod rsvp;

pub use error::StoreError;
pub use feedback::Feedback;
pub use group::Group;
pub use payment::Payment;
pub use queue::QueueEntry;
pub use rsvp::Rsvp;

use crew_types::{GroupId, UserId};

/// Read access inside a transaction.
pub trait ReadTxn {
    // ── Queue ───────────────────────────────────────────────────────────

    fn queue_entry(&self, user: &UserId) -> Result<Option<QueueEntry>, StoreError>;

    /// All queue entries, in no particular order.
    fn queue_entries(&self) -> Result<Vec<QueueEntry>, StoreError>;

    // ── Groups ──────────────────────────────────────────────────────────

    fn group(&self, id: GroupId) -> Result<Option<Group>, StoreError>;

    /// All groups, ordered by id.
    fn groups(&self) -> Result<Vec<Group>, StoreError>;

    /// Ids of every group the user was ever a member of, ordered by id.
    fn group_ids_for_user(&self, user: &UserId) -> Result<Vec<GroupId>, StoreError>;

    // ── Ledgers ─────────────────────────────────────────────────────────

    fn payment(&self, group: GroupId, user: &UserId) -> Result<Option<Payment>, StoreError>;

    fn payments_for_group(&self, group: GroupId) -> Result<Vec<Payment>, StoreError>;

    /// Look up a payment by the gateway session that produced it.
    fn payment_by_session(&self, session_id: &str) -> Result<Option<Payment>, StoreError>;

    fn rsvp(&self, group: GroupId, user: &UserId) -> Result<Option<Rsvp>, StoreError>;

    fn rsvps_for_group(&self, group: GroupId) -> Result<Vec<Rsvp>, StoreError>;

    fn feedback(&self, group: GroupId, user: &UserId) -> Result<Option<Feedback>, StoreError>;

    fn feedback_for_group(&self, group: GroupId) -> Result<Vec<Feedback>, StoreError>;
}

/// Write access inside a transaction (extends [`ReadTxn`]).
pub trait WriteTxn: ReadTxn {
    /// Allocate the next group id from the store's sequence.
    fn next_group_id(&mut self) -> Result<GroupId, StoreError>;

    fn put_queue_entry(&mut self, entry: &QueueEntry) -> Result<(), StoreError>;

    /// Returns whether an entry existed.
    fn delete_queue_entry(&mut self, user: &UserId) -> Result<bool, StoreError>;

    /// Insert or replace a group, maintaining the user → group index.
    fn put_group(&mut self, group: &Group) -> Result<(), StoreError>;

    /// Insert or replace the row for `(payment.group_id, payment.user_id)`,
    /// maintaining the session index.
    fn put_payment(&mut self, payment: &Payment) -> Result<(), StoreError>;

    fn put_rsvp(&mut self, rsvp: &Rsvp) -> Result<(), StoreError>;

    fn put_feedback(&mut self, feedback: &Feedback) -> Result<(), StoreError>;
}

/// A transactional store.
pub trait CrewStore: Send + Sync {
    /// Run `f` against a consistent snapshot.
    fn read<R, E>(&self, f: impl FnOnce(&dyn ReadTxn) -> Result<R, E>) -> Result<R, E>
    where
        E: From<StoreError>;

    /// Run `f` inside a write transaction; commit iff `f` returns `Ok`.
    fn write<R, E>(&self, f: impl FnOnce(&mut dyn WriteTxn) -> Result<R, E>) -> Result<R, E>
    where
        E: From<StoreError>;
}

impl<S: CrewStore> CrewStore for std::sync::Arc<S> {
    fn read<R, E>(&self, f: impl FnOnce(&dyn ReadTxn) -> Result<R, E>) -> Result<R, E>
    where
        E: From<StoreError>,
    {
        (**self).read(f)
    }

    fn write<R, E>(&self, f: impl FnOnce(&mut dyn WriteTxn) -> Result<R, E>) -> Result<R, E>
    where
        E: From<StoreError>,
    {
        (**self).write(f)
    }
}
