//! Nullable store: thread-safe in-memory storage for testing.
//!
//! Writes run against a copy of the state while the lock is held and the
//! copy replaces the state only when the closure succeeds, so the
//! all-or-nothing contract of `CrewStore::write` holds here as well.

use crew_store::{
    CrewStore, Feedback, Group, Payment, QueueEntry, ReadTxn, Rsvp, StoreError, WriteTxn,
};
use crew_types::{GroupId, UserId};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

type PairKey = (GroupId, UserId);

#[derive(Clone, Default)]
struct MemState {
    queue: BTreeMap<UserId, QueueEntry>,
    groups: BTreeMap<GroupId, Group>,
    user_groups: BTreeMap<UserId, BTreeSet<GroupId>>,
    payments: BTreeMap<PairKey, Payment>,
    sessions: BTreeMap<String, PairKey>,
    rsvps: BTreeMap<PairKey, Rsvp>,
    feedback: BTreeMap<PairKey, Feedback>,
    last_group_id: u64,
}

fn pair(group: GroupId, user: &UserId) -> PairKey {
    (group, user.clone())
}

fn for_group<T: Clone>(map: &BTreeMap<PairKey, T>, group: GroupId) -> Vec<T> {
    map.iter()
        .filter(|((g, _), _)| *g == group)
        .map(|(_, v)| v.clone())
        .collect()
}

impl ReadTxn for MemState {
    fn queue_entry(&self, user: &UserId) -> Result<Option<QueueEntry>, StoreError> {
        Ok(self.queue.get(user).cloned())
    }

    fn queue_entries(&self) -> Result<Vec<QueueEntry>, StoreError> {
        Ok(self.queue.values().cloned().collect())
    }

    fn group(&self, id: GroupId) -> Result<Option<Group>, StoreError> {
        Ok(self.groups.get(&id).cloned())
    }

    fn groups(&self) -> Result<Vec<Group>, StoreError> {
        Ok(self.groups.values().cloned().collect())
    }

    fn group_ids_for_user(&self, user: &UserId) -> Result<Vec<GroupId>, StoreError> {
        Ok(self
            .user_groups
            .get(user)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default())
    }

    fn payment(&self, group: GroupId, user: &UserId) -> Result<Option<Payment>, StoreError> {
        Ok(self.payments.get(&pair(group, user)).cloned())
    }

    fn payments_for_group(&self, group: GroupId) -> Result<Vec<Payment>, StoreError> {
        Ok(for_group(&self.payments, group))
    }

    fn payment_by_session(&self, session_id: &str) -> Result<Option<Payment>, StoreError> {
        Ok(self
            .sessions
            .get(session_id)
            .and_then(|key| self.payments.get(key))
            .cloned())
    }

    fn rsvp(&self, group: GroupId, user: &UserId) -> Result<Option<Rsvp>, StoreError> {
        Ok(self.rsvps.get(&pair(group, user)).cloned())
    }

    fn rsvps_for_group(&self, group: GroupId) -> Result<Vec<Rsvp>, StoreError> {
        Ok(for_group(&self.rsvps, group))
    }

    fn feedback(&self, group: GroupId, user: &UserId) -> Result<Option<Feedback>, StoreError> {
        Ok(self.feedback.get(&pair(group, user)).cloned())
    }

    fn feedback_for_group(&self, group: GroupId) -> Result<Vec<Feedback>, StoreError> {
        Ok(for_group(&self.feedback, group))
    }
}

impl WriteTxn for MemState {
    fn next_group_id(&mut self) -> Result<GroupId, StoreError> {
        self.last_group_id += 1;
        Ok(GroupId::new(self.last_group_id))
    }

    fn put_queue_entry(&mut self, entry: &QueueEntry) -> Result<(), StoreError> {
        self.queue.insert(entry.user_id.clone(), entry.clone());
        Ok(())
    }

    fn delete_queue_entry(&mut self, user: &UserId) -> Result<bool, StoreError> {
        Ok(self.queue.remove(user).is_some())
    }

    fn put_group(&mut self, group: &Group) -> Result<(), StoreError> {
        for member in &group.member_ids {
            self.user_groups
                .entry(member.clone())
                .or_default()
                .insert(group.id);
        }
        self.groups.insert(group.id, group.clone());
        Ok(())
    }

    fn put_payment(&mut self, payment: &Payment) -> Result<(), StoreError> {
        let key = pair(payment.group_id, &payment.user_id);
        self.sessions
            .insert(payment.external_session_id.clone(), key.clone());
        if let Some(previous) = self.payments.insert(key, payment.clone()) {
            if previous.external_session_id != payment.external_session_id {
                self.sessions.remove(&previous.external_session_id);
            }
        }
        Ok(())
    }

    fn put_rsvp(&mut self, rsvp: &Rsvp) -> Result<(), StoreError> {
        self.rsvps
            .insert(pair(rsvp.group_id, &rsvp.user_id), rsvp.clone());
        Ok(())
    }

    fn put_feedback(&mut self, feedback: &Feedback) -> Result<(), StoreError> {
        self.feedback
            .insert(pair(feedback.group_id, &feedback.user_id), feedback.clone());
        Ok(())
    }
}

/// An in-memory [`CrewStore`] for testing.
/// Thread-safe for use with tokio's multi-threaded runtime.
#[derive(Default)]
pub struct NullStore {
    state: Mutex<MemState>,
    fail_writes: AtomicBool,
}

impl NullStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail with a backend error (until reset).
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn lock(&self) -> MutexGuard<'_, MemState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CrewStore for NullStore {
    fn read<R, E>(&self, f: impl FnOnce(&dyn ReadTxn) -> Result<R, E>) -> Result<R, E>
    where
        E: From<StoreError>,
    {
        let state = self.lock();
        f(&*state)
    }

    fn write<R, E>(&self, f: impl FnOnce(&mut dyn WriteTxn) -> Result<R, E>) -> Result<R, E>
    where
        E: From<StoreError>,
    {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("null store: writes disabled".to_string()).into());
        }
        let mut state = self.lock();
        let mut draft = state.clone();
        let result = f(&mut draft)?;
        *state = draft;
        Ok(result)
    }
}
