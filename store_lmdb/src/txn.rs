//! Transaction wrappers implementing the `crew-store` traits over heed.

use std::ops::Bound;

use heed::types::Bytes;
use heed::{Database, RoTxn, RwTxn};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crew_store::{
    Feedback, Group, Payment, QueueEntry, ReadTxn, Rsvp, StoreError, WriteTxn,
};
use crew_types::{GroupId, UserId};

use crate::environment::Databases;
use crate::keys::{
    group_from_user_key, group_key, increment_prefix, pair_key, user_group_key, user_prefix,
};
use crate::meta::{last_group_id, put_last_group_id};
use crate::LmdbError;

type Db = Database<Bytes, Bytes>;

fn get<T: DeserializeOwned>(db: &Db, txn: &RoTxn, key: &[u8]) -> Result<Option<T>, LmdbError> {
    match db.get(txn, key)? {
        Some(bytes) => Ok(Some(bincode::deserialize(bytes)?)),
        None => Ok(None),
    }
}

fn put<T: Serialize>(db: &Db, txn: &mut RwTxn, key: &[u8], value: &T) -> Result<(), LmdbError> {
    let bytes = bincode::serialize(value)?;
    db.put(txn, key, &bytes)?;
    Ok(())
}

fn all_values<T: DeserializeOwned>(db: &Db, txn: &RoTxn) -> Result<Vec<T>, LmdbError> {
    let mut out = Vec::new();
    for item in db.iter(txn)? {
        let (_key, value) = item?;
        out.push(bincode::deserialize(value)?);
    }
    Ok(out)
}

/// Visit every entry whose key starts with `prefix`, in key order.
fn scan_prefix(
    db: &Db,
    txn: &RoTxn,
    prefix: &[u8],
    mut visit: impl FnMut(&[u8], &[u8]) -> Result<(), LmdbError>,
) -> Result<(), LmdbError> {
    let upper = increment_prefix(prefix);
    let bounds: (Bound<&[u8]>, Bound<&[u8]>) = (
        Bound::Included(prefix),
        match &upper {
            Some(upper) => Bound::Excluded(upper.as_slice()),
            None => Bound::Unbounded,
        },
    );
    for item in db.range(txn, &bounds)? {
        let (key, value) = item?;
        visit(key, value)?;
    }
    Ok(())
}

fn values_with_prefix<T: DeserializeOwned>(
    db: &Db,
    txn: &RoTxn,
    prefix: &[u8],
) -> Result<Vec<T>, LmdbError> {
    let mut out = Vec::new();
    scan_prefix(db, txn, prefix, |_key, value| {
        out.push(bincode::deserialize(value)?);
        Ok(())
    })?;
    Ok(out)
}

pub(crate) struct LmdbReadTxn<'e> {
    txn: RoTxn<'e>,
    dbs: &'e Databases,
}

impl<'e> LmdbReadTxn<'e> {
    pub(crate) fn new(txn: RoTxn<'e>, dbs: &'e Databases) -> Self {
        Self { txn, dbs }
    }
}

pub(crate) struct LmdbWriteTxn<'e> {
    txn: RwTxn<'e>,
    dbs: &'e Databases,
}

impl<'e> LmdbWriteTxn<'e> {
    pub(crate) fn new(txn: RwTxn<'e>, dbs: &'e Databases) -> Self {
        Self { txn, dbs }
    }

    pub(crate) fn commit(self) -> Result<(), heed::Error> {
        self.txn.commit()
    }
}

/// Both wrappers read the same way; an `RwTxn` derefs to an `RoTxn`.
macro_rules! impl_read_txn {
    ($ty:ident) => {
        impl ReadTxn for $ty<'_> {
            fn queue_entry(&self, user: &UserId) -> Result<Option<QueueEntry>, StoreError> {
                Ok(get(&self.dbs.queue, &self.txn, user.as_bytes())?)
            }

            fn queue_entries(&self) -> Result<Vec<QueueEntry>, StoreError> {
                Ok(all_values(&self.dbs.queue, &self.txn)?)
            }

            fn group(&self, id: GroupId) -> Result<Option<Group>, StoreError> {
                Ok(get(&self.dbs.groups, &self.txn, &group_key(id))?)
            }

            fn groups(&self) -> Result<Vec<Group>, StoreError> {
                Ok(all_values(&self.dbs.groups, &self.txn)?)
            }

            fn group_ids_for_user(&self, user: &UserId) -> Result<Vec<GroupId>, StoreError> {
                let mut ids = Vec::new();
                scan_prefix(
                    &self.dbs.user_groups,
                    &self.txn,
                    &user_prefix(user),
                    |key, _| {
                        ids.push(group_from_user_key(key)?);
                        Ok(())
                    },
                )?;
                Ok(ids)
            }

            fn payment(&self, group: GroupId, user: &UserId) -> Result<Option<Payment>, StoreError> {
                Ok(get(&self.dbs.payments, &self.txn, &pair_key(group, user))?)
            }

            fn payments_for_group(&self, group: GroupId) -> Result<Vec<Payment>, StoreError> {
                Ok(values_with_prefix(&self.dbs.payments, &self.txn, &group_key(group))?)
            }

            fn payment_by_session(&self, session_id: &str) -> Result<Option<Payment>, StoreError> {
                let pair = match self
                    .dbs
                    .sessions
                    .get(&self.txn, session_id.as_bytes())
                    .map_err(LmdbError::from)?
                {
                    Some(pair) => pair.to_vec(),
                    None => return Ok(None),
                };
                Ok(get(&self.dbs.payments, &self.txn, &pair)?)
            }

            fn rsvp(&self, group: GroupId, user: &UserId) -> Result<Option<Rsvp>, StoreError> {
                Ok(get(&self.dbs.rsvps, &self.txn, &pair_key(group, user))?)
            }

            fn rsvps_for_group(&self, group: GroupId) -> Result<Vec<Rsvp>, StoreError> {
                Ok(values_with_prefix(&self.dbs.rsvps, &self.txn, &group_key(group))?)
            }

            fn feedback(&self, group: GroupId, user: &UserId) -> Result<Option<Feedback>, StoreError> {
                Ok(get(&self.dbs.feedback, &self.txn, &pair_key(group, user))?)
            }

            fn feedback_for_group(&self, group: GroupId) -> Result<Vec<Feedback>, StoreError> {
                Ok(values_with_prefix(&self.dbs.feedback, &self.txn, &group_key(group))?)
            }
        }
    };
}

impl_read_txn!(LmdbReadTxn);
impl_read_txn!(LmdbWriteTxn);

impl WriteTxn for LmdbWriteTxn<'_> {
    fn next_group_id(&mut self) -> Result<GroupId, StoreError> {
        let last = last_group_id(&self.dbs.meta, &self.txn)?;
        let next = last
            .checked_add(1)
            .ok_or_else(|| StoreError::Corruption("group id sequence exhausted".to_string()))?;
        put_last_group_id(&self.dbs.meta, &mut self.txn, next)?;
        Ok(GroupId::new(next))
    }

    fn put_queue_entry(&mut self, entry: &QueueEntry) -> Result<(), StoreError> {
        Ok(put(
            &self.dbs.queue,
            &mut self.txn,
            entry.user_id.as_bytes(),
            entry,
        )?)
    }

    fn delete_queue_entry(&mut self, user: &UserId) -> Result<bool, StoreError> {
        Ok(self
            .dbs
            .queue
            .delete(&mut self.txn, user.as_bytes())
            .map_err(LmdbError::from)?)
    }

    fn put_group(&mut self, group: &Group) -> Result<(), StoreError> {
        for member in &group.member_ids {
            self.dbs
                .user_groups
                .put(&mut self.txn, &user_group_key(member, group.id), &[])
                .map_err(LmdbError::from)?;
        }
        Ok(put(&self.dbs.groups, &mut self.txn, &group_key(group.id), group)?)
    }

    fn put_payment(&mut self, payment: &Payment) -> Result<(), StoreError> {
        let key = pair_key(payment.group_id, &payment.user_id);
        // A replaced row takes its session index entry with it.
        let previous: Option<Payment> = get(&self.dbs.payments, &self.txn, &key)?;
        if let Some(previous) = previous {
            if previous.external_session_id != payment.external_session_id {
                self.dbs
                    .sessions
                    .delete(&mut self.txn, previous.external_session_id.as_bytes())
                    .map_err(LmdbError::from)?;
            }
        }
        self.dbs
            .sessions
            .put(&mut self.txn, payment.external_session_id.as_bytes(), &key)
            .map_err(LmdbError::from)?;
        Ok(put(&self.dbs.payments, &mut self.txn, &key, payment)?)
    }

    fn put_rsvp(&mut self, rsvp: &Rsvp) -> Result<(), StoreError> {
        let key = pair_key(rsvp.group_id, &rsvp.user_id);
        Ok(put(&self.dbs.rsvps, &mut self.txn, &key, rsvp)?)
    }

    fn put_feedback(&mut self, feedback: &Feedback) -> Result<(), StoreError> {
        let key = pair_key(feedback.group_id, &feedback.user_id);
        Ok(put(&self.dbs.feedback, &mut self.txn, &key, feedback)?)
    }
}
