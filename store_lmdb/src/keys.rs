//! Binary key layouts.
//!
//! - groups: `group_id_be`
//! - ledgers (payments, rsvps, feedback): `group_id_be ++ user_id`
//! - user → groups index: `user_id ++ 0x00 ++ group_id_be`
//! - queue: `user_id`
//! - sessions: `session_id` → ledger key
//!
//! Group ids are fixed-width big-endian, so per-group listing is a prefix
//! scan in id order. User ids never contain control characters, so the
//! `0x00` separator cannot occur inside one.

use crew_types::{GroupId, UserId};

use crate::LmdbError;

pub(crate) const USER_SEPARATOR: u8 = 0x00;

pub(crate) fn group_key(id: GroupId) -> [u8; 8] {
    id.to_be_bytes()
}

pub(crate) fn pair_key(group: GroupId, user: &UserId) -> Vec<u8> {
    let user = user.as_bytes();
    let mut key = Vec::with_capacity(8 + user.len());
    key.extend_from_slice(&group.to_be_bytes());
    key.extend_from_slice(user);
    key
}

pub(crate) fn user_prefix(user: &UserId) -> Vec<u8> {
    let user = user.as_bytes();
    let mut key = Vec::with_capacity(user.len() + 1);
    key.extend_from_slice(user);
    key.push(USER_SEPARATOR);
    key
}

pub(crate) fn user_group_key(user: &UserId, group: GroupId) -> Vec<u8> {
    let mut key = user_prefix(user);
    key.extend_from_slice(&group.to_be_bytes());
    key
}

/// Group id from the tail of a `user ++ 0x00 ++ group_be` key.
pub(crate) fn group_from_user_key(key: &[u8]) -> Result<GroupId, LmdbError> {
    let start = key
        .len()
        .checked_sub(8)
        .ok_or_else(|| LmdbError::Serialization("user index key too short".to_string()))?;
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&key[start..]);
    Ok(GroupId::from_be_bytes(bytes))
}

/// Smallest key greater than every key starting with `prefix`, or `None`
/// when the prefix is all `0xFF` (scan to the end).
pub(crate) fn increment_prefix(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut upper = prefix.to_vec();
    while let Some(last) = upper.pop() {
        if last < u8::MAX {
            upper.push(last + 1);
            return Some(upper);
        }
    }
    None
}
