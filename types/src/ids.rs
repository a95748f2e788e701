//! User and group identifiers.
//!
//! User ids are issued by the external identity provider and are opaque
//! strings to us. They end up inside composite storage keys, so they are
//! validated once at the boundary: non-empty, at most [`UserId::MAX_LEN`]
//! bytes, no control characters (in particular no NUL, which the LMDB
//! backend uses as a key separator).

use crate::TypesError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a user, as issued by the identity provider.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    pub const MAX_LEN: usize = 128;

    pub fn parse(raw: impl Into<String>) -> Result<Self, TypesError> {
        let raw = raw.into();
        if raw.is_empty() || raw.len() > Self::MAX_LEN {
            return Err(TypesError::InvalidUserId(raw));
        }
        if raw.chars().any(char::is_control) {
            return Err(TypesError::InvalidUserId(raw.escape_debug().to_string()));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl TryFrom<String> for UserId {
    type Error = TypesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}

impl FromStr for UserId {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a group. Allocated from a per-store sequence, starting at 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(u64);

impl GroupId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(&self) -> u64 {
        self.0
    }

    /// Big-endian bytes, so that byte order equals numeric order in key scans.
    pub fn to_be_bytes(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }

    pub fn from_be_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_be_bytes(bytes))
    }
}

impl FromStr for GroupId {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>()
            .map(Self)
            .map_err(|_| TypesError::InvalidGroupId(s.to_string()))
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_id_rejects_empty_and_control_chars() {
        assert!(UserId::parse("").is_err());
        assert!(UserId::parse("a\0b").is_err());
        assert!(UserId::parse("line\nbreak").is_err());
        assert!(UserId::parse("x".repeat(UserId::MAX_LEN + 1)).is_err());
    }

    #[test]
    fn user_id_accepts_provider_ids() {
        let id = UserId::parse("3f2b9c1e-7a1d-4e0f-9b7c-0d6c2a9e5f11").unwrap();
        assert_eq!(id.as_str(), "3f2b9c1e-7a1d-4e0f-9b7c-0d6c2a9e5f11");
    }

    #[test]
    fn user_id_deserialize_validates() {
        let ok: Result<UserId, _> = serde_json::from_str("\"u1\"");
        assert!(ok.is_ok());
        let bad: Result<UserId, _> = serde_json::from_str("\"\"");
        assert!(bad.is_err());
    }

    #[test]
    fn group_id_be_bytes_preserve_order() {
        let a = GroupId::new(2);
        let b = GroupId::new(256);
        assert!(a.to_be_bytes() < b.to_be_bytes());
        assert_eq!(GroupId::from_be_bytes(b.to_be_bytes()), b);
    }

    #[test]
    fn group_id_parses_decimal() {
        assert_eq!("42".parse::<GroupId>().unwrap(), GroupId::new(42));
        assert!("forty-two".parse::<GroupId>().is_err());
    }
}
