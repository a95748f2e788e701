//! Meta database: schema version and the group id sequence.

use heed::types::Bytes;
use heed::{Database, RoTxn, RwTxn};

use crate::{LmdbEnvironment, LmdbError};

const SCHEMA_VERSION_KEY: &[u8] = b"schema_version";
const LAST_GROUP_ID_KEY: &[u8] = b"last_group_id";

/// Stored schema version; `0` for a fresh environment.
pub fn schema_version(env: &LmdbEnvironment) -> Result<u32, LmdbError> {
    let rtxn = env.env().read_txn()?;
    match env.dbs().meta.get(&rtxn, SCHEMA_VERSION_KEY)? {
        Some(bytes) => {
            let arr: [u8; 4] = bytes.try_into().map_err(|_| {
                LmdbError::Serialization("schema_version has unexpected byte length".to_string())
            })?;
            Ok(u32::from_le_bytes(arr))
        }
        None => Ok(0),
    }
}

pub fn set_schema_version(env: &LmdbEnvironment, version: u32) -> Result<(), LmdbError> {
    let mut wtxn = env.env().write_txn()?;
    env.dbs()
        .meta
        .put(&mut wtxn, SCHEMA_VERSION_KEY, &version.to_le_bytes())?;
    wtxn.commit()?;
    Ok(())
}

pub(crate) fn last_group_id(meta: &Database<Bytes, Bytes>, txn: &RoTxn) -> Result<u64, LmdbError> {
    match meta.get(txn, LAST_GROUP_ID_KEY)? {
        Some(bytes) => {
            let arr: [u8; 8] = bytes.try_into().map_err(|_| {
                LmdbError::Serialization("last_group_id has unexpected byte length".to_string())
            })?;
            Ok(u64::from_be_bytes(arr))
        }
        None => Ok(0),
    }
}

pub(crate) fn put_last_group_id(
    meta: &Database<Bytes, Bytes>,
    txn: &mut RwTxn,
    id: u64,
) -> Result<(), LmdbError> {
    meta.put(txn, LAST_GROUP_ID_KEY, &id.to_be_bytes())?;
    Ok(())
}
