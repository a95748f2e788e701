//! LMDB integrity checks.
//!
//! Run on startup to detect corruption or broken secondary indexes before
//! the service starts accepting writes.

use std::path::Path;

use crew_store::{CrewStore, StoreError};

use crate::environment::DATABASE_NAMES;
use crate::{LmdbEnvironment, LmdbError};

/// Summary of an integrity check run.
#[derive(Debug, Default)]
pub struct IntegrityReport {
    pub databases_checked: u32,
    pub total_entries: u64,
    pub errors: Vec<String>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Count entries in every database and cross-check the indexes.
///
/// Read failures on individual databases are recorded in the report rather
/// than returned; only failing to start a read transaction is an error.
pub fn check_integrity(env: &LmdbEnvironment) -> Result<IntegrityReport, LmdbError> {
    let mut report = IntegrityReport::default();

    {
        let rtxn = env.env().read_txn()?;
        for &name in DATABASE_NAMES {
            match env
                .env()
                .open_database::<heed::types::Bytes, heed::types::Bytes>(&rtxn, Some(name))
            {
                Ok(Some(db)) => {
                    report.databases_checked += 1;
                    match db.len(&rtxn) {
                        Ok(count) => report.total_entries += count,
                        Err(e) => report
                            .errors
                            .push(format!("failed to read database '{name}': {e}")),
                    }
                }
                Ok(None) => report.errors.push(format!("database '{name}' is missing")),
                Err(e) => report
                    .errors
                    .push(format!("failed to open database '{name}': {e}")),
            }
        }
    }

    let index_errors: Result<Vec<String>, StoreError> = env.read(|txn| {
        let mut errors = Vec::new();
        for group in txn.groups()? {
            for member in &group.member_ids {
                if !txn.group_ids_for_user(member)?.contains(&group.id) {
                    errors.push(format!("group {} member {member} missing from user index", group.id));
                }
            }
            for payment in txn.payments_for_group(group.id)? {
                if !group.is_member(&payment.user_id) {
                    errors.push(format!(
                        "group {} has a payment for non-member {}",
                        group.id, payment.user_id
                    ));
                }
                let indexed = txn.payment_by_session(&payment.external_session_id)?;
                if indexed.as_ref() != Some(&payment) {
                    errors.push(format!(
                        "session {} does not resolve to its payment",
                        payment.external_session_id
                    ));
                }
            }
        }
        Ok(errors)
    });
    match index_errors {
        Ok(errors) => report.errors.extend(errors),
        Err(e) => report.errors.push(format!("index check failed: {e}")),
    }

    Ok(report)
}

/// Check that an existing data directory looks like an LMDB environment.
///
/// A nonexistent directory is a fresh start and passes.
pub fn check_data_dir(path: &Path) -> Result<(), String> {
    if !path.exists() {
        return Ok(());
    }
    if path.read_dir().map(|mut d| d.next().is_none()).unwrap_or(false) {
        return Ok(());
    }
    let data_file = path.join("data.mdb");
    if !data_file.exists() {
        return Err(format!(
            "data directory {} is not empty but data.mdb is missing",
            path.display()
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_data_dir_fresh_path() {
        let dir = tempfile::tempdir().unwrap();
        assert!(check_data_dir(&dir.path().join("nope")).is_ok());
        assert!(check_data_dir(dir.path()).is_ok());
    }

    #[test]
    fn check_data_dir_foreign_contents() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"hi").unwrap();
        assert!(check_data_dir(dir.path()).is_err());
    }

    #[test]
    fn fresh_environment_is_healthy() {
        let dir = tempfile::tempdir().unwrap();
        let env = LmdbEnvironment::open(dir.path(), 1 << 24).unwrap();
        let report = check_integrity(&env).unwrap();
        assert!(report.is_healthy(), "{:?}", report.errors);
        assert_eq!(report.databases_checked, DATABASE_NAMES.len() as u32);
        // schema version only
        assert_eq!(report.total_entries, 1);
    }
}
