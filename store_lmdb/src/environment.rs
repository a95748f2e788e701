//! LMDB environment setup and the [`CrewStore`] implementation.

use std::path::{Path, PathBuf};

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};

use crew_store::{CrewStore, ReadTxn, StoreError, WriteTxn};

use crate::migration::Migrator;
use crate::txn::{LmdbReadTxn, LmdbWriteTxn};
use crate::LmdbError;

/// Default map size: 1 GiB. LMDB reserves address space, not disk.
pub const DEFAULT_MAP_SIZE: usize = 1 << 30;

const MAX_DBS: u32 = 16;

/// Names of every database the service expects in its environment.
pub const DATABASE_NAMES: &[&str] = &[
    "queue",
    "groups",
    "user_groups",
    "payments",
    "sessions",
    "rsvps",
    "feedback",
    "meta",
];

#[derive(Clone, Copy)]
pub(crate) struct Databases {
    pub(crate) queue: Database<Bytes, Bytes>,
    pub(crate) groups: Database<Bytes, Bytes>,
    pub(crate) user_groups: Database<Bytes, Bytes>,
    pub(crate) payments: Database<Bytes, Bytes>,
    pub(crate) sessions: Database<Bytes, Bytes>,
    pub(crate) rsvps: Database<Bytes, Bytes>,
    pub(crate) feedback: Database<Bytes, Bytes>,
    pub(crate) meta: Database<Bytes, Bytes>,
}

/// Wraps the LMDB environment and all database handles.
pub struct LmdbEnvironment {
    env: Env,
    dbs: Databases,
    path: PathBuf,
}

impl LmdbEnvironment {
    /// Open or create an environment at `path` and bring its schema up to date.
    pub fn open(path: &Path, map_size: usize) -> Result<Self, LmdbError> {
        std::fs::create_dir_all(path)?;

        // SAFETY: the environment is opened once per process for this path and
        // the data file is not modified by anything outside LMDB.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(MAX_DBS)
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let dbs = Databases {
            queue: env.create_database(&mut wtxn, Some("queue"))?,
            groups: env.create_database(&mut wtxn, Some("groups"))?,
            user_groups: env.create_database(&mut wtxn, Some("user_groups"))?,
            payments: env.create_database(&mut wtxn, Some("payments"))?,
            sessions: env.create_database(&mut wtxn, Some("sessions"))?,
            rsvps: env.create_database(&mut wtxn, Some("rsvps"))?,
            feedback: env.create_database(&mut wtxn, Some("feedback"))?,
            meta: env.create_database(&mut wtxn, Some("meta"))?,
        };
        wtxn.commit()?;

        let environment = Self {
            env,
            dbs,
            path: path.to_path_buf(),
        };
        Migrator::run(&environment)?;

        tracing::info!(path = %path.display(), map_size, "opened LMDB environment");
        Ok(environment)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn env(&self) -> &Env {
        &self.env
    }

    pub(crate) fn dbs(&self) -> &Databases {
        &self.dbs
    }
}

fn store_error<E: From<StoreError>>(e: heed::Error) -> E {
    E::from(StoreError::from(LmdbError::from(e)))
}

impl CrewStore for LmdbEnvironment {
    fn read<R, E>(&self, f: impl FnOnce(&dyn ReadTxn) -> Result<R, E>) -> Result<R, E>
    where
        E: From<StoreError>,
    {
        let rtxn = self.env.read_txn().map_err(store_error)?;
        let txn = LmdbReadTxn::new(rtxn, &self.dbs);
        f(&txn)
    }

    fn write<R, E>(&self, f: impl FnOnce(&mut dyn WriteTxn) -> Result<R, E>) -> Result<R, E>
    where
        E: From<StoreError>,
    {
        let wtxn = self.env.write_txn().map_err(store_error)?;
        let mut txn = LmdbWriteTxn::new(wtxn, &self.dbs);
        // Dropping an uncommitted RwTxn aborts it.
        let out = f(&mut txn)?;
        txn.commit().map_err(store_error)?;
        Ok(out)
    }
}
