//! LMDB storage backend for the crew matching service.
//!
//! Implements [`crew_store::CrewStore`] with the `heed` LMDB bindings. Every
//! record type lives in its own named database inside a single environment,
//! so one LMDB write transaction covers a whole engine operation.

pub mod environment;
pub mod error;
pub mod integrity;
mod keys;
pub mod meta;
pub mod migration;
mod txn;

pub use environment::LmdbEnvironment;
pub use error::LmdbError;
pub use integrity::{check_data_dir, check_integrity, IntegrityReport};
pub use migration::{Migrator, CURRENT_SCHEMA_VERSION};
