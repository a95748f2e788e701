//! Fundamental types for crew matching.
//!
//! This crate defines the core types shared across every other crate in the workspace:
//! user and group identifiers, timestamps and clocks, the group status DAG,
//! ledger value enums, and lifecycle parameters.

pub mod error;
pub mod ids;
pub mod params;
pub mod state;
pub mod time;

pub use error::TypesError;
pub use ids::{GroupId, UserId};
pub use params::{CoveragePolicy, LifecycleParams};
pub use state::{GroupStatus, PaymentStatus, RsvpAnswer};
pub use time::{Clock, SystemClock, Timestamp};
