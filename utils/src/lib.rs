//! Shared utilities for the crew matching service.

pub mod cache;
pub mod logging;

pub use cache::TtlCache;
pub use logging::{init_logging, LogFormat, LoggingError};
