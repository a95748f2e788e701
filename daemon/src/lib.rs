//! Crew daemon: configuration, service wiring, the periodic sweeper and
//! graceful shutdown.

pub mod config;
pub mod service;
pub mod shutdown;
pub mod sweeper;

pub use config::{ConfigError, GatewayKind, Overrides, ServiceConfig};
pub use shutdown::ShutdownController;
pub use sweeper::Sweeper;
