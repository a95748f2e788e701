//! HTTP API for the crew service.
//!
//! Provides endpoints for:
//! - Queue membership (join, leave, operator listing)
//! - Group creation and status transitions (operator)
//! - Member views of groups, payment state, RSVPs and feedback
//! - Checkout initiation and the signed gateway webhook
//! - Health and Prometheus metrics

pub mod auth;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod pagination;
pub mod server;
pub mod state;

pub use error::ApiError;
pub use metrics::ServiceMetrics;
pub use server::{router, RpcServer};
pub use state::{CacheKey, RpcState};
