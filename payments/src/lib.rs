//! Payment gateway boundary.
//!
//! Outbound: open checkout sessions and request refunds through a
//! [`PaymentGateway`]. Inbound: verify signed webhook deliveries and turn
//! each relevant event into exactly one ledger write on the lifecycle
//! engine.

pub mod checkout;
pub mod error;
pub mod event;
pub mod gateway;
pub mod refunds;
pub mod stripe;
pub mod webhook;

pub use checkout::{CheckoutService, CheckoutUrls};
pub use error::{CheckoutError, GatewayError, ReconcileError};
pub use event::{Binding, GatewayEvent};
pub use gateway::{
    CheckoutRequest, CheckoutSession, ConfiguredGateway, NullGateway, PaymentGateway,
    RefundReceipt,
};
pub use refunds::{dispatch_refunds, RefundSummary};
pub use stripe::StripeGateway;
pub use webhook::{WebhookAck, WebhookReconciler};
