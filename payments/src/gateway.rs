//! The outbound gateway seam.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crew_lifecycle::RefundRequest;
use crew_types::{GroupId, UserId};

use crate::stripe::StripeGateway;
use crate::GatewayError;

/// Everything the gateway needs to open one checkout session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CheckoutRequest {
    pub group_id: GroupId,
    pub user_id: UserId,
    pub amount_cents: u64,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
    /// Shown on the payment page. Must not name the venue.
    pub description: String,
}

/// An opened checkout.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub session_id: String,
    /// Hosted payment page, when the gateway provides one.
    pub url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundReceipt {
    pub refund_id: String,
    pub status: String,
}

/// A payment provider.
///
/// Implementations must carry `{groupId, userId}` metadata on everything
/// they create so that the provider's notifications can be bound back to
/// the ledger pair.
pub trait PaymentGateway: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> impl Future<Output = Result<CheckoutSession, GatewayError>> + Send;

    fn refund(
        &self,
        request: &RefundRequest,
    ) -> impl Future<Output = Result<RefundReceipt, GatewayError>> + Send;
}

// ── Null gateway ────────────────────────────────────────────────────────

#[derive(Default)]
struct NullLog {
    checkouts: Vec<CheckoutRequest>,
    refunds: Vec<RefundRequest>,
    fail_next: Option<String>,
}

/// In-process gateway for tests and local development.
///
/// Records every call, hands out sequential `cs_null_<n>` session ids and
/// can be told to fail the next call.
#[derive(Default)]
pub struct NullGateway {
    log: Mutex<NullLog>,
}

impl NullGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call fail with [`GatewayError::Injected`].
    pub fn fail_next(&self, reason: impl Into<String>) {
        self.lock().fail_next = Some(reason.into());
    }

    pub fn checkouts(&self) -> Vec<CheckoutRequest> {
        self.lock().checkouts.clone()
    }

    pub fn refunds(&self) -> Vec<RefundRequest> {
        self.lock().refunds.clone()
    }

    fn lock(&self) -> MutexGuard<'_, NullLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PaymentGateway for NullGateway {
    fn name(&self) -> &'static str {
        "null"
    }

    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let mut log = self.lock();
        if let Some(reason) = log.fail_next.take() {
            return Err(GatewayError::Injected(reason));
        }
        log.checkouts.push(request.clone());
        Ok(CheckoutSession {
            session_id: format!("cs_null_{}", log.checkouts.len()),
            url: None,
        })
    }

    async fn refund(&self, request: &RefundRequest) -> Result<RefundReceipt, GatewayError> {
        let mut log = self.lock();
        if let Some(reason) = log.fail_next.take() {
            return Err(GatewayError::Injected(reason));
        }
        log.refunds.push(request.clone());
        Ok(RefundReceipt {
            refund_id: format!("re_null_{}", log.refunds.len()),
            status: "pending".to_string(),
        })
    }
}

// ── Runtime selection ───────────────────────────────────────────────────

/// The gateway chosen by configuration.
pub enum ConfiguredGateway {
    Stripe(StripeGateway),
    Null(NullGateway),
}

impl PaymentGateway for ConfiguredGateway {
    fn name(&self) -> &'static str {
        match self {
            Self::Stripe(g) => g.name(),
            Self::Null(g) => g.name(),
        }
    }

    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        match self {
            Self::Stripe(g) => g.create_checkout(request).await,
            Self::Null(g) => g.create_checkout(request).await,
        }
    }

    async fn refund(&self, request: &RefundRequest) -> Result<RefundReceipt, GatewayError> {
        match self {
            Self::Stripe(g) => g.refund(request).await,
            Self::Null(g) => g.refund(request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CheckoutRequest {
        CheckoutRequest {
            group_id: GroupId::new(1),
            user_id: UserId::parse("ann").unwrap(),
            amount_cents: 800,
            currency: "usd".to_string(),
            success_url: "https://crew.test/ok".to_string(),
            cancel_url: "https://crew.test/cancel".to_string(),
            description: "Crew deposit".to_string(),
        }
    }

    #[tokio::test]
    async fn null_gateway_numbers_sessions() {
        let gateway = NullGateway::new();
        let a = gateway.create_checkout(&request()).await.unwrap();
        let b = gateway.create_checkout(&request()).await.unwrap();
        assert_eq!(a.session_id, "cs_null_1");
        assert_eq!(b.session_id, "cs_null_2");
        assert_eq!(gateway.checkouts().len(), 2);
    }

    #[tokio::test]
    async fn injected_failure_applies_once() {
        let gateway = ConfiguredGateway::Null(NullGateway::new());
        if let ConfiguredGateway::Null(inner) = &gateway {
            inner.fail_next("down");
        }
        assert!(matches!(
            gateway.create_checkout(&request()).await,
            Err(GatewayError::Injected(_))
        ));
        assert!(gateway.create_checkout(&request()).await.is_ok());
        assert_eq!(gateway.name(), "null");
    }
}
