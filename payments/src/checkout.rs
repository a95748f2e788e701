//! Checkout initiation.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use crew_lifecycle::LifecycleEngine;
use crew_store::CrewStore;
use crew_types::{GroupId, UserId};

use crate::gateway::{CheckoutRequest, CheckoutSession, PaymentGateway};
use crate::CheckoutError;

/// Product name on the hosted payment page. Never includes the venue.
pub const DEPOSIT_DESCRIPTION: &str = "Crew meetup deposit (refundable)";

/// Where the payment page sends the member afterwards. `{group_id}` is
/// substituted by the gateway client.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct CheckoutUrls {
    pub success_url: String,
    pub cancel_url: String,
}

impl Default for CheckoutUrls {
    fn default() -> Self {
        Self {
            success_url: "http://localhost:3000/groups/{group_id}?paid=1".to_string(),
            cancel_url: "http://localhost:3000/groups/{group_id}".to_string(),
        }
    }
}

pub struct CheckoutService<S, G> {
    engine: Arc<LifecycleEngine<S>>,
    gateway: Arc<G>,
    urls: CheckoutUrls,
}

impl<S: CrewStore, G: PaymentGateway> CheckoutService<S, G> {
    pub fn new(engine: Arc<LifecycleEngine<S>>, gateway: Arc<G>, urls: CheckoutUrls) -> Self {
        Self {
            engine,
            gateway,
            urls,
        }
    }

    pub fn gateway(&self) -> &Arc<G> {
        &self.gateway
    }

    /// Open a checkout for `user_id` in `group_id`.
    ///
    /// Fails with `NotAMember`, `AlreadyPaid` or `NotPayable` before the
    /// gateway is contacted. Nothing is written to the ledger here; the
    /// payment row appears when the gateway's notification is reconciled.
    pub async fn create_checkout(
        &self,
        group_id: GroupId,
        user_id: &UserId,
    ) -> Result<CheckoutSession, CheckoutError> {
        let ticket = self.engine.checkout_precheck(group_id, user_id)?;
        let request = CheckoutRequest {
            group_id: ticket.group_id,
            user_id: ticket.user_id,
            amount_cents: ticket.amount_cents,
            currency: ticket.currency,
            success_url: self.urls.success_url.clone(),
            cancel_url: self.urls.cancel_url.clone(),
            description: DEPOSIT_DESCRIPTION.to_string(),
        };

        match self.gateway.create_checkout(&request).await {
            Ok(session) => {
                info!(
                    group_id = %group_id,
                    user_id = %user_id,
                    session_id = %session.session_id,
                    gateway = self.gateway.name(),
                    "checkout opened"
                );
                Ok(session)
            }
            Err(e) => {
                warn!(group_id = %group_id, user_id = %user_id, error = %e, "checkout failed");
                Err(e.into())
            }
        }
    }
}
