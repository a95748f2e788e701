//! Stripe-compatible gateway client.
//!
//! Talks form-encoded HTTP to `{api_base}/v1/checkout/sessions` and
//! `{api_base}/v1/refunds` with a bearer secret key.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crew_lifecycle::RefundRequest;

use crate::event::{META_GROUP, META_USER};
use crate::gateway::{CheckoutRequest, CheckoutSession, PaymentGateway, RefundReceipt};
use crate::GatewayError;

pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";

/// API version pinned on every request.
pub const API_VERSION: &str = "2024-06-20";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct StripeGateway {
    http: reqwest::Client,
    api_base: String,
    api_key: Zeroizing<String>,
}

#[derive(Deserialize)]
struct SessionResponse {
    id: String,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Deserialize)]
struct RefundResponse {
    id: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

impl StripeGateway {
    pub fn new(api_base: impl Into<String>, api_key: Zeroizing<String>) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::Unreachable(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    async fn post_form<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        form: &[(String, String)],
        idempotency_key: Option<&str>,
    ) -> Result<T, GatewayError> {
        let url = format!("{}{path}", self.api_base);
        let mut builder = self
            .http
            .post(&url)
            .bearer_auth(self.api_key.as_str())
            .header("Stripe-Version", API_VERSION)
            .form(form);
        if let Some(key) = idempotency_key {
            builder = builder.header("Idempotency-Key", key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Unreachable(format!("request timed out: {e}"))
            } else if e.is_connect() {
                GatewayError::Unreachable(format!("connection failed: {e}"))
            } else {
                GatewayError::Unreachable(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                .ok()
                .and_then(|env| env.error.message)
                .unwrap_or_else(|| format!("HTTP status {status}"));
            warn!(path, status = status.as_u16(), %message, "gateway rejected request");
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| GatewayError::InvalidResponse(format!("{path}: {e}")))
    }
}

/// Form fields for a checkout session.
///
/// Metadata goes on the session (for `checkout.session.*` events) and on
/// the payment intent (copied onto charges, for `charge.refunded`).
/// `{group_id}` in the return URLs is substituted.
pub(crate) fn checkout_form(request: &CheckoutRequest) -> Vec<(String, String)> {
    let group = request.group_id.to_string();
    let fill = |url: &str| url.replace("{group_id}", &group);
    let mut form = vec![
        ("mode".to_string(), "payment".to_string()),
        ("success_url".to_string(), fill(&request.success_url)),
        ("cancel_url".to_string(), fill(&request.cancel_url)),
        ("client_reference_id".to_string(), format!("{group}:{}", request.user_id)),
        ("line_items[0][quantity]".to_string(), "1".to_string()),
        (
            "line_items[0][price_data][currency]".to_string(),
            request.currency.clone(),
        ),
        (
            "line_items[0][price_data][unit_amount]".to_string(),
            request.amount_cents.to_string(),
        ),
        (
            "line_items[0][price_data][product_data][name]".to_string(),
            request.description.clone(),
        ),
    ];
    for prefix in ["metadata", "payment_intent_data[metadata]"] {
        form.push((format!("{prefix}[{META_GROUP}]"), group.clone()));
        form.push((format!("{prefix}[{META_USER}]"), request.user_id.to_string()));
    }
    form
}

pub(crate) fn refund_form(request: &RefundRequest, payment_ref: &str) -> Vec<(String, String)> {
    vec![
        ("payment_intent".to_string(), payment_ref.to_string()),
        ("amount".to_string(), request.amount_cents.to_string()),
        (
            format!("metadata[{META_GROUP}]"),
            request.group_id.to_string(),
        ),
        (format!("metadata[{META_USER}]"), request.user_id.to_string()),
    ]
}

impl PaymentGateway for StripeGateway {
    fn name(&self) -> &'static str {
        "stripe"
    }

    async fn create_checkout(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let form = checkout_form(request);
        let session: SessionResponse = self.post_form("/v1/checkout/sessions", &form, None).await?;
        debug!(group_id = %request.group_id, user_id = %request.user_id, session_id = %session.id, "checkout session opened");
        Ok(CheckoutSession {
            session_id: session.id,
            url: session.url,
        })
    }

    async fn refund(&self, request: &RefundRequest) -> Result<RefundReceipt, GatewayError> {
        let payment_ref =
            request
                .payment_ref
                .as_deref()
                .ok_or_else(|| GatewayError::MissingPaymentRef {
                    group: request.group_id.to_string(),
                    user: request.user_id.to_string(),
                })?;
        let form = refund_form(request, payment_ref);
        // One refund per session, however often the request is retried.
        let key = format!("refund-{}", request.external_session_id);
        let refund: RefundResponse = self.post_form("/v1/refunds", &form, Some(&key)).await?;
        Ok(RefundReceipt {
            refund_id: refund.id,
            status: refund.status.unwrap_or_else(|| "pending".to_string()),
        })
    }
}
