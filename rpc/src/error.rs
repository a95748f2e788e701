//! API errors and their HTTP mapping.
//!
//! Every error body is `{"error": "<message>"}`. Store and other internal
//! failures are logged and answered with an opaque message. Rejected webhook
//! deliveries get a fixed message per kind; the detail stays in the log.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crew_lifecycle::LifecycleError;
use crew_payments::{CheckoutError, GatewayError, ReconcileError};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication required")]
    Unauthenticated,

    #[error("operator authorization failed")]
    Forbidden,

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Webhook(#[from] ReconcileError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<CheckoutError> for ApiError {
    fn from(e: CheckoutError) -> Self {
        match e {
            CheckoutError::Lifecycle(e) => Self::Lifecycle(e),
            CheckoutError::Gateway(e) => Self::Gateway(e),
        }
    }
}

fn lifecycle_status(e: &LifecycleError) -> StatusCode {
    match e {
        LifecycleError::InvalidMembership(_)
        | LifecycleError::AlreadyPaid { .. }
        | LifecycleError::InvalidFeedback(_)
        | LifecycleError::Validation(_) => StatusCode::BAD_REQUEST,
        LifecycleError::IllegalTransition { .. }
        | LifecycleError::AlreadyQueued(_)
        | LifecycleError::NotPayable { .. }
        | LifecycleError::CoverageNotMet { .. }
        | LifecycleError::LedgerNotOpen { .. }
        | LifecycleError::LedgerClosed { .. } => StatusCode::CONFLICT,
        LifecycleError::NotAMember { .. } | LifecycleError::NotFound(_) => StatusCode::NOT_FOUND,
        LifecycleError::OperatorDenied => StatusCode::FORBIDDEN,
        LifecycleError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Lifecycle(e) => lifecycle_status(e),
            Self::Gateway(_) => StatusCode::BAD_GATEWAY,
            // The gateway redelivers on anything but 2xx; only store
            // failures should make it do so.
            Self::Webhook(e) if e.is_retryable() => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Webhook(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status.is_server_error() {
            error!(error = %self, "request failed");
            "internal error".to_string()
        } else if let Self::Gateway(_) = self {
            "payment gateway unavailable".to_string()
        } else if let Self::Webhook(e) = &self {
            warn!(error = %e, kind = e.kind(), "webhook delivery rejected");
            webhook_message(e).to_string()
        } else {
            self.to_string()
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

fn webhook_message(e: &ReconcileError) -> &'static str {
    match e {
        ReconcileError::Signature(_) => "invalid signature",
        ReconcileError::Malformed(_) => "malformed event",
        ReconcileError::Unmatched(_) => "event does not match the ledger",
        ReconcileError::Store(_) => "internal error",
    }
}
