use crew_crypto::CryptoError;
use crew_lifecycle::LifecycleError;
use thiserror::Error;

/// Failures talking to the payment gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway unreachable: {0}")]
    Unreachable(String),

    #[error("gateway rejected the request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid gateway response: {0}")]
    InvalidResponse(String),

    #[error("refund for user {user} in group {group} has no payment reference")]
    MissingPaymentRef { group: String, user: String },

    #[error("gateway failure injected: {0}")]
    Injected(String),
}

/// Why a webhook delivery was not applied.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("signature rejected: {0}")]
    Signature(#[from] CryptoError),

    #[error("malformed event: {0}")]
    Malformed(String),

    /// Well-formed and signed, but it names a group or pair we do not know.
    #[error("event does not match the ledger: {0}")]
    Unmatched(LifecycleError),

    #[error("store failure: {0}")]
    Store(LifecycleError),
}

impl ReconcileError {
    /// Store failures are the only ones a redelivery can fix by itself.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Signature(_) => "signature",
            Self::Malformed(_) => "malformed",
            Self::Unmatched(_) => "unmatched",
            Self::Store(_) => "store",
        }
    }
}

impl From<LifecycleError> for ReconcileError {
    fn from(e: LifecycleError) -> Self {
        match e {
            LifecycleError::Store(_) => Self::Store(e),
            LifecycleError::Validation(msg) => Self::Malformed(msg),
            other => Self::Unmatched(other),
        }
    }
}

/// Why a checkout could not be opened.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}
