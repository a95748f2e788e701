//! Parse and validation errors for the fundamental types.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypesError {
    #[error("invalid user id: {0}")]
    InvalidUserId(String),

    #[error("invalid group id: {0}")]
    InvalidGroupId(String),

    #[error("unknown group status: {0}")]
    UnknownStatus(String),

    #[error("unknown payment status: {0}")]
    UnknownPaymentStatus(String),

    #[error("unknown rsvp answer: {0}")]
    UnknownAnswer(String),

    #[error("invalid coverage policy: {0}")]
    InvalidPolicy(String),
}
