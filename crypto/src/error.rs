use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("malformed signature header: {0}")]
    MalformedHeader(String),

    #[error("signature header carries no timestamp")]
    MissingTimestamp,

    #[error("signature header carries no v1 signature")]
    MissingSignature,

    #[error("signature timestamp {timestamp} is outside the {tolerance_secs}s tolerance (now {now})")]
    TimestampOutsideTolerance {
        timestamp: u64,
        now: u64,
        tolerance_secs: u64,
    },

    #[error("no signature matches the payload")]
    SignatureMismatch,

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("os random source failed: {0}")]
    Random(String),
}
