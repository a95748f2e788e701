//! Cryptographic helpers for the crew matching service.
//!
//! - **HMAC-SHA256** webhook signatures (`t=<unix>,v1=<hex>` headers)
//! - **SHA-256** digests of operator bearer tokens
//! - OS-random tokens for local development and tests

pub mod error;
pub mod signature;
pub mod token;

pub use error::CryptoError;
pub use signature::{
    signature_header, sign_payload, verify_webhook_signature, SignatureHeader, SIGNATURE_SCHEME,
};
pub use token::{constant_time_eq, random_token_hex, sha256_hex};
