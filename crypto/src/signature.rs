//! Webhook signatures.
//!
//! The gateway signs each delivery with a shared secret:
//! `signature: t=<unix seconds>,v1=<hex(hmac_sha256(secret, "<t>.<payload>"))>`.
//! Several `v1` entries may be present while a secret is being rolled; any
//! one of them matching is enough. Unknown schemes are ignored.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::CryptoError;

type HmacSha256 = Hmac<Sha256>;

/// The only signature scheme we verify.
pub const SIGNATURE_SCHEME: &str = "v1";

/// A parsed signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: u64,
    pub signatures: Vec<Vec<u8>>,
}

impl SignatureHeader {
    pub fn parse(header: &str) -> Result<Self, CryptoError> {
        let mut timestamp = None;
        let mut signatures = Vec::new();

        for part in header.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| CryptoError::MalformedHeader(format!("missing '=' in {part:?}")))?;
            match key {
                "t" => {
                    let parsed = value.parse::<u64>().map_err(|e| {
                        CryptoError::MalformedHeader(format!("bad timestamp {value:?}: {e}"))
                    })?;
                    timestamp = Some(parsed);
                }
                SIGNATURE_SCHEME => {
                    let bytes = hex::decode(value).map_err(|e| {
                        CryptoError::MalformedHeader(format!("bad v1 signature: {e}"))
                    })?;
                    signatures.push(bytes);
                }
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(CryptoError::MissingTimestamp)?;
        if signatures.is_empty() {
            return Err(CryptoError::MissingSignature);
        }
        Ok(Self {
            timestamp,
            signatures,
        })
    }
}

fn keyed_mac(secret: &[u8], timestamp: u64, payload: &[u8]) -> Result<HmacSha256, CryptoError> {
    let mut mac =
        HmacSha256::new_from_slice(secret).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Hex HMAC-SHA256 of `"<timestamp>.<payload>"`.
pub fn sign_payload(secret: &[u8], timestamp: u64, payload: &[u8]) -> Result<String, CryptoError> {
    let mac = keyed_mac(secret, timestamp, payload)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// A complete header value for `payload` signed at `timestamp`.
pub fn signature_header(
    secret: &[u8],
    timestamp: u64,
    payload: &[u8],
) -> Result<String, CryptoError> {
    Ok(format!(
        "t={timestamp},{SIGNATURE_SCHEME}={}",
        sign_payload(secret, timestamp, payload)?
    ))
}

/// Verify a webhook delivery.
///
/// Checks the timestamp against `now` first, then compares each `v1`
/// signature in constant time. Returns the signed timestamp on success.
pub fn verify_webhook_signature(
    payload: &[u8],
    header: &str,
    secret: &[u8],
    now: u64,
    tolerance_secs: u64,
) -> Result<u64, CryptoError> {
    let parsed = SignatureHeader::parse(header)?;

    if parsed.timestamp.abs_diff(now) > tolerance_secs {
        return Err(CryptoError::TimestampOutsideTolerance {
            timestamp: parsed.timestamp,
            now,
            tolerance_secs,
        });
    }

    for candidate in &parsed.signatures {
        let mac = keyed_mac(secret, parsed.timestamp, payload)?;
        if mac.verify_slice(candidate).is_ok() {
            return Ok(parsed.timestamp);
        }
    }
    Err(CryptoError::SignatureMismatch)
}
