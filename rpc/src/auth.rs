//! Caller identity.
//!
//! Members are identified by the `x-user-id` header, which the identity
//! provider's proxy sets after authenticating the session. Operators
//! present `Authorization: Bearer <token>`.

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use tracing::warn;

use crew_lifecycle::{Operator, OperatorAuthority};
use crew_types::UserId;

use crate::ApiError;

pub const USER_HEADER: &str = "x-user-id";

/// The authenticated member making the request.
pub fn member(headers: &HeaderMap) -> Result<UserId, ApiError> {
    let raw = headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(ApiError::Unauthenticated)?;
    UserId::parse(raw).map_err(|_| ApiError::Unauthenticated)
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// An operator capability minted from the bearer token.
pub fn operator(authority: &OperatorAuthority, headers: &HeaderMap) -> Result<Operator, ApiError> {
    let token = bearer(headers).ok_or(ApiError::Unauthenticated)?;
    authority.authorize(token).map_err(|_| {
        warn!("operator token rejected");
        ApiError::Forbidden
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn member_header_is_required_and_validated() {
        let mut headers = HeaderMap::new();
        assert!(matches!(member(&headers), Err(ApiError::Unauthenticated)));

        headers.insert(USER_HEADER, HeaderValue::from_static("  "));
        assert!(matches!(member(&headers), Err(ApiError::Unauthenticated)));

        headers.insert(USER_HEADER, HeaderValue::from_static("user_2abc"));
        assert_eq!(member(&headers).unwrap().as_str(), "user_2abc");
    }

    #[test]
    fn operator_needs_a_known_bearer_token() {
        let authority = OperatorAuthority::from_tokens(["s3cret"]);
        let mut headers = HeaderMap::new();
        assert!(matches!(
            operator(&authority, &headers),
            Err(ApiError::Unauthenticated)
        ));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer nope"));
        assert!(matches!(operator(&authority, &headers), Err(ApiError::Forbidden)));

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer s3cret"));
        assert!(operator(&authority, &headers).is_ok());
    }
}
