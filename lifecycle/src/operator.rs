//! Operator capability.
//!
//! Operator-only operations take an [`Operator`] value. The only way to get
//! one is [`OperatorAuthority::authorize`], which checks a bearer token
//! against the SHA-256 digests in configuration. Tokens themselves are
//! never stored.

use crew_crypto::{constant_time_eq, sha256_hex};

use crate::LifecycleError;

/// Proof that the caller presented a valid operator token.
#[derive(Debug, Clone)]
pub struct Operator {
    label: String,
}

impl Operator {
    /// Short, non-secret tag for logs (first eight hex digits of the digest).
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Capability for in-process jobs such as the periodic sweep. It never
    /// leaves this crate; the daemon reaches the sweep through
    /// `LifecycleEngine::scheduled_sweep`.
    pub(crate) fn internal(job: &str) -> Self {
        Self {
            label: format!("internal:{job}"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OperatorAuthority {
    digests: Vec<String>,
}

impl OperatorAuthority {
    /// Build from hex SHA-256 digests of the accepted tokens.
    pub fn from_digests<I, D>(digests: I) -> Result<Self, LifecycleError>
    where
        I: IntoIterator<Item = D>,
        D: AsRef<str>,
    {
        let mut out = Vec::new();
        for digest in digests {
            let digest = digest.as_ref().trim().to_ascii_lowercase();
            if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(LifecycleError::Validation(format!(
                    "operator token digest must be 64 hex characters, got {} characters",
                    digest.len()
                )));
            }
            out.push(digest);
        }
        Ok(Self { digests: out })
    }

    /// Build from plaintext tokens (tests and local development).
    pub fn from_tokens<I, T>(tokens: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        Self {
            digests: tokens.into_iter().map(|t| sha256_hex(t.as_ref())).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }

    /// Mint an [`Operator`] if `token` matches a configured digest.
    pub fn authorize(&self, token: &str) -> Result<Operator, LifecycleError> {
        let presented = sha256_hex(token);
        let mut matched = None;
        for digest in &self.digests {
            if constant_time_eq(digest.as_bytes(), presented.as_bytes()) {
                matched = Some(digest);
            }
        }
        match matched {
            Some(digest) => Ok(Operator {
                label: digest[..8].to_string(),
            }),
            None => Err(LifecycleError::OperatorDenied),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_token_is_accepted() {
        let authority = OperatorAuthority::from_tokens(["s3cret"]);
        let op = authority.authorize("s3cret").unwrap();
        assert_eq!(op.label(), &sha256_hex("s3cret")[..8]);
    }

    #[test]
    fn unknown_token_is_denied() {
        let authority = OperatorAuthority::from_tokens(["s3cret"]);
        assert!(matches!(
            authority.authorize("guess"),
            Err(LifecycleError::OperatorDenied)
        ));
    }

    #[test]
    fn empty_authority_denies_everything() {
        let authority = OperatorAuthority::default();
        assert!(authority.is_empty());
        assert!(authority.authorize("").is_err());
    }

    #[test]
    fn internal_operator_is_labelled_by_job() {
        assert_eq!(Operator::internal("sweep").label(), "internal:sweep");
    }

    #[test]
    fn digests_are_validated_and_normalised() {
        let upper = sha256_hex("tok").to_ascii_uppercase();
        let authority = OperatorAuthority::from_digests([upper]).unwrap();
        assert!(authority.authorize("tok").is_ok());
        assert!(OperatorAuthority::from_digests(["abc"]).is_err());
    }
}
