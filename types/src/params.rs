//! Lifecycle parameters: group sizing, deposit, timeouts, and the payment
//! coverage policy that gates the venue reveal.

use crate::TypesError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// When a `pending_payment` group may move to `location_revealed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoveragePolicy {
    /// The operator decides; the engine does not look at the ledger.
    Operator,
    /// Every member must hold a `paid` row.
    Full,
    /// At least this many members must hold a `paid` row.
    Minimum(u32),
}

impl CoveragePolicy {
    /// Number of paid members required for a group of `member_count`.
    /// `None` means no requirement.
    pub fn required(&self, member_count: usize) -> Option<usize> {
        match self {
            Self::Operator => None,
            Self::Full => Some(member_count),
            Self::Minimum(n) => Some((*n as usize).min(member_count)),
        }
    }

    pub fn is_satisfied(&self, paid: usize, member_count: usize) -> bool {
        self.required(member_count)
            .map_or(true, |required| paid >= required)
    }
}

impl Default for CoveragePolicy {
    fn default() -> Self {
        Self::Full
    }
}

impl fmt::Display for CoveragePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operator => f.write_str("operator"),
            Self::Full => f.write_str("full"),
            Self::Minimum(n) => write!(f, "minimum:{n}"),
        }
    }
}

/// Parses `operator`, `full` or `minimum:<n>`.
impl FromStr for CoveragePolicy {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "operator" => Ok(Self::Operator),
            "full" => Ok(Self::Full),
            other => other
                .strip_prefix("minimum:")
                .and_then(|n| n.parse::<u32>().ok())
                .filter(|n| *n > 0)
                .map(Self::Minimum)
                .ok_or_else(|| TypesError::InvalidPolicy(other.to_string())),
        }
    }
}

/// Tunable lifecycle values.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleParams {
    /// Smallest allowed group.
    pub min_group_size: usize,
    /// Largest allowed group.
    pub max_group_size: usize,
    /// Refundable deposit per member, in the smallest currency unit.
    pub deposit_cents: u64,
    /// ISO currency code for the deposit.
    pub currency: String,
    /// How long a group may sit in `pending_payment` before the sweep cancels it.
    pub payment_window_secs: u64,
    /// How long after `event_datetime` the sweep marks a revealed group completed.
    pub completion_grace_secs: u64,
    /// Coverage required for the venue reveal.
    pub coverage: CoveragePolicy,
    /// Let the sweep reveal the venue once coverage is met.
    pub auto_reveal: bool,
    /// Maximum feedback comment length, in characters.
    pub comment_max_chars: usize,
}

impl Default for LifecycleParams {
    fn default() -> Self {
        Self {
            min_group_size: 2,
            max_group_size: 5,
            deposit_cents: 800,
            currency: "usd".to_string(),
            payment_window_secs: 72 * 3600,
            completion_grace_secs: 6 * 3600,
            coverage: CoveragePolicy::Full,
            auto_reveal: false,
            comment_max_chars: 140,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_parse() {
        assert_eq!("operator".parse::<CoveragePolicy>().unwrap(), CoveragePolicy::Operator);
        assert_eq!("full".parse::<CoveragePolicy>().unwrap(), CoveragePolicy::Full);
        assert_eq!(
            "minimum:3".parse::<CoveragePolicy>().unwrap(),
            CoveragePolicy::Minimum(3)
        );
        assert!("minimum:0".parse::<CoveragePolicy>().is_err());
        assert!("most".parse::<CoveragePolicy>().is_err());
    }

    #[test]
    fn minimum_is_capped_by_group_size() {
        let policy = CoveragePolicy::Minimum(4);
        assert_eq!(policy.required(3), Some(3));
        assert!(policy.is_satisfied(3, 3));
        assert!(!policy.is_satisfied(2, 3));
    }

    #[test]
    fn operator_policy_never_blocks() {
        assert!(CoveragePolicy::Operator.is_satisfied(0, 5));
    }

    #[test]
    fn defaults_match_reference_values() {
        let params = LifecycleParams::default();
        assert_eq!(params.min_group_size, 2);
        assert_eq!(params.max_group_size, 5);
        assert_eq!(params.deposit_cents, 800);
        assert_eq!(params.comment_max_chars, 140);
        assert_eq!(params.coverage, CoveragePolicy::Full);
    }
}
