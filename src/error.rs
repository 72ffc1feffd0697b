//! Validation errors for portfolio snapshots.

use rust_decimal::Decimal;

/// Reasons a snapshot cannot be rebalanced as given.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("group name must not be empty")]
    EmptyGroupName,

    #[error("duplicate group: {0}")]
    DuplicateGroup(String),

    #[error("target for group {group} ({target_pct}%) must be within 0..=100")]
    TargetOutOfRange { group: String, target_pct: Decimal },

    #[error("group targets sum to {0}% (> 100%)")]
    TargetSumExceeded(Decimal),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn display() {
        assert_eq!(
            format!("{}", ValidationError::TargetSumExceeded(dec!(120))),
            "group targets sum to 120% (> 100%)"
        );
        assert_eq!(
            format!("{}", ValidationError::DuplicateGroup("bonds".into())),
            "duplicate group: bonds"
        );
    }

    #[test]
    fn is_error() {
        let err: Box<dyn std::error::Error> = Box::new(ValidationError::EmptyGroupName);
        assert!(err.to_string().contains("empty"));
    }
}
