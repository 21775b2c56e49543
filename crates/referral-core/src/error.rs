use thiserror::Error;

use crate::registry::{AccountId, Amount};

/// Rejected rate configuration. Construction never completes when one of
/// these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("decimals must be greater than zero")]
    ZeroDecimals,

    #[error("referral level should be at least one")]
    MissLevelRate,

    #[error("exceeded max referral level depth ({actual} > {max})")]
    ExceedMaxLevelDepth { actual: usize, max: usize },

    #[error("total level rate {total} exceeds 100% ({decimals})")]
    TotalLevelRateOverflow { total: u64, decimals: u64 },

    #[error("referral bonus {rate} exceeds 100% ({decimals})")]
    ReferralRateOverflow { rate: u64, decimals: u64 },

    #[error("exceeded max referee bonus level depth ({actual} > {max})")]
    ExceedMaxRefereeLevelDepth { actual: usize, max: usize },

    #[error("referee bonus rate {rate} for {threshold} referees exceeds 100% ({decimals})")]
    RefereeRateOverflow {
        threshold: u32,
        rate: u64,
        decimals: u64,
    },

    #[error("referee bonus thresholds must be strictly ascending (at {threshold})")]
    UnorderedRefereeTiers { threshold: u32 },
}

/// Reason a referrer registration was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphViolation {
    #[error("referee cannot be the null account")]
    NullReferee,

    #[error("referrer cannot be the null account")]
    NullReferrer,

    #[error("account cannot refer itself")]
    SelfReferral,

    #[error("referee cannot be one of referrer uplines")]
    CircularReference,

    #[error("address have been registered upline")]
    DoubleRegisterReferrer,
}

impl GraphViolation {
    /// Stable reason code reported to callers and indexers.
    pub fn code(&self) -> &'static str {
        match self {
            GraphViolation::NullReferee => "InvalidReferee",
            GraphViolation::NullReferrer
            | GraphViolation::SelfReferral
            | GraphViolation::CircularReference => "InvalidReferrer",
            GraphViolation::DoubleRegisterReferrer => "DoubleRegisterReferrer",
        }
    }
}

/// The funds-transfer collaborator could not move a payout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transfer of {amount} to {recipient} failed: {reason}")]
pub struct TransferError {
    pub recipient: AccountId,
    pub amount: Amount,
    pub reason: String,
}

impl TransferError {
    pub fn new(recipient: &AccountId, amount: Amount, reason: impl Into<String>) -> Self {
        Self {
            recipient: recipient.clone(),
            amount,
            reason: reason.into(),
        }
    }
}

/// Canonical error type returned by the program operations.
#[derive(Debug, Error)]
pub enum ReferralError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("registration rejected: {0}")]
    Registration(#[from] GraphViolation),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("account identity cannot be null")]
    NullAccount,

    #[error("snapshot state root mismatch (expected {expected}, computed {computed})")]
    SnapshotRootMismatch { expected: String, computed: String },

    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn violation_codes_group_invalid_referrers() {
        for violation in [
            GraphViolation::NullReferrer,
            GraphViolation::SelfReferral,
            GraphViolation::CircularReference,
        ] {
            assert_eq!(violation.code(), "InvalidReferrer");
        }
        assert_eq!(GraphViolation::NullReferee.code(), "InvalidReferee");
        assert_eq!(
            GraphViolation::DoubleRegisterReferrer.code(),
            "DoubleRegisterReferrer"
        );
    }

    #[test]
    fn transfer_error_converts_into_referral_error() {
        let err: ReferralError = TransferError::new(&"bob".to_string(), 10, "closed").into();
        assert!(matches!(err, ReferralError::Transfer(ref t) if t.amount == 10));
        assert_eq!(err.to_string(), "transfer of 10 to bob failed: closed");
    }
}
