//! Error types for the ChainLocks subsystem
//!
//! Every rejection path degrades to "this candidate is not adopted"; nothing
//! here is fatal to the node.

use crate::config::ChainLockConfig;
use thiserror::Error;

/// ChainLocks subsystem errors
#[derive(Debug, Error)]
pub enum ChainLockError {
    /// Payload could not be decoded as a CLSIG
    #[error("Malformed CLSIG payload: {reason}")]
    Decode { reason: String },

    /// A local CLSIG could not be serialized
    #[error("Cannot encode CLSIG: {reason}")]
    Encode { reason: String },

    /// Signer bitmap length differs from the signing active quorum count
    #[error("Signer bitmap has {actual} entries, expected {expected}")]
    WrongSignerCount { expected: usize, actual: usize },

    /// A share names more than one signing quorum
    #[error("Too many signers for a single-quorum share: {count}")]
    TooManySigners { count: usize },

    /// An aggregate names fewer quorums than the majority threshold
    #[error("Not enough signers for an aggregate: have {have}, need {need}")]
    NotEnoughSigners { have: usize, need: usize },

    /// Known block sits at a different height than the CLSIG claims
    #[error("CLSIG height {clsig_height} does not match block height {block_height}")]
    HeightMismatch { clsig_height: i32, block_height: i32 },

    /// CLSIG height is beyond the look-ahead window
    #[error("CLSIG height {height} too far ahead of tip {tip_height}")]
    FutureHeight { height: i32, tip_height: i32 },

    /// No scanned quorum produced a valid share signature
    #[error("Share signature does not verify against any scanned quorum")]
    InvalidShareSignature,

    /// Aggregate signature failed batch verification
    #[error("Aggregated signature failed verification")]
    InvalidAggregateSignature,

    /// Signer bit set for a position the quorum scan did not fill
    #[error("Signer index {index} has no scanned quorum ({scanned} scanned)")]
    MissingQuorum { index: usize, scanned: usize },

    /// Block index has no active tip to scan quorums from
    #[error("No active chain tip")]
    NoChainTip,

    /// State the verifier guarantees cannot happen was observed
    #[error("Internal invariant violated: {reason}")]
    InvariantViolation { reason: String },


    /// Service task has stopped
    #[error("ChainLocks service is not running")]
    ServiceStopped,

    /// Configuration rejected by `ChainLockConfig::validate`
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl ChainLockError {
    /// Misbehaviour score to charge the sending peer, if any.
    pub fn penalty(&self, config: &ChainLockConfig) -> Option<u32> {
        match self {
            ChainLockError::Decode { .. }
            | ChainLockError::WrongSignerCount { .. }
            | ChainLockError::TooManySigners { .. }
            | ChainLockError::NotEnoughSigners { .. }
            | ChainLockError::HeightMismatch { .. }
            | ChainLockError::InvalidShareSignature
            | ChainLockError::InvalidAggregateSignature
            | ChainLockError::MissingQuorum { .. } => Some(config.misbehavior_score),
            ChainLockError::FutureHeight { .. } if config.penalize_future_heights => {
                Some(config.misbehavior_score)
            }
            _ => None,
        }
    }

    /// Short label for rejection metrics.
    pub fn metric_label(&self) -> &'static str {
        match self {
            ChainLockError::Decode { .. } => "decode",
            ChainLockError::Encode { .. } => "encode",
            ChainLockError::WrongSignerCount { .. } => "signer_count",
            ChainLockError::TooManySigners { .. } => "too_many_signers",
            ChainLockError::NotEnoughSigners { .. } => "not_enough_signers",
            ChainLockError::HeightMismatch { .. } => "height_mismatch",
            ChainLockError::FutureHeight { .. } => "future_height",
            ChainLockError::InvalidShareSignature => "invalid_share",
            ChainLockError::InvalidAggregateSignature => "invalid_aggregate",
            ChainLockError::MissingQuorum { .. } => "missing_quorum",
            ChainLockError::NoChainTip => "no_tip",
            ChainLockError::InvariantViolation { .. } => "invariant",
            ChainLockError::ServiceStopped => "stopped",
            ChainLockError::InvalidConfig { .. } => "config",
        }
    }
}

/// Result type for chain-lock operations
pub type ChainLockResult<T> = Result<T, ChainLockError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_input_is_penalized() {
        let config = ChainLockConfig::default();
        let err = ChainLockError::TooManySigners { count: 2 };
        assert_eq!(err.penalty(&config), Some(config.misbehavior_score));
        assert_eq!(
            ChainLockError::InvalidAggregateSignature.penalty(&config),
            Some(10)
        );
    }

    #[test]
    fn test_future_height_penalty_follows_config() {
        let mut config = ChainLockConfig::default();
        let err = ChainLockError::FutureHeight {
            height: 150,
            tip_height: 100,
        };
        assert_eq!(err.penalty(&config), Some(10));

        config.penalize_future_heights = false;
        assert_eq!(err.penalty(&config), None);
    }

    #[test]
    fn test_local_failures_not_penalized() {
        let config = ChainLockConfig::default();
        assert_eq!(ChainLockError::NoChainTip.penalty(&config), None);
        assert_eq!(
            ChainLockError::InvariantViolation {
                reason: "two bits".into()
            }
            .penalty(&config),
            None
        );

        let encode = ChainLockError::Encode {
            reason: "bitmap too long".into(),
        };
        assert_eq!(encode.penalty(&config), None);
        assert_eq!(encode.metric_label(), "encode");
    }
}
