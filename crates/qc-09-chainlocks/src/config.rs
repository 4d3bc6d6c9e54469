//! ChainLocks configuration
//!
//! Defaults follow the network parameters of the chain-lock quorum type; every
//! field can be overridden through `QC_CLSIG_*` environment variables.

use crate::domain::LlmqType;
use crate::error::{ChainLockError, ChainLockResult};
use std::env;
use std::time::Duration;

/// ChainLocks configuration
#[derive(Clone, Debug)]
pub struct ChainLockConfig {
    /// Quorum type used for chain-lock signing
    pub llmq_type: LlmqType,
    /// Number of quorums expected to co-sign each height (signer bitmap length)
    pub signing_active_quorum_count: usize,
    /// Maximum distance a CLSIG may be ahead of the local tip
    pub sign_height_offset: i32,
    /// Minimum time between cleanup passes
    pub cleanup_interval: Duration,
    /// How long a seen CLSIG hash is remembered
    pub seen_ttl: Duration,
    /// Score reported for protocol-violating CLSIGs
    pub misbehavior_score: u32,
    /// Charge peers for CLSIGs beyond the look-ahead window
    pub penalize_future_heights: bool,
    /// Local node is an eligible quorum member and runs the self-signing loop
    pub masternode_mode: bool,
    /// Capacity of the service command channel
    pub command_channel_capacity: usize,
}

impl Default for ChainLockConfig {
    fn default() -> Self {
        Self {
            llmq_type: LlmqType::CHAIN_LOCKS,
            signing_active_quorum_count: 4,
            sign_height_offset: 8,
            cleanup_interval: Duration::from_secs(30),
            seen_ttl: Duration::from_secs(24 * 60 * 60),
            misbehavior_score: 10,
            penalize_future_heights: true,
            masternode_mode: false,
            command_channel_capacity: 1024,
        }
    }
}

impl ChainLockConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `QC_CLSIG_LLMQ_TYPE`: Quorum type (default: 2)
    /// - `QC_CLSIG_QUORUM_COUNT`: Signing active quorum count (default: 4)
    /// - `QC_CLSIG_HEIGHT_OFFSET`: Look-ahead window in blocks (default: 8)
    /// - `QC_CLSIG_CLEANUP_SECS`: Cleanup interval (default: 30)
    /// - `QC_CLSIG_SEEN_TTL_SECS`: Seen-hash lifetime (default: 86400)
    /// - `QC_CLSIG_MISBEHAVIOR_SCORE`: Penalty score (default: 10)
    /// - `QC_CLSIG_PENALIZE_FUTURE`: Penalize future heights (default: true)
    /// - `QC_MASTERNODE`: Run the self-signing loop (default: false)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            llmq_type: env_parse("QC_CLSIG_LLMQ_TYPE")
                .map(LlmqType)
                .unwrap_or(defaults.llmq_type),
            signing_active_quorum_count: env_parse("QC_CLSIG_QUORUM_COUNT")
                .unwrap_or(defaults.signing_active_quorum_count),
            sign_height_offset: env_parse("QC_CLSIG_HEIGHT_OFFSET")
                .unwrap_or(defaults.sign_height_offset),
            cleanup_interval: env_parse("QC_CLSIG_CLEANUP_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.cleanup_interval),
            seen_ttl: env_parse("QC_CLSIG_SEEN_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.seen_ttl),
            misbehavior_score: env_parse("QC_CLSIG_MISBEHAVIOR_SCORE")
                .unwrap_or(defaults.misbehavior_score),
            penalize_future_heights: env_flag("QC_CLSIG_PENALIZE_FUTURE")
                .unwrap_or(defaults.penalize_future_heights),
            masternode_mode: env_flag("QC_MASTERNODE").unwrap_or(defaults.masternode_mode),
            command_channel_capacity: defaults.command_channel_capacity,
        }
    }

    /// Majority of the signing active quorums: `floor(n/2) + 1`
    pub fn signing_threshold(&self) -> usize {
        self.signing_active_quorum_count / 2 + 1
    }

    /// Reject configurations the manager cannot operate with.
    pub fn validate(&self) -> ChainLockResult<()> {
        if self.signing_active_quorum_count == 0 {
            return Err(ChainLockError::InvalidConfig {
                reason: "signing_active_quorum_count must be at least 1".to_string(),
            });
        }
        if self.signing_active_quorum_count > u16::MAX as usize {
            return Err(ChainLockError::InvalidConfig {
                reason: "signing_active_quorum_count exceeds wire limit".to_string(),
            });
        }
        if self.sign_height_offset < 0 {
            return Err(ChainLockError::InvalidConfig {
                reason: "sign_height_offset must not be negative".to_string(),
            });
        }
        if self.cleanup_interval.is_zero() {
            return Err(ChainLockError::InvalidConfig {
                reason: "cleanup_interval must be non-zero".to_string(),
            });
        }
        if self.command_channel_capacity == 0 {
            return Err(ChainLockError::InvalidConfig {
                reason: "command_channel_capacity must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_flag(key: &str) -> Option<bool> {
    env::var(key)
        .ok()
        .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
}
