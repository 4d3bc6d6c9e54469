//! Driving Ports (API - Inbound)

use crate::domain::ChainLockSig;
use crate::error::ChainLockResult;
use async_trait::async_trait;
use shared_types::{BlockRef, Hash, PeerId};

/// What happened to an accepted CLSIG
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Chain locks are switched off
    Disabled,
    /// Content hash already seen
    Duplicate,
    /// Height not above the best known chain lock
    Stale,
    /// Verified single-quorum share
    ShareAccepted {
        quorum_index: usize,
        /// Shares for this block reached the threshold and were aggregated
        promoted: bool,
    },
    /// Verified aggregate
    AggregateAccepted {
        /// Became the best known chain lock
        promoted: bool,
    },
}

impl ProcessOutcome {
    /// The best known chain lock moved.
    pub fn promoted(&self) -> bool {
        matches!(
            self,
            ProcessOutcome::ShareAccepted { promoted: true, .. }
                | ProcessOutcome::AggregateAccepted { promoted: true }
        )
    }
}

/// Primary ChainLocks API
///
/// Mutations are serialized through the service task; the two enforcement
/// queries are answered on the caller's thread.
#[async_trait]
pub trait ChainLockApi: Send + Sync {
    /// Decode, verify and accumulate a `CLSIG` from `peer`.
    async fn process_message(&self, peer: PeerId, payload: Vec<u8>)
        -> ChainLockResult<ProcessOutcome>;

    /// New best local tip.
    async fn updated_block_tip(&self, tip: BlockRef, initial_download: bool)
        -> ChainLockResult<()>;

    /// Header or block accepted into the block index.
    async fn accepted_block_header(&self, block: BlockRef) -> ChainLockResult<()>;

    /// Run the self-signing loop for `tip`.
    async fn try_sign_chain_tip(&self, tip: BlockRef) -> ChainLockResult<()>;

    /// Run a cleanup pass if one is due.
    async fn cleanup(&self) -> ChainLockResult<()>;

    /// Whether the CLSIG with content hash `hash` was seen.
    async fn already_have(&self, hash: Hash) -> ChainLockResult<bool>;

    /// Known CLSIG with content hash `hash`, for serving inventory requests.
    async fn chain_lock_by_hash(&self, hash: Hash) -> ChainLockResult<Option<ChainLockSig>>;

    /// Tallest chain lock whose block is known locally.
    async fn best_chain_lock(&self) -> ChainLockResult<ChainLockSig>;

    /// Last accepted CLSIG (share or aggregate).
    async fn most_recent_chain_lock(&self) -> ChainLockResult<ChainLockSig>;

    /// Shares stored at the best known chain lock's height.
    async fn best_chain_lock_shares(&self) -> ChainLockResult<Vec<ChainLockSig>>;

    /// `hash` at `height` is on the locked chain.
    fn has_chain_lock(&self, height: i32, hash: &Hash) -> bool;

    /// A different block than `hash` is locked at `height`.
    fn has_conflicting_chain_lock(&self, height: i32, hash: &Hash) -> bool;
}
