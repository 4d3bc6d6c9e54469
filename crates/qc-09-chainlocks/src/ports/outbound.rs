//! Driven Ports (SPI - Outbound Dependencies)
//!
//! Quorum scanning, threshold signing, the block index, the peer network and
//! the chain manager all live outside this crate. The synchronous ports are
//! called from inside a state transition and must only do short reads; the
//! async ones are called by the service after the transition completes.

use crate::domain::{Inventory, LlmqType, Quorum, RecoveredSig, RequestId};
use crate::error::ChainLockResult;
use async_trait::async_trait;
use shared_types::{BlockRef, Hash, PeerId, PeerInfo};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Handle for an installed recovered-signature listener
pub type ListenerId = Uuid;

/// Channel the signing service delivers recovered signatures on
pub type RecoveredSigSender = mpsc::UnboundedSender<RecoveredSig>;

/// Peer selection predicate for filtered relay
pub type PeerFilter = fn(&PeerInfo) -> bool;

/// Deterministically ordered quorums active at an anchor block
pub trait QuorumScanner: Send + Sync {
    /// Up to `count` quorums of `llmq_type`, in scan order.
    fn scan_quorums(&self, llmq_type: LlmqType, anchor: &BlockRef, count: usize) -> Vec<Quorum>;
}

/// Asynchronous threshold-signing service
pub trait SigningService: Send + Sync {
    /// Ask the quorum to sign `msg_hash` under `request_id` if the local node
    /// is a member. Returns whether a request was issued; the signature
    /// arrives later on every registered listener.
    fn async_sign_if_member(
        &self,
        llmq_type: LlmqType,
        request_id: &RequestId,
        msg_hash: &Hash,
        quorum_hash: &Hash,
    ) -> bool;

    /// Whether a recovered signature is already cached for `request_id`.
    fn has_recovered_sig(&self, llmq_type: LlmqType, request_id: &RequestId) -> bool;

    /// Cache a signature this node verified itself.
    fn push_reconstructed_recovered_sig(&self, recovered: RecoveredSig);

    fn register_recovered_sigs_listener(&self, listener: RecoveredSigSender) -> ListenerId;

    fn unregister_recovered_sigs_listener(&self, id: ListenerId);
}

/// Read-only view of the local block index
pub trait ChainView: Send + Sync {
    /// Block index entry for `hash`, if the header is known.
    fn lookup_block(&self, hash: &Hash) -> Option<BlockRef>;

    /// Ancestor of `block` at `height` (the block itself at its own height).
    fn ancestor(&self, block: &BlockRef, height: i32) -> Option<BlockRef>;

    /// Current best local tip.
    fn active_tip(&self) -> Option<BlockRef>;

    /// Parent of `block`, if it has one.
    fn parent(&self, block: &BlockRef) -> Option<BlockRef> {
        if block.height <= 0 {
            return None;
        }
        self.ancestor(block, block.height - 1)
    }

    /// Whether the node considers itself caught up with the network.
    fn is_blockchain_synced(&self) -> bool;
}

/// Process-wide chain-lock activation switch
pub trait FeatureToggle: Send + Sync {
    fn chain_locks_enabled(&self) -> bool;

    /// Network deployment that makes enabled locks enforceable.
    fn enforcement_activated(&self) -> bool {
        true
    }
}

/// Peer network
#[async_trait]
pub trait NetworkRelay: Send + Sync {
    /// Announce to every connected peer.
    async fn relay_inventory(&self, inventory: Inventory);

    /// Announce to peers matching `filter`.
    async fn relay_inventory_filtered(&self, inventory: Inventory, filter: PeerFilter);

    /// Charge `peer` with `score` misbehaviour points.
    async fn misbehaving(&self, peer: PeerId, score: u32, reason: &str);

    /// Clear the outstanding request for `inventory` from `peer`.
    async fn received_response(&self, peer: PeerId, inventory: Inventory);
}

/// Chain manager entry point for lock enforcement
#[async_trait]
pub trait ChainEnforcer: Send + Sync {
    /// Treat `block` as canonical, invalidating competing branches at or
    /// above its height.
    async fn enforce_best_chain_lock(&self, block: BlockRef) -> ChainLockResult<()>;
}

/// Every collaborator the chain-lock service needs.
#[derive(Clone)]
pub struct Collaborators {
    pub quorums: Arc<dyn QuorumScanner>,
    pub signing: Arc<dyn SigningService>,
    pub chain: Arc<dyn ChainView>,
    pub toggle: Arc<dyn FeatureToggle>,
    pub relay: Arc<dyn NetworkRelay>,
    pub enforcer: Arc<dyn ChainEnforcer>,
}
