//! # Core Domain Entities
//!
//! ## Clusters
//!
//! - **Chain**: `Hash`, `BlockRef`
//! - **Networking**: `NodeId`, `PeerId`, `PeerInfo`

use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// CLUSTER A: THE CHAIN
// =============================================================================

/// A 32-byte hash (double SHA-256).
pub type Hash = [u8; 32];

/// The all-zero hash, used as the "null" marker.
pub const ZERO_HASH: Hash = [0u8; 32];

/// Stable reference to an entry in the block index.
///
/// Copyable and safe to hold across awaits; the entry itself is re-resolved
/// through the block index when ancestry is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockRef {
    /// Block hash.
    pub hash: Hash,
    /// Height of the block in its chain.
    pub height: i32,
}

impl BlockRef {
    /// Create a new block reference.
    pub fn new(hash: Hash, height: i32) -> Self {
        Self { hash, height }
    }

    /// Genesis blocks have no parent.
    pub fn is_genesis(&self) -> bool {
        self.height == 0
    }
}

impl fmt::Display for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", short_hex(&self.hash), self.height)
    }
}

/// First 8 bytes of a hash as hex, for log output.
pub fn short_hex(hash: &Hash) -> String {
    hex::encode(&hash[..8])
}

// =============================================================================
// CLUSTER D: NETWORKING
// =============================================================================

/// Unique identifier for a node in the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct NodeId(pub [u8; 32]);

/// A peer identifier (alias for `NodeId` in peer contexts).
pub type PeerId = NodeId;

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&short_hex(&self.0))
    }
}

/// What the relay layer knows about a connected peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerInfo {
    /// The peer's node ID.
    pub node_id: NodeId,
    /// Peer installed a bloom filter (light/SPV client).
    pub is_light_client: bool,
    /// Connection is an intra-masternode quorum connection.
    pub is_masternode_connection: bool,
}

impl PeerInfo {
    /// Full nodes that can aggregate shares themselves.
    pub fn is_full_relay_peer(&self) -> bool {
        !self.is_light_client && !self.is_masternode_connection
    }
}
