//! Outgoing actions of the ChainLocks manager
//!
//! The manager never calls the network or the chain manager while it is
//! mutating state. It queues actions instead, and the service executes them
//! once the transition is complete.

use crate::domain::Inventory;
use shared_types::{BlockRef, PeerId};

/// Side effect requested by a state transition
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChainLockAction {
    /// Clear request tracking for an inventory the peer delivered
    InventoryReceived { peer: PeerId, inventory: Inventory },
    /// Announce to every peer
    RelayToAll { inventory: Inventory },
    /// Announce only to full relay peers (not light clients or masternodes)
    RelayToFullNodes { inventory: Inventory },
    /// Charge a peer misbehaviour points
    Misbehaving {
        peer: PeerId,
        score: u32,
        reason: String,
    },
    /// Make the chain manager treat `block` as canonical
    EnforceBestChainLock { block: BlockRef },
}
