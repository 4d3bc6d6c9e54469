//! Incoming commands for the ChainLocks service
//!
//! Every mutation of manager state arrives as a `ChainLockCommand` on the
//! service channel; replies travel back on a oneshot.

use crate::domain::{ChainLockSig, RequestId};
use crate::error::ChainLockResult;
use crate::ports::inbound::ProcessOutcome;
use shared_types::{BlockRef, Hash, PeerId};
use tokio::sync::oneshot;

/// Reply channel for a command
pub type Reply<T> = oneshot::Sender<T>;

/// Where a CLSIG came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageOrigin {
    /// Received from a network peer
    Peer(PeerId),
    /// Built from one of our own recovered signatures
    Local { request_id: RequestId },
}

impl MessageOrigin {
    pub fn peer(&self) -> Option<PeerId> {
        match self {
            MessageOrigin::Peer(peer) => Some(*peer),
            MessageOrigin::Local { .. } => None,
        }
    }

    pub fn request_filter(&self) -> Option<&RequestId> {
        match self {
            MessageOrigin::Peer(_) => None,
            MessageOrigin::Local { request_id } => Some(request_id),
        }
    }
}

/// Service commands
#[derive(Debug)]
pub enum ChainLockCommand {
    /// Raw `CLSIG` payload from a peer
    ProcessMessage {
        peer: PeerId,
        payload: Vec<u8>,
        reply: Reply<ChainLockResult<ProcessOutcome>>,
    },
    /// New best local tip
    UpdatedBlockTip {
        tip: BlockRef,
        initial_download: bool,
        reply: Reply<()>,
    },
    /// Header or block accepted into the block index
    AcceptedBlockHeader { block: BlockRef, reply: Reply<()> },
    /// Run the self-signing loop for `tip`
    TrySignChainTip { tip: BlockRef, reply: Reply<()> },
    /// Run a cleanup pass if one is due
    Cleanup { reply: Reply<()> },
    AlreadyHave { hash: Hash, reply: Reply<bool> },
    ChainLockByHash {
        hash: Hash,
        reply: Reply<Option<ChainLockSig>>,
    },
    BestChainLock { reply: Reply<ChainLockSig> },
    MostRecentChainLock { reply: Reply<ChainLockSig> },
    BestChainLockShares { reply: Reply<Vec<ChainLockSig>> },
    /// Stop the service task
    Shutdown,
}
