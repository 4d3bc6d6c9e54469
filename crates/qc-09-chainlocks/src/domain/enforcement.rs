//! Enforcement queries
//!
//! Answered from a snapshot of the enforced lock plus block-index ancestry, so
//! block validation never waits on the manager.

use crate::ports::outbound::ChainView;
use shared_types::{BlockRef, Hash};
use tracing::error;

/// Published snapshot of the lock currently being enforced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EnforcementView {
    /// Chain locks are active and enforced
    pub enforced: bool,
    /// Block of the best chain lock whose block is known locally
    pub best_block: Option<BlockRef>,
}

impl EnforcementView {
    fn locked_at(&self, chain: &dyn ChainView, height: i32) -> Option<BlockRef> {
        if !self.enforced {
            return None;
        }
        let best = self.best_block?;
        if height > best.height {
            return None;
        }
        if height == best.height {
            return Some(best);
        }
        let ancestor = chain.ancestor(&best, height);
        if ancestor.is_none() {
            error!(
                height,
                best = %best,
                "Locked block has no ancestor at height"
            );
        }
        ancestor
    }

    /// `hash` at `height` is on the locked chain.
    pub fn has_chain_lock(&self, chain: &dyn ChainView, height: i32, hash: &Hash) -> bool {
        self.locked_at(chain, height)
            .is_some_and(|block| block.hash == *hash)
    }

    /// A different block than `hash` is locked at `height`.
    pub fn has_conflicting_chain_lock(&self, chain: &dyn ChainView, height: i32, hash: &Hash) -> bool {
        self.locked_at(chain, height)
            .is_some_and(|block| block.hash != *hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryChain;

    fn locked_chain() -> (InMemoryChain, Vec<BlockRef>) {
        let chain = InMemoryChain::new();
        let blocks = chain.extend(&chain.genesis(), 10, 0);
        (chain, blocks)
    }

    #[test]
    fn test_not_enforced_answers_false() {
        let (chain, blocks) = locked_chain();
        let view = EnforcementView {
            enforced: false,
            best_block: Some(blocks[9]),
        };
        assert!(!view.has_chain_lock(&chain, 10, &blocks[9].hash));
        assert!(!view.has_conflicting_chain_lock(&chain, 10, &[0xEE; 32]));
    }

    #[test]
    fn test_no_best_block_answers_false() {
        let (chain, _) = locked_chain();
        let view = EnforcementView {
            enforced: true,
            best_block: None,
        };
        assert!(!view.has_chain_lock(&chain, 1, &[1; 32]));
        assert!(!view.has_conflicting_chain_lock(&chain, 1, &[1; 32]));
    }

    #[test]
    fn test_locked_height_and_ancestors() {
        let (chain, blocks) = locked_chain();
        let tip = blocks[9];
        let view = EnforcementView {
            enforced: true,
            best_block: Some(tip),
        };

        assert!(view.has_chain_lock(&chain, tip.height, &tip.hash));
        for block in &blocks {
            assert!(view.has_chain_lock(&chain, block.height, &block.hash));
            assert!(!view.has_conflicting_chain_lock(&chain, block.height, &block.hash));
        }
        assert!(view.has_conflicting_chain_lock(&chain, tip.height, &[0xEE; 32]));
        assert!(view.has_conflicting_chain_lock(&chain, 4, &[0xEE; 32]));
    }

    #[test]
    fn test_above_locked_height_undecided() {
        let (chain, blocks) = locked_chain();
        let view = EnforcementView {
            enforced: true,
            best_block: Some(blocks[4]),
        };
        assert!(!view.has_chain_lock(&chain, 8, &blocks[7].hash));
        assert!(!view.has_conflicting_chain_lock(&chain, 8, &[0xEE; 32]));
    }

    #[test]
    fn test_fork_block_conflicts() {
        let (chain, blocks) = locked_chain();
        let fork = chain.extend(&blocks[4], 3, 1);
        let view = EnforcementView {
            enforced: true,
            best_block: Some(blocks[9]),
        };
        assert!(view.has_conflicting_chain_lock(&chain, fork[0].height, &fork[0].hash));
        assert!(!view.has_chain_lock(&chain, fork[2].height, &fork[2].hash));
    }
}
