//! Manager-owned accumulator state

use crate::domain::{ChainLockSig, EnforcementView, RequestId, SignerBits};
use crate::events::outgoing::ChainLockAction;
use crate::metrics;
use bitvec::prelude::*;
use shared_crypto::BlsSignature;
use shared_types::{BlockRef, Hash, ZERO_HASH};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::{Duration, Instant};
use tracing::{error, info};

pub struct ChainLockState {
    /// Feature toggle on
    pub enabled: bool,
    /// Locks are enforced against the chain manager (implies enabled)
    pub enforced: bool,
    /// Tallest chain lock whose block is known locally
    pub best_known: ChainLockSig,
    /// Block of `best_known`
    pub best_known_block: Option<BlockRef>,
    /// Last accepted CLSIG, share or aggregate
    pub most_recent: ChainLockSig,
    /// Verified shares: height -> quorum hash -> share
    pub shares_by_height: BTreeMap<i32, HashMap<Hash, ChainLockSig>>,
    /// Verified or locally built aggregates by height
    pub candidates_by_height: BTreeMap<i32, ChainLockSig>,
    /// Content hashes already processed, with first-seen time
    pub seen: HashMap<Hash, Instant>,
    /// Height of the last self-signing attempt
    pub last_signed_height: i32,
    /// Tip hash of the last self-signing attempt
    pub last_signed_hash: Hash,
    /// Outstanding self-signing request ids
    pub last_signed_request_ids: HashSet<RequestId>,
    pub last_cleanup: Option<Instant>,
    pending_actions: Vec<ChainLockAction>,
}

impl Default for ChainLockState {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainLockState {
    pub fn new() -> Self {
        Self {
            enabled: false,
            enforced: false,
            best_known: ChainLockSig::default(),
            best_known_block: None,
            most_recent: ChainLockSig::default(),
            shares_by_height: BTreeMap::new(),
            candidates_by_height: BTreeMap::new(),
            seen: HashMap::new(),
            last_signed_height: -1,
            last_signed_hash: ZERO_HASH,
            last_signed_request_ids: HashSet::new(),
            last_cleanup: None,
            pending_actions: Vec::new(),
        }
    }

    /// Record `hash` as seen. Returns false if it already was.
    pub fn mark_seen(&mut self, hash: Hash, now: Instant) -> bool {
        match self.seen.entry(hash) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(now);
                true
            }
        }
    }

    pub fn is_seen(&self, hash: &Hash) -> bool {
        self.seen.contains_key(hash)
    }

    /// `clsig` does not beat the best known chain lock.
    pub fn is_superseded(&self, clsig: &ChainLockSig) -> bool {
        !clsig.is_better_than(&self.best_known)
    }

    pub fn store_share(&mut self, quorum_hash: Hash, share: ChainLockSig) {
        self.shares_by_height
            .entry(share.height)
            .or_default()
            .insert(quorum_hash, share);
    }

    pub fn store_candidate(&mut self, clsig: ChainLockSig) {
        self.candidates_by_height.insert(clsig.height, clsig);
    }

    /// Promote a lock on `block` to best known, from a stored candidate or by
    /// aggregating at least `threshold` matching shares. Never demotes.
    pub fn try_update_best(&mut self, block: &BlockRef, threshold: usize) -> bool {
        let stored = self
            .candidates_by_height
            .get(&block.height)
            .filter(|candidate| candidate.block_hash == block.hash)
            .cloned();

        if let Some(candidate) = stored {
            if self.is_superseded(&candidate) {
                return false;
            }
            self.set_best(candidate, *block);
            return true;
        }

        let Some(aggregate) = self.aggregate_shares(block, threshold) else {
            return false;
        };
        if self.is_superseded(&aggregate) {
            return false;
        }
        metrics::record_aggregate_created();
        self.store_candidate(aggregate.clone());
        self.set_best(aggregate, *block);
        true
    }

    fn set_best(&mut self, clsig: ChainLockSig, block: BlockRef) {
        info!(
            height = clsig.height,
            block = %block,
            signers = clsig.signer_count(),
            "New best chain lock"
        );
        metrics::set_best_height(clsig.height);
        if clsig.height >= self.last_signed_height {
            self.last_signed_request_ids.clear();
        }
        self.best_known = clsig;
        self.best_known_block = Some(block);
    }

    /// Combine every share locking `block` into one aggregate, ordered by
    /// signer index so the result does not depend on arrival order.
    fn aggregate_shares(&self, block: &BlockRef, threshold: usize) -> Option<ChainLockSig> {
        let shares = self.shares_by_height.get(&block.height)?;
        let mut matching: Vec<&ChainLockSig> = shares
            .values()
            .filter(|share| share.block_hash == block.hash)
            .collect();
        if matching.len() < threshold {
            return None;
        }
        matching.sort_by_key(|share| share.signer_index());

        let width = matching.iter().map(|share| share.signers.len()).max()?;
        let mut signers: SignerBits = bitvec![u8, Lsb0; 0; width];
        let mut signatures = Vec::with_capacity(matching.len());

        for share in matching {
            let index = match share.signer_index() {
                Some(index) if share.signer_count() == 1 => index,
                _ => {
                    error!(share = %share, "Stored share does not name exactly one signer");
                    continue;
                }
            };
            if signers[index] {
                error!(share = %share, index, "Two stored shares claim the same signer index");
                continue;
            }
            match BlsSignature::from_bytes(&share.signature) {
                Ok(signature) => {
                    signers.set(index, true);
                    signatures.push(signature);
                }
                Err(e) => error!(share = %share, error = %e, "Stored share signature unreadable"),
            }
        }

        if signatures.len() < threshold {
            return None;
        }
        match BlsSignature::aggregate(&signatures) {
            Ok(aggregate) => Some(ChainLockSig::new(
                block.height,
                block.hash,
                signers,
                aggregate.to_bytes(),
            )),
            Err(e) => {
                error!(height = block.height, error = %e, "Failed to aggregate shares");
                None
            }
        }
    }

    /// Forget best and most recent locks (entering enforcement).
    pub fn reset_best(&mut self) {
        self.best_known = ChainLockSig::default();
        self.best_known_block = None;
        self.most_recent = ChainLockSig::default();
    }

    pub fn enforcement_view(&self) -> EnforcementView {
        EnforcementView {
            enforced: self.enforced,
            best_block: self.best_known_block,
        }
    }

    /// Known CLSIG whose content hash is `hash`.
    pub fn chain_lock_by_hash(&self, hash: &Hash) -> Option<ChainLockSig> {
        let matches = |clsig: &&ChainLockSig| clsig.content_hash().ok().as_ref() == Some(hash);

        [&self.most_recent, &self.best_known]
            .into_iter()
            .filter(|clsig| !clsig.is_null())
            .chain(self.candidates_by_height.values())
            .chain(self.shares_by_height.values().flat_map(|shares| shares.values()))
            .find(matches)
            .cloned()
    }

    /// Shares for the best known lock's block, by signer index.
    pub fn best_chain_lock_shares(&self) -> Vec<ChainLockSig> {
        if self.best_known.is_null() {
            return Vec::new();
        }
        let mut shares: Vec<ChainLockSig> = self
            .shares_by_height
            .get(&self.best_known.height)
            .map(|shares| {
                shares
                    .values()
                    .filter(|share| share.block_hash == self.best_known.block_hash)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        shares.sort_by_key(|share| share.signer_index());
        shares
    }

    /// Drop shares and candidates strictly below `height`.
    pub fn prune_below(&mut self, height: i32) {
        self.shares_by_height = self.shares_by_height.split_off(&height);
        self.candidates_by_height = self.candidates_by_height.split_off(&height);
    }

    /// Drop seen hashes older than `ttl`.
    pub fn prune_seen(&mut self, now: Instant, ttl: Duration) {
        self.seen
            .retain(|_, first_seen| now.saturating_duration_since(*first_seen) < ttl);
    }

    pub fn push_action(&mut self, action: ChainLockAction) {
        self.pending_actions.push(action);
    }

    /// Take and clear pending actions
    pub fn take_actions(&mut self) -> Vec<ChainLockAction> {
        std::mem::take(&mut self.pending_actions)
    }
}
