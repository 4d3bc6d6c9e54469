//! # ChainLocks Manager
//!
//! Synchronous state machine behind the service task. It ingests CLSIGs from
//! peers and from our own recovered signatures, accumulates shares into
//! aggregates, tracks the best known lock and runs the self-signing loop.
//!
//! Side effects on the network and the chain manager are queued as
//! [`ChainLockAction`]s and executed by the caller after the transition, so no
//! external call ever happens while manager state is being mutated.

use crate::config::ChainLockConfig;
use crate::domain::{
    ChainLockSig, EnforcementView, Inventory, QuorumVerifier, RecoveredSig, RequestIdStep,
    SignerBits,
};
use crate::error::{ChainLockError, ChainLockResult};
use crate::events::{ChainLockAction, MessageOrigin};
use crate::metrics;
use crate::ports::inbound::ProcessOutcome;
use crate::ports::outbound::{
    ChainView, Collaborators, FeatureToggle, ListenerId, QuorumScanner, RecoveredSigSender,
    SigningService,
};
use crate::state::ChainLockState;
use shared_crypto::sha256d;
use shared_types::{BlockRef, Hash, PeerId};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Activation state, re-derived from the feature toggle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActivationState {
    Disabled,
    EnabledNotEnforced,
    Enforced,
}

pub struct ChainLockManager {
    config: ChainLockConfig,
    state: ChainLockState,
    verifier: QuorumVerifier,
    quorums: Arc<dyn QuorumScanner>,
    signing: Arc<dyn SigningService>,
    chain: Arc<dyn ChainView>,
    toggle: Arc<dyn FeatureToggle>,
    listener: Option<ListenerId>,
}

impl ChainLockManager {
    pub fn new(config: ChainLockConfig, collaborators: &Collaborators) -> Self {
        let verifier = QuorumVerifier::new(
            config.llmq_type,
            config.signing_active_quorum_count,
            collaborators.quorums.clone(),
            collaborators.signing.clone(),
        );
        Self {
            config,
            state: ChainLockState::new(),
            verifier,
            quorums: collaborators.quorums.clone(),
            signing: collaborators.signing.clone(),
            chain: collaborators.chain.clone(),
            toggle: collaborators.toggle.clone(),
            listener: None,
        }
    }

    /// Derive the activation state and subscribe to recovered signatures.
    pub fn start(&mut self, listener: RecoveredSigSender) {
        self.check_active_state();
        if let Some(previous) = self.listener.take() {
            self.signing.unregister_recovered_sigs_listener(previous);
        }
        self.listener = Some(self.signing.register_recovered_sigs_listener(listener));
        info!(
            quorum_count = self.config.signing_active_quorum_count,
            masternode = self.config.masternode_mode,
            "ChainLocks manager started"
        );
    }

    pub fn stop(&mut self) {
        if let Some(id) = self.listener.take() {
            self.signing.unregister_recovered_sigs_listener(id);
            info!("ChainLocks manager stopped");
        }
    }

    pub fn state(&self) -> &ChainLockState {
        &self.state
    }

    pub fn take_actions(&mut self) -> Vec<ChainLockAction> {
        self.state.take_actions()
    }

    pub fn enforcement_view(&self) -> EnforcementView {
        self.state.enforcement_view()
    }

    pub fn activation(&self) -> ActivationState {
        match (self.state.enabled, self.state.enforced) {
            (_, true) => ActivationState::Enforced,
            (true, false) => ActivationState::EnabledNotEnforced,
            (false, false) => ActivationState::Disabled,
        }
    }

    /// Re-read the feature toggle. Entering enforcement drops best and most
    /// recent locks left over from before activation.
    pub fn check_active_state(&mut self) {
        let enabled = self.toggle.chain_locks_enabled();
        let was_enforced = self.state.enforced;
        self.state.enabled = enabled;
        self.state.enforced = enabled && self.toggle.enforcement_activated();

        if !was_enforced && self.state.enforced {
            info!("ChainLocks enforcement activated, discarding stale locks");
            self.state.reset_best();
        }
    }

    // =========================================================================
    // INGEST
    // =========================================================================

    /// Decode and process a raw `CLSIG` payload from `peer`.
    ///
    /// Nothing is decoded while chain locks are disabled, so peers are never
    /// charged for payloads we ignore.
    pub fn process_message(&mut self, peer: PeerId, payload: &[u8]) -> ChainLockResult<ProcessOutcome> {
        self.process_with(MessageOrigin::Peer(peer), sha256d(payload), || {
            ChainLockSig::decode(payload)
        })
    }

    /// Process a decoded CLSIG whose content hash is `hash`.
    ///
    /// Rejections are returned as errors after the matching misbehaviour
    /// action has been queued for peer-originated messages.
    pub fn process_new_chain_lock(
        &mut self,
        origin: MessageOrigin,
        clsig: ChainLockSig,
        hash: Hash,
    ) -> ChainLockResult<ProcessOutcome> {
        self.process_with(origin, hash, || Ok(clsig))
    }

    fn process_with<F>(&mut self, origin: MessageOrigin, hash: Hash, decode: F) -> ChainLockResult<ProcessOutcome>
    where
        F: FnOnce() -> ChainLockResult<ChainLockSig>,
    {
        if !self.toggle.chain_locks_enabled() {
            return Ok(ProcessOutcome::Disabled);
        }
        let clsig = match decode() {
            Ok(clsig) => clsig,
            Err(e) => {
                self.reject(origin, None, &e);
                return Err(e);
            }
        };

        let height = clsig.height;
        let result = self.process_inner(origin, clsig, hash, Instant::now());
        match &result {
            Ok(ProcessOutcome::ShareAccepted { .. } | ProcessOutcome::AggregateAccepted { .. }) => {
                metrics::record_message_processed();
            }
            Ok(outcome) => {
                debug!(height, ?outcome, origin = ?origin, "CLSIG ignored");
            }
            Err(e) => self.reject(origin, Some(height), e),
        }
        result
    }

    fn reject(&mut self, origin: MessageOrigin, height: Option<i32>, err: &ChainLockError) {
        metrics::record_message_rejected(err.metric_label());
        match err {
            ChainLockError::InvariantViolation { .. } => {
                error!(?height, origin = ?origin, error = %err, "CLSIG dropped")
            }
            _ => warn!(?height, origin = ?origin, error = %err, "Invalid CLSIG"),
        }
        if let Some(peer) = origin.peer() {
            if let Some(score) = err.penalty(&self.config) {
                self.state.push_action(ChainLockAction::Misbehaving {
                    peer,
                    score,
                    reason: err.to_string(),
                });
            }
        }
    }

    fn process_inner(
        &mut self,
        origin: MessageOrigin,
        clsig: ChainLockSig,
        hash: Hash,
        now: Instant,
    ) -> ChainLockResult<ProcessOutcome> {
        let inventory = Inventory::chain_lock(hash);
        if let Some(peer) = origin.peer() {
            self.state
                .push_action(ChainLockAction::InventoryReceived { peer, inventory });
        }

        if self.state.is_seen(&hash) {
            return Ok(ProcessOutcome::Duplicate);
        }
        if self.state.is_superseded(&clsig) {
            return Ok(ProcessOutcome::Stale);
        }

        let tip = self.chain.active_tip().ok_or(ChainLockError::NoChainTip)?;
        if clsig.height > tip.height.saturating_add(self.config.sign_height_offset) {
            return Err(ChainLockError::FutureHeight {
                height: clsig.height,
                tip_height: tip.height,
            });
        }

        // Quorums are scanned from the locked block if we know it, else from our tip
        let block = self.chain.lookup_block(&clsig.block_hash);
        let anchor = match block {
            Some(block) if block.height != clsig.height => {
                return Err(ChainLockError::HeightMismatch {
                    clsig_height: clsig.height,
                    block_height: block.height,
                });
            }
            Some(block) => block,
            None => tip,
        };

        let threshold = self.config.signing_threshold();
        let outcome = if clsig.is_share() {
            let mut share = clsig;
            if share.signers.is_empty() {
                share
                    .signers
                    .resize(self.config.signing_active_quorum_count, false);
            }
            let (quorum_index, quorum) =
                self.verifier
                    .verify_share(&share, &anchor, origin.request_filter())?;

            share.signers.set(quorum_index, true);
            if share.signer_count() > 1 {
                return Err(ChainLockError::InvariantViolation {
                    reason: format!("share has {} signers after verification", share.signer_count()),
                });
            }

            let share_hash = share.content_hash()?;
            self.state.mark_seen(hash, now);
            self.state.mark_seen(share_hash, now);
            debug!(
                height = share.height,
                quorum_index,
                block = %hex::encode(&share.block_hash[..8]),
                "Accepted CLSIG share"
            );
            self.state.store_share(quorum.quorum_hash, share.clone());
            self.state.most_recent = share;

            let promoted = block.is_some_and(|block| self.state.try_update_best(&block, threshold));
            if promoted {
                let aggregate = self.state.best_known.inventory()?;
                self.state
                    .push_action(ChainLockAction::RelayToAll { inventory: aggregate });
            } else {
                self.state.push_action(ChainLockAction::RelayToFullNodes {
                    inventory: Inventory::chain_lock(share_hash),
                });
            }
            ProcessOutcome::ShareAccepted {
                quorum_index,
                promoted,
            }
        } else {
            self.verifier.verify_aggregate(&clsig, &anchor)?;

            self.state.mark_seen(hash, now);
            debug!(height = clsig.height, signers = clsig.signer_count(), "Accepted aggregated CLSIG");
            self.state.store_candidate(clsig.clone());
            self.state.most_recent = clsig;

            let promoted = block.is_some_and(|block| self.state.try_update_best(&block, threshold));
            self.state
                .push_action(ChainLockAction::RelayToAll { inventory });
            ProcessOutcome::AggregateAccepted { promoted }
        };

        // Unknown block: enforcement waits for the header to arrive
        let Some(block) = block else {
            return Ok(outcome);
        };

        if self.state.best_known_block == Some(block) {
            self.check_active_state();
            self.queue_enforcement();
        }
        Ok(outcome)
    }

    fn queue_enforcement(&mut self) {
        if !self.state.enforced {
            return;
        }
        if let Some(block) = self.state.best_known_block {
            self.state
                .push_action(ChainLockAction::EnforceBestChainLock { block });
        }
    }

    // =========================================================================
    // CHAIN EVENTS
    // =========================================================================

    /// Header or block for `block` entered the block index.
    ///
    /// A lock for this height received before the block was known can now be
    /// promoted. Enforcement follows on the next tip update.
    pub fn on_accepted_block_header(&mut self, block: BlockRef) -> bool {
        if !self.state.candidates_by_height.contains_key(&block.height)
            && !self.state.shares_by_height.contains_key(&block.height)
        {
            return false;
        }
        let promoted = self
            .state
            .try_update_best(&block, self.config.signing_threshold());
        if promoted {
            info!(block = %block, "Block header came in late, chain lock promoted");
        }
        promoted
    }

    /// New best local tip.
    pub fn on_updated_block_tip(&mut self, tip: BlockRef, initial_download: bool) {
        if initial_download {
            return;
        }
        self.check_active_state();
        self.queue_enforcement();
        self.try_sign_chain_tip(tip);
    }

    // =========================================================================
    // SELF-SIGNING
    // =========================================================================

    /// Ask every quorum we belong to for a signature over `tip`.
    pub fn try_sign_chain_tip(&mut self, tip: BlockRef) {
        self.cleanup();

        if !self.config.masternode_mode || !self.chain.is_blockchain_synced() {
            return;
        }
        if self.chain.parent(&tip).is_none() {
            return;
        }
        if !self.state.enabled {
            return;
        }
        if tip.height == self.state.last_signed_height {
            return;
        }
        if self.state.best_known.height >= tip.height {
            return;
        }
        if self
            .enforcement_view()
            .has_conflicting_chain_lock(self.chain.as_ref(), tip.height, &tip.hash)
        {
            debug!(tip = %tip, "Conflicting chain lock present, not signing");
            return;
        }

        debug!(tip = %tip, "Trying to sign chain tip");
        self.state.last_signed_request_ids.clear();

        let count = self.config.signing_active_quorum_count;
        let quorums = self
            .quorums
            .scan_quorums(self.config.llmq_type, &tip, count);
        let mut issued = false;
        for (quorum, request_id) in quorums
            .iter()
            .take(count)
            .zip(RequestIdStep::stream(tip.height))
        {
            if self.signing.async_sign_if_member(
                self.config.llmq_type,
                &request_id,
                &tip.hash,
                &quorum.quorum_hash,
            ) {
                self.state.last_signed_request_ids.insert(request_id);
                self.state.last_signed_hash = tip.hash;
                issued = true;
            }
        }

        if self.state.best_known.height >= tip.height {
            return;
        }
        if issued {
            self.state.last_signed_height = tip.height;
        }
    }

    /// Recovered signature from the signing service.
    ///
    /// Only signatures for our outstanding request ids over the tip we last
    /// signed become a CLSIG share. Returns `None` when the signature is not
    /// ours or no longer useful.
    pub fn on_recovered_sig(&mut self, recovered: RecoveredSig) -> Option<ChainLockResult<ProcessOutcome>> {
        if !self.state.enabled {
            return None;
        }
        if !self.state.last_signed_request_ids.contains(&recovered.id)
            || recovered.msg_hash != self.state.last_signed_hash
        {
            return None;
        }
        if self.state.best_known.height >= self.state.last_signed_height {
            return None;
        }

        let clsig = ChainLockSig::new(
            self.state.last_signed_height,
            self.state.last_signed_hash,
            SignerBits::new(),
            recovered.signature,
        );
        self.state.last_signed_request_ids.remove(&recovered.id);

        let hash = match clsig.content_hash() {
            Ok(hash) => hash,
            Err(e) => return Some(Err(e)),
        };
        Some(self.process_new_chain_lock(
            MessageOrigin::Local {
                request_id: recovered.id,
            },
            clsig,
            hash,
        ))
    }

    // =========================================================================
    // CLEANUP
    // =========================================================================

    pub fn cleanup(&mut self) -> bool {
        self.cleanup_at(Instant::now())
    }

    /// Prune expired seen hashes and superseded heights, at most once per
    /// cleanup interval and only once synced.
    pub fn cleanup_at(&mut self, now: Instant) -> bool {
        if !self.chain.is_blockchain_synced() {
            return false;
        }
        if let Some(last) = self.state.last_cleanup {
            if now.saturating_duration_since(last) < self.config.cleanup_interval {
                return false;
            }
        }
        self.state.last_cleanup = Some(now);

        self.state.prune_seen(now, self.config.seen_ttl);
        if let Some(best) = self.state.best_known_block {
            self.state.prune_below(best.height);
        }
        if self.state.best_known.height >= self.state.last_signed_height {
            self.state.last_signed_request_ids.clear();
        }
        debug!(
            seen = self.state.seen.len(),
            share_heights = self.state.shares_by_height.len(),
            candidates = self.state.candidates_by_height.len(),
            "ChainLocks cleanup"
        );
        true
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    pub fn already_have(&self, hash: &Hash) -> bool {
        self.state.is_seen(hash)
    }

    pub fn chain_lock_by_hash(&self, hash: &Hash) -> Option<ChainLockSig> {
        self.state.chain_lock_by_hash(hash)
    }

    pub fn best_chain_lock(&self) -> ChainLockSig {
        self.state.best_known.clone()
    }

    pub fn most_recent_chain_lock(&self) -> ChainLockSig {
        self.state.most_recent.clone()
    }

    pub fn best_chain_lock_shares(&self) -> Vec<ChainLockSig> {
        self.state.best_chain_lock_shares()
    }

    pub fn has_chain_lock(&self, height: i32, hash: &Hash) -> bool {
        self.enforcement_view()
            .has_chain_lock(self.chain.as_ref(), height, hash)
    }

    pub fn has_conflicting_chain_lock(&self, height: i32, hash: &Hash) -> bool {
        self.enforcement_view()
            .has_conflicting_chain_lock(self.chain.as_ref(), height, hash)
    }
}

impl Drop for ChainLockManager {
    fn drop(&mut self) {
        self.stop();
    }
}
