//! In-memory adapters
//!
//! Collaborators backed by process memory: a block tree, a fixed quorum set,
//! a signing service that signs instantly with locally held quorum keys, and
//! recording network/chain-manager sinks. Used by the devnet runtime and tests.

use crate::domain::{
    build_sign_hash, ChainLockSig, Inventory, LlmqType, Quorum, RecoveredSig, RequestId,
    RequestIdStep, SignerBits,
};
use crate::error::ChainLockResult;
use crate::ports::outbound::{
    ChainEnforcer, ChainView, FeatureToggle, ListenerId, NetworkRelay, PeerFilter, QuorumScanner,
    RecoveredSigSender, SigningService,
};
use async_trait::async_trait;
use bitvec::prelude::*;
use parking_lot::{Mutex, RwLock};
use shared_crypto::hashing::sha256d_many;
use shared_crypto::{sha256d, BlsKeyPair, BlsSignature, CryptoError, BLS_SIGNATURE_LEN};
use shared_types::{BlockRef, Hash, PeerId, PeerInfo};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

// =============================================================================
// QUORUM KEYS
// =============================================================================

/// Quorums with their secret keys, in scan order.
pub struct QuorumKeyring {
    members: Vec<(Quorum, Arc<BlsKeyPair>)>,
}

impl QuorumKeyring {
    /// `count` quorums with keys derived from `seed`.
    pub fn from_seed(seed: u8, count: usize) -> Result<Self, CryptoError> {
        let members = (0..count)
            .map(|index| {
                let ikm = sha256d_many(&[b"quorum-key", &[seed], &(index as u32).to_le_bytes()]);
                let keypair = BlsKeyPair::from_seed(&ikm)?;
                let quorum_hash = sha256d_many(&[b"quorum", &[seed], &(index as u32).to_le_bytes()]);
                Ok((Quorum::new(quorum_hash, keypair.public_key()), Arc::new(keypair)))
            })
            .collect::<Result<Vec<_>, CryptoError>>()?;
        Ok(Self { members })
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn quorums(&self) -> Vec<Quorum> {
        self.members.iter().map(|(quorum, _)| quorum.clone()).collect()
    }

    /// Quorum hash and key for each member index, for a signing service.
    pub fn member_keys(&self, indices: &[usize]) -> Vec<(Hash, Arc<BlsKeyPair>)> {
        indices
            .iter()
            .filter_map(|&index| self.members.get(index))
            .map(|(quorum, keypair)| (quorum.quorum_hash, keypair.clone()))
            .collect()
    }

    fn sign_at(&self, llmq_type: LlmqType, index: usize, height: i32, block_hash: Hash) -> Option<BlsSignature> {
        let (quorum, keypair) = self.members.get(index)?;
        let request_id = RequestIdStep {
            height,
            step: index as i32,
        }
        .request_id();
        let sign_hash = quorum.sign_hash(llmq_type, &request_id, &block_hash);
        Some(keypair.sign(&sign_hash))
    }

    /// Share from quorum `index` with its signer bit set.
    pub fn sign_share(&self, llmq_type: LlmqType, index: usize, height: i32, block_hash: Hash) -> ChainLockSig {
        self.sign_aggregate(llmq_type, &[index], height, block_hash)
    }

    /// Aggregate over the quorums at `indices`.
    pub fn sign_aggregate(
        &self,
        llmq_type: LlmqType,
        indices: &[usize],
        height: i32,
        block_hash: Hash,
    ) -> ChainLockSig {
        let mut signers: SignerBits = bitvec![u8, Lsb0; 0; self.members.len()];
        let mut signatures = Vec::with_capacity(indices.len());
        for &index in indices {
            if let Some(signature) = self.sign_at(llmq_type, index, height, block_hash) {
                signers.set(index, true);
                signatures.push(signature);
            }
        }
        let signature = BlsSignature::aggregate(&signatures)
            .map(|aggregate| aggregate.to_bytes())
            .unwrap_or([0u8; BLS_SIGNATURE_LEN]);
        ChainLockSig::new(height, block_hash, signers, signature)
    }
}

// =============================================================================
// QUORUM SCANNER
// =============================================================================

/// Returns the same quorums at every anchor.
pub struct StaticQuorumScanner {
    quorums: Vec<Quorum>,
}

impl StaticQuorumScanner {
    pub fn new(quorums: Vec<Quorum>) -> Self {
        Self { quorums }
    }
}

impl QuorumScanner for StaticQuorumScanner {
    fn scan_quorums(&self, _llmq_type: LlmqType, _anchor: &BlockRef, count: usize) -> Vec<Quorum> {
        self.quorums.iter().take(count).cloned().collect()
    }
}

// =============================================================================
// SIGNING SERVICE
// =============================================================================

#[derive(Default)]
struct SigningInner {
    member_keys: HashMap<Hash, Arc<BlsKeyPair>>,
    recovered: HashSet<(LlmqType, RequestId)>,
    pushed: Vec<RecoveredSig>,
    requests: Vec<(RequestId, Hash)>,
    listeners: HashMap<ListenerId, RecoveredSigSender>,
}

/// Signing service whose quorums are entirely local: a request signs at
/// once and the recovered signature goes straight to every listener.
#[derive(Default)]
pub struct LocalSigningService {
    inner: RwLock<SigningInner>,
}

impl LocalSigningService {
    /// Member of no quorum.
    pub fn new() -> Self {
        Self::default()
    }

    /// Member of the given quorums.
    pub fn with_member_keys(keys: Vec<(Hash, Arc<BlsKeyPair>)>) -> Self {
        let service = Self::new();
        service.inner.write().member_keys = keys.into_iter().collect();
        service
    }

    /// Signatures pushed back by the verifier.
    pub fn pushed(&self) -> Vec<RecoveredSig> {
        self.inner.read().pushed.clone()
    }

    /// Issued signing requests: (request id, message hash).
    pub fn requests(&self) -> Vec<(RequestId, Hash)> {
        self.inner.read().requests.clone()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.read().listeners.len()
    }
}

impl SigningService for LocalSigningService {
    fn async_sign_if_member(
        &self,
        llmq_type: LlmqType,
        request_id: &RequestId,
        msg_hash: &Hash,
        quorum_hash: &Hash,
    ) -> bool {
        let mut inner = self.inner.write();
        let Some(keypair) = inner.member_keys.get(quorum_hash).cloned() else {
            return false;
        };

        let sign_hash = build_sign_hash(llmq_type, quorum_hash, request_id, msg_hash);
        let recovered = RecoveredSig {
            llmq_type,
            quorum_hash: *quorum_hash,
            id: *request_id,
            msg_hash: *msg_hash,
            signature: keypair.sign(&sign_hash).to_bytes(),
        };
        inner.requests.push((*request_id, *msg_hash));
        inner.recovered.insert((llmq_type, *request_id));
        inner
            .listeners
            .retain(|_, listener| listener.send(recovered.clone()).is_ok());
        debug!(
            quorum = %hex::encode(&quorum_hash[..8]),
            "Recovered signature delivered"
        );
        true
    }

    fn has_recovered_sig(&self, llmq_type: LlmqType, request_id: &RequestId) -> bool {
        self.inner.read().recovered.contains(&(llmq_type, *request_id))
    }

    fn push_reconstructed_recovered_sig(&self, recovered: RecoveredSig) {
        let mut inner = self.inner.write();
        inner.recovered.insert((recovered.llmq_type, recovered.id));
        inner.pushed.push(recovered);
    }

    fn register_recovered_sigs_listener(&self, listener: RecoveredSigSender) -> ListenerId {
        let id = Uuid::new_v4();
        self.inner.write().listeners.insert(id, listener);
        id
    }

    fn unregister_recovered_sigs_listener(&self, id: ListenerId) {
        self.inner.write().listeners.remove(&id);
    }
}

// =============================================================================
// BLOCK INDEX
// =============================================================================

struct ChainInner {
    blocks: HashMap<Hash, (BlockRef, Option<Hash>)>,
    genesis: BlockRef,
    tip: BlockRef,
    synced: bool,
}

/// Block tree with longest-chain tip selection.
pub struct InMemoryChain {
    inner: RwLock<ChainInner>,
}

impl Default for InMemoryChain {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryChain {
    /// Chain holding only a genesis block; synced.
    pub fn new() -> Self {
        let genesis = BlockRef::new(sha256d(b"genesis"), 0);
        let mut blocks = HashMap::new();
        blocks.insert(genesis.hash, (genesis, None));
        Self {
            inner: RwLock::new(ChainInner {
                blocks,
                genesis,
                tip: genesis,
                synced: true,
            }),
        }
    }

    pub fn genesis(&self) -> BlockRef {
        self.inner.read().genesis
    }

    /// The block `connect(parent, salt)` would create.
    pub fn child_ref(parent: &BlockRef, salt: u8) -> BlockRef {
        let height = parent.height + 1;
        let hash = sha256d_many(&[&parent.hash, &height.to_le_bytes(), &[salt]]);
        BlockRef::new(hash, height)
    }

    /// Add a child of `parent`. The tip moves if the chain got longer.
    pub fn connect(&self, parent: &BlockRef, salt: u8) -> BlockRef {
        let block = Self::child_ref(parent, salt);
        let mut inner = self.inner.write();
        inner.blocks.insert(block.hash, (block, Some(parent.hash)));
        if block.height > inner.tip.height {
            inner.tip = block;
        }
        block
    }

    /// Add `count` blocks on top of `parent`.
    pub fn extend(&self, parent: &BlockRef, count: usize, salt: u8) -> Vec<BlockRef> {
        let mut blocks = Vec::with_capacity(count);
        let mut cursor = *parent;
        for _ in 0..count {
            cursor = self.connect(&cursor, salt);
            blocks.push(cursor);
        }
        blocks
    }

    pub fn set_synced(&self, synced: bool) {
        self.inner.write().synced = synced;
    }
}

impl ChainView for InMemoryChain {
    fn lookup_block(&self, hash: &Hash) -> Option<BlockRef> {
        self.inner.read().blocks.get(hash).map(|(block, _)| *block)
    }

    fn ancestor(&self, block: &BlockRef, height: i32) -> Option<BlockRef> {
        if height < 0 || height > block.height {
            return None;
        }
        let inner = self.inner.read();
        let (mut cursor, mut parent) = *inner.blocks.get(&block.hash)?;
        while cursor.height > height {
            let (next, next_parent) = *inner.blocks.get(&parent?)?;
            cursor = next;
            parent = next_parent;
        }
        Some(cursor)
    }

    fn active_tip(&self) -> Option<BlockRef> {
        Some(self.inner.read().tip)
    }

    fn is_blockchain_synced(&self) -> bool {
        self.inner.read().synced
    }
}

// =============================================================================
// FEATURE TOGGLE
// =============================================================================

/// Runtime-switchable toggle.
pub struct StaticToggle {
    enabled: AtomicBool,
    activated: AtomicBool,
}

impl StaticToggle {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            activated: AtomicBool::new(true),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn set_activated(&self, activated: bool) {
        self.activated.store(activated, Ordering::SeqCst);
    }
}

impl FeatureToggle for StaticToggle {
    fn chain_locks_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn enforcement_activated(&self) -> bool {
        self.activated.load(Ordering::SeqCst)
    }
}

// =============================================================================
// NETWORK AND CHAIN MANAGER SINKS
// =============================================================================

/// Network call observed by [`RecordingRelay`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayEvent {
    ToAll(Inventory),
    Filtered {
        inventory: Inventory,
        peers: Vec<PeerId>,
    },
    Misbehaving {
        peer: PeerId,
        score: u32,
        reason: String,
    },
    ReceivedResponse {
        peer: PeerId,
        inventory: Inventory,
    },
}

/// Relay that records calls against a fixed peer set.
#[derive(Default)]
pub struct RecordingRelay {
    peers: Vec<PeerInfo>,
    events: Mutex<Vec<RelayEvent>>,
}

impl RecordingRelay {
    pub fn new(peers: Vec<PeerInfo>) -> Self {
        Self {
            peers,
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<RelayEvent> {
        self.events.lock().clone()
    }

    pub fn relayed_to_all(&self) -> Vec<Inventory> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                RelayEvent::ToAll(inventory) => Some(*inventory),
                _ => None,
            })
            .collect()
    }

    /// (peer, score) for every misbehaviour report.
    pub fn misbehaviour(&self) -> Vec<(PeerId, u32)> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                RelayEvent::Misbehaving { peer, score, .. } => Some((*peer, *score)),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl NetworkRelay for RecordingRelay {
    async fn relay_inventory(&self, inventory: Inventory) {
        self.events.lock().push(RelayEvent::ToAll(inventory));
    }

    async fn relay_inventory_filtered(&self, inventory: Inventory, filter: PeerFilter) {
        let peers = self
            .peers
            .iter()
            .filter(|peer| filter(peer))
            .map(|peer| peer.node_id)
            .collect();
        self.events
            .lock()
            .push(RelayEvent::Filtered { inventory, peers });
    }

    async fn misbehaving(&self, peer: PeerId, score: u32, reason: &str) {
        self.events.lock().push(RelayEvent::Misbehaving {
            peer,
            score,
            reason: reason.to_string(),
        });
    }

    async fn received_response(&self, peer: PeerId, inventory: Inventory) {
        self.events
            .lock()
            .push(RelayEvent::ReceivedResponse { peer, inventory });
    }
}

/// Chain manager stand-in that records enforced blocks.
#[derive(Default)]
pub struct RecordingEnforcer {
    enforced: Mutex<Vec<BlockRef>>,
}

impl RecordingEnforcer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enforced(&self) -> Vec<BlockRef> {
        self.enforced.lock().clone()
    }
}

#[async_trait]
impl ChainEnforcer for RecordingEnforcer {
    async fn enforce_best_chain_lock(&self, block: BlockRef) -> ChainLockResult<()> {
        self.enforced.lock().push(block);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_chain_ancestor_walk() {
        let chain = InMemoryChain::new();
        let blocks = chain.extend(&chain.genesis(), 5, 0);
        assert_eq!(chain.active_tip(), Some(blocks[4]));
        assert_eq!(chain.ancestor(&blocks[4], 2), Some(blocks[1]));
        assert_eq!(chain.ancestor(&blocks[4], 0), Some(chain.genesis()));
        assert_eq!(chain.ancestor(&blocks[4], 5), Some(blocks[4]));
        assert_eq!(chain.ancestor(&blocks[4], 6), None);
        assert_eq!(chain.parent(&blocks[0]), Some(chain.genesis()));
        assert_eq!(chain.parent(&chain.genesis()), None);
    }

    #[test]
    fn test_shorter_fork_keeps_tip() {
        let chain = InMemoryChain::new();
        let main = chain.extend(&chain.genesis(), 5, 0);
        let fork = chain.extend(&main[1], 2, 1);
        assert_eq!(chain.active_tip(), Some(main[4]));
        assert_ne!(fork[0].hash, main[2].hash);
        assert_eq!(chain.ancestor(&fork[1], 2), Some(main[1]));
    }

    #[test]
    fn test_child_ref_matches_connect() {
        let chain = InMemoryChain::new();
        let expected = InMemoryChain::child_ref(&chain.genesis(), 3);
        assert_eq!(chain.lookup_block(&expected.hash), None);
        assert_eq!(chain.connect(&chain.genesis(), 3), expected);
        assert_eq!(chain.lookup_block(&expected.hash), Some(expected));
    }

    #[test]
    fn test_signing_service_delivers_to_listeners() {
        let keyring = QuorumKeyring::from_seed(1, 2).unwrap();
        let signing = LocalSigningService::with_member_keys(keyring.member_keys(&[1]));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = signing.register_recovered_sigs_listener(tx);

        let quorums = keyring.quorums();
        let request_id = [5u8; 32];
        let msg_hash = [6u8; 32];
        assert!(!signing.async_sign_if_member(LlmqType::CHAIN_LOCKS, &request_id, &msg_hash, &quorums[0].quorum_hash));
        assert!(signing.async_sign_if_member(LlmqType::CHAIN_LOCKS, &request_id, &msg_hash, &quorums[1].quorum_hash));

        let recovered = rx.try_recv().unwrap();
        assert_eq!(recovered.id, request_id);
        assert!(signing.has_recovered_sig(LlmqType::CHAIN_LOCKS, &request_id));

        signing.unregister_recovered_sigs_listener(id);
        assert_eq!(signing.listener_count(), 0);
    }

    #[test]
    fn test_keyring_share_has_one_signer() {
        let keyring = QuorumKeyring::from_seed(1, 4).unwrap();
        let share = keyring.sign_share(LlmqType::CHAIN_LOCKS, 2, 10, [1u8; 32]);
        assert_eq!(share.signer_index(), Some(2));
        assert_eq!(share.signer_count(), 1);
        assert_eq!(share.signers.len(), 4);
    }

    #[tokio::test]
    async fn test_filtered_relay_skips_light_and_masternode_peers() {
        let peer = |n: u8, light: bool, masternode: bool| PeerInfo {
            node_id: shared_types::NodeId([n; 32]),
            is_light_client: light,
            is_masternode_connection: masternode,
        };
        let relay = RecordingRelay::new(vec![
            peer(1, false, false),
            peer(2, true, false),
            peer(3, false, true),
        ]);
        let inventory = Inventory::chain_lock([9u8; 32]);
        relay
            .relay_inventory_filtered(inventory, PeerInfo::is_full_relay_peer)
            .await;

        assert_eq!(
            relay.events(),
            vec![RelayEvent::Filtered {
                inventory,
                peers: vec![shared_types::NodeId([1; 32])],
            }]
        );
    }
}
