//! End-to-end flows through the ChainLocks service task.

use qc_09_chainlocks::adapters::{
    InMemoryChain, LocalSigningService, QuorumKeyring, RecordingEnforcer, RecordingRelay,
    RelayEvent, StaticQuorumScanner, StaticToggle,
};
use qc_09_chainlocks::{
    ChainLockApi, ChainLockConfig, ChainLockError, ChainLockHandle, ChainLockService,
    Collaborators, LlmqType, ProcessOutcome,
};
use shared_types::{BlockRef, NodeId, PeerId, PeerInfo};
use std::sync::Arc;
use tokio::task::JoinHandle;

const LLMQ: LlmqType = LlmqType::CHAIN_LOCKS;

struct Node {
    handle: ChainLockHandle,
    task: JoinHandle<()>,
    keyring: QuorumKeyring,
    chain: Arc<InMemoryChain>,
    signing: Arc<LocalSigningService>,
    relay: Arc<RecordingRelay>,
    enforcer: Arc<RecordingEnforcer>,
    blocks: Vec<BlockRef>,
}

impl Node {
    fn block(&self, height: i32) -> BlockRef {
        self.blocks[(height - 1) as usize]
    }
}

fn test_peer(n: u8) -> PeerId {
    NodeId([n; 32])
}

fn peers() -> Vec<PeerInfo> {
    vec![
        PeerInfo {
            node_id: test_peer(1),
            is_light_client: false,
            is_masternode_connection: false,
        },
        PeerInfo {
            node_id: test_peer(2),
            is_light_client: true,
            is_masternode_connection: false,
        },
        PeerInfo {
            node_id: test_peer(3),
            is_light_client: false,
            is_masternode_connection: true,
        },
    ]
}

fn start_node(count: usize, members: &[usize], tweak: impl FnOnce(&mut ChainLockConfig)) -> Node {
    let keyring = QuorumKeyring::from_seed(42, count).unwrap();
    let chain = Arc::new(InMemoryChain::new());
    let blocks = chain.extend(&chain.genesis(), 100, 0);
    let signing = Arc::new(LocalSigningService::with_member_keys(keyring.member_keys(members)));
    let relay = Arc::new(RecordingRelay::new(peers()));
    let enforcer = Arc::new(RecordingEnforcer::new());

    let mut config = ChainLockConfig {
        signing_active_quorum_count: count,
        ..Default::default()
    };
    tweak(&mut config);

    let collaborators = Collaborators {
        quorums: Arc::new(StaticQuorumScanner::new(keyring.quorums())),
        signing: signing.clone(),
        chain: chain.clone(),
        toggle: Arc::new(StaticToggle::new(true)),
        relay: relay.clone(),
        enforcer: enforcer.clone(),
    };
    let (handle, task) = ChainLockService::spawn(config, collaborators).unwrap();

    Node {
        handle,
        task,
        keyring,
        chain,
        signing,
        relay,
        enforcer,
        blocks,
    }
}

#[tokio::test]
async fn test_two_shares_of_three_become_enforced_lock() {
    let node = start_node(3, &[], |_| {});
    let block = node.block(100);

    let first = node.keyring.sign_share(LLMQ, 0, 100, block.hash);
    let outcome = node
        .handle
        .process_message(test_peer(1), first.encode().unwrap())
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ProcessOutcome::ShareAccepted {
            quorum_index: 0,
            promoted: false
        }
    );
    assert!(node.handle.best_chain_lock().await.unwrap().is_null());
    assert_eq!(
        node.handle
            .chain_lock_by_hash(first.content_hash().unwrap())
            .await
            .unwrap(),
        Some(first.clone())
    );

    let second = node.keyring.sign_share(LLMQ, 1, 100, block.hash);
    let outcome = node
        .handle
        .process_message(test_peer(1), second.encode().unwrap())
        .await
        .unwrap();
    assert!(outcome.promoted());

    let best = node.handle.best_chain_lock().await.unwrap();
    assert_eq!(best.height, 100);
    assert_eq!(best.signers.iter_ones().collect::<Vec<_>>(), vec![0, 1]);
    assert_eq!(node.relay.relayed_to_all(), vec![best.inventory().unwrap()]);
    assert_eq!(node.enforcer.enforced(), vec![block]);
    assert!(node.handle.has_chain_lock(100, &block.hash));
    assert_eq!(node.handle.best_chain_lock_shares().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_share_relayed_only_to_full_nodes() {
    let node = start_node(3, &[], |_| {});
    let share = node.keyring.sign_share(LLMQ, 2, 100, node.block(100).hash);
    node.handle
        .process_message(test_peer(1), share.encode().unwrap())
        .await
        .unwrap();

    let filtered: Vec<RelayEvent> = node
        .relay
        .events()
        .into_iter()
        .filter(|event| matches!(event, RelayEvent::Filtered { .. }))
        .collect();
    assert_eq!(
        filtered,
        vec![RelayEvent::Filtered {
            inventory: share.inventory().unwrap(),
            peers: vec![test_peer(1)],
        }]
    );
    assert!(node.relay.events().contains(&RelayEvent::ReceivedResponse {
        peer: test_peer(1),
        inventory: share.inventory().unwrap(),
    }));
}

#[tokio::test]
async fn test_stale_aggregate_is_not_penalized() {
    let node = start_node(3, &[], |_| {});
    let lock = node.keyring.sign_aggregate(LLMQ, &[0, 1], 100, node.block(100).hash);
    node.handle
        .process_message(test_peer(1), lock.encode().unwrap())
        .await
        .unwrap();

    let stale = node.keyring.sign_aggregate(LLMQ, &[1, 2], 50, node.block(50).hash);
    let outcome = node
        .handle
        .process_message(test_peer(1), stale.encode().unwrap())
        .await
        .unwrap();

    assert_eq!(outcome, ProcessOutcome::Stale);
    assert!(node.relay.misbehaviour().is_empty());
    assert_eq!(node.handle.best_chain_lock().await.unwrap(), lock);
    assert!(!node.handle.already_have(stale.content_hash().unwrap()).await.unwrap());
}

#[tokio::test]
async fn test_far_future_aggregate_reports_misbehaviour() {
    let node = start_node(3, &[], |config| config.sign_height_offset = 20);
    let future = node.keyring.sign_aggregate(LLMQ, &[0, 1], 150, [0x15; 32]);

    let result = node
        .handle
        .process_message(test_peer(1), future.encode().unwrap())
        .await;

    assert!(matches!(result, Err(ChainLockError::FutureHeight { .. })));
    assert_eq!(node.relay.misbehaviour(), vec![(test_peer(1), 10)]);
    assert!(node.handle.best_chain_lock().await.unwrap().is_null());
}

#[tokio::test]
async fn test_duplicate_delivery_is_idempotent() {
    let node = start_node(3, &[], |_| {});
    let lock = node.keyring.sign_aggregate(LLMQ, &[0, 2], 100, node.block(100).hash);
    let payload = lock.encode().unwrap();

    node.handle
        .process_message(test_peer(1), payload.clone())
        .await
        .unwrap();
    let outcome = node
        .handle
        .process_message(test_peer(3), payload)
        .await
        .unwrap();

    assert_eq!(outcome, ProcessOutcome::Duplicate);
    assert_eq!(node.relay.relayed_to_all().len(), 1);
    assert_eq!(node.enforcer.enforced().len(), 1);
}

#[tokio::test]
async fn test_conflicting_fork_detected() {
    let node = start_node(3, &[], |_| {});
    let lock = node.keyring.sign_aggregate(LLMQ, &[0, 1], 100, node.block(100).hash);
    node.handle
        .process_message(test_peer(1), lock.encode().unwrap())
        .await
        .unwrap();

    let fork = node.chain.extend(&node.block(90), 3, 7);
    for block in &fork {
        assert!(node.handle.has_conflicting_chain_lock(block.height, &block.hash));
        assert!(!node.handle.has_chain_lock(block.height, &block.hash));
    }
    for height in [1, 90, 93, 100] {
        let block = node.block(height);
        assert!(node.handle.has_chain_lock(height, &block.hash));
    }
}

#[tokio::test]
async fn test_late_header_promotes_stored_lock() {
    let node = start_node(3, &[], |_| {});
    let next = InMemoryChain::child_ref(&node.block(100), 1);
    let lock = node.keyring.sign_aggregate(LLMQ, &[0, 1, 2], next.height, next.hash);

    let outcome = node
        .handle
        .process_message(test_peer(1), lock.encode().unwrap())
        .await
        .unwrap();
    assert_eq!(outcome, ProcessOutcome::AggregateAccepted { promoted: false });
    assert!(node.enforcer.enforced().is_empty());
    assert_eq!(node.handle.most_recent_chain_lock().await.unwrap(), lock);

    let block = node.chain.connect(&node.block(100), 1);
    node.handle.accepted_block_header(block).await.unwrap();
    assert_eq!(node.handle.best_chain_lock().await.unwrap(), lock);

    node.handle.updated_block_tip(block, false).await.unwrap();
    assert_eq!(node.enforcer.enforced(), vec![block]);
    assert!(node.handle.has_chain_lock(block.height, &block.hash));
}

#[tokio::test]
async fn test_masternode_locks_its_own_tip() {
    let node = start_node(4, &[0, 1, 2, 3], |config| config.masternode_mode = true);
    let tip = node.chain.connect(&node.block(100), 0);

    node.handle.updated_block_tip(tip, false).await.unwrap();

    let best = node.handle.best_chain_lock().await.unwrap();
    assert_eq!(best.height, tip.height);
    assert_eq!(best.block_hash, tip.hash);
    assert_eq!(best.signer_count(), 3);
    assert_eq!(node.signing.requests().len(), 4);
    assert_eq!(node.enforcer.enforced(), vec![tip]);
    assert!(node.relay.misbehaviour().is_empty());
}

#[tokio::test]
async fn test_initial_download_skips_signing() {
    let node = start_node(3, &[0, 1, 2], |config| config.masternode_mode = true);
    node.handle
        .updated_block_tip(node.block(100), true)
        .await
        .unwrap();
    assert!(node.signing.requests().is_empty());
    assert!(node.handle.best_chain_lock().await.unwrap().is_null());
}

#[tokio::test]
async fn test_shutdown_stops_service() {
    let node = start_node(3, &[], |_| {});
    assert_eq!(node.signing.listener_count(), 1);

    node.handle.shutdown().await.unwrap();
    node.task.await.unwrap();

    assert_eq!(node.signing.listener_count(), 0);
    assert!(matches!(
        node.handle.best_chain_lock().await,
        Err(ChainLockError::ServiceStopped)
    ));
    assert!(!node.handle.has_chain_lock(100, &[0u8; 32]));
}

#[tokio::test]
async fn test_invalid_config_rejected() {
    let keyring = QuorumKeyring::from_seed(1, 1).unwrap();
    let chain = Arc::new(InMemoryChain::new());
    let collaborators = Collaborators {
        quorums: Arc::new(StaticQuorumScanner::new(keyring.quorums())),
        signing: Arc::new(LocalSigningService::new()),
        chain,
        toggle: Arc::new(StaticToggle::new(true)),
        relay: Arc::new(RecordingRelay::default()),
        enforcer: Arc::new(RecordingEnforcer::new()),
    };
    let config = ChainLockConfig {
        signing_active_quorum_count: 0,
        ..Default::default()
    };
    assert!(matches!(
        ChainLockService::spawn(config, collaborators),
        Err(ChainLockError::InvalidConfig { .. })
    ));
}
