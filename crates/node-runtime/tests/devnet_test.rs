//! Devnet node driven end to end.

use node_runtime::{DevnetConfig, DevnetNode};

#[tokio::test]
async fn test_masternode_devnet_locks_every_tip() {
    let config = DevnetConfig::default();
    let mut node = DevnetNode::start(&config).unwrap();

    let mut mined = Vec::new();
    for _ in 0..3 {
        let block = node.mine_block().await.unwrap();
        let best = node.best_chain_lock().await.unwrap();
        assert_eq!(best.height, block.height);
        assert_eq!(best.block_hash, block.hash);
        mined.push(block);
    }

    // Every tip update re-enforces the current best lock.
    let mut enforced = node.enforced_blocks();
    enforced.dedup();
    assert_eq!(enforced, mined);
    node.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_non_member_node_does_not_lock() {
    let mut config = DevnetConfig::default();
    config.chainlocks.masternode_mode = false;
    let mut node = DevnetNode::start(&config).unwrap();

    node.mine_block().await.unwrap();
    assert!(node.best_chain_lock().await.unwrap().is_null());
    assert!(node.enforced_blocks().is_empty());
    node.shutdown().await.unwrap();
}
