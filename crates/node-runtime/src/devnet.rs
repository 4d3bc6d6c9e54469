//! # Devnet Wiring
//!
//! A single-node network: the local node holds the keys of every chain-lock
//! quorum, mines blocks onto an in-memory chain and locks each new tip through
//! the regular self-signing loop.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use qc_09_chainlocks::adapters::{
    InMemoryChain, LocalSigningService, QuorumKeyring, RecordingEnforcer, RecordingRelay,
    StaticQuorumScanner, StaticToggle,
};
use qc_09_chainlocks::{
    ChainLockApi, ChainLockConfig, ChainLockHandle, ChainLockService, ChainLockSig, ChainView,
    Collaborators,
};
use shared_types::{BlockRef, NodeId, PeerInfo};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Devnet parameters on top of the chain-lock configuration.
#[derive(Clone, Debug)]
pub struct DevnetConfig {
    pub chainlocks: ChainLockConfig,
    /// Seed for the quorum keyring
    pub keyring_seed: u8,
    /// Blocks to mine before exiting
    pub blocks: usize,
    pub block_interval: Duration,
    /// Simulated peers attached to the relay
    pub peer_count: usize,
}

impl Default for DevnetConfig {
    fn default() -> Self {
        Self {
            chainlocks: ChainLockConfig {
                masternode_mode: true,
                ..Default::default()
            },
            keyring_seed: 1,
            blocks: 20,
            block_interval: Duration::from_millis(500),
            peer_count: 4,
        }
    }
}

impl DevnetConfig {
    /// Load from `QC_CLSIG_*` plus the devnet variables:
    ///
    /// - `QC_DEVNET_SEED`: Keyring seed (default: 1)
    /// - `QC_DEVNET_BLOCKS`: Blocks to mine (default: 20)
    /// - `QC_DEVNET_BLOCK_MS`: Milliseconds between blocks (default: 500)
    /// - `QC_DEVNET_PEERS`: Simulated peers (default: 4)
    ///
    /// Masternode mode is on unless `QC_MASTERNODE` says otherwise.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let mut chainlocks = ChainLockConfig::from_env();
        if env::var_os("QC_MASTERNODE").is_none() {
            chainlocks.masternode_mode = true;
        }

        Self {
            chainlocks,
            keyring_seed: env_parse("QC_DEVNET_SEED").unwrap_or(defaults.keyring_seed),
            blocks: env_parse("QC_DEVNET_BLOCKS").unwrap_or(defaults.blocks),
            block_interval: env_parse("QC_DEVNET_BLOCK_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.block_interval),
            peer_count: env_parse("QC_DEVNET_PEERS").unwrap_or(defaults.peer_count),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Running devnet node.
pub struct DevnetNode {
    handle: ChainLockHandle,
    task: JoinHandle<()>,
    chain: Arc<InMemoryChain>,
    relay: Arc<RecordingRelay>,
    enforcer: Arc<RecordingEnforcer>,
    mined: u64,
}

impl DevnetNode {
    /// Build the collaborators and spawn the chain-lock service.
    pub fn start(config: &DevnetConfig) -> Result<Self> {
        let count = config.chainlocks.signing_active_quorum_count;
        let keyring = QuorumKeyring::from_seed(config.keyring_seed, count)
            .context("Failed to derive quorum keys")?;

        let members: Vec<usize> = if config.chainlocks.masternode_mode {
            (0..count).collect()
        } else {
            Vec::new()
        };
        let peers = (0..config.peer_count)
            .map(|i| PeerInfo {
                node_id: NodeId(rand::random()),
                is_light_client: i % 4 == 3,
                is_masternode_connection: false,
            })
            .collect();

        let chain = Arc::new(InMemoryChain::new());
        let relay = Arc::new(RecordingRelay::new(peers));
        let enforcer = Arc::new(RecordingEnforcer::new());
        let collaborators = Collaborators {
            quorums: Arc::new(StaticQuorumScanner::new(keyring.quorums())),
            signing: Arc::new(LocalSigningService::with_member_keys(
                keyring.member_keys(&members),
            )),
            chain: chain.clone(),
            toggle: Arc::new(StaticToggle::new(true)),
            relay: relay.clone(),
            enforcer: enforcer.clone(),
        };

        let (handle, task) = ChainLockService::spawn(config.chainlocks.clone(), collaborators)
            .context("Failed to start ChainLocks service")?;

        info!(
            quorums = count,
            members = members.len(),
            genesis = %chain.genesis(),
            "Devnet node started"
        );

        Ok(Self {
            handle,
            task,
            chain,
            relay,
            enforcer,
            mined: 0,
        })
    }

    pub fn handle(&self) -> &ChainLockHandle {
        &self.handle
    }

    /// Extend the active tip by one block and announce it.
    pub async fn mine_block(&mut self) -> Result<BlockRef> {
        let parent = self
            .chain
            .active_tip()
            .context("Chain has no active tip")?;
        let block = self.chain.connect(&parent, 0);
        self.mined += 1;

        self.handle.accepted_block_header(block).await?;
        self.handle.updated_block_tip(block, false).await?;
        debug!(block = %block, "Mined block");
        Ok(block)
    }

    pub async fn best_chain_lock(&self) -> Result<ChainLockSig> {
        Ok(self.handle.best_chain_lock().await?)
    }

    pub fn enforced_blocks(&self) -> Vec<BlockRef> {
        self.enforcer.enforced()
    }

    /// Stop the service and report totals.
    pub async fn shutdown(self) -> Result<()> {
        self.handle.shutdown().await?;
        self.task.await.context("ChainLocks service task failed")?;

        info!(
            mined = self.mined,
            enforced = self.enforcer.enforced().len(),
            relayed = self.relay.relayed_to_all().len(),
            "Devnet node stopped"
        );
        Ok(())
    }
}
