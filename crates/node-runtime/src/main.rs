//! # Quantum-Chain Devnet Node
//!
//! Runs the ChainLocks subsystem against a locally mined chain.
//!
//! ## Startup Sequence
//!
//! 1. Initialize logging (`RUST_LOG`, default `info`)
//! 2. Load configuration from the environment
//! 3. Spawn the ChainLocks service with in-memory collaborators
//! 4. Mine blocks until the target count or Ctrl+C
//! 5. Shut the service down

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use node_runtime::{DevnetConfig, DevnetNode};

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let config = DevnetConfig::from_env();
    info!("===========================================");
    info!("  Quantum-Chain ChainLocks Devnet v0.1.0");
    info!("===========================================");

    let mut node = DevnetNode::start(&config)?;
    let mut interval = tokio::time::interval(config.block_interval);

    for _ in 0..config.blocks {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, shutting down");
                break;
            }
        }

        let block = node.mine_block().await?;
        let best = node.best_chain_lock().await?;
        if best.block_hash == block.hash {
            info!(
                height = best.height,
                block_hash = %hex::encode(best.block_hash),
                signers = best.signer_count(),
                "Tip locked"
            );
        } else {
            info!(block = %block, best_height = best.height, "Tip not locked");
        }
    }

    node.shutdown().await
}
