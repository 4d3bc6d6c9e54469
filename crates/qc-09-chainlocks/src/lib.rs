//! # qc-09-chainlocks
//!
//! Chain locks: quorum-signed block finality for a longest-chain node.
//!
//! ## Overview
//!
//! A fixed number of signing quorums each sign the block at a height. A
//! majority of those signatures, combined into one BLS aggregate, forms a
//! chain lock. Once a lock is known and enforced the node refuses to
//! reorganize away from the locked block.
//!
//! This subsystem provides:
//! - **Share verification**: single-quorum CLSIGs matched to their quorum by
//!   scan position and request id
//! - **Aggregation**: `floor(n/2) + 1` matching shares combined into one lock
//! - **Aggregate verification**: one batch check over every signing quorum
//! - **Enforcement**: best lock handed to the chain manager; `has_chain_lock`
//!   and `has_conflicting_chain_lock` for block validation
//! - **Self-signing**: masternodes request signatures over each new tip
//!
//! ## Architecture
//!
//! ```text
//! Peers ──CLSIG──→ ChainLockHandle ──command──→ service task (owns ChainLockManager)
//!                        ↑                          │
//!        has_chain_lock ─┘ (watch snapshot)         ├── reads:   QuorumScanner, ChainView
//!                                                   ├── signs:   SigningService ──recovered sig──→ service task
//!                                                   └── actions: NetworkRelay, ChainEnforcer
//! ```
//!
//! ## Activation
//!
//! ```text
//! [DISABLED] ──toggle on──→ [ENABLED] ──deployment active──→ [ENFORCED]
//!                                                           (best/most-recent locks reset on entry)
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use qc_09_chainlocks::{ChainLockConfig, ChainLockService};
//! use qc_09_chainlocks::ports::inbound::ChainLockApi;
//!
//! let (handle, task) = ChainLockService::spawn(ChainLockConfig::from_env(), collaborators)?;
//!
//! let outcome = handle.process_message(peer, payload).await?;
//! if handle.has_conflicting_chain_lock(block.height, &block.hash) {
//!     // reject the block
//! }
//! ```

pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod manager;
pub mod metrics;
pub mod ports;
pub mod service;
pub mod state;

pub use config::ChainLockConfig;
pub use domain::{
    ChainLockSig, EnforcementView, Inventory, InventoryKind, LlmqType, Quorum, QuorumVerifier,
    RecoveredSig, RequestId, RequestIdStep,
};
pub use error::{ChainLockError, ChainLockResult};
pub use events::{ChainLockAction, ChainLockCommand, MessageOrigin};
pub use manager::{ActivationState, ChainLockManager};
pub use ports::inbound::{ChainLockApi, ProcessOutcome};
pub use ports::outbound::{
    ChainEnforcer, ChainView, Collaborators, FeatureToggle, NetworkRelay, QuorumScanner,
    SigningService,
};
pub use service::{ChainLockHandle, ChainLockService};
pub use state::ChainLockState;
