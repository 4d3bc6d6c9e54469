//! # Node Runtime Library
//!
//! Exposes the devnet wiring used by the `node-runtime` binary so it can be
//! driven from tests.
//!
//! ## Architectural Patterns
//!
//! - **Hexagonal Architecture**: the ChainLocks core only sees its ports; this
//!   crate supplies the adapters.
//! - **Actor Ownership**: all chain-lock state lives in the service task; the
//!   runtime talks to it through a cloneable handle.

pub mod devnet;

pub use devnet::{DevnetConfig, DevnetNode};
