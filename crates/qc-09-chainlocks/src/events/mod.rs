//! Events module for the ChainLocks subsystem

pub mod incoming;
pub mod outgoing;

pub use incoming::{ChainLockCommand, MessageOrigin, Reply};
pub use outgoing::ChainLockAction;
