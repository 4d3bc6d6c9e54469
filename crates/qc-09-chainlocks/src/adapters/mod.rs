//! Adapters

pub mod memory;

pub use memory::{
    InMemoryChain, LocalSigningService, QuorumKeyring, RecordingEnforcer, RecordingRelay,
    RelayEvent, StaticQuorumScanner, StaticToggle,
};
