//! Domain layer: chain-lock values, request ids, quorums and verification.

pub mod clsig;
pub mod enforcement;
pub mod quorum;
pub mod request_id;
pub mod verifier;

pub use clsig::{ChainLockSig, Inventory, InventoryKind, SignatureBytes, SignerBits};
pub use enforcement::EnforcementView;
pub use quorum::{build_sign_hash, LlmqType, Quorum, RecoveredSig};
pub use request_id::{RequestId, RequestIdStep, CLSIG_REQUEST_ID_PREFIX};
pub use verifier::QuorumVerifier;
