//! Signing quorums and recovered signatures

use super::clsig::SignatureBytes;
use super::request_id::RequestId;
use serde::{Deserialize, Serialize};
use shared_crypto::{BlsPublicKey, Sha256dHasher};
use shared_types::Hash;

/// Quorum type identifier (network parameter set).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LlmqType(pub u8);

impl LlmqType {
    /// Quorum type that signs chain locks.
    pub const CHAIN_LOCKS: LlmqType = LlmqType(2);
}

/// A quorum active at some height, as returned by the quorum scanner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Quorum {
    /// Hash identifying the quorum (its commitment block hash)
    pub quorum_hash: Hash,
    /// Aggregate public key of the quorum's members
    pub public_key: BlsPublicKey,
}

impl Quorum {
    pub fn new(quorum_hash: Hash, public_key: BlsPublicKey) -> Self {
        Self {
            quorum_hash,
            public_key,
        }
    }

    /// Message this quorum signs for `request_id` over `msg_hash`.
    pub fn sign_hash(&self, llmq_type: LlmqType, request_id: &RequestId, msg_hash: &Hash) -> Hash {
        build_sign_hash(llmq_type, &self.quorum_hash, request_id, msg_hash)
    }
}

/// `sha256d(llmq_type || quorum_hash || request_id || msg_hash)`
pub fn build_sign_hash(
    llmq_type: LlmqType,
    quorum_hash: &Hash,
    request_id: &RequestId,
    msg_hash: &Hash,
) -> Hash {
    let mut hasher = Sha256dHasher::new();
    hasher
        .update(&[llmq_type.0])
        .update(quorum_hash)
        .update(request_id)
        .update(msg_hash);
    hasher.finalize()
}

/// Threshold signature reconstructed by the signing service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecoveredSig {
    pub llmq_type: LlmqType,
    pub quorum_hash: Hash,
    pub id: RequestId,
    pub msg_hash: Hash,
    pub signature: SignatureBytes,
}
