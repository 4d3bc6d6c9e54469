//! Request id derivation
//!
//! Every node derives the same request id for "the i-th scanned quorum at
//! height H" without coordination, so quorums can sign blind to each other and
//! verifiers can match a share to its quorum by position.

use shared_crypto::Sha256dHasher;
use shared_types::Hash;

/// Identifier correlating a signing request with its recovered signature.
pub type RequestId = Hash;

/// Domain tag mixed into every chain-lock request id.
pub const CLSIG_REQUEST_ID_PREFIX: &str = "clsig";

/// Position in the deterministic quorum scan for one height.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestIdStep {
    pub height: i32,
    pub step: i32,
}

impl RequestIdStep {
    /// First step at `height`.
    pub fn new(height: i32) -> Self {
        Self { height, step: 0 }
    }

    /// `sha256d(len || "clsig" || height_le || step_le)`
    pub fn request_id(&self) -> RequestId {
        let mut hasher = Sha256dHasher::new();
        hasher
            .update(&[CLSIG_REQUEST_ID_PREFIX.len() as u8])
            .update(CLSIG_REQUEST_ID_PREFIX.as_bytes())
            .update(&self.height.to_le_bytes())
            .update(&self.step.to_le_bytes());
        hasher.finalize()
    }

    /// Move to the next scanned quorum.
    pub fn advance(&mut self) {
        self.step += 1;
    }

    /// Request ids for steps 0, 1, 2, ... at `height`.
    pub fn stream(height: i32) -> impl Iterator<Item = RequestId> {
        let mut cursor = Self::new(height);
        std::iter::from_fn(move || {
            let id = cursor.request_id();
            cursor.advance();
            Some(id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id_is_deterministic() {
        let a = RequestIdStep { height: 100, step: 2 };
        let b = RequestIdStep { height: 100, step: 2 };
        assert_eq!(a.request_id(), b.request_id());
    }

    #[test]
    fn test_request_id_separates_height_and_step() {
        let base = RequestIdStep { height: 100, step: 0 }.request_id();
        assert_ne!(base, RequestIdStep { height: 100, step: 1 }.request_id());
        assert_ne!(base, RequestIdStep { height: 101, step: 0 }.request_id());
    }

    #[test]
    fn test_stream_matches_manual_advance() {
        let mut step = RequestIdStep::new(77);
        let streamed: Vec<RequestId> = RequestIdStep::stream(77).take(4).collect();
        for id in streamed {
            assert_eq!(id, step.request_id());
            step.advance();
        }
        assert_eq!(step.step, 4);
    }
}
