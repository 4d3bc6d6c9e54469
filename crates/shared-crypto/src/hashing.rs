//! # Double SHA-256 Hashing
//!
//! `SHA256(SHA256(x))`, the content hash used for request ids, quorum sign
//! hashes and inventory hashes.

use sha2::{Digest, Sha256};

/// SHA-256d output (256-bit).
pub type Hash = [u8; 32];

/// Stateful double SHA-256 hasher.
#[derive(Clone, Default)]
pub struct Sha256dHasher {
    inner: Sha256,
}

impl Sha256dHasher {
    /// Create new hasher.
    pub fn new() -> Self {
        Self {
            inner: Sha256::new(),
        }
    }

    /// Update with data.
    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        self.inner.update(data);
        self
    }

    /// Finalize and return hash.
    pub fn finalize(self) -> Hash {
        let first = self.inner.finalize();
        Sha256::digest(first).into()
    }
}

/// Hash data with SHA-256d (one-shot).
pub fn sha256d(data: &[u8]) -> Hash {
    let mut hasher = Sha256dHasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Hash the concatenation of multiple inputs.
pub fn sha256d_many(inputs: &[&[u8]]) -> Hash {
    let mut hasher = Sha256dHasher::new();
    for input in inputs {
        hasher.update(input);
    }
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        // sha256d("hello")
        let hash = sha256d(b"hello");
        assert_eq!(
            hex::encode(hash),
            "9595c9df90075148eb06860365df33584b75bff782a510c6cd4883a419833d50"
        );
    }

    #[test]
    fn test_different_inputs() {
        assert_ne!(sha256d(b"input1"), sha256d(b"input2"));
    }

    #[test]
    fn test_streaming_matches_oneshot() {
        let oneshot = sha256d(b"hello world");
        let many = sha256d_many(&[b"hello ", b"world"]);

        let mut hasher = Sha256dHasher::new();
        hasher.update(b"hello ").update(b"world");

        assert_eq!(oneshot, many);
        assert_eq!(oneshot, hasher.finalize());
    }
}
