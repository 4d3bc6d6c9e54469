//! # Shared Crypto - Chain-Lock Cryptographic Primitives
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `bls` | BLS12-381 (min-pk) | Quorum signatures, aggregation |
//! | `hashing` | Double SHA-256 | Request ids, sign hashes, inventory hashes |
//!
//! ## Security Properties
//!
//! - **BLS**: signatures over distinct messages from distinct quorums combine
//!   into one aggregate verified against the list of (key, message) pairs
//! - **SHA-256d**: length-extension resistant content hashing

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bls;
pub mod errors;
pub mod hashing;

// Re-exports
pub use bls::{BlsKeyPair, BlsPublicKey, BlsSignature, BLS_PUBLIC_KEY_LEN, BLS_SIGNATURE_LEN};
pub use errors::CryptoError;
pub use hashing::{sha256d, Sha256dHasher};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
    }
}
