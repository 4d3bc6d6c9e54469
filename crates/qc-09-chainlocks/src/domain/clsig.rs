//! # Chain-Lock Signature
//!
//! A `ChainLockSig` is either a single-quorum share (zero or one signer bit)
//! or an aggregate (more than one bit), locking `block_hash` at `height`.
//!
//! ## Wire Format (`CLSIG`)
//!
//! bincode over [`ClsigWire`]: `height: i32`, `block_hash: [u8; 32]`,
//! `signer_bits: u16`, packed signer bytes (LSB first), 96-byte signature.

use crate::error::{ChainLockError, ChainLockResult};
use bitvec::prelude::*;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use shared_crypto::{sha256d, BLS_SIGNATURE_LEN};
use shared_types::{short_hex, Hash, ZERO_HASH};
use std::fmt;

/// Which of the signing active quorums contributed, indexed by scan position.
pub type SignerBits = BitVec<u8, Lsb0>;

/// Compressed BLS signature bytes.
pub type SignatureBytes = [u8; BLS_SIGNATURE_LEN];

/// Chain-lock signature (share or aggregate).
#[derive(Clone, PartialEq, Eq)]
pub struct ChainLockSig {
    pub height: i32,
    pub block_hash: Hash,
    pub signers: SignerBits,
    pub signature: SignatureBytes,
}

impl Default for ChainLockSig {
    fn default() -> Self {
        Self {
            height: -1,
            block_hash: ZERO_HASH,
            signers: SignerBits::new(),
            signature: [0u8; BLS_SIGNATURE_LEN],
        }
    }
}

impl ChainLockSig {
    pub fn new(height: i32, block_hash: Hash, signers: SignerBits, signature: SignatureBytes) -> Self {
        Self {
            height,
            block_hash,
            signers,
            signature,
        }
    }

    /// The "no lock" value: height -1 and a zero hash.
    pub fn is_null(&self) -> bool {
        self.height == -1 && self.block_hash == ZERO_HASH
    }

    /// Number of set signer bits.
    pub fn signer_count(&self) -> usize {
        self.signers.count_ones()
    }

    /// Zero or one signer bit set.
    pub fn is_share(&self) -> bool {
        self.signer_count() <= 1
    }

    /// Strictly taller than `other`.
    pub fn is_better_than(&self, other: &ChainLockSig) -> bool {
        self.height > other.height
    }

    /// Scan index of the single signer, for shares.
    pub fn signer_index(&self) -> Option<usize> {
        self.signers.first_one()
    }

    /// Packed signer bitmap as hex.
    pub fn signers_hex(&self) -> String {
        hex::encode(self.signers.as_raw_slice())
    }

    /// Serialize to the `CLSIG` wire payload.
    pub fn encode(&self) -> ChainLockResult<Vec<u8>> {
        let signer_bits = u16::try_from(self.signers.len()).map_err(|_| ChainLockError::Encode {
            reason: format!("signer bitmap too long: {}", self.signers.len()),
        })?;
        let mut packed = self.signers.clone();
        packed.set_uninitialized(false);
        let wire = ClsigWire {
            height: self.height,
            block_hash: self.block_hash,
            signer_bits,
            signers: packed.into_vec(),
            signature: self.signature,
        };
        bincode::serialize(&wire).map_err(|e| ChainLockError::Encode {
            reason: e.to_string(),
        })
    }

    /// Parse a `CLSIG` wire payload.
    ///
    /// Rejects trailing bytes, a packed length that disagrees with the bit
    /// count, and set padding bits, so a given lock has exactly one encoding.
    pub fn decode(bytes: &[u8]) -> ChainLockResult<Self> {
        let wire: ClsigWire = bincode::deserialize(bytes).map_err(|e| ChainLockError::Decode {
            reason: e.to_string(),
        })?;

        let consumed = bincode::serialized_size(&wire).map_err(|e| ChainLockError::Decode {
            reason: e.to_string(),
        })?;
        if consumed != bytes.len() as u64 {
            return Err(ChainLockError::Decode {
                reason: format!("{} trailing bytes", (bytes.len() as u64).saturating_sub(consumed)),
            });
        }

        let bit_count = wire.signer_bits as usize;
        if wire.signers.len() != bit_count.div_ceil(8) {
            return Err(ChainLockError::Decode {
                reason: format!(
                    "{} signer bytes for {} signer bits",
                    wire.signers.len(),
                    bit_count
                ),
            });
        }

        let raw = SignerBits::from_vec(wire.signers);
        if raw[bit_count..].any() {
            return Err(ChainLockError::Decode {
                reason: "signer padding bits set".to_string(),
            });
        }
        let mut signers = raw;
        signers.truncate(bit_count);

        Ok(Self {
            height: wire.height,
            block_hash: wire.block_hash,
            signers,
            signature: wire.signature,
        })
    }

    /// Content hash (sha256d of the wire encoding), used as the inventory hash.
    pub fn content_hash(&self) -> ChainLockResult<Hash> {
        self.encode().map(|bytes| sha256d(&bytes))
    }

    /// Inventory announcing this lock.
    pub fn inventory(&self) -> ChainLockResult<Inventory> {
        self.content_hash().map(Inventory::chain_lock)
    }
}

impl fmt::Display for ChainLockSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ChainLockSig(height={}, block_hash={}, signers: hex={} size={} count={})",
            self.height,
            short_hex(&self.block_hash),
            self.signers_hex(),
            self.signers.len(),
            self.signer_count()
        )
    }
}

impl fmt::Debug for ChainLockSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[serde_as]
#[derive(Serialize, Deserialize)]
struct ClsigWire {
    height: i32,
    block_hash: [u8; 32],
    signer_bits: u16,
    signers: Vec<u8>,
    #[serde_as(as = "Bytes")]
    signature: [u8; BLS_SIGNATURE_LEN],
}

/// Inventory object kinds this subsystem announces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InventoryKind {
    /// `MSG_CLSIG`
    ChainLock,
}

/// Announce/request handle for a network object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Inventory {
    pub kind: InventoryKind,
    pub hash: Hash,
}

impl Inventory {
    pub fn chain_lock(hash: Hash) -> Self {
        Self {
            kind: InventoryKind::ChainLock,
            hash,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_clsig(height: i32, bits: &[usize], width: usize) -> ChainLockSig {
        let mut signers = bitvec![u8, Lsb0; 0; width];
        for &bit in bits {
            signers.set(bit, true);
        }
        ChainLockSig::new(height, [height as u8; 32], signers, [7u8; BLS_SIGNATURE_LEN])
    }

    #[test]
    fn test_default_is_null() {
        let clsig = ChainLockSig::default();
        assert!(clsig.is_null());
        assert_eq!(clsig.height, -1);
        assert!(!test_clsig(0, &[], 4).is_null());
    }

    #[test]
    fn test_better_than_orders_by_height() {
        let low = test_clsig(10, &[0], 4);
        let high = test_clsig(11, &[1], 4);
        assert!(high.is_better_than(&low));
        assert!(!low.is_better_than(&high));
        assert!(!low.is_better_than(&low.clone()));
        assert!(low.is_better_than(&ChainLockSig::default()));
    }

    #[test]
    fn test_wire_decode_restores_fields() {
        let clsig = test_clsig(100, &[0, 2, 9], 10);
        let bytes = clsig.encode().unwrap();
        let decoded = ChainLockSig::decode(&bytes).unwrap();
        assert_eq!(decoded, clsig);
        assert_eq!(decoded.signer_count(), 3);
        assert_eq!(decoded.signers.len(), 10);
    }

    #[test]
    fn test_oversized_bitmap_is_an_encode_error() {
        let clsig = test_clsig(1, &[], u16::MAX as usize + 1);
        assert!(matches!(clsig.encode(), Err(ChainLockError::Encode { .. })));
        assert!(matches!(clsig.content_hash(), Err(ChainLockError::Encode { .. })));
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let mut bytes = test_clsig(5, &[1], 4).encode().unwrap();
        bytes.push(0);
        assert!(matches!(
            ChainLockSig::decode(&bytes),
            Err(ChainLockError::Decode { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_truncated_payload() {
        let bytes = test_clsig(5, &[1], 4).encode().unwrap();
        assert!(ChainLockSig::decode(&bytes[..bytes.len() - 1]).is_err());
        assert!(ChainLockSig::decode(&[]).is_err());
    }

    #[test]
    fn test_decode_rejects_padding_bits() {
        let clsig = test_clsig(5, &[1], 4);
        let mut bytes = clsig.encode().unwrap();
        // height(4) + hash(32) + bit count(2) + vec length(8) -> first signer byte
        let signer_byte = 4 + 32 + 2 + 8;
        bytes[signer_byte] |= 0x80;
        assert!(ChainLockSig::decode(&bytes).is_err());
    }

    #[test]
    fn test_content_hash_tracks_signers() {
        let a = test_clsig(100, &[0], 4);
        let b = test_clsig(100, &[1], 4);
        assert_ne!(a.content_hash().unwrap(), b.content_hash().unwrap());
        assert_eq!(a.content_hash().unwrap(), a.clone().content_hash().unwrap());
        assert_eq!(a.inventory().unwrap().kind, InventoryKind::ChainLock);
    }

    #[test]
    fn test_display_reports_signers() {
        let rendered = test_clsig(42, &[0, 3], 4).to_string();
        assert!(rendered.contains("height=42"));
        assert!(rendered.contains("hex=09"));
        assert!(rendered.contains("size=4"));
        assert!(rendered.contains("count=2"));
    }
}
