//! BLS12-381 Signature Implementation
//!
//! Provides BLS signature primitives for:
//! - Key generation (random or from a 32-byte seed)
//! - Sign/verify operations
//! - Signature aggregation
//! - Aggregate verification over distinct (public key, message) pairs
//!
//! Used by qc-09-chainlocks for quorum shares and aggregated chain locks.

use blst::min_pk::{AggregateSignature, PublicKey, SecretKey, Signature};
use blst::BLST_ERROR;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::CryptoError;

/// Domain separation tag for BLS signatures
const DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_NUL_";

/// Compressed public key size in bytes.
pub const BLS_PUBLIC_KEY_LEN: usize = 48;

/// Compressed signature size in bytes.
pub const BLS_SIGNATURE_LEN: usize = 96;

/// BLS public key (48 bytes compressed)
#[derive(Clone, Debug)]
pub struct BlsPublicKey(PublicKey);

impl PartialEq for BlsPublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for BlsPublicKey {}

/// BLS signature (96 bytes)
#[derive(Clone, Debug)]
pub struct BlsSignature(Signature);

impl PartialEq for BlsSignature {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for BlsSignature {}

/// BLS key pair for signing operations
pub struct BlsKeyPair {
    secret: SecretKey,
    public: BlsPublicKey,
}

impl BlsKeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Result<Self, CryptoError> {
        let mut ikm = Zeroizing::new([0u8; 32]);
        rand::thread_rng().fill_bytes(&mut *ikm);
        Self::from_seed(&ikm)
    }

    /// Derive a key pair deterministically from 32 bytes of input key material
    pub fn from_seed(seed: &[u8; 32]) -> Result<Self, CryptoError> {
        let secret = SecretKey::key_gen(seed, &[])
            .map_err(|e| CryptoError::KeyGenerationFailed(format!("{:?}", e)))?;
        let public = BlsPublicKey(secret.sk_to_pk());
        Ok(Self { secret, public })
    }

    /// Create from existing secret key bytes
    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Result<Self, CryptoError> {
        let secret = SecretKey::from_bytes(bytes).map_err(|_| CryptoError::InvalidPrivateKey)?;
        let public = BlsPublicKey(secret.sk_to_pk());
        Ok(Self { secret, public })
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> BlsSignature {
        BlsSignature(self.secret.sign(message, DST, &[]))
    }

    /// Get the public key
    pub fn public_key(&self) -> BlsPublicKey {
        self.public.clone()
    }

    /// Get the secret key bytes
    pub fn secret_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.secret.to_bytes())
    }
}

impl BlsPublicKey {
    /// Verify a signature against this public key
    pub fn verify(&self, message: &[u8], signature: &BlsSignature) -> bool {
        signature.0.verify(true, message, DST, &[], &self.0, true) == BLST_ERROR::BLST_SUCCESS
    }

    /// Create from 48-byte compressed representation
    pub fn from_bytes(bytes: &[u8; BLS_PUBLIC_KEY_LEN]) -> Result<Self, CryptoError> {
        PublicKey::from_bytes(bytes)
            .map(BlsPublicKey)
            .map_err(|_| CryptoError::InvalidPublicKey)
    }

    /// Serialize to 48-byte compressed form
    pub fn to_bytes(&self) -> [u8; BLS_PUBLIC_KEY_LEN] {
        self.0.to_bytes()
    }
}

impl BlsSignature {
    /// Create from 96-byte representation
    pub fn from_bytes(bytes: &[u8; BLS_SIGNATURE_LEN]) -> Result<Self, CryptoError> {
        Signature::from_bytes(bytes)
            .map(BlsSignature)
            .map_err(|_| CryptoError::InvalidSignature)
    }

    /// Serialize to 96-byte form
    pub fn to_bytes(&self) -> [u8; BLS_SIGNATURE_LEN] {
        self.0.to_bytes()
    }

    /// Aggregate multiple signatures into one
    ///
    /// The inputs must already be verified; aggregation itself does not check
    /// that they sign anything in particular.
    pub fn aggregate(sigs: &[BlsSignature]) -> Result<Self, CryptoError> {
        if sigs.is_empty() {
            return Err(CryptoError::InvalidInput("empty signature list".into()));
        }
        let refs: Vec<&Signature> = sigs.iter().map(|s| &s.0).collect();
        AggregateSignature::aggregate(&refs, true)
            .map(|asig| BlsSignature(asig.to_signature()))
            .map_err(|_| CryptoError::AggregationFailed)
    }

    /// Verify an aggregate signature against (public key, message) pairs.
    ///
    /// Each pair contributes `e(pk_i, H(msg_i))`; the messages are expected to
    /// be distinct (chain-lock sign hashes always are, since they commit to
    /// the quorum hash and request id).
    pub fn aggregate_verify(&self, pairs: &[(BlsPublicKey, [u8; 32])]) -> bool {
        if pairs.is_empty() {
            return false;
        }
        let pks: Vec<&PublicKey> = pairs.iter().map(|(pk, _)| &pk.0).collect();
        let msgs: Vec<&[u8]> = pairs.iter().map(|(_, msg)| msg.as_slice()).collect();
        self.0.aggregate_verify(true, &msgs, DST, &pks, true) == BLST_ERROR::BLST_SUCCESS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(n: u8) -> BlsKeyPair {
        BlsKeyPair::from_seed(&[n; 32]).unwrap()
    }

    #[test]
    fn test_bls_sign_verify_roundtrip() {
        let keypair = BlsKeyPair::generate().unwrap();
        let message = b"test message";
        let signature = keypair.sign(message);
        assert!(keypair.public_key().verify(message, &signature));
    }

    #[test]
    fn test_bls_wrong_message_rejected() {
        let keypair = seeded(1);
        let signature = keypair.sign(b"test message");
        assert!(!keypair.public_key().verify(b"wrong message", &signature));
    }

    #[test]
    fn test_bls_different_key_rejected() {
        let keypair1 = seeded(1);
        let keypair2 = seeded(2);
        let message = b"test message";
        let signature = keypair1.sign(message);
        assert!(!keypair2.public_key().verify(message, &signature));
    }

    #[test]
    fn test_seed_is_deterministic() {
        assert_eq!(seeded(7).public_key(), seeded(7).public_key());
        assert_ne!(seeded(7).public_key(), seeded(8).public_key());
    }

    #[test]
    fn test_aggregate_verify_distinct_messages() {
        let kp1 = seeded(1);
        let kp2 = seeded(2);
        let kp3 = seeded(3);
        let m1 = [1u8; 32];
        let m2 = [2u8; 32];
        let m3 = [3u8; 32];

        let agg = BlsSignature::aggregate(&[kp1.sign(&m1), kp2.sign(&m2), kp3.sign(&m3)]).unwrap();

        assert!(agg.aggregate_verify(&[
            (kp1.public_key(), m1),
            (kp2.public_key(), m2),
            (kp3.public_key(), m3),
        ]));

        // Missing contributor
        assert!(!agg.aggregate_verify(&[(kp1.public_key(), m1), (kp2.public_key(), m2)]));

        // Swapped messages
        assert!(!agg.aggregate_verify(&[
            (kp1.public_key(), m2),
            (kp2.public_key(), m1),
            (kp3.public_key(), m3),
        ]));
    }

    #[test]
    fn test_aggregate_of_one_is_identity() {
        let kp = seeded(4);
        let msg = [9u8; 32];
        let sig = kp.sign(&msg);
        let agg = BlsSignature::aggregate(std::slice::from_ref(&sig)).unwrap();
        assert_eq!(agg, sig);
        assert!(agg.aggregate_verify(&[(kp.public_key(), msg)]));
    }

    #[test]
    fn test_bls_aggregate_empty_fails() {
        assert!(BlsSignature::aggregate(&[]).is_err());
        let sig = seeded(1).sign(b"x");
        assert!(!sig.aggregate_verify(&[]));
    }

    #[test]
    fn test_bls_serialization_roundtrip() {
        let keypair = seeded(5);
        let message = b"test message";
        let signature = keypair.sign(message);

        let pk_restored = BlsPublicKey::from_bytes(&keypair.public_key().to_bytes()).unwrap();
        assert_eq!(keypair.public_key(), pk_restored);

        let sig_restored = BlsSignature::from_bytes(&signature.to_bytes()).unwrap();
        assert_eq!(signature, sig_restored);

        assert!(pk_restored.verify(message, &sig_restored));
    }

    #[test]
    fn test_garbage_signature_bytes_rejected() {
        assert!(BlsSignature::from_bytes(&[0xFFu8; BLS_SIGNATURE_LEN]).is_err());
    }

    #[test]
    fn test_bls_from_secret_bytes() {
        let keypair1 = seeded(6);
        let secret_bytes = keypair1.secret_bytes();
        let keypair2 = BlsKeyPair::from_secret_bytes(&secret_bytes).unwrap();

        assert_eq!(keypair1.public_key(), keypair2.public_key());
        assert_eq!(keypair1.sign(b"test"), keypair2.sign(b"test"));
    }
}
