//! Quorum Verification
//!
//! Matches shares and aggregates against the quorums scanned at an anchor
//! block. Scan position `i` pairs with request id step `i` and signer bit `i`.

use super::clsig::ChainLockSig;
use super::quorum::{LlmqType, Quorum, RecoveredSig};
use super::request_id::{RequestId, RequestIdStep};
use crate::error::{ChainLockError, ChainLockResult};
use crate::ports::outbound::{QuorumScanner, SigningService};
use shared_crypto::{BlsPublicKey, BlsSignature};
use shared_types::BlockRef;
use std::sync::Arc;
use tracing::debug;

/// Share and aggregate verification against scanned quorums.
#[derive(Clone)]
pub struct QuorumVerifier {
    llmq_type: LlmqType,
    quorum_count: usize,
    threshold: usize,
    scanner: Arc<dyn QuorumScanner>,
    signing: Arc<dyn SigningService>,
}

impl QuorumVerifier {
    pub fn new(
        llmq_type: LlmqType,
        quorum_count: usize,
        scanner: Arc<dyn QuorumScanner>,
        signing: Arc<dyn SigningService>,
    ) -> Self {
        Self {
            llmq_type,
            quorum_count,
            threshold: quorum_count / 2 + 1,
            scanner,
            signing,
        }
    }

    fn scan(&self, anchor: &BlockRef) -> Vec<Quorum> {
        let mut quorums = self
            .scanner
            .scan_quorums(self.llmq_type, anchor, self.quorum_count);
        quorums.truncate(self.quorum_count);
        quorums
    }

    /// Find the quorum that signed a single-quorum share.
    ///
    /// With a `request_filter` or a set signer bit the share names its quorum
    /// and a failed check ends the scan; otherwise every scanned quorum is
    /// tried. On success the share is pushed to the signing service as a
    /// recovered signature unless one is already cached.
    pub fn verify_share(
        &self,
        clsig: &ChainLockSig,
        anchor: &BlockRef,
        request_filter: Option<&RequestId>,
    ) -> ChainLockResult<(usize, Quorum)> {
        if clsig.signers.len() != self.quorum_count {
            return Err(ChainLockError::WrongSignerCount {
                expected: self.quorum_count,
                actual: clsig.signers.len(),
            });
        }
        let count = clsig.signer_count();
        if count > 1 {
            return Err(ChainLockError::TooManySigners { count });
        }
        let has_signer = count == 1;

        let signature = BlsSignature::from_bytes(&clsig.signature)
            .map_err(|_| ChainLockError::InvalidShareSignature)?;

        let quorums = self.scan(anchor);
        for (index, (quorum, request_id)) in quorums
            .iter()
            .zip(RequestIdStep::stream(clsig.height))
            .enumerate()
        {
            if request_filter.is_some_and(|filter| *filter != request_id) {
                continue;
            }
            if has_signer && !clsig.signers[index] {
                continue;
            }

            let sign_hash = quorum.sign_hash(self.llmq_type, &request_id, &clsig.block_hash);
            debug!(
                height = clsig.height,
                index,
                quorum = %hex::encode(&quorum.quorum_hash[..8]),
                "Verifying CLSIG share"
            );

            if quorum.public_key.verify(&sign_hash, &signature) {
                if !self.signing.has_recovered_sig(self.llmq_type, &request_id) {
                    self.signing.push_reconstructed_recovered_sig(RecoveredSig {
                        llmq_type: self.llmq_type,
                        quorum_hash: quorum.quorum_hash,
                        id: request_id,
                        msg_hash: clsig.block_hash,
                        signature: clsig.signature,
                    });
                }
                return Ok((index, quorum.clone()));
            }

            if request_filter.is_some() || has_signer {
                break;
            }
        }

        Err(ChainLockError::InvalidShareSignature)
    }

    /// Batch-verify an aggregate over every quorum whose signer bit is set.
    pub fn verify_aggregate(&self, clsig: &ChainLockSig, anchor: &BlockRef) -> ChainLockResult<()> {
        if clsig.signers.len() != self.quorum_count {
            return Err(ChainLockError::WrongSignerCount {
                expected: self.quorum_count,
                actual: clsig.signers.len(),
            });
        }
        let have = clsig.signer_count();
        if have < self.threshold {
            return Err(ChainLockError::NotEnoughSigners {
                have,
                need: self.threshold,
            });
        }

        let quorums = self.scan(anchor);
        if let Some(index) = clsig.signers.iter_ones().find(|&i| i >= quorums.len()) {
            return Err(ChainLockError::MissingQuorum {
                index,
                scanned: quorums.len(),
            });
        }

        let pairs: Vec<(BlsPublicKey, [u8; 32])> = quorums
            .iter()
            .zip(RequestIdStep::stream(clsig.height))
            .enumerate()
            .filter(|(index, _)| clsig.signers[*index])
            .map(|(_, (quorum, request_id))| {
                (
                    quorum.public_key.clone(),
                    quorum.sign_hash(self.llmq_type, &request_id, &clsig.block_hash),
                )
            })
            .collect();

        let signature = BlsSignature::from_bytes(&clsig.signature)
            .map_err(|_| ChainLockError::InvalidAggregateSignature)?;

        if signature.aggregate_verify(&pairs) {
            Ok(())
        } else {
            Err(ChainLockError::InvalidAggregateSignature)
        }
    }
}
