//! DPoS block sealing engine
//!
//! Sealing waits for the next slot boundary, signs the header with the
//! configured validator key, and appends the 65-byte recoverable signature to
//! the header's extra data. Difficulty plays no role under DPoS; every sealed
//! block carries the same constant so total difficulty degenerates into
//! chain length.

use crate::{ChainReader, ConsensusError, ConsensusResult, DposConfig, SealSigner};
use dpos_core::{recover_signer, Address, Block, BlockHeader, Timestamp};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::oneshot;
use tracing::{debug, info};

/// Difficulty of every DPoS block
pub const DPOS_DIFFICULTY: u64 = 1;

/// DPoS sealing engine bound to one validator identity
pub struct DposEngine {
    config: DposConfig,
    signer_address: Address,
    signer: Arc<dyn SealSigner>,
}

impl DposEngine {
    /// Create an engine sealing on behalf of `signer_address`
    pub fn new(config: DposConfig, signer_address: Address, signer: Arc<dyn SealSigner>) -> Self {
        Self {
            config,
            signer_address,
            signer,
        }
    }

    /// The validator address this engine seals as
    pub fn signer_address(&self) -> Address {
        self.signer_address
    }

    /// Difficulty for the next block; constant under DPoS
    pub fn calc_difficulty(&self) -> u64 {
        DPOS_DIFFICULTY
    }

    /// First slot boundary at or after `now`
    pub fn next_slot(&self, now: Timestamp) -> Timestamp {
        let interval = self.config.block_interval;
        (now + interval - 1) / interval * interval
    }

    /// Seal `block` at the next slot boundary.
    ///
    /// Returns `Ok(None)` if `stop` fires while waiting for the slot. The
    /// sealed header's timestamp is the slot time itself, so verification can
    /// re-derive the slot without trusting the local clock.
    pub async fn seal(
        &self,
        block: Block,
        stop: oneshot::Receiver<()>,
    ) -> ConsensusResult<Option<Block>> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| ConsensusError::Other(format!("system clock before epoch: {}", e)))?
            .as_secs();
        self.seal_at(block, now, stop).await
    }

    /// Seal `block`, treating `now` as the current wall-clock time.
    pub async fn seal_at(
        &self,
        mut block: Block,
        now: Timestamp,
        mut stop: oneshot::Receiver<()>,
    ) -> ConsensusResult<Option<Block>> {
        if block.header.number == 0 {
            return Err(ConsensusError::SealingGenesis);
        }

        let slot = self.next_slot(now);
        let delay = slot.saturating_sub(now);
        if delay > 0 {
            debug!(delay, slot, "waiting for sealing slot");
            tokio::select! {
                _ = &mut stop => {
                    debug!("sealing aborted before slot");
                    return Ok(None);
                }
                _ = tokio::time::sleep(Duration::from_secs(delay)) => {}
            }
        }

        block.header.timestamp = slot;
        let seal_hash = block.header.seal_hash()?;
        let signature = self.signer.sign(&self.signer_address, &seal_hash)?;
        block.header.extra_data.extend_from_slice(&signature);

        info!(
            number = block.header.number,
            timestamp = slot,
            miner = %self.signer_address,
            "sealed block"
        );
        Ok(Some(block))
    }

    /// Verify that `header` carries a seal signature matching its miner.
    pub fn verify_seal(
        &self,
        chain: &dyn ChainReader,
        header: &BlockHeader,
    ) -> ConsensusResult<()> {
        if header.number == 0 {
            return Err(ConsensusError::UnknownAncestor);
        }
        if chain
            .header_by_hash(&header.parent_hash)
            .filter(|p| p.number == header.number - 1)
            .is_none()
        {
            return Err(ConsensusError::UnknownAncestor);
        }

        let signature = header
            .seal_signature()
            .ok_or(ConsensusError::MissingSeal)?;
        let seal_hash = header.seal_hash()?;
        let signer = recover_signer(&seal_hash, signature)?;
        if signer != header.miner {
            return Err(ConsensusError::SignerMismatch {
                expected: header.miner,
                got: signer,
            });
        }
        Ok(())
    }
}
