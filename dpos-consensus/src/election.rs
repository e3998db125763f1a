//! Epoch-based validator election
//!
//! At every epoch boundary the candidate tally is recomputed from account
//! balances, inactive validators are evicted, and the surviving top
//! candidates are shuffled into the next rotation. The shuffle seed and PRNG
//! are part of the consensus contract: every node must reproduce the same
//! ordering bit for bit.

use crate::{BalanceProvider, ConsensusError, ConsensusResult, DposConfig, DposState};
use dpos_core::{Address, BlockHeader, Hash, Timestamp, Wei};
use sha3::{Digest, Keccak512};
use tracing::{debug, info};

/// Epoch election context.
///
/// `time_of_first_block` is deliberately an explicit field rather than a
/// lazily filled global: it is set once from the height-1 header and scopes
/// the partial-first-epoch rule to this chain instance.
#[derive(Debug, Clone)]
pub struct EpochElection {
    config: DposConfig,
    time_of_first_block: Timestamp,
}

impl EpochElection {
    /// Create an election context. `time_of_first_block` is the timestamp of
    /// the first non-genesis block (or the genesis timestamp while the chain
    /// is empty).
    pub fn new(config: DposConfig, time_of_first_block: Timestamp) -> Self {
        Self {
            config,
            time_of_first_block,
        }
    }

    /// The configuration this context elects under
    pub fn config(&self) -> &DposConfig {
        &self.config
    }

    /// Run every election due between the parent block and
    /// `target_timestamp`, mutating `state` in place.
    ///
    /// No boundary crossed means no work. While the parent is still inside
    /// the genesis epoch the chain is bootstrapping: historical epochs are
    /// not replayed one by one and nobody is kicked for inactivity.
    pub fn try_elect(
        &self,
        state: &mut DposState,
        genesis: &BlockHeader,
        parent: &BlockHeader,
        target_timestamp: Timestamp,
        balances: &dyn BalanceProvider,
    ) -> ConsensusResult<()> {
        let epoch_interval = self.config.epoch_interval;
        let genesis_epoch = genesis.timestamp / epoch_interval;
        let current_epoch = target_timestamp / epoch_interval;
        let mut prev_epoch = parent.timestamp / epoch_interval;

        let prev_epoch_is_genesis = prev_epoch == genesis_epoch;
        if prev_epoch_is_genesis && prev_epoch < current_epoch {
            // Bootstrap: skip straight to the epoch preceding the target
            prev_epoch = current_epoch - 1;
        }

        let parent_hash = parent.hash()?;
        for epoch in prev_epoch..current_epoch {
            if !prev_epoch_is_genesis && state.has_mint_counts(epoch)? {
                self.kickout(state, epoch, target_timestamp)?;
            }

            let votes = state.count_votes(balances)?;
            let mut candidates: Vec<(Address, Wei)> = votes.into_iter().collect();
            // Weight descending, address ascending on ties; byte order of an
            // address equals the lexicographic order of its hex form
            candidates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            candidates.truncate(self.config.max_validator_size);

            let mut validators: Vec<Address> =
                candidates.into_iter().map(|(addr, _)| addr).collect();
            shuffle_validators(&mut validators, &parent_hash, epoch);

            state.set_validators(&validators)?;
            info!(
                epoch = epoch + 1,
                validators = validators.len(),
                "elected new validator set"
            );
        }
        Ok(())
    }

    /// Evict validators that minted too few blocks in `epoch`, never
    /// shrinking the candidate pool below `safe_size`.
    fn kickout(
        &self,
        state: &mut DposState,
        epoch: u64,
        target_timestamp: Timestamp,
    ) -> ConsensusResult<()> {
        let validators = state.validators()?;
        if validators.is_empty() {
            return Err(ConsensusError::NoValidators);
        }

        // A first epoch that started mid-interval is measured by wall time
        // since the first block, so its validators are not punished for the
        // missing head of the interval.
        let mut epoch_duration = self.config.epoch_interval;
        let elapsed = target_timestamp.saturating_sub(self.time_of_first_block);
        if elapsed < self.config.epoch_interval {
            epoch_duration = elapsed;
        }
        let threshold = self.config.kickout_threshold(epoch_duration);

        let mut inactive: Vec<(Address, u64)> = Vec::new();
        for validator in &validators {
            let minted = state.mint_count(epoch, validator)?;
            if minted < threshold {
                inactive.push((*validator, minted));
            }
        }
        if inactive.is_empty() {
            return Ok(());
        }
        // Mint count descending: the least-bad offender goes first, so the
        // worst offenders are still evicted when the pool floor cuts the
        // pass short
        inactive.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let safe_size = self.config.safe_size();
        // Bounded scan: only enough of the candidate trie to know whether
        // every eviction can proceed
        let mut candidate_count = state.candidate_count_up_to(inactive.len() + safe_size)?;

        for (validator, minted) in inactive {
            if candidate_count <= safe_size {
                debug!(
                    epoch,
                    candidate_count, "candidate pool at floor, keeping remaining inactive validators"
                );
                break;
            }
            state.kickout_candidate(&validator)?;
            candidate_count -= 1;
            info!(
                epoch,
                validator = %validator,
                mint_count = minted,
                threshold,
                "kicked out inactive validator"
            );
        }
        Ok(())
    }

    /// The validator whose slot covers `timestamp`
    pub fn lookup_validator(
        &self,
        state: &DposState,
        timestamp: Timestamp,
    ) -> ConsensusResult<Address> {
        let validators = state.validators()?;
        if validators.is_empty() {
            return Err(ConsensusError::NoValidators);
        }

        let slot = (timestamp % self.config.epoch_interval) / self.config.block_interval;
        Ok(validators[(slot as usize) % validators.len()])
    }
}

/// Shuffle seed: the low 32 bits (little endian) of Keccak512(parent_hash),
/// widened to i64, plus the epoch index. Part of the consensus contract.
fn shuffle_seed(parent_hash: &Hash, epoch: u64) -> i64 {
    let digest = Keccak512::digest(parent_hash.as_bytes());
    let word = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]);
    i64::from(word).wrapping_add(epoch as i64)
}

/// Deterministic Fisher–Yates shuffle driven by SplitMix64.
///
/// The generator and the `% (i + 1)` index reduction are consensus-critical;
/// independently written nodes must reproduce this ordering exactly. Never
/// substitute a platform RNG here.
fn shuffle_validators(validators: &mut [Address], parent_hash: &Hash, epoch: u64) {
    let mut rng = SplitMix64::new(shuffle_seed(parent_hash, epoch) as u64);
    for i in (1..validators.len()).rev() {
        let j = (rng.next_u64() % (i as u64 + 1)) as usize;
        validators.swap(i, j);
    }
}

/// SplitMix64 generator (Steele, Lea, Flood 2014). Chosen over a platform
/// default because the exact output sequence is pinned by consensus.
struct SplitMix64 {
    state: u64,
}

impl SplitMix64 {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }
}
