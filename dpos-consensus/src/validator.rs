//! Header, block, and post-state validation
//!
//! Validation is split in three: `validate_header` checks a header against
//! its parent, `validate_block` checks body availability and the
//! transactions root, and `validate_state` compares a processed block's
//! receipts and roots against the locally executed result.

use crate::{
    ChainReader, ConsensusError, ConsensusResult, DposConfig, DposEngine, DposState, ExecutedState,
};
use dpos_core::{
    compute_logs_bloom, compute_receipts_root, Block, BlockHeader, Gas, Receipt,
    GAS_LIMIT_BOUND_DIVISOR, MAX_EXTRA_DATA_SIZE, MAX_GAS_LIMIT, SEAL_SIGNATURE_LENGTH,
};
use std::sync::Arc;

/// Block validator for a DPoS chain
pub struct BlockValidator {
    config: DposConfig,
    engine: Arc<DposEngine>,
    chain: Arc<dyn ChainReader>,
}

impl BlockValidator {
    /// Create a validator over the given chain
    pub fn new(config: DposConfig, engine: Arc<DposEngine>, chain: Arc<dyn ChainReader>) -> Self {
        Self {
            config,
            engine,
            chain,
        }
    }

    /// Validate a header against its parent. `verify_seal` additionally
    /// checks the seal signature; it is skipped for headers produced locally.
    pub fn validate_header(&self, header: &BlockHeader, verify_seal: bool) -> ConsensusResult<()> {
        let hash = header.hash()?;
        if self.chain.header_by_hash(&hash).is_some() {
            return Ok(());
        }
        let parent = self
            .chain
            .header_by_hash(&header.parent_hash)
            .ok_or(ConsensusError::UnknownAncestor)?;

        let max_extra = MAX_EXTRA_DATA_SIZE + SEAL_SIGNATURE_LENGTH;
        if header.extra_data.len() > max_extra {
            return Err(ConsensusError::ExtraDataTooLong {
                len: header.extra_data.len(),
                max: max_extra,
            });
        }

        if header.timestamp <= parent.timestamp {
            return Err(ConsensusError::InvalidTimestamp {
                timestamp: header.timestamp,
                parent_timestamp: parent.timestamp,
            });
        }

        let expected_difficulty = self.engine.calc_difficulty();
        if header.difficulty != expected_difficulty {
            return Err(ConsensusError::InvalidDifficulty {
                expected: expected_difficulty,
                got: header.difficulty,
            });
        }

        if header.gas_limit > MAX_GAS_LIMIT {
            return Err(ConsensusError::GasLimitTooHigh(header.gas_limit));
        }
        if header.gas_used > header.gas_limit {
            return Err(ConsensusError::GasUsedExceedsLimit {
                gas_used: header.gas_used,
                gas_limit: header.gas_limit,
            });
        }
        // Gas limit may drift by at most 1/1024 of the parent's per block
        let drift = header.gas_limit.abs_diff(parent.gas_limit);
        if drift > parent.gas_limit / GAS_LIMIT_BOUND_DIVISOR {
            return Err(ConsensusError::GasLimitOutOfBounds {
                parent: parent.gas_limit,
                got: header.gas_limit,
            });
        }

        if header.number != parent.number + 1 {
            return Err(ConsensusError::InvalidNumber {
                expected: parent.number + 1,
                got: header.number,
            });
        }

        if verify_seal {
            self.engine.verify_seal(self.chain.as_ref(), header)?;
        }
        Ok(())
    }

    /// Validate a block body before execution.
    pub fn validate_block(&self, block: &Block) -> ConsensusResult<()> {
        let hash = block.hash()?;
        let header = &block.header;

        if self.chain.has_block(&hash, header.number) && self.chain.has_state(&header.state_root) {
            return Err(ConsensusError::KnownBlock);
        }

        let parent = self
            .chain
            .header_by_hash(&header.parent_hash)
            .ok_or(ConsensusError::UnknownAncestor)?;
        if !self.chain.has_state(&parent.state_root) {
            // Parent body present but its state evicted means we cannot
            // execute on top of it
            if self.chain.has_block(&header.parent_hash, parent.number) {
                return Err(ConsensusError::PrunedAncestor);
            }
            return Err(ConsensusError::UnknownAncestor);
        }

        let expected = block.compute_transactions_root()?;
        if header.transactions_root != expected {
            return Err(ConsensusError::TransactionsRootMismatch {
                expected,
                got: header.transactions_root,
            });
        }
        Ok(())
    }

    /// Validate the outcome of executing `block` locally against the roots
    /// and totals its header claims.
    pub fn validate_state(
        &self,
        block: &Block,
        state: &dyn ExecutedState,
        dpos_state: &DposState,
        receipts: &[Receipt],
        delete_empty_accounts: bool,
        used_gas: Gas,
    ) -> ConsensusResult<()> {
        let header = &block.header;

        if header.gas_used != used_gas {
            return Err(ConsensusError::GasUsedMismatch {
                expected: used_gas,
                got: header.gas_used,
            });
        }

        let bloom = compute_logs_bloom(receipts);
        if header.logs_bloom != bloom {
            return Err(ConsensusError::BloomMismatch);
        }

        let receipts_root = compute_receipts_root(receipts)?;
        if header.receipts_root != receipts_root {
            return Err(ConsensusError::ReceiptsRootMismatch {
                expected: receipts_root,
                got: header.receipts_root,
            });
        }

        let state_root = state.intermediate_root(delete_empty_accounts);
        if header.state_root != state_root {
            return Err(ConsensusError::StateRootMismatch {
                expected: state_root,
                got: header.state_root,
            });
        }

        let dpos_root = dpos_state.root();
        if header.dpos_root != dpos_root {
            return Err(ConsensusError::DposRootMismatch {
                expected: dpos_root,
                got: header.dpos_root,
            });
        }
        Ok(())
    }

    /// The configuration this validator enforces
    pub fn config(&self) -> &DposConfig {
        &self.config
    }
}
