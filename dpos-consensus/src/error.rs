//! Consensus error types
//!
//! Every way a block or a state transition can be rejected has its own named
//! variant. Errors are surfaced to the block-import driver; nothing in this
//! crate retries.

use dpos_core::{Address, Hash, TrieError};
use thiserror::Error;

/// Consensus error type
#[derive(Error, Debug)]
pub enum ConsensusError {
    /// Block and its post-state are both already present
    #[error("block already known")]
    KnownBlock,

    /// Parent block is not in the ledger
    #[error("unknown ancestor")]
    UnknownAncestor,

    /// Parent block is known but its post-state has been pruned
    #[error("pruned ancestor")]
    PrunedAncestor,

    /// Sealing the genesis block is not supported
    #[error("refusing to seal the genesis block")]
    SealingGenesis,

    /// Header carries no trailing seal signature
    #[error("header is missing its seal signature")]
    MissingSeal,

    /// Recovered seal signer does not match the declared miner
    #[error("seal signer mismatch: header declares {expected}, signature recovers {got}")]
    SignerMismatch { expected: Address, got: Address },

    /// Header timestamp is not strictly after the parent's
    #[error("invalid timestamp: {timestamp} not after parent {parent_timestamp}")]
    InvalidTimestamp {
        timestamp: u64,
        parent_timestamp: u64,
    },

    /// Header difficulty differs from the engine's constant
    #[error("invalid difficulty: expected {expected}, got {got}")]
    InvalidDifficulty { expected: u64, got: u64 },

    /// Header number is not parent number + 1
    #[error("invalid block number: expected {expected}, got {got}")]
    InvalidNumber { expected: u64, got: u64 },

    /// Extra data exceeds the free-form limit plus the seal
    #[error("extra data too long: {len} bytes, maximum {max}")]
    ExtraDataTooLong { len: usize, max: usize },

    /// Gas limit exceeds the protocol ceiling
    #[error("gas limit {0} above protocol maximum")]
    GasLimitTooHigh(u64),

    /// Gas used exceeds the gas limit
    #[error("gas used {gas_used} exceeds gas limit {gas_limit}")]
    GasUsedExceedsLimit { gas_used: u64, gas_limit: u64 },

    /// Gas limit drifted too far from the parent's
    #[error("gas limit {got} out of bounds around parent {parent}")]
    GasLimitOutOfBounds { parent: u64, got: u64 },

    /// Declared gas used differs from the execution result
    #[error("gas used mismatch: header {expected}, execution {got}")]
    GasUsedMismatch { expected: u64, got: u64 },

    /// Recomputed logs bloom differs from the header's
    #[error("logs bloom mismatch")]
    BloomMismatch,

    /// Recomputed transactions root differs from the header's
    #[error("transactions root mismatch: header {expected}, computed {got}")]
    TransactionsRootMismatch { expected: Hash, got: Hash },

    /// Recomputed receipts root differs from the header's
    #[error("receipts root mismatch: header {expected}, computed {got}")]
    ReceiptsRootMismatch { expected: Hash, got: Hash },

    /// Recomputed account state root differs from the header's
    #[error("state root mismatch: header {expected}, computed {got}")]
    StateRootMismatch { expected: Hash, got: Hash },

    /// Recomputed DPoS context root differs from the header's
    #[error("dpos context root mismatch: header {expected}, computed {got}")]
    DposRootMismatch { expected: Hash, got: Hash },

    /// Delegation target is not a registered candidate
    #[error("candidate not registered: {0}")]
    CandidateNotFound(Address),

    /// Undelegation names a candidate the delegator is not voting for
    #[error("undelegate mismatch: delegator {delegator} votes for {voted:?}, not {candidate}")]
    UndelegateMismatch {
        delegator: Address,
        candidate: Address,
        voted: Option<Address>,
    },

    /// Vote counting requires at least one registered candidate
    #[error("no candidates registered")]
    NoCandidates,

    /// Validator lookup requires a non-empty validator set
    #[error("validator set is empty")]
    NoValidators,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Signer callback failure
    #[error("Signature error: {0}")]
    Signature(String),

    /// Underlying trie store failure
    #[error("Trie error: {0}")]
    Trie(#[from] TrieError),

    /// Core encoding/crypto failure
    #[error("Core error: {0}")]
    Core(#[from] dpos_core::CoreError),

    /// Other error
    #[error("Consensus error: {0}")]
    Other(String),
}

impl From<serde_json::Error> for ConsensusError {
    fn from(err: serde_json::Error) -> Self {
        ConsensusError::Config(err.to_string())
    }
}

impl From<anyhow::Error> for ConsensusError {
    fn from(err: anyhow::Error) -> Self {
        ConsensusError::Other(err.to_string())
    }
}

/// Result type for consensus operations
pub type ConsensusResult<T> = Result<T, ConsensusError>;
