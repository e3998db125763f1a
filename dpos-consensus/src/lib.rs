//! Delegated proof-of-stake consensus
//!
//! This crate contains the consensus-critical logic of the chain: the
//! authenticated DPoS state (candidates, delegations, votes, mint counts,
//! validator sets), epoch elections with deterministic shuffling, the slot
//! based sealing engine, and block validation.

pub mod config;
pub mod election;
pub mod engine;
pub mod error;
pub mod state;
pub mod traits;
pub mod validator;

pub use config::DposConfig;
pub use election::EpochElection;
pub use engine::{DposEngine, DPOS_DIFFICULTY};
pub use error::{ConsensusError, ConsensusResult};
pub use state::{DposRoots, DposState};
pub use traits::{
    BalanceProvider, ChainReader, ExecutedState, KeypairSigner, MemoryBalances, MemoryChain,
    SealSigner,
};
pub use validator::BlockValidator;
