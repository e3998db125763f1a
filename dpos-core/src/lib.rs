//! Core blockchain data structures and traits
//!
//! This crate provides the fundamental building blocks for the DPoS chain:
//! - Basic types (Hash, Address, BlockNumber, etc.)
//! - Transaction and Block structures
//! - Authenticated trie over a shared content-addressed store
//! - Cryptographic utilities

pub mod block;
pub mod bloom;
pub mod error;
pub mod transaction;
pub mod trie;
pub mod types;

// Re-export commonly used types
pub use block::*;
pub use bloom::*;
pub use error::*;
pub use transaction::*;
pub use trie::*;
pub use types::*;
