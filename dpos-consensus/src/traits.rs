//! External interfaces consumed by the consensus core
//!
//! The consensus core never owns key material, account state, or block
//! storage; it reaches all three through these traits.

use crate::{ConsensusError, ConsensusResult};
use dpos_core::{address_from_public_key, sign_hash, Address, Block, BlockHeader, Hash, Wei};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Account balance lookup, used only while counting votes
pub trait BalanceProvider: Send + Sync {
    /// Current balance of an address
    fn balance(&self, address: &Address) -> Wei;
}

/// Read access to the canonical ledger
pub trait ChainReader: Send + Sync {
    /// Header by block hash
    fn header_by_hash(&self, hash: &Hash) -> Option<BlockHeader>;

    /// Header by block number
    fn header_by_number(&self, number: u64) -> Option<BlockHeader>;

    /// Full block by hash
    fn block_by_hash(&self, hash: &Hash) -> Option<Block>;

    /// Whether the block body is present
    fn has_block(&self, hash: &Hash, number: u64) -> bool;

    /// Whether the post-state for the given state root is present
    fn has_state(&self, state_root: &Hash) -> bool;
}

/// Signer callback injected into the engine, keyed by validator address
pub trait SealSigner: Send + Sync {
    /// Produce a 65-byte recoverable signature over `message` with the key
    /// belonging to `address`
    fn sign(&self, address: &Address, message: &Hash) -> ConsensusResult<[u8; 65]>;
}

/// Post-execution account state, consulted by state validation
pub trait ExecutedState {
    /// Recompute the account state root; `delete_empty_accounts` mirrors the
    /// execution-layer flag used when the block was processed
    fn intermediate_root(&self, delete_empty_accounts: bool) -> Hash;
}

/// In-memory balance table
#[derive(Debug, Default)]
pub struct MemoryBalances {
    balances: HashMap<Address, Wei>,
}

impl MemoryBalances {
    /// Create an empty balance table
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the balance of an address
    pub fn set(&mut self, address: Address, balance: Wei) {
        self.balances.insert(address, balance);
    }
}

impl BalanceProvider for MemoryBalances {
    fn balance(&self, address: &Address) -> Wei {
        self.balances.get(address).copied().unwrap_or(0)
    }
}

/// In-memory ledger for tests and development
#[derive(Debug, Default)]
pub struct MemoryChain {
    blocks_by_hash: RwLock<HashMap<Hash, Block>>,
    hashes_by_number: RwLock<HashMap<u64, Hash>>,
    known_states: RwLock<HashMap<Hash, ()>>,
}

impl MemoryChain {
    /// Create an empty chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a block and mark its post-state as available
    pub fn insert(&self, block: Block) -> ConsensusResult<()> {
        self.insert_without_state(block.clone())?;
        self.known_states
            .write()
            .insert(block.header.state_root, ());
        Ok(())
    }

    /// Insert a block whose post-state is absent (pruned)
    pub fn insert_without_state(&self, block: Block) -> ConsensusResult<()> {
        let hash = block.hash()?;
        self.hashes_by_number
            .write()
            .insert(block.header.number, hash);
        self.blocks_by_hash.write().insert(hash, block);
        Ok(())
    }
}

impl ChainReader for MemoryChain {
    fn header_by_hash(&self, hash: &Hash) -> Option<BlockHeader> {
        self.blocks_by_hash
            .read()
            .get(hash)
            .map(|b| b.header.clone())
    }

    fn header_by_number(&self, number: u64) -> Option<BlockHeader> {
        let hash = *self.hashes_by_number.read().get(&number)?;
        self.header_by_hash(&hash)
    }

    fn block_by_hash(&self, hash: &Hash) -> Option<Block> {
        self.blocks_by_hash.read().get(hash).cloned()
    }

    fn has_block(&self, hash: &Hash, number: u64) -> bool {
        match self.blocks_by_hash.read().get(hash) {
            Some(block) => block.header.number == number,
            None => false,
        }
    }

    fn has_state(&self, state_root: &Hash) -> bool {
        self.known_states.read().contains_key(state_root)
    }
}

/// In-memory keypair signer for tests and development. Production nodes
/// inject a signer backed by their keystore instead.
#[derive(Default)]
pub struct KeypairSigner {
    keys: RwLock<HashMap<Address, secp256k1::SecretKey>>,
}

impl KeypairSigner {
    /// Create an empty signer
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a fresh keypair, returning its address
    pub fn generate(&self) -> Address {
        let secp = secp256k1::Secp256k1::new();
        let (secret, public) = secp.generate_keypair(&mut rand::rng());
        let address = address_from_public_key(&public);
        self.keys.write().insert(address, secret);
        address
    }

    /// Import an existing secret key, returning its address
    pub fn import(&self, secret: secp256k1::SecretKey) -> Address {
        let secp = secp256k1::Secp256k1::new();
        let address = address_from_public_key(&secret.public_key(&secp));
        self.keys.write().insert(address, secret);
        address
    }
}

impl SealSigner for KeypairSigner {
    fn sign(&self, address: &Address, message: &Hash) -> ConsensusResult<[u8; 65]> {
        let secret = self
            .keys
            .read()
            .get(address)
            .copied()
            .ok_or_else(|| ConsensusError::Signature(format!("no key for {}", address)))?;

        sign_hash(&secret.secret_bytes(), message).map_err(ConsensusError::Core)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dpos_core::recover_signer;

    #[test]
    fn test_memory_balances() {
        let mut balances = MemoryBalances::new();
        let addr = Address::new([1u8; 20]);

        assert_eq!(balances.balance(&addr), 0);
        balances.set(addr, 500);
        assert_eq!(balances.balance(&addr), 500);
    }

    #[test]
    fn test_memory_chain_lookup() {
        let chain = MemoryChain::new();
        let genesis = Block::genesis(0);
        let hash = genesis.hash().unwrap();
        chain.insert(genesis.clone()).unwrap();

        assert_eq!(chain.header_by_number(0).unwrap(), genesis.header);
        assert!(chain.has_block(&hash, 0));
        assert!(!chain.has_block(&hash, 1));
        assert!(chain.has_state(&genesis.header.state_root));
    }

    #[test]
    fn test_pruned_block_has_no_state() {
        let chain = MemoryChain::new();
        let mut block = Block::genesis(0);
        block.header.state_root = Hash::new([5u8; 32]);
        chain.insert_without_state(block.clone()).unwrap();

        assert!(chain.has_block(&block.hash().unwrap(), 0));
        assert!(!chain.has_state(&block.header.state_root));
    }

    #[test]
    fn test_keypair_signer_round_trip() {
        let signer = KeypairSigner::new();
        let address = signer.generate();
        let message = Hash::new([7u8; 32]);

        let signature = signer.sign(&address, &message).unwrap();
        assert_eq!(recover_signer(&message, &signature).unwrap(), address);
    }

    #[test]
    fn test_signer_rejects_unknown_address() {
        let signer = KeypairSigner::new();
        let message = Hash::zero();
        assert!(signer.sign(&Address::new([9u8; 20]), &message).is_err());
    }
}
