//! Block data structures and operations

use crate::{Address, BlockNumber, Bloom, CoreError, CoreResult, Hash, Timestamp, Transaction};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

/// Maximum size of the free-form part of `extra_data`, in bytes
pub const MAX_EXTRA_DATA_SIZE: usize = 32;

/// Length of the seal signature stored at the tail of `extra_data`
pub const SEAL_SIGNATURE_LENGTH: usize = 65;

/// Upper bound on a header's gas limit
pub const MAX_GAS_LIMIT: u64 = u64::MAX / 2; // 2^63 - 1

/// Divisor bounding per-block gas limit drift against the parent
pub const GAS_LIMIT_BOUND_DIVISOR: u64 = 1024;

/// Block header containing metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode)]
pub struct BlockHeader {
    /// Hash of the parent block
    pub parent_hash: Hash,
    /// Address of the validator that produced this block
    pub miner: Address,
    /// Block number (height)
    pub number: BlockNumber,
    /// Root hash of the account state trie
    pub state_root: Hash,
    /// Root hash of the transaction trie
    pub transactions_root: Hash,
    /// Root hash of the receipts trie
    pub receipts_root: Hash,
    /// Composite root over the five DPoS context tries
    pub dpos_root: Hash,
    /// Bloom filter over the receipt logs
    pub logs_bloom: Bloom,
    /// Difficulty (constant 1 under DPoS, kept for header compatibility)
    pub difficulty: u64,
    /// Block timestamp in seconds
    pub timestamp: Timestamp,
    /// Extra data; once sealed, the last 65 bytes are the seal signature
    pub extra_data: Vec<u8>,
    /// Unused 8-byte field kept for header compatibility
    pub nonce: u64,
    /// Gas limit for all transactions in this block
    pub gas_limit: u64,
    /// Gas used by all transactions in this block
    pub gas_used: u64,
}

impl BlockHeader {
    /// Calculate the hash of this block header
    pub fn hash(&self) -> CoreResult<Hash> {
        let encoded = bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| CoreError::Bincode(e.to_string()))?;
        let hash_bytes = Keccak256::digest(&encoded);
        Ok(Hash::from_slice(hash_bytes.as_slice()))
    }

    /// Hash of every header field except the trailing seal signature.
    ///
    /// This is the message the block producer signs and the message seal
    /// verification recovers against.
    pub fn seal_hash(&self) -> CoreResult<Hash> {
        let extra_data = match self.extra_data.len() {
            len if len >= SEAL_SIGNATURE_LENGTH => {
                self.extra_data[..len - SEAL_SIGNATURE_LENGTH].to_vec()
            }
            _ => self.extra_data.clone(),
        };

        let unsealed = HeaderForSealing {
            parent_hash: self.parent_hash,
            miner: self.miner,
            number: self.number,
            state_root: self.state_root,
            transactions_root: self.transactions_root,
            receipts_root: self.receipts_root,
            dpos_root: self.dpos_root,
            logs_bloom: self.logs_bloom,
            difficulty: self.difficulty,
            timestamp: self.timestamp,
            extra_data,
            nonce: self.nonce,
            gas_limit: self.gas_limit,
            gas_used: self.gas_used,
        };

        let encoded = bincode::encode_to_vec(&unsealed, bincode::config::standard())
            .map_err(|e| CoreError::Bincode(e.to_string()))?;
        Ok(Hash::from_slice(Keccak256::digest(&encoded).as_slice()))
    }

    /// The trailing 65-byte seal signature, if the header carries one
    pub fn seal_signature(&self) -> Option<&[u8]> {
        let len = self.extra_data.len();
        (len >= SEAL_SIGNATURE_LENGTH).then(|| &self.extra_data[len - SEAL_SIGNATURE_LENGTH..])
    }

    /// Get the genesis block header
    pub fn genesis(timestamp: Timestamp) -> Self {
        Self {
            parent_hash: Hash::zero(),
            miner: Address::zero(),
            number: 0,
            state_root: Hash::zero(),
            transactions_root: Hash::zero(),
            receipts_root: Hash::zero(),
            dpos_root: Hash::zero(),
            logs_bloom: Bloom::zero(),
            difficulty: 1,
            timestamp,
            extra_data: b"DPoS Genesis Block".to_vec(),
            nonce: 0,
            gas_limit: 8_000_000,
            gas_used: 0,
        }
    }
}

/// Transaction receipt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode)]
pub struct Receipt {
    /// Transaction hash
    pub transaction_hash: Hash,
    /// Gas used by this transaction
    pub gas_used: u64,
    /// Status (1 for success, 0 for failure)
    pub status: u8,
    /// Logs/events emitted
    pub logs: Vec<Log>,
}

impl Receipt {
    /// Calculate the hash of this receipt
    pub fn hash(&self) -> CoreResult<Hash> {
        let encoded = bincode::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| CoreError::Bincode(e.to_string()))?;
        Ok(Hash::from_slice(Keccak256::digest(&encoded).as_slice()))
    }
}

/// Event log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode)]
pub struct Log {
    /// Address that emitted the log
    pub address: Address,
    /// Topics (indexed parameters)
    pub topics: Vec<Hash>,
    /// Data (non-indexed parameters)
    pub data: Vec<u8>,
}

/// Recompute the logs bloom from a slice of receipts
pub fn compute_logs_bloom(receipts: &[Receipt]) -> Bloom {
    let mut bloom = Bloom::zero();
    for receipt in receipts {
        for log in &receipt.logs {
            bloom.accrue(log.address.as_bytes());
            for topic in &log.topics {
                bloom.accrue(topic.as_bytes());
            }
        }
    }
    bloom
}

/// Recompute the receipts root (Keccak256 over concatenated receipt hashes,
/// zero hash for an empty list)
pub fn compute_receipts_root(receipts: &[Receipt]) -> CoreResult<Hash> {
    if receipts.is_empty() {
        return Ok(Hash::zero());
    }

    let mut hasher = Keccak256::new();
    for receipt in receipts {
        hasher.update(receipt.hash()?.as_bytes());
    }
    Ok(Hash::from_slice(hasher.finalize().as_slice()))
}

/// Complete block with header and transactions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block header
    pub header: BlockHeader,
    /// List of transactions
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Create a new block
    pub fn new(header: BlockHeader, transactions: Vec<Transaction>) -> Self {
        Self {
            header,
            transactions,
        }
    }

    /// Create genesis block
    pub fn genesis(timestamp: Timestamp) -> Self {
        Self {
            header: BlockHeader::genesis(timestamp),
            transactions: Vec::new(),
        }
    }

    /// Get the block hash (same as header hash)
    pub fn hash(&self) -> CoreResult<Hash> {
        self.header.hash()
    }

    /// Calculate the transactions root hash
    pub fn compute_transactions_root(&self) -> CoreResult<Hash> {
        if self.transactions.is_empty() {
            return Ok(Hash::zero());
        }

        let mut hasher = Keccak256::new();
        for tx in &self.transactions {
            hasher.update(tx.hash()?.as_bytes());
        }
        Ok(Hash::from_slice(hasher.finalize().as_slice()))
    }

    /// Check if block is genesis
    pub fn is_genesis(&self) -> bool {
        self.header.number == 0 && self.header.parent_hash == Hash::zero()
    }
}

/// Helper struct encoding the header without its seal for signing
#[derive(Serialize, bincode::Encode)]
struct HeaderForSealing {
    parent_hash: Hash,
    miner: Address,
    number: BlockNumber,
    state_root: Hash,
    transactions_root: Hash,
    receipts_root: Hash,
    dpos_root: Hash,
    logs_bloom: Bloom,
    difficulty: u64,
    timestamp: Timestamp,
    extra_data: Vec<u8>,
    nonce: u64,
    gas_limit: u64,
    gas_used: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Transaction;

    #[test]
    fn test_genesis_block() {
        let genesis = Block::genesis(1_700_000_000);
        assert_eq!(genesis.header.number, 0);
        assert_eq!(genesis.header.parent_hash, Hash::zero());
        assert!(genesis.transactions.is_empty());
        assert!(genesis.is_genesis());
    }

    #[test]
    fn test_block_hash_deterministic() {
        let genesis = Block::genesis(0);
        assert_eq!(genesis.hash().unwrap(), genesis.hash().unwrap());
    }

    #[test]
    fn test_transactions_root() {
        let mut block = Block::genesis(0);
        assert_eq!(block.compute_transactions_root().unwrap(), Hash::zero());

        let to = Address::from_hex("1234567890abcdef1234567890abcdef12345678").unwrap();
        block
            .transactions
            .push(Transaction::transfer(1, to, 1000, 20_000_000_000, 21_000));

        assert_ne!(block.compute_transactions_root().unwrap(), Hash::zero());
    }

    #[test]
    fn test_seal_hash_ignores_seal_signature() {
        let mut header = BlockHeader::genesis(42);
        header.extra_data = vec![1, 2, 3];
        let unsealed = header.seal_hash().unwrap();
        assert!(header.seal_signature().is_none());

        // Appending a seal must not change the seal hash, but must change the
        // full header hash
        let full_hash = header.hash().unwrap();
        header.extra_data.extend_from_slice(&[9u8; 65]);
        assert_eq!(header.seal_hash().unwrap(), unsealed);
        assert_ne!(header.hash().unwrap(), full_hash);
        assert_eq!(header.seal_signature().unwrap(), &[9u8; 65][..]);
    }

    #[test]
    fn test_receipts_root_and_bloom() {
        assert_eq!(compute_receipts_root(&[]).unwrap(), Hash::zero());
        assert!(compute_logs_bloom(&[]).is_zero());

        let receipt = Receipt {
            transaction_hash: Hash::new([1u8; 32]),
            gas_used: 21_000,
            status: 1,
            logs: vec![Log {
                address: Address::new([2u8; 20]),
                topics: vec![Hash::new([3u8; 32])],
                data: vec![0xde, 0xad],
            }],
        };

        let root = compute_receipts_root(std::slice::from_ref(&receipt)).unwrap();
        assert_ne!(root, Hash::zero());

        let bloom = compute_logs_bloom(std::slice::from_ref(&receipt));
        assert!(bloom.contains(Address::new([2u8; 20]).as_bytes()));
        assert!(bloom.contains(Hash::new([3u8; 32]).as_bytes()));
        assert!(!bloom.contains(Address::new([9u8; 20]).as_bytes()));
    }
}
