//! DPoS context state
//!
//! Five independent authenticated tries over one shared append-only node
//! store: candidates, delegations, votes, mint counts, and the epoch trie
//! holding the current validator set. A state version is nothing more than
//! the tuple of the five root hashes, which makes snapshot, revert, and
//! forking cheap pointer operations.

use crate::{BalanceProvider, ConsensusError, ConsensusResult};
use dpos_core::{Address, Hash, Timestamp, Trie, TrieDb, TrieError, TrieResult, Wei};
use sha3::{Digest, Keccak256};
use std::collections::BTreeMap;

/// Key prefix of the epoch trie
pub const EPOCH_PREFIX: &[u8] = b"epoch-";
/// Key prefix of the delegation trie
pub const DELEGATE_PREFIX: &[u8] = b"delegate-";
/// Key prefix of the vote trie
pub const VOTE_PREFIX: &[u8] = b"vote-";
/// Key prefix of the candidate trie
pub const CANDIDATE_PREFIX: &[u8] = b"candidate-";
/// Key prefix of the mint-count trie
pub const MINT_CNT_PREFIX: &[u8] = b"mintCnt-";

/// Key of the validator set inside the epoch trie
const VALIDATORS_KEY_SUFFIX: &[u8] = b"validator";

/// A version of the DPoS context: the five trie roots. Doubles as the
/// snapshot handle and as the result of a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DposRoots {
    pub epoch: Hash,
    pub delegate: Hash,
    pub candidate: Hash,
    pub vote: Hash,
    pub mint_cnt: Hash,
}

/// The DPoS consensus state
#[derive(Debug, Clone)]
pub struct DposState {
    db: TrieDb,
    epoch: Trie,
    delegate: Trie,
    candidate: Trie,
    vote: Trie,
    mint_cnt: Trie,
}

impl DposState {
    /// Create an empty state over `db` (genesis)
    pub fn new(db: TrieDb) -> Self {
        Self {
            epoch: Trie::new(db.clone()),
            delegate: Trie::new(db.clone()),
            candidate: Trie::new(db.clone()),
            vote: Trie::new(db.clone()),
            mint_cnt: Trie::new(db.clone()),
            db,
        }
    }

    /// Open the state at a previously committed version
    pub fn from_roots(db: TrieDb, roots: &DposRoots) -> Self {
        Self {
            epoch: Trie::from_root(db.clone(), roots.epoch),
            delegate: Trie::from_root(db.clone(), roots.delegate),
            candidate: Trie::from_root(db.clone(), roots.candidate),
            vote: Trie::from_root(db.clone(), roots.vote),
            mint_cnt: Trie::from_root(db.clone(), roots.mint_cnt),
            db,
        }
    }

    /// Independent instance at the current version, for validating a
    /// competing chain head without shared mutation
    pub fn fork(&self) -> Self {
        self.clone()
    }

    /// Composite root: Keccak256 over the five trie roots in fixed order
    /// (epoch, delegate, candidate, vote, mintCnt)
    pub fn root(&self) -> Hash {
        let mut hasher = Keccak256::new();
        hasher.update(self.epoch.root_hash().as_bytes());
        hasher.update(self.delegate.root_hash().as_bytes());
        hasher.update(self.candidate.root_hash().as_bytes());
        hasher.update(self.vote.root_hash().as_bytes());
        hasher.update(self.mint_cnt.root_hash().as_bytes());
        Hash::from_slice(hasher.finalize().as_slice())
    }

    /// Capture the current version
    pub fn snapshot(&self) -> DposRoots {
        DposRoots {
            epoch: self.epoch.root_hash(),
            delegate: self.delegate.root_hash(),
            candidate: self.candidate.root_hash(),
            vote: self.vote.root_hash(),
            mint_cnt: self.mint_cnt.root_hash(),
        }
    }

    /// Restore a previously captured version. The backing store is
    /// append-only, so this only moves root pointers.
    pub fn revert_to_snapshot(&mut self, snapshot: &DposRoots) {
        self.epoch.reset_root(snapshot.epoch);
        self.delegate.reset_root(snapshot.delegate);
        self.candidate.reset_root(snapshot.candidate);
        self.vote.reset_root(snapshot.vote);
        self.mint_cnt.reset_root(snapshot.mint_cnt);
    }

    /// Persist all five tries and return their roots
    pub fn commit(&mut self) -> ConsensusResult<DposRoots> {
        Ok(DposRoots {
            epoch: self.epoch.commit()?,
            delegate: self.delegate.commit()?,
            candidate: self.candidate.commit()?,
            vote: self.vote.commit()?,
            mint_cnt: self.mint_cnt.commit()?,
        })
    }

    /// Register an address as a validator candidate. Idempotent.
    pub fn become_candidate(&mut self, candidate: &Address) -> ConsensusResult<()> {
        self.candidate
            .insert(&candidate_key(candidate), candidate.as_bytes().to_vec())?;
        Ok(())
    }

    /// Whether an address is a registered candidate
    pub fn is_candidate(&self, candidate: &Address) -> ConsensusResult<bool> {
        Ok(self.candidate.contains_key(&candidate_key(candidate))?)
    }

    /// Remove a candidate together with every delegation edge pointing at it.
    ///
    /// Absent backing nodes along the delete paths mean the removal is
    /// already satisfied and are tolerated; any other trie failure
    /// propagates. Calling this twice is a no-op.
    pub fn kickout_candidate(&mut self, candidate: &Address) -> ConsensusResult<()> {
        ignore_missing(self.candidate.remove(&candidate_key(candidate)))?;

        for (key, delegator_bytes) in self.delegate.iter_prefix(&delegate_prefix(candidate))? {
            ignore_missing(self.delegate.remove(&key))?;

            let delegator = decode_address(&delegator_bytes)?;
            let vote_key = vote_key(&delegator);
            // Drop the reverse edge only while it still points at this
            // candidate; the delegator may have re-voted since.
            let target = ignore_missing(self.vote.get(&vote_key))?.flatten();
            if target.as_deref() == Some(candidate.as_bytes().as_slice()) {
                ignore_missing(self.vote.remove(&vote_key))?;
            }
        }
        Ok(())
    }

    /// Point `delegator`'s stake at `candidate`.
    ///
    /// Fails when the candidate is not registered. An existing vote for a
    /// different candidate is replaced: only that single old delegation edge
    /// is removed.
    pub fn delegate(&mut self, delegator: &Address, candidate: &Address) -> ConsensusResult<()> {
        if !self.is_candidate(candidate)? {
            return Err(ConsensusError::CandidateNotFound(*candidate));
        }

        if let Some(old_target) = self.vote_target(delegator)? {
            if old_target != *candidate {
                self.delegate
                    .remove(&delegate_key(&old_target, delegator))?;
            }
        }

        self.delegate.insert(
            &delegate_key(candidate, delegator),
            delegator.as_bytes().to_vec(),
        )?;
        self.vote
            .insert(&vote_key(delegator), candidate.as_bytes().to_vec())?;
        Ok(())
    }

    /// Withdraw `delegator`'s stake from `candidate`.
    ///
    /// Fails unless the delegator's current vote target is exactly
    /// `candidate`; otherwise removes both edges.
    pub fn undelegate(&mut self, delegator: &Address, candidate: &Address) -> ConsensusResult<()> {
        let voted = self.vote_target(delegator)?;
        if voted != Some(*candidate) {
            return Err(ConsensusError::UndelegateMismatch {
                delegator: *delegator,
                candidate: *candidate,
                voted,
            });
        }

        self.delegate.remove(&delegate_key(candidate, delegator))?;
        self.vote.remove(&vote_key(delegator))?;
        Ok(())
    }

    /// The candidate `delegator` currently votes for, if any
    pub fn vote_target(&self, delegator: &Address) -> ConsensusResult<Option<Address>> {
        match self.vote.get(&vote_key(delegator))? {
            None => Ok(None),
            Some(bytes) => Ok(Some(decode_address(&bytes)?)),
        }
    }

    /// Tally the stake behind every registered candidate.
    ///
    /// A candidate's weight is the sum of the current account balances of
    /// its delegators; candidates without delegators appear with weight 0.
    /// Fails when no candidate is registered at all.
    pub fn count_votes(
        &self,
        balances: &dyn BalanceProvider,
    ) -> ConsensusResult<BTreeMap<Address, Wei>> {
        let mut votes = BTreeMap::new();

        for (_, candidate_bytes) in self.candidate.iter_prefix(CANDIDATE_PREFIX)? {
            let candidate = decode_address(&candidate_bytes)?;
            let mut weight: Wei = 0;

            for (_, delegator_bytes) in self.delegate.iter_prefix(&delegate_prefix(&candidate))? {
                let delegator = decode_address(&delegator_bytes)?;
                weight = weight.saturating_add(balances.balance(&delegator));
            }

            votes.insert(candidate, weight);
        }

        if votes.is_empty() {
            return Err(ConsensusError::NoCandidates);
        }
        Ok(votes)
    }

    /// Number of registered candidates, scanning at most `limit` entries
    pub fn candidate_count_up_to(&self, limit: usize) -> ConsensusResult<usize> {
        Ok(self
            .candidate
            .iter_prefix(CANDIDATE_PREFIX)?
            .iter()
            .take(limit)
            .count())
    }

    /// Current validator set (empty before the first election)
    pub fn validators(&self) -> ConsensusResult<Vec<Address>> {
        match self.epoch.get(&validators_key())? {
            None => Ok(Vec::new()),
            Some(bytes) => {
                let (validators, _): (Vec<Address>, usize) =
                    bincode::decode_from_slice(&bytes, bincode::config::standard())
                        .map_err(|e| TrieError::Codec(e.to_string()))?;
                Ok(validators)
            }
        }
    }

    /// Replace the validator set wholesale: the epoch trie is swapped for a
    /// fresh empty one holding only the new ordered list.
    pub fn set_validators(&mut self, validators: &[Address]) -> ConsensusResult<()> {
        let encoded = bincode::encode_to_vec(validators, bincode::config::standard())
            .map_err(|e| TrieError::Codec(e.to_string()))?;

        self.epoch = Trie::new(self.db.clone());
        self.epoch.insert(&validators_key(), encoded)?;
        Ok(())
    }

    /// Blocks minted by `validator` within `epoch`
    pub fn mint_count(&self, epoch: u64, validator: &Address) -> ConsensusResult<u64> {
        match self.mint_cnt.get(&mint_cnt_key(epoch, validator))? {
            None => Ok(0),
            Some(bytes) => {
                let arr: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| TrieError::Codec("mint count must be 8 bytes".to_string()))?;
                Ok(u64::from_be_bytes(arr))
            }
        }
    }

    /// Record one produced block for the validator owning the slot at
    /// `timestamp`
    pub fn update_mint_count(
        &mut self,
        timestamp: Timestamp,
        epoch_interval: u64,
        validator: &Address,
    ) -> ConsensusResult<()> {
        let epoch = timestamp / epoch_interval;
        let count = self.mint_count(epoch, validator)? + 1;
        self.mint_cnt.insert(
            &mint_cnt_key(epoch, validator),
            count.to_be_bytes().to_vec(),
        )?;
        Ok(())
    }

    /// Whether any validator minted a block within `epoch`
    pub fn has_mint_counts(&self, epoch: u64) -> ConsensusResult<bool> {
        Ok(!self.mint_cnt.iter_prefix(&mint_cnt_prefix(epoch))?.is_empty())
    }
}

/// Decode a stored address value, rejecting corrupt lengths instead of
/// panicking on them.
fn decode_address(bytes: &[u8]) -> Result<Address, TrieError> {
    if bytes.len() != 20 {
        return Err(TrieError::Codec(format!(
            "address value must be 20 bytes, got {}",
            bytes.len()
        )));
    }
    Ok(Address::from_slice(bytes))
}

/// Treat a missing backing node as an already-satisfied outcome; propagate
/// every other trie failure.
fn ignore_missing<T>(result: TrieResult<T>) -> Result<Option<T>, TrieError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(TrieError::MissingNode(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

fn candidate_key(candidate: &Address) -> Vec<u8> {
    [CANDIDATE_PREFIX, candidate.as_bytes()].concat()
}

fn delegate_prefix(candidate: &Address) -> Vec<u8> {
    [DELEGATE_PREFIX, candidate.as_bytes()].concat()
}

fn delegate_key(candidate: &Address, delegator: &Address) -> Vec<u8> {
    [DELEGATE_PREFIX, candidate.as_bytes(), delegator.as_bytes()].concat()
}

fn vote_key(delegator: &Address) -> Vec<u8> {
    [VOTE_PREFIX, delegator.as_bytes()].concat()
}

fn validators_key() -> Vec<u8> {
    [EPOCH_PREFIX, VALIDATORS_KEY_SUFFIX].concat()
}

fn mint_cnt_key(epoch: u64, validator: &Address) -> Vec<u8> {
    [MINT_CNT_PREFIX, &epoch.to_be_bytes(), validator.as_bytes()].concat()
}

fn mint_cnt_prefix(epoch: u64) -> Vec<u8> {
    [MINT_CNT_PREFIX, &epoch.to_be_bytes()[..]].concat()
}
