//! Authenticated key-value trie with prefix iteration
//!
//! A radix-16 Merkle trie over a shared, append-only, content-addressed node
//! store. Every mutation path-copies the touched nodes, so old roots stay
//! readable forever: snapshotting a trie is copying its root hash, and
//! reverting is restoring that hash. The node shape is a pure function of the
//! stored key set (branches collapse back into leaves on delete), so equal
//! contents always produce equal roots regardless of operation order.

use crate::Hash;
use parking_lot::RwLock;
use sha3::{Digest, Keccak256};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Trie errors, with missing backing nodes distinguished from everything else
/// so callers can decide when an absent node is tolerable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrieError {
    #[error("missing trie node {0}")]
    MissingNode(Hash),

    #[error("trie codec error: {0}")]
    Codec(String),
}

/// Result type for trie operations
pub type TrieResult<T> = Result<T, TrieError>;

/// A trie node. Leaf keys hold the remaining nibbles below the node's
/// position; branch children are content addresses into the shared store.
#[derive(Debug, Clone, bincode::Encode)]
enum TrieNode {
    Leaf {
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Branch {
        children: [Option<Hash>; 16],
        value: Option<Vec<u8>>,
    },
}

/// Shared append-only node store. Nodes are keyed by the Keccak256 hash of
/// their encoding and are never overwritten or removed, which is what makes
/// root-pointer snapshots sound.
#[derive(Debug, Clone, Default)]
pub struct TrieDb {
    nodes: Arc<RwLock<HashMap<Hash, TrieNode>>>,
}

impl TrieDb {
    /// Create a new empty node store
    pub fn new() -> Self {
        Self::default()
    }

    fn load(&self, hash: &Hash) -> TrieResult<TrieNode> {
        self.nodes
            .read()
            .get(hash)
            .cloned()
            .ok_or(TrieError::MissingNode(*hash))
    }

    fn store(&self, node: TrieNode) -> TrieResult<Hash> {
        let encoded = bincode::encode_to_vec(&node, bincode::config::standard())
            .map_err(|e| TrieError::Codec(e.to_string()))?;
        let hash = Hash::from_slice(Keccak256::digest(&encoded).as_slice());
        self.nodes.write().insert(hash, node);
        Ok(hash)
    }

    /// Number of stored nodes
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }
}

/// A trie handle: a root hash plus the shared node store. Cloning the handle
/// yields an independent view pinned to the same root.
#[derive(Debug, Clone)]
pub struct Trie {
    db: TrieDb,
    root: Hash,
}

impl Trie {
    /// Create an empty trie over `db`
    pub fn new(db: TrieDb) -> Self {
        Self {
            db,
            root: Hash::zero(),
        }
    }

    /// Open a trie at an existing root
    pub fn from_root(db: TrieDb, root: Hash) -> Self {
        Self { db, root }
    }

    /// The shared node store backing this trie
    pub fn db(&self) -> &TrieDb {
        &self.db
    }

    /// Current root hash (zero hash for an empty trie)
    pub fn root_hash(&self) -> Hash {
        self.root
    }

    /// Reset the root to a previously obtained hash
    pub fn reset_root(&mut self, root: Hash) {
        self.root = root;
    }

    /// Persist the trie and return its root. The backing store is append-only,
    /// so this is a root handoff rather than a flush.
    pub fn commit(&mut self) -> TrieResult<Hash> {
        Ok(self.root)
    }

    /// Get value by key
    pub fn get(&self, key: &[u8]) -> TrieResult<Option<Vec<u8>>> {
        if self.root == Hash::zero() {
            return Ok(None);
        }
        self.get_at(&self.root, &bytes_to_nibbles(key))
    }

    /// Check if key exists
    pub fn contains_key(&self, key: &[u8]) -> TrieResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Insert key-value pair
    pub fn insert(&mut self, key: &[u8], value: Vec<u8>) -> TrieResult<()> {
        let nibbles = bytes_to_nibbles(key);
        self.root = if self.root == Hash::zero() {
            self.db.store(TrieNode::Leaf {
                key: nibbles,
                value,
            })?
        } else {
            let root = self.root;
            self.insert_at(&root, &nibbles, value)?
        };
        Ok(())
    }

    /// Remove key, returning the previous value if any. Removing an absent
    /// key is Ok(None), not an error.
    pub fn remove(&mut self, key: &[u8]) -> TrieResult<Option<Vec<u8>>> {
        if self.root == Hash::zero() {
            return Ok(None);
        }
        let root = self.root;
        let (new_root, removed) = self.remove_at(&root, &bytes_to_nibbles(key))?;
        self.root = new_root.unwrap_or_else(Hash::zero);
        Ok(removed)
    }

    /// All entries whose key starts with `prefix`, in ascending key order
    pub fn iter_prefix(&self, prefix: &[u8]) -> TrieResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut entries = Vec::new();
        if self.root == Hash::zero() {
            return Ok(entries);
        }

        let prefix_nibbles = bytes_to_nibbles(prefix);
        self.collect_at(&self.root, &prefix_nibbles, Vec::new(), &mut entries)?;
        Ok(entries)
    }

    fn get_at(&self, node_hash: &Hash, key: &[u8]) -> TrieResult<Option<Vec<u8>>> {
        match self.db.load(node_hash)? {
            TrieNode::Leaf {
                key: leaf_key,
                value,
            } => Ok((key == leaf_key).then_some(value)),
            TrieNode::Branch { children, value } => {
                if key.is_empty() {
                    return Ok(value);
                }
                match &children[key[0] as usize] {
                    Some(child) => self.get_at(child, &key[1..]),
                    None => Ok(None),
                }
            }
        }
    }

    fn insert_at(&mut self, node_hash: &Hash, key: &[u8], value: Vec<u8>) -> TrieResult<Hash> {
        match self.db.load(node_hash)? {
            TrieNode::Leaf {
                key: leaf_key,
                value: leaf_value,
            } => {
                if key == leaf_key {
                    return self.db.store(TrieNode::Leaf {
                        key: leaf_key,
                        value,
                    });
                }
                self.split_leaf(leaf_key, leaf_value, key.to_vec(), value)
            }
            TrieNode::Branch {
                mut children,
                value: branch_value,
            } => {
                if key.is_empty() {
                    return self.db.store(TrieNode::Branch {
                        children,
                        value: Some(value),
                    });
                }
                let index = key[0] as usize;
                let new_child = match &children[index] {
                    Some(child) => self.insert_at(child, &key[1..], value)?,
                    None => self.db.store(TrieNode::Leaf {
                        key: key[1..].to_vec(),
                        value,
                    })?,
                };
                children[index] = Some(new_child);
                self.db.store(TrieNode::Branch {
                    children,
                    value: branch_value,
                })
            }
        }
    }

    /// Replace a leaf by the branch structure holding both the old entry and
    /// the new one.
    fn split_leaf(
        &mut self,
        old_key: Vec<u8>,
        old_value: Vec<u8>,
        new_key: Vec<u8>,
        new_value: Vec<u8>,
    ) -> TrieResult<Hash> {
        let mut children: [Option<Hash>; 16] = Default::default();
        let mut branch_value = None;

        match (old_key.split_first(), new_key.split_first()) {
            (None, Some((&n, new_rest))) => {
                branch_value = Some(old_value);
                children[n as usize] = Some(self.db.store(TrieNode::Leaf {
                    key: new_rest.to_vec(),
                    value: new_value,
                })?);
            }
            (Some((&o, old_rest)), None) => {
                branch_value = Some(new_value);
                children[o as usize] = Some(self.db.store(TrieNode::Leaf {
                    key: old_rest.to_vec(),
                    value: old_value,
                })?);
            }
            (Some((&o, old_rest)), Some((&n, new_rest))) if o != n => {
                children[o as usize] = Some(self.db.store(TrieNode::Leaf {
                    key: old_rest.to_vec(),
                    value: old_value,
                })?);
                children[n as usize] = Some(self.db.store(TrieNode::Leaf {
                    key: new_rest.to_vec(),
                    value: new_value,
                })?);
            }
            (Some((&o, old_rest)), Some((_, new_rest))) => {
                // Shared first nibble: push both entries one level down.
                let child =
                    self.split_leaf(old_rest.to_vec(), old_value, new_rest.to_vec(), new_value)?;
                children[o as usize] = Some(child);
            }
            (None, None) => unreachable!("equal keys are handled by insert_at"),
        }

        self.db.store(TrieNode::Branch {
            children,
            value: branch_value,
        })
    }

    fn remove_at(
        &mut self,
        node_hash: &Hash,
        key: &[u8],
    ) -> TrieResult<(Option<Hash>, Option<Vec<u8>>)> {
        match self.db.load(node_hash)? {
            TrieNode::Leaf {
                key: leaf_key,
                value,
            } => {
                if key == leaf_key {
                    Ok((None, Some(value)))
                } else {
                    Ok((Some(*node_hash), None))
                }
            }
            TrieNode::Branch {
                mut children,
                value: branch_value,
            } => {
                if key.is_empty() {
                    return match branch_value {
                        None => Ok((Some(*node_hash), None)),
                        Some(value) => {
                            let hash = self.normalize_branch(children, None)?;
                            Ok((hash, Some(value)))
                        }
                    };
                }

                let index = key[0] as usize;
                let child = match &children[index] {
                    Some(child) => *child,
                    None => return Ok((Some(*node_hash), None)),
                };

                let (new_child, removed) = self.remove_at(&child, &key[1..])?;
                if removed.is_none() {
                    return Ok((Some(*node_hash), None));
                }

                children[index] = new_child;
                let hash = self.normalize_branch(children, branch_value)?;
                Ok((hash, removed))
            }
        }
    }

    /// Rebuild a branch after a removal, collapsing degenerate shapes so the
    /// node structure stays canonical for the remaining key set.
    fn normalize_branch(
        &mut self,
        children: [Option<Hash>; 16],
        value: Option<Vec<u8>>,
    ) -> TrieResult<Option<Hash>> {
        let populated: Vec<usize> = (0..16).filter(|i| children[*i].is_some()).collect();

        if populated.is_empty() {
            return match value {
                None => Ok(None),
                Some(value) => {
                    let hash = self.db.store(TrieNode::Leaf {
                        key: Vec::new(),
                        value,
                    })?;
                    Ok(Some(hash))
                }
            };
        }

        if let ([index], None) = (populated.as_slice(), &value) {
            let index = *index;
            let child_hash = children[index].ok_or_else(|| {
                TrieError::Codec("populated branch slot without child".to_string())
            })?;
            // A lone leaf child merges back into its parent position; a lone
            // branch child still holds at least two entries and stays as is.
            if let TrieNode::Leaf {
                key: mut leaf_key,
                value: leaf_value,
            } = self.db.load(&child_hash)?
            {
                leaf_key.insert(0, index as u8);
                let hash = self.db.store(TrieNode::Leaf {
                    key: leaf_key,
                    value: leaf_value,
                })?;
                return Ok(Some(hash));
            }
        }

        let hash = self.db.store(TrieNode::Branch { children, value })?;
        Ok(Some(hash))
    }

    fn collect_at(
        &self,
        node_hash: &Hash,
        prefix: &[u8],
        path: Vec<u8>,
        entries: &mut Vec<(Vec<u8>, Vec<u8>)>,
    ) -> TrieResult<()> {
        match self.db.load(node_hash)? {
            TrieNode::Leaf {
                key: leaf_key,
                value,
            } => {
                if leaf_key.len() >= prefix.len() && leaf_key[..prefix.len()] == *prefix {
                    let mut full = path;
                    full.extend_from_slice(&leaf_key);
                    entries.push((nibbles_to_bytes(&full), value));
                }
                Ok(())
            }
            TrieNode::Branch { children, value } => {
                if prefix.is_empty() {
                    if let Some(value) = value {
                        entries.push((nibbles_to_bytes(&path), value));
                    }
                    for (index, child) in children.iter().enumerate() {
                        if let Some(child) = child {
                            let mut child_path = path.clone();
                            child_path.push(index as u8);
                            self.collect_at(child, &[], child_path, entries)?;
                        }
                    }
                    Ok(())
                } else {
                    let index = prefix[0] as usize;
                    match &children[index] {
                        Some(child) => {
                            let mut child_path = path;
                            child_path.push(prefix[0]);
                            self.collect_at(child, &prefix[1..], child_path, entries)
                        }
                        None => Ok(()),
                    }
                }
            }
        }
    }
}

/// Convert bytes to nibbles (4-bit values)
fn bytes_to_nibbles(bytes: &[u8]) -> Vec<u8> {
    let mut nibbles = Vec::with_capacity(bytes.len() * 2);
    for byte in bytes {
        nibbles.push(byte >> 4);
        nibbles.push(byte & 0x0f);
    }
    nibbles
}

/// Convert nibbles back to bytes (nibble count is always even for byte keys)
fn nibbles_to_bytes(nibbles: &[u8]) -> Vec<u8> {
    nibbles
        .chunks(2)
        .map(|chunk| (chunk[0] << 4) | chunk.get(1).copied().unwrap_or(0))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled_trie(pairs: &[(&[u8], &[u8])]) -> Trie {
        let mut trie = Trie::new(TrieDb::new());
        for (key, value) in pairs {
            trie.insert(key, value.to_vec()).unwrap();
        }
        trie
    }

    #[test]
    fn test_empty_trie() {
        let trie = Trie::new(TrieDb::new());
        assert_eq!(trie.root_hash(), Hash::zero());
        assert_eq!(trie.get(b"missing").unwrap(), None);
        assert!(trie.iter_prefix(b"").unwrap().is_empty());
    }

    #[test]
    fn test_insert_get_remove() {
        let mut trie = filled_trie(&[(b"vote-alice", b"bob"), (b"vote-carol", b"dave")]);

        assert_eq!(trie.get(b"vote-alice").unwrap(), Some(b"bob".to_vec()));
        assert_eq!(trie.get(b"vote-carol").unwrap(), Some(b"dave".to_vec()));
        assert_eq!(trie.get(b"vote-eve").unwrap(), None);

        assert_eq!(trie.remove(b"vote-alice").unwrap(), Some(b"bob".to_vec()));
        assert_eq!(trie.get(b"vote-alice").unwrap(), None);
        assert_eq!(trie.get(b"vote-carol").unwrap(), Some(b"dave".to_vec()));

        // Removing an absent key is a no-op, not an error
        assert_eq!(trie.remove(b"vote-alice").unwrap(), None);
    }

    #[test]
    fn test_overwrite_value() {
        let mut trie = filled_trie(&[(b"k", b"v1")]);
        trie.insert(b"k", b"v2".to_vec()).unwrap();
        assert_eq!(trie.get(b"k").unwrap(), Some(b"v2".to_vec()));
    }

    #[test]
    fn test_root_is_content_determined() {
        // Same contents via different operation orders must give equal roots
        let a = filled_trie(&[(b"aa", b"1"), (b"ab", b"2"), (b"cd", b"3")]);

        let mut b = filled_trie(&[(b"cd", b"3"), (b"ab", b"2"), (b"zz", b"9"), (b"aa", b"1")]);
        b.remove(b"zz").unwrap();

        assert_eq!(a.root_hash(), b.root_hash());
    }

    #[test]
    fn test_delete_collapses_to_insert_shape() {
        let mut a = filled_trie(&[(b"abcdef01", b"x"), (b"abcdef02", b"y")]);
        a.remove(b"abcdef02").unwrap();

        let b = filled_trie(&[(b"abcdef01", b"x")]);
        assert_eq!(a.root_hash(), b.root_hash());
    }

    #[test]
    fn test_prefix_iteration_ordered() {
        let trie = filled_trie(&[
            (b"delegate-bb", b"2"),
            (b"delegate-aa", b"1"),
            (b"vote-aa", b"3"),
            (b"delegate-cc", b"4"),
        ]);

        let entries = trie.iter_prefix(b"delegate-").unwrap();
        let keys: Vec<&[u8]> = entries.iter().map(|(k, _)| k.as_slice()).collect();
        assert_eq!(
            keys,
            vec![
                b"delegate-aa".as_slice(),
                b"delegate-bb".as_slice(),
                b"delegate-cc".as_slice()
            ]
        );
    }

    #[test]
    fn test_snapshot_via_root_restore() {
        let mut trie = filled_trie(&[(b"k1", b"v1"), (b"k2", b"v2")]);
        let snapshot = trie.root_hash();

        trie.insert(b"k3", b"v3".to_vec()).unwrap();
        trie.remove(b"k1").unwrap();
        assert_ne!(trie.root_hash(), snapshot);

        trie.reset_root(snapshot);
        assert_eq!(trie.root_hash(), snapshot);
        assert_eq!(trie.get(b"k1").unwrap(), Some(b"v1".to_vec()));
        assert_eq!(trie.get(b"k3").unwrap(), None);
    }

    #[test]
    fn test_missing_node_is_distinguished() {
        let mut trie = Trie::new(TrieDb::new());
        trie.insert(b"key", b"value".to_vec()).unwrap();

        // Re-open the root against an empty store: the node is gone
        let detached = Trie::from_root(TrieDb::new(), trie.root_hash());
        match detached.get(b"key") {
            Err(TrieError::MissingNode(hash)) => assert_eq!(hash, trie.root_hash()),
            other => panic!("expected MissingNode, got {:?}", other),
        }
    }
}
