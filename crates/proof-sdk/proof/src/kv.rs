//! Key-value storage for preimages produced by the program, and the state database layered over
//! it.

use crate::{errors::OracleProviderError, l2::L2Oracle};
use alloc::{collections::BTreeMap, sync::Arc};
use alloy_primitives::{keccak256, Bytes, B256};
use alloy_rlp::Decodable;
use interlock_mpt::{TrieNode, TrieProvider};
use spin::Mutex;

/// Storage for preimages created while executing blocks, keyed by their `keccak256` hash.
pub trait KeyValueStore {
    /// Returns the value stored under `key`.
    fn get(&self, key: B256) -> Option<Bytes>;

    /// Stores `value` under `key`.
    fn set(&self, key: B256, value: Bytes);

    /// Stores `value` under its `keccak256` hash.
    fn insert_preimage(&self, value: Bytes) -> B256 {
        let key = keccak256(&value);
        self.set(key, value);
        key
    }
}

/// An in-memory [KeyValueStore]. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct MemoryKv {
    inner: Arc<Mutex<BTreeMap<B256, Bytes>>>,
}

impl MemoryKv {
    /// Returns the number of stored values.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl KeyValueStore for MemoryKv {
    fn get(&self, key: B256) -> Option<Bytes> {
        self.inner.lock().get(&key).cloned()
    }

    fn set(&self, key: B256, value: Bytes) {
        self.inner.lock().insert(key, value);
    }
}

/// The state of a chain as seen by a block executor: trie nodes and contract code, with writes
/// going to a local store.
pub trait StateDatabase: TrieProvider<Error = OracleProviderError> {
    /// Returns the contract code with the given hash.
    fn code_by_hash(&self, code_hash: B256) -> Result<Bytes, OracleProviderError>;

    /// Stores a trie node or contract code created during execution.
    fn insert_preimage(&self, value: Bytes) -> B256;
}

/// A [StateDatabase] that serves values from a [KeyValueStore] and falls back to an [L2Oracle].
#[derive(Debug, Clone)]
pub struct OracleBackedDb<O, K> {
    oracle: O,
    kv: K,
    chain_id: u64,
}

impl<O: L2Oracle, K: KeyValueStore> OracleBackedDb<O, K> {
    /// Creates a new [OracleBackedDb].
    pub const fn new(oracle: O, kv: K, chain_id: u64) -> Self {
        Self { oracle, kv, chain_id }
    }

    /// Returns the local store.
    pub const fn kv(&self) -> &K {
        &self.kv
    }

    /// Returns the raw trie node with the given hash.
    pub fn node_by_hash(&self, node_hash: B256) -> Result<Bytes, OracleProviderError> {
        match self.kv.get(node_hash) {
            Some(node) => Ok(node),
            None => self.oracle.node_by_hash(node_hash, self.chain_id),
        }
    }
}

impl<O: L2Oracle, K: KeyValueStore> TrieProvider for OracleBackedDb<O, K> {
    type Error = OracleProviderError;

    fn trie_node_by_hash(&self, key: B256) -> Result<TrieNode, Self::Error> {
        let raw = self.node_by_hash(key)?;
        TrieNode::decode(&mut raw.as_ref()).map_err(OracleProviderError::Rlp)
    }
}

impl<O: L2Oracle, K: KeyValueStore> StateDatabase for OracleBackedDb<O, K> {
    fn code_by_hash(&self, code_hash: B256) -> Result<Bytes, OracleProviderError> {
        match self.kv.get(code_hash) {
            Some(code) => Ok(code),
            None => self.oracle.code_by_hash(code_hash, self.chain_id),
        }
    }

    fn insert_preimage(&self, value: Bytes) -> B256 {
        self.kv.insert_preimage(value)
    }
}
