//! Contains the [TrieProvider] trait for fetching trie node preimages.

use crate::TrieNode;
use alloy_primitives::B256;
use core::fmt::Display;

/// Synchronous source of trie nodes, keyed by the hash of their RLP encoding.
pub trait TrieProvider {
    /// The error type for fetching trie node preimages.
    type Error: Display;

    /// Fetches and decodes the trie node whose RLP encoding hashes to `key`.
    fn trie_node_by_hash(&self, key: B256) -> Result<TrieNode, Self::Error>;
}

impl<T: TrieProvider + ?Sized> TrieProvider for &T {
    type Error = T::Error;

    fn trie_node_by_hash(&self, key: B256) -> Result<TrieNode, Self::Error> {
        (**self).trie_node_by_hash(key)
    }
}
