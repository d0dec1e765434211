//! In-memory trie fixtures.

use crate::{TrieAccount, TrieNode, TrieProvider};
use alloc::{collections::BTreeMap, vec::Vec};
use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_rlp::Decodable;
use alloy_trie::{proof::ProofRetainer, HashBuilder, Nibbles, EMPTY_ROOT_HASH};

/// Error returned by [TrieNodeProvider].
#[derive(thiserror::Error, Debug, Eq, PartialEq)]
#[error("TrieNodeProvider: {0}")]
pub struct TrieNodeProviderError(&'static str);

/// A [TrieProvider] serving nodes from an in-memory preimage map.
#[derive(Debug, Clone, Default)]
pub struct TrieNodeProvider {
    preimages: BTreeMap<B256, Bytes>,
}

impl TrieNodeProvider {
    /// Creates a provider over `preimages`.
    pub const fn new(preimages: BTreeMap<B256, Bytes>) -> Self {
        Self { preimages }
    }
}

impl TrieProvider for TrieNodeProvider {
    type Error = TrieNodeProviderError;

    fn trie_node_by_hash(&self, key: B256) -> Result<TrieNode, Self::Error> {
        let raw = self.preimages.get(&key).ok_or(TrieNodeProviderError("node not found"))?;
        TrieNode::decode(&mut raw.as_ref()).map_err(|_| TrieNodeProviderError("bad trie node"))
    }
}

/// Builds a trie over `entries` and returns its root with every node keyed by its hash.
pub fn build_trie(mut entries: Vec<(Nibbles, Vec<u8>)>) -> (B256, BTreeMap<B256, Bytes>) {
    if entries.is_empty() {
        return (EMPTY_ROOT_HASH, BTreeMap::new());
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let retainer = ProofRetainer::new(entries.iter().map(|(k, _)| k.clone()).collect());
    let mut builder = HashBuilder::default().with_proof_retainer(retainer);
    for (key, value) in &entries {
        builder.add_leaf(key.clone(), value);
    }
    let root = builder.root();
    let nodes = builder
        .take_proof_nodes()
        .into_inner()
        .into_values()
        .map(|node| (keccak256(node.as_ref()), node))
        .collect();
    (root, nodes)
}

/// Builds a state trie holding `accounts`.
pub fn build_state_trie(accounts: &[(Address, TrieAccount)]) -> (B256, BTreeMap<B256, Bytes>) {
    build_trie(
        accounts
            .iter()
            .map(|(address, account)| {
                (Nibbles::unpack(keccak256(address)), alloy_rlp::encode(account))
            })
            .collect(),
    )
}

/// Builds a storage trie holding the non-zero `slots`.
pub fn build_storage_trie(slots: &[(U256, U256)]) -> (B256, BTreeMap<B256, Bytes>) {
    build_trie(
        slots
            .iter()
            .filter(|(_, value)| !value.is_zero())
            .map(|(slot, value)| {
                (Nibbles::unpack(keccak256(slot.to_be_bytes::<32>())), alloy_rlp::encode(value))
            })
            .collect(),
    )
}
