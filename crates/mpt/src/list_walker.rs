//! This module contains the [OrderedListWalker] struct, which allows for traversing an MPT root of
//! a derivable ordered list.

use crate::{
    errors::{OrderedListWalkerError, OrderedListWalkerResult},
    TrieNode, TrieNodeError, TrieProvider,
};
use alloc::{collections::VecDeque, string::ToString, vec};
use alloy_primitives::{Bytes, B256};
use alloy_rlp::EMPTY_STRING_CODE;
use core::marker::PhantomData;

/// Walks a Merkle Patricia Trie holding a derivable ordered list (transactions or receipts of a
/// block) and yields its values in list order.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct OrderedListWalker<F: TrieProvider> {
    /// The trie root.
    root: B256,
    /// The `(path, value)` leaves in list order. [None] until [Self::hydrate] has run.
    inner: Option<VecDeque<(Bytes, Bytes)>>,
    _phantom: PhantomData<F>,
}

impl<F: TrieProvider> OrderedListWalker<F> {
    /// Creates a new [OrderedListWalker], yet to be hydrated.
    pub const fn new(root: B256) -> Self {
        Self { root, inner: None, _phantom: PhantomData }
    }

    /// Creates a new [OrderedListWalker] and hydrates it immediately.
    pub fn try_new_hydrated(root: B256, fetcher: &F) -> OrderedListWalkerResult<Self> {
        let mut walker = Self::new(root);
        walker.hydrate(fetcher)?;
        Ok(walker)
    }

    /// Fetches every leaf below the root and orders them by list index.
    pub fn hydrate(&mut self, fetcher: &F) -> OrderedListWalkerResult<()> {
        if self.inner.as_ref().is_some_and(|leaves| !leaves.is_empty()) {
            return Err(OrderedListWalkerError::AlreadyHydrated);
        }

        let root = TrieNode::new_blinded(self.root);
        let mut leaves = Self::fetch_leaves(&root, fetcher)?;

        // Index 0 is keyed by the RLP empty string (0x80), so in nibble order it lands after
        // index 0x7f, or last in lists shorter than 0x80.
        let first = if leaves.len() <= EMPTY_STRING_CODE as usize {
            leaves.pop_back()
        } else {
            leaves.remove((EMPTY_STRING_CODE - 1) as usize)
        };
        if let Some(first) = first {
            leaves.push_front(first);
        }

        self.inner = Some(leaves);
        Ok(())
    }

    /// Takes the hydrated leaves, leaving the walker empty.
    pub fn take_inner(&mut self) -> Option<VecDeque<(Bytes, Bytes)>> {
        self.inner.take()
    }

    /// Collects the leaves below `node` in nibble order.
    fn fetch_leaves(
        node: &TrieNode,
        fetcher: &F,
    ) -> OrderedListWalkerResult<VecDeque<(Bytes, Bytes)>> {
        match node {
            TrieNode::Empty => Ok(VecDeque::new()),
            TrieNode::Blinded { commitment } => {
                let node = fetcher
                    .trie_node_by_hash(*commitment)
                    .map_err(|e| TrieNodeError::Provider(e.to_string()))?;
                Self::fetch_leaves(&node, fetcher)
            }
            TrieNode::Leaf { prefix, value } => {
                Ok(vec![(Bytes::copy_from_slice(prefix.as_slice()), value.clone())].into())
            }
            TrieNode::Extension { node, .. } => Self::fetch_leaves(node, fetcher),
            TrieNode::Branch { stack } => {
                let mut leaves = VecDeque::new();
                for child in stack {
                    leaves.append(&mut Self::fetch_leaves(child, fetcher)?);
                }
                Ok(leaves)
            }
        }
    }
}

impl<F: TrieProvider> Iterator for OrderedListWalker<F> {
    type Item = (Bytes, Bytes);

    fn next(&mut self) -> Option<Self::Item> {
        let leaves = self.inner.as_mut()?;
        let item = leaves.pop_front();
        if leaves.is_empty() {
            self.inner = None;
        }
        item
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{ordered_trie_with_encoder, test_util::TrieNodeProvider};
    use alloc::{collections::BTreeMap, string::String, vec::Vec};
    use alloy_primitives::keccak256;
    use alloy_rlp::{Decodable, Encodable};
    use alloy_trie::EMPTY_ROOT_HASH;

    fn walk(values: &[String]) -> Vec<String> {
        let mut trie = ordered_trie_with_encoder(values, |v, buf| v.encode(buf));
        let root = trie.root();
        let preimages = trie
            .take_proof_nodes()
            .into_inner()
            .into_values()
            .map(|node| (keccak256(node.as_ref()), node))
            .collect::<BTreeMap<_, _>>();

        let fetcher = TrieNodeProvider::new(preimages);
        OrderedListWalker::try_new_hydrated(root, &fetcher)
            .unwrap()
            .map(|(_, v)| String::decode(&mut v.as_ref()).unwrap())
            .collect()
    }

    #[test]
    fn test_list_walker() {
        let values = ["test one", "test two", "test three"].map(String::from);
        assert_eq!(walk(&values), values);
    }

    #[test]
    fn test_list_walker_past_rlp_boundary() {
        let values = (0..300).map(|i| alloc::format!("value {i}")).collect::<Vec<_>>();
        assert_eq!(walk(&values), values);
    }

    #[test]
    fn test_empty_list_walker() {
        let fetcher = TrieNodeProvider::default();
        let mut walker = OrderedListWalker::try_new_hydrated(EMPTY_ROOT_HASH, &fetcher).unwrap();
        assert!(walker.next().is_none());
    }

    #[test]
    fn test_rehydrate_rejected() {
        let values = ["a", "b"].map(String::from);
        let mut trie = ordered_trie_with_encoder(&values, |v, buf| v.encode(buf));
        let root = trie.root();
        let preimages = trie
            .take_proof_nodes()
            .into_inner()
            .into_values()
            .map(|node| (keccak256(node.as_ref()), node))
            .collect::<BTreeMap<_, _>>();
        let fetcher = TrieNodeProvider::new(preimages);

        let mut walker = OrderedListWalker::try_new_hydrated(root, &fetcher).unwrap();
        assert_eq!(walker.hydrate(&fetcher), Err(OrderedListWalkerError::AlreadyHydrated));
    }
}
