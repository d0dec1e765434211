//! The [TrieAccount] type: the value stored for each address in the state trie.

use alloy_primitives::{B256, U256};
use alloy_rlp::{RlpDecodable, RlpEncodable};

/// An account as it is RLP encoded in the state trie.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, RlpEncodable, RlpDecodable)]
pub struct TrieAccount {
    /// The account nonce.
    pub nonce: u64,
    /// The account balance.
    pub balance: U256,
    /// The root of the account's storage trie.
    pub storage_root: B256,
    /// The hash of the account's code.
    pub code_hash: B256,
}
