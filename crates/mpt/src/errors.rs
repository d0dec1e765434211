//! Errors for the `interlock-mpt` crate.

use alloc::string::String;
use thiserror::Error;

/// A [Result] type alias where the error is [TrieNodeError].
pub type TrieNodeResult<T> = Result<T, TrieNodeError>;

/// An error raised while decoding or traversing [TrieNode]s.
///
/// [TrieNode]: crate::TrieNode
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TrieNodeError {
    /// A node of an unexpected kind was found where a leaf or branch was required.
    #[error("Invalid trie node type encountered")]
    InvalidNodeType,
    /// A node or value failed to RLP decode.
    #[error("Failed to decode trie node: {0}")]
    RLPError(alloy_rlp::Error),
    /// The [TrieProvider](crate::TrieProvider) could not supply a node.
    #[error("Trie provider error: {0}")]
    Provider(String),
}

impl From<alloy_rlp::Error> for TrieNodeError {
    fn from(err: alloy_rlp::Error) -> Self {
        Self::RLPError(err)
    }
}

/// A [Result] type alias where the error is [OrderedListWalkerError].
pub type OrderedListWalkerResult<T> = Result<T, OrderedListWalkerError>;

/// An error type for [OrderedListWalker] operations.
///
/// [OrderedListWalker]: crate::OrderedListWalker
#[derive(Error, Debug, PartialEq, Eq)]
pub enum OrderedListWalkerError {
    /// The walker still holds leaves from a previous hydration.
    #[error("Iterator has already been hydrated, and cannot be re-hydrated until it is exhausted")]
    AlreadyHydrated,
    /// Trie node error.
    #[error(transparent)]
    TrieNode(#[from] TrieNodeError),
}
