#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(not(test), no_std)]

extern crate alloc;

mod errors;
pub use errors::{
    OrderedListWalkerError, OrderedListWalkerResult, TrieNodeError, TrieNodeResult,
};

mod traits;
pub use traits::TrieProvider;

mod node;
pub use node::TrieNode;

mod account;
pub use account::TrieAccount;

mod state;
pub use state::{account_at, storage_at};

mod list_walker;
pub use list_walker::OrderedListWalker;

mod util;
pub use util::ordered_trie_with_encoder;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_util;
