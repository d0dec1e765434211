//! The [TrieNode] type: a decoded Merkle Patricia Trie node whose children may still be blinded.

use crate::{
    errors::{TrieNodeError, TrieNodeResult},
    TrieProvider,
};
use alloc::{boxed::Box, string::ToString, vec::Vec};
use alloy_primitives::{Bytes, B256};
use alloy_rlp::{Buf, Decodable, Header, EMPTY_STRING_CODE};
use alloy_trie::{Nibbles, EMPTY_ROOT_HASH};

/// The number of items in an RLP encoded branch node.
const BRANCH_LIST_LENGTH: usize = 17;

/// The number of items in an RLP encoded leaf or extension node.
const LEAF_OR_EXTENSION_LIST_LENGTH: usize = 2;

/// Hex-prefix flag of an even-length extension path.
const PREFIX_EXTENSION_EVEN: u8 = 0;

/// Hex-prefix flag of an odd-length extension path.
const PREFIX_EXTENSION_ODD: u8 = 1;

/// Hex-prefix flag of an even-length leaf path.
const PREFIX_LEAF_EVEN: u8 = 2;

/// Hex-prefix flag of an odd-length leaf path.
const PREFIX_LEAF_ODD: u8 = 3;

/// A node within a Merkle Patricia Trie.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub enum TrieNode {
    /// The empty node, `0x80`.
    #[default]
    Empty,
    /// A child referenced by the hash of its RLP encoding, not yet fetched.
    Blinded {
        /// The hash of the node's RLP encoding.
        commitment: B256,
    },
    /// A leaf: the remainder of the key path and the stored value.
    Leaf {
        /// The remaining key nibbles.
        prefix: Nibbles,
        /// The stored value.
        value: Bytes,
    },
    /// An extension: a shared key path and a single child.
    Extension {
        /// The shared key nibbles.
        prefix: Nibbles,
        /// The child node.
        node: Box<TrieNode>,
    },
    /// A branch with 16 children, one per nibble.
    Branch {
        /// The children, indexed by nibble.
        stack: Vec<TrieNode>,
    },
}

impl TrieNode {
    /// Returns a blinded node for `commitment`, or [TrieNode::Empty] for the empty root.
    pub fn new_blinded(commitment: B256) -> Self {
        if commitment == EMPTY_ROOT_HASH {
            Self::Empty
        } else {
            Self::Blinded { commitment }
        }
    }

    /// Resolves `path` (a sequence of nibbles) below this node, fetching blinded nodes from
    /// `provider` as they are reached. Returns [None] if the path is absent.
    pub fn open<P: TrieProvider>(
        &self,
        path: &[u8],
        provider: &P,
    ) -> TrieNodeResult<Option<Bytes>> {
        let mut node = self.clone();
        let mut path = path;
        loop {
            match node {
                Self::Empty => return Ok(None),
                Self::Blinded { commitment } if commitment == EMPTY_ROOT_HASH => return Ok(None),
                Self::Blinded { commitment } => {
                    node = provider
                        .trie_node_by_hash(commitment)
                        .map_err(|e| TrieNodeError::Provider(e.to_string()))?;
                }
                Self::Leaf { prefix, value } => {
                    return Ok((prefix.as_slice() == path).then_some(value));
                }
                Self::Extension { prefix, node: child } => {
                    if !path.starts_with(prefix.as_slice()) {
                        return Ok(None);
                    }
                    path = &path[prefix.len()..];
                    node = *child;
                }
                Self::Branch { mut stack } => {
                    let Some((&nibble, rest)) = path.split_first() else {
                        return Ok(None);
                    };
                    node = stack.get_mut(nibble as usize).map(core::mem::take).unwrap_or_default();
                    path = rest;
                }
            }
        }
    }

    /// Decodes a node referenced from within a parent: an inline list, a 32-byte hash, or empty.
    fn decode_child(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        match buf.first() {
            None => Err(alloy_rlp::Error::InputTooShort),
            Some(&EMPTY_STRING_CODE) => {
                buf.advance(1);
                Ok(Self::Empty)
            }
            Some(&b) if b >= alloy_rlp::EMPTY_LIST_CODE => Self::decode(buf),
            Some(_) => {
                let raw = payload(buf, false)?;
                if raw.len() != B256::len_bytes() {
                    return Err(alloy_rlp::Error::UnexpectedLength);
                }
                Ok(Self::Blinded { commitment: B256::from_slice(raw) })
            }
        }
    }
}

impl Decodable for TrieNode {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let mut list = payload(buf, true)?;
        let mut items = Vec::with_capacity(BRANCH_LIST_LENGTH);
        while !list.is_empty() {
            items.push(next_item(&mut list)?);
        }

        match items.len() {
            BRANCH_LIST_LENGTH => {
                let stack = items[..16]
                    .iter()
                    .map(|raw| {
                        let mut raw = *raw;
                        Self::decode_child(&mut raw)
                    })
                    .collect::<alloy_rlp::Result<Vec<_>>>()?;
                Ok(Self::Branch { stack })
            }
            LEAF_OR_EXTENSION_LIST_LENGTH => {
                let (mut path_raw, mut value_raw) = (items[0], items[1]);
                let (prefix, is_leaf) = decode_path(payload(&mut path_raw, false)?)?;
                if is_leaf {
                    let value = Bytes::copy_from_slice(payload(&mut value_raw, false)?);
                    Ok(Self::Leaf { prefix, value })
                } else {
                    let node = Box::new(Self::decode_child(&mut value_raw)?);
                    Ok(Self::Extension { prefix, node })
                }
            }
            _ => Err(alloy_rlp::Error::UnexpectedLength),
        }
    }
}

/// Consumes an RLP header of the expected kind and returns its payload.
fn payload<'a>(buf: &mut &'a [u8], list: bool) -> alloy_rlp::Result<&'a [u8]> {
    let header = Header::decode(buf)?;
    if header.list != list {
        return Err(if list {
            alloy_rlp::Error::UnexpectedString
        } else {
            alloy_rlp::Error::UnexpectedList
        });
    }
    if buf.len() < header.payload_length {
        return Err(alloy_rlp::Error::InputTooShort);
    }
    let (payload, rest) = buf.split_at(header.payload_length);
    *buf = rest;
    Ok(payload)
}

/// Splits the next complete RLP item, header included, off the front of `buf`.
fn next_item<'a>(buf: &mut &'a [u8]) -> alloy_rlp::Result<&'a [u8]> {
    let start = *buf;
    let header = Header::decode(buf)?;
    if buf.len() < header.payload_length {
        return Err(alloy_rlp::Error::InputTooShort);
    }
    buf.advance(header.payload_length);
    Ok(&start[..start.len() - buf.len()])
}

/// Decodes a hex-prefix encoded path. Returns the nibbles and whether the path terminates a leaf.
fn decode_path(path: &[u8]) -> alloy_rlp::Result<(Nibbles, bool)> {
    let flag = path.first().ok_or(alloy_rlp::Error::InputTooShort)? >> 4;
    let unpacked = Nibbles::unpack(path);
    let (skip, is_leaf) = match flag {
        PREFIX_EXTENSION_EVEN => (2, false),
        PREFIX_EXTENSION_ODD => (1, false),
        PREFIX_LEAF_EVEN => (2, true),
        PREFIX_LEAF_ODD => (1, true),
        _ => return Err(alloy_rlp::Error::Custom("unexpected hex-prefix flag")),
    };
    Ok((Nibbles::from_nibbles_unchecked(&unpacked.as_slice()[skip..]), is_leaf))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_util::{build_trie, TrieNodeProvider};
    use alloc::vec;
    use alloy_primitives::{b256, bytes, hex, keccak256};

    #[test]
    fn test_decode_branch() {
        const BRANCH_RLP: [u8; 64] = hex!("f83ea0eb08a66a94882454bec899d3e82952dcc918ba4b35a09a84acd98019aef4345080808080808080cd308b8a746573742074687265658080808080808080");
        let mut stack = vec![TrieNode::Empty; 16];
        stack[0] = TrieNode::Blinded {
            commitment: b256!("eb08a66a94882454bec899d3e82952dcc918ba4b35a09a84acd98019aef43450"),
        };
        stack[8] = TrieNode::Leaf {
            prefix: Nibbles::from_nibbles_unchecked([0x0]),
            value: bytes!("8a74657374207468726565"),
        };
        assert_eq!(TrieNode::decode(&mut BRANCH_RLP.as_slice()).unwrap(), TrieNode::Branch { stack });
    }

    #[test]
    fn test_decode_extension() {
        const EXTENSION_RLP: [u8; 38] =
            hex!("e58300646fa0eb08a66a94882454bec899d3e82952dcc918ba4b35a09a84acd98019aef43450");
        let expected = TrieNode::Extension {
            prefix: Nibbles::from_nibbles_unchecked([0x6, 0x4, 0x6, 0xf]),
            node: Box::new(TrieNode::Blinded {
                commitment: b256!(
                    "eb08a66a94882454bec899d3e82952dcc918ba4b35a09a84acd98019aef43450"
                ),
            }),
        };
        assert_eq!(TrieNode::decode(&mut EXTENSION_RLP.as_slice()).unwrap(), expected);
    }

    #[test]
    fn test_decode_leaf() {
        const LEAF_RLP: [u8; 11] = hex!("ca8320646f8576657262ff");
        let expected = TrieNode::Leaf {
            prefix: Nibbles::from_nibbles_unchecked([0x6, 0x4, 0x6, 0xf]),
            value: bytes!("76657262ff"),
        };
        assert_eq!(TrieNode::decode(&mut LEAF_RLP.as_slice()).unwrap(), expected);
    }

    #[test]
    fn test_reject_bad_flag() {
        const BAD_RLP: [u8; 11] = hex!("ca8340646f8576657262ff");
        assert!(TrieNode::decode(&mut BAD_RLP.as_slice()).is_err());
    }

    #[test]
    fn test_open_built_trie() {
        let entries = (0u64..64)
            .map(|i| {
                let key = keccak256(i.to_be_bytes());
                (Nibbles::unpack(key), alloy_rlp::encode(i))
            })
            .collect::<Vec<_>>();
        let (root, preimages) = build_trie(entries.clone());
        let provider = TrieNodeProvider::new(preimages);

        let root = TrieNode::new_blinded(root);
        for (path, value) in entries {
            assert_eq!(root.open(path.as_slice(), &provider).unwrap().unwrap().as_ref(), value);
        }

        let missing = Nibbles::unpack(keccak256(1_000u64.to_be_bytes()));
        assert_eq!(root.open(missing.as_slice(), &provider).unwrap(), None);
    }

    #[test]
    fn test_open_empty_root() {
        let provider = TrieNodeProvider::default();
        let node = TrieNode::new_blinded(EMPTY_ROOT_HASH);
        assert_eq!(node.open(&[0, 1, 2], &provider).unwrap(), None);
    }

    #[test]
    fn test_open_missing_preimage() {
        let provider = TrieNodeProvider::default();
        let node = TrieNode::new_blinded(B256::repeat_byte(0xaa));
        assert!(matches!(node.open(&[0], &provider), Err(TrieNodeError::Provider(_))));
    }
}
