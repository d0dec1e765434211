//! The [SuperRoot] type.
//!
//! Represents a snapshot of the state of the superchain at a given integer timestamp.

use crate::{
    errors::{SuperRootError, SuperRootResult},
    SUPER_ROOT_VERSION,
};
use alloc::vec::Vec;
use alloy_primitives::{keccak256, B256, U256};
use alloy_rlp::{Buf, BufMut};

/// The [SuperRoot] is the snapshot of the superchain at a given timestamp.
#[derive(Debug, Clone, Eq, PartialEq)]
#[cfg_attr(any(feature = "arbitrary", test), derive(arbitrary::Arbitrary))]
pub struct SuperRoot {
    /// The timestamp of the superchain snapshot, in seconds.
    pub timestamp: u64,
    /// The output roots of all chains, sorted by chain ID.
    pub output_roots: Vec<OutputRootWithChain>,
}

impl SuperRoot {
    /// Creates a new [SuperRoot], sorting `output_roots` by chain ID.
    pub fn new(timestamp: u64, mut output_roots: Vec<OutputRootWithChain>) -> Self {
        output_roots.sort_by_key(|r| r.chain_id);
        Self { timestamp, output_roots }
    }

    /// Decodes a [SuperRoot], consuming the whole buffer.
    pub fn decode(buf: &mut &[u8]) -> SuperRootResult<Self> {
        let (&version, rest) = buf.split_first().ok_or(SuperRootError::UnexpectedLength)?;
        if version != SUPER_ROOT_VERSION {
            return Err(SuperRootError::InvalidVersionByte);
        }
        *buf = rest;

        if buf.len() < 8 || (buf.len() - 8) % 64 != 0 {
            return Err(SuperRootError::UnexpectedLength);
        }
        let timestamp = buf.get_u64();

        let mut output_roots = Vec::with_capacity(buf.len() / 64);
        while !buf.is_empty() {
            let chain_id = U256::from_be_slice(&buf[..32]);
            let chain_id = u64::try_from(chain_id).map_err(|_| SuperRootError::ChainIdOverflow)?;
            let output_root = B256::from_slice(&buf[32..64]);
            buf.advance(64);
            output_roots.push(OutputRootWithChain::new(chain_id, output_root));
        }

        Ok(Self { timestamp, output_roots })
    }

    /// Encodes the [SuperRoot] into `out`.
    pub fn encode(&self, out: &mut dyn BufMut) {
        out.put_u8(SUPER_ROOT_VERSION);
        out.put_u64(self.timestamp);
        for output_root in &self.output_roots {
            out.put_slice(&U256::from(output_root.chain_id).to_be_bytes::<32>());
            out.put_slice(output_root.output_root.as_slice());
        }
    }

    /// Returns the encoded length of the [SuperRoot].
    pub fn encoded_length(&self) -> usize {
        1 + 8 + 64 * self.output_roots.len()
    }

    /// Returns the encoding as a new buffer.
    pub fn encoded(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_length());
        self.encode(&mut out);
        out
    }

    /// Hashes the encoded [SuperRoot] using [keccak256].
    pub fn hash(&self) -> B256 {
        keccak256(self.encoded())
    }
}

/// An output root together with the chain it belongs to.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
#[cfg_attr(any(feature = "arbitrary", test), derive(arbitrary::Arbitrary))]
pub struct OutputRootWithChain {
    /// The chain ID of the output root.
    pub chain_id: u64,
    /// The output root hash.
    pub output_root: B256,
}

impl OutputRootWithChain {
    /// Create a new [OutputRootWithChain] with the given chain ID and output root hash.
    pub const fn new(chain_id: u64, output_root: B256) -> Self {
        Self { chain_id, output_root }
    }
}
