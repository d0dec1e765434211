//! The pre-state formats of the interop fault proof program.

use crate::{
    errors::PreStateError, SuperRoot, CONSOLIDATE_STEP, SUPER_ROOT_VERSION,
    TRANSITION_STATE_VERSION,
};
use alloc::vec::Vec;
use alloy_primitives::{keccak256, Bytes, B256};
use alloy_rlp::{Decodable, Encodable, Header, RlpDecodable, RlpEncodable};

/// A block derived for one chain that has not yet been checked against the other chains.
#[derive(Default, Debug, Clone, Copy, Eq, PartialEq, Hash, RlpEncodable, RlpDecodable)]
#[cfg_attr(any(feature = "arbitrary", test), derive(arbitrary::Arbitrary))]
pub struct OptimisticBlock {
    /// The hash of the derived block.
    pub block_hash: B256,
    /// The output root committing to the derived block.
    pub output_root: B256,
}

impl OptimisticBlock {
    /// Creates a new [OptimisticBlock].
    pub const fn new(block_hash: B256, output_root: B256) -> Self {
        Self { block_hash, output_root }
    }
}

/// The intermediate state between two super roots.
///
/// `pending_progress` holds one [OptimisticBlock] per chain already derived, in super root order.
/// While `step` is below the chain count, `pending_progress.len() == step`.
#[derive(Debug, Clone, Eq, PartialEq)]
#[cfg_attr(any(feature = "arbitrary", test), derive(arbitrary::Arbitrary))]
pub struct TransitionState {
    /// The agreed super root this transition starts from.
    pub pre_state: SuperRoot,
    /// The blocks derived so far.
    pub pending_progress: Vec<OptimisticBlock>,
    /// The number of steps taken since `pre_state`.
    pub step: u64,
}

impl TransitionState {
    /// Creates a new [TransitionState].
    pub const fn new(
        pre_state: SuperRoot,
        pending_progress: Vec<OptimisticBlock>,
        step: u64,
    ) -> Self {
        Self { pre_state, pending_progress, step }
    }

    /// Returns `true` once every chain has been derived and consolidation is due.
    pub const fn is_consolidation_step(&self) -> bool {
        self.step == CONSOLIDATE_STEP
    }

    fn rlp_payload_length(&self) -> usize {
        let super_root_length = self.pre_state.encoded_length();
        Header { list: false, payload_length: super_root_length }.length()
            + super_root_length
            + self.pending_progress.length()
            + self.step.length()
    }

    /// Encodes the state as `version ++ rlp([super_root, pending_progress, step])`.
    pub fn encode(&self, out: &mut dyn alloy_rlp::BufMut) {
        out.put_u8(TRANSITION_STATE_VERSION);
        Header { list: true, payload_length: self.rlp_payload_length() }.encode(out);
        Bytes::from(self.pre_state.encoded()).encode(out);
        self.pending_progress.encode(out);
        self.step.encode(out);
    }

    /// Returns the encoded length of the state.
    pub fn encoded_length(&self) -> usize {
        let payload_length = self.rlp_payload_length();
        1 + Header { list: true, payload_length }.length() + payload_length
    }

    /// Decodes a state encoded with [Self::encode], consuming the whole buffer.
    pub fn decode(buf: &mut &[u8]) -> Result<Self, PreStateError> {
        let (&version, rest) = buf.split_first().ok_or(PreStateError::Empty)?;
        if version != TRANSITION_STATE_VERSION {
            return Err(PreStateError::UnknownVersion(version));
        }
        *buf = rest;

        let header = Header::decode(buf)?;
        if !header.list {
            return Err(alloy_rlp::Error::UnexpectedString.into());
        }
        if buf.len() != header.payload_length {
            return Err(alloy_rlp::Error::UnexpectedLength.into());
        }

        let super_root = Bytes::decode(buf)?;
        let pre_state = SuperRoot::decode(&mut super_root.as_ref())?;
        let pending_progress = Vec::<OptimisticBlock>::decode(buf)?;
        let step = u64::decode(buf)?;
        if !buf.is_empty() {
            return Err(alloy_rlp::Error::UnexpectedLength.into());
        }

        Ok(Self { pre_state, pending_progress, step })
    }

    /// Returns the encoding as a new buffer.
    pub fn encoded(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_length());
        self.encode(&mut out);
        out
    }

    /// Hashes the encoded state.
    pub fn hash(&self) -> B256 {
        keccak256(self.encoded())
    }
}

/// The agreed state a program run starts from: either a super root or a transition state.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum PreState {
    /// A super root.
    SuperRoot(SuperRoot),
    /// An intermediate transition state.
    TransitionState(TransitionState),
}

impl PreState {
    /// Decodes a pre-state, dispatching on its leading version byte.
    pub fn decode(mut buf: &[u8]) -> Result<Self, PreStateError> {
        match buf.first() {
            None => Err(PreStateError::Empty),
            Some(&SUPER_ROOT_VERSION) => Ok(Self::SuperRoot(SuperRoot::decode(&mut buf)?)),
            Some(&TRANSITION_STATE_VERSION) => {
                Ok(Self::TransitionState(TransitionState::decode(&mut buf)?))
            }
            Some(&other) => Err(PreStateError::UnknownVersion(other)),
        }
    }

    /// Returns the encoding of the pre-state.
    pub fn encoded(&self) -> Vec<u8> {
        match self {
            Self::SuperRoot(root) => root.encoded(),
            Self::TransitionState(state) => state.encoded(),
        }
    }

    /// Hashes the encoded pre-state.
    pub fn hash(&self) -> B256 {
        keccak256(self.encoded())
    }

    /// Returns the pre-state as a transition state. A super root is the transition state at step
    /// zero.
    pub fn into_transition_state(self) -> TransitionState {
        match self {
            Self::SuperRoot(pre_state) => TransitionState::new(pre_state, Vec::new(), 0),
            Self::TransitionState(state) => state,
        }
    }
}
