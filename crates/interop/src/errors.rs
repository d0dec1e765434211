//! Error types for the `interlock-interop` crate.

use crate::BlockSeal;
use alloc::string::String;
use alloy_primitives::B256;
use thiserror::Error;

/// An error decoding a [SuperRoot](crate::SuperRoot).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SuperRootError {
    /// Invalid super root version byte
    #[error("Invalid super root version byte")]
    InvalidVersionByte,
    /// Unexpected encoded super root length
    #[error("Unexpected encoded super root length")]
    UnexpectedLength,
    /// A chain ID does not fit in 64 bits.
    #[error("Chain ID out of range")]
    ChainIdOverflow,
}

/// A [Result] alias for the [SuperRootError] type.
pub type SuperRootResult<T> = core::result::Result<T, SuperRootError>;

/// An error decoding a [PreState](crate::PreState).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreStateError {
    /// The encoding is empty.
    #[error("Empty pre-state")]
    Empty,
    /// The leading version byte is neither a super root nor a transition state.
    #[error("Unknown pre-state version byte {0}")]
    UnknownVersion(u8),
    /// The super root inside the state failed to decode.
    #[error(transparent)]
    SuperRoot(#[from] SuperRootError),
    /// The transition state body failed to RLP decode.
    #[error("Invalid transition state: {0}")]
    Rlp(alloy_rlp::Error),
}

impl From<alloy_rlp::Error> for PreStateError {
    fn from(err: alloy_rlp::Error) -> Self {
        Self::Rlp(err)
    }
}

/// An error decoding an executing message from a log.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageDecodeError {
    /// The event log does not carry exactly two topics.
    #[error("Unexpected number of topics: {0}")]
    TopicCount(usize),
    /// The event data is not exactly 160 bytes long.
    #[error("Unexpected identifier data length: {0}")]
    DataLength(usize),
    /// Padding that must be zero was not.
    #[error("Non-zero padding in identifier field `{0}`")]
    Padding(&'static str),
}

/// An error raised while building or checking the hazards of a block.
///
/// Every variant except [HazardError::Provider] and [HazardError::InconsistentSeal] describes an
/// invalid cross-chain dependency and is recovered by replacing the block. See
/// [HazardError::is_invalid_dependency].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HazardError {
    /// The chain is not part of the dependency set or the super root.
    #[error("Unknown chain {0}")]
    UnknownChain(u64),
    /// The block opened at a height is not the block that was expected.
    #[error("Expected block {expected} on chain {chain}, found {actual}")]
    BlockMismatch {
        /// The chain of the block.
        chain: u64,
        /// The expected seal.
        expected: BlockSeal,
        /// The seal actually found.
        actual: BlockSeal,
    },
    /// A message may not be executed between the two chains at the given times.
    #[error(
        "Message from chain {init_chain} at {init_timestamp} may not execute on chain {exec_chain} at {exec_timestamp}"
    )]
    CannotExecute {
        /// The executing chain.
        exec_chain: u64,
        /// The executing block's timestamp.
        exec_timestamp: u64,
        /// The initiating chain.
        init_chain: u64,
        /// The initiating message's timestamp.
        init_timestamp: u64,
    },
    /// The initiating block does not exist on the canonical chain.
    #[error("Block {number} not found on chain {chain}")]
    MissingBlock {
        /// The chain queried.
        chain: u64,
        /// The block number queried.
        number: u64,
    },
    /// The initiating block's timestamp differs from the message's.
    #[error("Block timestamp {actual} does not match message timestamp {expected}")]
    TimestampMismatch {
        /// The timestamp claimed by the message.
        expected: u64,
        /// The timestamp of the block.
        actual: u64,
    },
    /// The initiating log does not exist.
    #[error("Log {log_index} not found in block {number} on chain {chain}")]
    LogNotFound {
        /// The chain queried.
        chain: u64,
        /// The block number queried.
        number: u64,
        /// The log index queried.
        log_index: u32,
    },
    /// The initiating log exists but does not match the message checksum.
    #[error("Checksum mismatch: expected {expected}, found {actual}")]
    ChecksumMismatch {
        /// The checksum carried by the message.
        expected: B256,
        /// The checksum of the log found.
        actual: B256,
    },
    /// A message references a block newer than the executing block.
    #[error("Message at {message_timestamp} is newer than block at {block_timestamp}")]
    FutureMessage {
        /// The message's timestamp.
        message_timestamp: u64,
        /// The executing block's timestamp.
        block_timestamp: u64,
    },
    /// Two messages depend on different blocks of the same chain at the same timestamp.
    #[error("Conflicting dependencies on chain {chain}: {existing} and {found}")]
    ConflictingDependency {
        /// The chain depended on.
        chain: u64,
        /// The block already in the hazard set.
        existing: BlockSeal,
        /// The other block.
        found: BlockSeal,
    },
    /// A hazard block changed between hazard building and cycle checking. Not recoverable.
    #[error("Inconsistent block seal on chain {0}")]
    InconsistentSeal(u64),
    /// An executing message sits at a log index outside its block.
    #[error("Executing message log index {log_index} >= log count {log_count}")]
    InvalidExecutingIndex {
        /// The executing log index.
        log_index: u32,
        /// The number of logs in the block.
        log_count: u32,
    },
    /// An executing message references a chain that is not among the hazards.
    #[error("Executing message references unknown chain {0}")]
    UnknownHazardChain(u64),
    /// An initiating log index is outside its block.
    #[error("Initiating message log index out of bounds")]
    InitiatingIndexOutOfBounds,
    /// A message references itself.
    #[error("Self referential message")]
    SelfReference,
    /// Same-timestamp messages form a cycle.
    #[error("Cycle detected")]
    Cycle,
    /// The data source failed. Not recoverable.
    #[error("Dependency provider error: {0}")]
    Provider(String),
}

impl HazardError {
    /// Returns `true` if the error describes an invalid cross-chain dependency, meaning the block
    /// that carries it must be replaced.
    pub const fn is_invalid_dependency(&self) -> bool {
        !matches!(self, Self::Provider(_) | Self::InconsistentSeal(_))
    }
}

/// A [Result] alias for the [HazardError] type.
pub type HazardResult<T> = core::result::Result<T, HazardError>;
