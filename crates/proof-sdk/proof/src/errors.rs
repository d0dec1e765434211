//! Error types for the proof program.

use alloc::string::String;
use alloy_primitives::{Address, B256};
use alloy_rpc_types_engine::PayloadId;
use interlock_interop::PreStateError;
use interlock_mpt::{OrderedListWalkerError, TrieNodeError};
use interlock_preimage::errors::PreimageOracleError;
use thiserror::Error;

/// Error from an oracle-backed provider.
#[derive(Error, Debug)]
pub enum OracleProviderError {
    /// Preimage oracle error.
    #[error("Preimage oracle error: {0}")]
    Preimage(PreimageOracleError),
    /// List walker error.
    #[error("Trie walker error: {0}")]
    TrieWalker(OrderedListWalkerError),
    /// Trie node error.
    #[error("Trie node error: {0}")]
    TrieNode(TrieNodeError),
    /// Error decoding or encoding RLP.
    #[error("RLP error: {0}")]
    Rlp(alloy_rlp::Error),
    /// Slice conversion error.
    #[error("Slice conversion error: {0}")]
    SliceConversion(core::array::TryFromSliceError),
    /// Serde error.
    #[error("Serde error: {0}")]
    Serde(serde_json::Error),
    /// Output preimage error.
    #[error("Output error: {0}")]
    Output(#[from] OutputError),
    /// Agreed pre-state decoding error.
    #[error("Pre-state error: {0}")]
    PreState(#[from] PreStateError),
    /// The source holds no value for the key.
    #[error("Preimage not found: {0}")]
    NotFound(B256),
    /// The chain ID is not part of the agreed state.
    #[error("Unknown chain ID: {0}")]
    UnknownChainId(u64),
}

/// Error decoding an [OutputV0](crate::OutputV0).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OutputError {
    /// The output preimage is not 128 bytes long.
    #[error("Invalid output length: {0}")]
    InvalidLength(usize),
    /// The output version is not zero.
    #[error("Unsupported output version: {0}")]
    UnsupportedVersion(B256),
}

/// Error reading a [RollupConfig](crate::RollupConfig).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The timestamp is before the L2 genesis time.
    #[error("Timestamp {timestamp} is before genesis time {genesis}")]
    BeforeGenesis {
        /// The requested timestamp.
        timestamp: u64,
        /// The L2 genesis timestamp.
        genesis: u64,
    },
    /// The block time is zero.
    #[error("Block time is zero")]
    ZeroBlockTime,
}

/// Error from an [OracleBackedChain](crate::chain::OracleBackedChain).
#[derive(Error, Debug)]
pub enum ChainError {
    /// Oracle provider error.
    #[error(transparent)]
    Oracle(#[from] OracleProviderError),
    /// Replaying a block's transactions produced a different block.
    #[error("Unexpected block hash: expected {expected}, actual {actual}")]
    UnexpectedBlockHash {
        /// The hash of the block that was supplied.
        expected: B256,
        /// The hash of the block built from the transactions.
        actual: B256,
    },
    /// The block executor failed.
    #[error("Block execution failed: {0}")]
    Execution(String),
    /// The header lacks a field required by the active fork.
    #[error("Invalid header {0}: missing withdrawals root")]
    InvalidHeader(B256),
    /// A required account is absent from state.
    #[error("Account {address} not found in state {state_root}")]
    AccountNotFound {
        /// The account.
        address: Address,
        /// The state root searched.
        state_root: B256,
    },
    /// Trie node error.
    #[error("Trie error: {0}")]
    Trie(#[from] TrieNodeError),
}

/// Error from an [OracleEngine](crate::engine::OracleEngine).
#[derive(Error, Debug)]
pub enum EngineError {
    /// Chain error.
    #[error(transparent)]
    Chain(#[from] ChainError),
    /// Rollup config error.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// No payload is being built under the ID.
    #[error("Unknown payload ID {0}")]
    UnknownPayload(PayloadId),
    /// The block is neither inserted nor known to the oracle below the head.
    #[error("Unknown block {0}")]
    UnknownBlock(B256),
    /// No canonical block exists at the height.
    #[error("No canonical block at height {0}")]
    BlockNumberNotFound(u64),
}

impl From<OracleProviderError> for EngineError {
    fn from(err: OracleProviderError) -> Self {
        Self::Chain(ChainError::Oracle(err))
    }
}

/// Error from the single-chain derivation task.
#[derive(Error, Debug)]
pub enum DerivationError {
    /// Engine error.
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// The driver failed.
    #[error("Driver error: {0}")]
    Driver(String),
}

impl From<ChainError> for DerivationError {
    fn from(err: ChainError) -> Self {
        Self::Engine(EngineError::Chain(err))
    }
}

impl From<OracleProviderError> for DerivationError {
    fn from(err: OracleProviderError) -> Self {
        Self::Engine(err.into())
    }
}

/// Error from the single-chain program.
#[derive(Error, Debug)]
pub enum ProgramError {
    /// The computed output does not match the claim.
    #[error("Invalid claim: expected {expected}, actual {actual}")]
    InvalidClaim {
        /// The claimed value.
        expected: B256,
        /// The value computed by the program.
        actual: B256,
    },
    /// Derivation failed.
    #[error(transparent)]
    Derivation(#[from] DerivationError),
    /// Oracle provider error.
    #[error(transparent)]
    Oracle(#[from] OracleProviderError),
    /// Rollup config error.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Error parsing a hint.
#[derive(Error, Debug)]
#[error("Hint parsing error: {_0}")]
pub struct HintParsingError(pub String);
