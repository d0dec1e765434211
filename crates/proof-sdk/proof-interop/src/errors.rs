//! Error types for the interop proof program.

use alloc::string::String;
use alloy_primitives::B256;
use interlock_interop::HazardError;
use interlock_proof::errors::{
    ChainError, ConfigError, DerivationError, EngineError, OracleProviderError,
};
use thiserror::Error;

/// Error from consolidating the optimistic blocks of a transition state.
#[derive(Error, Debug)]
pub enum ConsolidationError {
    /// The pending block of the chain was replaced with a deposits-only block and the round
    /// must be restarted.
    #[error("Block of chain {0} replaced, restarting consolidation")]
    BlockReplaced(u64),
    /// A hazard check failed for a reason other than an invalid dependency.
    #[error("Hazard check failed: {0}")]
    Hazard(HazardError),
    /// Oracle provider error.
    #[error(transparent)]
    Oracle(#[from] OracleProviderError),
    /// Chain error.
    #[error(transparent)]
    Chain(#[from] ChainError),
    /// Engine error.
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// The engine did not accept the deposits-only payload.
    #[error("Deposits-only payload rejected: {0}")]
    PayloadRejected(String),
    /// The transactions are not those of a deposits-only replacement block.
    #[error("Not a replacement block: {0}")]
    NotReplacement(&'static str),
    /// The pending progress does not hold one block per chain.
    #[error("Expected {chains} pending blocks, found {pending}")]
    PendingProgressMismatch {
        /// The number of chains in the super root.
        chains: usize,
        /// The number of pending blocks.
        pending: usize,
    },
    /// Consolidation did not settle within one round per chain.
    #[error("Consolidation did not settle after {0} replacements")]
    ReplacementLimit(usize),
}

impl From<HazardError> for ConsolidationError {
    fn from(err: HazardError) -> Self {
        Self::Hazard(err)
    }
}

/// Error from the interop program.
#[derive(Error, Debug)]
pub enum InteropProgramError {
    /// The computed post-state does not match the claim.
    #[error("Invalid claim: expected {expected}, actual {actual}")]
    InvalidClaim {
        /// The claimed value.
        expected: B256,
        /// The value computed by the program.
        actual: B256,
    },
    /// The agreed transition state cannot be advanced.
    #[error("Invalid prestate: {0}")]
    InvalidPrestate(String),
    /// Derivation failed.
    #[error(transparent)]
    Derivation(#[from] DerivationError),
    /// Consolidation failed.
    #[error(transparent)]
    Consolidation(#[from] ConsolidationError),
    /// Oracle provider error.
    #[error(transparent)]
    Oracle(#[from] OracleProviderError),
    /// Rollup config error.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
