//! Errors for the `interlock-preimage` crate.

use alloc::string::String;
use thiserror::Error;

/// Errors raised while requesting preimages or writing hints.
#[derive(Error, Debug)]
pub enum PreimageOracleError {
    /// The underlying channel failed.
    #[error(transparent)]
    IOError(#[from] ChannelError),
    /// The key's type byte is unknown.
    #[error("Invalid preimage key.")]
    InvalidPreimageKey,
    /// The host has no value for the key.
    #[error("Key not found.")]
    KeyNotFound,
    /// The host returned a value of a different length than requested.
    #[error("Buffer length mismatch. Expected {0}, got {1}.")]
    BufferLengthMismatch(usize, usize),
    /// Other errors.
    #[error("Preimage oracle error: {0}")]
    Other(String),
}

/// A [Result] type for the [PreimageOracleError] enum.
pub type PreimageOracleResult<T> = Result<T, PreimageOracleError>;

/// Failure modes of a [Channel](crate::Channel).
#[derive(Error, Debug)]
pub enum ChannelError {
    /// The counterparty closed the channel.
    #[error("Channel is closed.")]
    Closed,
    /// The channel ended in the middle of a read.
    #[error("Unexpected EOF in channel read operation.")]
    UnexpectedEOF,
    /// Any other I/O failure.
    #[error("Channel I/O error: {0}")]
    Io(String),
}

/// A [Result] type for the [ChannelError] enum.
pub type ChannelResult<T> = Result<T, ChannelError>;
