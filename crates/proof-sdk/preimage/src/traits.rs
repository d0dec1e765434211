use crate::{
    errors::{ChannelResult, PreimageOracleResult},
    PreimageKey,
};
use alloc::{string::String, vec::Vec};

/// Reads values from the host, keyed by [PreimageKey].
pub trait PreimageOracleClient {
    /// Fetches the value for `key` into a new buffer.
    fn get(&self, key: PreimageKey) -> PreimageOracleResult<Vec<u8>>;

    /// Fetches the value for `key` into `buf`. Fails if the value is not exactly `buf.len()` bytes
    /// long.
    fn get_exact(&self, key: PreimageKey, buf: &mut [u8]) -> PreimageOracleResult<()>;
}

/// Sends advisory hints to the host so that it can prepare preimages ahead of requests.
pub trait HintWriterClient {
    /// Writes `hint` and blocks until the host acknowledges it.
    fn write(&self, hint: &str) -> PreimageOracleResult<()>;
}

/// A client that can both fetch preimages and send hints.
pub trait CommsClient: PreimageOracleClient + HintWriterClient {}

impl<T: PreimageOracleClient + HintWriterClient> CommsClient for T {}

/// Host-side source of preimage values.
pub trait PreimageFetcher {
    /// Returns the value for `key`.
    fn get_preimage(&self, key: PreimageKey) -> PreimageOracleResult<Vec<u8>>;
}

/// Host-side consumer of hints.
pub trait HintRouter {
    /// Handles a single hint.
    fn route_hint(&self, hint: String) -> PreimageOracleResult<()>;
}

/// A blocking, bidirectional byte channel to the counterparty.
pub trait Channel {
    /// Reads up to `buf.len()` bytes and returns the number read.
    fn read(&self, buf: &mut [u8]) -> ChannelResult<usize>;

    /// Reads exactly `buf.len()` bytes.
    fn read_exact(&self, buf: &mut [u8]) -> ChannelResult<usize>;

    /// Writes all of `buf`.
    fn write(&self, buf: &[u8]) -> ChannelResult<usize>;
}
