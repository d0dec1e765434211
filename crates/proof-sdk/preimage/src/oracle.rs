use crate::{
    errors::{PreimageOracleError, PreimageOracleResult},
    traits::{Channel, PreimageFetcher},
    PreimageKey, PreimageOracleClient,
};
use alloc::vec::Vec;
use tracing::trace;

/// Client end of the preimage channel.
#[derive(Debug, Clone, Copy)]
pub struct OracleReader<C> {
    channel: C,
}

impl<C: Channel> OracleReader<C> {
    /// Creates a new [OracleReader] over `channel`.
    pub const fn new(channel: C) -> Self {
        Self { channel }
    }

    /// Sends `key` and returns the length of the value the host is about to write.
    fn write_key(&self, key: PreimageKey) -> PreimageOracleResult<usize> {
        let raw: [u8; 32] = key.into();
        self.channel.write(&raw)?;

        let mut length = [0u8; 8];
        self.channel.read_exact(&mut length)?;
        Ok(u64::from_be_bytes(length) as usize)
    }
}

impl<C: Channel> PreimageOracleClient for OracleReader<C> {
    fn get(&self, key: PreimageKey) -> PreimageOracleResult<Vec<u8>> {
        trace!(target: "oracle_client", "Requesting preimage for key {key}");

        let length = self.write_key(key)?;
        let mut data = alloc::vec![0u8; length];
        if length > 0 {
            self.channel.read_exact(&mut data)?;
        }

        trace!(target: "oracle_client", "Read {length} bytes for key {key}");
        Ok(data)
    }

    fn get_exact(&self, key: PreimageKey, buf: &mut [u8]) -> PreimageOracleResult<()> {
        trace!(target: "oracle_client", "Requesting preimage for key {key}");

        let length = self.write_key(key)?;
        if buf.len() != length {
            // Drain the value so the channel stays aligned for the next request.
            let mut sink = alloc::vec![0u8; length];
            if length > 0 {
                self.channel.read_exact(&mut sink)?;
            }
            return Err(PreimageOracleError::BufferLengthMismatch(length, buf.len()));
        }
        if length > 0 {
            self.channel.read_exact(buf)?;
        }

        trace!(target: "oracle_client", "Read {length} bytes for key {key}");
        Ok(())
    }
}

/// Host end of the preimage channel. Serves requests from an [OracleReader].
#[derive(Debug, Clone, Copy)]
pub struct OracleServer<C> {
    channel: C,
}

impl<C: Channel> OracleServer<C> {
    /// Creates a new [OracleServer] over `channel`.
    pub const fn new(channel: C) -> Self {
        Self { channel }
    }

    /// Serves a single preimage request from `fetcher`.
    pub fn next_preimage_request<F: PreimageFetcher>(
        &self,
        fetcher: &F,
    ) -> PreimageOracleResult<()> {
        let mut raw = [0u8; 32];
        self.channel.read_exact(&mut raw)?;
        let key = PreimageKey::try_from(raw)?;

        trace!(target: "oracle_server", "Serving preimage for key {key}");

        let value = fetcher.get_preimage(key)?;
        self.channel.write(&(value.len() as u64).to_be_bytes())?;
        self.channel.write(&value)?;
        Ok(())
    }
}
