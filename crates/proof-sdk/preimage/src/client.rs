use crate::{
    errors::PreimageOracleResult, Channel, HintWriter, HintWriterClient, OracleReader,
    PreimageKey, PreimageOracleClient,
};
use alloc::vec::Vec;

/// Pairs an [OracleReader] with a [HintWriter] so that both channels can be handed around as a
/// single [CommsClient](crate::CommsClient).
#[derive(Debug, Clone, Copy)]
pub struct OracleClient<P, H> {
    oracle: OracleReader<P>,
    hints: HintWriter<H>,
}

impl<P: Channel, H: Channel> OracleClient<P, H> {
    /// Creates a client from the preimage channel and the hint channel.
    pub const fn new(preimage_channel: P, hint_channel: H) -> Self {
        Self { oracle: OracleReader::new(preimage_channel), hints: HintWriter::new(hint_channel) }
    }
}

impl<P: Channel, H: Channel> PreimageOracleClient for OracleClient<P, H> {
    fn get(&self, key: PreimageKey) -> PreimageOracleResult<Vec<u8>> {
        self.oracle.get(key)
    }

    fn get_exact(&self, key: PreimageKey, buf: &mut [u8]) -> PreimageOracleResult<()> {
        self.oracle.get_exact(key, buf)
    }
}

impl<P: Channel, H: Channel> HintWriterClient for OracleClient<P, H> {
    fn write(&self, hint: &str) -> PreimageOracleResult<()> {
        self.hints.write(hint)
    }
}
