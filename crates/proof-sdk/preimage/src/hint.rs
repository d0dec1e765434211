use crate::{
    errors::{PreimageOracleError, PreimageOracleResult},
    traits::{HintRouter, HintWriterClient},
    Channel,
};
use alloc::{format, string::String, vec};
use tracing::{error, trace};

/// Client end of the hint channel.
#[derive(Debug, Clone, Copy)]
pub struct HintWriter<C> {
    channel: C,
}

impl<C> HintWriter<C> {
    /// Creates a new [HintWriter] over `channel`.
    pub const fn new(channel: C) -> Self {
        Self { channel }
    }
}

impl<C: Channel> HintWriterClient for HintWriter<C> {
    fn write(&self, hint: &str) -> PreimageOracleResult<()> {
        trace!(target: "hint_writer", "Writing hint \"{hint}\"");

        self.channel.write(&(hint.len() as u32).to_be_bytes())?;
        self.channel.write(hint.as_bytes())?;

        let mut ack = [0u8; 1];
        self.channel.read_exact(&mut ack)?;

        trace!(target: "hint_writer", "Hint acknowledged");
        Ok(())
    }
}

/// Host end of the hint channel. Always acknowledges, even when routing fails, so the client never
/// blocks on a bad hint.
#[derive(Debug, Clone, Copy)]
pub struct HintReader<C> {
    channel: C,
}

impl<C: Channel> HintReader<C> {
    /// Creates a new [HintReader] over `channel`.
    pub const fn new(channel: C) -> Self {
        Self { channel }
    }

    /// Reads one hint, routes it, and acknowledges it.
    pub fn next_hint<R: HintRouter>(&self, router: &R) -> PreimageOracleResult<()> {
        let mut len = [0u8; 4];
        self.channel.read_exact(&mut len)?;

        let mut raw = vec![0u8; u32::from_be_bytes(len) as usize];
        self.channel.read_exact(&mut raw)?;

        let routed = String::from_utf8(raw)
            .map_err(|e| PreimageOracleError::Other(format!("Failed to decode hint payload: {e}")))
            .and_then(|hint| {
                trace!(target: "hint_reader", "Routing hint \"{hint}\"");
                router.route_hint(hint)
            });

        self.channel.write(&[0x00])?;

        if let Err(e) = &routed {
            error!(target: "hint_reader", "Failed to route hint: {e}");
        }
        routed
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::pipe::BidirectionalPipe;
    use alloc::vec::Vec;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingRouter(Arc<Mutex<Vec<String>>>);

    impl HintRouter for RecordingRouter {
        fn route_hint(&self, hint: String) -> PreimageOracleResult<()> {
            self.0.lock().unwrap().push(hint);
            Ok(())
        }
    }

    struct FailingRouter;

    impl HintRouter for FailingRouter {
        fn route_hint(&self, _: String) -> PreimageOracleResult<()> {
            Err(PreimageOracleError::KeyNotFound)
        }
    }

    #[test]
    fn test_hint_round_trip() {
        const HINT: &str = "l2-block-header 0xfacade";

        let BidirectionalPipe { client, host } = BidirectionalPipe::new().unwrap();
        let router = RecordingRouter::default();
        let hints = Arc::clone(&router.0);
        let handle = std::thread::spawn(move || HintReader::new(host).next_hint(&router));

        HintWriter::new(client).write(HINT).unwrap();
        handle.join().unwrap().unwrap();

        assert_eq!(hints.lock().unwrap().as_slice(), &[HINT.to_string()]);
    }

    #[test]
    fn test_acknowledges_failed_route() {
        let BidirectionalPipe { client, host } = BidirectionalPipe::new().unwrap();
        let handle = std::thread::spawn(move || HintReader::new(host).next_hint(&FailingRouter));

        HintWriter::new(client).write("l2-code 0x00").unwrap();
        assert!(matches!(handle.join().unwrap(), Err(PreimageOracleError::KeyNotFound)));
    }

    #[test]
    fn test_acknowledges_bad_utf8() {
        let BidirectionalPipe { client, host } = BidirectionalPipe::new().unwrap();
        let handle = std::thread::spawn(move || {
            HintReader::new(host).next_hint(&RecordingRouter::default())
        });

        let bad = [0xf0, 0x90, 0x28, 0xbc];
        client.write(&(bad.len() as u32).to_be_bytes()).unwrap();
        client.write(&bad).unwrap();
        let mut ack = [0u8; 1];
        client.read_exact(&mut ack).unwrap();

        let err = handle.join().unwrap().unwrap_err();
        assert!(err.to_string().contains("Failed to decode hint payload"));
    }
}
