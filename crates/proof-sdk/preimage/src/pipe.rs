//! [Channel] implementation over OS pipes.

use crate::{
    errors::{ChannelError, ChannelResult},
    Channel,
};
use os_pipe::{PipeReader, PipeWriter};
use std::io::{ErrorKind, Read, Write};

/// One end of a bidirectional pipe.
#[derive(Debug)]
pub struct PipeChannel {
    reader: PipeReader,
    writer: PipeWriter,
}

impl PipeChannel {
    /// Creates a [PipeChannel] from an existing pair of pipe ends.
    pub const fn new(reader: PipeReader, writer: PipeWriter) -> Self {
        Self { reader, writer }
    }
}

fn map_io(err: std::io::Error) -> ChannelError {
    match err.kind() {
        ErrorKind::UnexpectedEof => ChannelError::UnexpectedEOF,
        ErrorKind::BrokenPipe => ChannelError::Closed,
        _ => ChannelError::Io(err.to_string()),
    }
}

impl Channel for PipeChannel {
    fn read(&self, buf: &mut [u8]) -> ChannelResult<usize> {
        (&self.reader).read(buf).map_err(map_io)
    }

    fn read_exact(&self, buf: &mut [u8]) -> ChannelResult<usize> {
        (&self.reader).read_exact(buf).map_err(map_io)?;
        Ok(buf.len())
    }

    fn write(&self, buf: &[u8]) -> ChannelResult<usize> {
        (&self.writer).write_all(buf).map_err(map_io)?;
        Ok(buf.len())
    }
}

/// A connected client/host pair of [PipeChannel]s.
#[derive(Debug)]
pub struct BidirectionalPipe {
    /// The client end.
    pub client: PipeChannel,
    /// The host end.
    pub host: PipeChannel,
}

impl BidirectionalPipe {
    /// Opens two OS pipes and cross-connects them.
    pub fn new() -> std::io::Result<Self> {
        let (client_read, host_write) = os_pipe::pipe()?;
        let (host_read, client_write) = os_pipe::pipe()?;
        Ok(Self {
            client: PipeChannel::new(client_read, client_write),
            host: PipeChannel::new(host_read, host_write),
        })
    }
}
