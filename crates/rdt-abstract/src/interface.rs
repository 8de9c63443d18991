use bytes::Bytes;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

use crate::frame::{Frame, FrameError};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("socket error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed datagram from {from}: {source}")]
    Malformed { from: SocketAddr, source: FrameError },

    #[error("cannot encode frame: {0}")]
    Encode(FrameError),

    #[error("transport closed")]
    Closed,
}

/// Datagram channel the engines talk through.
/// Delivery is unreliable and unordered; the engines make it reliable.
pub trait Transport {
    /// Send one frame to `dest`.
    fn send(&mut self, frame: &Frame, dest: SocketAddr) -> Result<(), TransportError>;

    /// Wait for the next frame.
    ///
    /// `None` blocks indefinitely. `Ok(None)` means the timeout elapsed with
    /// nothing received. A datagram that fails to decode is reported as
    /// [`TransportError::Malformed`]; the caller decides whether to retry.
    fn receive(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<Option<(Frame, SocketAddr)>, TransportError>;

    /// Address this end is bound to.
    fn local_addr(&self) -> Result<SocketAddr, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, frame: &Frame, dest: SocketAddr) -> Result<(), TransportError> {
        (**self).send(frame, dest)
    }

    fn receive(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<Option<(Frame, SocketAddr)>, TransportError> {
        (**self).receive(timeout)
    }

    fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        (**self).local_addr()
    }
}

/// A file split into fixed-size blocks.
pub trait BlockSource {
    /// Number of payload blocks. Index `block_count()` is the empty
    /// end-of-stream block.
    fn block_count(&self) -> u64;

    /// Payload of block `index`, at most one frame's worth of bytes.
    fn block(&mut self, index: u64) -> io::Result<Bytes>;
}

/// Destination of delivered payload. Called in file order only.
pub trait BlockSink {
    fn append(&mut self, data: &[u8]) -> io::Result<()>;
}

impl BlockSink for Vec<u8> {
    fn append(&mut self, data: &[u8]) -> io::Result<()> {
        self.extend_from_slice(data);
        Ok(())
    }
}
