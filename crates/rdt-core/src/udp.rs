use rdt_abstract::{Frame, Transport, TransportError};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::Duration;
use tracing::debug;

/// Room for any frame plus slack, so oversize datagrams decode as errors
/// instead of being silently cut to a valid length.
const RECV_BUFFER: usize = 2048;

/// Blocking UDP socket speaking the frame codec.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    buf: Box<[u8]>,
}

impl UdpTransport {
    pub fn bind(addr: impl ToSocketAddrs) -> io::Result<Self> {
        Ok(Self::from_socket(UdpSocket::bind(addr)?))
    }

    pub fn from_socket(socket: UdpSocket) -> Self {
        Self {
            socket,
            buf: vec![0u8; RECV_BUFFER].into_boxed_slice(),
        }
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, frame: &Frame, dest: SocketAddr) -> Result<(), TransportError> {
        let bytes = frame.encode().map_err(TransportError::Encode)?;
        self.socket.send_to(&bytes, dest)?;
        Ok(())
    }

    fn receive(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<Option<(Frame, SocketAddr)>, TransportError> {
        // a zero read timeout is rejected by the OS
        if timeout.is_some_and(|t| t.is_zero()) {
            return Ok(None);
        }
        self.socket.set_read_timeout(timeout)?;
        match self.socket.recv_from(&mut self.buf) {
            Ok((n, from)) => Frame::decode(&self.buf[..n])
                .map(|frame| Some((frame, from)))
                .map_err(|source| TransportError::Malformed { from, source }),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) =>
            {
                Ok(None)
            }
            // ICMP port unreachable surfaces here on some platforms
            Err(e) if e.kind() == io::ErrorKind::ConnectionReset => {
                debug!(error = %e, "ignoring connection reset");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }
}
