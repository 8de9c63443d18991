use bytes::Bytes;
use rdt_abstract::{Frame, Transport, TransportError};
use std::net::SocketAddr;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};
use tracing::debug;

type Datagram = (Bytes, SocketAddr);

/// One end of an in-process datagram link.
///
/// Frames are encoded on send and decoded on receive, so both ends exercise
/// the wire codec. Faults registered on an end apply to the frames that end
/// sends.
pub struct MemoryLink {
    local: SocketAddr,
    remote: SocketAddr,
    tx: Sender<Datagram>,
    rx: Receiver<Datagram>,
    drop_data_once: Vec<u8>,
    drop_ack_once: Vec<u8>,
    close_at: Option<Instant>,
    frames_sent: u64,
    frames_faulted: u64,
}

impl MemoryLink {
    pub fn pair(a: SocketAddr, b: SocketAddr) -> (MemoryLink, MemoryLink) {
        let (a_tx, b_rx) = mpsc::channel();
        let (b_tx, a_rx) = mpsc::channel();
        (MemoryLink::new(a, b, a_tx, a_rx), MemoryLink::new(b, a, b_tx, b_rx))
    }

    fn new(local: SocketAddr, remote: SocketAddr, tx: Sender<Datagram>, rx: Receiver<Datagram>) -> Self {
        Self {
            local,
            remote,
            tx,
            rx,
            drop_data_once: Vec::new(),
            drop_ack_once: Vec::new(),
            close_at: None,
            frames_sent: 0,
            frames_faulted: 0,
        }
    }

    /// Drop the first data frame this end sends with number `seq`.
    pub fn drop_next_data(&mut self, seq: u8) {
        self.drop_data_once.push(seq);
    }

    /// Drop the first ack this end sends with number `ack`.
    pub fn drop_next_ack(&mut self, ack: u8) {
        self.drop_ack_once.push(ack);
    }

    /// After `after`, every receive fails with [`TransportError::Closed`].
    pub fn close_after(&mut self, after: Duration) {
        self.close_at = Some(Instant::now() + after);
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    pub fn frames_faulted(&self) -> u64 {
        self.frames_faulted
    }

    fn take_fault(&mut self, frame: &Frame) -> bool {
        let list = match frame {
            Frame::Data { .. } => &mut self.drop_data_once,
            Frame::Ack { .. } => &mut self.drop_ack_once,
            Frame::Command(_) => return false,
        };
        let Some(seq) = frame.seq() else {
            return false;
        };
        match list.iter().position(|s| *s == seq) {
            Some(i) => {
                list.remove(i);
                true
            }
            None => false,
        }
    }

    fn wait_limit(&self, timeout: Option<Duration>) -> Result<Option<Duration>, TransportError> {
        let Some(close_at) = self.close_at else {
            return Ok(timeout);
        };
        let left = close_at.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return Err(TransportError::Closed);
        }
        Ok(Some(timeout.map_or(left, |t| t.min(left))))
    }
}

impl Transport for MemoryLink {
    fn send(&mut self, frame: &Frame, dest: SocketAddr) -> Result<(), TransportError> {
        let bytes = frame.encode().map_err(TransportError::Encode)?;
        if self.take_fault(frame) {
            debug!(seq = ?frame.seq(), "fault: frame dropped on link");
            self.frames_faulted += 1;
            return Ok(());
        }
        self.frames_sent += 1;
        if dest != self.remote {
            debug!(%dest, "no such host on link");
            return Ok(());
        }
        // a vanished peer behaves like an unreachable host
        let _ = self.tx.send((bytes, self.local));
        Ok(())
    }

    fn receive(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<Option<(Frame, SocketAddr)>, TransportError> {
        let (bytes, from) = match self.wait_limit(timeout)? {
            None => self.rx.recv().map_err(|_| TransportError::Closed)?,
            Some(limit) => match self.rx.recv_timeout(limit) {
                Ok(datagram) => datagram,
                Err(RecvTimeoutError::Timeout) => {
                    if self.close_at.is_some_and(|c| Instant::now() >= c) {
                        return Err(TransportError::Closed);
                    }
                    return Ok(None);
                }
                Err(RecvTimeoutError::Disconnected) => return Err(TransportError::Closed),
            },
        };
        Frame::decode(&bytes)
            .map(|frame| Some((frame, from)))
            .map_err(|source| TransportError::Malformed { from, source })
    }

    fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.local)
    }
}
