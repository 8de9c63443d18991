use bytes::Bytes;
use rdt_abstract::{Frame, Transport, TransportError};
use serde::Serialize;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::{RdtError, Result};
use crate::loss::{LossChannel, LossSimulator};

/// Per-channel frame counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChannelStats {
    pub data_frames_attempted: u64,
    pub data_frames_sent: u64,
    pub data_frames_dropped: u64,
    pub acks_attempted: u64,
    pub acks_sent: u64,
    pub acks_dropped: u64,
    pub data_frames_received: u64,
    pub acks_received: u64,
    /// Inbound frames suppressed by the loss simulator.
    pub inbound_dropped: u64,
}

/// A transport bound to one peer, with loss injection on the data path.
pub struct Channel<T> {
    transport: T,
    peer: Option<SocketAddr>,
    loss: LossSimulator,
    stats: ChannelStats,
}

impl<T: Transport> Channel<T> {
    pub fn new(transport: T, loss: LossSimulator) -> Self {
        Self {
            transport,
            peer: None,
            loss,
            stats: ChannelStats::default(),
        }
    }

    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn set_peer(&mut self, peer: SocketAddr) {
        self.peer = Some(peer);
    }

    fn bound_peer(&self) -> Result<SocketAddr> {
        self.peer.ok_or(RdtError::NoPeer)
    }

    pub fn loss(&self) -> &LossSimulator {
        &self.loss
    }

    pub fn loss_mut(&mut self) -> &mut LossSimulator {
        &mut self.loss
    }

    pub fn stats(&self) -> ChannelStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = ChannelStats::default();
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    pub fn send_data(&mut self, seq: u8, payload: Bytes) -> Result<()> {
        let peer = self.bound_peer()?;
        self.stats.data_frames_attempted += 1;
        if self.loss.should_drop(LossChannel::SendData) {
            debug!(seq, "loss: data frame not sent");
            self.stats.data_frames_dropped += 1;
            return Ok(());
        }
        debug!(seq, len = payload.len(), "send data");
        self.transport.send(&Frame::data(seq, payload), peer)?;
        self.stats.data_frames_sent += 1;
        Ok(())
    }

    pub fn send_ack(&mut self, seq: u8) -> Result<()> {
        let peer = self.bound_peer()?;
        self.stats.acks_attempted += 1;
        if self.loss.should_drop(LossChannel::SendAck) {
            debug!(seq, "loss: ack not sent");
            self.stats.acks_dropped += 1;
            return Ok(());
        }
        debug!(seq, "send ack");
        self.transport.send(&Frame::ack(seq), peer)?;
        self.stats.acks_sent += 1;
        Ok(())
    }

    /// Wait at most `timeout` for one ack from the peer.
    ///
    /// Anything other than a surviving ack from the bound peer counts as
    /// nothing received.
    pub fn poll_ack(&mut self, timeout: Duration) -> Result<Option<u8>> {
        let peer = self.bound_peer()?;
        if timeout.is_zero() {
            return Ok(None);
        }
        match self.transport.receive(Some(timeout)) {
            Ok(Some((Frame::Ack { seq }, from))) if from == peer => {
                if self.loss.should_drop(LossChannel::RecvAck) {
                    debug!(seq, "loss: ack not received");
                    self.stats.inbound_dropped += 1;
                    return Ok(None);
                }
                debug!(seq, "recv ack");
                self.stats.acks_received += 1;
                Ok(Some(seq))
            }
            Ok(Some((frame, from))) => {
                debug!(kind = frame.kind(), %from, "ignoring frame while waiting for ack");
                Ok(None)
            }
            Ok(None) => Ok(None),
            Err(TransportError::Malformed { from, source }) => {
                debug!(%from, error = %source, "dropping malformed datagram");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Block until a data frame from the peer survives inbound loss.
    pub fn recv_data(&mut self) -> Result<(u8, Bytes)> {
        loop {
            if let Some(frame) = self.next_data(None)? {
                return Ok(frame);
            }
        }
    }

    /// Like [`Channel::recv_data`], giving up once `timeout` has passed.
    pub fn poll_data(&mut self, timeout: Duration) -> Result<Option<(u8, Bytes)>> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            if let Some(frame) = self.next_data(Some(remaining))? {
                return Ok(Some(frame));
            }
        }
    }

    /// One receive attempt. `None` covers timeouts as well as discarded
    /// frames, so callers loop until their own deadline.
    fn next_data(&mut self, timeout: Option<Duration>) -> Result<Option<(u8, Bytes)>> {
        let peer = self.bound_peer()?;
        match self.transport.receive(timeout) {
            Ok(Some((Frame::Data { seq, payload }, from))) if from == peer => {
                if self.loss.should_drop(LossChannel::RecvData) {
                    debug!(seq, "loss: data frame not received");
                    self.stats.inbound_dropped += 1;
                    return Ok(None);
                }
                debug!(seq, len = payload.len(), "recv data");
                self.stats.data_frames_received += 1;
                Ok(Some((seq, payload)))
            }
            Ok(Some((frame, from))) => {
                debug!(kind = frame.kind(), %from, "ignoring frame while waiting for data");
                Ok(None)
            }
            Ok(None) => Ok(None),
            Err(TransportError::Malformed { from, source }) => {
                debug!(%from, error = %source, "dropping malformed datagram");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Commands bypass the loss simulator.
    pub fn send_command(&mut self, text: &str) -> Result<()> {
        let peer = self.bound_peer()?;
        debug!(text, "send command");
        self.transport.send(&Frame::command(text), peer)?;
        Ok(())
    }

    /// Block until a command arrives from anyone, and bind its sender as
    /// the peer.
    pub fn recv_command(&mut self) -> Result<String> {
        loop {
            match self.transport.receive(None) {
                Ok(Some((Frame::Command(text), from))) => {
                    debug!(%from, text = %text, "recv command");
                    self.peer = Some(from);
                    return Ok(text);
                }
                Ok(Some((frame, from))) => {
                    debug!(kind = frame.kind(), %from, "ignoring frame while waiting for command");
                }
                Ok(None) => {}
                Err(TransportError::Malformed { from, source }) => {
                    debug!(%from, error = %source, "dropping malformed datagram");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Poll up to `attempts` times for the peer's acknowledgement of a
    /// command.
    pub fn await_command_ack(&mut self, attempts: usize, interval: Duration) -> Result<bool> {
        for _ in 0..attempts {
            if self.poll_ack(interval)?.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
