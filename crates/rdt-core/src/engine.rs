use bytes::Bytes;
use rdt_abstract::{
    BlockSink, BlockSource, ConfigError, LossConfig, MAX_PAYLOAD, ProtocolConfig, ProtocolKind,
    Transport, TransportError,
};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::channel::Channel;
use crate::error::{RdtError, Result};
use crate::gbn::{GoBackNReceiver, GoBackNSender};
use crate::loss::LossSimulator;
use crate::seq::BlockIndex;
use crate::sr::{SelectiveRepeatReceiver, SelectiveRepeatSender};

/// Outcome of a completed send.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransferSummary {
    /// Payload blocks, not counting the end-of-stream marker.
    pub blocks: u64,
    pub retransmissions: u64,
}

/// Outcome of a completed receive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReceiveSummary {
    pub blocks: u64,
    pub bytes: u64,
    /// Data frames that were duplicates, out of order or out of window.
    pub discarded: u64,
}

pub(crate) fn fetch_block<S: BlockSource + ?Sized>(
    source: &mut S,
    index: BlockIndex,
    total: BlockIndex,
) -> Result<Bytes> {
    let payload = source.block(index as u64)?;
    let valid = if index == total {
        payload.is_empty()
    } else {
        !payload.is_empty() && payload.len() <= MAX_PAYLOAD
    };
    if !valid {
        return Err(RdtError::InvalidBlock {
            index: index as u64,
            len: payload.len(),
        });
    }
    Ok(payload)
}

/// Keep answering late retransmissions until the sender has been quiet for
/// `quiet`. `ack_for` maps a late frame's number to the ack to send.
pub(crate) fn linger<T: Transport>(
    channel: &mut Channel<T>,
    quiet: Duration,
    ack_for: impl Fn(u8) -> u8,
) -> Result<()> {
    if quiet.is_zero() {
        return Ok(());
    }
    loop {
        match channel.poll_data(quiet) {
            Ok(Some((seq, _))) => {
                debug!(seq, "late frame after completion");
                channel.send_ack(ack_for(seq))?;
            }
            Ok(None) => return Ok(()),
            // nobody left to acknowledge
            Err(RdtError::Transport(TransportError::Closed)) => return Ok(()),
            Err(e) => return Err(e),
        }
    }
}

/// Sender state machine selected by [`ProtocolKind`].
#[derive(Debug)]
pub enum SenderEngine {
    GoBackN(GoBackNSender),
    SelectiveRepeat(SelectiveRepeatSender),
}

impl SenderEngine {
    /// Stop-and-wait is go-back-n with a window of one.
    pub fn new(config: &ProtocolConfig) -> std::result::Result<Self, ConfigError> {
        Ok(match config.kind {
            ProtocolKind::StopAndWait | ProtocolKind::GoBackN => {
                SenderEngine::GoBackN(GoBackNSender::new(config)?)
            }
            ProtocolKind::SelectiveRepeat => {
                SenderEngine::SelectiveRepeat(SelectiveRepeatSender::new(config)?)
            }
        })
    }

    pub fn base(&self) -> BlockIndex {
        match self {
            SenderEngine::GoBackN(s) => s.base(),
            SenderEngine::SelectiveRepeat(s) => s.base(),
        }
    }

    pub fn next(&self) -> BlockIndex {
        match self {
            SenderEngine::GoBackN(s) => s.next(),
            SenderEngine::SelectiveRepeat(s) => s.next(),
        }
    }

    pub fn send<T, S>(&mut self, channel: &mut Channel<T>, source: &mut S) -> Result<TransferSummary>
    where
        T: Transport,
        S: BlockSource + ?Sized,
    {
        match self {
            SenderEngine::GoBackN(s) => s.send(channel, source),
            SenderEngine::SelectiveRepeat(s) => s.send(channel, source),
        }
    }
}

/// Receiver state machine selected by [`ProtocolKind`].
#[derive(Debug)]
pub enum ReceiverEngine {
    GoBackN(GoBackNReceiver),
    SelectiveRepeat(SelectiveRepeatReceiver),
}

impl ReceiverEngine {
    pub fn new(config: &ProtocolConfig) -> std::result::Result<Self, ConfigError> {
        Ok(match config.kind {
            ProtocolKind::StopAndWait | ProtocolKind::GoBackN => {
                ReceiverEngine::GoBackN(GoBackNReceiver::new(config)?)
            }
            ProtocolKind::SelectiveRepeat => {
                ReceiverEngine::SelectiveRepeat(SelectiveRepeatReceiver::new(config)?)
            }
        })
    }

    pub fn base(&self) -> BlockIndex {
        match self {
            ReceiverEngine::GoBackN(r) => r.base(),
            ReceiverEngine::SelectiveRepeat(r) => r.base(),
        }
    }

    pub fn receive<T, K>(&mut self, channel: &mut Channel<T>, sink: &mut K) -> Result<ReceiveSummary>
    where
        T: Transport,
        K: BlockSink + ?Sized,
    {
        match self {
            ReceiverEngine::GoBackN(r) => r.receive(channel, sink),
            ReceiverEngine::SelectiveRepeat(r) => r.receive(channel, sink),
        }
    }
}

/// One endpoint able to both send and receive files over a single channel,
/// one direction at a time.
///
/// Loss injection is active only while a transfer runs, so command traffic
/// in between is never dropped.
pub struct Transceiver<T> {
    config: ProtocolConfig,
    channel: Channel<T>,
    sender: SenderEngine,
    receiver: ReceiverEngine,
}

impl<T: Transport> Transceiver<T> {
    pub fn new(transport: T, config: ProtocolConfig, loss: LossConfig) -> Result<Self> {
        let mut loss = LossSimulator::new(loss)?;
        loss.disable();
        Ok(Self {
            sender: SenderEngine::new(&config)?,
            receiver: ReceiverEngine::new(&config)?,
            channel: Channel::new(transport, loss),
            config,
        })
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn channel(&self) -> &Channel<T> {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut Channel<T> {
        &mut self.channel
    }

    pub fn sender(&self) -> &SenderEngine {
        &self.sender
    }

    pub fn receiver(&self) -> &ReceiverEngine {
        &self.receiver
    }

    pub fn into_channel(self) -> Channel<T> {
        self.channel
    }

    pub fn send<S: BlockSource + ?Sized>(&mut self, source: &mut S) -> Result<TransferSummary> {
        self.channel.loss_mut().enable();
        let result = self.sender.send(&mut self.channel, source);
        self.channel.loss_mut().disable();
        result
    }

    pub fn receive<K: BlockSink + ?Sized>(&mut self, sink: &mut K) -> Result<ReceiveSummary> {
        self.channel.loss_mut().enable();
        let result = self.receiver.receive(&mut self.channel, sink);
        self.channel.loss_mut().disable();
        result
    }
}
