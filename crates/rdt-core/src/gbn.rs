use rdt_abstract::{BlockSink, BlockSource, ConfigError, ProtocolConfig, Transport};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::channel::Channel;
use crate::engine::{ReceiveSummary, TransferSummary, fetch_block, linger};
use crate::error::Result;
use crate::seq::{BlockIndex, resolve_forward, wire_number};
use crate::timer::Timer;

/// Go-back-n sender: one timer for the whole outstanding window, cumulative
/// acks, and a full-window resend on timeout.
#[derive(Debug)]
pub struct GoBackNSender {
    window: usize,
    modulus: usize,
    timeout: Duration,
    poll_interval: Duration,
    base: BlockIndex,
    next: BlockIndex,
    timer: Timer,
    retransmissions: u64,
}

impl GoBackNSender {
    pub fn new(config: &ProtocolConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            window: config.effective_window(),
            modulus: config.modulus,
            timeout: config.timeout(),
            poll_interval: config.poll_interval(),
            base: 0,
            next: 0,
            timer: Timer::new(),
            retransmissions: 0,
        })
    }

    /// Oldest unacknowledged block.
    pub fn base(&self) -> BlockIndex {
        self.base
    }

    /// Next block never sent.
    pub fn next(&self) -> BlockIndex {
        self.next
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn send<T, S>(&mut self, channel: &mut Channel<T>, source: &mut S) -> Result<TransferSummary>
    where
        T: Transport,
        S: BlockSource + ?Sized,
    {
        self.base = 0;
        self.next = 0;
        self.timer.stop();
        self.retransmissions = 0;

        let total = source.block_count() as BlockIndex;
        let window = self.window as BlockIndex;
        info!(blocks = total, window = self.window, modulus = self.modulus, "go-back-n send started");

        while self.base <= total {
            while self.next < self.base + window && self.next <= total {
                self.transmit(channel, source, self.next, total)?;
                if self.next == self.base {
                    self.timer.set_timeout(self.timeout);
                }
                self.next += 1;
            }

            while let Some(ack) = channel.poll_ack(self.poll_interval)? {
                let acked = resolve_forward(self.base, ack, self.modulus);
                if acked < self.base + window && acked < self.next {
                    self.base = acked + 1;
                    debug!(ack, base = self.base, "window advanced");
                    if self.base == self.next {
                        self.timer.stop();
                    } else {
                        self.timer.set_timeout(self.timeout);
                    }
                } else {
                    debug!(ack, base = self.base, "ack outside window ignored");
                }
                if self.base > total {
                    break;
                }
            }

            if self.timer.is_timeout() {
                info!(base = self.base, next = self.next, "timeout, resending window");
                for index in self.base..self.next {
                    self.transmit(channel, source, index, total)?;
                    self.retransmissions += 1;
                }
                self.timer.set_timeout(self.timeout);
            }
        }

        self.timer.stop();
        info!(blocks = total, retransmissions = self.retransmissions, "go-back-n send finished");
        Ok(TransferSummary {
            blocks: total as u64,
            retransmissions: self.retransmissions,
        })
    }

    fn transmit<T, S>(
        &mut self,
        channel: &mut Channel<T>,
        source: &mut S,
        index: BlockIndex,
        total: BlockIndex,
    ) -> Result<()>
    where
        T: Transport,
        S: BlockSource + ?Sized,
    {
        let payload = fetch_block(source, index, total)?;
        debug!(index, "transmit block");
        channel.send_data(wire_number(index, self.modulus), payload)
    }
}

/// Go-back-n receiver: accepts only the next in-order block and acks
/// cumulatively after every frame.
#[derive(Debug)]
pub struct GoBackNReceiver {
    modulus: usize,
    linger: Duration,
    base: BlockIndex,
}

impl GoBackNReceiver {
    pub fn new(config: &ProtocolConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            modulus: config.modulus,
            linger: config.linger(),
            base: -1,
        })
    }

    /// Last block accepted in order, -1 before the first.
    pub fn base(&self) -> BlockIndex {
        self.base
    }

    pub fn receive<T, K>(&mut self, channel: &mut Channel<T>, sink: &mut K) -> Result<ReceiveSummary>
    where
        T: Transport,
        K: BlockSink + ?Sized,
    {
        self.base = -1;
        let mut summary = ReceiveSummary::default();
        info!(modulus = self.modulus, "go-back-n receive started");

        loop {
            let (seq, payload) = channel.recv_data()?;
            let actual = resolve_forward(self.base, seq, self.modulus);
            let mut finished = false;
            if actual == self.base + 1 {
                if payload.is_empty() {
                    finished = true;
                } else {
                    sink.append(&payload)?;
                    summary.blocks += 1;
                    summary.bytes += payload.len() as u64;
                }
                self.base += 1;
            } else {
                debug!(seq, expected = self.base + 1, "out of order block discarded");
                summary.discarded += 1;
            }
            channel.send_ack(wire_number(self.base, self.modulus))?;
            if finished {
                break;
            }
        }

        info!(blocks = summary.blocks, bytes = summary.bytes, "go-back-n receive finished");
        let final_ack = wire_number(self.base, self.modulus);
        linger(channel, self.linger, |_| final_ack)?;
        if summary.discarded > 0 {
            warn!(discarded = summary.discarded, "frames discarded during transfer");
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loss::LossSimulator;
    use crate::testing::{PEER, ScriptedTransport};
    use bytes::Bytes;
    use rdt_abstract::Frame;

    use crate::file::MemoryBlockSource;

    /// Replies like an in-order receiver would, optionally losing the first
    /// transmission of one sequence number.
    fn cumulative_acker(modulus: usize, lose_once: Option<u8>) -> ScriptedTransport {
        let mut expected: BlockIndex = 0;
        let mut lost = lose_once;
        ScriptedTransport::with_responder(move |frame| {
            let Frame::Data { seq, .. } = frame else {
                return vec![];
            };
            if lost == Some(*seq) {
                lost = None;
                return vec![];
            }
            if *seq == wire_number(expected, modulus) {
                expected += 1;
            }
            vec![Frame::ack(wire_number(expected - 1, modulus))]
        })
    }

    #[test]
    fn sends_every_block_in_order() {
        let config = ProtocolConfig::go_back_n(4, 8);
        let data = vec![7u8; 10 * 1024 + 5];
        let mut source = MemoryBlockSource::new(data);
        let mut channel = Channel::new(cumulative_acker(8, None), LossSimulator::lossless()).with_peer(PEER);
        let mut sender = GoBackNSender::new(&config).unwrap();

        let summary = sender.send(&mut channel, &mut source).unwrap();
        assert_eq!(summary.blocks, 11);
        assert_eq!(summary.retransmissions, 0);
        assert_eq!(sender.base(), 12);
        let seqs = channel.transport().sent_data();
        let expected: Vec<u8> = (0..12).map(|i| (i % 8) as u8).collect();
        assert_eq!(seqs, expected);
    }

    #[test]
    fn timeout_resends_outstanding_window() {
        let config = ProtocolConfig::go_back_n(3, 8).with_timeout_ms(20);
        let mut source = MemoryBlockSource::new(vec![1u8; 4 * 1024]);
        let mut channel = Channel::new(cumulative_acker(8, Some(1)), LossSimulator::lossless()).with_peer(PEER);
        let mut sender = GoBackNSender::new(&config).unwrap();

        let summary = sender.send(&mut channel, &mut source).unwrap();
        assert!(summary.retransmissions >= 1);
        let seqs = channel.transport().sent_data();
        // block 1 was lost, so it must appear again after the first window
        assert_eq!(&seqs[..3], &[0, 1, 2]);
        assert!(seqs[3..].contains(&1));
        assert_eq!(*seqs.last().unwrap(), 4);
    }

    #[test]
    fn stop_and_wait_counts() {
        let config = ProtocolConfig::stop_and_wait(2);
        let mut source = MemoryBlockSource::new(&b"hello"[..]);
        let mut channel = Channel::new(cumulative_acker(2, None), LossSimulator::lossless()).with_peer(PEER);
        let mut sender = GoBackNSender::new(&config).unwrap();
        assert_eq!(sender.window(), 1);

        sender.send(&mut channel, &mut source).unwrap();
        let stats = channel.stats();
        assert_eq!(stats.data_frames_sent, 2);
        assert_eq!(stats.acks_received, 2);
        assert_eq!(channel.transport().sent_data(), vec![0, 1]);
    }

    #[test]
    fn receiver_accepts_only_next_block() {
        let mut transport = ScriptedTransport::new();
        transport.push(Frame::data(1, &b"B"[..]), PEER);
        transport.push(Frame::data(0, &b"A"[..]), PEER);
        transport.push(Frame::data(0, &b"A"[..]), PEER);
        transport.push(Frame::data(1, &b"B"[..]), PEER);
        transport.push(Frame::end_of_stream(2), PEER);
        let mut channel = Channel::new(transport, LossSimulator::lossless()).with_peer(PEER);
        let mut receiver = GoBackNReceiver::new(&ProtocolConfig::go_back_n(4, 8)).unwrap();
        let mut out = Vec::new();

        let summary = receiver.receive(&mut channel, &mut out).unwrap();
        assert_eq!(out, b"AB");
        assert_eq!(summary.blocks, 2);
        assert_eq!(summary.discarded, 2);
        assert_eq!(receiver.base(), 2);
        // nothing accepted yet acks M-1, then cumulative acks
        assert_eq!(channel.transport().sent_acks(), vec![7, 0, 0, 1, 2]);
    }

    #[test]
    fn receiver_lingers_for_late_frames() {
        let mut transport = ScriptedTransport::new();
        transport.push(Frame::end_of_stream(0), PEER);
        transport.push(Frame::end_of_stream(0), PEER);
        let mut channel = Channel::new(transport, LossSimulator::lossless()).with_peer(PEER);
        let config = ProtocolConfig::go_back_n(1, 2).with_linger_ms(30);
        let mut receiver = GoBackNReceiver::new(&config).unwrap();
        let mut out = Vec::new();

        receiver.receive(&mut channel, &mut out).unwrap();
        assert!(out.is_empty());
        assert_eq!(channel.transport().sent_acks(), vec![0, 0]);
    }

    #[test]
    fn empty_block_before_end_is_rejected() {
        struct Holey;
        impl BlockSource for Holey {
            fn block_count(&self) -> u64 {
                2
            }
            fn block(&mut self, _index: u64) -> std::io::Result<Bytes> {
                Ok(Bytes::new())
            }
        }
        let mut channel = Channel::new(cumulative_acker(8, None), LossSimulator::lossless()).with_peer(PEER);
        let mut sender = GoBackNSender::new(&ProtocolConfig::go_back_n(2, 8)).unwrap();
        assert!(matches!(
            sender.send(&mut channel, &mut Holey),
            Err(crate::error::RdtError::InvalidBlock { index: 0, len: 0 })
        ));
    }
}
