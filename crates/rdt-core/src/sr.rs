use rdt_abstract::{BlockSink, BlockSource, ConfigError, ProtocolConfig, Transport};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::channel::Channel;
use crate::engine::{ReceiveSummary, TransferSummary, fetch_block, linger};
use crate::error::Result;
use crate::seq::{BlockIndex, resolve_backward, resolve_forward, wire_number};
use crate::window::{ReceiveCache, RetransmissionTimerSet};

/// Selective-repeat sender: per-block timers and selective acks.
#[derive(Debug)]
pub struct SelectiveRepeatSender {
    modulus: usize,
    timeout: Duration,
    poll_interval: Duration,
    next: BlockIndex,
    timers: RetransmissionTimerSet,
    retransmissions: u64,
}

impl SelectiveRepeatSender {
    pub fn new(config: &ProtocolConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            modulus: config.modulus,
            timeout: config.timeout(),
            poll_interval: config.poll_interval(),
            next: 0,
            timers: RetransmissionTimerSet::new(config.effective_window(), config.modulus),
            retransmissions: 0,
        })
    }

    pub fn base(&self) -> BlockIndex {
        self.timers.base()
    }

    pub fn next(&self) -> BlockIndex {
        self.next
    }

    pub fn window(&self) -> usize {
        self.timers.size()
    }

    pub fn send<T, S>(&mut self, channel: &mut Channel<T>, source: &mut S) -> Result<TransferSummary>
    where
        T: Transport,
        S: BlockSource + ?Sized,
    {
        self.timers.clear();
        self.next = 0;
        self.retransmissions = 0;

        let total = source.block_count() as BlockIndex;
        let window = self.window() as BlockIndex;
        info!(blocks = total, window, modulus = self.modulus, "selective-repeat send started");

        while self.base() <= total {
            while self.next < self.base() + window && self.next <= total {
                self.transmit(channel, source, self.next, total)?;
                self.next += 1;
            }

            let mut advanced = 0;
            while let Some(ack) = channel.poll_ack(self.poll_interval)? {
                let acked = resolve_forward(self.base(), ack, self.modulus);
                if acked <= self.base() + window {
                    if self.timers.submit(ack) {
                        debug!(ack, index = acked, "block acknowledged");
                    } else {
                        debug!(ack, "duplicate ack");
                    }
                } else {
                    debug!(ack, base = self.base(), "ack outside window ignored");
                }
                advanced += self.timers.spin();
                // the peer may be gone once the end marker is acked
                if self.base() > total {
                    break;
                }
            }

            if advanced > 0 {
                debug!(advanced, base = self.base(), "window advanced");
                continue;
            }

            // each outstanding block at most once per pass
            for index in self.base()..self.next {
                if self.timers.is_timeout(wire_number(index, self.modulus)) {
                    info!(index, "timeout, resending block");
                    self.transmit(channel, source, index, total)?;
                    self.retransmissions += 1;
                }
            }
        }

        self.timers.stop_all();
        info!(blocks = total, retransmissions = self.retransmissions, "selective-repeat send finished");
        Ok(TransferSummary {
            blocks: total as u64,
            retransmissions: self.retransmissions,
        })
    }

    /// Send one block and (re)arm its slot timer.
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
        let seq = wire_number(index, self.modulus);
        debug!(index, "transmit block");
        channel.send_data(seq, payload)?;
        self.timers.set_timeout(seq, self.timeout);
        Ok(())
    }
}

/// Selective-repeat receiver: caches out-of-order blocks and acks each
/// block individually.
#[derive(Debug)]
pub struct SelectiveRepeatReceiver {
    modulus: usize,
    linger: Duration,
    cache: ReceiveCache,
}

impl SelectiveRepeatReceiver {
    pub fn new(config: &ProtocolConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            modulus: config.modulus,
            linger: config.linger(),
            cache: ReceiveCache::new(config.effective_window(), config.modulus),
        })
    }

    /// Next block awaiting in-order delivery.
    pub fn base(&self) -> BlockIndex {
        self.cache.base()
    }

    pub fn receive<T, K>(&mut self, channel: &mut Channel<T>, sink: &mut K) -> Result<ReceiveSummary>
    where
        T: Transport,
        K: BlockSink + ?Sized,
    {
        self.cache.clear();
        let window = self.cache.size() as BlockIndex;
        let mut end: Option<BlockIndex> = None;
        let mut summary = ReceiveSummary::default();
        info!(window, modulus = self.modulus, "selective-repeat receive started");

        while end.is_none_or(|target| self.cache.base() < target) {
            let (seq, payload) = channel.recv_data()?;
            let base = self.cache.base();
            let forward = resolve_forward(base, seq, self.modulus);
            let backward = resolve_backward(base, seq, self.modulus);
            let current = forward < base + window;
            let previous = backward >= base - window;

            match (current, previous) {
                (true, true) => panic!(
                    "sequence number {seq} is in both the current and the previous window (base {base})"
                ),
                (false, true) => {
                    debug!(seq, index = backward, "duplicate from previous window, re-acking");
                    summary.discarded += 1;
                    channel.send_ack(seq)?;
                }
                (true, false) => {
                    if payload.is_empty() {
                        debug!(index = forward, "end of stream");
                        end = Some(forward);
                    } else {
                        let len = payload.len() as u64;
                        if self.cache.submit(seq, payload) {
                            summary.blocks += 1;
                            summary.bytes += len;
                            let delivered = self.cache.spin(sink)?;
                            debug!(index = forward, delivered, "block cached");
                        } else {
                            debug!(index = forward, "duplicate block");
                            summary.discarded += 1;
                        }
                    }
                    channel.send_ack(seq)?;
                }
                (false, false) => {
                    warn!(seq, base, "block outside both windows dropped");
                    summary.discarded += 1;
                }
            }
        }

        info!(blocks = summary.blocks, bytes = summary.bytes, "selective-repeat receive finished");
        linger(channel, self.linger, |seq| seq)?;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::MemoryBlockSource;
    use crate::loss::LossSimulator;
    use crate::testing::{PEER, ScriptedTransport};
    use rdt_abstract::Frame;

    fn selective_acker(lose_once: Option<u8>) -> ScriptedTransport {
        let mut lost = lose_once;
        ScriptedTransport::with_responder(move |frame| match frame {
            Frame::Data { seq, .. } if lost == Some(*seq) => {
                lost = None;
                vec![]
            }
            Frame::Data { seq, .. } => vec![Frame::ack(*seq)],
            _ => vec![],
        })
    }

    fn receiver_channel(frames: &[Frame]) -> Channel<ScriptedTransport> {
        let mut transport = ScriptedTransport::new();
        for frame in frames {
            transport.push(frame.clone(), PEER);
        }
        Channel::new(transport, LossSimulator::lossless()).with_peer(PEER)
    }

    #[test]
    fn sender_completes_lossless() {
        let config = ProtocolConfig::selective_repeat(4, 8);
        let mut source = MemoryBlockSource::new(vec![3u8; 9 * 1024]);
        let mut channel = Channel::new(selective_acker(None), LossSimulator::lossless()).with_peer(PEER);
        let mut sender = SelectiveRepeatSender::new(&config).unwrap();

        let summary = sender.send(&mut channel, &mut source).unwrap();
        assert_eq!(summary.blocks, 9);
        assert_eq!(summary.retransmissions, 0);
        assert_eq!(sender.base(), 10);
        assert_eq!(channel.transport().sent_data().len(), 10);
    }

    #[test]
    fn sender_resends_only_the_lost_block() {
        let config = ProtocolConfig::selective_repeat(4, 8).with_timeout_ms(20);
        let mut source = MemoryBlockSource::new(vec![3u8; 5 * 1024]);
        let mut channel = Channel::new(selective_acker(Some(2)), LossSimulator::lossless()).with_peer(PEER);
        let mut sender = SelectiveRepeatSender::new(&config).unwrap();

        let summary = sender.send(&mut channel, &mut source).unwrap();
        assert_eq!(summary.retransmissions, 1);
        let seqs = channel.transport().sent_data();
        assert_eq!(seqs.iter().filter(|s| **s == 2).count(), 2);
        assert_eq!(seqs.len(), 7);
    }

    #[test]
    fn sender_finishes_when_peer_leaves_after_last_ack() {
        let config = ProtocolConfig::selective_repeat(2, 4);
        for len in [0usize, 1, 2 * 1024, 2 * 1024 + 1] {
            let mut source = MemoryBlockSource::new(vec![5u8; len]);
            let transport = selective_acker(None).closing();
            let mut channel = Channel::new(transport, LossSimulator::lossless()).with_peer(PEER);
            let mut sender = SelectiveRepeatSender::new(&config).unwrap();

            let summary = sender.send(&mut channel, &mut source).unwrap();
            assert_eq!(summary.blocks, len.div_ceil(1024) as u64, "len {len}");
            assert_eq!(sender.base(), summary.blocks as BlockIndex + 1);
        }
    }

    #[test]
    fn receiver_delivers_in_order() {
        let mut channel = receiver_channel(&[
            Frame::data(0, &b"zero "[..]),
            Frame::data(2, &b"two"[..]),
            Frame::data(1, &b"one "[..]),
            Frame::end_of_stream(3),
        ]);
        let mut receiver = SelectiveRepeatReceiver::new(&ProtocolConfig::selective_repeat(4, 8)).unwrap();
        let mut out = Vec::new();

        let summary = receiver.receive(&mut channel, &mut out).unwrap();
        assert_eq!(out, b"zero one two");
        assert_eq!(summary.blocks, 3);
        assert_eq!(receiver.base(), 3);
        assert_eq!(channel.transport().sent_acks(), vec![0, 2, 1, 3]);
    }

    #[test]
    fn receiver_waits_for_gap_after_end_marker() {
        let mut channel = receiver_channel(&[
            Frame::data(1, &b"b"[..]),
            Frame::end_of_stream(2),
            Frame::data(0, &b"a"[..]),
        ]);
        let mut receiver = SelectiveRepeatReceiver::new(&ProtocolConfig::selective_repeat(4, 8)).unwrap();
        let mut out = Vec::new();

        receiver.receive(&mut channel, &mut out).unwrap();
        assert_eq!(out, b"ab");
    }

    #[test]
    fn previous_window_is_reacked_not_cached() {
        let mut channel = receiver_channel(&[
            Frame::data(0, &b"a"[..]),
            Frame::data(1, &b"b"[..]),
            Frame::data(0, &b"a"[..]),
            Frame::data(6, &b"?"[..]),
            Frame::end_of_stream(2),
        ]);
        let mut receiver = SelectiveRepeatReceiver::new(&ProtocolConfig::selective_repeat(2, 8)).unwrap();
        let mut out = Vec::new();

        let summary = receiver.receive(&mut channel, &mut out).unwrap();
        assert_eq!(out, b"ab");
        // seq 6 is in neither window and gets no reply
        assert_eq!(channel.transport().sent_acks(), vec![0, 1, 0, 2]);
        assert_eq!(summary.discarded, 2);
    }

    #[test]
    fn empty_stream() {
        let mut channel = receiver_channel(&[Frame::end_of_stream(0)]);
        let mut receiver = SelectiveRepeatReceiver::new(&ProtocolConfig::selective_repeat(1, 2)).unwrap();
        let mut out = Vec::new();
        let summary = receiver.receive(&mut channel, &mut out).unwrap();
        assert!(out.is_empty());
        assert_eq!(summary.blocks, 0);
    }
}
