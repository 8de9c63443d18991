use rdt_abstract::{LossConfig, ProtocolConfig};
use rdt_core::{
    Channel, ChannelStats, LossSimulator, MemoryBlockSource, RdtError, ReceiveSummary,
    ReceiverEngine, SenderEngine, TransferSummary,
};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::link::MemoryLink;
use crate::trace::SimulationReport;

pub const SENDER_ADDR: SocketAddr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 4000));
pub const RECEIVER_ADDR: SocketAddr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 2), 12345));

/// One file transfer between two threads over a [`MemoryLink`].
#[derive(Debug, Clone, Default)]
pub struct TransferSimulation {
    pub protocol: ProtocolConfig,
    pub sender_loss: LossConfig,
    pub receiver_loss: LossConfig,
    pub drop_data_once: Vec<u8>,
    pub drop_ack_once: Vec<u8>,
    /// Both link ends close after this long.
    pub horizon: Option<Duration>,
}

struct EndResult<S> {
    stats: ChannelStats,
    faults: u64,
    outcome: Result<S, String>,
}

impl TransferSimulation {
    pub fn new(protocol: ProtocolConfig) -> Self {
        Self {
            protocol,
            ..Default::default()
        }
    }

    pub fn with_sender_loss(mut self, loss: LossConfig) -> Self {
        self.sender_loss = loss;
        self
    }

    pub fn with_receiver_loss(mut self, loss: LossConfig) -> Self {
        self.receiver_loss = loss;
        self
    }

    pub fn drop_next_data(mut self, seq: u8) -> Self {
        self.drop_data_once.push(seq);
        self
    }

    pub fn drop_next_ack(mut self, ack: u8) -> Self {
        self.drop_ack_once.push(ack);
        self
    }

    pub fn with_horizon(mut self, horizon: Duration) -> Self {
        self.horizon = Some(horizon);
        self
    }

    /// Run the transfer to completion or until the horizon.
    ///
    /// Configuration problems are returned as errors; anything that goes
    /// wrong during the transfer is recorded in the report.
    pub fn run(&self, input: &[u8]) -> Result<SimulationReport, RdtError> {
        self.protocol.validate()?;
        let sender_loss = LossSimulator::new(self.sender_loss.clone())?;
        let receiver_loss = LossSimulator::new(self.receiver_loss.clone())?;
        let mut sender_engine = SenderEngine::new(&self.protocol)?;
        let mut receiver_engine = ReceiverEngine::new(&self.protocol)?;

        let (mut sender_link, mut receiver_link) = MemoryLink::pair(SENDER_ADDR, RECEIVER_ADDR);
        for seq in &self.drop_data_once {
            sender_link.drop_next_data(*seq);
        }
        for ack in &self.drop_ack_once {
            receiver_link.drop_next_ack(*ack);
        }
        if let Some(horizon) = self.horizon {
            sender_link.close_after(horizon);
            receiver_link.close_after(horizon);
        }

        info!(
            protocol = %self.protocol.kind,
            window = self.protocol.effective_window(),
            modulus = self.protocol.modulus,
            bytes = input.len(),
            "simulation started"
        );
        let started = Instant::now();

        let receiver = thread::spawn(move || {
            let mut channel = Channel::new(receiver_link, receiver_loss).with_peer(SENDER_ADDR);
            let mut output = Vec::new();
            let outcome = receiver_engine
                .receive(&mut channel, &mut output)
                .map_err(|e| e.to_string());
            let result = EndResult {
                stats: channel.stats(),
                faults: channel.transport().frames_faulted(),
                outcome,
            };
            (output, result)
        });

        // the sender's link end must be gone before joining, so a receiver
        // still waiting for data sees the link close
        let sender = {
            let mut channel = Channel::new(sender_link, sender_loss).with_peer(RECEIVER_ADDR);
            let mut source = MemoryBlockSource::new(input.to_vec());
            let outcome: Result<TransferSummary, String> = sender_engine
                .send(&mut channel, &mut source)
                .map_err(|e| e.to_string());
            EndResult {
                stats: channel.stats(),
                faults: channel.transport().frames_faulted(),
                outcome,
            }
        };

        let (output, receiver) = match receiver.join() {
            Ok(joined) => joined,
            Err(_) => (
                Vec::new(),
                EndResult::<ReceiveSummary> {
                    stats: ChannelStats::default(),
                    faults: 0,
                    outcome: Err("receiver panicked".to_string()),
                },
            ),
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        let completed = sender.outcome.is_ok() && receiver.outcome.is_ok();
        if completed {
            info!(duration_ms, "simulation finished");
        } else {
            warn!(
                sender_error = ?sender.outcome.as_ref().err(),
                receiver_error = ?receiver.outcome.as_ref().err(),
                "simulation did not complete"
            );
        }

        Ok(SimulationReport {
            protocol: self.protocol.clone(),
            sender_loss: self.sender_loss.clone(),
            receiver_loss: self.receiver_loss.clone(),
            input_len: input.len(),
            output_len: output.len(),
            output_matches_input: output == input,
            output,
            completed,
            transfer: sender.outcome.as_ref().ok().copied(),
            delivery: receiver.outcome.as_ref().ok().copied(),
            sender_stats: sender.stats,
            receiver_stats: receiver.stats,
            sender_faults: sender.faults,
            receiver_faults: receiver.faults,
            sender_error: sender.outcome.err(),
            receiver_error: receiver.outcome.err(),
            duration_ms,
        })
    }
}
