use rdt_abstract::{LossConfig, ProtocolConfig};
use rdt_core::{ChannelStats, ReceiveSummary, TransferSummary};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub protocol: ProtocolConfig,
    pub sender_loss: LossConfig,
    pub receiver_loss: LossConfig,
    pub input_len: usize,
    #[serde(skip)]
    pub output: Vec<u8>,
    pub output_len: usize,
    pub output_matches_input: bool,
    /// Both ends finished without error.
    pub completed: bool,
    pub transfer: Option<TransferSummary>,
    pub delivery: Option<ReceiveSummary>,
    pub sender_stats: ChannelStats,
    pub receiver_stats: ChannelStats,
    /// Frames removed by one-shot link faults, per end.
    pub sender_faults: u64,
    pub receiver_faults: u64,
    pub sender_error: Option<String>,
    pub receiver_error: Option<String>,
    pub duration_ms: u64,
}

impl SimulationReport {
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }
}
