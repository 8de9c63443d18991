pub mod channel;
pub mod engine;
pub mod error;
pub mod file;
pub mod gbn;
pub mod loss;
pub mod seq;
pub mod sr;
pub mod stop_wait;
pub mod timer;
pub mod udp;
pub mod window;

#[cfg(test)]
pub(crate) mod testing;

pub use rdt_abstract;

pub use channel::{Channel, ChannelStats};
pub use engine::{ReceiveSummary, ReceiverEngine, SenderEngine, TransferSummary, Transceiver};
pub use error::RdtError;
pub use file::{BLOCK_SIZE, FileBlockReader, FileBlockWriter, MemoryBlockSource};
pub use loss::{LossChannel, LossSimulator};
pub use seq::{BlockIndex, resolve_backward, resolve_forward, wire_number};
pub use udp::UdpTransport;
