pub mod config;
pub mod frame;
pub mod interface;
pub mod scenario;

pub use config::{ConfigError, LossConfig, ProtocolConfig, ProtocolKind};
pub use frame::{Frame, FrameError, MAX_FRAME_LEN, MAX_PAYLOAD};
pub use interface::{BlockSink, BlockSource, Transport, TransportError};
pub use scenario::{
    InputSpec, LossOverride, ProtocolOverride, TestAction, TestAssertion, TestScenario,
};
