use rdt_abstract::{ConfigError, TransportError};
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RdtError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("block i/o failed: {0}")]
    Io(#[from] io::Error),

    /// The source returned a block that cannot go on the wire as-is: empty
    /// before the end of the file, or larger than one frame.
    #[error("block {index} has invalid length {len}")]
    InvalidBlock { index: u64, len: usize },

    #[error("no peer bound to the channel")]
    NoPeer,
}

pub type Result<T> = std::result::Result<T, RdtError>;
