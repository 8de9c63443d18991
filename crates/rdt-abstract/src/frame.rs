use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Largest payload a single data frame may carry.
pub const MAX_PAYLOAD: usize = 1024;
/// type + number + 16-bit payload length
pub const DATA_HEADER_LEN: usize = 4;
pub const ACK_LEN: usize = 2;
/// Largest datagram the protocol ever produces.
pub const MAX_FRAME_LEN: usize = DATA_HEADER_LEN + MAX_PAYLOAD;

/// Frame type byte (offset 0)
pub mod kind {
    pub const NONE: u8 = 0;
    pub const COMMAND: u8 = 1;
    pub const DATA: u8 = 4;
    pub const ACK: u8 = 20;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("empty datagram")]
    Empty,

    #[error("unknown frame type {0}")]
    UnknownType(u8),

    #[error("frame truncated: need at least {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("payload of {0} bytes exceeds the {max} byte limit", max = MAX_PAYLOAD)]
    PayloadTooLarge(usize),

    #[error("ack frame must be {expected} bytes, got {0}", expected = ACK_LEN)]
    AckLength(usize),

    #[error("data frame declares {declared} payload bytes but carries {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("command text is not null-terminated")]
    UnterminatedCommand,

    #[error("command text must be ASCII without NUL bytes")]
    InvalidCommand,
}

/// One datagram on the wire.
///
/// Multi-byte fields are little-endian. A data frame with an empty payload is
/// the end-of-stream marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data { seq: u8, payload: Bytes },
    Ack { seq: u8 },
    Command(String),
}

impl Frame {
    pub fn data(seq: u8, payload: impl Into<Bytes>) -> Self {
        Frame::Data {
            seq,
            payload: payload.into(),
        }
    }

    pub fn end_of_stream(seq: u8) -> Self {
        Frame::Data {
            seq,
            payload: Bytes::new(),
        }
    }

    pub fn ack(seq: u8) -> Self {
        Frame::Ack { seq }
    }

    pub fn command(text: impl Into<String>) -> Self {
        Frame::Command(text.into())
    }

    /// Wire type byte of this frame.
    pub fn kind(&self) -> u8 {
        match self {
            Frame::Data { .. } => kind::DATA,
            Frame::Ack { .. } => kind::ACK,
            Frame::Command(_) => kind::COMMAND,
        }
    }

    /// Sequence or ack number; commands carry none.
    pub fn seq(&self) -> Option<u8> {
        match self {
            Frame::Data { seq, .. } | Frame::Ack { seq } => Some(*seq),
            Frame::Command(_) => None,
        }
    }

    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Frame::Data { payload, .. } if payload.is_empty())
    }

    pub fn encode(&self) -> Result<Bytes, FrameError> {
        match self {
            Frame::Data { seq, payload } => {
                if payload.len() > MAX_PAYLOAD {
                    return Err(FrameError::PayloadTooLarge(payload.len()));
                }
                let mut buf = BytesMut::with_capacity(DATA_HEADER_LEN + payload.len());
                buf.put_u8(kind::DATA);
                buf.put_u8(*seq);
                buf.put_u16_le(payload.len() as u16);
                buf.put_slice(payload);
                Ok(buf.freeze())
            }
            Frame::Ack { seq } => {
                let mut buf = BytesMut::with_capacity(ACK_LEN);
                buf.put_u8(kind::ACK);
                buf.put_u8(*seq);
                Ok(buf.freeze())
            }
            Frame::Command(text) => {
                if !text.is_ascii() || text.bytes().any(|b| b == 0) {
                    return Err(FrameError::InvalidCommand);
                }
                if text.len() > MAX_PAYLOAD {
                    return Err(FrameError::PayloadTooLarge(text.len()));
                }
                let mut buf = BytesMut::with_capacity(text.len() + 2);
                buf.put_u8(kind::COMMAND);
                buf.put_slice(text.as_bytes());
                buf.put_u8(0);
                Ok(buf.freeze())
            }
        }
    }

    pub fn decode(datagram: &[u8]) -> Result<Self, FrameError> {
        let mut buf = datagram;
        if !buf.has_remaining() {
            return Err(FrameError::Empty);
        }
        match buf.get_u8() {
            kind::DATA => {
                if datagram.len() < DATA_HEADER_LEN {
                    return Err(FrameError::Truncated {
                        expected: DATA_HEADER_LEN,
                        actual: datagram.len(),
                    });
                }
                let seq = buf.get_u8();
                let declared = buf.get_u16_le() as usize;
                if declared > MAX_PAYLOAD {
                    return Err(FrameError::PayloadTooLarge(declared));
                }
                if buf.remaining() != declared {
                    return Err(FrameError::LengthMismatch {
                        declared,
                        actual: buf.remaining(),
                    });
                }
                Ok(Frame::Data {
                    seq,
                    payload: Bytes::copy_from_slice(buf),
                })
            }
            kind::ACK => {
                if datagram.len() != ACK_LEN {
                    return Err(FrameError::AckLength(datagram.len()));
                }
                Ok(Frame::Ack { seq: buf.get_u8() })
            }
            kind::COMMAND => {
                let end = buf
                    .iter()
                    .position(|&b| b == 0)
                    .ok_or(FrameError::UnterminatedCommand)?;
                let text = &buf[..end];
                if !text.is_ascii() {
                    return Err(FrameError::InvalidCommand);
                }
                // ASCII is always valid UTF-8
                Ok(Frame::Command(String::from_utf8_lossy(text).into_owned()))
            }
            other => Err(FrameError::UnknownType(other)),
        }
    }
}
