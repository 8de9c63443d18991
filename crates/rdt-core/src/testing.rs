//! In-process transport for unit tests.

use rdt_abstract::{Frame, FrameError, Transport, TransportError};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::Duration;

pub const PEER: SocketAddr = SocketAddr::V4(std::net::SocketAddrV4::new(
    std::net::Ipv4Addr::LOCALHOST,
    9000,
));

pub fn other_addr() -> SocketAddr {
    "127.0.0.1:9999".parse().unwrap()
}

type Responder = Box<dyn FnMut(&Frame) -> Vec<Frame>>;

/// Replays queued inbound frames and records everything sent.
///
/// A blocking receive on an empty queue fails with `Closed`, which ends a
/// receiver loop once its script runs out. A timed receive on an empty queue
/// times out, unless the transport was made `closing` and an end-of-stream
/// frame has gone out, in which case it fails with `Closed` like a peer that
/// exited. An optional responder answers each sent frame by
/// queueing replies from `PEER`.
pub struct ScriptedTransport {
    inbox: VecDeque<Result<(Frame, SocketAddr), FrameError>>,
    pub sent: Vec<(Frame, SocketAddr)>,
    responder: Option<Responder>,
    closing: bool,
    end_sent: bool,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            inbox: VecDeque::new(),
            sent: Vec::new(),
            responder: None,
            closing: false,
            end_sent: false,
        }
    }

    pub fn with_responder(responder: impl FnMut(&Frame) -> Vec<Frame> + 'static) -> Self {
        Self {
            responder: Some(Box::new(responder)),
            ..Self::new()
        }
    }

    /// The peer leaves once the end marker is sent and the queue runs dry.
    pub fn closing(mut self) -> Self {
        self.closing = true;
        self
    }

    pub fn push(&mut self, frame: Frame, from: SocketAddr) {
        self.inbox.push_back(Ok((frame, from)));
    }

    pub fn push_malformed(&mut self, error: FrameError) {
        self.inbox.push_back(Err(error));
    }

    pub fn sent_data(&self) -> Vec<u8> {
        self.sent
            .iter()
            .filter_map(|(f, _)| match f {
                Frame::Data { seq, .. } => Some(*seq),
                _ => None,
            })
            .collect()
    }

    pub fn sent_acks(&self) -> Vec<u8> {
        self.sent
            .iter()
            .filter_map(|(f, _)| match f {
                Frame::Ack { seq } => Some(*seq),
                _ => None,
            })
            .collect()
    }
}

impl Transport for ScriptedTransport {
    fn send(&mut self, frame: &Frame, dest: SocketAddr) -> Result<(), TransportError> {
        self.sent.push((frame.clone(), dest));
        self.end_sent |= frame.is_end_of_stream();
        if let Some(responder) = self.responder.as_mut() {
            for reply in responder(frame) {
                self.inbox.push_back(Ok((reply, PEER)));
            }
        }
        Ok(())
    }

    fn receive(
        &mut self,
        timeout: Option<Duration>,
    ) -> Result<Option<(Frame, SocketAddr)>, TransportError> {
        match self.inbox.pop_front() {
            Some(Ok(entry)) => Ok(Some(entry)),
            Some(Err(source)) => Err(TransportError::Malformed {
                from: PEER,
                source,
            }),
            None if timeout.is_some() && !(self.closing && self.end_sent) => Ok(None),
            None => Err(TransportError::Closed),
        }
    }

    fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok("127.0.0.1:8000".parse().unwrap())
    }
}
