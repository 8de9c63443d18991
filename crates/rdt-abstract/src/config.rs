use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_WINDOW_SIZE: usize = 4;
pub const DEFAULT_MODULUS: usize = 8;
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
/// The wire number is a single byte.
pub const MAX_MODULUS: usize = 256;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("modulus {0} out of range, expected 2..={max}", max = MAX_MODULUS)]
    ModulusOutOfRange(usize),

    #[error("window size must be at least 1")]
    ZeroWindow,

    #[error("window size {window} too large for {kind} (max {max})")]
    WindowTooLarge {
        kind: ProtocolKind,
        window: usize,
        max: usize,
    },

    #[error("retransmission timeout must be non-zero")]
    ZeroTimeout,

    #[error("ack poll interval must be non-zero")]
    ZeroPollInterval,

    #[error("{channel} loss probability {value} outside [0, 1]")]
    LossProbability { channel: &'static str, value: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProtocolKind {
    StopAndWait,
    #[default]
    GoBackN,
    SelectiveRepeat,
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProtocolKind::StopAndWait => "stop-and-wait",
            ProtocolKind::GoBackN => "go-back-n",
            ProtocolKind::SelectiveRepeat => "selective-repeat",
        })
    }
}

impl FromStr for ProtocolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sw" | "stop-and-wait" => Ok(ProtocolKind::StopAndWait),
            "gbn" | "go-back-n" => Ok(ProtocolKind::GoBackN),
            "sr" | "selective-repeat" => Ok(ProtocolKind::SelectiveRepeat),
            other => Err(format!(
                "unknown protocol '{other}', expected sw, gbn or sr"
            )),
        }
    }
}

/// Window, modulus and timing parameters shared by both ends of a transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub kind: ProtocolKind,
    /// Window size N. Ignored for stop-and-wait, which always uses 1.
    pub window_size: usize,
    /// Sequence number modulus M.
    pub modulus: usize,
    /// Retransmission timeout, per window (GBN) or per block (SR).
    pub timeout_ms: u64,
    /// Upper bound on a single ack poll by the sender.
    pub poll_interval_ms: u64,
    /// How long a finished receiver keeps acking late retransmissions.
    /// Zero returns as soon as the end-of-stream block is in.
    pub linger_ms: u64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            kind: ProtocolKind::GoBackN,
            window_size: DEFAULT_WINDOW_SIZE,
            modulus: DEFAULT_MODULUS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            linger_ms: 0,
        }
    }
}

impl ProtocolConfig {
    pub fn stop_and_wait(modulus: usize) -> Self {
        Self {
            kind: ProtocolKind::StopAndWait,
            window_size: 1,
            modulus,
            ..Default::default()
        }
    }

    pub fn go_back_n(window_size: usize, modulus: usize) -> Self {
        Self {
            kind: ProtocolKind::GoBackN,
            window_size,
            modulus,
            ..Default::default()
        }
    }

    pub fn selective_repeat(window_size: usize, modulus: usize) -> Self {
        Self {
            kind: ProtocolKind::SelectiveRepeat,
            window_size,
            modulus,
            ..Default::default()
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_poll_interval_ms(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    pub fn with_linger_ms(mut self, linger_ms: u64) -> Self {
        self.linger_ms = linger_ms;
        self
    }

    /// Window size actually used by the engines.
    pub fn effective_window(&self) -> usize {
        match self.kind {
            ProtocolKind::StopAndWait => 1,
            _ => self.window_size,
        }
    }

    /// Largest window the modulus can disambiguate for this protocol.
    pub fn max_window(&self) -> usize {
        match self.kind {
            ProtocolKind::StopAndWait | ProtocolKind::GoBackN => self.modulus.saturating_sub(1),
            ProtocolKind::SelectiveRepeat => self.modulus / 2,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn linger(&self) -> Duration {
        Duration::from_millis(self.linger_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(2..=MAX_MODULUS).contains(&self.modulus) {
            return Err(ConfigError::ModulusOutOfRange(self.modulus));
        }
        let window = self.effective_window();
        if window == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        let max = self.max_window();
        if window > max {
            return Err(ConfigError::WindowTooLarge {
                kind: self.kind,
                window,
                max,
            });
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }
        Ok(())
    }
}

/// Drop probabilities for the four logical channels of one endpoint.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LossConfig {
    /// Outbound data frames.
    pub send_data: f64,
    /// Outbound acks.
    pub send_ack: f64,
    /// Inbound data frames.
    pub recv_data: f64,
    /// Inbound acks.
    pub recv_ack: f64,
    /// Seed for reproducible loss patterns; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl LossConfig {
    pub fn lossless() -> Self {
        Self::default()
    }

    pub fn is_lossless(&self) -> bool {
        self.send_data == 0.0 && self.send_ack == 0.0 && self.recv_data == 0.0 && self.recv_ack == 0.0
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let channels = [
            ("send-data", self.send_data),
            ("send-ack", self.send_ack),
            ("recv-data", self.recv_data),
            ("recv-ack", self.recv_ack),
        ];
        for (channel, value) in channels {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::LossProbability { channel, value });
            }
        }
        Ok(())
    }
}
