use crate::config::{LossConfig, ProtocolConfig, ProtocolKind};
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct TestScenario {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub protocol: ProtocolOverride,
    #[serde(default)]
    pub loss: LossOverride,
    pub input: InputSpec,
    #[serde(default)]
    pub actions: Vec<TestAction>,
    #[serde(default)]
    pub assertions: Vec<TestAssertion>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ProtocolOverride {
    pub kind: Option<ProtocolKind>,
    pub window_size: Option<usize>,
    pub modulus: Option<usize>,
    pub timeout_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
    pub linger_ms: Option<u64>,
}

impl ProtocolOverride {
    pub fn apply_to(&self, config: &mut ProtocolConfig) {
        if let Some(v) = self.kind {
            config.kind = v;
        }
        if let Some(v) = self.window_size {
            config.window_size = v;
        }
        if let Some(v) = self.modulus {
            config.modulus = v;
        }
        if let Some(v) = self.timeout_ms {
            config.timeout_ms = v;
        }
        if let Some(v) = self.poll_interval_ms {
            config.poll_interval_ms = v;
        }
        if let Some(v) = self.linger_ms {
            config.linger_ms = v;
        }
    }
}

/// Loss applied to the sending endpoint. The receiving end stays lossless
/// unless `receiver` is given.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct LossOverride {
    pub send_data: Option<f64>,
    pub send_ack: Option<f64>,
    pub recv_data: Option<f64>,
    pub recv_ack: Option<f64>,
    pub seed: Option<u64>,
    pub receiver: Option<LossConfig>,
}

impl LossOverride {
    pub fn apply_to(&self, config: &mut LossConfig) {
        if let Some(v) = self.send_data {
            config.send_data = v;
        }
        if let Some(v) = self.send_ack {
            config.send_ack = v;
        }
        if let Some(v) = self.recv_data {
            config.recv_data = v;
        }
        if let Some(v) = self.recv_ack {
            config.recv_ack = v;
        }
        if let Some(v) = self.seed {
            config.seed = Some(v);
        }
    }
}

/// Bytes handed to the sender.
#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputSpec {
    Text { text: String },
    /// `size` bytes of a repeating non-trivial pattern
    Pattern { size: usize },
}

impl InputSpec {
    pub fn materialize(&self) -> Vec<u8> {
        match self {
            InputSpec::Text { text } => text.as_bytes().to_vec(),
            InputSpec::Pattern { size } => (0..*size).map(|i| (i % 251) as u8).collect(),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestAction {
    /// Drop the first data frame the sender puts on the wire with this number
    DropNextData { seq: u8 },
    /// Drop the first ack the receiver puts on the wire with this number
    DropNextAck { ack: u8 },
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestAssertion {
    /// Receiver output is byte-identical to the input
    OutputMatchesInput,
    /// Data frames put on the wire by the sender, retransmissions included
    DataFramesSent { min: u64, max: Option<u64> },
    /// Acks the sender read off the wire
    AcksReceived { min: u64, max: Option<u64> },
    Completed { expected: bool },
    MaxDuration { ms: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_only_touch_given_fields() {
        let over = ProtocolOverride {
            kind: Some(ProtocolKind::SelectiveRepeat),
            timeout_ms: Some(50),
            ..Default::default()
        };
        let mut config = ProtocolConfig::default();
        over.apply_to(&mut config);
        assert_eq!(config.kind, ProtocolKind::SelectiveRepeat);
        assert_eq!(config.timeout_ms, 50);
        assert_eq!(config.window_size, 4);
        assert_eq!(config.modulus, 8);

        let loss = LossOverride {
            send_data: Some(0.25),
            seed: Some(9),
            ..Default::default()
        };
        let mut config = LossConfig::default();
        loss.apply_to(&mut config);
        assert_eq!(config.send_data, 0.25);
        assert_eq!(config.recv_ack, 0.0);
        assert_eq!(config.seed, Some(9));
    }

    #[test]
    fn pattern_input_has_requested_size() {
        let data = InputSpec::Pattern { size: 3000 }.materialize();
        assert_eq!(data.len(), 3000);
        assert_eq!(data[251], 0);
        assert_eq!(data[252], 1);
        assert_eq!(
            InputSpec::Text {
                text: "abc".into()
            }
            .materialize(),
            b"abc"
        );
    }
}
