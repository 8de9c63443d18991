use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rdt_abstract::{ConfigError, LossConfig};

/// The four directions a frame can be dropped in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossChannel {
    SendData,
    SendAck,
    RecvData,
    RecvAck,
}

/// Independent Bernoulli drop decisions per logical channel.
///
/// Starts enabled. Command traffic runs with the simulator disabled, in which
/// case nothing is ever dropped.
#[derive(Debug)]
pub struct LossSimulator {
    config: LossConfig,
    rng: StdRng,
    enabled: bool,
}

impl LossSimulator {
    pub fn new(config: LossConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let rng = Self::rng_for(&config);
        Ok(Self {
            config,
            rng,
            enabled: true,
        })
    }

    pub fn lossless() -> Self {
        Self {
            config: LossConfig::lossless(),
            rng: StdRng::seed_from_u64(0),
            enabled: true,
        }
    }

    fn rng_for(config: &LossConfig) -> StdRng {
        match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }

    pub fn config(&self) -> &LossConfig {
        &self.config
    }

    /// Replace the probabilities. A configured seed restarts the sequence.
    pub fn set_config(&mut self, config: LossConfig) -> Result<(), ConfigError> {
        config.validate()?;
        if config.seed.is_some() {
            self.rng = Self::rng_for(&config);
        }
        self.config = config;
        Ok(())
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn probability(&self, channel: LossChannel) -> f64 {
        match channel {
            LossChannel::SendData => self.config.send_data,
            LossChannel::SendAck => self.config.send_ack,
            LossChannel::RecvData => self.config.recv_data,
            LossChannel::RecvAck => self.config.recv_ack,
        }
    }

    pub fn should_drop(&mut self, channel: LossChannel) -> bool {
        if !self.enabled {
            return false;
        }
        let p = self.probability(channel);
        p > 0.0 && self.rng.random::<f64>() < p
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(send_data: f64) -> LossSimulator {
        LossSimulator::new(LossConfig {
            send_data,
            seed: Some(42),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn certain_and_impossible_loss() {
        let mut loss = seeded(1.0);
        assert!((0..100).all(|_| loss.should_drop(LossChannel::SendData)));
        assert!((0..100).all(|_| !loss.should_drop(LossChannel::SendAck)));
    }

    #[test]
    fn disabled_simulator_never_drops() {
        let mut loss = seeded(1.0);
        loss.disable();
        assert!(!loss.is_enabled());
        assert!(!loss.should_drop(LossChannel::SendData));
        loss.enable();
        assert!(loss.should_drop(LossChannel::SendData));
    }

    #[test]
    fn same_seed_same_pattern() {
        let mut a = seeded(0.5);
        let mut b = seeded(0.5);
        let pa: Vec<bool> = (0..64).map(|_| a.should_drop(LossChannel::SendData)).collect();
        let pb: Vec<bool> = (0..64).map(|_| b.should_drop(LossChannel::SendData)).collect();
        assert_eq!(pa, pb);
        assert!(pa.iter().any(|d| *d) && pa.iter().any(|d| !*d));
    }

    #[test]
    fn rejects_bad_probability() {
        let bad = LossConfig {
            recv_data: -0.1,
            ..Default::default()
        };
        assert!(LossSimulator::new(bad.clone()).is_err());
        let mut loss = LossSimulator::lossless();
        assert!(loss.set_config(bad).is_err());
        assert_eq!(loss.config(), &LossConfig::lossless());
    }
}
