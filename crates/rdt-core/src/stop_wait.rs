//! Stop-and-wait: go-back-n with at most one block outstanding.

use rdt_abstract::{ConfigError, ProtocolConfig};

use crate::gbn::{GoBackNReceiver, GoBackNSender};

pub type StopAndWaitSender = GoBackNSender;
pub type StopAndWaitReceiver = GoBackNReceiver;

pub fn sender(modulus: usize) -> Result<StopAndWaitSender, ConfigError> {
    GoBackNSender::new(&ProtocolConfig::stop_and_wait(modulus))
}

pub fn receiver(modulus: usize) -> Result<StopAndWaitReceiver, ConfigError> {
    GoBackNReceiver::new(&ProtocolConfig::stop_and_wait(modulus))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_is_one() {
        assert_eq!(sender(2).unwrap().window(), 1);
        assert!(receiver(2).is_ok());
        assert!(sender(1).is_err());
    }
}
