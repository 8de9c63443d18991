use std::time::{Duration, Instant};

/// One-shot deadline, checked by polling.
#[derive(Debug, Clone, Copy, Default)]
pub struct Timer {
    deadline: Option<Instant>,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_timeout(&mut self, after: Duration) {
        self.deadline = Some(Instant::now() + after);
    }

    pub fn is_timeout(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    pub fn is_running(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn stop(&mut self) {
        self.deadline = None;
    }
}
