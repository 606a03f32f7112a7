use std::time::Duration;

/// Delays of `base`, `2 * base`, `3 * base`, ... for `tokio_retry`.
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    base: Duration,
    step: u32,
}

impl LinearBackoff {
    pub fn new(base: Duration) -> Self {
        Self { base, step: 0 }
    }
}

impl Iterator for LinearBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        self.step = self.step.saturating_add(1);
        Some(self.base.saturating_mul(self.step))
    }
}
