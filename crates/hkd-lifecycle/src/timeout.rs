use chrono::{DateTime, Duration, Utc};

/// Gate in front of the `*_timeout_exceeded` hooks.
///
/// The hooks are only consulted once an order has been unfilled for at least
/// the engine's base timeout. How often the gate is polled is up to the engine.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TimeoutGate {
    base: Duration,
}

impl TimeoutGate {
    pub fn new(base: Duration) -> Self {
        Self { base }
    }

    pub fn from_secs(secs: u64) -> Self {
        Self::new(Duration::seconds(secs.min(i64::MAX as u64) as i64))
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn should_consult(&self, placed_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(placed_at) >= self.base
    }
}
