use thiserror::Error;

use crate::TransitionError;

/// Driver API misuse. Hook misbehaviour is never surfaced here; it is
/// corrected or defaulted and logged.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("stale iteration token: host is at iteration {expected}, token is from {got}")]
    StaleIteration { expected: u64, got: u64 },

    #[error("invalid stoploss {0}: must be finite and in [-1, 0)")]
    InvalidStoploss(f64),

    #[error("invalid rate: {0}")]
    InvalidRate(f64),

    #[error("invalid fill: amount {amount} at rate {rate}")]
    InvalidFill { amount: f64, rate: f64 },

    #[error("trade {0} has no trade record")]
    MissingTrade(String),
}
