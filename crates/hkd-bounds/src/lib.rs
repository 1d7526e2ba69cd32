//! hkd-bounds
//!
//! Bounds validation for hook return values.
//!
//! Goals:
//! - Stake returns clamped into the proposal bounds
//! - Custom stoplosses may only tighten the strategy's hard stoploss
//! - Exit decisions normalized (reason length, blank reasons, foreign JSON types)
//!
//! Deterministic, pure logic. No IO, no logging. A malformed value always
//! degrades to a safe value; the correction is reported as an [`Anomaly`] so
//! the caller can log it.

mod types;
mod validate;

pub use types::*;
pub use validate::*;
