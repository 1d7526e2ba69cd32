use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Exit reasons longer than this are truncated before use.
pub const MAX_EXIT_REASON_CHARS: usize = 64;

/// Trade direction.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "long",
            Direction::Short => "short",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Limit,
    Market,
}

/// Order validity policy.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    /// Good-til-cancelled.
    Gtc,
    /// Fill-or-kill.
    Fok,
    /// Immediate-or-cancel.
    Ioc,
    /// Post-only.
    Po,
}

/// Which leg of the trade an order belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Entry,
    Exit,
}

/// Profit ratio of a position opened at `open_rate` and marked at `current_rate`.
///
/// Long: `current / open - 1`. Short: `1 - current / open`.
pub fn profit_ratio(direction: Direction, open_rate: f64, current_rate: f64) -> f64 {
    debug_assert!(open_rate > 0.0);
    match direction {
        Direction::Long => current_rate / open_rate - 1.0,
        Direction::Short => 1.0 - current_rate / open_rate,
    }
}

// ---------------------------------------------------------------------------
// Extension slot
// ---------------------------------------------------------------------------

/// Open-ended keyword arguments carried by every hook request.
///
/// The engine may attach values here before they graduate to typed request
/// fields. Hooks must ignore keys they do not understand.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HookArgs(BTreeMap<String, Value>);

impl HookArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Stake proposal
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Error)]
pub enum ProposalError {
    #[error("stake proposal contains a non-finite value")]
    NotFinite,
    #[error("stake bounds inverted: min {min} > max {max}")]
    InvertedBounds { min: f64, max: f64 },
    #[error("proposed stake {proposed} outside [{min}, {max}]")]
    OutOfBounds { proposed: f64, min: f64, max: f64 },
}

/// Engine-proposed stake with the bounds the final stake must respect.
///
/// Invariant: `min <= proposed <= max`, all finite.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StakeProposal {
    pub proposed: f64,
    pub min: f64,
    pub max: f64,
}

impl StakeProposal {
    pub fn new(proposed: f64, min: f64, max: f64) -> Result<Self, ProposalError> {
        if !(proposed.is_finite() && min.is_finite() && max.is_finite()) {
            return Err(ProposalError::NotFinite);
        }
        if min > max {
            return Err(ProposalError::InvertedBounds { min, max });
        }
        if proposed < min || proposed > max {
            return Err(ProposalError::OutOfBounds { proposed, min, max });
        }
        Ok(Self { proposed, min, max })
    }
}

// ---------------------------------------------------------------------------
// Trade / order snapshots
// ---------------------------------------------------------------------------

/// The engine's record of a trade once its entry order has been placed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub trade_id: String,
    pub pair: String,
    pub direction: Direction,
    pub open_rate: f64,
    pub amount: f64,
    pub stake_amount: f64,
    pub open_date: DateTime<Utc>,
    /// Stoploss ratio currently applied to the trade (negative = loss).
    pub stoploss: f64,
}

/// Snapshot of an unfilled (or partially filled) order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderContext {
    pub order_id: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    pub amount: f64,
    #[serde(default)]
    pub filled: f64,
    pub rate: f64,
    pub placed_at: DateTime<Utc>,
    /// Raw venue payload, passed through untouched.
    #[serde(default)]
    pub raw: Value,
}

impl OrderContext {
    pub fn remaining(&self) -> f64 {
        (self.amount - self.filled).max(0.0)
    }

    pub fn is_partially_filled(&self) -> bool {
        self.filled > 0.0 && self.filled < self.amount
    }
}

/// View of an open trade at one engine tick.
#[derive(Clone, Debug, PartialEq)]
pub struct TradeContext {
    pub pair: String,
    pub direction: Direction,
    pub trade: TradeRecord,
    pub now: DateTime<Utc>,
    pub current_rate: f64,
    pub current_profit: f64,
    pub open_order: Option<OrderContext>,
}

impl TradeContext {
    pub fn entry_rate(&self) -> f64 {
        self.trade.open_rate
    }
}

// ---------------------------------------------------------------------------
// Exit decisions
// ---------------------------------------------------------------------------

/// What `exit_signal` answered.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitDecision {
    NoExit,
    ExitWithReason(String),
    /// Exit without a specific reason.
    ExitGeneric,
}

impl ExitDecision {
    pub fn is_exit(&self) -> bool {
        !matches!(self, ExitDecision::NoExit)
    }
}

/// Why the driver is attempting to exit a trade.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum ExitReason {
    StopLoss,
    Roi,
    ExitSignal,
    CustomExit(String),
}

impl ExitReason {
    pub const GENERIC_CUSTOM: &'static str = "custom_exit";

    pub fn as_str(&self) -> &str {
        match self {
            ExitReason::StopLoss => "stop_loss",
            ExitReason::Roi => "roi",
            ExitReason::ExitSignal => "exit_signal",
            ExitReason::CustomExit(reason) => reason,
        }
    }

    /// Map a (normalized) hook decision to an exit reason.
    pub fn from_decision(decision: ExitDecision) -> Option<Self> {
        match decision {
            ExitDecision::NoExit => None,
            ExitDecision::ExitWithReason(reason) => Some(ExitReason::CustomExit(reason)),
            ExitDecision::ExitGeneric => {
                Some(ExitReason::CustomExit(Self::GENERIC_CUSTOM.to_string()))
            }
        }
    }
}

impl From<ExitReason> for String {
    fn from(r: ExitReason) -> Self {
        r.as_str().to_string()
    }
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Hook requests
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub struct LoopStartRequest {
    pub iteration: u64,
    pub now: DateTime<Utc>,
    pub extra: HookArgs,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StakeRequest {
    pub pair: String,
    pub now: DateTime<Utc>,
    pub current_rate: f64,
    pub proposal: StakeProposal,
    pub side: Direction,
    pub extra: HookArgs,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StoplossRequest {
    pub ctx: TradeContext,
    /// The strategy's static stoploss; the hook default.
    pub base_stoploss: f64,
    pub extra: HookArgs,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExitSignalRequest {
    pub ctx: TradeContext,
    pub extra: HookArgs,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EntryConfirmation {
    pub pair: String,
    pub order_type: OrderType,
    pub amount: f64,
    pub rate: f64,
    pub time_in_force: TimeInForce,
    pub now: DateTime<Utc>,
    pub side: Direction,
    /// Stake after clamping; `amount * rate`.
    pub stake: f64,
    pub extra: HookArgs,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExitConfirmation {
    pub pair: String,
    pub trade: TradeRecord,
    pub order_type: OrderType,
    pub amount: f64,
    pub rate: f64,
    pub time_in_force: TimeInForce,
    pub exit_reason: String,
    pub now: DateTime<Utc>,
    pub extra: HookArgs,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrderTimeoutRequest {
    pub pair: String,
    pub trade: TradeRecord,
    pub order: OrderContext,
    pub now: DateTime<Utc>,
    pub extra: HookArgs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proposal_accepts_ordered_bounds() {
        let p = StakeProposal::new(100.0, 50.0, 500.0).unwrap();
        assert_eq!(p.proposed, 100.0);
    }

    #[test]
    fn proposal_rejects_out_of_bounds_and_nan() {
        assert!(matches!(
            StakeProposal::new(600.0, 50.0, 500.0),
            Err(ProposalError::OutOfBounds { .. })
        ));
        assert!(matches!(
            StakeProposal::new(100.0, 500.0, 50.0),
            Err(ProposalError::InvertedBounds { .. })
        ));
        assert_eq!(
            StakeProposal::new(f64::NAN, 50.0, 500.0),
            Err(ProposalError::NotFinite)
        );
    }

    #[test]
    fn profit_ratio_is_direction_aware() {
        assert!((profit_ratio(Direction::Long, 100.0, 110.0) - 0.10).abs() < 1e-12);
        assert!((profit_ratio(Direction::Short, 100.0, 110.0) + 0.10).abs() < 1e-12);
    }

    #[test]
    fn exit_reason_rendering() {
        assert_eq!(ExitReason::StopLoss.as_str(), "stop_loss");
        assert_eq!(
            ExitReason::from_decision(ExitDecision::ExitGeneric),
            Some(ExitReason::CustomExit("custom_exit".into()))
        );
        assert_eq!(ExitReason::from_decision(ExitDecision::NoExit), None);
        let json = serde_json::to_string(&ExitReason::Roi).unwrap();
        assert_eq!(json, "\"roi\"");
    }

    #[test]
    fn order_remaining_never_negative() {
        let o = OrderContext {
            order_id: "o1".into(),
            side: OrderSide::Entry,
            order_type: OrderType::Limit,
            time_in_force: TimeInForce::Gtc,
            amount: 1.0,
            filled: 1.5,
            rate: 10.0,
            placed_at: Utc::now(),
            raw: Value::Null,
        };
        assert_eq!(o.remaining(), 0.0);
        assert!(!o.is_partially_filled());
    }
}
