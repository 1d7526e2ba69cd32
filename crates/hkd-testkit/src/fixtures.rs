use chrono::{DateTime, Duration, TimeZone, Utc};
use hkd_hooks::{OrderContext, OrderSide, OrderType, StakeProposal, TimeInForce};
use serde_json::Value;

/// Fixed origin for deterministic clocks in tests and replays.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// `t0() + secs`.
pub fn ts(secs: i64) -> DateTime<Utc> {
    t0() + Duration::seconds(secs)
}

pub fn proposal(proposed: f64, min: f64, max: f64) -> anyhow::Result<StakeProposal> {
    Ok(StakeProposal::new(proposed, min, max)?)
}

/// Limit/GTC order snapshot with nothing filled.
pub fn unfilled_order(
    order_id: &str,
    side: OrderSide,
    amount: f64,
    rate: f64,
    placed_at: DateTime<Utc>,
) -> OrderContext {
    OrderContext {
        order_id: order_id.to_string(),
        side,
        order_type: OrderType::Limit,
        time_in_force: TimeInForce::Gtc,
        amount,
        filled: 0.0,
        rate,
        placed_at,
        raw: Value::Null,
    }
}
