use hkd_hooks::{Direction, ExitReason, OrderSide, OrderType, TimeInForce};
use serde::Serialize;
use uuid::Uuid;

/// Order the engine should place on behalf of a trade.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OrderRequest {
    /// Fresh per placement; never reused across retries.
    pub client_order_id: String,
    pub trade_id: String,
    pub pair: String,
    pub side: OrderSide,
    pub direction: Direction,
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    pub amount: f64,
    pub rate: f64,
    pub stake: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_reason: Option<ExitReason>,
}

pub(crate) fn new_client_order_id() -> String {
    Uuid::new_v4().to_string()
}

/// What the engine should do after a lifecycle transition point.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Instruction {
    /// Place the enclosed order.
    Proceed(OrderRequest),
    /// Drop the proposed entry; nothing was placed.
    Abort,
    /// Cancel the open order.
    Cancel,
    /// Apply this stoploss ratio to the trade.
    Adjust(f64),
    /// Nothing to do this tick.
    Hold,
}

impl Instruction {
    pub fn kind(&self) -> &'static str {
        match self {
            Instruction::Proceed(_) => "proceed",
            Instruction::Abort => "abort",
            Instruction::Cancel => "cancel",
            Instruction::Adjust(_) => "adjust",
            Instruction::Hold => "hold",
        }
    }

    pub fn order(&self) -> Option<&OrderRequest> {
        match self {
            Instruction::Proceed(o) => Some(o),
            _ => None,
        }
    }
}
