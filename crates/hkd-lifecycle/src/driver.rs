use std::sync::Arc;

use chrono::{DateTime, Utc};
use hkd_bounds::{bound_stake, normalize_exit_decision, ratchet_stoploss, reconcile_stoploss, Anomaly};
use hkd_hooks::{
    profit_ratio, Direction, EntryConfirmation, ExitConfirmation, ExitDecision, ExitReason,
    ExitSignalRequest, HookArgs, HookKind, OrderContext, OrderSide, OrderTimeoutRequest,
    OrderType, StakeProposal, StakeRequest, StoplossRequest, TimeInForce, TradeContext,
    TradeRecord,
};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::guard::{call_hook, confirm_with_budget};
use crate::instruction::new_client_order_id;
use crate::{
    Instruction, IterationToken, LifecycleError, LifecycleEvent, LifecycleState, OrderRequest,
    StrategyHost,
};

/// Engine input for [`TradeLifecycle::propose_entry`].
#[derive(Clone, Debug, PartialEq)]
pub struct EntryProposal {
    pub rate: f64,
    pub proposal: StakeProposal,
    pub extra: HookArgs,
}

impl EntryProposal {
    pub fn new(rate: f64, proposal: StakeProposal) -> Self {
        Self {
            rate,
            proposal,
            extra: HookArgs::new(),
        }
    }
}

/// Engine input for one tick of an open trade.
#[derive(Clone, Debug, PartialEq)]
pub struct OpenTick {
    pub current_rate: f64,
    /// ROI table says take profit.
    pub roi_reached: bool,
    /// Signal collaborator says exit.
    pub signal_exit: bool,
    pub extra: HookArgs,
}

impl OpenTick {
    pub fn at_rate(current_rate: f64) -> Self {
        Self {
            current_rate,
            roi_reached: false,
            signal_exit: false,
            extra: HookArgs::new(),
        }
    }

    pub fn with_roi(mut self, reached: bool) -> Self {
        self.roi_reached = reached;
        self
    }

    pub fn with_signal_exit(mut self, exit: bool) -> Self {
        self.signal_exit = exit;
        self
    }
}

/// One trade walking `Proposed → … → Closed | Aborted`.
///
/// Every transition takes `&mut self`: evaluations of the same trade are
/// serialized by the borrow checker. Hooks run only inside transitions that
/// hold a current [`IterationToken`].
#[derive(Clone, Debug, PartialEq)]
pub struct TradeLifecycle {
    trade_id: String,
    pair: String,
    direction: Direction,
    state: LifecycleState,
    trade: Option<TradeRecord>,
    open_order: Option<OrderContext>,
    exit_reason: Option<ExitReason>,
    close_rate: Option<f64>,
}

impl TradeLifecycle {
    pub fn new(trade_id: impl Into<String>, pair: impl Into<String>, direction: Direction) -> Self {
        Self {
            trade_id: trade_id.into(),
            pair: pair.into(),
            direction,
            state: LifecycleState::Proposed,
            trade: None,
            open_order: None,
            exit_reason: None,
            close_rate: None,
        }
    }

    pub fn trade_id(&self) -> &str {
        &self.trade_id
    }

    pub fn pair(&self) -> &str {
        &self.pair
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn trade(&self) -> Option<&TradeRecord> {
        self.trade.as_ref()
    }

    pub fn open_order(&self) -> Option<&OrderContext> {
        self.open_order.as_ref()
    }

    pub fn exit_reason(&self) -> Option<&ExitReason> {
        self.exit_reason.as_ref()
    }

    /// Stoploss currently applied to the trade.
    pub fn stoploss(&self) -> Option<f64> {
        self.trade.as_ref().map(|t| t.stoploss)
    }

    /// Realized profit ratio once closed.
    pub fn close_profit(&self) -> Option<f64> {
        let trade = self.trade.as_ref()?;
        self.close_rate
            .map(|rate| profit_ratio(self.direction, trade.open_rate, rate))
    }

    // -----------------------------------------------------------------------
    // Entry
    // -----------------------------------------------------------------------

    /// `size_stake` → clamp → `confirm_entry`.
    pub async fn propose_entry(
        &mut self,
        host: &StrategyHost,
        token: &IterationToken,
        entry: EntryProposal,
    ) -> Result<Instruction, LifecycleError> {
        host.check_token(token)?;
        self.state.apply(LifecycleEvent::EntryPlaced)?;
        ensure_rate(entry.rate)?;

        let settings = host.settings();
        let hooks = host.hooks();
        let now = token.now();

        let stake_req = StakeRequest {
            pair: self.pair.clone(),
            now,
            current_rate: entry.rate,
            proposal: entry.proposal,
            side: self.direction,
            extra: entry.extra.clone(),
        };
        let returned = call_hook(HookKind::SizeStake, &self.pair, entry.proposal.proposed, || {
            hooks.size_stake(&stake_req)
        });
        let bounded = bound_stake(returned, &entry.proposal);
        self.log_anomaly(HookKind::SizeStake, bounded.anomaly.as_ref());
        let stake = bounded.value;
        let amount = stake / entry.rate;

        let confirmation = EntryConfirmation {
            pair: self.pair.clone(),
            order_type: settings.entry_order_type,
            amount,
            rate: entry.rate,
            time_in_force: settings.time_in_force,
            now,
            side: self.direction,
            stake,
            extra: entry.extra,
        };
        let confirmed = confirm_with_budget(
            Arc::clone(hooks),
            HookKind::ConfirmEntry,
            &self.pair,
            settings.confirm_budget,
            confirmation,
            |h, req| h.confirm_entry(req),
        )
        .await;

        if !confirmed {
            self.transition(LifecycleEvent::EntryDenied)?;
            info!(trade_id = %self.trade_id, pair = %self.pair, "entry/denied");
            return Ok(Instruction::Abort);
        }

        let order = self.order_request(
            OrderSide::Entry,
            settings.entry_order_type,
            settings.time_in_force,
            amount,
            entry.rate,
            None,
        );
        self.trade = Some(TradeRecord {
            trade_id: self.trade_id.clone(),
            pair: self.pair.clone(),
            direction: self.direction,
            open_rate: entry.rate,
            amount,
            stake_amount: stake,
            open_date: now,
            stoploss: settings.stoploss,
        });
        self.open_order = Some(order_context(&order, now));
        self.transition(LifecycleEvent::EntryPlaced)?;
        Ok(Instruction::Proceed(order))
    }

    /// Poll an unfilled entry order with the engine's latest snapshot of it.
    ///
    /// A snapshot that is already fully filled opens the trade instead; there
    /// is nothing left to cancel.
    pub fn poll_entry_order(
        &mut self,
        host: &StrategyHost,
        token: &IterationToken,
        order: OrderContext,
    ) -> Result<Instruction, LifecycleError> {
        host.check_token(token)?;
        self.state.apply(LifecycleEvent::EntryCancelled)?;
        let trade = self.require_trade()?.clone();
        let now = token.now();
        if is_fully_filled(&order) {
            self.on_entry_filled(order.amount, order.rate)?;
            return Ok(Instruction::Hold);
        }
        self.open_order = Some(order.clone());

        if !host.settings().entry_timeout.should_consult(order.placed_at, now) {
            return Ok(Instruction::Hold);
        }

        let req = OrderTimeoutRequest {
            pair: self.pair.clone(),
            trade,
            order: order.clone(),
            now,
            extra: HookArgs::new(),
        };
        let hooks = host.hooks();
        let cancel = call_hook(HookKind::EntryTimeout, &self.pair, false, || {
            hooks.entry_timeout_exceeded(&req)
        });
        if !cancel {
            return Ok(Instruction::Hold);
        }

        if order.filled > 0.0 {
            let filled = order.filled.min(order.amount);
            if let Some(t) = self.trade.as_mut() {
                t.amount = filled;
                t.stake_amount = filled * t.open_rate;
            }
            self.transition(LifecycleEvent::EntryCancelledPartial)?;
            info!(trade_id = %self.trade_id, pair = %self.pair, filled, "entry/cancelled_partial");
        } else {
            self.transition(LifecycleEvent::EntryCancelled)?;
            info!(trade_id = %self.trade_id, pair = %self.pair, "entry/cancelled");
        }
        self.open_order = None;
        Ok(Instruction::Cancel)
    }

    /// Entry order fully filled.
    pub fn on_entry_filled(&mut self, amount: f64, rate: f64) -> Result<(), LifecycleError> {
        ensure_fill(amount, rate)?;
        self.state.apply(LifecycleEvent::EntryFilled)?;
        let trade = self
            .trade
            .as_mut()
            .ok_or_else(|| LifecycleError::MissingTrade(self.trade_id.clone()))?;
        trade.amount = amount;
        trade.open_rate = rate;
        trade.stake_amount = amount * rate;
        self.open_order = None;
        self.transition(LifecycleEvent::EntryFilled)
    }

    // -----------------------------------------------------------------------
    // Open trade
    // -----------------------------------------------------------------------

    /// One tick of an open trade.
    ///
    /// Exit triggers are checked in order: stoploss, ROI, signal flag, then
    /// the `exit_signal` hook. The hook is only consulted when nothing before
    /// it fired.
    pub async fn evaluate_open(
        &mut self,
        host: &StrategyHost,
        token: &IterationToken,
        tick: OpenTick,
    ) -> Result<Instruction, LifecycleError> {
        host.check_token(token)?;
        self.state.apply(LifecycleEvent::ExitPlaced)?;
        ensure_rate(tick.current_rate)?;

        let settings = host.settings();
        let hooks = host.hooks();
        let now = token.now();
        let trade = self.require_trade()?.clone();
        let profit = profit_ratio(self.direction, trade.open_rate, tick.current_rate);
        let ctx = TradeContext {
            pair: self.pair.clone(),
            direction: self.direction,
            trade: trade.clone(),
            now,
            current_rate: tick.current_rate,
            current_profit: profit,
            open_order: None,
        };

        let previous = trade.stoploss;
        let effective = if settings.use_custom_stoploss {
            let req = StoplossRequest {
                ctx: ctx.clone(),
                base_stoploss: settings.stoploss,
                extra: tick.extra.clone(),
            };
            let returned = call_hook(HookKind::StoplossDistance, &self.pair, settings.stoploss, || {
                hooks.stoploss_distance(&req)
            });
            let bounded = reconcile_stoploss(returned, settings.stoploss);
            self.log_anomaly(HookKind::StoplossDistance, bounded.anomaly.as_ref());
            ratchet_stoploss(previous, bounded.value)
        } else {
            previous
        };
        let stoploss_moved = effective != previous;
        if let Some(t) = self.trade.as_mut() {
            t.stoploss = effective;
        }

        let trigger = if profit <= effective {
            Some(ExitReason::StopLoss)
        } else if tick.roi_reached {
            Some(ExitReason::Roi)
        } else if tick.signal_exit {
            Some(ExitReason::ExitSignal)
        } else {
            let req = ExitSignalRequest {
                ctx,
                extra: tick.extra.clone(),
            };
            let decision = call_hook(HookKind::ExitSignal, &self.pair, ExitDecision::NoExit, || {
                hooks.exit_signal(&req)
            });
            let bounded = normalize_exit_decision(decision);
            self.log_anomaly(HookKind::ExitSignal, bounded.anomaly.as_ref());
            ExitReason::from_decision(bounded.value)
        };

        let Some(reason) = trigger else {
            return Ok(if stoploss_moved {
                Instruction::Adjust(effective)
            } else {
                Instruction::Hold
            });
        };

        let amount = trade.amount;
        let confirmation = ExitConfirmation {
            pair: self.pair.clone(),
            trade: self.require_trade()?.clone(),
            order_type: settings.exit_order_type,
            amount,
            rate: tick.current_rate,
            time_in_force: settings.time_in_force,
            exit_reason: reason.to_string(),
            now,
            extra: tick.extra,
        };
        let confirmed = confirm_with_budget(
            Arc::clone(hooks),
            HookKind::ConfirmExit,
            &self.pair,
            settings.confirm_budget,
            confirmation,
            |h, req| h.confirm_exit(req),
        )
        .await;

        if !confirmed {
            info!(
                trade_id = %self.trade_id,
                pair = %self.pair,
                reason = %reason,
                "exit/denied; re-evaluated next tick"
            );
            return Ok(Instruction::Adjust(effective));
        }

        let order = self.order_request(
            OrderSide::Exit,
            settings.exit_order_type,
            settings.time_in_force,
            amount,
            tick.current_rate,
            Some(reason.clone()),
        );
        self.open_order = Some(order_context(&order, now));
        self.exit_reason = Some(reason);
        self.transition(LifecycleEvent::ExitPlaced)?;
        Ok(Instruction::Proceed(order))
    }

    // -----------------------------------------------------------------------
    // Exit
    // -----------------------------------------------------------------------

    /// Poll an unfilled exit order. A cancel returns the trade to `Open`; a
    /// snapshot that is already fully filled closes it.
    pub fn poll_exit_order(
        &mut self,
        host: &StrategyHost,
        token: &IterationToken,
        order: OrderContext,
    ) -> Result<Instruction, LifecycleError> {
        host.check_token(token)?;
        self.state.apply(LifecycleEvent::ExitCancelled)?;
        let trade = self.require_trade()?.clone();
        let now = token.now();
        if is_fully_filled(&order) {
            self.on_exit_filled(order.rate)?;
            return Ok(Instruction::Hold);
        }
        self.open_order = Some(order.clone());

        if !host.settings().exit_timeout.should_consult(order.placed_at, now) {
            return Ok(Instruction::Hold);
        }

        let req = OrderTimeoutRequest {
            pair: self.pair.clone(),
            trade,
            order: order.clone(),
            now,
            extra: HookArgs::new(),
        };
        let hooks = host.hooks();
        let cancel = call_hook(HookKind::ExitTimeout, &self.pair, false, || {
            hooks.exit_timeout_exceeded(&req)
        });
        if !cancel {
            return Ok(Instruction::Hold);
        }

        if order.filled > 0.0 {
            if let Some(t) = self.trade.as_mut() {
                t.amount = (t.amount - order.filled).max(0.0);
                t.stake_amount = t.amount * t.open_rate;
            }
        }
        self.transition(LifecycleEvent::ExitCancelled)?;
        info!(trade_id = %self.trade_id, pair = %self.pair, filled = order.filled, "exit/cancelled");
        self.open_order = None;
        self.exit_reason = None;
        Ok(Instruction::Cancel)
    }

    /// Exit order fully filled at `rate`. Terminal.
    pub fn on_exit_filled(&mut self, rate: f64) -> Result<(), LifecycleError> {
        ensure_rate(rate)?;
        self.transition(LifecycleEvent::ExitFilled)?;
        self.close_rate = Some(rate);
        self.open_order = None;
        info!(
            trade_id = %self.trade_id,
            pair = %self.pair,
            reason = self.exit_reason.as_ref().map(ExitReason::as_str).unwrap_or("-"),
            "trade/closed"
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // internals
    // -----------------------------------------------------------------------

    fn transition(&mut self, event: LifecycleEvent) -> Result<(), LifecycleError> {
        let next = self.state.apply(event)?;
        debug!(
            trade_id = %self.trade_id,
            pair = %self.pair,
            from = %self.state,
            state = %next,
            ?event,
            "lifecycle/transition"
        );
        self.state = next;
        Ok(())
    }

    fn require_trade(&self) -> Result<&TradeRecord, LifecycleError> {
        self.trade
            .as_ref()
            .ok_or_else(|| LifecycleError::MissingTrade(self.trade_id.clone()))
    }

    fn order_request(
        &self,
        side: OrderSide,
        order_type: OrderType,
        time_in_force: TimeInForce,
        amount: f64,
        rate: f64,
        exit_reason: Option<ExitReason>,
    ) -> OrderRequest {
        OrderRequest {
            client_order_id: new_client_order_id(),
            trade_id: self.trade_id.clone(),
            pair: self.pair.clone(),
            side,
            direction: self.direction,
            order_type,
            time_in_force,
            amount,
            rate,
            stake: amount * rate,
            exit_reason,
        }
    }

    fn log_anomaly(&self, hook: HookKind, anomaly: Option<&Anomaly>) {
        if let Some(a) = anomaly {
            warn!(
                trade_id = %self.trade_id,
                pair = %self.pair,
                hook = %hook,
                code = %a.code,
                detail = %a,
                "hook/corrected"
            );
        }
    }
}

fn order_context(order: &OrderRequest, placed_at: DateTime<Utc>) -> OrderContext {
    OrderContext {
        order_id: order.client_order_id.clone(),
        side: order.side,
        order_type: order.order_type,
        time_in_force: order.time_in_force,
        amount: order.amount,
        filled: 0.0,
        rate: order.rate,
        placed_at,
        raw: Value::Null,
    }
}

fn is_fully_filled(order: &OrderContext) -> bool {
    order.amount > 0.0 && order.filled >= order.amount
}

fn ensure_rate(rate: f64) -> Result<(), LifecycleError> {
    if rate.is_finite() && rate > 0.0 {
        Ok(())
    } else {
        Err(LifecycleError::InvalidRate(rate))
    }
}

fn ensure_fill(amount: f64, rate: f64) -> Result<(), LifecycleError> {
    if amount.is_finite() && amount > 0.0 && rate.is_finite() && rate > 0.0 {
        Ok(())
    } else {
        Err(LifecycleError::InvalidFill { amount, rate })
    }
}
