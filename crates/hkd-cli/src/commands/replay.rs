//! `hkd replay`: drive a scripted strategy through recorded trade events.
//!
//! Events are grouped by their `at` offset (seconds from the replay origin);
//! each distinct offset is one engine iteration. Within an iteration,
//! order events run first in script order, then every `tick` of that
//! iteration is evaluated concurrently.

use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use hkd_config::LifecycleConfig;
use hkd_hooks::{Direction, StakeProposal, StrategyHooks};
use hkd_lifecycle::{
    DriverSettings, EntryProposal, Instruction, LifecycleState, OpenTick, StrategyHost,
    TimeoutGate, TradeLifecycle,
};
use hkd_testkit::{ts, HookScript, ScriptedStrategy};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplayScript {
    #[serde(default)]
    pub hooks: HookScript,
    pub trades: Vec<TradeScript>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TradeScript {
    pub trade_id: String,
    pub pair: String,
    #[serde(default = "default_direction")]
    pub direction: Direction,
    pub events: Vec<TimedEvent>,
}

fn default_direction() -> Direction {
    Direction::Long
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimedEvent {
    /// Seconds from the replay origin.
    pub at: i64,
    #[serde(flatten)]
    pub event: ReplayEvent,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ReplayEvent {
    Propose {
        rate: f64,
        stake: f64,
        min_stake: f64,
        max_stake: f64,
    },
    /// Poll the open entry order; `filled` is the venue's fill so far.
    PollEntry {
        #[serde(default)]
        filled: f64,
    },
    /// Defaults to the placed amount and rate.
    EntryFilled {
        amount: Option<f64>,
        rate: Option<f64>,
    },
    Tick {
        rate: f64,
        #[serde(default)]
        roi: bool,
        #[serde(default)]
        signal_exit: bool,
    },
    PollExit {
        #[serde(default)]
        filled: f64,
    },
    ExitFilled {
        rate: Option<f64>,
    },
}

impl ReplayEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ReplayEvent::Propose { .. } => "propose",
            ReplayEvent::PollEntry { .. } => "poll_entry",
            ReplayEvent::EntryFilled { .. } => "entry_filled",
            ReplayEvent::Tick { .. } => "tick",
            ReplayEvent::PollExit { .. } => "poll_exit",
            ReplayEvent::ExitFilled { .. } => "exit_filled",
        }
    }
}

/// One output line.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayLine {
    pub at: i64,
    pub iteration: u64,
    pub trade_id: String,
    pub event: &'static str,
    pub state: LifecycleState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stoploss: Option<f64>,
    pub instruction: Option<Instruction>,
}

impl ReplayLine {
    fn new(
        at: i64,
        iteration: u64,
        lifecycle: &TradeLifecycle,
        event: &'static str,
        instruction: Option<Instruction>,
    ) -> Self {
        Self {
            at,
            iteration,
            trade_id: lifecycle.trade_id().to_string(),
            event,
            state: lifecycle.state(),
            stoploss: lifecycle.stoploss(),
            instruction,
        }
    }
}

pub fn load_replay_script(path: &str) -> Result<ReplayScript> {
    let s = fs::read_to_string(path).with_context(|| format!("read replay script: {path}"))?;
    let script: ReplayScript = serde_json::from_str(&s).context("parse replay script json")?;
    Ok(script)
}

/// Effective driver settings: the strategy's own declaration, overridden by config.
pub fn driver_settings(hooks: &dyn StrategyHooks, cfg: &LifecycleConfig) -> DriverSettings {
    let mut settings = DriverSettings::from_spec(&hooks.spec())
        .with_timeouts(
            TimeoutGate::from_secs(cfg.timeouts.entry_secs),
            TimeoutGate::from_secs(cfg.timeouts.exit_secs),
        )
        .with_confirm_budget(Duration::from_millis(cfg.timeouts.confirm_budget_ms));
    if let Some(sl) = cfg.strategy.stoploss {
        settings.stoploss = sl;
    }
    if let Some(enabled) = cfg.strategy.use_custom_stoploss {
        settings.use_custom_stoploss = enabled;
    }
    settings.entry_order_type = cfg.orders.entry_type;
    settings.exit_order_type = cfg.orders.exit_type;
    settings.time_in_force = cfg.orders.time_in_force;
    settings
}

pub async fn replay(cfg: &LifecycleConfig, script: ReplayScript) -> Result<Vec<ReplayLine>> {
    let mut hook_script = script.hooks.clone();
    if let Some(name) = &cfg.strategy.name {
        hook_script.name = name.clone();
    }
    let strategy = ScriptedStrategy::new(hook_script).context("build scripted strategy")?;
    let settings = driver_settings(&strategy, cfg);
    let mut host = StrategyHost::with_settings(Arc::new(strategy), settings)
        .context("build strategy host")?;

    let mut schedule: BTreeMap<i64, Vec<(usize, ReplayEvent)>> = BTreeMap::new();
    for (idx, trade) in script.trades.iter().enumerate() {
        for ev in &trade.events {
            schedule
                .entry(ev.at)
                .or_default()
                .push((idx, ev.event.clone()));
        }
    }

    let mut lifecycles: Vec<TradeLifecycle> = script
        .trades
        .iter()
        .map(|t| TradeLifecycle::new(t.trade_id.as_str(), t.pair.as_str(), t.direction))
        .collect();
    let mut lines = Vec::new();

    for (at, events) in schedule {
        let token = host.begin_iteration(ts(at));
        let mut ticks: BTreeMap<usize, OpenTick> = BTreeMap::new();

        for (idx, event) in events {
            let label = format!("trade {} event {} at {at}s", script.trades[idx].trade_id, event.name());
            let lc = &mut lifecycles[idx];
            let instruction = match &event {
                ReplayEvent::Propose {
                    rate,
                    stake,
                    min_stake,
                    max_stake,
                } => {
                    let proposal = StakeProposal::new(*stake, *min_stake, *max_stake)
                        .with_context(|| label.clone())?;
                    let ins = lc
                        .propose_entry(&host, &token, EntryProposal::new(*rate, proposal))
                        .await
                        .with_context(|| label.clone())?;
                    Some(ins)
                }
                ReplayEvent::PollEntry { filled } => {
                    let mut order = lc
                        .open_order()
                        .cloned()
                        .with_context(|| format!("{label}: no open entry order"))?;
                    order.filled = *filled;
                    Some(
                        lc.poll_entry_order(&host, &token, order)
                            .with_context(|| label.clone())?,
                    )
                }
                ReplayEvent::EntryFilled { amount, rate } => {
                    let order = lc
                        .open_order()
                        .cloned()
                        .with_context(|| format!("{label}: no open entry order"))?;
                    lc.on_entry_filled(amount.unwrap_or(order.amount), rate.unwrap_or(order.rate))
                        .with_context(|| label.clone())?;
                    None
                }
                ReplayEvent::Tick {
                    rate,
                    roi,
                    signal_exit,
                } => {
                    let tick = OpenTick::at_rate(*rate)
                        .with_roi(*roi)
                        .with_signal_exit(*signal_exit);
                    if ticks.insert(idx, tick).is_some() {
                        bail!("{label}: more than one tick for the trade in one iteration");
                    }
                    continue;
                }
                ReplayEvent::PollExit { filled } => {
                    let mut order = lc
                        .open_order()
                        .cloned()
                        .with_context(|| format!("{label}: no open exit order"))?;
                    order.filled = *filled;
                    Some(
                        lc.poll_exit_order(&host, &token, order)
                            .with_context(|| label.clone())?,
                    )
                }
                ReplayEvent::ExitFilled { rate } => {
                    let rate = rate
                        .or_else(|| lc.open_order().map(|o| o.rate))
                        .with_context(|| format!("{label}: no exit rate"))?;
                    lc.on_exit_filled(rate).with_context(|| label.clone())?;
                    None
                }
            };
            lines.push(ReplayLine::new(at, token.iteration(), lc, event.name(), instruction));
        }

        if ticks.is_empty() {
            continue;
        }
        let indices: Vec<usize> = ticks.keys().copied().collect();
        let batch = lifecycles
            .iter_mut()
            .enumerate()
            .filter_map(|(i, lc)| ticks.remove(&i).map(|tick| (lc, tick)));
        let results = host.evaluate_open_trades(&token, batch).await;
        for (idx, result) in indices.into_iter().zip(results) {
            let instruction = result.with_context(|| {
                format!("trade {} event tick at {at}s", script.trades[idx].trade_id)
            })?;
            lines.push(ReplayLine::new(
                at,
                token.iteration(),
                &lifecycles[idx],
                "tick",
                Some(instruction),
            ));
        }
    }

    for lc in &lifecycles {
        info!(
            trade_id = %lc.trade_id(),
            pair = %lc.pair(),
            state = %lc.state(),
            close_profit = lc.close_profit().unwrap_or(0.0),
            "replay/trade"
        );
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn script(v: serde_json::Value) -> ReplayScript {
        serde_json::from_value(v).unwrap()
    }

    #[tokio::test]
    async fn entry_to_close_round_trip() {
        let s = script(json!({
            "hooks": {"stake": 700.0},
            "trades": [{
                "trade_id": "t1",
                "pair": "BTC/USDT",
                "events": [
                    {"at": 0, "event": "propose", "rate": 10.0, "stake": 100.0, "min_stake": 50.0, "max_stake": 500.0},
                    {"at": 5, "event": "entry_filled"},
                    {"at": 60, "event": "tick", "rate": 8.0},
                    {"at": 70, "event": "exit_filled"}
                ]
            }]
        }));
        let lines = replay(&LifecycleConfig::default(), s).await.unwrap();

        let states: Vec<LifecycleState> = lines.iter().map(|l| l.state).collect();
        assert_eq!(
            states,
            vec![
                LifecycleState::AwaitingEntryFill,
                LifecycleState::Open,
                LifecycleState::AwaitingExitFill,
                LifecycleState::Closed,
            ]
        );
        let entry = lines[0].instruction.as_ref().unwrap().order().unwrap();
        assert_eq!(entry.stake, 500.0);
        let exit = lines[2].instruction.as_ref().unwrap().order().unwrap();
        assert_eq!(exit.exit_reason.as_ref().map(|r| r.as_str()), Some("stop_loss"));
        assert_eq!(lines[3].iteration, 4);
    }

    #[tokio::test]
    async fn config_overrides_strategy_stoploss() {
        let s = script(json!({
            "trades": [{
                "trade_id": "t1",
                "pair": "BTC/USDT",
                "events": [
                    {"at": 0, "event": "propose", "rate": 10.0, "stake": 100.0, "min_stake": 50.0, "max_stake": 500.0},
                    {"at": 5, "event": "entry_filled"},
                    {"at": 60, "event": "tick", "rate": 9.7}
                ]
            }]
        }));
        let cfg = LifecycleConfig::from_config_json(&json!({"strategy": {"stoploss": -0.02}})).unwrap();
        let lines = replay(&cfg, s).await.unwrap();

        assert_eq!(lines[2].stoploss, Some(-0.02));
        assert_eq!(lines[2].state, LifecycleState::AwaitingExitFill);
    }

    #[tokio::test]
    async fn illegal_event_order_names_the_trade() {
        let s = script(json!({
            "trades": [{
                "trade_id": "t9",
                "pair": "BTC/USDT",
                "events": [{"at": 0, "event": "tick", "rate": 10.0}]
            }]
        }));
        let err = replay(&LifecycleConfig::default(), s).await.unwrap_err();
        assert!(format!("{err:#}").contains("trade t9 event tick at 0s"));
    }
}
