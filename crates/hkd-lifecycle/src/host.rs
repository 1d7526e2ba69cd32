use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use hkd_bounds::is_valid_stoploss;
use hkd_hooks::{HookArgs, HookKind, LoopStartRequest, OrderType, StrategyHooks, StrategySpec, TimeInForce};
use tracing::debug;

use crate::guard::call_hook;
use crate::{Instruction, LifecycleError, OpenTick, TimeoutGate, TradeLifecycle};

/// Engine-side knobs for the driver.
#[derive(Clone, Debug, PartialEq)]
pub struct DriverSettings {
    /// Hard stoploss ratio (negative).
    pub stoploss: f64,
    pub use_custom_stoploss: bool,
    pub entry_timeout: TimeoutGate,
    pub exit_timeout: TimeoutGate,
    /// Time budget for `confirm_entry` / `confirm_exit`.
    pub confirm_budget: Duration,
    pub entry_order_type: OrderType,
    pub exit_order_type: OrderType,
    pub time_in_force: TimeInForce,
}

impl DriverSettings {
    pub const DEFAULT_ORDER_TIMEOUT_SECS: u64 = 600;
    pub const DEFAULT_CONFIRM_BUDGET_MS: u64 = 250;

    pub fn from_spec(spec: &StrategySpec) -> Self {
        Self {
            stoploss: spec.stoploss,
            use_custom_stoploss: spec.use_custom_stoploss,
            entry_timeout: TimeoutGate::from_secs(Self::DEFAULT_ORDER_TIMEOUT_SECS),
            exit_timeout: TimeoutGate::from_secs(Self::DEFAULT_ORDER_TIMEOUT_SECS),
            confirm_budget: Duration::from_millis(Self::DEFAULT_CONFIRM_BUDGET_MS),
            entry_order_type: OrderType::Limit,
            exit_order_type: OrderType::Limit,
            time_in_force: TimeInForce::Gtc,
        }
    }

    pub fn with_timeouts(mut self, entry: TimeoutGate, exit: TimeoutGate) -> Self {
        self.entry_timeout = entry;
        self.exit_timeout = exit;
        self
    }

    pub fn with_confirm_budget(mut self, budget: Duration) -> Self {
        self.confirm_budget = budget;
        self
    }
}

/// Proof that `on_loop_start` ran for the current iteration.
///
/// Only [`StrategyHost::begin_iteration`] mints tokens, and every per-trade
/// transition demands one from the host's current iteration.
#[derive(Debug)]
pub struct IterationToken {
    iteration: u64,
    now: DateTime<Utc>,
}

impl IterationToken {
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    /// Clock for every transition in this iteration.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }
}

/// Owns the strategy and the driver settings; sequences engine iterations.
pub struct StrategyHost {
    hooks: Arc<dyn StrategyHooks>,
    spec: StrategySpec,
    settings: DriverSettings,
    iteration: u64,
}

impl StrategyHost {
    pub fn new(hooks: Arc<dyn StrategyHooks>) -> Result<Self, LifecycleError> {
        let spec = hooks.spec();
        let settings = DriverSettings::from_spec(&spec);
        Self::with_settings(hooks, settings)
    }

    /// Fails when the hard stoploss is not a usable floor (NaN, zero,
    /// positive or below -100%).
    pub fn with_settings(
        hooks: Arc<dyn StrategyHooks>,
        settings: DriverSettings,
    ) -> Result<Self, LifecycleError> {
        if !is_valid_stoploss(settings.stoploss) {
            return Err(LifecycleError::InvalidStoploss(settings.stoploss));
        }
        let spec = hooks.spec();
        Ok(Self {
            hooks,
            spec,
            settings,
            iteration: 0,
        })
    }

    pub fn spec(&self) -> &StrategySpec {
        &self.spec
    }

    pub fn settings(&self) -> &DriverSettings {
        &self.settings
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub(crate) fn hooks(&self) -> &Arc<dyn StrategyHooks> {
        &self.hooks
    }

    pub fn begin_iteration(&mut self, now: DateTime<Utc>) -> IterationToken {
        self.begin_iteration_with(now, HookArgs::new())
    }

    /// Start the next iteration: runs `on_loop_start` before anything else.
    pub fn begin_iteration_with(&mut self, now: DateTime<Utc>, extra: HookArgs) -> IterationToken {
        self.iteration += 1;
        let req = LoopStartRequest {
            iteration: self.iteration,
            now,
            extra,
        };
        let hooks = &self.hooks;
        call_hook(HookKind::LoopStart, "*", (), || hooks.on_loop_start(&req));
        debug!(iteration = self.iteration, strategy = %self.spec.name, "iteration/begin");
        IterationToken {
            iteration: self.iteration,
            now,
        }
    }

    pub(crate) fn check_token(&self, token: &IterationToken) -> Result<(), LifecycleError> {
        if token.iteration != self.iteration {
            return Err(LifecycleError::StaleIteration {
                expected: self.iteration,
                got: token.iteration,
            });
        }
        Ok(())
    }

    /// Evaluate many open trades concurrently within one iteration.
    ///
    /// Each trade is borrowed mutably, so a trade can appear at most once.
    /// Results come back in input order.
    pub async fn evaluate_open_trades<'t, I>(
        &self,
        token: &IterationToken,
        trades: I,
    ) -> Vec<Result<Instruction, LifecycleError>>
    where
        I: IntoIterator<Item = (&'t mut TradeLifecycle, OpenTick)>,
    {
        let evaluations = trades
            .into_iter()
            .map(|(trade, tick)| trade.evaluate_open(self, token, tick));
        join_all(evaluations).await
    }
}

impl std::fmt::Debug for StrategyHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyHost")
            .field("spec", &self.spec)
            .field("settings", &self.settings)
            .field("iteration", &self.iteration)
            .finish_non_exhaustive()
    }
}
