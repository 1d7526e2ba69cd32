use thiserror::Error;

use crate::{
    EntryConfirmation, ExitConfirmation, ExitDecision, ExitSignalRequest, LoopStartRequest,
    OrderTimeoutRequest, StakeRequest, StoplossRequest,
};

/// Strategy identity + static stoploss settings.
#[derive(Clone, Debug, PartialEq)]
pub struct StrategySpec {
    pub name: String,
    /// Hard stoploss ratio in `[-1, 0)`. Custom stoplosses may only tighten it.
    /// The lifecycle host refuses a spec outside that range.
    pub stoploss: f64,
    /// Capability flag: when false, `stoploss_distance` is never called.
    pub use_custom_stoploss: bool,
}

impl StrategySpec {
    pub fn new(name: impl Into<String>, stoploss: f64) -> Self {
        Self {
            name: name.into(),
            stoploss,
            use_custom_stoploss: false,
        }
    }

    pub fn with_custom_stoploss(mut self, enabled: bool) -> Self {
        self.use_custom_stoploss = enabled;
        self
    }
}

/// Error raised by a hook. The driver logs it and falls back to the hook default.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum HookError {
    #[error("hook failed: {0}")]
    Failed(String),
}

impl HookError {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

pub type HookResult<T> = Result<T, HookError>;

/// Names of the hooks, for logs and call recording.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum HookKind {
    LoopStart,
    SizeStake,
    StoplossDistance,
    ExitSignal,
    ConfirmEntry,
    ConfirmExit,
    EntryTimeout,
    ExitTimeout,
}

impl HookKind {
    pub const ALL: [HookKind; 8] = [
        HookKind::LoopStart,
        HookKind::SizeStake,
        HookKind::StoplossDistance,
        HookKind::ExitSignal,
        HookKind::ConfirmEntry,
        HookKind::ConfirmExit,
        HookKind::EntryTimeout,
        HookKind::ExitTimeout,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HookKind::LoopStart => "on_loop_start",
            HookKind::SizeStake => "size_stake",
            HookKind::StoplossDistance => "stoploss_distance",
            HookKind::ExitSignal => "exit_signal",
            HookKind::ConfirmEntry => "confirm_entry",
            HookKind::ConfirmExit => "confirm_exit",
            HookKind::EntryTimeout => "entry_timeout_exceeded",
            HookKind::ExitTimeout => "exit_timeout_exceeded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

impl std::fmt::Display for HookKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision hooks a strategy may override.
///
/// Defaults are calibrated per hook: trades are permitted (`confirm_*` → true)
/// and cancels are denied (`*_timeout_exceeded` → false).
///
/// Hooks take `&self`; a strategy that keeps bookkeeping between calls owns its
/// own interior mutability. `confirm_entry`/`confirm_exit` sit on the order
/// placement path and run under a short time budget; a hook that overruns it
/// is treated as a denial.
pub trait StrategyHooks: Send + Sync + 'static {
    fn spec(&self) -> StrategySpec;

    /// Once per engine iteration, before any per-pair hook.
    fn on_loop_start(&self, _req: &LoopStartRequest) -> HookResult<()> {
        Ok(())
    }

    /// Stake for a new trade. The caller clamps the result into the proposal bounds.
    fn size_stake(&self, req: &StakeRequest) -> HookResult<f64> {
        Ok(req.proposal.proposed)
    }

    /// Custom stoploss ratio. Only consulted when `use_custom_stoploss` is set.
    fn stoploss_distance(&self, req: &StoplossRequest) -> HookResult<f64> {
        Ok(req.base_stoploss)
    }

    fn exit_signal(&self, _req: &ExitSignalRequest) -> HookResult<ExitDecision> {
        Ok(ExitDecision::NoExit)
    }

    fn confirm_entry(&self, _req: &EntryConfirmation) -> HookResult<bool> {
        Ok(true)
    }

    fn confirm_exit(&self, _req: &ExitConfirmation) -> HookResult<bool> {
        Ok(true)
    }

    /// Only consulted after the engine's base unfilled-order timeout elapsed.
    fn entry_timeout_exceeded(&self, _req: &OrderTimeoutRequest) -> HookResult<bool> {
        Ok(false)
    }

    fn exit_timeout_exceeded(&self, _req: &OrderTimeoutRequest) -> HookResult<bool> {
        Ok(false)
    }
}
