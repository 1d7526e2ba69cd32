use std::sync::{Mutex, MutexGuard};

use hkd_hooks::{
    EntryConfirmation, ExitConfirmation, ExitDecision, ExitSignalRequest, HookKind, HookResult,
    LoopStartRequest, OrderTimeoutRequest, StakeRequest, StoplossRequest, StrategyHooks,
    StrategySpec,
};

/// One recorded hook invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HookCall {
    pub kind: HookKind,
    /// `None` for `on_loop_start`.
    pub pair: Option<String>,
}

/// Wraps a strategy and records every hook call, in call order, before
/// delegating to it.
pub struct RecordingHooks<H> {
    inner: H,
    calls: Mutex<Vec<HookCall>>,
}

impl<H: StrategyHooks> RecordingHooks<H> {
    pub fn new(inner: H) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }

    pub fn calls(&self) -> Vec<HookCall> {
        self.log().clone()
    }

    pub fn kinds(&self) -> Vec<HookKind> {
        self.log().iter().map(|c| c.kind).collect()
    }

    pub fn count(&self, kind: HookKind) -> usize {
        self.log().iter().filter(|c| c.kind == kind).count()
    }

    pub fn was_called(&self, kind: HookKind) -> bool {
        self.count(kind) > 0
    }

    pub fn clear(&self) {
        self.log().clear();
    }

    fn record(&self, kind: HookKind, pair: Option<&str>) {
        self.log().push(HookCall {
            kind,
            pair: pair.map(str::to_string),
        });
    }

    // A panicking inner hook must not hide the calls recorded so far.
    fn log(&self) -> MutexGuard<'_, Vec<HookCall>> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<H: StrategyHooks> StrategyHooks for RecordingHooks<H> {
    fn spec(&self) -> StrategySpec {
        self.inner.spec()
    }

    fn on_loop_start(&self, req: &LoopStartRequest) -> HookResult<()> {
        self.record(HookKind::LoopStart, None);
        self.inner.on_loop_start(req)
    }

    fn size_stake(&self, req: &StakeRequest) -> HookResult<f64> {
        self.record(HookKind::SizeStake, Some(&req.pair));
        self.inner.size_stake(req)
    }

    fn stoploss_distance(&self, req: &StoplossRequest) -> HookResult<f64> {
        self.record(HookKind::StoplossDistance, Some(&req.ctx.pair));
        self.inner.stoploss_distance(req)
    }

    fn exit_signal(&self, req: &ExitSignalRequest) -> HookResult<ExitDecision> {
        self.record(HookKind::ExitSignal, Some(&req.ctx.pair));
        self.inner.exit_signal(req)
    }

    fn confirm_entry(&self, req: &EntryConfirmation) -> HookResult<bool> {
        self.record(HookKind::ConfirmEntry, Some(&req.pair));
        self.inner.confirm_entry(req)
    }

    fn confirm_exit(&self, req: &ExitConfirmation) -> HookResult<bool> {
        self.record(HookKind::ConfirmExit, Some(&req.pair));
        self.inner.confirm_exit(req)
    }

    fn entry_timeout_exceeded(&self, req: &OrderTimeoutRequest) -> HookResult<bool> {
        self.record(HookKind::EntryTimeout, Some(&req.pair));
        self.inner.entry_timeout_exceeded(req)
    }

    fn exit_timeout_exceeded(&self, req: &OrderTimeoutRequest) -> HookResult<bool> {
        self.record(HookKind::ExitTimeout, Some(&req.pair));
        self.inner.exit_timeout_exceeded(req)
    }
}

/// A strategy that overrides nothing.
#[derive(Clone, Debug, PartialEq)]
pub struct DefaultHooks {
    spec: StrategySpec,
}

impl DefaultHooks {
    pub fn new(spec: StrategySpec) -> Self {
        Self { spec }
    }
}

impl StrategyHooks for DefaultHooks {
    fn spec(&self) -> StrategySpec {
        self.spec.clone()
    }
}
