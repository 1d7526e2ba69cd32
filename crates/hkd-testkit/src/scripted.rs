use std::collections::BTreeSet;
use std::fs;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use hkd_bounds::{is_valid_stoploss, normalize_exit_value};
use hkd_hooks::{
    EntryConfirmation, ExitConfirmation, ExitDecision, ExitSignalRequest, HookError, HookKind,
    HookResult, OrderTimeoutRequest, StakeRequest, StoplossRequest, StrategyHooks, StrategySpec,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Declarative strategy behaviour, loadable from JSON.
///
/// Unset answers fall back to the hook defaults. `exit` accepts the loose
/// JSON forms (`null`, `false`, `true`, a reason string).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HookScript {
    pub name: String,
    pub stoploss: f64,
    pub use_custom_stoploss: bool,
    pub stake: Option<f64>,
    pub stoploss_distance: Option<f64>,
    pub exit: Value,
    pub confirm_entry: Option<bool>,
    pub confirm_exit: Option<bool>,
    pub entry_timeout: Option<bool>,
    pub exit_timeout: Option<bool>,
    /// Sleep inside `confirm_entry` / `confirm_exit` before answering.
    pub confirm_delay_ms: u64,
    /// Hooks (by name) that return an error.
    pub fail: Vec<String>,
    /// Hooks (by name) that panic.
    pub panic: Vec<String>,
}

impl Default for HookScript {
    fn default() -> Self {
        Self {
            name: "scripted".to_string(),
            stoploss: -0.10,
            use_custom_stoploss: false,
            stake: None,
            stoploss_distance: None,
            exit: Value::Null,
            confirm_entry: None,
            confirm_exit: None,
            entry_timeout: None,
            exit_timeout: None,
            confirm_delay_ms: 0,
            fail: Vec::new(),
            panic: Vec::new(),
        }
    }
}

pub fn load_hook_script_json(path: &str) -> Result<HookScript> {
    let s = fs::read_to_string(path).with_context(|| format!("read hook script: {path}"))?;
    let script: HookScript = serde_json::from_str(&s).context("parse hook script json")?;
    Ok(script)
}

/// A [`StrategyHooks`] implementation driven by a [`HookScript`].
#[derive(Clone, Debug)]
pub struct ScriptedStrategy {
    script: HookScript,
    exit: ExitDecision,
    failing: BTreeSet<&'static str>,
    panicking: BTreeSet<&'static str>,
}

impl ScriptedStrategy {
    pub fn new(script: HookScript) -> Result<Self> {
        if !is_valid_stoploss(script.stoploss) {
            bail!("script stoploss must be in [-1, 0): {}", script.stoploss);
        }
        let failing = parse_hook_names(&script.fail).context("script.fail")?;
        let panicking = parse_hook_names(&script.panic).context("script.panic")?;
        let exit = normalize_exit_value(&script.exit).into_inner();
        Ok(Self {
            script,
            exit,
            failing,
            panicking,
        })
    }

    pub fn script(&self) -> &HookScript {
        &self.script
    }

    fn gate(&self, kind: HookKind) -> HookResult<()> {
        if self.panicking.contains(kind.as_str()) {
            panic!("scripted panic in {kind}");
        }
        if self.failing.contains(kind.as_str()) {
            return Err(HookError::failed(format!("scripted failure in {kind}")));
        }
        Ok(())
    }

    fn confirm_delay(&self) {
        if self.script.confirm_delay_ms > 0 {
            std::thread::sleep(Duration::from_millis(self.script.confirm_delay_ms));
        }
    }
}

fn parse_hook_names(names: &[String]) -> Result<BTreeSet<&'static str>> {
    names
        .iter()
        .map(|n| match HookKind::parse(n) {
            Some(k) => Ok(k.as_str()),
            None => Err(anyhow!("unknown hook name: {n}")),
        })
        .collect()
}

impl StrategyHooks for ScriptedStrategy {
    fn spec(&self) -> StrategySpec {
        StrategySpec::new(self.script.name.clone(), self.script.stoploss)
            .with_custom_stoploss(self.script.use_custom_stoploss)
    }

    fn on_loop_start(&self, _req: &hkd_hooks::LoopStartRequest) -> HookResult<()> {
        self.gate(HookKind::LoopStart)
    }

    fn size_stake(&self, req: &StakeRequest) -> HookResult<f64> {
        self.gate(HookKind::SizeStake)?;
        Ok(self.script.stake.unwrap_or(req.proposal.proposed))
    }

    fn stoploss_distance(&self, req: &StoplossRequest) -> HookResult<f64> {
        self.gate(HookKind::StoplossDistance)?;
        Ok(self.script.stoploss_distance.unwrap_or(req.base_stoploss))
    }

    fn exit_signal(&self, _req: &ExitSignalRequest) -> HookResult<ExitDecision> {
        self.gate(HookKind::ExitSignal)?;
        Ok(self.exit.clone())
    }

    fn confirm_entry(&self, _req: &EntryConfirmation) -> HookResult<bool> {
        self.gate(HookKind::ConfirmEntry)?;
        self.confirm_delay();
        Ok(self.script.confirm_entry.unwrap_or(true))
    }

    fn confirm_exit(&self, _req: &ExitConfirmation) -> HookResult<bool> {
        self.gate(HookKind::ConfirmExit)?;
        self.confirm_delay();
        Ok(self.script.confirm_exit.unwrap_or(true))
    }

    fn entry_timeout_exceeded(&self, _req: &OrderTimeoutRequest) -> HookResult<bool> {
        self.gate(HookKind::EntryTimeout)?;
        Ok(self.script.entry_timeout.unwrap_or(false))
    }

    fn exit_timeout_exceeded(&self, _req: &OrderTimeoutRequest) -> HookResult<bool> {
        self.gate(HookKind::ExitTimeout)?;
        Ok(self.script.exit_timeout.unwrap_or(false))
    }
}
