use anyhow::{bail, Context, Result};
use hkd_hooks::{OrderType, TimeInForce};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::LoadedConfig;

/// Typed view of the consumed config sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LifecycleConfig {
    #[serde(default)]
    pub strategy: StrategySection,
    #[serde(default)]
    pub timeouts: TimeoutSection,
    #[serde(default)]
    pub orders: OrderSection,
}

/// Overrides for what the strategy declares about itself. Unset = keep the
/// strategy's own value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategySection {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub stoploss: Option<f64>,
    #[serde(default)]
    pub use_custom_stoploss: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeoutSection {
    /// Base unfilled timeout for entry orders.
    #[serde(default = "default_order_timeout_secs")]
    pub entry_secs: u64,
    #[serde(default = "default_order_timeout_secs")]
    pub exit_secs: u64,
    /// Time budget for `confirm_entry` / `confirm_exit`.
    #[serde(default = "default_confirm_budget_ms")]
    pub confirm_budget_ms: u64,
}

impl Default for TimeoutSection {
    fn default() -> Self {
        Self {
            entry_secs: default_order_timeout_secs(),
            exit_secs: default_order_timeout_secs(),
            confirm_budget_ms: default_confirm_budget_ms(),
        }
    }
}

fn default_order_timeout_secs() -> u64 {
    600
}

fn default_confirm_budget_ms() -> u64 {
    250
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSection {
    #[serde(default = "default_order_type")]
    pub entry_type: OrderType,
    #[serde(default = "default_order_type")]
    pub exit_type: OrderType,
    #[serde(default = "default_time_in_force")]
    pub time_in_force: TimeInForce,
}

impl Default for OrderSection {
    fn default() -> Self {
        Self {
            entry_type: default_order_type(),
            exit_type: default_order_type(),
            time_in_force: default_time_in_force(),
        }
    }
}

fn default_order_type() -> OrderType {
    OrderType::Limit
}

fn default_time_in_force() -> TimeInForce {
    TimeInForce::Gtc
}

impl LifecycleConfig {
    pub fn from_loaded(loaded: &LoadedConfig) -> Result<Self> {
        Self::from_config_json(&loaded.config_json)
    }

    pub fn from_config_json(config_json: &Value) -> Result<Self> {
        let cfg: LifecycleConfig = serde_json::from_value(config_json.clone())
            .context("CONFIG_INVALID: lifecycle sections do not match the expected shape")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(sl) = self.strategy.stoploss {
            if !(sl.is_finite() && (-1.0..0.0).contains(&sl)) {
                bail!("CONFIG_INVALID /strategy/stoploss={sl}: must be in [-1, 0)");
            }
        }
        if let Some(name) = &self.strategy.name {
            if name.trim().is_empty() {
                bail!("CONFIG_INVALID /strategy/name: must not be blank");
            }
        }
        if self.timeouts.entry_secs == 0 {
            bail!("CONFIG_INVALID /timeouts/entry_secs: must be positive");
        }
        if self.timeouts.exit_secs == 0 {
            bail!("CONFIG_INVALID /timeouts/exit_secs: must be positive");
        }
        if self.timeouts.confirm_budget_ms == 0 {
            bail!("CONFIG_INVALID /timeouts/confirm_budget_ms: must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_config_gets_defaults() {
        let cfg = LifecycleConfig::from_config_json(&json!({})).unwrap();
        assert_eq!(cfg.timeouts.entry_secs, 600);
        assert_eq!(cfg.timeouts.confirm_budget_ms, 250);
        assert_eq!(cfg.orders.entry_type, OrderType::Limit);
        assert_eq!(cfg.orders.time_in_force, TimeInForce::Gtc);
        assert_eq!(cfg.strategy.stoploss, None);
    }

    #[test]
    fn order_enums_parse_from_wire_names() {
        let cfg = LifecycleConfig::from_config_json(&json!({
            "orders": {"entry_type": "market", "time_in_force": "IOC"}
        }))
        .unwrap();
        assert_eq!(cfg.orders.entry_type, OrderType::Market);
        assert_eq!(cfg.orders.exit_type, OrderType::Limit);
        assert_eq!(cfg.orders.time_in_force, TimeInForce::Ioc);
    }

    #[test]
    fn stoploss_outside_range_is_rejected() {
        for sl in [0.0, 0.05, -1.5] {
            let err = LifecycleConfig::from_config_json(&json!({"strategy": {"stoploss": sl}}))
                .unwrap_err();
            assert!(err.to_string().contains("/strategy/stoploss"));
        }
        assert!(
            LifecycleConfig::from_config_json(&json!({"strategy": {"stoploss": -1.0}})).is_ok()
        );
    }

    #[test]
    fn zero_budget_is_rejected() {
        let err = LifecycleConfig::from_config_json(&json!({"timeouts": {"confirm_budget_ms": 0}}))
            .unwrap_err();
        assert!(err.to_string().contains("confirm_budget_ms"));
    }

    #[test]
    fn wrong_type_is_a_config_error() {
        let err = LifecycleConfig::from_config_json(&json!({"timeouts": {"entry_secs": "ten"}}))
            .unwrap_err();
        assert!(err.to_string().starts_with("CONFIG_INVALID"));
    }
}
