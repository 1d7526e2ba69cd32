//! Command handler modules for hkd-cli.

pub mod replay;

use anyhow::Result;
use hkd_config::{report_unused_keys, LoadedConfig, UnusedKeyPolicy};
use tracing::warn;

/// Load layered config and run the unused-key guard over it.
pub fn load_config(paths: &[String], strict: bool) -> Result<LoadedConfig> {
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    let loaded = hkd_config::load_layered_yaml(&path_refs)?;

    let policy = if strict {
        UnusedKeyPolicy::Fail
    } else {
        UnusedKeyPolicy::Warn
    };
    let report = report_unused_keys(&loaded.config_json, policy)?;
    for leaf in &report.unused_leaf_pointers {
        warn!(leaf = %leaf, "config/unused_key");
    }
    Ok(loaded)
}
