//! hkd-config
//!
//! Layered YAML configuration for the lifecycle driver.
//!
//! - Documents merge in order: earlier docs are base, later docs override.
//! - The merged document is rendered as canonical JSON and hashed (SHA-256),
//!   so two runs can prove they used the same effective config.
//! - Leaves not read by any consumer are reported (warn) or rejected (fail).

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;

mod lifecycle;

pub use lifecycle::*;

// ---------------------------------------------------------------------------
// Unused-key guard
// ---------------------------------------------------------------------------

/// Config leaves the driver reads, as JSON pointers.
///
/// An entry also covers everything below it, so list exact leaves unless a
/// whole section is deserialized.
pub const CONSUMED_POINTERS: &[&str] = &[
    "/strategy/name",
    "/strategy/stoploss",
    "/strategy/use_custom_stoploss",
    "/timeouts/entry_secs",
    "/timeouts/exit_secs",
    "/timeouts/confirm_budget_ms",
    "/orders/entry_type",
    "/orders/exit_type",
    "/orders/time_in_force",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    /// Leaf pointers no consumer reads (sorted).
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// Set of pointers some consumer reads.
#[derive(Debug, Clone)]
struct KeyRegistry {
    entries: BTreeSet<String>,
}

impl KeyRegistry {
    fn new(pointers: &[&str]) -> Self {
        let entries = pointers
            .iter()
            .map(|p| format!("/{}", p.trim().trim_matches('/')))
            .collect();
        Self { entries }
    }

    /// True when `leaf` or one of its ancestors is registered.
    fn covers(&self, leaf: &str) -> bool {
        if self.entries.contains("/") {
            return true;
        }
        let mut cur = leaf;
        loop {
            if self.entries.contains(cur) {
                return true;
            }
            match cur.rfind('/') {
                Some(0) | None => return false,
                Some(cut) => cur = &cur[..cut],
            }
        }
    }
}

/// Report config leaves not covered by [`CONSUMED_POINTERS`].
/// With `UnusedKeyPolicy::Fail`, any unused leaf is an error.
pub fn report_unused_keys(config_json: &Value, policy: UnusedKeyPolicy) -> Result<UnusedKeyReport> {
    report_unused_keys_with(CONSUMED_POINTERS, config_json, policy)
}

pub fn report_unused_keys_with(
    consumed: &[&str],
    config_json: &Value,
    policy: UnusedKeyPolicy,
) -> Result<UnusedKeyReport> {
    let registry = KeyRegistry::new(consumed);
    let unused: BTreeSet<String> = leaf_pointers(config_json)
        .into_iter()
        .filter(|leaf| !registry.covers(leaf))
        .collect();
    let report = UnusedKeyReport {
        unused_leaf_pointers: unused.into_iter().collect(),
    };

    if policy == UnusedKeyPolicy::Fail && !report.is_clean() {
        let shown: Vec<&str> = report
            .unused_leaf_pointers
            .iter()
            .take(12)
            .map(String::as_str)
            .collect();
        bail!(
            "CONFIG_UNUSED_KEYS: {} unused config leaf key(s): {}",
            report.unused_leaf_pointers.len(),
            shown.join(", ")
        );
    }

    Ok(report)
}

/// Pointers to every scalar (or empty container) below the root.
/// Tokens are escaped per RFC 6901. A bare scalar document has the leaf "/".
fn leaf_pointers(doc: &Value) -> Vec<String> {
    let mut out = Vec::new();
    let mut pending: Vec<(String, &Value)> = vec![(String::new(), doc)];
    while let Some((path, v)) = pending.pop() {
        let children: Vec<(String, &Value)> = match v {
            Value::Object(map) => map
                .iter()
                .map(|(k, child)| (format!("{path}/{}", k.replace('~', "~0").replace('/', "~1")), child))
                .collect(),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, child)| (format!("{path}/{i}"), child))
                .collect(),
            _ => Vec::new(),
        };
        if !children.is_empty() {
            pending.extend(children);
        } else if !path.is_empty() {
            out.push(path);
        } else if !(v.is_object() || v.is_array() || v.is_null()) {
            out.push("/".to_string());
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut docs: Vec<String> = Vec::new();
    for p in paths {
        let raw =
            fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}"))?;
        docs.push(raw);
    }
    let doc_refs: Vec<&str> = docs.iter().map(|s| s.as_str()).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = serde_json::json!({});
    for (i, raw) in yaml_docs.iter().enumerate() {
        let v_yaml: serde_yaml::Value =
            serde_yaml::from_str(raw).with_context(|| format!("invalid yaml (layer {i})"))?;
        let v_json = serde_json::to_value(v_yaml).context("yaml->json conversion failed")?;
        // An empty YAML document parses as null; it overrides nothing.
        if v_json.is_null() {
            continue;
        }
        if !v_json.is_object() {
            bail!("CONFIG_INVALID layer {i}: top level must be a mapping");
        }
        merge_layer(&mut merged, v_json);
    }

    let canonical_json = canonicalize_json(&merged)?;
    let config_hash = sha256_hex(canonical_json.as_bytes());
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

/// Overlay `top` onto `base`: mappings merge key by key, anything else replaces.
fn merge_layer(base: &mut Value, top: Value) {
    match (base, top) {
        (Value::Object(into), Value::Object(from)) => {
            for (k, v) in from {
                match into.get_mut(&k) {
                    Some(slot) => merge_layer(slot, v),
                    None => {
                        into.insert(k, v);
                    }
                }
            }
        }
        (slot, v) => *slot = v,
    }
}

/// Compact JSON; `serde_json::Map` is key-sorted, so equal documents render identically.
fn canonicalize_json(v: &Value) -> Result<String> {
    serde_json::to_string(v).context("canonical json serialize failed")
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
