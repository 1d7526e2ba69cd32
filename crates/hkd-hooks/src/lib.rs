//! hkd-hooks
//!
//! Strategy hook contract.
//!
//! Contract:
//! - The engine owns the main loop; strategies only answer decision hooks.
//! - Every hook has a default. A strategy that overrides nothing never blocks
//!   an entry or exit and never forces an early cancel.
//! - Hooks receive one borrowed request struct. New engine fields are added to
//!   the request structs (or their `extra` map), never to the hook signatures,
//!   so existing overrides keep compiling.
//! - Hook return values are advisory. The lifecycle driver clamps, reconciles
//!   and normalizes them before acting (see `hkd-bounds`).

mod hooks;
mod types;

pub use hooks::*;
pub use types::*;
