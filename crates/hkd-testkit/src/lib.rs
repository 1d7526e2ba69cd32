//! hkd-testkit
//!
//! Strategy doubles and fixtures for scenario tests and replays:
//! - [`RecordingHooks`] records every hook call in order, then delegates.
//! - [`ScriptedStrategy`] answers hooks from a declarative [`HookScript`].
//! - [`DefaultHooks`] overrides nothing.

mod fixtures;
mod recording;
mod scripted;

pub use fixtures::*;
pub use recording::*;
pub use scripted::*;
