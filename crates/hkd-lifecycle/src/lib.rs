//! hkd-lifecycle
//!
//! Trade lifecycle driver: walks one trade through
//! `Proposed → AwaitingEntryFill → Open → AwaitingExitFill → Closed`
//! (or `Aborted`), calling strategy hooks at fixed transition points and
//! turning their answers into engine [`Instruction`]s.
//!
//! Contract:
//! - Hook returns pass through `hkd-bounds` before anything acts on them.
//! - Hook errors and panics fall back to the hook's documented default.
//! - `confirm_entry` / `confirm_exit` run under a time budget; overrun = denial.
//! - `on_loop_start` runs before any per-trade hook of the same iteration
//!   (enforced by [`IterationToken`]).
//! - Stoploss is evaluated before, and independently of, `exit_signal`.
//! - Driver misuse returns [`LifecycleError`]; it never panics.

mod driver;
mod error;
mod guard;
mod host;
mod instruction;
mod state;
mod timeout;

pub use driver::*;
pub use error::*;
pub use host::*;
pub use instruction::*;
pub use state::*;
pub use timeout::*;
