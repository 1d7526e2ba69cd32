//! Trade lifecycle state machine.
//!
//! # State diagram
//!
//! ```text
//!   Proposed ──EntryPlaced──► AwaitingEntryFill ──EntryFilled──► Open
//!      │                         │        │                       │  ▲
//!  EntryDenied          EntryCancelled  EntryCancelledPartial  ExitPlaced │
//!      │                         │        └──────────► Open       │  ExitCancelled
//!      ▼                         ▼                                ▼  │
//!   Aborted (term.) ◄────────────┘                        AwaitingExitFill
//!                                                                 │
//!                                                             ExitFilled
//!                                                                 ▼
//!                                                          Closed (term.)
//! ```
//!
//! A cancelled exit order returns the trade to `Open`: the position is still held.
//! Illegal events return [`TransitionError`] and leave the state unchanged.

use serde::Serialize;
use thiserror::Error;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Entry proposed by the engine; nothing placed yet.
    Proposed,
    /// Entry order placed, not yet fully filled.
    AwaitingEntryFill,
    /// Position held.
    Open,
    /// Exit order placed, not yet fully filled.
    AwaitingExitFill,
    /// Exit order fully filled. **Terminal.**
    Closed,
    /// Entry denied or entry order cancelled with nothing filled. **Terminal.**
    Aborted,
}

impl LifecycleState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Aborted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proposed => "proposed",
            Self::AwaitingEntryFill => "awaiting_entry_fill",
            Self::Open => "open",
            Self::AwaitingExitFill => "awaiting_exit_fill",
            Self::Closed => "closed",
            Self::Aborted => "aborted",
        }
    }

    /// Apply an event, returning the next state.
    pub fn apply(self, event: LifecycleEvent) -> Result<LifecycleState, TransitionError> {
        use LifecycleEvent::*;
        use LifecycleState::*;

        let next = match (self, event) {
            (Proposed, EntryPlaced) => AwaitingEntryFill,
            (Proposed, EntryDenied) => Aborted,

            (AwaitingEntryFill, EntryFilled) => Open,
            (AwaitingEntryFill, EntryCancelled) => Aborted,
            // Part of the order filled before the cancel: the filled part is a position.
            (AwaitingEntryFill, EntryCancelledPartial) => Open,

            (Open, ExitPlaced) => AwaitingExitFill,

            (AwaitingExitFill, ExitFilled) => Closed,
            (AwaitingExitFill, ExitCancelled) => Open,

            (from, event) => return Err(TransitionError { from, event }),
        };
        Ok(next)
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events that drive lifecycle transitions.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LifecycleEvent {
    EntryPlaced,
    EntryDenied,
    EntryFilled,
    EntryCancelled,
    EntryCancelledPartial,
    ExitPlaced,
    ExitFilled,
    ExitCancelled,
}

/// Returned when an event cannot legally be applied in the current state.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
#[error("illegal lifecycle transition: {from} + {event:?}")]
pub struct TransitionError {
    pub from: LifecycleState,
    pub event: LifecycleEvent,
}
