//! Errors raised by [`crate::tracker::IntentTracker`].

use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PredictionError {
    /// `track` was called with a tick that doesn't strictly exceed the
    /// last tracked one. The data model's invariant is "ticks are
    /// monotonic; no duplicates" — this is the caller's bug to fix, not a
    /// runtime condition to recover from.
    #[error("intent tick {attempted} is not greater than the last tracked tick {last_tracked}")]
    NonMonotonicTick { last_tracked: u32, attempted: u32 },
}
