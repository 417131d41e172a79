//! Three-step client reconciliation: load the authoritative state, drop
//! confirmed intents, replay the rest.

use crate::error::PredictionError;
use crate::tracker::IntentTracker;

/// Drives reconciliation on top of an [`IntentTracker`]. `S` is the
/// authoritative state payload a snapshot carries; `T` is the intent type
/// being tracked.
///
/// `on_load_state` and `on_replay` are caller-supplied closures, not trait
/// methods, so a `Reconciliator` can be built once per entity/component
/// without requiring a bespoke trait impl per game.
pub struct Reconciliator<T, S> {
    tracker: IntentTracker<T>,
    on_load_state: Box<dyn FnMut(&S) + Send>,
    on_replay: Box<dyn FnMut(&[(u32, T)]) + Send>,
}

impl<T: Clone, S> Reconciliator<T, S> {
    pub fn new<L, R>(on_load_state: L, on_replay: R) -> Self
    where
        L: FnMut(&S) + Send + 'static,
        R: FnMut(&[(u32, T)]) + Send + 'static,
    {
        Self {
            tracker: IntentTracker::new(),
            on_load_state: Box::new(on_load_state),
            on_replay: Box::new(on_replay),
        }
    }

    pub fn tracked_len(&self) -> usize {
        self.tracker.len()
    }

    /// Record a locally-issued intent for replay bookkeeping.
    pub fn track_intent(&mut self, tick: u32, intent: T) -> Result<(), PredictionError> {
        self.tracker.track(tick, intent)
    }

    /// Reconcile against an authoritative snapshot at `tick`:
    /// 1. `on_load_state(state)` — caller overwrites local fields from the
    ///    server view.
    /// 2. Confirmed intents (`t <= tick`) are dropped from the tracker.
    /// 3. `on_replay(remaining)` — caller re-applies the surviving
    ///    intents, in ascending tick order, to the freshly-loaded state.
    pub fn on_snapshot(&mut self, tick: u32, state: &S) {
        (self.on_load_state)(state);
        let remaining = self.tracker.drop_up_to(tick);
        (self.on_replay)(&remaining);
    }
}
