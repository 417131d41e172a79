//! Client-side ordered record of unconfirmed intents, keyed by the tick
//! they were issued for.

use std::collections::BTreeMap;

use crate::error::PredictionError;

/// Ordered `tick → intent` map. Insertion order must be monotonically
/// increasing by tick — this is what lets `drop_up_to` return its
/// remainder pre-sorted for replay, with no separate sort step.
#[derive(Debug, Default)]
pub struct IntentTracker<T> {
    entries: BTreeMap<u32, T>,
}

impl<T> IntentTracker<T> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The most recently tracked tick, if any.
    pub fn last_tick(&self) -> Option<u32> {
        self.entries.keys().next_back().copied()
    }

    /// Track `intent` at `tick`. Fails if `tick` does not strictly exceed
    /// every previously tracked tick (monotonic, no duplicates).
    pub fn track(&mut self, tick: u32, intent: T) -> Result<(), PredictionError> {
        if let Some(last) = self.last_tick() {
            if tick <= last {
                let err = PredictionError::NonMonotonicTick {
                    last_tracked: last,
                    attempted: tick,
                };
                tracing::warn!(%err, "rejected non-monotonic intent tick");
                return Err(err);
            }
        }
        self.entries.insert(tick, intent);
        Ok(())
    }

    /// Remove every tracked intent with `tick <= cutoff`, returning the
    /// surviving entries in ascending tick order. Calling this again with
    /// the same (or a smaller) `cutoff` is a no-op: it returns the same
    /// surviving set without dropping anything further.
    pub fn drop_up_to(&mut self, cutoff: u32) -> Vec<(u32, T)>
    where
        T: Clone,
    {
        let remainder = self.entries.split_off(&cutoff.saturating_add(1));
        let out = remainder.iter().map(|(tick, intent)| (*tick, intent.clone())).collect();
        self.entries = remainder;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_rejects_non_monotonic_ticks() {
        let mut tracker = IntentTracker::new();
        tracker.track(10, "a").unwrap();
        let err = tracker.track(10, "b").unwrap_err();
        assert!(matches!(err, PredictionError::NonMonotonicTick { .. }));
        let err = tracker.track(5, "c").unwrap_err();
        assert!(matches!(err, PredictionError::NonMonotonicTick { .. }));
    }

    #[test]
    fn drop_up_to_removes_confirmed_ticks_and_returns_the_rest_ascending() {
        let mut tracker = IntentTracker::new();
        for tick in [10, 11, 12, 13] {
            tracker.track(tick, tick).unwrap();
        }
        let remaining = tracker.drop_up_to(11);
        assert_eq!(remaining, vec![(12, 12), (13, 13)]);
        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn drop_up_to_is_idempotent() {
        let mut tracker = IntentTracker::new();
        for tick in [10, 11, 12, 13] {
            tracker.track(tick, tick).unwrap();
        }
        let first = tracker.drop_up_to(11);
        let second = tracker.drop_up_to(11);
        assert_eq!(first, second);
        assert_eq!(tracker.len(), 2);
    }

    #[test]
    fn drop_up_to_with_no_entries_at_or_below_cutoff_keeps_everything() {
        let mut tracker = IntentTracker::new();
        tracker.track(5, "x").unwrap();
        let remaining = tracker.drop_up_to(1);
        assert_eq!(remaining, vec![(5, "x")]);
        assert_eq!(tracker.len(), 1);
    }
}
