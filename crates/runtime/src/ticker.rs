//! Fixed-timestep accumulator driving deterministic simulation ticks at a
//! constant rate regardless of the caller's variable frame time.

use tracing::warn;

/// Ticks fired from a single `tick(dt)` call are capped here. Chosen to
/// satisfy the 60 Hz / 100 ms catch-up scenario (6 ticks from one call)
/// while still bounding a true multi-second stall to a handful of ticks
/// instead of a few hundred.
pub const MAX_CATCHUP_TICKS: u32 = 6;

/// One fixed-timestep tick: the tick index about to run (or that just ran)
/// and its fixed delta time in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickEvent {
    pub tick: u64,
    pub delta_time: f64,
}

/// Accumulator-based fixed-timestep ticker.
///
/// `tick(dt, ...)` may fire zero, one, or several simulation ticks
/// depending on how much time has accumulated, always at a fixed
/// `interval_seconds` step. `alpha()` exposes the fractional remainder for
/// render interpolation between the last completed tick and the next one.
pub struct FixedTicker {
    rate_hz: f64,
    interval_seconds: f64,
    accumulator: f64,
    tick_count: u64,
}

impl FixedTicker {
    pub fn new(rate_hz: f64) -> Self {
        assert!(rate_hz > 0.0, "tick rate must be positive");
        Self {
            rate_hz,
            interval_seconds: 1.0 / rate_hz,
            accumulator: 0.0,
            tick_count: 0,
        }
    }

    pub fn rate_hz(&self) -> f64 {
        self.rate_hz
    }

    pub fn interval_seconds(&self) -> f64 {
        self.interval_seconds
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Fractional progress toward the next tick, in `[0, 1)`.
    pub fn alpha(&self) -> f64 {
        self.accumulator / self.interval_seconds
    }

    /// Advance the accumulator by `dt_seconds` and fire pre-tick/tick/
    /// post-tick for every whole interval elapsed, up to
    /// [`MAX_CATCHUP_TICKS`]. Returns the number of ticks fired.
    pub fn tick<PreTick, Tick, PostTick>(
        &mut self,
        dt_seconds: f64,
        mut pre_tick: PreTick,
        mut on_tick: Tick,
        mut post_tick: PostTick,
    ) -> u32
    where
        PreTick: FnMut(TickEvent),
        Tick: FnMut(TickEvent),
        PostTick: FnMut(TickEvent),
    {
        self.accumulator += dt_seconds;

        let mut fired = 0u32;
        while self.accumulator >= self.interval_seconds && fired < MAX_CATCHUP_TICKS {
            let event = TickEvent {
                tick: self.tick_count + 1,
                delta_time: self.interval_seconds,
            };
            pre_tick(event);
            on_tick(event);
            post_tick(event);
            self.tick_count += 1;
            self.accumulator -= self.interval_seconds;
            fired += 1;
        }

        if fired == MAX_CATCHUP_TICKS && self.accumulator >= self.interval_seconds {
            warn!(
                dropped_seconds = self.accumulator,
                "fixed ticker hit catch-up cap, discarding remaining backlog"
            );
            self.accumulator %= self.interval_seconds;
        }

        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticker_law_fires_expected_tick_count() {
        let mut ticker = FixedTicker::new(60.0);
        let mut fired_ticks = Vec::new();
        let fired = ticker.tick(
            3.0 * ticker.interval_seconds(),
            |_| {},
            |e| fired_ticks.push(e.tick),
            |_| {},
        );
        assert_eq!(fired, 3);
        assert_eq!(fired_ticks, vec![1, 2, 3]);
    }

    #[test]
    fn alpha_is_always_in_unit_range() {
        let mut ticker = FixedTicker::new(60.0);
        ticker.tick(0.1, |_| {}, |_| {}, |_| {});
        let alpha = ticker.alpha();
        assert!((0.0..1.0).contains(&alpha), "alpha={alpha} out of range");
    }

    #[test]
    fn catchup_scenario_fires_six_ticks_for_100ms_at_60hz() {
        let mut ticker = FixedTicker::new(60.0);
        let fired = ticker.tick(0.1, |_| {}, |_| {}, |_| {});
        assert_eq!(fired, 6);
        assert!(ticker.alpha() < 0.01);
    }

    #[test]
    fn catchup_cap_bounds_runaway_pause() {
        let mut ticker = FixedTicker::new(60.0);
        // a multi-second stall should never fire more than the cap in one call
        let fired = ticker.tick(5.0, |_| {}, |_| {}, |_| {});
        assert_eq!(fired, MAX_CATCHUP_TICKS);
    }

    #[test]
    fn pre_tick_and_post_tick_fire_once_per_tick_in_order() {
        let mut ticker = FixedTicker::new(60.0);
        let mut order = Vec::new();
        ticker.tick(
            ticker.interval_seconds(),
            |_| order.push("pre"),
            |_| order.push("tick"),
            |_| order.push("post"),
        );
        assert_eq!(order, vec!["pre", "tick", "post"]);
    }

    #[test]
    fn sub_interval_dt_fires_nothing_and_accumulates() {
        let mut ticker = FixedTicker::new(60.0);
        let fired = ticker.tick(ticker.interval_seconds() * 0.5, |_| {}, |_| {}, |_| {});
        assert_eq!(fired, 0);
        assert!(ticker.alpha() > 0.0);
    }
}
