//! Loop drivers: the three ways a [`crate::ticker::FixedTicker`] gets fed
//! wall-clock time, matching how a server, a render loop, or an
//! I/O-sensitive service each want to be scheduled.
//!
//! `display-refresh` is host-pumped (a render loop calls `pump` once per
//! displayed frame) rather than thread-owned, since the host already has
//! its own frame callback. `immediate` and `timed` own a background
//! thread and an atomic running flag, the same shape the server's own
//! tick loop uses.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Common lifecycle surface across all driver variants.
pub trait LoopDriver {
    fn stop(&mut self);
    fn is_running(&self) -> bool;
}

/// Host-pumped driver for client render loops. The host calls `pump` once
/// per displayed frame; this driver never spawns a thread.
pub struct DisplayRefreshDriver {
    running: bool,
    last: Option<Instant>,
}

impl DisplayRefreshDriver {
    pub fn new() -> Self {
        Self {
            running: false,
            last: None,
        }
    }

    pub fn start(&mut self) {
        self.running = true;
        self.last = Some(Instant::now());
    }

    /// Call once per host frame callback. No-op if not started or after
    /// `stop()`.
    pub fn pump<F: FnMut(f64)>(&mut self, mut update: F) {
        if !self.running {
            return;
        }
        let now = Instant::now();
        let dt = self
            .last
            .map(|last| (now - last).as_secs_f64())
            .unwrap_or(0.0);
        self.last = Some(now);
        update(dt);
    }
}

impl Default for DisplayRefreshDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopDriver for DisplayRefreshDriver {
    fn stop(&mut self) {
        self.running = false;
    }

    fn is_running(&self) -> bool {
        self.running
    }
}

/// Reschedules itself as fast as possible: server maximum-throughput mode.
pub struct ImmediateDriver {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ImmediateDriver {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Spawn the loop thread, calling `update(dt_seconds)` every iteration
    /// until `stop()`. A no-op if already running.
    pub fn start<F>(&mut self, mut update: F)
    where
        F: FnMut(f64) + Send + 'static,
    {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let running = self.running.clone();
        self.handle = Some(thread::spawn(move || {
            let mut last = Instant::now();
            while running.load(Ordering::SeqCst) {
                let now = Instant::now();
                let dt = (now - last).as_secs_f64();
                last = now;
                update(dt);
                thread::yield_now();
            }
        }));
    }
}

impl Default for ImmediateDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopDriver for ImmediateDriver {
    fn stop(&mut self) {
        if self.running.swap(false, Ordering::SeqCst) {
            if let Some(handle) = self.handle.take() {
                let _ = handle.join();
            }
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Reschedules after a fixed short delay (~1ms default) between
/// iterations: server mode that stays responsive to other I/O on the same
/// thread pool instead of spinning.
pub struct TimedDriver {
    delay: Duration,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TimedDriver {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    pub fn start<F>(&mut self, mut update: F)
    where
        F: FnMut(f64) + Send + 'static,
    {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let running = self.running.clone();
        let delay = self.delay;
        self.handle = Some(thread::spawn(move || {
            let mut last = Instant::now();
            while running.load(Ordering::SeqCst) {
                let now = Instant::now();
                let dt = (now - last).as_secs_f64();
                last = now;
                update(dt);
                thread::sleep(delay);
            }
        }));
    }
}

impl LoopDriver for TimedDriver {
    fn stop(&mut self) {
        if self.running.swap(false, Ordering::SeqCst) {
            if let Some(handle) = self.handle.take() {
                let _ = handle.join();
            }
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
