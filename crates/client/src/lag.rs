//! Artificial receive-side lag simulation.
//!
//! When configured, every message handed to [`crate::network::ClientNetwork`]
//! is delayed by a fixed or uniformly-random amount before its handlers run.
//! The raw bytes are copied into the delay queue up front so a transport
//! that reuses its receive buffer can't corrupt a still-pending message.

use rand::Rng;

/// Either a fixed delay or a `[min, max]` uniform range, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum LagSimulation {
    Fixed(u64),
    Range { min: u64, max: u64 },
}

impl LagSimulation {
    fn sample_delay_ms(&self) -> u64 {
        match *self {
            LagSimulation::Fixed(ms) => ms,
            LagSimulation::Range { min, max } => {
                if min >= max {
                    min
                } else {
                    rand::thread_rng().gen_range(min..=max)
                }
            }
        }
    }
}

struct Delayed {
    ready_at_ms: u64,
    bytes: Vec<u8>,
}

/// Queues received frames until their simulated arrival time.
#[derive(Default)]
pub struct LagQueue {
    config: Option<LagSimulation>,
    pending: Vec<Delayed>,
}

impl LagQueue {
    pub fn new(config: Option<LagSimulation>) -> Self {
        Self {
            config,
            pending: Vec::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.is_some()
    }

    /// Schedule `bytes` for delivery, or return it back immediately if no
    /// lag simulation is configured.
    pub fn admit(&mut self, bytes: Vec<u8>, now_ms: u64) -> Option<Vec<u8>> {
        match self.config {
            None => Some(bytes),
            Some(config) => {
                self.pending.push(Delayed {
                    ready_at_ms: now_ms + config.sample_delay_ms(),
                    bytes,
                });
                None
            }
        }
    }

    /// Drain every message whose simulated arrival time has passed,
    /// in the order they become ready (earliest-ready first).
    pub fn drain_ready(&mut self, now_ms: u64) -> Vec<Vec<u8>> {
        if self.pending.is_empty() {
            return Vec::new();
        }
        self.pending.sort_by_key(|d| d.ready_at_ms);
        let split = self.pending.partition_point(|d| d.ready_at_ms <= now_ms);
        self.pending
            .drain(0..split)
            .map(|d| d.bytes)
            .collect()
    }
}
