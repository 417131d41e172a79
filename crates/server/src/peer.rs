//! Per-peer state owned exclusively by [`crate::network::ServerNetwork`].
//!
//! Created on connect, destroyed on disconnect — nothing here survives a
//! peer's lifetime, and nothing about it is shared with other peers.

use std::collections::HashMap;

use flowstate_runtime::RateLimiter;

use crate::priority::PriorityQueue;

/// Free-form per-peer metadata (room assignment, display name, whatever a
/// game wants to stash alongside a connection) — the `mapping
/// string→any` from the spec, realized as JSON values since metadata
/// crosses from application code into diagnostics/logging contexts where
/// a concrete Rust type isn't known ahead of time.
pub type PeerMetadata = HashMap<String, serde_json::Value>;

/// Server-side state for one connected peer.
pub struct PeerState {
    pub last_sent_tick: u32,
    pub connected_at_ms: u64,
    pub metadata: PeerMetadata,
    pub rate_limiter: RateLimiter,
    pub send_queue: PriorityQueue,
    pub bytes_sent: u32,
    pub bandwidth_window_ms: u64,
    pub is_backpressured: bool,
    pub last_message_received_ms: u64,
    pub last_processed_client_tick: u32,
    pub last_heartbeat_sent_ms: u64,
}

impl PeerState {
    pub fn new(connected_at_ms: u64, max_messages_per_second: u32) -> Self {
        Self {
            last_sent_tick: 0,
            connected_at_ms,
            metadata: PeerMetadata::new(),
            rate_limiter: RateLimiter::new(max_messages_per_second),
            send_queue: PriorityQueue::new(),
            bytes_sent: 0,
            bandwidth_window_ms: 0,
            is_backpressured: false,
            last_message_received_ms: connected_at_ms,
            last_processed_client_tick: 0,
            last_heartbeat_sent_ms: connected_at_ms,
        }
    }
}
