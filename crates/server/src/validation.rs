//! Input validation for Server Edge.
//!
//! Ref: FS-0007 Validation Rules
//! - NaN/Inf in move_dir: DROP + LOG
//! - Magnitude > 1.0: CLAMP + LOG
//! - Tick below floor: DROP
//! - Tick non-monotonic: DROP
//! - Tick window violation: DROP
//! - Rate limit exceeded: DROP

use flowstate_sim::{PlayerId, Tick};
use flowstate_wire::InputCmdProto;

use crate::input_buffer::InputBuffer;

/// Validation configuration.
#[derive(Debug, Clone, Copy)]
pub struct ValidationConfig {
    pub max_future_ticks: u64,
    pub input_rate_limit_per_sec: u32,
    pub tick_rate_hz: u32,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_future_ticks: 120,
            input_rate_limit_per_sec: 120,
            tick_rate_hz: 60,
        }
    }
}

/// Result of input validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationResult {
    /// Input accepted and buffered.
    Accepted,
    /// Input accepted with magnitude clamped.
    AcceptedWithClamp,
    /// Dropped: NaN or Inf in move_dir.
    DroppedNanInf,
    /// Dropped: Tick below target tick floor.
    DroppedBelowFloor { tick: Tick, floor: Tick },
    /// Dropped: Tick is late (below current tick).
    DroppedLate { tick: Tick, current: Tick },
    /// Dropped: Tick is too far in future.
    DroppedTooFuture { tick: Tick, max: Tick },
    /// Dropped: Rate limit exceeded.
    DroppedRateLimit,
    /// Dropped: InputSeq tied for this (player, tick).
    DroppedInputSeqTie,
    /// Dropped: Received before ServerWelcome.
    DroppedPreWelcome,
    /// Dropped: Unknown session.
    DroppedUnknownSession,
}

impl ValidationResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted | Self::AcceptedWithClamp)
    }
}

/// Validate an input command.
///
/// # Arguments
/// * `input` - The input command to validate
/// * `current_tick` - Current server tick
/// * `target_tick_floor` - Last emitted target tick floor for this session
/// * `buffer` - Input buffer for rate limiting and InputSeq selection
/// * `player_id` - Player ID for this session (bound by Server Edge, not from input)
pub fn validate_input(
    input: &InputCmdProto,
    current_tick: Tick,
    target_tick_floor: Tick,
    buffer: &mut InputBuffer,
    player_id: PlayerId,
) -> ValidationResult {
    // Check for NaN/Inf
    if input.move_dir.len() != 2 {
        return ValidationResult::DroppedNanInf;
    }
    let (x, y) = (input.move_dir[0], input.move_dir[1]);
    if x.is_nan() || x.is_infinite() || y.is_nan() || y.is_infinite() {
        return ValidationResult::DroppedNanInf;
    }

    // Check tick below floor
    if input.tick < target_tick_floor {
        return ValidationResult::DroppedBelowFloor {
            tick: input.tick,
            floor: target_tick_floor,
        };
    }

    // Check tick is late
    if input.tick < current_tick {
        return ValidationResult::DroppedLate {
            tick: input.tick,
            current: current_tick,
        };
    }

    // Check tick is too far in future
    let max_tick = current_tick + buffer.config().max_future_ticks;
    if input.tick > max_tick {
        return ValidationResult::DroppedTooFuture {
            tick: input.tick,
            max: max_tick,
        };
    }

    // Check rate limit and buffer
    match buffer.try_buffer(player_id, input.clone()) {
        BufferResult::Accepted { clamped } => {
            if clamped {
                ValidationResult::AcceptedWithClamp
            } else {
                ValidationResult::Accepted
            }
        }
        BufferResult::RateLimited => ValidationResult::DroppedRateLimit,
        BufferResult::InputSeqTie => ValidationResult::DroppedInputSeqTie,
    }
}

/// Result of attempting to buffer an input.
#[derive(Debug, Clone, PartialEq)]
pub enum BufferResult {
    Accepted { clamped: bool },
    RateLimited,
    InputSeqTie,
}
