//! Flowstate Server Edge
//!
//! The Server Edge mediates communication between Game Clients and the
//! Simulation Core. It owns:
//! - Session management (DM-0008)
//! - Input validation and buffering
//! - TargetTickFloor computation (ADR-0006)
//! - AppliedInput → StepInput conversion
//! - Replay recording
//!
//! # Architecture (INV-0003, INV-0004)
//!
//! The Server Edge performs all I/O on behalf of the Game Server Instance.
//! The Simulation Core is invoked only with StepInput and produces Snapshots.
//!
//! # References
//!
//! - INV-0003: Authoritative Simulation
//! - INV-0004: Simulation Core Isolation
//! - INV-0005: Tick-Indexed I/O Contract
//! - ADR-0005: v0 Networking Architecture
//! - ADR-0006: Input Tick Targeting
//! - DM-0011: Server Edge

#![deny(unsafe_code)]

pub mod input_buffer;
pub mod network;
pub mod network_error;
pub mod peer;
pub mod priority;
pub mod session;
pub mod validation;

pub use network::{ServerNetwork, ServerNetworkConfig};
pub use network_error::ServerNetworkError;
pub use peer::{PeerMetadata, PeerState};
pub use priority::{Priority, PriorityQueue, QueuedMessage};

use std::collections::HashMap;

use flowstate_replay::{AppliedInput, BuildFingerprintData, ReplayConfig, ReplayRecorder};
use flowstate_sim::{Baseline, PlayerId, Snapshot, StepInput, Tick, World};
use flowstate_wire::{InputCmdProto, JoinBaseline, ReplayArtifact, ServerWelcome, SnapshotProto};
use input_buffer::InputBuffer;
use session::{Session, SessionId};
use validation::{ValidationConfig, ValidationResult, validate_input};

// ============================================================================
// v0 Parameters (from docs/networking/v0-parameters.md)
// ============================================================================

/// v0 tick rate in Hz.
pub const TICK_RATE_HZ: u32 = 60;

/// Maximum ticks ahead a client can target.
pub const MAX_FUTURE_TICKS: u64 = 120;

/// TargetTickFloor lead.
pub const INPUT_LEAD_TICKS: u64 = 1;

/// Input rate limit per second.
pub const INPUT_RATE_LIMIT_PER_SEC: u32 = 120;

/// Match duration in ticks.
pub const MATCH_DURATION_TICKS: u64 = 3600;

/// Connection timeout in milliseconds.
pub const CONNECT_TIMEOUT_MS: u64 = 30000;

// ============================================================================
// Match End Reason
// ============================================================================

/// Reason for match termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    Complete,
    Disconnect,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Disconnect => "disconnect",
        }
    }
}

// ============================================================================
// Server State
// ============================================================================

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub seed: u64,
    pub tick_rate_hz: u32,
    pub max_future_ticks: u64,
    pub input_lead_ticks: u64,
    pub input_rate_limit_per_sec: u32,
    pub match_duration_ticks: u64,
    pub connect_timeout_ms: u64,
    pub test_mode: bool,
    pub test_player_ids: Option<(PlayerId, PlayerId)>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            tick_rate_hz: TICK_RATE_HZ,
            max_future_ticks: MAX_FUTURE_TICKS,
            input_lead_ticks: INPUT_LEAD_TICKS,
            input_rate_limit_per_sec: INPUT_RATE_LIMIT_PER_SEC,
            match_duration_ticks: MATCH_DURATION_TICKS,
            connect_timeout_ms: CONNECT_TIMEOUT_MS,
            test_mode: false,
            test_player_ids: None,
        }
    }
}

/// Server state for running a match.
pub struct Server {
    config: ServerConfig,
    world: World,
    sessions: HashMap<SessionId, Session>,
    next_session_id: SessionId,
    /// PlayerId → SessionId mapping
    player_sessions: HashMap<PlayerId, SessionId>,
    /// SessionId → PlayerId mapping (for convenience)
    session_players: HashMap<SessionId, PlayerId>,
    /// Input buffer per (player_id, tick)
    input_buffer: InputBuffer,
    /// Last known intent per player
    last_known_intent: HashMap<PlayerId, [f64; 2]>,
    /// Last emitted target tick floor per session
    last_emitted_floor: HashMap<SessionId, Tick>,
    /// Replay recorder
    replay_recorder: ReplayRecorder,
    /// Entity spawn order (player_ids in order)
    entity_spawn_order: Vec<PlayerId>,
    /// Player → Entity mapping
    player_entity_mapping: HashMap<PlayerId, flowstate_sim::EntityId>,
    /// Initial tick (set after match starts)
    initial_tick: Tick,
    /// Match started flag
    match_started: bool,
    /// Build fingerprint
    build_fingerprint: Option<BuildFingerprintData>,
}

impl Server {
    /// Create a new server with the given configuration.
    pub fn new(config: ServerConfig) -> Self {
        let validation_config = ValidationConfig {
            max_future_ticks: config.max_future_ticks,
            input_rate_limit_per_sec: config.input_rate_limit_per_sec,
            tick_rate_hz: config.tick_rate_hz,
        };

        let replay_config = ReplayConfig {
            seed: config.seed,
            tick_rate_hz: config.tick_rate_hz,
            rng_algorithm: "none".to_string(),
            test_mode: config.test_mode,
            test_player_ids: config
                .test_player_ids
                .map(|(a, b)| vec![a, b])
                .unwrap_or_default(),
        };

        Self {
            world: World::new(config.seed, config.tick_rate_hz),
            sessions: HashMap::new(),
            next_session_id: 1,
            player_sessions: HashMap::new(),
            session_players: HashMap::new(),
            input_buffer: InputBuffer::new(validation_config),
            last_known_intent: HashMap::new(),
            last_emitted_floor: HashMap::new(),
            replay_recorder: ReplayRecorder::new(replay_config),
            entity_spawn_order: Vec::new(),
            player_entity_mapping: HashMap::new(),
            initial_tick: 0,
            match_started: false,
            build_fingerprint: None,
            config,
        }
    }

    /// Set the build fingerprint.
    pub fn set_build_fingerprint(&mut self, fingerprint: BuildFingerprintData) {
        self.build_fingerprint = Some(fingerprint.clone());
        self.replay_recorder.set_build_fingerprint(fingerprint);
    }

    /// Get current tick.
    pub fn current_tick(&self) -> Tick {
        self.world.tick()
    }

    /// Get number of connected sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Check if server is ready to start (enough sessions connected).
    /// Used for external timeout enforcement (T0.16).
    pub fn is_ready_to_start(&self) -> bool {
        self.sessions.len() >= 2
    }

    /// Accept a new session (client connected).
    /// Returns (session_id, assigned_player_id, controlled_entity_id).
    ///
    /// # Panics
    /// If more than 2 sessions try to connect (v0 limit).
    pub fn accept_session(&mut self) -> (SessionId, PlayerId, flowstate_sim::EntityId) {
        assert!(self.sessions.len() < 2, "v0: Only 2 sessions allowed");
        assert!(
            !self.match_started,
            "Cannot accept sessions after match start"
        );

        let session_id = self.next_session_id;
        self.next_session_id += 1;

        // Assign player ID
        let player_id = if let Some((id1, id2)) = self.config.test_player_ids {
            // Test mode: use configured IDs
            if self.sessions.is_empty() { id1 } else { id2 }
        } else {
            // Normal mode: 0 for first, 1 for second
            self.sessions.len() as PlayerId
        };

        // Spawn character
        let entity_id = self.world.spawn_character(player_id);

        // Create session
        let session = Session::new(session_id, player_id, entity_id);
        self.sessions.insert(session_id, session);
        self.player_sessions.insert(player_id, session_id);
        self.session_players.insert(session_id, player_id);

        // Record spawn order
        self.entity_spawn_order.push(player_id);
        self.player_entity_mapping.insert(player_id, entity_id);
        self.replay_recorder.record_spawn(player_id, entity_id);

        // Initialize last known intent
        self.last_known_intent.insert(player_id, [0.0, 0.0]);

        (session_id, player_id, entity_id)
    }

    /// Start the match (after 2 clients connected).
    /// Returns the initial baseline and ServerWelcome data for each session.
    pub fn start_match(&mut self) -> (Baseline, Vec<(SessionId, ServerWelcome)>) {
        assert_eq!(
            self.sessions.len(),
            2,
            "Need exactly 2 sessions to start match"
        );
        assert!(!self.match_started, "Match already started");

        self.match_started = true;
        self.initial_tick = self.world.tick();

        // Record baseline
        let baseline = self.world.baseline();
        self.replay_recorder.record_baseline(baseline.clone());

        // Compute initial target tick floor
        let target_tick_floor = self.initial_tick + self.config.input_lead_ticks;

        // Initialize floor state for all sessions
        for &session_id in self.sessions.keys() {
            self.last_emitted_floor
                .insert(session_id, target_tick_floor);
        }

        // Create ServerWelcome for each session
        let welcomes: Vec<_> = self
            .sessions
            .values()
            .map(|session| {
                let welcome = ServerWelcome {
                    target_tick_floor,
                    tick_rate_hz: self.config.tick_rate_hz,
                    player_id: u32::from(session.player_id),
                    controlled_entity_id: session.controlled_entity_id,
                };
                (session.id, welcome)
            })
            .collect();

        (baseline, welcomes)
    }

    /// Check if match should end.
    pub fn should_end_match(&self) -> Option<EndReason> {
        if !self.match_started {
            return None;
        }

        // Check duration
        if self.world.tick() >= self.initial_tick + self.config.match_duration_ticks {
            return Some(EndReason::Complete);
        }

        None
    }

    /// Handle session disconnect.
    pub fn disconnect_session(&mut self, session_id: SessionId) {
        if let Some(session) = self.sessions.remove(&session_id) {
            self.player_sessions.remove(&session.player_id);
            self.session_players.remove(&session_id);
        }
    }

    /// Check if any session has disconnected.
    pub fn has_disconnect(&self) -> bool {
        // In v0, we check if we started with 2 and now have fewer
        self.match_started && self.sessions.len() < 2
    }

    /// Receive and buffer an input from a client.
    /// Returns validation result.
    pub fn receive_input(
        &mut self,
        session_id: SessionId,
        input: InputCmdProto,
    ) -> ValidationResult {
        // Pre-Welcome input drop
        if !self.match_started {
            return ValidationResult::DroppedPreWelcome;
        }

        // Get player_id for this session
        let Some(&player_id) = self.session_players.get(&session_id) else {
            return ValidationResult::DroppedUnknownSession;
        };

        // Get last emitted floor for this session
        let floor = self
            .last_emitted_floor
            .get(&session_id)
            .copied()
            .unwrap_or(0);

        // Validate input
        validate_input(
            &input,
            self.world.tick(),
            floor,
            &mut self.input_buffer,
            player_id,
        )
    }

    /// Process a single tick.
    /// Returns (snapshot, target_tick_floor, serialized_snapshot_bytes).
    ///
    /// The serialized bytes are identical for all sessions (T0.18).
    pub fn step(&mut self) -> (Snapshot, Tick, Vec<u8>) {
        let current_tick = self.world.tick();

        // Produce AppliedInput per player
        let mut applied_inputs: Vec<AppliedInput> = Vec::new();

        for &player_id in self.entity_spawn_order.iter() {
            let (move_dir, is_fallback) = self
                .input_buffer
                .take_input(player_id, current_tick)
                .map(|cmd| {
                    // Validate and normalize move_dir
                    let move_dir = if cmd.move_dir.len() == 2 {
                        [cmd.move_dir[0], cmd.move_dir[1]]
                    } else {
                        [0.0, 0.0]
                    };
                    (move_dir, false)
                })
                .unwrap_or_else(|| {
                    // LastKnownIntent fallback
                    let lki = self
                        .last_known_intent
                        .get(&player_id)
                        .copied()
                        .unwrap_or([0.0, 0.0]);
                    (lki, true)
                });

            // Update last known intent
            self.last_known_intent.insert(player_id, move_dir);

            applied_inputs.push(AppliedInput {
                tick: current_tick,
                player_id,
                move_dir,
                is_fallback,
            });
        }

        // Record for replay
        for input in &applied_inputs {
            self.replay_recorder.record_input(input.clone());
        }

        // Convert to StepInput (sorted by player_id)
        let mut step_inputs: Vec<StepInput> = applied_inputs
            .iter()
            .map(AppliedInput::to_step_input)
            .collect();
        step_inputs.sort_by_key(|i| i.player_id);

        // Advance world
        let snapshot = self.world.advance(current_tick, &step_inputs);

        // Compute new target tick floor (post-step tick + lead)
        let target_tick_floor = self.world.tick() + self.config.input_lead_ticks;

        // Update floor for all sessions
        for session_id in self.sessions.keys() {
            self.last_emitted_floor
                .insert(*session_id, target_tick_floor);
        }

        // Evict old buffered inputs
        self.input_buffer.evict_before(self.world.tick());

        // Serialize snapshot (identical for all sessions - T0.18)
        let snapshot_proto = SnapshotProto {
            tick: snapshot.tick,
            entities: snapshot
                .entities
                .iter()
                .map(|e| flowstate_wire::EntitySnapshotProto {
                    entity_id: e.entity_id,
                    position: e.position.to_vec(),
                    velocity: e.velocity.to_vec(),
                })
                .collect(),
            digest: snapshot.digest,
            target_tick_floor,
        };
        let snapshot_bytes = prost::Message::encode_to_vec(&snapshot_proto);

        (snapshot, target_tick_floor, snapshot_bytes)
    }

    /// Finalize the match and produce a replay artifact.
    pub fn finalize(self, end_reason: EndReason) -> ReplayArtifact {
        let final_digest = self.world.state_digest();
        let checkpoint_tick = self.world.tick();

        self.replay_recorder
            .finalize(final_digest, checkpoint_tick, end_reason.as_str())
    }

    /// Get the baseline for JoinBaseline message.
    pub fn baseline_proto(&self) -> JoinBaseline {
        let baseline = self.world.baseline();
        baseline.into()
    }

    /// Get all connected session IDs.
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions.keys().copied().collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
