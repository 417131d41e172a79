//! `ServerNetwork`: the generic peer manager described by this workspace's
//! networking core — peer lifecycle, intent/rpc dispatch, snapshot
//! broadcast with interest-management customization, the per-peer
//! priority send-queue, and the heartbeat watchdog.
//!
//! This is distinct from [`crate::Server`], which is the teacher's kept
//! two-player movement match glue: `Server` is a worked example of a
//! caller sitting *on top of* `ServerNetwork`/`IntentRegistry`, not part
//! of the generic core itself.
//!
//! # Egress model
//!
//! The spec describes a branch: send directly via the transport when a
//! peer's queue is empty and it isn't backpressured, otherwise enqueue a
//! private copy. This implementation always enqueues first and then
//! immediately attempts a flush — behaviorally identical (a send to an
//! unblocked peer with an empty queue flushes on the same call, and a
//! backpressured peer never reaches `Transport::send`) but it collapses
//! two code paths into one and means the "queued messages own private
//! copies, pooled wrappers release immediately after enqueue" invariant
//! from the concurrency model holds unconditionally rather than only on
//! one branch.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use flowstate_codec::MessageWrapperPool;
use flowstate_protocol::{frame, frame_heartbeat, parse, IntentRegistry, MessageType, ProtocolError, RpcRegistry, SnapshotRegistry};
use flowstate_runtime::{PeerId, ServerTransport, Transport};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::network_error::ServerNetworkError;
use crate::peer::{PeerMetadata, PeerState};
use crate::priority::{Priority, QueuedMessage};

/// Messages popped from one peer's send queue per `flush` pass.
const FLUSH_CAP: usize = 10;

/// Every configuration knob from the spec's external-interfaces table,
/// serde-derived so an external binary can load it from a config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerNetworkConfig {
    pub max_message_size: usize,
    pub max_messages_per_second: u32,
    pub max_send_queue_size: usize,
    pub heartbeat_interval_ms: u64,
    pub heartbeat_timeout_ms: u64,
    pub enable_buffer_pooling: bool,
    pub debug: bool,
}

impl Default for ServerNetworkConfig {
    fn default() -> Self {
        Self {
            max_message_size: 65536,
            max_messages_per_second: 100,
            max_send_queue_size: 100,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 60_000,
            enable_buffer_pooling: true,
            debug: false,
        }
    }
}

pub type HandlerId = u64;

type IntentDispatch = Box<dyn FnMut(&PeerId, &[u8], &IntentRegistry) + Send>;
type RpcDispatch = Box<dyn FnMut(&PeerId, &[u8], &RpcRegistry) + Send>;
type LifecycleHandler = Box<dyn FnMut(&PeerId) + Send>;

/// Generic server-side peer manager. `X` is the concrete transport the
/// host wires in; `Snap` is the application's single snapshot update
/// payload type (interest management customizes per-peer *values* of
/// `Snap`, not the type itself — see `SnapshotRegistry`'s doc comment).
pub struct ServerNetwork<X: ServerTransport, Snap> {
    transport: X,
    config: ServerNetworkConfig,
    peers: HashMap<PeerId, PeerState>,
    peer_snapshot_registries: HashMap<PeerId, Arc<SnapshotRegistry<Snap>>>,
    default_snapshot_registry: Option<Arc<SnapshotRegistry<Snap>>>,
    intent_registry: IntentRegistry,
    rpc_registry: RpcRegistry,
    wrapper_pool: MessageWrapperPool,
    intent_handlers: HashMap<u8, Vec<(HandlerId, IntentDispatch)>>,
    rpc_handlers: HashMap<String, Vec<(HandlerId, RpcDispatch)>>,
    connection_handlers: Vec<(HandlerId, LifecycleHandler)>,
    disconnection_handlers: Vec<(HandlerId, LifecycleHandler)>,
    next_handler_id: HandlerId,
    last_heartbeat_sweep_ms: u64,
}

impl<X: ServerTransport, Snap: Send + Sync + 'static> ServerNetwork<X, Snap> {
    pub fn new(transport: X, config: ServerNetworkConfig) -> Self {
        Self {
            transport,
            config,
            peers: HashMap::new(),
            peer_snapshot_registries: HashMap::new(),
            default_snapshot_registry: None,
            intent_registry: IntentRegistry::new(),
            rpc_registry: RpcRegistry::new(),
            wrapper_pool: MessageWrapperPool::new(),
            intent_handlers: HashMap::new(),
            rpc_handlers: HashMap::new(),
            connection_handlers: Vec::new(),
            disconnection_handlers: Vec::new(),
            next_handler_id: 0,
            last_heartbeat_sweep_ms: 0,
        }
    }

    pub fn config(&self) -> &ServerNetworkConfig {
        &self.config
    }

    pub fn intent_registry_mut(&mut self) -> &mut IntentRegistry {
        &mut self.intent_registry
    }

    pub fn rpc_registry_mut(&mut self) -> &mut RpcRegistry {
        &mut self.rpc_registry
    }

    /// Set the registry used for peers that connect without an explicit
    /// per-peer registry. Shared by `Arc`, matching the common case from
    /// the design notes: identical schema across peers, only the
    /// `peer → registry` index needs per-peer allocation.
    pub fn set_default_snapshot_registry(&mut self, registry: Arc<SnapshotRegistry<Snap>>) {
        self.default_snapshot_registry = Some(registry);
    }

    /// Install a registry for one peer, overriding the default — the
    /// escape hatch for genuine fog-of-war divergence where a peer's
    /// schema is not just a customized value but a different shape.
    pub fn set_peer_snapshot_registry(&mut self, peer_id: &PeerId, registry: Arc<SnapshotRegistry<Snap>>) {
        self.peer_snapshot_registries.insert(peer_id.clone(), registry);
    }

    pub fn peer_ids(&self) -> Vec<PeerId> {
        self.peers.keys().cloned().collect()
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn is_backpressured(&self, peer_id: &PeerId) -> bool {
        self.peers.get(peer_id).is_some_and(|p| p.is_backpressured)
    }

    pub fn send_queue_len(&self, peer_id: &PeerId) -> usize {
        self.peers.get(peer_id).map(|p| p.send_queue.len()).unwrap_or(0)
    }

    pub fn peer_metadata_mut(&mut self, peer_id: &PeerId) -> Option<&mut PeerMetadata> {
        self.peers.get_mut(peer_id).map(|p| &mut p.metadata)
    }

    fn next_id(&mut self) -> HandlerId {
        let id = self.next_handler_id;
        self.next_handler_id += 1;
        id
    }

    // -- registration -----------------------------------------------------

    /// Attach a handler (and optional validator) for intents of `kind`.
    /// Multiple handlers may share a `kind`; all run in registration
    /// order. A validator returning `false` drops the intent before any
    /// handler sees it, and is logged, not propagated.
    pub fn on_intent<T, H, V>(&mut self, kind: u8, mut handler: H, validator: Option<V>) -> HandlerId
    where
        T: Any + Send + Sync + Default + 'static,
        H: FnMut(&PeerId, T) + Send + 'static,
        V: Fn(&PeerId, &T) -> bool + Send + 'static,
    {
        let id = self.next_id();
        let dispatch: IntentDispatch = Box::new(move |peer_id, body, registry| {
            match registry.decode::<T>(body) {
                Ok((_, intent)) => {
                    if let Some(validator) = &validator {
                        if !validator(peer_id, &intent) {
                            debug!(peer = %peer_id, kind, "intent validator rejected, dropping");
                            return;
                        }
                    }
                    handler(peer_id, intent);
                }
                Err(err) => warn!(peer = %peer_id, kind, error = %err, "failed to decode intent"),
            }
        });
        self.intent_handlers.entry(kind).or_default().push((id, dispatch));
        id
    }

    pub fn off_intent(&mut self, kind: u8, id: HandlerId) -> bool {
        remove_handler(self.intent_handlers.get_mut(&kind), id)
    }

    /// Attach a handler for rpc calls to `method`. `method` must
    /// eventually be registered on `rpc_registry_mut()`; handlers may be
    /// attached before or after that registration.
    pub fn on_rpc<T, H>(&mut self, method: &str, mut handler: H) -> HandlerId
    where
        T: Any + Send + Sync + Default + 'static,
        H: FnMut(&PeerId, T) + Send + 'static,
    {
        let id = self.next_id();
        let method_owned = method.to_string();
        let dispatch: RpcDispatch = Box::new(move |peer_id, body, registry| {
            match registry.decode::<T>(body) {
                Ok((_, value)) => handler(peer_id, value),
                Err(err) => warn!(peer = %peer_id, method = %method_owned, error = %err, "failed to decode rpc"),
            }
        });
        self.rpc_handlers.entry(method.to_string()).or_default().push((id, dispatch));
        id
    }

    pub fn off_rpc(&mut self, method: &str, id: HandlerId) -> bool {
        remove_handler(self.rpc_handlers.get_mut(method), id)
    }

    pub fn on_connection<H>(&mut self, handler: H) -> HandlerId
    where
        H: FnMut(&PeerId) + Send + 'static,
    {
        let id = self.next_id();
        self.connection_handlers.push((id, Box::new(handler)));
        id
    }

    pub fn off_connection(&mut self, id: HandlerId) -> bool {
        remove_handler(Some(&mut self.connection_handlers), id)
    }

    pub fn on_disconnection<H>(&mut self, handler: H) -> HandlerId
    where
        H: FnMut(&PeerId) + Send + 'static,
    {
        let id = self.next_id();
        self.disconnection_handlers.push((id, Box::new(handler)));
        id
    }

    pub fn off_disconnection(&mut self, id: HandlerId) -> bool {
        remove_handler(Some(&mut self.disconnection_handlers), id)
    }

    // -- ingress ----------------------------------------------------------

    /// Drain connects, messages, and disconnects from the transport, and
    /// run the heartbeat sweep. Intended to be called once per tick phase
    /// (or once per loop-driver iteration for an immediate/timed driver).
    pub fn poll(&mut self, now_ms: u64) {
        for peer_id in self.transport.poll_connects() {
            self.peers.insert(
                peer_id.clone(),
                PeerState::new(now_ms, self.config.max_messages_per_second),
            );
            if let Some(registry) = &self.default_snapshot_registry {
                self.peer_snapshot_registries.insert(peer_id.clone(), registry.clone());
            }
            run_lifecycle_handlers(&mut self.connection_handlers, &peer_id);
        }

        let ids: Vec<PeerId> = self.peers.keys().cloned().collect();
        for peer_id in ids {
            let messages = match self.transport.peer_mut(&peer_id) {
                Some(conn) => conn.poll_messages(),
                None => continue,
            };
            for bytes in messages {
                self.handle_message(&peer_id, &bytes, now_ms);
            }
            self.flush_peer(&peer_id);
        }

        self.heartbeat_sweep(now_ms);

        for peer_id in self.transport.poll_disconnects() {
            self.remove_peer(&peer_id);
        }
    }

    fn handle_message(&mut self, peer_id: &PeerId, bytes: &[u8], now_ms: u64) {
        if let Some(peer) = self.peers.get_mut(peer_id) {
            peer.last_message_received_ms = now_ms;
        }

        if bytes.is_empty() || bytes.len() > self.config.max_message_size {
            warn!(peer = %peer_id, len = bytes.len(), "dropping oversized or empty frame");
            return;
        }

        let (message_type, body) = match parse(bytes) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(peer = %peer_id, error = %err, "dropping unparsable frame");
                return;
            }
        };

        match message_type {
            MessageType::Intent => {
                let allowed = self
                    .peers
                    .get_mut(peer_id)
                    .map(|p| p.rate_limiter.check(now_ms))
                    .unwrap_or(false);
                if !allowed {
                    debug!(peer = %peer_id, "intent rate-limited, dropping");
                    return;
                }
                self.dispatch_intent(peer_id, body);
            }
            MessageType::CustomRpc => self.dispatch_rpc(peer_id, body),
            MessageType::Heartbeat => {}
            MessageType::Snapshot => {
                warn!(peer = %peer_id, "server received a client-bound snapshot message, dropping");
            }
        }
    }

    fn dispatch_intent(&mut self, peer_id: &PeerId, body: &[u8]) {
        let Some(&kind) = body.first() else {
            warn!(peer = %peer_id, "empty intent body");
            return;
        };
        let Self {
            intent_handlers,
            intent_registry,
            ..
        } = self;
        match intent_handlers.get_mut(&kind) {
            Some(handlers) if !handlers.is_empty() => {
                for (_, handler) in handlers.iter_mut() {
                    handler(peer_id, body, intent_registry);
                }
            }
            _ => warn!(peer = %peer_id, kind, "no handler registered for intent kind"),
        }
    }

    fn dispatch_rpc(&mut self, peer_id: &PeerId, body: &[u8]) {
        if body.len() < 2 {
            warn!(peer = %peer_id, "rpc body shorter than method id");
            return;
        }
        let method_id = u16::from_le_bytes([body[0], body[1]]);
        let Self {
            rpc_handlers,
            rpc_registry,
            ..
        } = self;
        let Some(name) = rpc_registry.method_name(method_id) else {
            warn!(peer = %peer_id, method_id, "unknown rpc method id");
            return;
        };
        match rpc_handlers.get_mut(name) {
            Some(handlers) if !handlers.is_empty() => {
                for (_, handler) in handlers.iter_mut() {
                    handler(peer_id, body, rpc_registry);
                }
            }
            _ => warn!(peer = %peer_id, method = name, "no handler registered for rpc method"),
        }
    }

    // -- egress -------------------------------------------------------------

    /// Encode `updates` under `name`, frame it, enqueue it on `peer_id`'s
    /// send queue (respecting priority ordering and the queue size cap),
    /// then immediately attempt a flush.
    pub fn send_snapshot_to_peer(
        &mut self,
        peer_id: &PeerId,
        name: &str,
        tick: u32,
        updates: &Snap,
        priority: Priority,
        now_ms: u64,
    ) -> Result<(), ServerNetworkError> {
        let registry = self
            .peer_snapshot_registries
            .get(peer_id)
            .cloned()
            .ok_or_else(|| {
                ServerNetworkError::NotRegistered(ProtocolError::NotRegistered {
                    namespace: "snapshot",
                    key: name.to_string(),
                })
            })?;
        let body = registry.encode(name, tick, updates)?;
        let framed = frame(&mut self.wrapper_pool, MessageType::Snapshot, &body);
        let bytes = framed.as_bytes().to_vec();
        self.wrapper_pool.release(framed);

        let max_queue = self.config.max_send_queue_size;
        let peer = self
            .peers
            .get_mut(peer_id)
            .ok_or_else(|| ServerNetworkError::UnknownPeer(peer_id.clone()))?;
        peer.send_queue.enqueue(
            QueuedMessage {
                bytes,
                priority,
                enqueued_at_ms: now_ms,
            },
            max_queue,
        );
        peer.last_sent_tick = tick;

        self.flush_peer(peer_id);
        Ok(())
    }

    /// Broadcast the same encoded snapshot to every connected peer
    /// matching `filter`.
    pub fn broadcast_snapshot<F>(
        &mut self,
        name: &str,
        tick: u32,
        updates: &Snap,
        priority: Priority,
        now_ms: u64,
        mut filter: F,
    ) -> Vec<(PeerId, Result<(), ServerNetworkError>)>
    where
        F: FnMut(&PeerId) -> bool,
    {
        let ids: Vec<PeerId> = self.peers.keys().filter(|id| filter(id)).cloned().collect();
        ids.into_iter()
            .map(|id| {
                let result = self.send_snapshot_to_peer(&id, name, tick, updates, priority, now_ms);
                (id, result)
            })
            .collect()
    }

    /// Interest-management broadcast: `customize(peer_id, base)` produces
    /// each peer's own view (fog-of-war, proximity filtering) before it is
    /// encoded and sent.
    pub fn broadcast_snapshot_with_customization<C>(
        &mut self,
        name: &str,
        tick: u32,
        base: &Snap,
        priority: Priority,
        now_ms: u64,
        mut customize: C,
    ) -> Vec<(PeerId, Result<(), ServerNetworkError>)>
    where
        C: FnMut(&PeerId, &Snap) -> Snap,
    {
        let ids: Vec<PeerId> = self.peers.keys().cloned().collect();
        ids.into_iter()
            .map(|id| {
                let customized = customize(&id, base);
                let result = self.send_snapshot_to_peer(&id, name, tick, &customized, priority, now_ms);
                (id, result)
            })
            .collect()
    }

    /// Pop up to [`FLUSH_CAP`] queued messages and send them, in
    /// priority-then-FIFO order, breaking early if backpressure
    /// reasserts. A no-op while `is_backpressured` is already set — the
    /// flag only clears on an explicit successful send, never merely
    /// because the queue drained, which is intentional per the design
    /// notes (it is a "slow peer" heuristic, not just a queue-depth one).
    fn flush_peer(&mut self, peer_id: &PeerId) {
        let Self { peers, transport, .. } = self;
        let Some(peer) = peers.get_mut(peer_id) else {
            return;
        };
        if peer.is_backpressured || peer.send_queue.is_empty() {
            return;
        }
        let Some(conn) = transport.peer_mut(peer_id) else {
            return;
        };

        let batch = peer.send_queue.pop_up_to(FLUSH_CAP);
        let mut popped = batch.into_iter();
        for message in popped.by_ref() {
            match conn.send(&message.bytes) {
                Ok(()) => peer.is_backpressured = false,
                Err(_) => {
                    peer.is_backpressured = true;
                    peer.send_queue.enqueue(message, usize::MAX);
                    break;
                }
            }
        }
        // Anything still sitting in `popped` was already taken out of the
        // queue by `pop_up_to` but never attempted — a send failure above
        // must not make these vanish, so the whole untried tail goes back.
        for remaining in popped {
            peer.send_queue.enqueue(remaining, usize::MAX);
        }
    }

    // -- heartbeats ---------------------------------------------------------

    fn heartbeat_sweep(&mut self, now_ms: u64) {
        if self.config.heartbeat_interval_ms == 0 {
            return;
        }
        if now_ms.saturating_sub(self.last_heartbeat_sweep_ms) < self.config.heartbeat_interval_ms {
            return;
        }
        self.last_heartbeat_sweep_ms = now_ms;

        let ids: Vec<PeerId> = self.peers.keys().cloned().collect();
        for peer_id in ids {
            let timed_out = self.peers.get(&peer_id).is_some_and(|p| {
                now_ms.saturating_sub(p.last_message_received_ms) > self.config.heartbeat_timeout_ms
            });
            if timed_out {
                warn!(peer = %peer_id, "heartbeat timeout, closing peer transport");
                if let Some(conn) = self.transport.peer_mut(&peer_id) {
                    conn.close();
                }
                continue;
            }

            let framed = frame_heartbeat(&mut self.wrapper_pool);
            let bytes = framed.as_bytes().to_vec();
            self.wrapper_pool.release(framed);
            if let Some(conn) = self.transport.peer_mut(&peer_id) {
                match conn.send(&bytes) {
                    Ok(()) => {
                        if let Some(peer) = self.peers.get_mut(&peer_id) {
                            peer.last_heartbeat_sent_ms = now_ms;
                        }
                    }
                    Err(_) => {
                        if let Some(peer) = self.peers.get_mut(&peer_id) {
                            peer.is_backpressured = true;
                        }
                    }
                }
            }
        }
    }

    fn remove_peer(&mut self, peer_id: &PeerId) {
        if self.peers.remove(peer_id).is_some() {
            self.peer_snapshot_registries.remove(peer_id);
            run_lifecycle_handlers(&mut self.disconnection_handlers, peer_id);
        }
    }
}

fn run_lifecycle_handlers(handlers: &mut [(HandlerId, LifecycleHandler)], peer_id: &PeerId) {
    for (_, handler) in handlers.iter_mut() {
        if catch_unwind(AssertUnwindSafe(|| handler(peer_id))).is_err() {
            warn!(peer = %peer_id, "lifecycle handler panicked, continuing");
        }
    }
}

fn remove_handler<V>(handlers: Option<&mut Vec<(HandlerId, V)>>, id: HandlerId) -> bool {
    match handlers {
        Some(handlers) => {
            let before = handlers.len();
            handlers.retain(|(existing, _)| *existing != id);
            handlers.len() != before
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowstate_codec::{Schema, U32Field, U8Field};
    use flowstate_runtime::{LoopbackTransport, Transport as _};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Minimal in-memory `ServerTransport` for exercising `ServerNetwork`
    /// without a real socket: peers are admitted by calling `connect`,
    /// each backed by one half of a `LoopbackTransport::pair`.
    struct TestTransport {
        pending_connects: VecDeque<PeerId>,
        pending_disconnects: VecDeque<PeerId>,
        peers: HashMap<PeerId, LoopbackTransport>,
    }

    impl TestTransport {
        fn new() -> Self {
            Self {
                pending_connects: VecDeque::new(),
                pending_disconnects: VecDeque::new(),
                peers: HashMap::new(),
            }
        }

        fn connect(&mut self, peer_id: &str) -> LoopbackTransport {
            let (client_side, server_side) = LoopbackTransport::pair();
            self.peers.insert(peer_id.to_string(), server_side);
            self.pending_connects.push_back(peer_id.to_string());
            client_side
        }

        fn disconnect(&mut self, peer_id: &str) {
            if let Some(mut conn) = self.peers.remove(peer_id) {
                conn.close();
            }
            self.pending_disconnects.push_back(peer_id.to_string());
        }
    }

    impl ServerTransport for TestTransport {
        fn poll_connects(&mut self) -> Vec<PeerId> {
            self.pending_connects.drain(..).collect()
        }

        fn poll_disconnects(&mut self) -> Vec<PeerId> {
            self.pending_disconnects.drain(..).collect()
        }

        fn peer(&self, peer_id: &PeerId) -> Option<&dyn Transport> {
            self.peers.get(peer_id).map(|p| p as &dyn Transport)
        }

        fn peer_mut(&mut self, peer_id: &PeerId) -> Option<&mut dyn Transport> {
            self.peers.get_mut(peer_id).map(|p| p as &mut dyn Transport)
        }

        fn peer_ids(&self) -> Vec<PeerId> {
            self.peers.keys().cloned().collect()
        }
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Move {
        kind: u8,
        tick: u32,
        dx: u32,
    }

    fn move_schema() -> Schema<Move> {
        Schema::builder()
            .field("kind", U8Field, |m: &Move| &m.kind, |m, v| m.kind = v)
            .field(
                "tick",
                U32Field::little_endian(),
                |m: &Move| &m.tick,
                |m, v| m.tick = v,
            )
            .field(
                "dx",
                U32Field::little_endian(),
                |m: &Move| &m.dx,
                |m, v| m.dx = v,
            )
            .build()
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    struct PlayerSnapshot {
        score: u32,
    }

    fn snapshot_schema() -> Schema<PlayerSnapshot> {
        Schema::builder()
            .field(
                "score",
                U32Field::little_endian(),
                |p: &PlayerSnapshot| &p.score,
                |p, v| p.score = v,
            )
            .build()
    }

    fn new_network() -> (ServerNetwork<TestTransport, PlayerSnapshot>, Arc<SnapshotRegistry<PlayerSnapshot>>) {
        let mut config = ServerNetworkConfig::default();
        config.heartbeat_interval_ms = 100;
        config.heartbeat_timeout_ms = 300;
        let network = ServerNetwork::new(TestTransport::new(), config);
        let mut registry = SnapshotRegistry::new();
        registry.register("players", snapshot_schema()).unwrap();
        (network, Arc::new(registry))
    }

    #[test]
    fn connection_handler_fires_on_poll() {
        let (mut network, registry) = new_network();
        network.set_default_snapshot_registry(registry);
        let seen: Arc<Mutex<Vec<PeerId>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_in = seen.clone();
        network.on_connection(move |peer_id| seen_in.lock().unwrap().push(peer_id.clone()));

        let _client = network.transport.connect("p1");
        network.poll(0);

        assert_eq!(*seen.lock().unwrap(), vec!["p1".to_string()]);
        assert_eq!(network.peer_count(), 1);
    }

    #[test]
    fn intent_round_trips_to_the_registered_handler() {
        let (mut network, registry) = new_network();
        network.set_default_snapshot_registry(registry);
        network.intent_registry_mut().register(1, move_schema()).unwrap();

        let received: Arc<Mutex<Vec<Move>>> = Arc::new(Mutex::new(Vec::new()));
        let received_in = received.clone();
        network.on_intent::<Move, _, fn(&PeerId, &Move) -> bool>(
            1,
            move |_peer, intent| received_in.lock().unwrap().push(intent),
            None,
        );

        let mut client = network.transport.connect("p1");
        network.poll(0);

        let body = network
            .intent_registry_mut()
            .encode(
                1,
                &Move {
                    kind: 1,
                    tick: 42,
                    dx: 7,
                },
            )
            .unwrap();
        let mut pool = MessageWrapperPool::new();
        let framed = frame(&mut pool, MessageType::Intent, &body);
        client.send(framed.as_bytes()).unwrap();

        network.poll(10);

        let got = received.lock().unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].tick, 42);
        assert_eq!(got[0].dx, 7);
    }

    #[test]
    fn intent_validator_rejection_drops_before_handler() {
        let (mut network, registry) = new_network();
        network.set_default_snapshot_registry(registry);
        network.intent_registry_mut().register(1, move_schema()).unwrap();

        let called = Arc::new(Mutex::new(false));
        let called_in = called.clone();
        network.on_intent(
            1,
            move |_peer, _intent: Move| *called_in.lock().unwrap() = true,
            Some(|_peer: &PeerId, intent: &Move| intent.dx < 5),
        );

        let mut client = network.transport.connect("p1");
        network.poll(0);

        let body = network
            .intent_registry_mut()
            .encode(1, &Move { kind: 1, tick: 1, dx: 100 })
            .unwrap();
        let mut pool = MessageWrapperPool::new();
        let framed = frame(&mut pool, MessageType::Intent, &body);
        client.send(framed.as_bytes()).unwrap();
        network.poll(10);

        assert!(!*called.lock().unwrap());
    }

    #[test]
    fn excess_ingress_beyond_rate_limit_is_dropped_within_the_same_window() {
        let mut config = ServerNetworkConfig::default();
        config.max_messages_per_second = 2;
        config.heartbeat_interval_ms = 0;
        let mut network = ServerNetwork::<TestTransport, PlayerSnapshot>::new(TestTransport::new(), config);
        network.intent_registry_mut().register(1, move_schema()).unwrap();

        let count = Arc::new(Mutex::new(0u32));
        let count_in = count.clone();
        network.on_intent::<Move, _, fn(&PeerId, &Move) -> bool>(
            1,
            move |_peer, _intent| *count_in.lock().unwrap() += 1,
            None,
        );

        let mut client = network.transport.connect("p1");
        network.poll(0);

        let mut pool = MessageWrapperPool::new();
        for tick in 0..5u32 {
            let body = network
                .intent_registry_mut()
                .encode(1, &Move { kind: 1, tick, dx: 0 })
                .unwrap();
            let framed = frame(&mut pool, MessageType::Intent, &body);
            client.send(framed.as_bytes()).unwrap();
        }
        network.poll(0);

        assert_eq!(*count.lock().unwrap(), 2, "only the cap should be delivered this window");
    }

    #[test]
    fn backpressured_peer_queues_instead_of_sending() {
        let (mut network, registry) = new_network();
        network.set_default_snapshot_registry(registry);
        let _client = network.transport.connect("p1");
        network.poll(0);

        let peer_id = "p1".to_string();
        if let Some(peer) = network.peers.get_mut(&peer_id) {
            peer.is_backpressured = true;
        }

        network
            .send_snapshot_to_peer(&peer_id, "players", 1, &PlayerSnapshot { score: 10 }, Priority::Normal, 0)
            .unwrap();

        assert_eq!(network.send_queue_len(&peer_id), 1);
        assert!(network.is_backpressured(&peer_id));
    }

    #[test]
    fn snapshot_customization_scales_score_per_peer() {
        let (mut network, registry) = new_network();
        network.set_default_snapshot_registry(registry);
        let mut client1 = network.transport.connect("p1");
        let mut client2 = network.transport.connect("p2");
        network.poll(0);

        let base = PlayerSnapshot { score: 100 };
        network.broadcast_snapshot_with_customization("players", 1, &base, Priority::Normal, 0, |peer_id, base| {
            PlayerSnapshot {
                score: if peer_id == "p1" { base.score * 2 } else { base.score * 3 },
            }
        });

        let msg1 = client1.poll_messages().pop().unwrap();
        let msg2 = client2.poll_messages().pop().unwrap();
        let mut registry = SnapshotRegistry::new();
        registry.register("players", snapshot_schema()).unwrap();
        let (_, env1) = registry.decode(&msg1[1..]).unwrap();
        let (_, env2) = registry.decode(&msg2[1..]).unwrap();
        assert_eq!(env1.updates.score, 200);
        assert_eq!(env2.updates.score, 300);
    }

    #[test]
    fn heartbeat_timeout_closes_peer_and_fires_disconnection_once() {
        let (mut network, registry) = new_network();
        network.set_default_snapshot_registry(registry);
        let disconnect_count = Arc::new(Mutex::new(0u32));
        let disconnect_count_in = disconnect_count.clone();
        network.on_disconnection(move |_peer| *disconnect_count_in.lock().unwrap() += 1);

        let _client = network.transport.connect("p1");
        network.poll(0);
        assert_eq!(network.peer_count(), 1);

        // no messages for longer than the timeout
        network.poll(350);

        assert_eq!(network.peer_count(), 0);
        assert_eq!(*disconnect_count.lock().unwrap(), 1);
    }

    #[test]
    fn disconnect_removes_peer_and_its_snapshot_registry() {
        let (mut network, registry) = new_network();
        network.set_default_snapshot_registry(registry);
        let _client = network.transport.connect("p1");
        network.poll(0);
        assert_eq!(network.peer_count(), 1);

        network.transport.disconnect("p1");
        network.poll(10);

        assert_eq!(network.peer_count(), 0);
        assert!(network.peer_snapshot_registries.get("p1").is_none());
    }

    #[test]
    fn unsubscribing_an_intent_handler_stops_future_delivery() {
        let (mut network, registry) = new_network();
        network.set_default_snapshot_registry(registry);
        network.intent_registry_mut().register(1, move_schema()).unwrap();

        let count = Arc::new(Mutex::new(0u32));
        let count_in = count.clone();
        let id = network.on_intent::<Move, _, fn(&PeerId, &Move) -> bool>(
            1,
            move |_peer, _intent| *count_in.lock().unwrap() += 1,
            None,
        );
        assert!(network.off_intent(1, id));

        let mut client = network.transport.connect("p1");
        network.poll(0);
        let body = network.intent_registry_mut().encode(1, &Move::default()).unwrap();
        let mut pool = MessageWrapperPool::new();
        let framed = frame(&mut pool, MessageType::Intent, &body);
        client.send(framed.as_bytes()).unwrap();
        network.poll(10);

        assert_eq!(*count.lock().unwrap(), 0);
    }
}
