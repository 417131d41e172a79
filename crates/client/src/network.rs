//! `ClientNetwork`: the single-peer mirror of
//! [`flowstate_server::ServerNetwork`] — intent send with change
//! detection, snapshot/RPC receipt, the heartbeat watchdog, and optional
//! artificial receive-side lag.

use std::any::Any;
use std::collections::HashMap;

use flowstate_codec::MessageWrapperPool;
use flowstate_protocol::{
    frame, frame_heartbeat, parse, IntentRegistry, MessageType, RpcRegistry, SnapshotEnvelope,
    SnapshotRegistry,
};
use flowstate_runtime::{RateLimiter, Transport};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ClientNetworkError;
use crate::lag::{LagQueue, LagSimulation};

pub type HandlerId = u64;

type RpcDispatch = Box<dyn FnMut(&[u8], &RpcRegistry) + Send>;

/// Every configuration knob from the spec's external-interfaces table that
/// applies client-side, serde-derived so an external binary can load it
/// from a config file alongside `ServerNetworkConfig`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientNetworkConfig {
    pub max_message_size: usize,
    pub max_messages_per_second: u32,
    pub heartbeat_interval_ms: u64,
    pub heartbeat_timeout_ms: u64,
    pub enable_buffer_pooling: bool,
    pub debug: bool,
    pub lag_simulation: Option<LagSimulation>,
}

impl Default for ClientNetworkConfig {
    fn default() -> Self {
        Self {
            max_message_size: 65536,
            max_messages_per_second: 60,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 60_000,
            enable_buffer_pooling: true,
            debug: false,
            lag_simulation: None,
        }
    }
}

/// Generic client-side network manager. `X` is the concrete transport the
/// host wires in; `Snap` is the single snapshot update payload type this
/// client's registry was built for.
pub struct ClientNetwork<X: Transport, Snap> {
    transport: X,
    config: ClientNetworkConfig,
    intent_registry: IntentRegistry,
    snapshot_registry: SnapshotRegistry<Snap>,
    rpc_registry: RpcRegistry,
    wrapper_pool: MessageWrapperPool,
    rate_limiter: RateLimiter,
    last_sent_intents: HashMap<u8, Box<dyn Any + Send>>,
    #[allow(clippy::type_complexity)]
    snapshot_handlers: HashMap<&'static str, Vec<(HandlerId, Box<dyn FnMut(&SnapshotEnvelope<Snap>) + Send>)>>,
    rpc_handlers: HashMap<String, Vec<(HandlerId, RpcDispatch)>>,
    next_handler_id: HandlerId,
    lag_queue: LagQueue,
    last_message_received_ms: u64,
    last_heartbeat_sent_ms: u64,
}

impl<X: Transport, Snap: Send + Sync + Default + 'static> ClientNetwork<X, Snap> {
    pub fn new(transport: X, config: ClientNetworkConfig) -> Self {
        let rate_limiter = RateLimiter::new(config.max_messages_per_second);
        let lag_queue = LagQueue::new(config.lag_simulation);
        Self {
            transport,
            config,
            intent_registry: IntentRegistry::new(),
            snapshot_registry: SnapshotRegistry::new(),
            rpc_registry: RpcRegistry::new(),
            wrapper_pool: MessageWrapperPool::new(),
            rate_limiter,
            last_sent_intents: HashMap::new(),
            snapshot_handlers: HashMap::new(),
            rpc_handlers: HashMap::new(),
            next_handler_id: 0,
            lag_queue,
            last_message_received_ms: 0,
            last_heartbeat_sent_ms: 0,
        }
    }

    pub fn config(&self) -> &ClientNetworkConfig {
        &self.config
    }

    pub fn intent_registry_mut(&mut self) -> &mut IntentRegistry {
        &mut self.intent_registry
    }

    pub fn snapshot_registry_mut(&mut self) -> &mut SnapshotRegistry<Snap> {
        &mut self.snapshot_registry
    }

    pub fn rpc_registry_mut(&mut self) -> &mut RpcRegistry {
        &mut self.rpc_registry
    }

    /// True once the transport is open. There is no separate "connecting"
    /// state in this synchronous model: a transport without an explicit
    /// open handshake is simply open from construction.
    pub fn is_connected(&self) -> bool {
        self.transport.is_open()
    }

    fn next_id(&mut self) -> HandlerId {
        let id = self.next_handler_id;
        self.next_handler_id += 1;
        id
    }

    // -- intent sending -----------------------------------------------------

    /// Send an intent of `kind`. Dropped silently (not an error) if the
    /// transport is disconnected or the client-side rate limit is
    /// exceeded — both are routine conditions, not failures. On success,
    /// a clone is stashed in `last_sent_intents` for [`Self::has_intent_changed`].
    pub fn send_intent<T>(&mut self, kind: u8, intent: &T, now_ms: u64) -> Result<(), ClientNetworkError>
    where
        T: Any + Clone + Send + Sync + 'static,
    {
        if !self.is_connected() {
            debug!(kind, "dropping intent, client is disconnected");
            return Ok(());
        }
        if !self.rate_limiter.check(now_ms) {
            debug!(kind, "intent rate-limited, dropping");
            return Ok(());
        }

        let body = self.intent_registry.encode(kind, intent)?;
        let framed = frame(&mut self.wrapper_pool, MessageType::Intent, &body);
        let bytes = framed.as_bytes().to_vec();
        self.wrapper_pool.release(framed);
        self.transport.send(&bytes)?;

        self.last_sent_intents.insert(kind, Box::new(intent.clone()));
        Ok(())
    }

    /// `true` if no intent of this `kind` has been sent yet, or if
    /// `compare(last, intent)` returns `true`.
    ///
    /// The spec's "default comparator ignores the `tick` field" is
    /// realized by convention rather than reflection: intent payload
    /// types implement `PartialEq` over their semantically meaningful
    /// fields, so [`Self::has_intent_changed`] (which uses plain `!=`)
    /// already ignores `tick` for any type whose `PartialEq` excludes it.
    pub fn has_intent_changed_with<T, C>(&self, kind: u8, intent: &T, compare: C) -> bool
    where
        T: Any + Send + Sync,
        C: Fn(&T, &T) -> bool,
    {
        match self.last_sent_intents.get(&kind).and_then(|b| b.downcast_ref::<T>()) {
            Some(last) => compare(last, intent),
            None => true,
        }
    }

    pub fn has_intent_changed<T>(&self, kind: u8, intent: &T) -> bool
    where
        T: Any + Send + Sync + PartialEq,
    {
        self.has_intent_changed_with(kind, intent, |last, next| last != next)
    }

    // -- receipt registration -------------------------------------------

    /// Attach a handler for snapshots registered under `name`. Handlers
    /// are contractually forbidden from retaining the envelope reference
    /// past the call — copy primitives or clone nested fields if the
    /// state must survive into the next tick.
    pub fn on_snapshot<H>(&mut self, name: &'static str, handler: H) -> HandlerId
    where
        H: FnMut(&SnapshotEnvelope<Snap>) + Send + 'static,
    {
        let id = self.next_id();
        self.snapshot_handlers.entry(name).or_default().push((id, Box::new(handler)));
        id
    }

    pub fn off_snapshot(&mut self, name: &str, id: HandlerId) -> bool {
        remove_handler(self.snapshot_handlers.get_mut(name), id)
    }

    pub fn on_rpc<T, H>(&mut self, method: &str, mut handler: H) -> HandlerId
    where
        T: Any + Send + Sync + Default + 'static,
        H: FnMut(T) + Send + 'static,
    {
        let id = self.next_id();
        let method_owned = method.to_string();
        let dispatch: RpcDispatch = Box::new(move |body, registry| match registry.decode::<T>(body) {
            Ok((_, value)) => handler(value),
            Err(err) => warn!(method = %method_owned, error = %err, "failed to decode rpc"),
        });
        self.rpc_handlers.entry(method.to_string()).or_default().push((id, dispatch));
        id
    }

    pub fn off_rpc(&mut self, method: &str, id: HandlerId) -> bool {
        remove_handler(self.rpc_handlers.get_mut(method), id)
    }

    // -- receipt ----------------------------------------------------------

    /// Drain incoming frames, run the heartbeat watchdog, and dispatch
    /// every message ready for delivery (immediately, or after its
    /// simulated lag has elapsed). Call once per tick phase or loop-driver
    /// iteration.
    pub fn poll(&mut self, now_ms: u64) {
        for bytes in self.transport.poll_messages() {
            self.last_message_received_ms = now_ms;
            if bytes.is_empty() || bytes.len() > self.config.max_message_size {
                warn!(len = bytes.len(), "dropping oversized or empty frame");
                continue;
            }
            if let Some(ready) = self.lag_queue.admit(bytes, now_ms) {
                self.handle_message(&ready);
            }
        }
        for bytes in self.lag_queue.drain_ready(now_ms) {
            self.handle_message(&bytes);
        }

        self.heartbeat_tick(now_ms);
    }

    fn handle_message(&mut self, bytes: &[u8]) {
        let (message_type, body) = match parse(bytes) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(error = %err, "dropping unparsable frame");
                return;
            }
        };

        match message_type {
            MessageType::Snapshot => self.dispatch_snapshot(body),
            MessageType::CustomRpc => self.dispatch_rpc(body),
            MessageType::Heartbeat => {}
            MessageType::Intent => {
                warn!("client received a server-bound intent message, dropping");
            }
        }
    }

    fn dispatch_snapshot(&mut self, body: &[u8]) {
        match self.snapshot_registry.decode(body) {
            Ok((name, envelope)) => match self.snapshot_handlers.get_mut(name) {
                Some(handlers) if !handlers.is_empty() => {
                    for (_, handler) in handlers.iter_mut() {
                        handler(&envelope);
                    }
                }
                _ => warn!(name, "no handler registered for snapshot type"),
            },
            Err(err) => warn!(error = %err, "failed to decode snapshot"),
        }
    }

    fn dispatch_rpc(&mut self, body: &[u8]) {
        if body.len() < 2 {
            warn!("rpc body shorter than method id");
            return;
        }
        let method_id = u16::from_le_bytes([body[0], body[1]]);
        let Self {
            rpc_handlers,
            rpc_registry,
            ..
        } = self;
        let Some(name) = rpc_registry.method_name(method_id) else {
            warn!(method_id, "unknown rpc method id");
            return;
        };
        match rpc_handlers.get_mut(name) {
            Some(handlers) if !handlers.is_empty() => {
                for (_, handler) in handlers.iter_mut() {
                    handler(body, rpc_registry);
                }
            }
            _ => warn!(method = name, "no handler registered for rpc method"),
        }
    }

    // -- heartbeat ----------------------------------------------------------

    fn heartbeat_tick(&mut self, now_ms: u64) {
        if self.config.heartbeat_interval_ms == 0 {
            return;
        }
        if now_ms.saturating_sub(self.last_heartbeat_sent_ms) < self.config.heartbeat_interval_ms {
            return;
        }
        self.last_heartbeat_sent_ms = now_ms;

        if now_ms.saturating_sub(self.last_message_received_ms) > self.config.heartbeat_timeout_ms {
            warn!("heartbeat timeout, disconnecting");
            self.transport.close();
            return;
        }

        let framed = frame_heartbeat(&mut self.wrapper_pool);
        let bytes = framed.as_bytes().to_vec();
        self.wrapper_pool.release(framed);
        if let Err(err) = self.transport.send(&bytes) {
            debug!(error = %err, "heartbeat send failed");
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
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Move {
        kind: u8,
        tick: u32,
        dx: u32,
        dy: u32,
    }

    impl Move {
        fn with_tick(tick: u32, dx: u32, dy: u32) -> Self {
            Self { kind: 1, tick, dx, dy }
        }
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
            .field("dx", U32Field::little_endian(), |m: &Move| &m.dx, |m, v| m.dx = v)
            .field("dy", U32Field::little_endian(), |m: &Move| &m.dy, |m, v| m.dy = v)
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

    fn new_client() -> (ClientNetwork<LoopbackTransport, PlayerSnapshot>, LoopbackTransport) {
        let (client_side, server_side) = LoopbackTransport::pair();
        let mut config = ClientNetworkConfig::default();
        config.heartbeat_interval_ms = 0;
        let mut client = ClientNetwork::new(client_side, config);
        client.intent_registry_mut().register(1, move_schema()).unwrap();
        client.snapshot_registry_mut().register("players", snapshot_schema()).unwrap();
        (client, server_side)
    }

    #[test]
    fn send_intent_round_trips_the_wire_scenario_bytes() {
        let (mut client, mut server) = new_client();
        client.send_intent(1, &Move::with_tick(42, 7, 0), 0).unwrap();

        let frame = server.poll_messages().pop().unwrap();
        assert_eq!(frame[0], 0x01);
        let (kind, decoded): (u8, Move) = client.intent_registry_mut().decode(&frame[1..]).unwrap();
        assert_eq!(kind, 1);
        assert_eq!(decoded.tick, 42);
        assert_eq!(decoded.dx, 7);
    }

    #[test]
    fn disconnected_client_drops_intents_without_erroring() {
        let (mut client, _server) = new_client();
        client.transport_for_test().close();
        client.send_intent(1, &Move::with_tick(1, 0, 0), 0).unwrap();
    }

    #[test]
    fn change_detection_ignores_identical_resends() {
        let (mut client, _server) = new_client();
        assert!(client.has_intent_changed(1, &Move::with_tick(1, 0, 0)));
        client.send_intent(1, &Move::with_tick(1, 0, 0), 0).unwrap();
        assert!(!client.has_intent_changed(1, &Move::with_tick(2, 0, 0)));
        assert!(client.has_intent_changed(1, &Move::with_tick(3, 1, 0)));
    }

    #[test]
    fn snapshot_receipt_invokes_the_registered_handler() {
        let (mut client, mut server) = new_client();
        let seen: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_in = seen.clone();
        client.on_snapshot("players", move |env: &SnapshotEnvelope<PlayerSnapshot>| {
            seen_in.lock().unwrap().push(env.updates.score);
        });

        let body = client.snapshot_registry_mut().encode("players", 5, &PlayerSnapshot { score: 100 }).unwrap();
        let mut pool = MessageWrapperPool::new();
        let framed = frame(&mut pool, MessageType::Snapshot, &body);
        server.send(framed.as_bytes()).unwrap();

        client.poll(0);
        assert_eq!(*seen.lock().unwrap(), vec![100]);
    }

    #[test]
    fn heartbeat_timeout_closes_the_transport() {
        let (mut client, _server) = new_client();
        client.config.heartbeat_interval_ms = 100;
        client.config.heartbeat_timeout_ms = 300;
        client.poll(0);
        assert!(client.is_connected());
        client.poll(500);
        assert!(!client.is_connected());
    }

    #[test]
    fn lag_simulation_delays_handler_invocation() {
        let (mut client, mut server) = new_client();
        client.lag_queue = LagQueue::new(Some(LagSimulation::Fixed(100)));
        let seen = Arc::new(Mutex::new(false));
        let seen_in = seen.clone();
        client.on_snapshot("players", move |_: &SnapshotEnvelope<PlayerSnapshot>| {
            *seen_in.lock().unwrap() = true;
        });

        let body = client.snapshot_registry_mut().encode("players", 1, &PlayerSnapshot { score: 1 }).unwrap();
        let mut pool = MessageWrapperPool::new();
        let framed = frame(&mut pool, MessageType::Snapshot, &body);
        server.send(framed.as_bytes()).unwrap();

        client.poll(0);
        assert!(!*seen.lock().unwrap(), "handler must not run before the simulated delay elapses");
        client.poll(150);
        assert!(*seen.lock().unwrap());
    }

    impl<X: Transport, Snap> ClientNetwork<X, Snap> {
        fn transport_for_test(&mut self) -> &mut X {
            &mut self.transport
        }
    }
}
