//! Transport capability traits consumed (not implemented) by the core, plus
//! an in-memory [`LoopbackTransport`] pair used to exercise the rest of
//! this workspace without a real socket.

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use crate::error::TransportError;

/// Opaque peer identifier, generated by the server on accept.
pub type PeerId = String;

/// Bidirectional, reliable, ordered byte-frame stream. Each frame delivered
/// to the message handler corresponds to exactly one message; no length
/// prefix is added by anything above this trait, so implementations must
/// preserve frame boundaries themselves (WebSocket-style). A datagram
/// transport wanting to host this core must frame messages on its own.
pub trait Transport: Send {
    /// Send one frame. A returned error implies backpressure; the caller
    /// is responsible for queuing and retrying, not this trait.
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Drain any frames received since the last call, in arrival order.
    fn poll_messages(&mut self) -> Vec<Vec<u8>>;

    /// True once the transport is open and ready to send/receive.
    fn is_open(&self) -> bool;

    /// Close the transport. Idempotent.
    fn close(&mut self);
}

/// Server-side transport: everything [`Transport`] offers per connected
/// peer, plus peer lifecycle and lookup.
pub trait ServerTransport: Send {
    /// Peer ids that connected since the last call, in accept order.
    fn poll_connects(&mut self) -> Vec<PeerId>;

    /// Peer ids that disconnected since the last call.
    fn poll_disconnects(&mut self) -> Vec<PeerId>;

    fn peer(&self, peer_id: &PeerId) -> Option<&dyn Transport>;
    fn peer_mut(&mut self, peer_id: &PeerId) -> Option<&mut dyn Transport>;
    fn peer_ids(&self) -> Vec<PeerId>;
}

/// One end of an in-memory loopback pair: useful for integration tests
/// that exercise `ServerNetwork`/`ClientNetwork` without a real socket.
pub struct LoopbackTransport {
    outbound: Sender<Vec<u8>>,
    inbound: Receiver<Vec<u8>>,
    open: bool,
}

impl LoopbackTransport {
    /// Build a connected client/server pair of loopback transports.
    pub fn pair() -> (LoopbackTransport, LoopbackTransport) {
        let (client_to_server, server_rx) = crossbeam_channel::unbounded();
        let (server_to_client, client_rx) = crossbeam_channel::unbounded();
        (
            LoopbackTransport {
                outbound: client_to_server,
                inbound: client_rx,
                open: true,
            },
            LoopbackTransport {
                outbound: server_to_client,
                inbound: server_rx,
                open: true,
            },
        )
    }
}

impl Transport for LoopbackTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::Closed);
        }
        self.outbound
            .send(bytes.to_vec())
            .map_err(|_| TransportError::SendFailed {
                reason: "peer end dropped".to_string(),
            })
    }

    fn poll_messages(&mut self) -> Vec<Vec<u8>> {
        let mut messages = Vec::new();
        loop {
            match self.inbound.try_recv() {
                Ok(bytes) => messages.push(bytes),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.open = false;
                    break;
                }
            }
        }
        messages
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) {
        self.open = false;
    }
}
