//! Errors raised by [`crate::network::ServerNetwork`] egress/ingress calls.

use flowstate_protocol::ProtocolError;
use flowstate_runtime::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerNetworkError {
    /// Attempted to send a snapshot to a peer with no registered snapshot
    /// registry, or an rpc/intent encode against an unregistered kind.
    #[error(transparent)]
    NotRegistered(#[from] ProtocolError),

    /// The peer id has no tracked [`crate::peer::PeerState`] (never
    /// connected, or already disconnected).
    #[error("unknown peer '{0}'")]
    UnknownPeer(String),

    /// `Transport::send` failed; the peer is marked backpressured and the
    /// call still returns this so the caller can log it, but the peer is
    /// not disconnected.
    #[error(transparent)]
    TransportSendFailed(#[from] TransportError),
}
