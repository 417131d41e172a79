//! Errors raised by [`crate::network::ClientNetwork`].

use flowstate_protocol::ProtocolError;
use flowstate_runtime::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientNetworkError {
    /// Encode/decode failed against a registered intent/snapshot/rpc
    /// schema, or the wire message's leading id has no registration.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// `Transport::send` failed. The caller keeps the intent/rpc it tried
    /// to send; nothing here tears down the connection by itself — only
    /// the heartbeat watchdog does that.
    #[error(transparent)]
    TransportSendFailed(#[from] TransportError),
}
