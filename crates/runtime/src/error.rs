//! Errors raised by transports.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// `Transport::send` failed; callers mark the peer backpressured and
    /// keep serving everyone else.
    #[error("transport send failed: {reason}")]
    SendFailed { reason: String },

    /// An operation was attempted on a transport that already closed.
    /// `close()` itself is idempotent and does not raise this.
    #[error("transport is closed")]
    Closed,
}
