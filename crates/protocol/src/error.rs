//! Errors raised by registries and message framing.

use flowstate_codec::CodecError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A codec/field error surfaced while encoding or decoding a registered
    /// payload.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// An incoming message's leading id (intent kind, snapshot type-id, rpc
    /// method-id) has no matching registration. The message is dropped by
    /// the caller; this error exists so the drop can be logged.
    #[error("unknown {namespace} id {id} on the wire")]
    UnknownId { namespace: &'static str, id: u32 },

    /// Two registrations were attempted for the same kind/name/method.
    #[error("duplicate {namespace} registration for {key}")]
    DuplicateRegistration { namespace: &'static str, key: String },

    /// An encode/send was attempted against a kind/name/method that was
    /// never registered.
    #[error("{namespace} '{key}' is not registered")]
    NotRegistered { namespace: &'static str, key: String },

    /// A registered codec was invoked with a value of the wrong concrete
    /// type. Indicates a caller bug (registered one type, passed another).
    #[error("{namespace} '{key}' codec invoked with mismatched payload type")]
    TypeMismatch { namespace: &'static str, key: String },
}
