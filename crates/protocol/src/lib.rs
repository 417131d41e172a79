//! Message framing and registries: turns [`flowstate_codec`] schemas into
//! dispatchable wire messages.
//!
//! - [`framing`] owns the leading `[messageType: u8]` byte.
//! - [`intent`], [`snapshot`], [`rpc`] own each message type's body layout
//!   and numeric-id dispatch.
//!
//! Registration order determines assigned ids for snapshots and RPCs;
//! intent `kind` bytes are caller-assigned. None of these ids are a stable
//! cross-process wire contract unless both ends register identically —
//! callers that need that guarantee must enforce matching registration
//! order themselves.

mod erased;
pub mod error;
pub mod framing;
pub mod intent;
pub mod rpc;
pub mod snapshot;

pub use error::ProtocolError;
pub use framing::{frame, frame_heartbeat, parse, MessageType};
pub use intent::IntentRegistry;
pub use rpc::RpcRegistry;
pub use snapshot::{SnapshotEnvelope, SnapshotRegistry};
