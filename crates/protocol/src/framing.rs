//! Top-level wire framing: `[messageType: u8][body]`.
//!
//! This module only knows about the leading type byte; the body layout for
//! each type is owned by the matching registry (`IntentRegistry` for
//! `Intent`, `SnapshotRegistry` for `Snapshot`, `RpcRegistry` for
//! `CustomRpc`).

use flowstate_codec::{MessageWrapperPool, WrappedMessage};

use crate::error::ProtocolError;

/// The leading byte of every framed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Intent,
    Snapshot,
    Heartbeat,
    CustomRpc,
}

impl MessageType {
    pub const INTENT: u8 = 0x01;
    pub const SNAPSHOT: u8 = 0x02;
    pub const HEARTBEAT: u8 = 0x03;
    pub const CUSTOM_RPC: u8 = 0xFF;

    pub fn as_byte(self) -> u8 {
        match self {
            MessageType::Intent => Self::INTENT,
            MessageType::Snapshot => Self::SNAPSHOT,
            MessageType::Heartbeat => Self::HEARTBEAT,
            MessageType::CustomRpc => Self::CUSTOM_RPC,
        }
    }

    pub fn from_byte(byte: u8) -> Result<Self, ProtocolError> {
        match byte {
            Self::INTENT => Ok(MessageType::Intent),
            Self::SNAPSHOT => Ok(MessageType::Snapshot),
            Self::HEARTBEAT => Ok(MessageType::Heartbeat),
            Self::CUSTOM_RPC => Ok(MessageType::CustomRpc),
            other => Err(ProtocolError::UnknownId {
                namespace: "message-type",
                id: other as u32,
            }),
        }
    }
}

/// Frame `body` behind `message_type`, reusing a pooled buffer.
pub fn frame(
    pool: &mut MessageWrapperPool,
    message_type: MessageType,
    body: &[u8],
) -> WrappedMessage {
    pool.wrap(message_type.as_byte(), body)
}

/// Frame an empty heartbeat message.
pub fn frame_heartbeat(pool: &mut MessageWrapperPool) -> WrappedMessage {
    pool.wrap(MessageType::HEARTBEAT, &[])
}

/// Split a received frame into its message type and body slice.
pub fn parse(bytes: &[u8]) -> Result<(MessageType, &[u8]), ProtocolError> {
    let byte = *bytes
        .first()
        .ok_or(flowstate_codec::CodecError::BufferTooSmall {
            needed: 1,
            available: 0,
        })?;
    Ok((MessageType::from_byte(byte)?, &bytes[1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_then_parse_roundtrips_type_and_body() {
        let mut pool = MessageWrapperPool::new();
        let framed = frame(&mut pool, MessageType::Intent, &[1, 2, 3]);
        let (message_type, body) = parse(framed.as_bytes()).unwrap();
        assert_eq!(message_type, MessageType::Intent);
        assert_eq!(body, &[1, 2, 3]);
    }

    #[test]
    fn heartbeat_body_is_empty() {
        let mut pool = MessageWrapperPool::new();
        let framed = frame_heartbeat(&mut pool);
        let (message_type, body) = parse(framed.as_bytes()).unwrap();
        assert_eq!(message_type, MessageType::Heartbeat);
        assert!(body.is_empty());
    }

    #[test]
    fn unknown_message_type_byte_is_rejected() {
        let err = parse(&[0x7F, 1, 2]).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownId { .. }));
    }

    #[test]
    fn parse_empty_buffer_fails() {
        let err = parse(&[]).unwrap_err();
        assert!(matches!(err, ProtocolError::Codec(_)));
    }
}
