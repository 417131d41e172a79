//! Dispatch intents by their leading `kind: u8` byte.
//!
//! `kind` must be the first field of every registered schema so decode can
//! read one byte and dispatch without knowing the concrete type ahead of
//! time — this is the invariant the wire format leans on.

use std::any::Any;

use flowstate_codec::Schema;
use tracing::debug;

use crate::erased::{downcast, ErasedCodec, TypedCodec};
use crate::error::ProtocolError;

const NAMESPACE: &str = "intent";

/// Maps intent `kind` bytes to the schema registered for that kind.
///
/// IDs are assigned by the caller (not sequentially like snapshots/rpcs)
/// because `kind` is itself part of the wire contract games agree on up
/// front, usually a small hand-picked enum. Dispatch is a dense
/// `Vec<Option<_>>` indexed by `kind` for O(1) lookup.
#[derive(Default)]
pub struct IntentRegistry {
    codecs: Vec<Option<Box<dyn ErasedCodec>>>,
}

impl IntentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the schema for intents of the given `kind`. Fails if
    /// `kind` is already registered.
    pub fn register<T>(&mut self, kind: u8, schema: Schema<T>) -> Result<(), ProtocolError>
    where
        T: Any + Send + Sync + Default,
    {
        let index = kind as usize;
        if self.codecs.len() <= index {
            self.codecs.resize_with(index + 1, || None);
        }
        if self.codecs[index].is_some() {
            return Err(ProtocolError::DuplicateRegistration {
                namespace: NAMESPACE,
                key: kind.to_string(),
            });
        }
        self.codecs[index] = Some(Box::new(TypedCodec { schema }));
        Ok(())
    }

    /// Encode an intent's body: `[kind][schema fields...]`. `kind` is
    /// already the schema's own first field by convention (spec invariant:
    /// every intent schema places `kind: u8` first), so encoding is just
    /// the schema's own output — there is no separate byte to prepend.
    pub fn encode<T>(&self, kind: u8, intent: &T) -> Result<Vec<u8>, ProtocolError>
    where
        T: Any + Send + Sync,
    {
        let codec = self.codec_for(kind)?;
        codec.encode_erased(NAMESPACE, &kind.to_string(), intent)
    }

    /// Decode an intent body (`bytes[0]` is `kind`), returning the kind and
    /// the decoded value. Fails with `UnknownId` if `kind` has no
    /// registration. The full `bytes` slice (including the leading `kind`
    /// byte) is handed to the schema, since `kind` is itself the schema's
    /// first field.
    pub fn decode<T>(&self, bytes: &[u8]) -> Result<(u8, T), ProtocolError>
    where
        T: Any + Send + Sync + Default,
    {
        let kind = *bytes.first().ok_or(flowstate_codec::CodecError::BufferTooSmall {
            needed: 1,
            available: 0,
        })?;
        let codec = self.codec_for(kind)?;
        let value = codec.decode_erased(bytes)?;
        debug!(kind, "decoded intent");
        Ok((kind, downcast(value, NAMESPACE, &kind.to_string())?))
    }

    fn codec_for(&self, kind: u8) -> Result<&dyn ErasedCodec, ProtocolError> {
        self.codecs
            .get(kind as usize)
            .and_then(|slot| slot.as_deref())
            .ok_or(ProtocolError::UnknownId {
                namespace: NAMESPACE,
                id: kind as u32,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowstate_codec::{F32Field, U32Field, U8Field};

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Move {
        kind: u8,
        tick: u32,
        dx: f32,
        dy: f32,
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
            .field("dx", F32Field::default(), |m: &Move| &m.dx, |m, v| m.dx = v)
            .field("dy", F32Field::default(), |m: &Move| &m.dy, |m, v| m.dy = v)
            .build()
    }

    #[test]
    fn register_then_roundtrip_preserves_kind_and_fields() {
        let mut registry = IntentRegistry::new();
        registry.register(1, move_schema()).unwrap();

        let original = Move {
            kind: 1,
            tick: 42,
            dx: 1.5,
            dy: -2.0,
        };
        let bytes = registry.encode(1, &original).unwrap();
        let (kind, decoded): (u8, Move) = registry.decode(&bytes).unwrap();
        assert_eq!(kind, 1);
        assert_eq!(decoded, original);
    }

    #[test]
    fn intent_round_trip_matches_wire_scenario_bytes() {
        let mut registry = IntentRegistry::new();
        registry.register(1, move_schema()).unwrap();
        let bytes = registry
            .encode(
                1,
                &Move {
                    kind: 1,
                    tick: 42,
                    dx: 1.5,
                    dy: -2.0,
                },
            )
            .unwrap();
        // kind byte, then tick LE u32, then dx/dy BE f32 -> 1 + 4 + 4 + 4 = 13 bytes
        assert_eq!(bytes.len(), 13);
        assert_eq!(bytes[0], 0x01);
        assert_eq!(&bytes[1..5], &0x2Au32.to_le_bytes());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = IntentRegistry::new();
        registry.register(1, move_schema()).unwrap();
        let err = registry.register(1, move_schema()).unwrap_err();
        assert!(matches!(err, ProtocolError::DuplicateRegistration { .. }));
    }

    #[test]
    fn unknown_kind_is_rejected_on_decode() {
        let registry = IntentRegistry::new();
        let err = registry.decode::<Move>(&[9, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownId { .. }));
    }

    #[test]
    fn unknown_kind_is_rejected_on_encode() {
        let registry = IntentRegistry::new();
        let err = registry.encode(9, &Move::default()).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownId { .. }));
    }
}
