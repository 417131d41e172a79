//! Snapshot registries: named, schema-described views over one update
//! payload type `T`, each assigned a sequential `type_id` on registration.
//!
//! A single `SnapshotRegistry<T>` can hold several named schemas over the
//! same `T` — this is what makes interest-management customization
//! possible: a server can register `"players"` once per peer with a
//! slightly different schema (e.g. omitting a field clients shouldn't
//! see) while still working with one shared `T` in application code.

use std::collections::HashMap;

use flowstate_codec::Schema;

use crate::error::ProtocolError;

const NAMESPACE: &str = "snapshot";

/// A decoded snapshot: the tick it was produced for and the update payload.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotEnvelope<T> {
    pub tick: u32,
    pub updates: T,
}

struct Registered<T> {
    name: &'static str,
    schema: Schema<T>,
}

pub struct SnapshotRegistry<T> {
    by_id: Vec<Registered<T>>,
    id_by_name: HashMap<&'static str, u8>,
}

impl<T> Default for SnapshotRegistry<T> {
    fn default() -> Self {
        Self {
            by_id: Vec::new(),
            id_by_name: HashMap::new(),
        }
    }
}

impl<T> SnapshotRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` with `schema`, returning its assigned `type_id`.
    /// IDs are assigned sequentially starting at 0 in registration order —
    /// they are a process-local convenience, not a cross-process wire
    /// contract unless both ends register identically.
    pub fn register(&mut self, name: &'static str, schema: Schema<T>) -> Result<u8, ProtocolError> {
        if self.id_by_name.contains_key(name) {
            return Err(ProtocolError::DuplicateRegistration {
                namespace: NAMESPACE,
                key: name.to_string(),
            });
        }
        let type_id = u8::try_from(self.by_id.len()).map_err(|_| ProtocolError::DuplicateRegistration {
            namespace: NAMESPACE,
            key: name.to_string(),
        })?;
        self.by_id.push(Registered { name, schema });
        self.id_by_name.insert(name, type_id);
        Ok(type_id)
    }

    /// Encode `updates` under `name`'s registered schema:
    /// `[type_id][tick u32 LE][schema-encoded updates]`.
    pub fn encode(&self, name: &str, tick: u32, updates: &T) -> Result<Vec<u8>, ProtocolError> {
        let type_id = *self
            .id_by_name
            .get(name)
            .ok_or_else(|| ProtocolError::NotRegistered {
                namespace: NAMESPACE,
                key: name.to_string(),
            })?;
        let entry = &self.by_id[type_id as usize];
        let body = entry.schema.encode(updates)?;
        let mut out = Vec::with_capacity(1 + 4 + body.len());
        out.push(type_id);
        out.extend_from_slice(&tick.to_le_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Decode a snapshot body, returning the registered name and envelope.
    pub fn decode(&self, bytes: &[u8]) -> Result<(&'static str, SnapshotEnvelope<T>), ProtocolError>
    where
        T: Default,
    {
        if bytes.len() < 5 {
            return Err(flowstate_codec::CodecError::BufferTooSmall {
                needed: 5,
                available: bytes.len(),
            }
            .into());
        }
        let type_id = bytes[0];
        let tick = u32::from_le_bytes(bytes[1..5].try_into().expect("4 byte slice"));
        let entry = self
            .by_id
            .get(type_id as usize)
            .ok_or(ProtocolError::UnknownId {
                namespace: NAMESPACE,
                id: type_id as u32,
            })?;
        let mut updates = T::default();
        entry.schema.decode(&bytes[5..], &mut updates)?;
        Ok((entry.name, SnapshotEnvelope { tick, updates }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowstate_codec::U32Field;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct PlayerUpdate {
        score: u32,
    }

    fn score_schema() -> Schema<PlayerUpdate> {
        Schema::builder()
            .field(
                "score",
                U32Field::little_endian(),
                |p: &PlayerUpdate| &p.score,
                |p, v| p.score = v,
            )
            .build()
    }

    #[test]
    fn register_assigns_sequential_ids() {
        let mut registry: SnapshotRegistry<PlayerUpdate> = SnapshotRegistry::new();
        assert_eq!(registry.register("players", score_schema()).unwrap(), 0);
        assert_eq!(registry.register("world", score_schema()).unwrap(), 1);
    }

    #[test]
    fn encode_decode_roundtrip_preserves_name_tick_and_updates() {
        let mut registry: SnapshotRegistry<PlayerUpdate> = SnapshotRegistry::new();
        registry.register("players", score_schema()).unwrap();

        let bytes = registry
            .encode("players", 11, &PlayerUpdate { score: 100 })
            .unwrap();
        let (name, envelope) = registry.decode(&bytes).unwrap();
        assert_eq!(name, "players");
        assert_eq!(envelope.tick, 11);
        assert_eq!(envelope.updates, PlayerUpdate { score: 100 });
    }

    #[test]
    fn duplicate_name_registration_is_rejected() {
        let mut registry: SnapshotRegistry<PlayerUpdate> = SnapshotRegistry::new();
        registry.register("players", score_schema()).unwrap();
        let err = registry.register("players", score_schema()).unwrap_err();
        assert!(matches!(err, ProtocolError::DuplicateRegistration { .. }));
    }

    #[test]
    fn interest_management_customization_scales_score_per_peer() {
        let mut registry: SnapshotRegistry<PlayerUpdate> = SnapshotRegistry::new();
        registry.register("players", score_schema()).unwrap();
        let base = PlayerUpdate { score: 100 };

        let for_p1 = PlayerUpdate {
            score: base.score * 2,
        };
        let for_p2 = PlayerUpdate {
            score: base.score * 3,
        };

        let (_, env1) = registry
            .decode(&registry.encode("players", 1, &for_p1).unwrap())
            .unwrap();
        let (_, env2) = registry
            .decode(&registry.encode("players", 1, &for_p2).unwrap())
            .unwrap();
        assert_eq!(env1.updates.score, 200);
        assert_eq!(env2.updates.score, 300);
    }

    #[test]
    fn unknown_type_id_is_rejected_on_decode() {
        let registry: SnapshotRegistry<PlayerUpdate> = SnapshotRegistry::new();
        let bytes = [0u8, 0, 0, 0, 0];
        let err = registry.decode(&bytes).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownId { .. }));
    }
}
