//! RPC registry: string method names mapped to a sequential `methodId: u16`
//! at registration time, mirroring [`crate::intent::IntentRegistry`] but
//! with a larger id namespace since RPC surfaces tend to accumulate more
//! distinct methods over a project's life than intent kinds do.

use std::any::Any;
use std::collections::HashMap;

use flowstate_codec::Schema;

use crate::erased::{downcast, ErasedCodec, TypedCodec};
use crate::error::ProtocolError;

const NAMESPACE: &str = "rpc";

#[derive(Default)]
pub struct RpcRegistry {
    codecs: Vec<Box<dyn ErasedCodec>>,
    names: Vec<String>,
    id_by_method: HashMap<String, u16>,
}

impl RpcRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `method`'s payload schema, returning its assigned
    /// `method_id`.
    pub fn register<T>(&mut self, method: &str, schema: Schema<T>) -> Result<u16, ProtocolError>
    where
        T: Any + Send + Sync + Default,
    {
        if self.id_by_method.contains_key(method) {
            return Err(ProtocolError::DuplicateRegistration {
                namespace: NAMESPACE,
                key: method.to_string(),
            });
        }
        let method_id =
            u16::try_from(self.codecs.len()).map_err(|_| ProtocolError::DuplicateRegistration {
                namespace: NAMESPACE,
                key: method.to_string(),
            })?;
        self.codecs.push(Box::new(TypedCodec { schema }));
        self.names.push(method.to_string());
        self.id_by_method.insert(method.to_string(), method_id);
        Ok(method_id)
    }

    /// Reverse-lookup a method's name from its wire id, for handler
    /// dispatch keyed by name rather than by registration-order id.
    pub fn method_name(&self, method_id: u16) -> Option<&str> {
        self.names.get(method_id as usize).map(String::as_str)
    }

    /// Encode an RPC call body: `[methodId u16 LE][schema fields...]`.
    pub fn encode<T>(&self, method: &str, value: &T) -> Result<Vec<u8>, ProtocolError>
    where
        T: Any + Send + Sync,
    {
        let method_id = self.id_for(method)?;
        let codec = &self.codecs[method_id as usize];
        let fields = codec.encode_erased(NAMESPACE, method, value)?;
        let mut out = Vec::with_capacity(2 + fields.len());
        out.extend_from_slice(&method_id.to_le_bytes());
        out.extend_from_slice(&fields);
        Ok(out)
    }

    /// Decode an RPC call body, returning the `methodId` and decoded value.
    pub fn decode<T>(&self, bytes: &[u8]) -> Result<(u16, T), ProtocolError>
    where
        T: Any + Send + Sync + Default,
    {
        if bytes.len() < 2 {
            return Err(flowstate_codec::CodecError::BufferTooSmall {
                needed: 2,
                available: bytes.len(),
            }
            .into());
        }
        let method_id = u16::from_le_bytes(bytes[0..2].try_into().expect("2 byte slice"));
        let codec = self
            .codecs
            .get(method_id as usize)
            .ok_or(ProtocolError::UnknownId {
                namespace: NAMESPACE,
                id: method_id as u32,
            })?;
        let value = codec.decode_erased(&bytes[2..])?;
        Ok((method_id, downcast(value, NAMESPACE, &method_id.to_string())?))
    }

    fn id_for(&self, method: &str) -> Result<u16, ProtocolError> {
        self.id_by_method
            .get(method)
            .copied()
            .ok_or_else(|| ProtocolError::NotRegistered {
                namespace: NAMESPACE,
                key: method.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowstate_codec::U32Field;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Ping {
        nonce: u32,
    }

    fn ping_schema() -> Schema<Ping> {
        Schema::builder()
            .field(
                "nonce",
                U32Field::little_endian(),
                |p: &Ping| &p.nonce,
                |p, v| p.nonce = v,
            )
            .build()
    }

    #[test]
    fn register_assigns_sequential_method_ids() {
        let mut registry = RpcRegistry::new();
        assert_eq!(registry.register("ping", ping_schema()).unwrap(), 0);
        assert_eq!(registry.register("pong", ping_schema()).unwrap(), 1);
    }

    #[test]
    fn encode_decode_roundtrip() {
        let mut registry = RpcRegistry::new();
        registry.register("ping", ping_schema()).unwrap();
        let bytes = registry.encode("ping", &Ping { nonce: 7 }).unwrap();
        let (method_id, decoded): (u16, Ping) = registry.decode(&bytes).unwrap();
        assert_eq!(method_id, 0);
        assert_eq!(decoded, Ping { nonce: 7 });
    }

    #[test]
    fn duplicate_method_registration_is_rejected() {
        let mut registry = RpcRegistry::new();
        registry.register("ping", ping_schema()).unwrap();
        let err = registry.register("ping", ping_schema()).unwrap_err();
        assert!(matches!(err, ProtocolError::DuplicateRegistration { .. }));
    }

    #[test]
    fn encode_to_unregistered_method_fails() {
        let registry = RpcRegistry::new();
        let err = registry.encode("missing", &Ping::default()).unwrap_err();
        assert!(matches!(err, ProtocolError::NotRegistered { .. }));
    }

    #[test]
    fn decode_unknown_method_id_fails() {
        let registry = RpcRegistry::new();
        let err = registry.decode::<Ping>(&[5, 0]).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownId { .. }));
    }

    #[test]
    fn method_name_resolves_back_from_the_assigned_id() {
        let mut registry = RpcRegistry::new();
        let id = registry.register("ping", ping_schema()).unwrap();
        assert_eq!(registry.method_name(id), Some("ping"));
        assert_eq!(registry.method_name(99), None);
    }
}
