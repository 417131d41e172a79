//! Type-erased codec dispatch shared by [`crate::intent::IntentRegistry`]
//! and [`crate::rpc::RpcRegistry`].
//!
//! Both registries hold a heterogeneous collection of payload types behind
//! one numeric id (an intent `kind` byte, an rpc `methodId`). Each concrete
//! payload type keeps its own [`flowstate_codec::Schema`]; the registry
//! only ever touches it through this erased interface, downcasting via
//! `std::any::Any` at the boundary where the caller hands over a concrete
//! type.

use std::any::Any;

use flowstate_codec::Schema;

use crate::error::ProtocolError;

pub(crate) trait ErasedCodec: Send + Sync {
    fn encode_erased(
        &self,
        namespace: &'static str,
        key: &str,
        value: &dyn Any,
    ) -> Result<Vec<u8>, ProtocolError>;

    fn decode_erased(&self, bytes: &[u8]) -> Result<Box<dyn Any>, ProtocolError>;
}

pub(crate) struct TypedCodec<T> {
    pub schema: Schema<T>,
}

impl<T> ErasedCodec for TypedCodec<T>
where
    T: Any + Send + Sync + Default,
{
    fn encode_erased(
        &self,
        namespace: &'static str,
        key: &str,
        value: &dyn Any,
    ) -> Result<Vec<u8>, ProtocolError> {
        let value = value
            .downcast_ref::<T>()
            .ok_or_else(|| ProtocolError::TypeMismatch {
                namespace,
                key: key.to_string(),
            })?;
        Ok(self.schema.encode(value)?)
    }

    fn decode_erased(&self, bytes: &[u8]) -> Result<Box<dyn Any>, ProtocolError> {
        let mut value = T::default();
        self.schema.decode(bytes, &mut value)?;
        Ok(Box::new(value))
    }
}

/// Downcast a decoded `Box<dyn Any>` into the caller's expected concrete
/// type, turning a mismatch into a `TypeMismatch` rather than a panic.
pub(crate) fn downcast<T: 'static>(
    any: Box<dyn Any>,
    namespace: &'static str,
    key: &str,
) -> Result<T, ProtocolError> {
    any.downcast::<T>().map(|boxed| *boxed).map_err(|_| ProtocolError::TypeMismatch {
        namespace,
        key: key.to_string(),
    })
}
