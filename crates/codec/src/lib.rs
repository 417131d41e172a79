//! Schema-driven binary codec for Flowstate's wire messages.
//!
//! This crate owns the fixed-size field arithmetic (`field`), the ordered
//! record layouts built from those fields (`schema`), and the pooling that
//! keeps the hot encode/decode path allocation-free (`pool`, `wrapper`).
//! It has no opinion on message dispatch or framing beyond the raw
//! `[type byte][body]` shape `wrapper` produces — that belongs to
//! `flowstate-protocol`.

pub mod error;
pub mod field;
pub mod pool;
pub mod schema;
pub mod wrapper;

pub use error::CodecError;
pub use field::{
    BoolField, Endian, F32Field, F64Field, Field, I8Field, I16Field, I32Field, RgbaField,
    StringField, U8Field, U16Field, U32Field, Vec2Field, Vec3Field,
};
pub use pool::{Pool, PooledDecoder, PooledEncoder};
pub use schema::{Schema, SchemaBuilder};
pub use wrapper::{MessageWrapperPool, WrappedMessage, DEFAULT_SIZE_CLASS};
