//! Object pools for the hot encode/decode path.
//!
//! A `Pool<T>` is a factory plus a stack of reclaimed instances: `acquire`
//! pops from the stack (or calls the factory on an empty stack), `release`
//! pushes back. Both are O(1) and allocation-free once the stack has
//! warmed up. A pool belongs to exactly one owner (a connection, an event
//! loop) and is not `Sync` by contract — sharing one across threads without
//! external synchronization is a caller bug, not something this type
//! guards against.

use crate::error::CodecError;
use crate::schema::Schema;

/// A stack of reusable `T` instances backed by a factory closure.
pub struct Pool<T> {
    factory: Box<dyn Fn() -> T>,
    stack: Vec<T>,
}

impl<T> Pool<T> {
    /// Create an empty pool. Nothing is pre-allocated; the first
    /// `acquire()` calls `factory` directly.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        Self {
            factory: Box::new(factory),
            stack: Vec::new(),
        }
    }

    /// Pre-allocate `count` instances up front.
    pub fn with_capacity<F>(count: usize, factory: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        let mut pool = Self::new(factory);
        pool.stack.reserve(count);
        for _ in 0..count {
            let item = (pool.factory)();
            pool.stack.push(item);
        }
        pool
    }

    /// Take an instance, creating a new one if the pool is empty.
    pub fn acquire(&mut self) -> T {
        self.stack.pop().unwrap_or_else(|| (self.factory)())
    }

    /// Return an instance for reuse. Callers must not retain any reference
    /// derived from `item` past this call.
    pub fn release(&mut self, item: T) {
        self.stack.push(item);
    }

    /// Number of instances currently held in reserve.
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}

/// A pooled byte buffer used to stage an encode before handing the bytes
/// off to a transport.
///
/// `PooledEncoder::acquire` fills the buffer via `schema.encode_into` and
/// hands back a slice view; the caller must consume that slice (copy it
/// into a send queue, write it to a socket) before calling `release` — the
/// buffer is recycled for the next encode immediately after.
pub struct PooledEncoder {
    pool: Pool<Vec<u8>>,
}

impl PooledEncoder {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            pool: Pool::new(move || vec![0u8; buffer_size]),
        }
    }

    /// Encode `value` using `schema` into a pooled buffer and pass the
    /// filled slice to `handler`. The buffer is released back to the pool
    /// as soon as `handler` returns, whether or not it returned an error.
    ///
    /// `handler` must not retain the slice it is given past its own call —
    /// the same bytes may be overwritten by the very next `encode` call on
    /// this encoder.
    pub fn encode<Record, H, R>(
        &mut self,
        schema: &Schema<Record>,
        value: &Record,
        handler: H,
    ) -> Result<R, CodecError>
    where
        H: FnOnce(&[u8]) -> R,
    {
        let mut buf = self.pool.acquire();
        if buf.len() < schema.total_size() {
            buf.resize(schema.total_size(), 0);
        }
        let result = schema
            .encode_into(value, &mut buf, 0)
            .map(|end| handler(&buf[0..end]));
        self.pool.release(buf);
        result
    }
}

/// A pooled decode target used to avoid allocating a fresh `Record` per
/// incoming message.
///
/// Mirrors `PooledEncoder`: `decode` acquires a recycled `Record`, resets
/// it, fills it from `bytes`, and hands a reference to `handler`, then
/// releases it back to the pool regardless of outcome.
pub struct PooledDecoder<Record> {
    pool: Pool<Record>,
}

impl<Record> PooledDecoder<Record> {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Record + 'static,
    {
        Self {
            pool: Pool::new(factory),
        }
    }

    /// Decode `bytes` with `schema` into a pooled `Record` and pass it to
    /// `handler`. As with `PooledEncoder::encode`, `handler` must not
    /// retain the reference past its own call.
    pub fn decode<H, R>(
        &mut self,
        schema: &Schema<Record>,
        bytes: &[u8],
        handler: H,
    ) -> Result<R, CodecError>
    where
        H: FnOnce(&Record) -> R,
    {
        let mut record = self.pool.acquire();
        schema.reset(&mut record);
        let result = schema.decode(bytes, &mut record).map(|()| handler(&record));
        self.pool.release(record);
        result
    }
}
