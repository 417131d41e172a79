//! Ordered field schemas: the wire layout for a record type.
//!
//! A `Schema<Record>` is built once (typically at startup, alongside a
//! registry registration) and reused for every encode/decode. Iteration
//! order defines the wire layout and is stable for the schema's lifetime.

use crate::error::CodecError;
use crate::field::Field;

/// One named slot in a schema: a field descriptor plus the accessor pair
/// that connects it to a concrete `Record` type.
trait SchemaSlot<Record>: Send + Sync {
    fn name(&self) -> &'static str;
    fn size(&self) -> usize;
    fn write(&self, record: &Record, buf: &mut [u8], offset: usize) -> Result<(), CodecError>;
    fn read(&self, record: &mut Record, buf: &[u8], offset: usize) -> Result<(), CodecError>;
    fn reset(&self, record: &mut Record);
}

struct FieldSlot<Record, T, F> {
    name: &'static str,
    field: F,
    get: fn(&Record) -> &T,
    set: fn(&mut Record, T),
}

impl<Record, T, F> SchemaSlot<Record> for FieldSlot<Record, T, F>
where
    F: Field<T> + Send + Sync,
    Record: Send + Sync,
    T: Send + Sync,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn size(&self) -> usize {
        self.field.size()
    }

    fn write(&self, record: &Record, buf: &mut [u8], offset: usize) -> Result<(), CodecError> {
        let value = (self.get)(record);
        self.field.write(buf, offset, value)
    }

    fn read(&self, record: &mut Record, buf: &[u8], offset: usize) -> Result<(), CodecError> {
        let value = self.field.read(buf, offset)?;
        (self.set)(record, value);
        Ok(())
    }

    fn reset(&self, record: &mut Record) {
        (self.set)(record, self.field.nil());
    }
}

/// An ordered, fixed-layout mapping of field name to wire field for `Record`.
///
/// `total_size()` is computed once at `build()` and cached; it does not
/// depend on any particular `Record` value (string fields always cost
/// their declared maximum).
pub struct Schema<Record> {
    slots: Vec<Box<dyn SchemaSlot<Record>>>,
    total_size: usize,
}

impl<Record> Schema<Record> {
    pub fn builder() -> SchemaBuilder<Record> {
        SchemaBuilder { slots: Vec::new() }
    }

    /// Total wire size in bytes for any value of `Record`.
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    /// Exact byte count the caller should allocate before calling
    /// `encode_into`. Equal to `total_size()`: this schema's size never
    /// depends on the value (the zero-copy path still takes `value` to
    /// mirror the source contract and to leave room for future
    /// variable-width fields).
    pub fn calculate_size(&self, _value: &Record) -> usize {
        self.total_size
    }

    /// Allocate a fresh buffer sized to `total_size()` and write every
    /// field of `value` into it in schema order.
    pub fn encode(&self, value: &Record) -> Result<Vec<u8>, CodecError> {
        let mut buf = vec![0u8; self.total_size];
        self.encode_into(value, &mut buf, 0)?;
        Ok(buf)
    }

    /// Zero-copy encode: write `value`'s fields directly into `buf` starting
    /// at `offset`, returning the offset just past the written bytes.
    ///
    /// This is the preferred path when the caller already owns a
    /// sufficiently large buffer (e.g. a pooled one).
    pub fn encode_into(
        &self,
        value: &Record,
        buf: &mut [u8],
        offset: usize,
    ) -> Result<usize, CodecError> {
        if buf.len() < offset + self.total_size {
            return Err(CodecError::BufferTooSmall {
                needed: offset + self.total_size,
                available: buf.len(),
            });
        }
        let mut cursor = offset;
        for slot in &self.slots {
            slot.write(value, buf, cursor)?;
            cursor += slot.size();
        }
        Ok(cursor)
    }

    /// Decode every field of `bytes` into `target` in schema order.
    ///
    /// Requires `bytes.len() >= total_size()`; trailing bytes beyond the
    /// schema's size are ignored (callers that frame multiple records back
    /// to back use the returned cursor via `decode_from`).
    pub fn decode(&self, bytes: &[u8], target: &mut Record) -> Result<(), CodecError> {
        self.decode_from(bytes, 0, target)?;
        Ok(())
    }

    /// Decode starting at `offset`, returning the offset just past the
    /// consumed bytes so composite/nested records can be spliced in place.
    pub fn decode_from(
        &self,
        bytes: &[u8],
        offset: usize,
        target: &mut Record,
    ) -> Result<usize, CodecError> {
        if bytes.len() < offset + self.total_size {
            return Err(CodecError::BufferTooSmall {
                needed: offset + self.total_size,
                available: bytes.len(),
            });
        }
        let mut cursor = offset;
        for slot in &self.slots {
            slot.read(target, bytes, cursor)?;
            cursor += slot.size();
        }
        Ok(cursor)
    }

    /// Reset every field of `target` to its nil/default value. Used when
    /// recycling a pooled record between decodes.
    pub fn reset(&self, target: &mut Record) {
        for slot in &self.slots {
            slot.reset(target);
        }
    }

    /// Field names in wire order, for diagnostics.
    pub fn field_names(&self) -> Vec<&'static str> {
        self.slots.iter().map(|s| s.name()).collect()
    }
}

/// Builder for [`Schema`]: add fields in wire order, then `build()`.
pub struct SchemaBuilder<Record> {
    slots: Vec<Box<dyn SchemaSlot<Record>>>,
}

impl<Record: 'static + Send + Sync> SchemaBuilder<Record> {
    /// Append a field to the schema.
    ///
    /// `get`/`set` connect the field to `Record`'s storage; they are plain
    /// function pointers (not closures) so `Schema` stays `'static` and
    /// cheap to clone-by-reference across registries.
    pub fn field<T, F>(
        mut self,
        name: &'static str,
        field: F,
        get: fn(&Record) -> &T,
        set: fn(&mut Record, T),
    ) -> Self
    where
        F: Field<T> + Send + Sync + 'static,
        T: Send + Sync + 'static,
    {
        self.slots.push(Box::new(FieldSlot {
            name,
            field,
            get,
            set,
        }));
        self
    }

    pub fn build(self) -> Schema<Record> {
        let total_size = self.slots.iter().map(|s| s.size()).sum();
        Schema {
            slots: self.slots,
            total_size,
        }
    }
}
