//! Field descriptors: the fixed-size, endianness-explicit building blocks
//! schemas are assembled from.
//!
//! Every field has a fixed wire `size()` that does not depend on the value
//! being written (strings always cost their declared max). Endianness is
//! part of the field, never "whatever the host happens to be" — wire bytes
//! must mean the same thing on every machine that speaks this protocol.

use crate::error::CodecError;

/// Byte order used by a multi-byte numeric field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endian {
    #[default]
    Big,
    Little,
}

/// A fixed-size wire field for values of type `T`.
///
/// Implementors must guarantee `size()` is constant for a given instance
/// (it may differ between instances, e.g. two `StringField`s with
/// different `max_bytes`, but never between calls on the same instance).
pub trait Field<T>: Send + Sync {
    /// Wire size in bytes, independent of `value`.
    fn size(&self) -> usize;

    /// Write `value` into `buf[offset..offset + size()]`.
    ///
    /// # Panics
    /// May panic if `buf` is shorter than `offset + size()`; callers
    /// (`Schema`) are expected to check bounds before calling.
    fn write(&self, buf: &mut [u8], offset: usize, value: &T) -> Result<(), CodecError>;

    /// Read a value from `buf[offset..offset + size()]`.
    fn read(&self, buf: &[u8], offset: usize) -> Result<T, CodecError>;

    /// The zero/default value for this field, used to reset pooled records.
    fn nil(&self) -> T;
}

macro_rules! int_field {
    ($name:ident, $ty:ty, $size:expr) => {
        /// Fixed-width integer field.
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name {
            pub endian: Endian,
        }

        impl $name {
            pub fn new(endian: Endian) -> Self {
                Self { endian }
            }

            pub fn big_endian() -> Self {
                Self {
                    endian: Endian::Big,
                }
            }

            pub fn little_endian() -> Self {
                Self {
                    endian: Endian::Little,
                }
            }
        }

        impl Field<$ty> for $name {
            fn size(&self) -> usize {
                $size
            }

            fn write(&self, buf: &mut [u8], offset: usize, value: &$ty) -> Result<(), CodecError> {
                let bytes = match self.endian {
                    Endian::Big => value.to_be_bytes(),
                    Endian::Little => value.to_le_bytes(),
                };
                buf[offset..offset + $size].copy_from_slice(&bytes);
                Ok(())
            }

            fn read(&self, buf: &[u8], offset: usize) -> Result<$ty, CodecError> {
                let mut bytes = [0u8; $size];
                bytes.copy_from_slice(&buf[offset..offset + $size]);
                Ok(match self.endian {
                    Endian::Big => <$ty>::from_be_bytes(bytes),
                    Endian::Little => <$ty>::from_le_bytes(bytes),
                })
            }

            fn nil(&self) -> $ty {
                <$ty>::default()
            }
        }
    };
}

int_field!(U16Field, u16, 2);
int_field!(I16Field, i16, 2);
int_field!(U32Field, u32, 4);
int_field!(I32Field, i32, 4);
int_field!(F32Field, f32, 4);
int_field!(F64Field, f64, 8);

/// Single-byte unsigned integer field (no endianness).
#[derive(Debug, Clone, Copy, Default)]
pub struct U8Field;

impl Field<u8> for U8Field {
    fn size(&self) -> usize {
        1
    }

    fn write(&self, buf: &mut [u8], offset: usize, value: &u8) -> Result<(), CodecError> {
        buf[offset] = *value;
        Ok(())
    }

    fn read(&self, buf: &[u8], offset: usize) -> Result<u8, CodecError> {
        Ok(buf[offset])
    }

    fn nil(&self) -> u8 {
        0
    }
}

/// Single-byte signed integer field (no endianness).
#[derive(Debug, Clone, Copy, Default)]
pub struct I8Field;

impl Field<i8> for I8Field {
    fn size(&self) -> usize {
        1
    }

    fn write(&self, buf: &mut [u8], offset: usize, value: &i8) -> Result<(), CodecError> {
        buf[offset] = *value as u8;
        Ok(())
    }

    fn read(&self, buf: &[u8], offset: usize) -> Result<i8, CodecError> {
        Ok(buf[offset] as i8)
    }

    fn nil(&self) -> i8 {
        0
    }
}

/// Boolean field, stored as a single byte (0 = false, any nonzero = true).
#[derive(Debug, Clone, Copy, Default)]
pub struct BoolField;

impl Field<bool> for BoolField {
    fn size(&self) -> usize {
        1
    }

    fn write(&self, buf: &mut [u8], offset: usize, value: &bool) -> Result<(), CodecError> {
        buf[offset] = u8::from(*value);
        Ok(())
    }

    fn read(&self, buf: &[u8], offset: usize) -> Result<bool, CodecError> {
        Ok(buf[offset] != 0)
    }

    fn nil(&self) -> bool {
        false
    }
}

/// Length-prefixed UTF-8 string field with a fixed maximum body size.
///
/// Wire layout: `[u16 length][utf8 bytes][zero padding to max_bytes]`.
/// Total size is always `2 + max_bytes`, matching the invariant that
/// schema size never depends on the actual value.
#[derive(Debug, Clone, Copy)]
pub struct StringField {
    pub name: &'static str,
    pub max_bytes: usize,
    pub endian: Endian,
}

impl StringField {
    pub fn new(name: &'static str, max_bytes: usize) -> Self {
        Self {
            name,
            max_bytes,
            endian: Endian::Big,
        }
    }
}

impl Field<String> for StringField {
    fn size(&self) -> usize {
        2 + self.max_bytes
    }

    fn write(&self, buf: &mut [u8], offset: usize, value: &String) -> Result<(), CodecError> {
        let body = value.as_bytes();
        if body.len() > self.max_bytes {
            return Err(CodecError::StringOverflow {
                field: self.name,
                max_bytes: self.max_bytes,
                actual: body.len(),
            });
        }
        let len_field = U16Field { endian: self.endian };
        len_field.write(buf, offset, &(body.len() as u16))?;
        let body_start = offset + 2;
        buf[body_start..body_start + body.len()].copy_from_slice(body);
        for b in &mut buf[body_start + body.len()..body_start + self.max_bytes] {
            *b = 0;
        }
        Ok(())
    }

    fn read(&self, buf: &[u8], offset: usize) -> Result<String, CodecError> {
        let len_field = U16Field { endian: self.endian };
        let len = len_field.read(buf, offset)? as usize;
        let len = len.min(self.max_bytes);
        let body_start = offset + 2;
        let bytes = &buf[body_start..body_start + len];
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8 { field: self.name })
    }

    fn nil(&self) -> String {
        String::new()
    }
}

/// Two-lane floating point vector field (`[x, y]`), `f32` lanes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Vec2Field {
    pub endian: Endian,
}

impl Field<[f32; 2]> for Vec2Field {
    fn size(&self) -> usize {
        8
    }

    fn write(&self, buf: &mut [u8], offset: usize, value: &[f32; 2]) -> Result<(), CodecError> {
        let f = F32Field { endian: self.endian };
        f.write(buf, offset, &value[0])?;
        f.write(buf, offset + 4, &value[1])?;
        Ok(())
    }

    fn read(&self, buf: &[u8], offset: usize) -> Result<[f32; 2], CodecError> {
        let f = F32Field { endian: self.endian };
        Ok([f.read(buf, offset)?, f.read(buf, offset + 4)?])
    }

    fn nil(&self) -> [f32; 2] {
        [0.0, 0.0]
    }
}

/// Three-lane floating point vector field (`[x, y, z]`), `f32` lanes.
#[derive(Debug, Clone, Copy, Default)]
pub struct Vec3Field {
    pub endian: Endian,
}

impl Field<[f32; 3]> for Vec3Field {
    fn size(&self) -> usize {
        12
    }

    fn write(&self, buf: &mut [u8], offset: usize, value: &[f32; 3]) -> Result<(), CodecError> {
        let f = F32Field { endian: self.endian };
        f.write(buf, offset, &value[0])?;
        f.write(buf, offset + 4, &value[1])?;
        f.write(buf, offset + 8, &value[2])?;
        Ok(())
    }

    fn read(&self, buf: &[u8], offset: usize) -> Result<[f32; 3], CodecError> {
        let f = F32Field { endian: self.endian };
        Ok([
            f.read(buf, offset)?,
            f.read(buf, offset + 4)?,
            f.read(buf, offset + 8)?,
        ])
    }

    fn nil(&self) -> [f32; 3] {
        [0.0, 0.0, 0.0]
    }
}

/// Four-lane 8-bit-per-channel color field (`[r, g, b, a]`).
#[derive(Debug, Clone, Copy, Default)]
pub struct RgbaField;

impl Field<[u8; 4]> for RgbaField {
    fn size(&self) -> usize {
        4
    }

    fn write(&self, buf: &mut [u8], offset: usize, value: &[u8; 4]) -> Result<(), CodecError> {
        buf[offset..offset + 4].copy_from_slice(value);
        Ok(())
    }

    fn read(&self, buf: &[u8], offset: usize) -> Result<[u8; 4], CodecError> {
        let mut v = [0u8; 4];
        v.copy_from_slice(&buf[offset..offset + 4]);
        Ok(v)
    }

    fn nil(&self) -> [u8; 4] {
        [0, 0, 0, 0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u32_big_endian_roundtrip() {
        let f = U32Field::big_endian();
        let mut buf = [0u8; 4];
        f.write(&mut buf, 0, &0x01020304u32).unwrap();
        assert_eq!(buf, [0x01, 0x02, 0x03, 0x04]);
        assert_eq!(f.read(&buf, 0).unwrap(), 0x01020304);
    }

    #[test]
    fn u32_little_endian_roundtrip() {
        let f = U32Field::little_endian();
        let mut buf = [0u8; 4];
        f.write(&mut buf, 0, &0x01020304u32).unwrap();
        assert_eq!(buf, [0x04, 0x03, 0x02, 0x01]);
        assert_eq!(f.read(&buf, 0).unwrap(), 0x01020304);
    }

    #[test]
    fn string_field_pads_and_truncates_on_read() {
        let f = StringField::new("name", 8);
        let mut buf = vec![0xAAu8; f.size()];
        f.write(&mut buf, 0, &"hi".to_string()).unwrap();
        assert_eq!(&buf[0..2], &2u16.to_be_bytes());
        assert_eq!(&buf[2..4], b"hi");
        assert!(buf[4..10].iter().all(|&b| b == 0));
        assert_eq!(f.read(&buf, 0).unwrap(), "hi");
    }

    #[test]
    fn string_field_overflow_is_rejected() {
        let f = StringField::new("name", 2);
        let mut buf = vec![0u8; f.size()];
        let err = f.write(&mut buf, 0, &"too long".to_string()).unwrap_err();
        assert!(matches!(err, CodecError::StringOverflow { .. }));
    }

    #[test]
    fn bool_field_roundtrip() {
        let f = BoolField;
        let mut buf = [0u8; 1];
        f.write(&mut buf, 0, &true).unwrap();
        assert_eq!(f.read(&buf, 0).unwrap(), true);
        f.write(&mut buf, 0, &false).unwrap();
        assert_eq!(f.read(&buf, 0).unwrap(), false);
    }

    #[test]
    fn vec2_field_roundtrip() {
        let f = Vec2Field::default();
        let mut buf = [0u8; 8];
        f.write(&mut buf, 0, &[1.5f32, -2.5f32]).unwrap();
        assert_eq!(f.read(&buf, 0).unwrap(), [1.5, -2.5]);
    }

    #[test]
    fn rgba_field_roundtrip() {
        let f = RgbaField;
        let mut buf = [0u8; 4];
        f.write(&mut buf, 0, &[10, 20, 30, 255]).unwrap();
        assert_eq!(f.read(&buf, 0).unwrap(), [10, 20, 30, 255]);
    }
}
