//! Typed field decoding.
//!
//! A directory record declares a field type and an element count; this module
//! turns the corresponding bytes into a [`Value`]. All fields are
//! little-endian.
//!
//! The set of field types is closed. Types outside it cannot be sized, so
//! [`decode_raw`] hands back a [`Value::Unknown`] placeholder carrying the raw
//! bytes for diagnostics instead of failing.

use serde::Serialize;

use crate::error::FieldError;

// =============================================================================
// FieldType
// =============================================================================

/// TIFF field types that determine how values are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u16)]
pub enum FieldType {
    /// Unsigned 8-bit integer
    Byte = 1,

    /// 8-bit ASCII character, NUL-terminated
    Ascii = 2,

    /// Unsigned 16-bit integer
    Short = 3,

    /// Unsigned 32-bit integer
    Long = 4,

    /// Two unsigned 32-bit integers: numerator, denominator
    Rational = 5,

    /// Signed 8-bit integer
    SByte = 6,

    /// Opaque byte
    Undefined = 7,

    /// Signed 16-bit integer
    SShort = 8,

    /// Signed 32-bit integer
    SLong = 9,

    /// Two signed 32-bit integers: numerator, denominator
    SRational = 10,

    /// IEEE-754 single precision
    Float = 11,

    /// IEEE-754 double precision
    Double = 12,

    /// Unsigned 64-bit integer
    Long8 = 16,

    /// Signed 64-bit integer
    SLong8 = 17,
}

impl FieldType {
    /// Size of a single element of this type in bytes.
    #[inline]
    pub const fn size_in_bytes(self) -> usize {
        match self {
            FieldType::Byte | FieldType::Ascii | FieldType::SByte | FieldType::Undefined => 1,
            FieldType::Short | FieldType::SShort => 2,
            FieldType::Long | FieldType::SLong | FieldType::Float => 4,
            FieldType::Rational
            | FieldType::SRational
            | FieldType::Double
            | FieldType::Long8
            | FieldType::SLong8 => 8,
        }
    }

    /// Create a FieldType from its numeric value.
    ///
    /// Returns `None` for unknown type values.
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(FieldType::Byte),
            2 => Some(FieldType::Ascii),
            3 => Some(FieldType::Short),
            4 => Some(FieldType::Long),
            5 => Some(FieldType::Rational),
            6 => Some(FieldType::SByte),
            7 => Some(FieldType::Undefined),
            8 => Some(FieldType::SShort),
            9 => Some(FieldType::SLong),
            10 => Some(FieldType::SRational),
            11 => Some(FieldType::Float),
            12 => Some(FieldType::Double),
            16 => Some(FieldType::Long8),
            17 => Some(FieldType::SLong8),
            _ => None,
        }
    }

    /// Total byte size of `count` elements of this type.
    #[inline]
    pub const fn total_size(self, count: u32) -> u64 {
        self.size_in_bytes() as u64 * count as u64
    }
}

// =============================================================================
// Value
// =============================================================================

/// A decoded field value.
///
/// Every variant carries all `count` elements; a value is scalar when it
/// holds exactly one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Value {
    Byte(Vec<u8>),
    Ascii(String),
    Short(Vec<u16>),
    Long(Vec<u32>),
    Long8(Vec<u64>),
    SByte(Vec<i8>),
    SShort(Vec<i16>),
    SLong(Vec<i32>),
    SLong8(Vec<i64>),
    Rational(Vec<(u32, u32)>),
    SRational(Vec<(i32, i32)>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Undefined(Vec<u8>),
    /// Placeholder for a type outside the known set
    Unknown { field_type: u16, raw: Vec<u8> },
}

impl Value {
    /// Number of elements.
    ///
    /// ASCII values count characters before the first NUL.
    pub fn len(&self) -> usize {
        match self {
            Value::Byte(v) | Value::Undefined(v) => v.len(),
            Value::Ascii(s) => s.len(),
            Value::Short(v) => v.len(),
            Value::Long(v) => v.len(),
            Value::Long8(v) => v.len(),
            Value::SByte(v) => v.len(),
            Value::SShort(v) => v.len(),
            Value::SLong(v) => v.len(),
            Value::SLong8(v) => v.len(),
            Value::Rational(v) => v.len(),
            Value::SRational(v) => v.len(),
            Value::Float(v) => v.len(),
            Value::Double(v) => v.len(),
            Value::Unknown { raw, .. } => raw.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the value holds exactly one element.
    pub fn is_scalar(&self) -> bool {
        self.len() == 1
    }

    /// Unsigned integer elements widened to u64.
    ///
    /// Returns `None` for non-integer or signed types.
    pub fn to_u64_vec(&self) -> Option<Vec<u64>> {
        match self {
            Value::Byte(v) => Some(v.iter().map(|&x| x as u64).collect()),
            Value::Short(v) => Some(v.iter().map(|&x| x as u64).collect()),
            Value::Long(v) => Some(v.iter().map(|&x| x as u64).collect()),
            Value::Long8(v) => Some(v.clone()),
            _ => None,
        }
    }

    /// First unsigned integer element widened to u64.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Byte(v) => v.first().map(|&x| x as u64),
            Value::Short(v) => v.first().map(|&x| x as u64),
            Value::Long(v) => v.first().map(|&x| x as u64),
            Value::Long8(v) => v.first().copied(),
            _ => None,
        }
    }

    /// String contents of an ASCII value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Ascii(s) => Some(s),
            _ => None,
        }
    }
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode `count` elements of `field_type` from `bytes`.
///
/// `bytes` must be exactly `count * field_type.size_in_bytes()` long.
pub fn decode(field_type: FieldType, count: u32, bytes: &[u8]) -> Result<Value, FieldError> {
    let expected = field_type.total_size(count);
    if bytes.len() as u64 != expected {
        return Err(FieldError::LengthMismatch {
            field_type,
            expected,
            actual: bytes.len() as u64,
        });
    }

    let width = field_type.size_in_bytes();
    let value = match field_type {
        FieldType::Byte => Value::Byte(bytes.to_vec()),
        FieldType::Undefined => Value::Undefined(bytes.to_vec()),
        FieldType::Ascii => {
            let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
            Value::Ascii(String::from_utf8_lossy(&bytes[..end]).into_owned())
        }
        FieldType::SByte => Value::SByte(bytes.iter().map(|&b| b as i8).collect()),
        FieldType::Short => Value::Short(elements(bytes, width, le_u16)),
        FieldType::SShort => Value::SShort(elements(bytes, width, |c| le_u16(c) as i16)),
        FieldType::Long => Value::Long(elements(bytes, width, le_u32)),
        FieldType::SLong => Value::SLong(elements(bytes, width, |c| le_u32(c) as i32)),
        FieldType::Float => Value::Float(elements(bytes, width, |c| f32::from_bits(le_u32(c)))),
        FieldType::Long8 => Value::Long8(elements(bytes, width, le_u64)),
        FieldType::SLong8 => Value::SLong8(elements(bytes, width, |c| le_u64(c) as i64)),
        FieldType::Double => Value::Double(elements(bytes, width, |c| f64::from_bits(le_u64(c)))),
        FieldType::Rational => Value::Rational(elements(bytes, width, |c| {
            (le_u32(&c[..4]), le_u32(&c[4..]))
        })),
        FieldType::SRational => Value::SRational(elements(bytes, width, |c| {
            (le_u32(&c[..4]) as i32, le_u32(&c[4..]) as i32)
        })),
    };

    Ok(value)
}

/// Decode a field whose type is given by its raw numeric value.
///
/// Unknown types yield [`Value::Unknown`] holding `bytes` unchanged.
pub fn decode_raw(raw_type: u16, count: u32, bytes: &[u8]) -> Result<Value, FieldError> {
    match FieldType::from_u16(raw_type) {
        Some(field_type) => decode(field_type, count, bytes),
        None => Ok(Value::Unknown {
            field_type: raw_type,
            raw: bytes.to_vec(),
        }),
    }
}

fn elements<T>(bytes: &[u8], width: usize, read: impl Fn(&[u8]) -> T) -> Vec<T> {
    bytes.chunks_exact(width).map(read).collect()
}

#[inline]
fn le_u16(c: &[u8]) -> u16 {
    u16::from_le_bytes([c[0], c[1]])
}

#[inline]
fn le_u32(c: &[u8]) -> u32 {
    u32::from_le_bytes([c[0], c[1], c[2], c[3]])
}

#[inline]
fn le_u64(c: &[u8]) -> u64 {
    u64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]])
}
