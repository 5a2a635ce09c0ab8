//! Byte ranges into the source, plus serde helpers for decoded results.

use std::fmt;

use serde::{Serialize, Serializer};

/// A half-open byte range `[offset, offset + length)` in the source.
///
/// This is what the decoder hands to downstream codecs and metadata parsers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct ByteRange {
    /// Absolute start offset
    pub offset: u64,

    /// Length in bytes
    pub length: u64,
}

impl ByteRange {
    pub const fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    /// Absolute end offset (exclusive), saturating on overflow.
    #[inline]
    pub const fn end(&self) -> u64 {
        self.offset.saturating_add(self.length)
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Whether the range lies entirely within a source of `size` bytes.
    pub fn fits_within(&self, size: u64) -> bool {
        self.offset
            .checked_add(self.length)
            .is_some_and(|end| end <= size)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.offset, self.end())
    }
}

/// Serialize a `Result` with its error rendered through `Display`.
pub(crate) fn serialize_result<T, E, S>(
    value: &Result<T, E>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    T: Serialize,
    E: fmt::Display,
    S: Serializer,
{
    match value {
        Ok(v) => serializer.serialize_newtype_variant("Result", 0, "Ok", v),
        Err(e) => serializer.serialize_newtype_variant("Result", 1, "Err", &e.to_string()),
    }
}

/// Serialize an optional `Result` with its error rendered through `Display`.
pub(crate) fn serialize_option_result<T, E, S>(
    value: &Option<Result<T, E>>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    T: Serialize,
    E: fmt::Display,
    S: Serializer,
{
    match value {
        None => serializer.serialize_none(),
        Some(result) => serializer.serialize_some(&DisplayResult(result)),
    }
}

struct DisplayResult<'a, T, E>(&'a Result<T, E>);

impl<T: Serialize, E: fmt::Display> Serialize for DisplayResult<'_, T, E> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_result(self.0, serializer)
    }
}
