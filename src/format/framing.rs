//! Framing header detection for compressed sub-block payloads.
//!
//! ZSTD1 payloads start with a small header ahead of the zstd stream:
//!
//! ```text
//! Byte 0:     Header length (N)
//! Byte 1:     Chunk type          (only when N > 1)
//! Byte 2:     Bit 0 = hi/lo byte packing (only when N > 1)
//! Bytes 3..N: Padding
//! ```
//!
//! A first byte of 0 or 1 is the whole header. Every other compression
//! kind carries its stream with no prefix. Nothing here decompresses.

use serde::Serialize;

use crate::error::FramingError;

use super::czi::CompressionKind;

/// Fixed bytes of a ZSTD1 header whose length byte exceeds 1
pub const ZSTD1_EXTENDED_HEADER_SIZE: usize = 3;

/// Longest header a ZSTD1 length byte can declare
pub const MAX_FRAMING_HEADER_SIZE: usize = u8::MAX as usize;

/// Framing header found at the start of a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FramingHeader {
    /// Bytes to skip before the compressed stream begins
    pub header_length: usize,

    /// Whether 16-bit samples are packed as separate hi/lo byte planes
    pub interleave_hint: bool,

    /// Chunk type byte, present only in the extended form
    pub chunk_type: Option<u8>,
}

/// Detect the framing header of a payload.
///
/// `raw` only needs to cover the header; reading [`MAX_FRAMING_HEADER_SIZE`]
/// bytes (or the whole payload, if shorter) is always enough.
pub fn detect(compression: CompressionKind, raw: &[u8]) -> Result<FramingHeader, FramingError> {
    if compression != CompressionKind::Zstd1 {
        return Ok(FramingHeader::default());
    }

    let declared = *raw.first().ok_or(FramingError::EmptyPayload)? as usize;

    if declared <= 1 {
        return Ok(FramingHeader {
            header_length: declared,
            interleave_hint: false,
            chunk_type: None,
        });
    }

    if declared < ZSTD1_EXTENDED_HEADER_SIZE {
        return Err(FramingError::HeaderTooShort {
            declared,
            required: ZSTD1_EXTENDED_HEADER_SIZE,
        });
    }
    if declared > raw.len() {
        return Err(FramingError::Truncated {
            declared,
            available: raw.len(),
        });
    }

    Ok(FramingHeader {
        header_length: declared,
        interleave_hint: raw[2] & 1 != 0,
        chunk_type: Some(raw[1]),
    })
}
