//! NDPI file header.
//!
//! # Header Structure (12 bytes)
//! ```text
//! Bytes 0-1:  Byte order ("II", little-endian only)
//! Bytes 2-3:  Version (42)
//! Bytes 4-11: Offset to first directory (8 bytes)
//! ```
//!
//! Baseline TIFF stores a 4-byte first-directory offset; NDPI widens it to
//! 8 bytes and the decoder reads it that way unconditionally.

use serde::Serialize;

use crate::error::NdpiError;
use crate::format::warning::{Warning, WarningKind};
use crate::io::read_u64_le;

/// Expected first four bytes: "II" then version 42, little-endian.
pub const NDPI_MAGIC: [u8; 4] = [0x49, 0x49, 0x2A, 0x00];

/// Size of the NDPI header in bytes
pub const NDPI_HEADER_SIZE: usize = 12;

/// Parsed NDPI header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NdpiHeader {
    /// Byte order marker and version as found in the file
    pub magic: [u8; 4],

    /// Absolute offset of the first directory
    pub first_directory_offset: u64,
}

impl NdpiHeader {
    /// Parse the header from raw bytes.
    ///
    /// A magic mismatch is reported as a warning and decoding proceeds with
    /// the declared layout.
    pub fn parse(bytes: &[u8]) -> Result<(Self, Option<Warning>), NdpiError> {
        if bytes.len() < NDPI_HEADER_SIZE {
            return Err(NdpiError::FileTooSmall {
                required: NDPI_HEADER_SIZE as u64,
                actual: bytes.len() as u64,
            });
        }

        let magic = [bytes[0], bytes[1], bytes[2], bytes[3]];
        let header = NdpiHeader {
            magic,
            first_directory_offset: read_u64_le(&bytes[4..12]),
        };

        let warning = (!header.has_valid_magic()).then(|| {
            Warning::new(
                0,
                WarningKind::InvalidMagic {
                    expected: NDPI_MAGIC.to_vec(),
                    found: magic.to_vec(),
                },
            )
        });

        Ok((header, warning))
    }

    #[inline]
    pub fn has_valid_magic(&self) -> bool {
        self.magic == NDPI_MAGIC
    }
}

/// Quick signature check used by format detection.
///
/// Only the little-endian byte order marker is required; a wrong version is
/// left for the decoder to warn about.
pub fn is_ndpi_header(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0..2] == NDPI_MAGIC[0..2]
}
