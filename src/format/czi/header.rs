//! CZI file header segment (`ZISRAWFILE`).
//!
//! # Body Structure (80 bytes used)
//! ```text
//! Bytes 0-3:   Major version
//! Bytes 4-7:   Minor version
//! Bytes 8-15:  Reserved
//! Bytes 16-31: Primary file GUID
//! Bytes 32-47: File GUID
//! Bytes 48-51: File part
//! Bytes 52-59: Sub-block directory position
//! Bytes 60-67: Metadata position
//! Bytes 68-71: Update pending flag
//! Bytes 72-79: Attachment directory position
//! ```
//!
//! Positions are relative to the start of the enclosing container. Zero
//! means the segment is absent.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::error::CziError;
use crate::io::{read_i32_le, read_i64_le};

use super::segment::SegmentHeader;

/// Size of the file header body fields
pub const FILE_HEADER_BODY_SIZE: usize = 80;

/// Signature at the start of every CZI container
pub const CZI_MAGIC: &[u8; 10] = b"ZISRAWFILE";

/// A 16-byte GUID in its on-disk (mixed-endian) layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Guid(pub [u8; 16]);

impl Guid {
    pub fn from_slice(bytes: &[u8]) -> Self {
        let mut out = [0u8; 16];
        out.copy_from_slice(&bytes[..16]);
        Guid(out)
    }

    pub fn is_nil(&self) -> bool {
        self.0 == [0u8; 16]
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:08X}-{:04X}-{:04X}-{:02X}{:02X}-",
            u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            u16::from_le_bytes([b[4], b[5]]),
            u16::from_le_bytes([b[6], b[7]]),
            b[8],
            b[9]
        )?;
        for byte in &b[10..] {
            write!(f, "{:02X}", byte)?;
        }
        Ok(())
    }
}

impl Serialize for Guid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Parsed file header segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileHeader {
    /// Segment header
    pub segment: SegmentHeader,

    pub major: i32,
    pub minor: i32,

    /// GUID shared by all parts of a multi-file image
    pub primary_file_guid: Guid,

    /// GUID of this part
    pub file_guid: Guid,

    /// Index of this part in a multi-file image
    pub file_part: i32,

    /// Sub-block directory position relative to the container
    pub directory_position: Option<u64>,

    /// Metadata position relative to the container
    pub metadata_position: Option<u64>,

    /// Set while a writer has not finished updating the file
    pub update_pending: bool,

    /// Attachment directory position relative to the container
    pub attachment_directory_position: Option<u64>,
}

impl FileHeader {
    /// Parse the file header body.
    pub fn parse(segment: SegmentHeader, body: &[u8]) -> Result<Self, CziError> {
        let offset = segment.offset;
        if body.len() < FILE_HEADER_BODY_SIZE {
            return Err(CziError::MalformedSegment {
                component: "file header",
                offset,
                reason: format!(
                    "body has {} bytes, need {}",
                    body.len(),
                    FILE_HEADER_BODY_SIZE
                ),
            });
        }

        let position = |at: usize, name: &str| -> Result<Option<u64>, CziError> {
            let value = read_i64_le(&body[at..at + 8]);
            match u64::try_from(value) {
                Ok(0) => Ok(None),
                Ok(position) => Ok(Some(position)),
                Err(_) => Err(CziError::MalformedSegment {
                    component: "file header",
                    offset,
                    reason: format!("negative {} position {}", name, value),
                }),
            }
        };

        let directory_position = position(52, "directory")?;
        let metadata_position = position(60, "metadata")?;
        let attachment_directory_position = position(72, "attachment directory")?;

        Ok(FileHeader {
            major: read_i32_le(&body[0..4]),
            minor: read_i32_le(&body[4..8]),
            primary_file_guid: Guid::from_slice(&body[16..32]),
            file_guid: Guid::from_slice(&body[32..48]),
            file_part: read_i32_le(&body[48..52]),
            directory_position,
            metadata_position,
            update_pending: read_i32_le(&body[68..72]) != 0,
            attachment_directory_position,
            segment,
        })
    }
}

/// Quick signature check used by format detection.
pub fn is_czi_header(bytes: &[u8]) -> bool {
    bytes.starts_with(CZI_MAGIC)
}
