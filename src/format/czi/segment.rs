//! CZI segment framing.
//!
//! # Segment Header Structure (32 bytes)
//! ```text
//! Bytes 0-15:  Segment id (ASCII, NUL-padded)
//! Bytes 16-23: Allocated size of the body (i64)
//! Bytes 24-31: Used size of the body (i64, 0 = same as allocated)
//! ```
//!
//! The body follows the header directly. Segments are laid out back to back,
//! so the next one starts at `offset + 32 + allocated_size`.

use std::fmt;

use bytes::Bytes;
use serde::Serialize;
use tracing::debug;

use crate::error::{CziError, IoError};
use crate::format::range::ByteRange;
use crate::format::warning::{Warning, WarningKind};
use crate::io::{read_i64_le, RangeReader};

/// Size of a segment header in bytes
pub const SEGMENT_HEADER_SIZE: u64 = 32;

/// Size of the segment id field
pub const SEGMENT_ID_SIZE: usize = 16;

/// Segment kinds, identified by their 16-byte id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum SegmentKind {
    /// `ZISRAWFILE`
    FileHeader,
    /// `ZISRAWMETADATA`
    Metadata,
    /// `ZISRAWSUBBLOCK`
    SubBlock,
    /// `ZISRAWDIRECTORY`
    SubBlockDirectory,
    /// `ZISRAWATTACH`
    Attachment,
    /// `ZISRAWATTDIR`
    AttachmentDirectory,
    /// `DELETED`
    Deleted,
    /// Any other id, kept as found
    Unknown(String),
}

impl SegmentKind {
    /// Map a raw id to a kind. Trailing NUL padding is ignored.
    pub fn from_id(id: &[u8]) -> Self {
        let end = id.iter().position(|&b| b == 0).unwrap_or(id.len());
        match &id[..end] {
            b"ZISRAWFILE" => SegmentKind::FileHeader,
            b"ZISRAWMETADATA" => SegmentKind::Metadata,
            b"ZISRAWSUBBLOCK" => SegmentKind::SubBlock,
            b"ZISRAWDIRECTORY" => SegmentKind::SubBlockDirectory,
            b"ZISRAWATTACH" => SegmentKind::Attachment,
            b"ZISRAWATTDIR" => SegmentKind::AttachmentDirectory,
            b"DELETED" => SegmentKind::Deleted,
            other => SegmentKind::Unknown(String::from_utf8_lossy(other).into_owned()),
        }
    }

    /// The id string as written in the file.
    pub fn id(&self) -> &str {
        match self {
            SegmentKind::FileHeader => "ZISRAWFILE",
            SegmentKind::Metadata => "ZISRAWMETADATA",
            SegmentKind::SubBlock => "ZISRAWSUBBLOCK",
            SegmentKind::SubBlockDirectory => "ZISRAWDIRECTORY",
            SegmentKind::Attachment => "ZISRAWATTACH",
            SegmentKind::AttachmentDirectory => "ZISRAWATTDIR",
            SegmentKind::Deleted => "DELETED",
            SegmentKind::Unknown(id) => id,
        }
    }

    /// The 16-byte NUL-padded id.
    pub fn to_bytes(&self) -> [u8; SEGMENT_ID_SIZE] {
        let mut out = [0u8; SEGMENT_ID_SIZE];
        let id = self.id().as_bytes();
        let len = id.len().min(SEGMENT_ID_SIZE);
        out[..len].copy_from_slice(&id[..len]);
        out
    }
}

impl fmt::Display for SegmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// A parsed segment header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentHeader {
    /// Absolute offset of the segment header
    pub offset: u64,

    /// Segment kind
    pub kind: SegmentKind,

    /// Allocated body size
    pub allocated_size: u64,

    /// Used body size, with 0 already resolved to the allocated size
    pub used_size: u64,
}

impl SegmentHeader {
    /// Parse a segment header located at `offset`.
    ///
    /// Negative sizes are malformed. A used size larger than the allocated
    /// size is reported as a warning.
    pub fn parse(bytes: &[u8], offset: u64) -> Result<(Self, Vec<Warning>), CziError> {
        if bytes.len() < SEGMENT_HEADER_SIZE as usize {
            return Err(CziError::MalformedSegment {
                component: "segment header",
                offset,
                reason: format!("need {} bytes, got {}", SEGMENT_HEADER_SIZE, bytes.len()),
            });
        }

        let kind = SegmentKind::from_id(&bytes[..SEGMENT_ID_SIZE]);
        let allocated = read_i64_le(&bytes[16..24]);
        let used = read_i64_le(&bytes[24..32]);

        let size = |value: i64, name: &str| {
            u64::try_from(value).map_err(|_| CziError::MalformedSegment {
                component: "segment header",
                offset,
                reason: format!("{} segment has negative {} size {}", kind, name, value),
            })
        };
        let allocated_size = size(allocated, "allocated")?;
        let used_size = match size(used, "used")? {
            0 => allocated_size,
            used => used,
        };

        let mut warnings = Vec::new();
        if used_size > allocated_size {
            warnings.push(Warning::new(
                offset,
                WarningKind::UsedSizeExceedsAllocated {
                    used: used_size,
                    allocated: allocated_size,
                },
            ));
        }

        Ok((
            SegmentHeader {
                offset,
                kind,
                allocated_size,
                used_size,
            },
            warnings,
        ))
    }

    /// Absolute offset of the segment body.
    #[inline]
    pub fn body_offset(&self) -> u64 {
        self.offset + SEGMENT_HEADER_SIZE
    }

    /// Byte range of the used part of the body.
    pub fn body(&self) -> ByteRange {
        ByteRange::new(self.body_offset(), self.used_size)
    }

    /// Absolute offset of the segment that follows this one, if it does not
    /// overflow.
    pub fn next_offset(&self) -> Option<u64> {
        self.body_offset().checked_add(self.allocated_size)
    }
}

/// Read `len` bytes at `offset`, tagging failures with the component name.
pub(crate) async fn read_at<R: RangeReader>(
    reader: &R,
    component: &'static str,
    offset: u64,
    len: u64,
) -> Result<Bytes, CziError> {
    let source_error = |source: IoError| CziError::Source {
        component,
        offset,
        source,
    };
    let len = usize::try_from(len).map_err(|_| {
        source_error(IoError::RangeOutOfBounds {
            offset,
            requested: len,
            size: reader.size(),
        })
    })?;
    reader.read_exact_at(offset, len).await.map_err(source_error)
}

/// Absolute offset of a position stored relative to a container base.
pub(crate) fn absolute_position(
    reader_size: u64,
    component: &'static str,
    base: u64,
    position: u64,
) -> Result<u64, CziError> {
    base.checked_add(position).ok_or(CziError::Source {
        component,
        offset: base,
        source: IoError::RangeOutOfBounds {
            offset: position,
            requested: SEGMENT_HEADER_SIZE,
            size: reader_size,
        },
    })
}

/// Read the segment header at `offset` and check it has the expected kind.
///
/// A kind mismatch is a warning; the body is still interpreted as
/// `expected`.
pub(crate) async fn read_segment_header<R: RangeReader>(
    reader: &R,
    component: &'static str,
    offset: u64,
    expected: SegmentKind,
) -> Result<(SegmentHeader, Vec<Warning>), CziError> {
    let bytes = read_at(reader, component, offset, SEGMENT_HEADER_SIZE).await?;
    let (header, mut warnings) = SegmentHeader::parse(&bytes, offset)?;

    if header.kind != expected {
        warnings.push(Warning::new(
            offset,
            WarningKind::SegmentKindMismatch {
                expected: expected.id().to_string(),
                found: header.kind.id().to_string(),
            },
        ));
    }

    Ok((header, warnings))
}

/// Read the used part of a segment body.
pub(crate) async fn read_body<R: RangeReader>(
    reader: &R,
    component: &'static str,
    header: &SegmentHeader,
) -> Result<Bytes, CziError> {
    read_at(reader, component, header.body_offset(), header.used_size).await
}

/// Result of a flat scan over consecutive segments.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SegmentScan {
    /// Segment headers in file order
    pub segments: Vec<SegmentHeader>,

    /// Findings from the scan
    pub warnings: Vec<Warning>,
}

/// Walk consecutive segment headers starting at `start`.
///
/// The scan stops when fewer than 32 bytes remain, or when a segment's
/// allocated size runs past the end of the source.
pub async fn scan_segments<R: RangeReader>(
    reader: &R,
    start: u64,
) -> Result<SegmentScan, CziError> {
    let size = reader.size();
    let mut scan = SegmentScan::default();
    let mut offset = start;

    while size.saturating_sub(offset) >= SEGMENT_HEADER_SIZE {
        let bytes = read_at(reader, "segment header", offset, SEGMENT_HEADER_SIZE).await?;
        let (header, warnings) = SegmentHeader::parse(&bytes, offset)?;
        scan.warnings.extend(warnings);

        debug!(
            offset,
            kind = %header.kind,
            allocated = header.allocated_size,
            used = header.used_size,
            "Scanned segment"
        );

        let next = header.next_offset().filter(|&next| next <= size);
        let allocated = header.allocated_size;
        scan.segments.push(header);

        match next {
            Some(next) => offset = next,
            None => {
                scan.warnings
                    .push(Warning::new(offset, WarningKind::SegmentOverflow { allocated }));
                break;
            }
        }
    }

    Ok(scan)
}
