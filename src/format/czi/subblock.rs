//! Sub-block directory (`ZISRAWDIRECTORY`) and sub-block segments
//! (`ZISRAWSUBBLOCK`).
//!
//! # Directory Body Structure
//! ```text
//! Bytes 0-3:   Entry count
//! Bytes 4-127: Reserved
//! Bytes 128-:  Consecutive DV entries
//! ```
//!
//! # Sub-block Body Structure
//! ```text
//! Bytes 0-3:   Metadata size
//! Bytes 4-7:   Attachment size
//! Bytes 8-15:  Data size
//! Bytes 16-:   DV entry copy, padded so the fixed part spans
//!              max(256, 16 + entry size) bytes
//! Then:        Metadata, pixel data, attachment
//! ```
//!
//! Every entry in the directory is resolved eagerly into its sub-block.

use serde::Serialize;
use tracing::debug;

use crate::error::{CziError, FramingError};
use crate::format::framing::{self, FramingHeader, MAX_FRAMING_HEADER_SIZE};
use crate::format::range::{serialize_result, ByteRange};
use crate::format::warning::{Warning, WarningKind};
use crate::io::{read_i32_le, read_i64_le, RangeReader};

use super::entry::{
    CompressionKind, DirectoryEntry, DIMENSION_ENTRY_SIZE, DIRECTORY_ENTRY_FIXED_SIZE,
};
use super::segment::{
    absolute_position, read_at, read_body, read_segment_header, SegmentHeader, SegmentKind,
};

/// Bytes before the first entry in a sub-block directory body
pub const SUBBLOCK_DIRECTORY_PREFIX_SIZE: usize = 128;

/// Size fields ahead of the entry copy in a sub-block body
pub const SUBBLOCK_SIZES_SIZE: u64 = 16;

/// Minimum size of the fixed part of a sub-block body
pub const SUBBLOCK_MIN_PREFIX_SIZE: u64 = 256;

/// Resolved sub-block segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubBlock {
    pub segment: SegmentHeader,

    /// Entry copy stored inside the sub-block
    pub entry: DirectoryEntry,

    /// Sub-block XML metadata
    pub metadata: ByteRange,

    /// Pixel data, including any framing header
    pub data: ByteRange,

    /// Sub-block attachment (e.g. a validity mask)
    pub attachment: ByteRange,

    /// Framing header at the start of `data`
    #[serde(serialize_with = "serialize_result")]
    pub framing: Result<FramingHeader, FramingError>,

    pub warnings: Vec<Warning>,
}

impl SubBlock {
    /// Read the sub-block segment at absolute `offset`, checking its entry
    /// copy against `listed`, the copy found in the directory.
    pub async fn read<R: RangeReader>(
        reader: &R,
        offset: u64,
        listed: &DirectoryEntry,
    ) -> Result<Self, CziError> {
        let (segment, mut warnings) =
            read_segment_header(reader, "sub-block", offset, SegmentKind::SubBlock).await?;
        let body_offset = segment.body_offset();
        let body_end = segment.body().end();

        let malformed = |reason: String| CziError::MalformedSegment {
            component: "sub-block",
            offset,
            reason,
        };

        // Sizes and the fixed part of the entry first; the dimension count
        // decides how much more to read.
        let fixed_len = SUBBLOCK_SIZES_SIZE + DIRECTORY_ENTRY_FIXED_SIZE as u64;
        if !ByteRange::new(body_offset, fixed_len).fits_within(body_end) {
            return Err(malformed(format!(
                "body has {} bytes, need at least {}",
                segment.used_size, fixed_len
            )));
        }
        let fixed = read_at(reader, "sub-block", body_offset, fixed_len).await?;

        let entry_offset = body_offset + SUBBLOCK_SIZES_SIZE;
        let dimension_count = DirectoryEntry::declared_dimension_count(
            &fixed[SUBBLOCK_SIZES_SIZE as usize..],
            entry_offset,
        )?;
        let entry_len = dimension_count
            .checked_mul(DIMENSION_ENTRY_SIZE)
            .and_then(|n| n.checked_add(DIRECTORY_ENTRY_FIXED_SIZE))
            .map(|n| n as u64)
            .filter(|&n| ByteRange::new(entry_offset, n).fits_within(body_end))
            .ok_or_else(|| {
                malformed(format!(
                    "{} dimensions do not fit in a {} byte body",
                    dimension_count, segment.used_size
                ))
            })?;
        let entry_bytes = read_at(reader, "sub-block entry", entry_offset, entry_len).await?;
        let entry = DirectoryEntry::parse(&entry_bytes, entry_offset)?;

        let size = |at: usize, value: i64, name: &str| {
            u64::try_from(value).map_err(|_| CziError::MalformedSegment {
                component: "sub-block",
                offset: body_offset + at as u64,
                reason: format!("negative {} size {}", name, value),
            })
        };
        let metadata_size = size(0, read_i32_le(&fixed[0..4]) as i64, "metadata")?;
        let attachment_size = size(4, read_i32_le(&fixed[4..8]) as i64, "attachment")?;
        let data_size = size(8, read_i64_le(&fixed[8..16]), "data")?;

        let prefix = SUBBLOCK_MIN_PREFIX_SIZE.max(SUBBLOCK_SIZES_SIZE + entry.size() as u64);
        let metadata = ByteRange::new(body_offset + prefix, metadata_size);
        let data = ByteRange::new(metadata.end(), data_size);
        let attachment = ByteRange::new(data.end(), attachment_size);

        // Ranges are contiguous, so the last one bounds them all
        if !attachment.fits_within(body_end) {
            return Err(malformed(format!(
                "declared sizes (metadata {}, data {}, attachment {}) overrun a {} byte body",
                metadata_size, data_size, attachment_size, segment.used_size
            )));
        }

        if let Some(field) = entry.first_mismatch(listed) {
            warnings.push(Warning::new(
                offset,
                WarningKind::SubBlockEntryMismatch { field },
            ));
        }

        let framing = detect_framing(reader, entry.compression, data).await?;

        Ok(SubBlock {
            segment,
            entry,
            metadata,
            data,
            attachment,
            framing,
            warnings,
        })
    }

    /// The compressed stream handed to a codec, with any framing header
    /// stripped.
    ///
    /// Returns `None` when the framing header could not be read.
    pub fn payload(&self) -> Option<ByteRange> {
        let header = self.framing.as_ref().ok()?;
        let skip = header.header_length as u64;
        Some(ByteRange::new(
            self.data.offset + skip,
            self.data.length.saturating_sub(skip),
        ))
    }
}

/// Read just enough of `data` to detect its framing header.
async fn detect_framing<R: RangeReader>(
    reader: &R,
    compression: CompressionKind,
    data: ByteRange,
) -> Result<Result<FramingHeader, FramingError>, CziError> {
    if compression != CompressionKind::Zstd1 {
        return Ok(framing::detect(compression, &[]));
    }

    let len = data.length.min(MAX_FRAMING_HEADER_SIZE as u64);
    let raw = read_at(reader, "sub-block data", data.offset, len).await?;
    Ok(framing::detect(compression, &raw))
}

/// A directory entry together with the sub-block it points at.
#[derive(Debug, Clone, Serialize)]
pub struct SubBlockItem {
    /// Entry as listed in the directory
    pub entry: DirectoryEntry,

    /// Resolved sub-block, or why it could not be decoded
    #[serde(serialize_with = "serialize_result")]
    pub sub_block: Result<SubBlock, CziError>,
}

/// Resolved sub-block directory.
#[derive(Debug, Clone, Serialize)]
pub struct SubBlockDirectory {
    pub segment: SegmentHeader,

    pub items: Vec<SubBlockItem>,

    pub warnings: Vec<Warning>,
}

impl SubBlockDirectory {
    /// Read the directory at absolute `offset` and resolve every entry
    /// against the container starting at `base`.
    ///
    /// A sub-block that fails to decode is kept as an error on its item,
    /// unless the byte source itself failed.
    pub async fn read<R: RangeReader>(
        reader: &R,
        base: u64,
        offset: u64,
    ) -> Result<Self, CziError> {
        let (segment, mut warnings) = read_segment_header(
            reader,
            "sub-block directory",
            offset,
            SegmentKind::SubBlockDirectory,
        )
        .await?;
        let body = read_body(reader, "sub-block directory", &segment).await?;
        let body_offset = segment.body_offset();

        let malformed = |reason: String| CziError::MalformedSegment {
            component: "sub-block directory",
            offset,
            reason,
        };
        if body.len() < SUBBLOCK_DIRECTORY_PREFIX_SIZE {
            return Err(malformed(format!("body has only {} bytes", body.len())));
        }
        let count = read_i32_le(&body[0..4]);
        let count = usize::try_from(count)
            .map_err(|_| malformed(format!("negative entry count {}", count)))?;

        debug!(offset, base, count, "Decoding sub-block directory");

        let mut items = Vec::with_capacity(count.min(body.len() / DIRECTORY_ENTRY_FIXED_SIZE));
        let mut cursor = SUBBLOCK_DIRECTORY_PREFIX_SIZE;

        for _ in 0..count {
            let entry_offset = body_offset + cursor as u64;
            let entry = DirectoryEntry::parse(&body[cursor..], entry_offset)?;
            cursor += entry.size();
            warnings.extend(entry.check_dimensions(entry_offset));

            let at = absolute_position(reader.size(), "sub-block", base, entry.file_position)?;
            let sub_block = match SubBlock::read(reader, at, &entry).await {
                Err(e) if e.is_source_fatal() => return Err(e),
                result => result,
            };

            items.push(SubBlockItem { entry, sub_block });
        }

        Ok(SubBlockDirectory {
            segment,
            items,
            warnings,
        })
    }

    /// Successfully decoded sub-blocks.
    pub fn sub_blocks(&self) -> impl Iterator<Item = &SubBlock> {
        self.items.iter().filter_map(|item| item.sub_block.as_ref().ok())
    }
}
