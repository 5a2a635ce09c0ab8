//! Attachment directory (`ZISRAWATTDIR`) and attachment segments
//! (`ZISRAWATTACH`).
//!
//! # Directory Body Structure
//! ```text
//! Bytes 0-3:   Entry count
//! Bytes 4-255: Reserved
//! Bytes 256-:  Consecutive A1 entries (128 bytes each)
//! ```
//!
//! # A1 Entry Structure (128 bytes)
//! ```text
//! Bytes 0-1:   Schema "A1"
//! Bytes 2-11:  Reserved
//! Bytes 12-19: File position of the attachment segment
//! Bytes 20-23: File part
//! Bytes 24-39: Content GUID
//! Bytes 40-47: Content file type ("JPG", "CZI", "ZISRAW", ...)
//! Bytes 48-127: Name ("Label", "SlidePreview", "Thumbnail", ...)
//! ```
//!
//! # Attachment Body Structure
//! ```text
//! Bytes 0-3:     Data size
//! Bytes 4-15:    Spare
//! Bytes 16-143:  A1 entry copy
//! Bytes 144-255: Reserved
//! Bytes 256-:    Data
//! ```
//!
//! An attachment whose content type is `CZI` holds a complete container and
//! is decoded recursively, with its data offset as the new base.

use serde::Serialize;
use tracing::debug;

use crate::error::CziError;
use crate::format::range::{serialize_option_result, serialize_result, ByteRange};
use crate::format::warning::{Warning, WarningKind};
use crate::io::{read_i32_le, read_i64_le, RangeReader};

use super::container::{Container, NestingState};
use super::entry::fixed_str;
use super::header::Guid;
use super::segment::{
    absolute_position, read_at, read_body, read_segment_header, SegmentHeader, SegmentKind,
};

/// Size of an A1 entry
pub const ATTACHMENT_ENTRY_SIZE: usize = 128;

/// Bytes before the first entry in an attachment directory body
pub const ATTACHMENT_DIRECTORY_PREFIX_SIZE: usize = 256;

/// Bytes before the data in an attachment body
pub const ATTACHMENT_PREFIX_SIZE: u64 = 256;

/// Content type of an attachment holding a nested container
pub const NESTED_CONTAINER_TYPE: &str = "CZI";

/// An `A1` attachment entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentEntry {
    /// Attachment segment position relative to the container
    pub file_position: u64,

    pub file_part: i32,

    pub content_guid: Guid,

    /// Content file type
    pub content_type: String,

    /// Attachment name
    pub name: String,
}

impl AttachmentEntry {
    /// Parse an entry at the start of `bytes`.
    pub fn parse(bytes: &[u8], offset: u64) -> Result<Self, CziError> {
        let malformed = |reason: String| CziError::MalformedSegment {
            component: "attachment entry",
            offset,
            reason,
        };

        if bytes.len() < ATTACHMENT_ENTRY_SIZE {
            return Err(malformed(format!(
                "{} bytes left, entry needs {}",
                bytes.len(),
                ATTACHMENT_ENTRY_SIZE
            )));
        }
        if &bytes[0..2] != b"A1" {
            return Err(malformed(format!(
                "unexpected schema {:?}",
                String::from_utf8_lossy(&bytes[0..2])
            )));
        }

        let file_position = read_i64_le(&bytes[12..20]);
        let file_position = u64::try_from(file_position)
            .map_err(|_| malformed(format!("negative file position {}", file_position)))?;

        Ok(AttachmentEntry {
            file_position,
            file_part: read_i32_le(&bytes[20..24]),
            content_guid: Guid::from_slice(&bytes[24..40]),
            content_type: fixed_str(&bytes[40..48]),
            name: fixed_str(&bytes[48..128]),
        })
    }

    /// Whether the attachment holds a nested container.
    pub fn is_nested_container(&self) -> bool {
        self.content_type == NESTED_CONTAINER_TYPE
    }

    fn first_mismatch(&self, other: &AttachmentEntry) -> Option<&'static str> {
        if self.content_type != other.content_type {
            Some("content_type")
        } else if self.name != other.name {
            Some("name")
        } else if self.content_guid != other.content_guid {
            Some("content_guid")
        } else {
            None
        }
    }
}

/// Resolved attachment segment.
#[derive(Debug, Clone, Serialize)]
pub struct Attachment {
    pub segment: SegmentHeader,

    /// Entry copy stored inside the attachment
    pub entry: AttachmentEntry,

    /// Attachment data
    pub data: ByteRange,

    /// Nested container, for `CZI` attachments
    #[serde(serialize_with = "serialize_option_result")]
    pub container: Option<Result<Box<Container>, CziError>>,

    pub warnings: Vec<Warning>,
}

impl Attachment {
    /// Read the attachment at absolute `offset`.
    ///
    /// `depth` is the nesting depth of the container that lists the
    /// attachment. A nested container that fails without a source error is
    /// kept on the attachment.
    pub async fn read<R: RangeReader>(
        reader: &R,
        offset: u64,
        listed: &AttachmentEntry,
        depth: usize,
        nesting: &mut NestingState,
    ) -> Result<Self, CziError> {
        let (segment, mut warnings) =
            read_segment_header(reader, "attachment", offset, SegmentKind::Attachment).await?;
        let body_offset = segment.body_offset();
        let prefix = read_at(reader, "attachment", body_offset, ATTACHMENT_PREFIX_SIZE).await?;

        let data_size = read_i32_le(&prefix[0..4]);
        let data_size = u64::try_from(data_size).map_err(|_| CziError::MalformedSegment {
            component: "attachment",
            offset,
            reason: format!("negative data size {}", data_size),
        })?;
        let entry = AttachmentEntry::parse(&prefix[16..144], body_offset + 16)?;
        let data = ByteRange::new(body_offset + ATTACHMENT_PREFIX_SIZE, data_size);

        if let Some(field) = entry.first_mismatch(listed) {
            warnings.push(Warning::new(
                offset,
                WarningKind::AttachmentEntryMismatch { field },
            ));
        }

        let container = if listed.is_nested_container() {
            debug!(offset, name = %listed.name, depth = depth + 1, "Decoding nested container");
            match Container::decode_nested(reader, data.offset, depth + 1, nesting).await {
                Err(e) if e.is_source_fatal() => return Err(e),
                result => Some(result.map(Box::new)),
            }
        } else {
            None
        };

        Ok(Attachment {
            segment,
            entry,
            data,
            container,
            warnings,
        })
    }

    /// The nested container, if one was decoded.
    pub fn nested(&self) -> Option<&Container> {
        match &self.container {
            Some(Ok(container)) => Some(container.as_ref()),
            _ => None,
        }
    }
}

/// A directory entry together with the attachment it points at.
#[derive(Debug, Clone, Serialize)]
pub struct AttachmentItem {
    /// Entry as listed in the directory
    pub entry: AttachmentEntry,

    /// Resolved attachment, or why it could not be decoded
    #[serde(serialize_with = "serialize_result")]
    pub attachment: Result<Attachment, CziError>,
}

/// Resolved attachment directory.
#[derive(Debug, Clone, Serialize)]
pub struct AttachmentDirectory {
    pub segment: SegmentHeader,

    pub items: Vec<AttachmentItem>,

    pub warnings: Vec<Warning>,
}

impl AttachmentDirectory {
    /// Read the directory at absolute `offset` and resolve every entry
    /// against the container starting at `base`.
    ///
    /// A nested container listed a second time anywhere in the decode is
    /// not decoded again; its item holds [`CziError::DuplicateReference`].
    pub async fn read<R: RangeReader>(
        reader: &R,
        base: u64,
        offset: u64,
        depth: usize,
        nesting: &mut NestingState,
    ) -> Result<Self, CziError> {
        let (segment, warnings) = read_segment_header(
            reader,
            "attachment directory",
            offset,
            SegmentKind::AttachmentDirectory,
        )
        .await?;
        let body = read_body(reader, "attachment directory", &segment).await?;
        let body_offset = segment.body_offset();

        let malformed = |reason: String| CziError::MalformedSegment {
            component: "attachment directory",
            offset,
            reason,
        };
        if body.len() < ATTACHMENT_DIRECTORY_PREFIX_SIZE {
            return Err(malformed(format!("body has only {} bytes", body.len())));
        }
        let count = read_i32_le(&body[0..4]);
        let count = usize::try_from(count)
            .map_err(|_| malformed(format!("negative entry count {}", count)))?;
        let available = (body.len() - ATTACHMENT_DIRECTORY_PREFIX_SIZE) / ATTACHMENT_ENTRY_SIZE;
        if count > available {
            return Err(malformed(format!(
                "{} entries declared, room for {}",
                count, available
            )));
        }

        debug!(offset, base, count, "Decoding attachment directory");

        let mut items = Vec::with_capacity(count);
        for i in 0..count {
            let at = ATTACHMENT_DIRECTORY_PREFIX_SIZE + i * ATTACHMENT_ENTRY_SIZE;
            let entry = AttachmentEntry::parse(&body[at..], body_offset + at as u64)?;

            let position =
                absolute_position(reader.size(), "attachment", base, entry.file_position)?;
            let attachment = if entry.is_nested_container() && !nesting.claim(position) {
                Err(CziError::DuplicateReference { offset: position })
            } else {
                match Attachment::read(reader, position, &entry, depth, nesting).await {
                    Err(e) if e.is_source_fatal() => return Err(e),
                    result => result,
                }
            };

            items.push(AttachmentItem { entry, attachment });
        }

        Ok(AttachmentDirectory {
            segment,
            items,
            warnings,
        })
    }

    /// Successfully decoded attachments.
    pub fn attachments(&self) -> impl Iterator<Item = &Attachment> {
        self.items.iter().filter_map(|item| item.attachment.as_ref().ok())
    }

    /// Find a decoded attachment by name.
    pub fn by_name(&self, name: &str) -> Option<&Attachment> {
        self.attachments().find(|a| a.entry.name == name)
    }
}
