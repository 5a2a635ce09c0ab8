//! CZI metadata segment (`ZISRAWMETADATA`).
//!
//! # Body Structure
//! ```text
//! Bytes 0-3:   XML size
//! Bytes 4-7:   Attachment size
//! Bytes 8-255: Spare
//! Bytes 256-:  XML document, then attachment bytes
//! ```
//!
//! Only byte ranges are exposed; parsing the XML is left to the caller.

use serde::Serialize;

use crate::error::CziError;
use crate::format::range::ByteRange;
use crate::format::warning::Warning;
use crate::io::{read_i32_le, RangeReader};

use super::segment::{read_at, read_segment_header, SegmentHeader, SegmentKind};

/// Fixed part of the metadata body before the XML
pub const METADATA_PREFIX_SIZE: u64 = 256;

/// Resolved metadata segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataSegment {
    pub segment: SegmentHeader,

    /// UTF-8 XML document
    pub xml: ByteRange,

    /// Optional binary attachment (usually empty)
    pub attachment: ByteRange,

    pub warnings: Vec<Warning>,
}

impl MetadataSegment {
    /// Read the metadata segment at absolute `offset`.
    pub async fn read<R: RangeReader>(reader: &R, offset: u64) -> Result<Self, CziError> {
        let (segment, warnings) =
            read_segment_header(reader, "metadata", offset, SegmentKind::Metadata).await?;
        let body = read_at(reader, "metadata", segment.body_offset(), 8).await?;

        let size = |at: usize, name: &str| {
            let value = read_i32_le(&body[at..at + 4]);
            u64::try_from(value).map_err(|_| CziError::MalformedSegment {
                component: "metadata",
                offset,
                reason: format!("negative {} size {}", name, value),
            })
        };
        let xml_size = size(0, "XML")?;
        let attachment_size = size(4, "attachment")?;

        let xml = ByteRange::new(segment.body_offset() + METADATA_PREFIX_SIZE, xml_size);
        let attachment = ByteRange::new(xml.end(), attachment_size);

        Ok(MetadataSegment {
            segment,
            xml,
            attachment,
            warnings,
        })
    }
}
