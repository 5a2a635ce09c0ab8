//! Test utilities for integration tests.
//!
//! This module provides mock readers and builders for synthetic NDPI and CZI
//! files with known layouts.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use wsi_decode::error::IoError;
use wsi_decode::io::RangeReader;

// =============================================================================
// Mock Range Reader with Request Tracking
// =============================================================================

/// A mock range reader that tracks all read requests.
///
/// This is useful for verifying cache behavior and request patterns.
pub struct TrackingMockReader {
    data: Bytes,
    identifier: String,
    request_count: Arc<AtomicUsize>,
    requests: Arc<RwLock<Vec<(u64, usize)>>>,
}

impl TrackingMockReader {
    pub fn new(data: Vec<u8>, identifier: impl Into<String>) -> Self {
        Self {
            data: Bytes::from(data),
            identifier: identifier.into(),
            request_count: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    pub async fn get_requests(&self) -> Vec<(u64, usize)> {
        self.requests.read().await.clone()
    }
}

#[async_trait]
impl RangeReader for TrackingMockReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        self.request_count.fetch_add(1, Ordering::SeqCst);
        self.requests.write().await.push((offset, len));

        let out_of_bounds = IoError::RangeOutOfBounds {
            offset,
            requested: len as u64,
            size: self.data.len() as u64,
        };
        let end = offset.checked_add(len as u64).ok_or(out_of_bounds.clone())?;
        if end > self.data.len() as u64 {
            return Err(out_of_bounds);
        }
        Ok(self.data.slice(offset as usize..end as usize))
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

// =============================================================================
// Sparse Reader
// =============================================================================

/// A reader over a large, mostly-zero virtual file.
///
/// Only the given regions hold data, so files past 4GB can be described
/// without allocating them.
pub struct SparseReader {
    size: u64,
    regions: Vec<(u64, Bytes)>,
}

impl SparseReader {
    pub fn new(size: u64) -> Self {
        Self {
            size,
            regions: Vec::new(),
        }
    }

    pub fn with_region(mut self, offset: u64, data: Vec<u8>) -> Self {
        self.regions.push((offset, Bytes::from(data)));
        self
    }
}

#[async_trait]
impl RangeReader for SparseReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        let end = offset
            .checked_add(len as u64)
            .filter(|&end| end <= self.size)
            .ok_or(IoError::RangeOutOfBounds {
                offset,
                requested: len as u64,
                size: self.size,
            })?;

        let mut out = BytesMut::zeroed(len);
        for (start, data) in &self.regions {
            let region_end = start + data.len() as u64;
            let from = offset.max(*start);
            let to = end.min(region_end);
            if from < to {
                let dst = (from - offset) as usize..(to - offset) as usize;
                let src = (from - start) as usize..(to - start) as usize;
                out[dst].copy_from_slice(&data[src]);
            }
        }
        Ok(out.freeze())
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        "sparse"
    }
}

// =============================================================================
// NDPI Builders
// =============================================================================

pub const TYPE_ASCII: u16 = 2;
pub const TYPE_SHORT: u16 = 3;
pub const TYPE_LONG: u16 = 4;
pub const TYPE_FLOAT: u16 = 11;

pub const TAG_IMAGE_WIDTH: u16 = 256;
pub const TAG_IMAGE_LENGTH: u16 = 257;
pub const TAG_COMPRESSION: u16 = 259;
pub const TAG_IMAGE_DESCRIPTION: u16 = 270;
pub const TAG_STRIP_OFFSETS: u16 = 273;
pub const TAG_STRIP_BYTE_COUNTS: u16 = 279;
pub const TAG_SOURCE_LENS: u16 = 65421;
pub const TAG_PROPERTY_MAP: u16 = 65449;

/// A raw directory record: tag, type, count, low word, high word.
#[derive(Debug, Clone, Copy)]
pub struct RawRecord {
    pub tag: u16,
    pub field_type: u16,
    pub count: u32,
    pub low: u32,
    pub high: u32,
}

impl RawRecord {
    pub fn new(tag: u16, field_type: u16, count: u32, low: u32) -> Self {
        Self {
            tag,
            field_type,
            count,
            low,
            high: 0,
        }
    }

    /// Record whose value (inline or external) sits at a 64-bit position.
    pub fn at(tag: u16, field_type: u16, count: u32, position: u64) -> Self {
        Self {
            tag,
            field_type,
            count,
            low: position as u32,
            high: (position >> 32) as u32,
        }
    }
}

/// Create the 12-byte NDPI header.
pub fn ndpi_header(first_directory: u64) -> Vec<u8> {
    let mut out = vec![0x49, 0x49, 0x2A, 0x00];
    out.extend_from_slice(&first_directory.to_le_bytes());
    out
}

/// Encode a directory: count, records, next offset, high-word trailer.
pub fn ndpi_directory(records: &[RawRecord], next: u64) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(records.len() as u16).to_le_bytes());
    for r in records {
        out.extend_from_slice(&r.tag.to_le_bytes());
        out.extend_from_slice(&r.field_type.to_le_bytes());
        out.extend_from_slice(&r.count.to_le_bytes());
        out.extend_from_slice(&r.low.to_le_bytes());
    }
    out.extend_from_slice(&next.to_le_bytes());
    for r in records {
        out.extend_from_slice(&r.high.to_le_bytes());
    }
    out
}

/// One directory of a synthetic NDPI file.
#[derive(Debug, Clone)]
pub struct NdpiLevel {
    pub width: u32,
    pub height: u32,
    pub source_lens: f32,
    pub strip: Vec<u8>,
}

/// A synthetic NDPI file and where its strips landed.
pub struct NdpiFixture {
    pub data: Vec<u8>,
    pub directory_offsets: Vec<u64>,
    pub strip_offsets: Vec<u64>,
}

/// Build a small NDPI file: header, then per level a strip, a property map,
/// a description and a directory. Directories are chained in level order.
pub fn build_ndpi(levels: &[NdpiLevel]) -> NdpiFixture {
    let mut data = ndpi_header(0);
    let mut directory_offsets = Vec::new();
    let mut strip_offsets = Vec::new();
    let mut previous_next_at: Option<usize> = None;

    for (i, level) in levels.iter().enumerate() {
        let strip_at = data.len() as u64;
        data.extend_from_slice(&level.strip);

        // Short enough to be inline, but always stored externally
        let properties_at = data.len() as u64;
        data.extend_from_slice(b"a=1\0");

        let description = format!("level {}\0", i);
        let description_at = data.len() as u64;
        data.extend_from_slice(description.as_bytes());

        let records = [
            RawRecord::new(TAG_IMAGE_WIDTH, TYPE_LONG, 1, level.width),
            RawRecord::new(TAG_IMAGE_LENGTH, TYPE_LONG, 1, level.height),
            RawRecord::new(TAG_COMPRESSION, TYPE_SHORT, 1, 7),
            RawRecord::at(
                TAG_IMAGE_DESCRIPTION,
                TYPE_ASCII,
                description.len() as u32,
                description_at,
            ),
            RawRecord::at(TAG_STRIP_OFFSETS, TYPE_LONG, 1, strip_at),
            RawRecord::new(TAG_STRIP_BYTE_COUNTS, TYPE_LONG, 1, level.strip.len() as u32),
            RawRecord::new(TAG_SOURCE_LENS, TYPE_FLOAT, 1, level.source_lens.to_bits()),
            RawRecord::at(TAG_PROPERTY_MAP, TYPE_ASCII, 4, properties_at),
        ];

        let directory_at = data.len();
        let next_at = directory_at + 2 + 12 * records.len();
        data.extend(ndpi_directory(&records, 0));

        match previous_next_at {
            None => data[4..12].copy_from_slice(&(directory_at as u64).to_le_bytes()),
            Some(at) => data[at..at + 8].copy_from_slice(&(directory_at as u64).to_le_bytes()),
        }
        previous_next_at = Some(next_at);

        directory_offsets.push(directory_at as u64);
        strip_offsets.push(strip_at);
    }

    NdpiFixture {
        data,
        directory_offsets,
        strip_offsets,
    }
}

/// Three levels with distinct strip contents.
pub fn default_ndpi_levels() -> Vec<NdpiLevel> {
    vec![
        NdpiLevel {
            width: 4096,
            height: 2048,
            source_lens: 20.0,
            strip: vec![0xAA; 300],
        },
        NdpiLevel {
            width: 1024,
            height: 512,
            source_lens: 5.0,
            strip: vec![0xBB; 120],
        },
        NdpiLevel {
            width: 640,
            height: 200,
            source_lens: -1.0,
            strip: vec![0xCC; 64],
        },
    ]
}

// =============================================================================
// CZI Builders
// =============================================================================

pub const CZI_UNCOMPRESSED: i32 = 0;
pub const CZI_JPEG: i32 = 1;
pub const CZI_ZSTD1: i32 = 6;

/// A sub-block to place in a synthetic CZI file.
#[derive(Debug, Clone)]
pub struct SubBlockSpec {
    pub compression: i32,
    /// (axis, logical size, stored size)
    pub dimensions: Vec<(&'static str, u32, u32)>,
    pub payload: Vec<u8>,
}

impl SubBlockSpec {
    pub fn new(compression: i32, width: u32, stored_width: u32, payload: Vec<u8>) -> Self {
        Self {
            compression,
            dimensions: vec![("X", width, stored_width), ("Y", width, stored_width)],
            payload,
        }
    }
}

/// An attachment to place in a synthetic CZI file.
#[derive(Debug, Clone)]
pub struct AttachmentSpec {
    pub name: &'static str,
    pub content_type: &'static str,
    pub data: Vec<u8>,
}

fn segment(id: &str, body: Vec<u8>) -> Vec<u8> {
    let mut out = vec![0u8; 16];
    out[..id.len()].copy_from_slice(id.as_bytes());
    out.extend_from_slice(&(body.len() as i64).to_le_bytes());
    out.extend_from_slice(&0i64.to_le_bytes());
    out.extend(body);
    out
}

/// Encode a `DV` directory entry.
pub fn dv_entry(position: u64, compression: i32, dimensions: &[(&str, u32, u32)]) -> Vec<u8> {
    let mut out = vec![0u8; 32];
    out[0..2].copy_from_slice(b"DV");
    out[6..14].copy_from_slice(&(position as i64).to_le_bytes());
    out[18..22].copy_from_slice(&compression.to_le_bytes());
    out[28..32].copy_from_slice(&(dimensions.len() as i32).to_le_bytes());
    for (axis, size, stored) in dimensions {
        let mut dim = [0u8; 20];
        dim[..axis.len()].copy_from_slice(axis.as_bytes());
        dim[8..12].copy_from_slice(&size.to_le_bytes());
        dim[16..20].copy_from_slice(&stored.to_le_bytes());
        out.extend_from_slice(&dim);
    }
    out
}

/// Encode an `A1` attachment entry.
pub fn a1_entry(position: u64, content_type: &str, name: &str) -> Vec<u8> {
    let mut out = vec![0u8; 128];
    out[0..2].copy_from_slice(b"A1");
    out[12..20].copy_from_slice(&(position as i64).to_le_bytes());
    out[40..40 + content_type.len()].copy_from_slice(content_type.as_bytes());
    out[48..48 + name.len()].copy_from_slice(name.as_bytes());
    out
}

/// Build a CZI container. Every position is relative to the start of the
/// returned buffer, so the result can also be embedded as a `CZI`
/// attachment of another container.
///
/// Layout: file header, metadata, sub-blocks, sub-block directory,
/// attachments, attachment directory.
pub fn build_czi(
    xml: &str,
    sub_blocks: &[SubBlockSpec],
    attachments: &[AttachmentSpec],
) -> Vec<u8> {
    let mut data = vec![0u8; 32 + 512];
    data[..10].copy_from_slice(b"ZISRAWFILE");
    data[16..24].copy_from_slice(&512i64.to_le_bytes());
    data[32..36].copy_from_slice(&1i32.to_le_bytes());

    // Metadata
    let metadata_at = data.len() as u64;
    let mut body = vec![0u8; 256];
    body[0..4].copy_from_slice(&(xml.len() as i32).to_le_bytes());
    body.extend_from_slice(xml.as_bytes());
    data.extend(segment("ZISRAWMETADATA", body));

    // Sub-blocks
    let mut entries = Vec::new();
    for spec in sub_blocks {
        let at = data.len() as u64;
        let entry = dv_entry(at, spec.compression, &spec.dimensions);
        let prefix = 256.max(16 + entry.len());

        let mut body = vec![0u8; prefix];
        body[8..16].copy_from_slice(&(spec.payload.len() as i64).to_le_bytes());
        body[16..16 + entry.len()].copy_from_slice(&entry);
        body.extend_from_slice(&spec.payload);
        data.extend(segment("ZISRAWSUBBLOCK", body));
        entries.push(entry);
    }

    // Sub-block directory
    let directory_at = data.len() as u64;
    let mut body = vec![0u8; 128];
    body[0..4].copy_from_slice(&(entries.len() as i32).to_le_bytes());
    for entry in &entries {
        body.extend_from_slice(entry);
    }
    data.extend(segment("ZISRAWDIRECTORY", body));

    // Attachments
    let mut attachment_entries = Vec::new();
    for spec in attachments {
        let at = data.len() as u64;
        let entry = a1_entry(at, spec.content_type, spec.name);

        let mut body = vec![0u8; 256];
        body[0..4].copy_from_slice(&(spec.data.len() as i32).to_le_bytes());
        body[16..144].copy_from_slice(&entry);
        body.extend_from_slice(&spec.data);
        data.extend(segment("ZISRAWATTACH", body));
        attachment_entries.push(entry);
    }

    // Attachment directory
    let attachment_directory_at = data.len() as u64;
    let mut body = vec![0u8; 256];
    body[0..4].copy_from_slice(&(attachment_entries.len() as i32).to_le_bytes());
    for entry in &attachment_entries {
        body.extend_from_slice(entry);
    }
    data.extend(segment("ZISRAWATTDIR", body));

    // Positions in the file header body
    data[32 + 52..32 + 60].copy_from_slice(&(directory_at as i64).to_le_bytes());
    data[32 + 60..32 + 68].copy_from_slice(&(metadata_at as i64).to_le_bytes());
    data[32 + 72..32 + 80].copy_from_slice(&(attachment_directory_at as i64).to_le_bytes());

    data
}

/// A container holding `inner` as a nested `CZI` attachment.
pub fn wrap_czi(inner: Vec<u8>) -> Vec<u8> {
    build_czi(
        "<ImageDocument/>",
        &[SubBlockSpec::new(CZI_JPEG, 64, 64, vec![0xFF, 0xD8, 0xFF, 0xD9])],
        &[AttachmentSpec {
            name: "EmbeddedCZI",
            content_type: "CZI",
            data: inner,
        }],
    )
}

/// List every attachment of a `build_czi` container `times` times in its
/// attachment directory, which is the last segment of the buffer.
pub fn relist_attachments(mut data: Vec<u8>, times: usize) -> Vec<u8> {
    let position = &data[32 + 72..32 + 80];
    let directory_at = i64::from_le_bytes(position.try_into().unwrap()) as usize;
    let body_at = directory_at + 32;

    let count = i32::from_le_bytes(data[body_at..body_at + 4].try_into().unwrap()) as usize;
    let entries = data[body_at + 256..].to_vec();
    assert_eq!(entries.len(), 128 * count);
    for _ in 1..times {
        data.extend_from_slice(&entries);
    }

    let listed = (count * times) as i32;
    data[body_at..body_at + 4].copy_from_slice(&listed.to_le_bytes());
    let allocated = (data.len() - body_at) as i64;
    data[directory_at + 16..directory_at + 24].copy_from_slice(&allocated.to_le_bytes());
    data
}
