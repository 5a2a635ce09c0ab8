//! Sub-block directory entries (`DV` schema).
//!
//! # Entry Structure (32 + 20 * N bytes)
//! ```text
//! Bytes 0-1:   Schema "DV"
//! Bytes 2-5:   Pixel type
//! Bytes 6-13:  File position of the sub-block segment
//! Bytes 14-17: File part
//! Bytes 18-21: Compression
//! Byte  22:    Pyramid type
//! Bytes 23-27: Spare
//! Bytes 28-31: Dimension count (N)
//! Bytes 32-:   N dimension entries
//! ```
//!
//! # Dimension Entry Structure (20 bytes)
//! ```text
//! Bytes 0-3:   Axis ("X", "Y", "C", "Z", "T", "M", "S", ...)
//! Bytes 4-7:   Start index
//! Bytes 8-11:  Logical size
//! Bytes 12-15: Start coordinate (f32)
//! Bytes 16-19: Stored size
//! ```
//!
//! The same entry appears in the sub-block directory and again inside each
//! sub-block segment.

use serde::Serialize;

use crate::error::CziError;
use crate::format::warning::{Warning, WarningKind};
use crate::io::{read_f32_le, read_i32_le, read_i64_le, read_u32_le};

/// Size of the fixed part of a directory entry
pub const DIRECTORY_ENTRY_FIXED_SIZE: usize = 32;

/// Size of one dimension entry
pub const DIMENSION_ENTRY_SIZE: usize = 20;

/// Pixel layout of a sub-block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PixelType {
    Gray8,
    Gray16,
    Gray32Float,
    Bgr24,
    Bgr48,
    Bgr96Float,
    Bgra32,
    Gray64ComplexFloat,
    Bgr192ComplexFloat,
    Gray32,
    Gray64,
    Unknown(i32),
}

impl PixelType {
    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => PixelType::Gray8,
            1 => PixelType::Gray16,
            2 => PixelType::Gray32Float,
            3 => PixelType::Bgr24,
            4 => PixelType::Bgr48,
            8 => PixelType::Bgr96Float,
            9 => PixelType::Bgra32,
            10 => PixelType::Gray64ComplexFloat,
            11 => PixelType::Bgr192ComplexFloat,
            12 => PixelType::Gray32,
            13 => PixelType::Gray64,
            other => PixelType::Unknown(other),
        }
    }
}

/// Compression of a sub-block payload.
///
/// This decides which downstream codec receives the payload range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CompressionKind {
    Uncompressed,
    Jpeg,
    Lzw,
    JpegXr,
    /// Bare zstd stream
    Zstd0,
    /// zstd stream behind a framing header
    Zstd1,
    Unknown(i32),
}

impl CompressionKind {
    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => CompressionKind::Uncompressed,
            1 => CompressionKind::Jpeg,
            2 => CompressionKind::Lzw,
            4 => CompressionKind::JpegXr,
            5 => CompressionKind::Zstd0,
            6 => CompressionKind::Zstd1,
            other => CompressionKind::Unknown(other),
        }
    }

    /// Short codec label used in range listings.
    pub fn label(&self) -> String {
        match self {
            CompressionKind::Uncompressed => "raw".to_string(),
            CompressionKind::Jpeg => "jpeg".to_string(),
            CompressionKind::Lzw => "lzw".to_string(),
            CompressionKind::JpegXr => "jpegxr".to_string(),
            CompressionKind::Zstd0 => "zstd0".to_string(),
            CompressionKind::Zstd1 => "zstd1".to_string(),
            CompressionKind::Unknown(value) => format!("unknown({})", value),
        }
    }
}

/// Whether a sub-block belongs to a resolution pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PyramidKind {
    None,
    SingleSubBlock,
    MultiSubBlock,
    Unknown(u8),
}

impl PyramidKind {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => PyramidKind::None,
            1 => PyramidKind::SingleSubBlock,
            2 => PyramidKind::MultiSubBlock,
            other => PyramidKind::Unknown(other),
        }
    }
}

/// One dimension of a sub-block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DimensionEntry {
    /// Axis name
    pub axis: String,

    /// Start index along the axis
    pub start: i32,

    /// Logical extent along the axis
    pub size: u32,

    /// Physical start coordinate
    pub start_coordinate: f32,

    /// Extent actually stored (smaller than `size` on pyramid levels)
    pub stored_size: u32,
}

impl DimensionEntry {
    fn parse(bytes: &[u8]) -> Self {
        DimensionEntry {
            axis: fixed_str(&bytes[0..4]),
            start: read_i32_le(&bytes[4..8]),
            size: read_u32_le(&bytes[8..12]),
            start_coordinate: read_f32_le(&bytes[12..16]),
            stored_size: read_u32_le(&bytes[16..20]),
        }
    }
}

/// A `DV` directory entry describing one sub-block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectoryEntry {
    pub pixel_type: PixelType,

    /// Sub-block segment position relative to the container
    pub file_position: u64,

    pub file_part: i32,

    pub compression: CompressionKind,

    pub pyramid: PyramidKind,

    pub dimensions: Vec<DimensionEntry>,
}

impl DirectoryEntry {
    /// Number of dimensions declared by an entry whose fixed part is in
    /// `bytes`.
    pub fn declared_dimension_count(bytes: &[u8], offset: u64) -> Result<usize, CziError> {
        let count = read_i32_le(&bytes[28..32]);
        usize::try_from(count).map_err(|_| CziError::MalformedSegment {
            component: "directory entry",
            offset,
            reason: format!("negative dimension count {}", count),
        })
    }

    /// Parse an entry at the start of `bytes`. `offset` is the entry's
    /// absolute position, used for errors.
    pub fn parse(bytes: &[u8], offset: u64) -> Result<Self, CziError> {
        let malformed = |reason: String| CziError::MalformedSegment {
            component: "directory entry",
            offset,
            reason,
        };

        if bytes.len() < DIRECTORY_ENTRY_FIXED_SIZE {
            return Err(malformed(format!(
                "{} bytes left, entry needs at least {}",
                bytes.len(),
                DIRECTORY_ENTRY_FIXED_SIZE
            )));
        }
        if &bytes[0..2] != b"DV" {
            return Err(malformed(format!(
                "unexpected schema {:?}",
                String::from_utf8_lossy(&bytes[0..2])
            )));
        }

        let dimension_count = Self::declared_dimension_count(bytes, offset)?;
        let size = dimension_count
            .checked_mul(DIMENSION_ENTRY_SIZE)
            .and_then(|n| n.checked_add(DIRECTORY_ENTRY_FIXED_SIZE))
            .filter(|&size| size <= bytes.len())
            .ok_or_else(|| {
                malformed(format!(
                    "{} dimensions do not fit in {} bytes",
                    dimension_count,
                    bytes.len()
                ))
            })?;

        let file_position = read_i64_le(&bytes[6..14]);
        let file_position = u64::try_from(file_position)
            .map_err(|_| malformed(format!("negative file position {}", file_position)))?;

        let dimensions = bytes[DIRECTORY_ENTRY_FIXED_SIZE..size]
            .chunks_exact(DIMENSION_ENTRY_SIZE)
            .map(DimensionEntry::parse)
            .collect();

        Ok(DirectoryEntry {
            pixel_type: PixelType::from_i32(read_i32_le(&bytes[2..6])),
            file_position,
            file_part: read_i32_le(&bytes[14..18]),
            compression: CompressionKind::from_i32(read_i32_le(&bytes[18..22])),
            pyramid: PyramidKind::from_u8(bytes[22]),
            dimensions,
        })
    }

    /// Encoded size of this entry.
    pub fn size(&self) -> usize {
        DIRECTORY_ENTRY_FIXED_SIZE + DIMENSION_ENTRY_SIZE * self.dimensions.len()
    }

    /// Look up a dimension by axis name.
    pub fn dimension(&self, axis: &str) -> Option<&DimensionEntry> {
        self.dimensions.iter().find(|d| d.axis == axis)
    }

    /// Pyramid downsample factor, from X or else Y.
    ///
    /// Returns `None` when neither axis is present or its stored size is 0.
    pub fn downsample(&self) -> Option<f64> {
        ["X", "Y"].iter().find_map(|axis| {
            let dim = self.dimension(axis)?;
            (dim.stored_size > 0).then(|| dim.size as f64 / dim.stored_size as f64)
        })
    }

    /// Warnings for dimensions that store more than their logical size.
    pub fn check_dimensions(&self, offset: u64) -> Vec<Warning> {
        self.dimensions
            .iter()
            .filter(|d| d.stored_size > d.size)
            .map(|d| {
                Warning::new(
                    offset,
                    WarningKind::StoredSizeExceedsLogical {
                        axis: d.axis.clone(),
                        logical_size: d.size,
                        stored_size: d.stored_size,
                    },
                )
            })
            .collect()
    }

    /// Name of the first field that differs from `other`, ignoring the file
    /// position.
    pub fn first_mismatch(&self, other: &DirectoryEntry) -> Option<&'static str> {
        if self.pixel_type != other.pixel_type {
            Some("pixel_type")
        } else if self.compression != other.compression {
            Some("compression")
        } else if self.file_part != other.file_part {
            Some("file_part")
        } else if self.dimensions != other.dimensions {
            Some("dimensions")
        } else {
            None
        }
    }
}

/// Fixed-width NUL-padded ASCII field to a string.
pub(crate) fn fixed_str(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
