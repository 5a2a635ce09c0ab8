//! Format detection and dispatch.
//!
//! The container format is identified from the leading bytes:
//!
//! - **CZI**: `ZISRAWFILE` segment id at offset 0
//! - **NDPI**: little-endian byte order marker `II` at offset 0
//!
//! Anything else is rejected as unsupported. Big-endian TIFF is not NDPI.

use serde::Serialize;
use tracing::debug;

use crate::config::DecodeOptions;
use crate::error::FormatError;
use crate::io::RangeReader;

use super::czi::{is_czi_header, Container, SEGMENT_ID_SIZE};
use super::ndpi::{is_ndpi_header, NdpiFile};
use super::range::ByteRange;
use super::warning::Warning;

// =============================================================================
// ContainerFormat
// =============================================================================

/// Detected container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ContainerFormat {
    /// Hamamatsu NDPI (TIFF with 64-bit offset extension)
    Ndpi,

    /// Zeiss CZI (segment container)
    Czi,
}

impl ContainerFormat {
    /// Get a human-readable name for the format.
    pub const fn name(&self) -> &'static str {
        match self {
            ContainerFormat::Ndpi => "Hamamatsu NDPI",
            ContainerFormat::Czi => "Zeiss CZI",
        }
    }
}

// =============================================================================
// Format Detection
// =============================================================================

/// Minimum bytes needed to tell the formats apart
const MIN_SIGNATURE_BYTES: usize = 2;

/// Detect the container format from the leading bytes.
pub async fn detect_format<R: RangeReader>(reader: &R) -> Result<ContainerFormat, FormatError> {
    let size = reader.size();
    if size < MIN_SIGNATURE_BYTES as u64 {
        return Err(FormatError::UnsupportedFormat {
            reason: format!("File too small to carry a signature ({} bytes)", size),
        });
    }

    let len = (size as usize).min(SEGMENT_ID_SIZE);
    let signature = reader.read_exact_at(0, len).await?;

    if is_czi_header(&signature) {
        Ok(ContainerFormat::Czi)
    } else if is_ndpi_header(&signature) {
        Ok(ContainerFormat::Ndpi)
    } else {
        Err(FormatError::UnsupportedFormat {
            reason: format!(
                "Unrecognised signature {:02X?}",
                &signature[..len.min(4)]
            ),
        })
    }
}

// =============================================================================
// Dispatch
// =============================================================================

/// A decoded file of either format.
#[derive(Debug, Clone, Serialize)]
pub enum DecodedFile {
    Ndpi(NdpiFile),
    Czi(Container),
}

/// An image payload byte range ready for a downstream codec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayloadRange {
    /// Bytes to hand to the codec
    pub range: ByteRange,

    /// Codec label
    pub codec: String,

    /// Which structure the range came from
    pub origin: String,
}

/// Detect the format and decode the whole file.
pub async fn decode<R: RangeReader>(
    reader: &R,
    options: &DecodeOptions,
) -> Result<DecodedFile, FormatError> {
    let format = detect_format(reader).await?;
    debug!(
        identifier = reader.identifier(),
        format = format.name(),
        "Detected container format"
    );

    match format {
        ContainerFormat::Ndpi => Ok(DecodedFile::Ndpi(NdpiFile::decode(reader).await?)),
        ContainerFormat::Czi => Ok(DecodedFile::Czi(Container::decode(reader, options).await?)),
    }
}

impl DecodedFile {
    pub fn format(&self) -> ContainerFormat {
        match self {
            DecodedFile::Ndpi(_) => ContainerFormat::Ndpi,
            DecodedFile::Czi(_) => ContainerFormat::Czi,
        }
    }

    /// Every image payload range in file order of discovery.
    ///
    /// CZI sub-blocks whose framing header could not be read are left out.
    pub fn payload_ranges(&self) -> Vec<PayloadRange> {
        match self {
            DecodedFile::Ndpi(file) => file
                .directories
                .iter()
                .filter_map(|dir| {
                    dir.image_data.map(|range| PayloadRange {
                        range,
                        codec: tiff_codec_label(dir.compression()),
                        origin: format!("directory #{}", dir.sequence_number),
                    })
                })
                .collect(),
            DecodedFile::Czi(container) => container
                .all_sub_blocks()
                .into_iter()
                .filter_map(|block| {
                    block.payload().map(|range| PayloadRange {
                        range,
                        codec: block.entry.compression.label(),
                        origin: format!("sub-block @{}", block.segment.offset),
                    })
                })
                .collect(),
        }
    }

    /// Every warning recorded while decoding.
    pub fn warnings(&self) -> Vec<&Warning> {
        match self {
            DecodedFile::Ndpi(file) => file.all_warnings().collect(),
            DecodedFile::Czi(container) => container.all_warnings(),
        }
    }
}

/// Codec label for a TIFF compression tag value.
fn tiff_codec_label(compression: Option<u64>) -> String {
    match compression {
        Some(1) => "raw".to_string(),
        Some(6) | Some(7) => "jpeg".to_string(),
        Some(other) => format!("tiff-compression({})", other),
        None => "unknown".to_string(),
    }
}

// =============================================================================
// Tests
// =============================================================================
