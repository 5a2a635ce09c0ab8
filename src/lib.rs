//! # WSI Decode
//!
//! Structural decoders for whole-slide image containers.
//!
//! This library walks the container layer of Hamamatsu NDPI and Zeiss CZI
//! files through random-access range reads, resolving every directory,
//! record and segment into read-only structures that carry the byte ranges
//! of pixel payloads and metadata. Decompressing those payloads is left to
//! downstream codecs.
//!
//! ## Features
//!
//! - **NDPI**: TIFF directory chains with the 64-bit high-word trailer
//!   extension, cycle detection and per-directory strip ranges
//! - **CZI**: segment containers with eager sub-block and attachment
//!   resolution, nested containers and ZSTD1 framing detection
//! - **Structured findings**: non-fatal warnings are attached to the entity
//!   they concern; record- and segment-scoped errors are kept beside their
//!   decoded siblings
//! - **Block caching**: many small reads coalesce into cached block reads
//!
//! ## Architecture
//!
//! - [`io`] - Range reader trait, file and memory readers, block cache
//! - [`mod@format`] - Field decoder, NDPI and CZI engines, format dispatch
//! - [`config`] - CLI and decode options
//! - [`error`] - Error types per layer
//!
//! ## Example
//!
//! ```rust,no_run
//! use wsi_decode::{decode, BlockCache, DecodeOptions, FileRangeReader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let reader = BlockCache::new(FileRangeReader::open("slide.ndpi").await?);
//!     let file = decode(&reader, &DecodeOptions::default()).await?;
//!
//!     for payload in file.payload_ranges() {
//!         println!("{} {} {}", payload.range.offset, payload.range.length, payload.codec);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod format;
pub mod io;

// Re-export commonly used types
pub use config::{Cli, Command, DecodeOptions, InspectConfig, SourceConfig};
pub use error::{CziError, FieldError, FormatError, FramingError, IoError, NdpiError};
pub use format::czi::{
    scan_segments, Attachment, CompressionKind, Container, DirectoryEntry, NestingState,
    SegmentHeader, SegmentKind, SubBlock,
};
pub use format::ndpi::{Directory, NdpiFile, NdpiTag, Record};
pub use format::{
    decode, detect_format, ByteRange, ContainerFormat, DecodedFile, FieldType, FramingHeader,
    PayloadRange, Value, Warning, WarningKind,
};
pub use io::{BlockCache, FileRangeReader, MemoryReader, RangeReader};
