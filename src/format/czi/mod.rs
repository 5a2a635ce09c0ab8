//! Zeiss CZI decoder.
//!
//! A CZI file is a sequence of segments, each with a 32-byte header naming
//! its kind and size. The `ZISRAWFILE` segment at the container base points
//! at the metadata segment and at two directories:
//!
//! - The sub-block directory lists every image tile (`DV` entries).
//! - The attachment directory lists labels, previews and similar extras
//!   (`A1` entries).
//!
//! Decoding resolves every directory entry into its segment eagerly, and
//! descends into attachments that hold a nested container.

mod attachment;
mod container;
mod entry;
mod header;
mod metadata;
mod segment;
mod subblock;

pub use attachment::{
    Attachment, AttachmentDirectory, AttachmentEntry, AttachmentItem, ATTACHMENT_ENTRY_SIZE,
    NESTED_CONTAINER_TYPE,
};
pub use container::{Container, NestingState};
pub use entry::{
    CompressionKind, DimensionEntry, DirectoryEntry, PixelType, PyramidKind,
    DIMENSION_ENTRY_SIZE, DIRECTORY_ENTRY_FIXED_SIZE,
};
pub use header::{is_czi_header, FileHeader, Guid, CZI_MAGIC, FILE_HEADER_BODY_SIZE};
pub use metadata::MetadataSegment;
pub use segment::{
    scan_segments, SegmentHeader, SegmentKind, SegmentScan, SEGMENT_HEADER_SIZE, SEGMENT_ID_SIZE,
};
pub use subblock::{SubBlock, SubBlockDirectory, SubBlockItem};
