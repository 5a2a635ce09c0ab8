//! Non-fatal findings recorded while decoding.
//!
//! A warning never stops traversal. It is attached to the entity it concerns
//! and also logged through `tracing` at the point it is raised.

use std::fmt;

use serde::Serialize;
use tracing::warn;

/// A non-fatal decoding finding, positioned by absolute byte offset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Warning {
    /// Absolute offset of the structure the warning concerns
    pub offset: u64,

    /// What was found
    pub kind: WarningKind,
}

/// Kinds of non-fatal findings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum WarningKind {
    /// Header signature does not match the expected marker
    InvalidMagic { expected: Vec<u8>, found: Vec<u8> },

    /// A record declares a field type outside the known set
    UnknownFieldType { tag: u16, field_type: u16 },

    /// A record's value could not be resolved
    RecordValueUnavailable { tag: u16, reason: String },

    /// StripOffsets or StripByteCounts is missing
    MissingStripTags { has_offsets: bool, has_byte_counts: bool },

    /// Strip tags are present but do not resolve to integers
    InvalidStripValue { tag: u16 },

    /// More than one strip; only the first is located
    MultipleStrips { count: u32 },

    /// Segment id differs from the one the referencing structure expects
    SegmentKindMismatch { expected: String, found: String },

    /// Segment claims to use more bytes than it allocates
    UsedSizeExceedsAllocated { used: u64, allocated: u64 },

    /// A dimension stores more samples than its logical size
    StoredSizeExceedsLogical {
        axis: String,
        logical_size: u32,
        stored_size: u32,
    },

    /// The directory entry copy inside a sub-block differs from the directory
    SubBlockEntryMismatch { field: &'static str },

    /// The attachment entry copy inside an attachment differs from the directory
    AttachmentEntryMismatch { field: &'static str },

    /// Segment sizes step past the end of the file
    SegmentOverflow { allocated: u64 },
}

impl Warning {
    /// Create a warning and log it.
    pub fn new(offset: u64, kind: WarningKind) -> Self {
        let warning = Self { offset, kind };
        warn!(offset, "{}", warning.kind);
        warning
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}: {}", self.offset, self.kind)
    }
}

impl fmt::Display for WarningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarningKind::InvalidMagic { expected, found } => write!(
                f,
                "invalid magic: expected {:02X?}, found {:02X?}",
                expected, found
            ),
            WarningKind::UnknownFieldType { tag, field_type } => {
                write!(f, "tag {} has unknown field type {}", tag, field_type)
            }
            WarningKind::RecordValueUnavailable { tag, reason } => {
                write!(f, "value of tag {} unavailable: {}", tag, reason)
            }
            WarningKind::MissingStripTags {
                has_offsets,
                has_byte_counts,
            } => write!(
                f,
                "image data not located (StripOffsets present: {}, StripByteCounts present: {})",
                has_offsets, has_byte_counts
            ),
            WarningKind::InvalidStripValue { tag } => {
                write!(f, "strip tag {} does not resolve to an integer", tag)
            }
            WarningKind::MultipleStrips { count } => {
                write!(f, "{} strips declared, only the first is located", count)
            }
            WarningKind::SegmentKindMismatch { expected, found } => {
                write!(f, "expected segment {:?}, found {:?}", expected, found)
            }
            WarningKind::UsedSizeExceedsAllocated { used, allocated } => write!(
                f,
                "segment used size {} exceeds allocated size {}",
                used, allocated
            ),
            WarningKind::StoredSizeExceedsLogical {
                axis,
                logical_size,
                stored_size,
            } => write!(
                f,
                "dimension {} stores {} samples for logical size {}",
                axis, stored_size, logical_size
            ),
            WarningKind::SubBlockEntryMismatch { field } => {
                write!(f, "sub-block entry copy differs from directory in {}", field)
            }
            WarningKind::AttachmentEntryMismatch { field } => {
                write!(f, "attachment entry copy differs from directory in {}", field)
            }
            WarningKind::SegmentOverflow { allocated } => {
                write!(f, "segment allocated size {} runs past end of file", allocated)
            }
        }
    }
}
