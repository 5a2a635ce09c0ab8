use thiserror::Error;

use crate::format::field::FieldType;

/// I/O errors that can occur when reading from the byte source
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// Error reported by the operating system
    #[error("I/O error: {0}")]
    Os(String),

    /// File not found
    #[error("File not found: {0}")]
    NotFound(String),
}

impl From<std::io::Error> for IoError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => IoError::NotFound(err.to_string()),
            _ => IoError::Os(err.to_string()),
        }
    }
}

/// Errors scoped to a single directory record.
///
/// These are attached to the record they concern; the directory walk
/// continues past them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    /// Byte length does not match `count * element_size`
    #[error("Field length mismatch for {field_type:?}: expected {expected} bytes, got {actual}")]
    LengthMismatch {
        field_type: FieldType,
        expected: u64,
        actual: u64,
    },

    /// Nonzero high word on an inline value that cannot carry one
    #[error(
        "Unsupported 64-bit inline extension on tag {tag}: {field_type:?} x{count} with high word 0x{high:08X}"
    )]
    UnsupportedInlineExtension {
        tag: u16,
        field_type: FieldType,
        count: u32,
        high: u32,
    },
}

/// Errors in the variable-length header that prefixes a compressed payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FramingError {
    /// Payload is empty, so there is no header length byte
    #[error("Empty payload: no framing header present")]
    EmptyPayload,

    /// Declared header length is too short to hold its own fixed fields
    #[error("Framing header declares {declared} bytes but needs at least {required}")]
    HeaderTooShort { declared: usize, required: usize },

    /// Declared header length runs past the end of the payload
    #[error("Framing header declares {declared} bytes but payload has {available}")]
    Truncated { declared: usize, available: usize },
}

/// Errors from the NDPI tag-directory engine
#[derive(Debug, Clone, Error)]
pub enum NdpiError {
    /// Read failed at an absolute offset
    #[error("{component} at offset {offset}: {source}")]
    Source {
        component: &'static str,
        offset: u64,
        #[source]
        source: IoError,
    },

    /// File is too small to contain the header
    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// Directory chain points back at a directory already decoded
    #[error("Directory chain revisits offset {offset} (directory #{sequence})")]
    DirectoryCycle { offset: u64, sequence: u64 },
}

/// Errors from the CZI segment engine
#[derive(Debug, Clone, Error)]
pub enum CziError {
    /// Read failed at an absolute offset
    #[error("{component} at offset {offset}: {source}")]
    Source {
        component: &'static str,
        offset: u64,
        #[source]
        source: IoError,
    },

    /// Segment body does not match its declared layout
    #[error("Malformed {component} at offset {offset}: {reason}")]
    MalformedSegment {
        component: &'static str,
        offset: u64,
        reason: String,
    },

    /// Nested containers go deeper than the configured limit
    #[error("Nested container at offset {offset} exceeds depth limit {limit}")]
    DepthExceeded { limit: usize, offset: u64 },

    /// Attachment already decoded as a nested container in this session
    #[error("Attachment at offset {offset} is referenced more than once")]
    DuplicateReference { offset: u64 },
}

impl CziError {
    /// Whether this error comes from the byte source itself.
    ///
    /// Source errors abort the whole decode; everything else only aborts
    /// the branch that raised it.
    pub fn is_source_fatal(&self) -> bool {
        matches!(self, CziError::Source { .. })
    }
}

/// Errors related to format detection and dispatch
#[derive(Debug, Clone, Error)]
pub enum FormatError {
    /// I/O error while reading the signature
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// NDPI decoding error
    #[error("NDPI error: {0}")]
    Ndpi(#[from] NdpiError),

    /// CZI decoding error
    #[error("CZI error: {0}")]
    Czi(#[from] CziError),

    /// Signature matches no supported container
    #[error("Unsupported format: {reason}")]
    UnsupportedFormat { reason: String },
}
