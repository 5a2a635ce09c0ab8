//! Decoders for whole-slide container formats.
//!
//! Two container layouts are supported, both decoded from a random-access
//! [`RangeReader`](crate::io::RangeReader):
//!
//! - **NDPI**: a TIFF directory chain with 64-bit offsets spread over a
//!   per-directory high-word trailer ([`ndpi`])
//! - **CZI**: a segment container with sub-block and attachment directories,
//!   possibly nesting further containers inside attachments ([`czi`])
//!
//! Use [`detect::decode`] to identify the format and decode in one step.
//! Decoding yields byte ranges; no pixel data is decompressed here.

pub mod czi;
pub mod detect;
pub mod field;
pub mod framing;
pub mod ndpi;
pub mod range;
pub mod warning;

pub use detect::{decode, detect_format, ContainerFormat, DecodedFile, PayloadRange};
pub use field::{FieldType, Value};
pub use framing::FramingHeader;
pub use range::ByteRange;
pub use warning::{Warning, WarningKind};
