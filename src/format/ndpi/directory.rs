//! NDPI directory decoding and value resolution.
//!
//! # Directory Layout
//! ```text
//! base + 0           record count N (u16)
//! base + 2           N records of 12 bytes: tag u16, type u16, count u32, value/offset-low u32
//! base + 2 + 12N     next directory offset (u64)
//! base + 10 + 12N    N high words (u32), one per record, in record order
//! ```
//!
//! The record array is laid out exactly as in baseline TIFF. NDPI files can
//! exceed 4GB, so the upper 32 bits of each record's offset live in the
//! high-word trailer after the next-directory pointer. For a single inline
//! LONG the same trailer slot widens the value itself to 64 bits.

use serde::Serialize;
use tracing::debug;

use crate::error::{FieldError, IoError, NdpiError};
use crate::format::field::{self, FieldType, Value};
use crate::format::range::{serialize_result, ByteRange};
use crate::format::warning::{Warning, WarningKind};
use crate::io::{read_u16_le, read_u32_le, read_u64_le, RangeReader};

use super::tags::NdpiTag;

/// Size of one directory record in bytes
pub const RECORD_SIZE: u64 = 12;

/// Size of the record count at the start of a directory
const COUNT_SIZE: u64 = 2;

/// Size of the next-directory pointer after the record array
const NEXT_OFFSET_SIZE: u64 = 8;

/// Size of one high-word trailer slot
const HIGH_WORD_SIZE: u64 = 4;

/// Bytes that fit in a record's own value field
const INLINE_CAPACITY: u64 = 4;

/// Absolute offset of the high-word trailer slot for record `position`.
///
/// The slot sits past the record count, the whole record array and the
/// 8-byte next-directory pointer: `base + 12N + 4i + 10`.
#[inline]
pub fn high_word_slot_offset(directory_offset: u64, record_count: u16, position: usize) -> u64 {
    directory_offset
        + RECORD_SIZE * record_count as u64
        + HIGH_WORD_SIZE * position as u64
        + COUNT_SIZE
        + NEXT_OFFSET_SIZE
}

/// Whether a record is always stored externally regardless of its size.
///
/// The scanner property map is written out of line even when it would fit
/// in the 4-byte value field.
#[inline]
pub fn is_always_external(tag: u16, field_type: FieldType) -> bool {
    tag == NdpiTag::PropertyMap.as_u16() && field_type == FieldType::Ascii
}

// =============================================================================
// Record
// =============================================================================

/// Where a record's value is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ValueSlot {
    /// Value held in the record's own 4-byte field, cut to its size
    Inline(Vec<u8>),

    /// Value stored at an absolute offset
    External { offset: u64, size: u64 },
}

impl ValueSlot {
    /// Byte size of the value, `count * element_size`.
    pub fn size(&self) -> u64 {
        match self {
            ValueSlot::Inline(bytes) => bytes.len() as u64,
            ValueSlot::External { size, .. } => *size,
        }
    }
}

/// A decoded directory record.
#[derive(Debug, Clone, Serialize)]
pub struct Record {
    /// Position within the directory (0-based)
    pub position: usize,

    /// Tag id
    pub tag: u16,

    /// Field type as stored
    pub field_type_raw: u16,

    /// Element count
    pub count: u32,

    /// The record's own 4-byte value/offset-low field
    pub value_field: u32,

    /// High word read from this record's trailer slot
    pub high_word: u32,

    /// Storage location, `None` when the field type cannot be sized
    pub slot: Option<ValueSlot>,

    /// Resolved value, or the reason it is unavailable
    #[serde(serialize_with = "serialize_result")]
    pub value: Result<Value, FieldError>,
}

impl Record {
    #[inline]
    pub fn field_type(&self) -> Option<FieldType> {
        FieldType::from_u16(self.field_type_raw)
    }

    /// Named tag, if the tag is in the known vocabulary.
    #[inline]
    pub fn known_tag(&self) -> Option<NdpiTag> {
        NdpiTag::from_u16(self.tag)
    }

    pub fn is_external(&self) -> bool {
        matches!(self.slot, Some(ValueSlot::External { .. }))
    }

    /// Resolved value, if available.
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref().ok()
    }
}

/// Fixed fields of a record before resolution.
#[derive(Debug, Clone, Copy)]
struct RawRecord {
    position: usize,
    tag: u16,
    field_type_raw: u16,
    count: u32,
    value_field: [u8; 4],
    high_word: u32,
}

impl RawRecord {
    fn parse(bytes: &[u8], position: usize, high_word: u32) -> Self {
        RawRecord {
            position,
            tag: read_u16_le(&bytes[0..2]),
            field_type_raw: read_u16_le(&bytes[2..4]),
            count: read_u32_le(&bytes[4..8]),
            value_field: [bytes[8], bytes[9], bytes[10], bytes[11]],
            high_word,
        }
    }

    fn low_word(&self) -> u32 {
        u32::from_le_bytes(self.value_field)
    }

    fn finish(self, slot: Option<ValueSlot>, value: Result<Value, FieldError>) -> Record {
        Record {
            position: self.position,
            tag: self.tag,
            field_type_raw: self.field_type_raw,
            count: self.count,
            value_field: self.low_word(),
            high_word: self.high_word,
            slot,
            value,
        }
    }
}

// =============================================================================
// Directory
// =============================================================================

/// A decoded NDPI directory.
#[derive(Debug, Clone, Serialize)]
pub struct Directory {
    /// Position in the chain, starting at 0
    pub sequence_number: u64,

    /// Absolute offset of the directory
    pub offset: u64,

    /// Records in file order
    pub records: Vec<Record>,

    /// Absolute offset of the next directory, 0 at the end of the chain
    pub next_directory_offset: u64,

    /// Strip byte range, when both strip tags resolve
    pub image_data: Option<ByteRange>,

    /// Non-fatal findings for this directory
    pub warnings: Vec<Warning>,
}

impl Directory {
    /// Decode the directory at `offset`.
    ///
    /// Record-level problems are attached to the affected record; only
    /// failed reads abort.
    pub async fn read<R: RangeReader>(
        reader: &R,
        offset: u64,
        sequence_number: u64,
    ) -> Result<Self, NdpiError> {
        let count_bytes = read_at(reader, "directory record count", offset, COUNT_SIZE).await?;
        let record_count = read_u16_le(&count_bytes);
        let n = record_count as u64;

        // Record array, next pointer and high-word trailer in one read
        let table_offset = offset + COUNT_SIZE;
        let table_len = RECORD_SIZE * n + NEXT_OFFSET_SIZE + HIGH_WORD_SIZE * n;
        let table = read_at(reader, "directory", table_offset, table_len).await?;

        let next_at = (RECORD_SIZE * n) as usize;
        let next_directory_offset = read_u64_le(&table[next_at..next_at + 8]);
        let trailer_at = next_at + NEXT_OFFSET_SIZE as usize;

        debug!(
            sequence_number,
            offset, record_count, next_directory_offset, "Decoding directory"
        );

        let mut warnings = Vec::new();
        let mut records = Vec::with_capacity(record_count as usize);

        for position in 0..record_count as usize {
            let record_at = position * RECORD_SIZE as usize;
            let slot_at = trailer_at + position * HIGH_WORD_SIZE as usize;
            debug_assert_eq!(
                table_offset + slot_at as u64,
                high_word_slot_offset(offset, record_count, position)
            );

            let raw = RawRecord::parse(
                &table[record_at..record_at + RECORD_SIZE as usize],
                position,
                read_u32_le(&table[slot_at..slot_at + 4]),
            );
            let record_offset = table_offset + record_at as u64;
            records.push(resolve_record(reader, raw, record_offset, &mut warnings).await?);
        }

        let image_data = locate_image_data(&records, offset, &mut warnings);

        Ok(Directory {
            sequence_number,
            offset,
            records,
            next_directory_offset,
            image_data,
            warnings,
        })
    }

    /// First record with the given tag.
    pub fn record(&self, tag: NdpiTag) -> Option<&Record> {
        self.record_by_id(tag.as_u16())
    }

    /// First record with the given numeric tag.
    pub fn record_by_id(&self, tag: u16) -> Option<&Record> {
        self.records.iter().find(|r| r.tag == tag)
    }

    /// Resolved value of the given tag.
    pub fn value(&self, tag: NdpiTag) -> Option<&Value> {
        self.record(tag).and_then(Record::value)
    }

    pub fn image_width(&self) -> Option<u64> {
        self.value(NdpiTag::ImageWidth).and_then(Value::as_u64)
    }

    pub fn image_length(&self) -> Option<u64> {
        self.value(NdpiTag::ImageLength).and_then(Value::as_u64)
    }

    pub fn compression(&self) -> Option<u64> {
        self.value(NdpiTag::Compression).and_then(Value::as_u64)
    }

    /// Objective magnification of this directory's image.
    ///
    /// Negative values mark non-pyramid images (-1 macro, -2 focus map).
    pub fn source_lens(&self) -> Option<f32> {
        match self.value(NdpiTag::SourceLens)? {
            Value::Float(v) => v.first().copied(),
            _ => None,
        }
    }
}

/// Read `len` bytes at `offset`, tagging failures with the component name.
async fn read_at<R: RangeReader>(
    reader: &R,
    component: &'static str,
    offset: u64,
    len: u64,
) -> Result<bytes::Bytes, NdpiError> {
    let source_error = |source: IoError| NdpiError::Source {
        component,
        offset,
        source,
    };
    let len = usize::try_from(len).map_err(|_| {
        source_error(IoError::RangeOutOfBounds {
            offset,
            requested: len,
            size: reader.size(),
        })
    })?;
    reader.read_exact_at(offset, len).await.map_err(source_error)
}

/// Resolve a record's value from its inline field, its trailer slot or an
/// external offset.
async fn resolve_record<R: RangeReader>(
    reader: &R,
    raw: RawRecord,
    record_offset: u64,
    warnings: &mut Vec<Warning>,
) -> Result<Record, NdpiError> {
    let field_type = match FieldType::from_u16(raw.field_type_raw) {
        Some(t) => t,
        None => {
            warnings.push(Warning::new(
                record_offset,
                WarningKind::UnknownFieldType {
                    tag: raw.tag,
                    field_type: raw.field_type_raw,
                },
            ));
            let value = field::decode_raw(raw.field_type_raw, raw.count, &raw.value_field);
            return Ok(raw.finish(None, value));
        }
    };

    let size = field_type.total_size(raw.count);
    let high = raw.high_word as u64;
    let low = raw.low_word() as u64;

    if size > INLINE_CAPACITY || is_always_external(raw.tag, field_type) {
        let offset = (high << 32) | low;
        let bytes = read_at(reader, "record value", offset, size).await?;
        let value = field::decode(field_type, raw.count, &bytes);
        return Ok(raw.finish(Some(ValueSlot::External { offset, size }), value));
    }

    let inline = raw.value_field[..size as usize].to_vec();

    let value = if raw.high_word == 0 {
        field::decode(field_type, raw.count, &inline)
    } else if field_type == FieldType::Long && raw.count == 1 {
        Ok(Value::Long8(vec![(high << 32) | low]))
    } else {
        let err = FieldError::UnsupportedInlineExtension {
            tag: raw.tag,
            field_type,
            count: raw.count,
            high: raw.high_word,
        };
        warnings.push(Warning::new(
            record_offset,
            WarningKind::RecordValueUnavailable {
                tag: raw.tag,
                reason: err.to_string(),
            },
        ));
        Err(err)
    };

    Ok(raw.finish(Some(ValueSlot::Inline(inline)), value))
}

/// Find the strip byte range from StripOffsets and StripByteCounts.
fn locate_image_data(
    records: &[Record],
    directory_offset: u64,
    warnings: &mut Vec<Warning>,
) -> Option<ByteRange> {
    let find = |tag: NdpiTag| records.iter().find(|r| r.tag == tag.as_u16());

    let strip_offsets = find(NdpiTag::StripOffsets);
    let strip_byte_counts = find(NdpiTag::StripByteCounts);
    let (offsets, byte_counts) = match (strip_offsets, strip_byte_counts) {
        (Some(o), Some(c)) => (o, c),
        (o, c) => {
            warnings.push(Warning::new(
                directory_offset,
                WarningKind::MissingStripTags {
                    has_offsets: o.is_some(),
                    has_byte_counts: c.is_some(),
                },
            ));
            return None;
        }
    };

    if offsets.count != 1 {
        warnings.push(Warning::new(
            directory_offset,
            WarningKind::MultipleStrips {
                count: offsets.count,
            },
        ));
    }

    let mut first = |record: &Record| {
        let value = record.value().and_then(Value::as_u64);
        if value.is_none() {
            warnings.push(Warning::new(
                directory_offset,
                WarningKind::InvalidStripValue { tag: record.tag },
            ));
        }
        value
    };

    let offset = first(offsets);
    let length = first(byte_counts);
    Some(ByteRange::new(offset?, length?))
}
