//! Hamamatsu NDPI decoder.
//!
//! NDPI is a little-endian TIFF variant. The record array of every directory
//! stays binary-compatible with baseline TIFF, but offsets reach past 4GB:
//!
//! - The header's first-directory offset is 8 bytes wide.
//! - Each directory ends with an 8-byte next-directory offset.
//! - A trailer of per-record high words follows that pointer and supplies the
//!   upper 32 bits of every record's offset (see [`directory`]).
//!
//! Decoding walks the directory chain from the header, resolves every
//! record and locates each directory's strip byte range.

pub mod directory;
mod header;
mod tags;

use std::collections::HashSet;

use serde::Serialize;
use tracing::debug;

use crate::error::NdpiError;
use crate::io::RangeReader;

use super::range::ByteRange;
use super::warning::Warning;

pub use directory::{high_word_slot_offset, Directory, Record, ValueSlot, RECORD_SIZE};
pub use header::{is_ndpi_header, NdpiHeader, NDPI_HEADER_SIZE, NDPI_MAGIC};
pub use tags::NdpiTag;

/// A decoded NDPI file: header plus the full directory chain.
#[derive(Debug, Clone, Serialize)]
pub struct NdpiFile {
    /// Parsed header
    pub header: NdpiHeader,

    /// Directories in chain order
    pub directories: Vec<Directory>,

    /// File-level findings (header magic)
    pub warnings: Vec<Warning>,
}

impl NdpiFile {
    /// Decode the header and walk the directory chain.
    ///
    /// The chain ends at a zero next-directory offset. A next offset that
    /// was already visited is rejected as a cycle.
    pub async fn decode<R: RangeReader>(reader: &R) -> Result<Self, NdpiError> {
        if reader.size() < NDPI_HEADER_SIZE as u64 {
            return Err(NdpiError::FileTooSmall {
                required: NDPI_HEADER_SIZE as u64,
                actual: reader.size(),
            });
        }

        let header_bytes = reader
            .read_exact_at(0, NDPI_HEADER_SIZE)
            .await
            .map_err(|source| NdpiError::Source {
                component: "header",
                offset: 0,
                source,
            })?;
        let (header, warning) = NdpiHeader::parse(&header_bytes)?;

        debug!(
            identifier = reader.identifier(),
            first_directory_offset = header.first_directory_offset,
            "Walking NDPI directory chain"
        );

        let mut directories = Vec::new();
        let mut visited = HashSet::new();
        let mut offset = header.first_directory_offset;
        let mut sequence_number = 0u64;

        while offset != 0 {
            if !visited.insert(offset) {
                return Err(NdpiError::DirectoryCycle {
                    offset,
                    sequence: sequence_number,
                });
            }

            let directory = Directory::read(reader, offset, sequence_number).await?;
            offset = directory.next_directory_offset;
            directories.push(directory);
            sequence_number += 1;
        }

        Ok(NdpiFile {
            header,
            directories,
            warnings: warning.into_iter().collect(),
        })
    }

    /// Image data ranges of all directories that have one, with their
    /// sequence numbers.
    pub fn image_data_ranges(&self) -> impl Iterator<Item = (u64, ByteRange)> + '_ {
        self.directories
            .iter()
            .filter_map(|d| d.image_data.map(|range| (d.sequence_number, range)))
    }

    /// All warnings, file-level first, then per directory in chain order.
    pub fn all_warnings(&self) -> impl Iterator<Item = &Warning> {
        self.warnings
            .iter()
            .chain(self.directories.iter().flat_map(|d| d.warnings.iter()))
    }
}
