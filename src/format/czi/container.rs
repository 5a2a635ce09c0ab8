//! CZI container decoding.
//!
//! A container starts with a `ZISRAWFILE` segment whose body points at the
//! metadata segment and the two directories. All positions are relative to
//! the container base, which is 0 for the file itself and the attachment
//! data offset for a nested container.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;

use serde::Serialize;
use tracing::debug;

use crate::config::DecodeOptions;
use crate::error::CziError;
use crate::format::warning::Warning;
use crate::io::RangeReader;

use super::attachment::{Attachment, AttachmentDirectory};
use super::header::{FileHeader, FILE_HEADER_BODY_SIZE};
use super::metadata::MetadataSegment;
use super::segment::{absolute_position, read_at, read_segment_header, SegmentKind};
use super::subblock::{SubBlock, SubBlockDirectory};

type DecodeFuture<'a> = Pin<Box<dyn Future<Output = Result<Container, CziError>> + Send + 'a>>;

/// Nesting bookkeeping shared by every container of one decode.
///
/// Each attachment is decoded as a nested container at most once, so a
/// directory that lists the same attachment repeatedly cannot multiply the
/// work at every level.
#[derive(Debug, Clone, Default)]
pub struct NestingState {
    max_depth: usize,
    visited: HashSet<u64>,
}

impl NestingState {
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth,
            visited: HashSet::new(),
        }
    }

    /// Deepest nesting level that is still decoded.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Claim the attachment at absolute `offset` for nested decoding.
    ///
    /// Returns `false` if it was already claimed.
    pub fn claim(&mut self, offset: u64) -> bool {
        self.visited.insert(offset)
    }
}

/// A decoded CZI container.
#[derive(Debug, Clone, Serialize)]
pub struct Container {
    /// Absolute offset every stored position is relative to
    pub base_offset: u64,

    /// Nesting depth, 0 for the file itself
    pub depth: usize,

    pub header: FileHeader,

    pub metadata: Option<MetadataSegment>,

    pub sub_blocks: Option<SubBlockDirectory>,

    pub attachments: Option<AttachmentDirectory>,

    /// Findings on the file header segment
    pub warnings: Vec<Warning>,
}

impl Container {
    /// Decode the container at the start of the source.
    pub async fn decode<R: RangeReader>(
        reader: &R,
        options: &DecodeOptions,
    ) -> Result<Self, CziError> {
        Self::decode_at(reader, 0, 0, options.max_nesting_depth).await
    }

    /// Decode a container whose file header segment sits at `base`.
    ///
    /// Nested containers are decoded through their attachments at
    /// `depth + 1`; going past `max_depth` fails that container.
    pub fn decode_at<'a, R: RangeReader>(
        reader: &'a R,
        base: u64,
        depth: usize,
        max_depth: usize,
    ) -> DecodeFuture<'a> {
        Box::pin(async move {
            let mut nesting = NestingState::new(max_depth);
            Self::decode_nested(reader, base, depth, &mut nesting).await
        })
    }

    /// Decode a container at `base` as part of an ongoing decode.
    pub fn decode_nested<'a, R: RangeReader>(
        reader: &'a R,
        base: u64,
        depth: usize,
        nesting: &'a mut NestingState,
    ) -> DecodeFuture<'a> {
        Box::pin(async move {
            if depth > nesting.max_depth() {
                return Err(CziError::DepthExceeded {
                    limit: nesting.max_depth(),
                    offset: base,
                });
            }

            let (segment, warnings) =
                read_segment_header(reader, "file header", base, SegmentKind::FileHeader).await?;
            let body = read_at(
                reader,
                "file header",
                segment.body_offset(),
                FILE_HEADER_BODY_SIZE as u64,
            )
            .await?;
            let header = FileHeader::parse(segment, &body)?;

            debug!(
                base,
                depth,
                major = header.major,
                minor = header.minor,
                "Decoding CZI container"
            );

            let size = reader.size();

            let metadata = match header.metadata_position {
                Some(position) => {
                    let at = absolute_position(size, "metadata", base, position)?;
                    Some(MetadataSegment::read(reader, at).await?)
                }
                None => None,
            };

            let sub_blocks = match header.directory_position {
                Some(position) => {
                    let at = absolute_position(size, "sub-block directory", base, position)?;
                    Some(SubBlockDirectory::read(reader, base, at).await?)
                }
                None => None,
            };

            let attachments = match header.attachment_directory_position {
                Some(position) => {
                    let at = absolute_position(size, "attachment directory", base, position)?;
                    Some(AttachmentDirectory::read(reader, base, at, depth, nesting).await?)
                }
                None => None,
            };

            Ok(Container {
                base_offset: base,
                depth,
                header,
                metadata,
                sub_blocks,
                attachments,
                warnings,
            })
        })
    }

    /// Sub-blocks of this container, excluding nested containers.
    pub fn sub_blocks(&self) -> impl Iterator<Item = &SubBlock> {
        self.sub_blocks.iter().flat_map(|dir| dir.sub_blocks())
    }

    /// Attachments of this container, excluding nested containers.
    pub fn attachments(&self) -> impl Iterator<Item = &Attachment> {
        self.attachments.iter().flat_map(|dir| dir.attachments())
    }

    /// Containers nested directly in this one.
    pub fn nested(&self) -> impl Iterator<Item = &Container> {
        self.attachments().filter_map(Attachment::nested)
    }

    /// Sub-blocks of this container and every nested container, depth first.
    pub fn all_sub_blocks(&self) -> Vec<&SubBlock> {
        let mut out: Vec<&SubBlock> = self.sub_blocks().collect();
        for nested in self.nested() {
            out.extend(nested.all_sub_blocks());
        }
        out
    }

    /// Every warning in this container and its nested containers.
    pub fn all_warnings(&self) -> Vec<&Warning> {
        let mut out: Vec<&Warning> = self.warnings.iter().collect();
        if let Some(metadata) = &self.metadata {
            out.extend(&metadata.warnings);
        }
        if let Some(dir) = &self.sub_blocks {
            out.extend(&dir.warnings);
            out.extend(dir.sub_blocks().flat_map(|b| &b.warnings));
        }
        if let Some(dir) = &self.attachments {
            out.extend(&dir.warnings);
            for attachment in dir.attachments() {
                out.extend(&attachment.warnings);
                if let Some(nested) = attachment.nested() {
                    out.extend(nested.all_warnings());
                }
            }
        }
        out
    }
}
