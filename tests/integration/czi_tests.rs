//! CZI integration tests.
//!
//! Decodes synthetic segment containers with sub-blocks, attachments and
//! nested containers.

use wsi_decode::{
    decode, scan_segments, BlockCache, ByteRange, CompressionKind, Container, CziError,
    DecodeOptions, DecodedFile, FormatError, FramingError, MemoryReader, SegmentKind,
    WarningKind,
};

use super::test_utils::{
    build_czi, relist_attachments, wrap_czi, AttachmentSpec, SubBlockSpec, TrackingMockReader,
    CZI_JPEG, CZI_UNCOMPRESSED, CZI_ZSTD1,
};

const XML: &str = "<ImageDocument><Metadata/></ImageDocument>";

/// A full-resolution JPEG tile, a 2x ZSTD1 tile and a raw 4x tile.
fn pyramid_sub_blocks() -> Vec<SubBlockSpec> {
    let mut zstd = vec![3, 0x01, 0x01];
    zstd.extend_from_slice(&[0x28, 0xB5, 0x2F, 0xFD, 0x00, 0x00]);

    vec![
        SubBlockSpec::new(CZI_JPEG, 256, 256, vec![0xFF, 0xD8, 0x00, 0x00, 0xFF, 0xD9]),
        SubBlockSpec::new(CZI_ZSTD1, 256, 128, zstd),
        SubBlockSpec::new(CZI_UNCOMPRESSED, 256, 64, vec![0x7F; 64 * 64]),
    ]
}

fn thumbnail() -> AttachmentSpec {
    AttachmentSpec {
        name: "Thumbnail",
        content_type: "JPG",
        data: vec![0xFF, 0xD8, 0xFF, 0xD9],
    }
}

// =============================================================================
// Container Decoding
// =============================================================================

#[tokio::test]
async fn test_decode_container_structure() {
    let data = build_czi(XML, &pyramid_sub_blocks(), &[thumbnail()]);
    let reader = MemoryReader::new(data.clone());

    let container = Container::decode(&reader, &DecodeOptions::default())
        .await
        .unwrap();

    assert_eq!(container.base_offset, 0);
    assert_eq!(container.depth, 0);
    assert_eq!(container.header.major, 1);

    let metadata = container.metadata.as_ref().unwrap();
    let xml = &data[metadata.xml.offset as usize..metadata.xml.end() as usize];
    assert_eq!(xml, XML.as_bytes());

    let blocks: Vec<_> = container.sub_blocks().collect();
    assert_eq!(blocks.len(), 3);
    assert_eq!(blocks[0].entry.compression, CompressionKind::Jpeg);
    assert_eq!(blocks[1].entry.compression, CompressionKind::Zstd1);
    assert_eq!(blocks[0].entry.downsample(), Some(1.0));
    assert_eq!(blocks[1].entry.downsample(), Some(2.0));
    assert_eq!(blocks[2].entry.downsample(), Some(4.0));

    let attachments = container.attachments.as_ref().unwrap();
    let thumb = attachments.by_name("Thumbnail").unwrap();
    assert!(thumb.container.is_none());
    assert_eq!(
        &data[thumb.data.offset as usize..thumb.data.end() as usize],
        &[0xFF, 0xD8, 0xFF, 0xD9]
    );

    assert!(container.all_warnings().is_empty());
}

#[tokio::test]
async fn test_sub_block_data_ranges() {
    let specs = pyramid_sub_blocks();
    let data = build_czi(XML, &specs, &[]);
    let reader = MemoryReader::new(data.clone());

    let container = Container::decode(&reader, &DecodeOptions::default())
        .await
        .unwrap();

    for (block, spec) in container.sub_blocks().zip(&specs) {
        assert_eq!(block.data.length, spec.payload.len() as u64);
        assert_eq!(block.metadata.length, 0);
        assert_eq!(block.attachment.length, 0);

        let start = block.data.offset as usize;
        assert_eq!(&data[start..start + spec.payload.len()], spec.payload.as_slice());
    }
}

#[tokio::test]
async fn test_zstd1_framing_is_stripped_from_payload() {
    let data = build_czi(XML, &pyramid_sub_blocks(), &[]);
    let reader = MemoryReader::new(data.clone());

    let container = Container::decode(&reader, &DecodeOptions::default())
        .await
        .unwrap();
    let blocks: Vec<_> = container.sub_blocks().collect();

    // Non-ZSTD1 payloads are handed over whole
    assert_eq!(blocks[0].payload(), Some(blocks[0].data));

    let zstd = blocks[1];
    let framing = zstd.framing.as_ref().unwrap();
    assert_eq!(framing.header_length, 3);
    assert!(framing.interleave_hint);

    let payload = zstd.payload().unwrap();
    assert_eq!(payload, ByteRange::new(zstd.data.offset + 3, zstd.data.length - 3));
    assert_eq!(
        &data[payload.offset as usize..payload.offset as usize + 4],
        &[0x28, 0xB5, 0x2F, 0xFD]
    );
}

#[tokio::test]
async fn test_bad_framing_is_kept_on_sub_block() {
    // Declares a 40-byte header in a 4-byte payload
    let specs = vec![
        SubBlockSpec::new(CZI_ZSTD1, 64, 64, vec![40, 0, 0, 0]),
        SubBlockSpec::new(CZI_JPEG, 64, 64, vec![0xFF, 0xD8]),
    ];
    let data = build_czi(XML, &specs, &[]);
    let reader = MemoryReader::new(data);

    let file = decode(&reader, &DecodeOptions::default()).await.unwrap();
    let DecodedFile::Czi(container) = &file else {
        panic!("expected a CZI container");
    };

    let blocks: Vec<_> = container.sub_blocks().collect();
    assert_eq!(
        blocks[0].framing,
        Err(FramingError::Truncated {
            declared: 40,
            available: 4
        })
    );
    assert!(blocks[0].payload().is_none());

    // Only the JPEG tile has a usable payload
    let payloads = file.payload_ranges();
    assert_eq!(payloads.len(), 1);
    assert_eq!(payloads[0].codec, "jpeg");
}

#[tokio::test]
async fn test_stored_size_above_logical_warns() {
    let specs = vec![SubBlockSpec {
        compression: CZI_UNCOMPRESSED,
        dimensions: vec![("X", 32, 64), ("Y", 32, 32), ("C", 1, 1)],
        payload: vec![0; 16],
    }];
    let data = build_czi(XML, &specs, &[]);
    let reader = MemoryReader::new(data);

    let container = Container::decode(&reader, &DecodeOptions::default())
        .await
        .unwrap();

    assert_eq!(container.sub_blocks().count(), 1);
    let warnings = container.all_warnings();
    assert!(warnings.iter().any(|w| matches!(
        &w.kind,
        WarningKind::StoredSizeExceedsLogical {
            axis,
            logical_size: 32,
            stored_size: 64,
        } if axis == "X"
    )));
}

// =============================================================================
// Nested Containers
// =============================================================================

#[tokio::test]
async fn test_nested_container_positions_are_relative() {
    let inner = build_czi(XML, &pyramid_sub_blocks(), &[]);
    let outer = wrap_czi(inner.clone());
    let reader = MemoryReader::new(outer.clone());

    let container = Container::decode(&reader, &DecodeOptions::default())
        .await
        .unwrap();

    let nested: Vec<_> = container.nested().collect();
    assert_eq!(nested.len(), 1);

    let embedded = nested[0];
    assert_eq!(embedded.depth, 1);
    assert!(embedded.base_offset > 0);
    assert_eq!(
        &outer[embedded.base_offset as usize..embedded.base_offset as usize + 10],
        b"ZISRAWFILE"
    );
    assert_eq!(embedded.sub_blocks().count(), 3);

    // The outer tile plus the three nested tiles
    assert_eq!(container.all_sub_blocks().len(), 4);
    for block in embedded.sub_blocks() {
        assert!(block.segment.offset > embedded.base_offset);
    }
}

#[tokio::test]
async fn test_nested_payloads_are_reported() {
    let outer = wrap_czi(build_czi(XML, &pyramid_sub_blocks(), &[]));
    let reader = MemoryReader::new(outer);

    let file = decode(&reader, &DecodeOptions::default()).await.unwrap();
    let codecs: Vec<_> = file.payload_ranges().into_iter().map(|p| p.codec).collect();

    assert_eq!(codecs, vec!["jpeg", "jpeg", "zstd1", "raw"]);
}

#[tokio::test]
async fn test_depth_limit_fails_only_the_deep_branch() {
    // Three levels below the file itself
    let leaf = build_czi(XML, &[SubBlockSpec::new(CZI_JPEG, 8, 8, vec![0xFF, 0xD8])], &[]);
    let data = wrap_czi(wrap_czi(wrap_czi(leaf)));
    let reader = MemoryReader::new(data);

    let options = DecodeOptions::default().with_max_nesting_depth(2);
    let container = Container::decode(&reader, &options).await.unwrap();

    let level1 = container.nested().next().unwrap();
    let level2 = level1.nested().next().unwrap();
    assert_eq!(level2.depth, 2);
    assert_eq!(level2.nested().count(), 0);

    let attachment = level2.attachments().next().unwrap();
    match &attachment.container {
        Some(Err(CziError::DepthExceeded { limit, offset })) => {
            assert_eq!(*limit, 2);
            assert_eq!(*offset, attachment.data.offset);
        }
        other => panic!("expected a depth error, got {:?}", other),
    }

    // Siblings of the failed branch still decode
    assert_eq!(level2.sub_blocks().count(), 1);
}

#[tokio::test]
async fn test_repeated_attachment_listings_stay_linear() {
    // Six levels, each listing its embedded container six times
    let leaf = build_czi(XML, &[SubBlockSpec::new(CZI_JPEG, 8, 8, vec![0xFF, 0xD8])], &[]);
    let mut data = leaf;
    for _ in 0..6 {
        data = relist_attachments(wrap_czi(data), 6);
    }
    let reader = MemoryReader::new(data);

    let container = Container::decode(&reader, &DecodeOptions::default())
        .await
        .unwrap();

    // One sub-block per level
    assert_eq!(container.all_sub_blocks().len(), 7);

    let mut level = &container;
    for depth in 0..6 {
        let items = &level.attachments.as_ref().unwrap().items;
        assert_eq!(items.len(), 6);
        let first = items[0].attachment.as_ref().unwrap();
        for item in &items[1..] {
            match &item.attachment {
                Err(CziError::DuplicateReference { offset }) => {
                    assert_eq!(*offset, first.segment.offset);
                }
                other => panic!("expected a duplicate at depth {}, got {:?}", depth, other),
            }
        }
        level = first.nested().unwrap();
    }
    assert_eq!(level.depth, 6);
}

#[tokio::test]
async fn test_corrupt_nested_container_is_kept_on_attachment() {
    let mut inner = build_czi(XML, &[], &[]);
    // Negative metadata position in the nested file header
    inner[32 + 60..32 + 68].copy_from_slice(&(-5i64).to_le_bytes());
    let data = wrap_czi(inner);
    let reader = MemoryReader::new(data);

    let container = Container::decode(&reader, &DecodeOptions::default())
        .await
        .unwrap();

    let attachment = container.attachments().next().unwrap();
    assert!(matches!(
        attachment.container,
        Some(Err(CziError::MalformedSegment { .. }))
    ));
    assert_eq!(container.sub_blocks().count(), 1);
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_truncated_file_is_fatal() {
    let data = build_czi(XML, &pyramid_sub_blocks(), &[thumbnail()]);
    let cut = data.len() - 100;
    let reader = MemoryReader::new(data[..cut].to_vec());

    let result = decode(&reader, &DecodeOptions::default()).await;
    match result {
        Err(FormatError::Czi(err)) => assert!(err.is_source_fatal()),
        other => panic!("expected a source error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_used_size_above_allocated_warns() {
    let mut data = build_czi(XML, &pyramid_sub_blocks(), &[]);
    // Metadata segment header follows the 544-byte file header segment
    let metadata_at = 32 + 512;
    let allocated_bytes = &data[metadata_at + 16..metadata_at + 24];
    let allocated = i64::from_le_bytes(allocated_bytes.try_into().unwrap());
    data[metadata_at + 24..metadata_at + 32].copy_from_slice(&(allocated + 64).to_le_bytes());
    let reader = MemoryReader::new(data);

    let container = Container::decode(&reader, &DecodeOptions::default())
        .await
        .unwrap();

    let metadata = container.metadata.as_ref().unwrap();
    assert!(metadata.warnings.iter().any(|w| matches!(
        w.kind,
        WarningKind::UsedSizeExceedsAllocated { .. }
    )));
    assert_eq!(container.sub_blocks().count(), 3);
}

// =============================================================================
// Segment Scan
// =============================================================================

#[tokio::test]
async fn test_scan_lists_segments_in_file_order() {
    let data = build_czi(XML, &pyramid_sub_blocks(), &[thumbnail()]);
    let reader = MemoryReader::new(data);

    let scan = scan_segments(&reader, 0).await.unwrap();
    let kinds: Vec<_> = scan.segments.iter().map(|s| s.kind.clone()).collect();

    assert_eq!(
        kinds,
        vec![
            SegmentKind::FileHeader,
            SegmentKind::Metadata,
            SegmentKind::SubBlock,
            SegmentKind::SubBlock,
            SegmentKind::SubBlock,
            SegmentKind::SubBlockDirectory,
            SegmentKind::Attachment,
            SegmentKind::AttachmentDirectory,
        ]
    );
    assert!(scan.warnings.is_empty());
}

#[tokio::test]
async fn test_decode_through_block_cache() {
    let data = build_czi(XML, &pyramid_sub_blocks(), &[thumbnail()]);
    let reader = BlockCache::with_capacity(TrackingMockReader::new(data, "slide.czi"), 4096, 8);

    let container = Container::decode(&reader, &DecodeOptions::default())
        .await
        .unwrap();

    assert_eq!(container.sub_blocks().count(), 3);
    assert!(reader.hits() > reader.misses());
    assert_eq!(reader.inner().request_count() as u64, reader.misses());
}
