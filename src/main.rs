//! WSI Decode - Inspect the container structure of whole-slide image files.
//!
//! This binary opens a local file, decodes it and prints a report.

use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, error};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wsi_decode::{
    config::{Cli, Command, InspectConfig, SourceConfig},
    decode, scan_segments, BlockCache, Container, DecodedFile, FileRangeReader, NdpiFile,
    RangeReader,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.source().verbose);

    // Validate configuration
    if let Err(e) = cli.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    match cli.command {
        Command::Inspect(config) => run_inspect(config).await,
        Command::Ranges(config) => run_ranges(config).await,
        Command::Segments(config) => run_segments(config).await,
    }
}

/// Initialize the tracing/logging subsystem.
///
/// Logs go to stderr so reports on stdout stay machine-readable.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "wsi_decode=debug"
    } else {
        "wsi_decode=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Open the source file behind a block cache.
async fn open_source(config: &SourceConfig) -> Option<BlockCache<FileRangeReader>> {
    match FileRangeReader::open(&config.path).await {
        Ok(reader) => Some(BlockCache::with_capacity(
            reader,
            config.block_size,
            config.cache_blocks,
        )),
        Err(e) => {
            error!("Failed to open {}: {}", config.path.display(), e);
            None
        }
    }
}

/// Open and decode the source file.
async fn decode_source(config: &SourceConfig) -> Option<DecodedFile> {
    let reader = open_source(config).await?;

    let result = decode(&reader, &config.decode_options()).await;
    debug!(
        hits = reader.hits(),
        misses = reader.misses(),
        "Block cache statistics"
    );

    match result {
        Ok(file) => Some(file),
        Err(e) => {
            error!("Failed to decode {}: {}", reader.identifier(), e);
            None
        }
    }
}

// =============================================================================
// Inspect Command
// =============================================================================

async fn run_inspect(config: InspectConfig) -> ExitCode {
    let Some(file) = decode_source(&config.source).await else {
        return ExitCode::FAILURE;
    };

    if config.json {
        match serde_json::to_string_pretty(&file) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                error!("Failed to serialize report: {}", e);
                return ExitCode::FAILURE;
            }
        }
        return ExitCode::SUCCESS;
    }

    println!("Format: {}", file.format().name());
    match &file {
        DecodedFile::Ndpi(ndpi) => print_ndpi(ndpi),
        DecodedFile::Czi(container) => print_container(container, 0),
    }

    let warnings = file.warnings();
    if !warnings.is_empty() {
        println!();
        println!("Warnings ({}):", warnings.len());
        for warning in warnings {
            println!("  {}", warning);
        }
    }

    ExitCode::SUCCESS
}

fn print_ndpi(file: &NdpiFile) {
    println!("First directory: {}", file.header.first_directory_offset);

    for dir in &file.directories {
        println!();
        println!(
            "Directory #{} @{} ({} records, next {})",
            dir.sequence_number,
            dir.offset,
            dir.records.len(),
            dir.next_directory_offset
        );

        if let (Some(width), Some(height)) = (dir.image_width(), dir.image_length()) {
            println!("  Size: {}x{}", width, height);
        }
        if let Some(lens) = dir.source_lens() {
            println!("  Source lens: {}", lens);
        }
        match dir.image_data {
            Some(range) => println!("  Image data: {}", range),
            None => println!("  Image data: (not located)"),
        }

        for record in &dir.records {
            let name = match record.known_tag() {
                Some(tag) => format!("{:?}", tag),
                None => record.tag.to_string(),
            };
            match &record.value {
                Ok(value) => println!("    {:<24} {}", name, summarize_value(value)),
                Err(e) => println!("    {:<24} <{}>", name, e),
            }
        }
    }
}

/// One-line summary of a record value.
fn summarize_value(value: &wsi_decode::Value) -> String {
    const MAX_ELEMENTS: usize = 8;

    if let Some(text) = value.as_str() {
        let text: String = text.chars().take(60).collect();
        return format!("{:?}", text);
    }
    match value.to_u64_vec() {
        Some(values) if values.len() <= MAX_ELEMENTS => format!("{:?}", values),
        Some(values) => format!("{:?}... ({} values)", &values[..MAX_ELEMENTS], values.len()),
        None => format!("{:?}", value)
            .chars()
            .take(80)
            .collect(),
    }
}

fn print_container(container: &Container, depth: usize) {
    let indent = "  ".repeat(depth);
    let header = &container.header;

    println!(
        "{}Container @{} (version {}.{}, file part {})",
        indent, container.base_offset, header.major, header.minor, header.file_part
    );
    println!("{}  File GUID: {}", indent, header.file_guid);

    if let Some(metadata) = &container.metadata {
        println!("{}  Metadata XML: {}", indent, metadata.xml);
    }

    if let Some(dir) = &container.sub_blocks {
        println!("{}  Sub-blocks: {}", indent, dir.items.len());
        for item in &dir.items {
            match &item.sub_block {
                Ok(block) => {
                    let downsample = item
                        .entry
                        .downsample()
                        .map(|d| format!(" 1/{}", d))
                        .unwrap_or_default();
                    println!(
                        "{}    @{} {} {:?}{} data {}",
                        indent,
                        block.segment.offset,
                        block.entry.compression.label(),
                        block.entry.pixel_type,
                        downsample,
                        block.data
                    );
                }
                Err(e) => println!("{}    <{}>", indent, e),
            }
        }
    }

    if let Some(dir) = &container.attachments {
        println!("{}  Attachments: {}", indent, dir.items.len());
        for item in &dir.items {
            match &item.attachment {
                Ok(attachment) => {
                    println!(
                        "{}    {} ({}) data {}",
                        indent, item.entry.name, item.entry.content_type, attachment.data
                    );
                    match &attachment.container {
                        Some(Ok(nested)) => print_container(nested, depth + 3),
                        Some(Err(e)) => println!("{}      <{}>", indent, e),
                        None => {}
                    }
                }
                Err(e) => println!("{}    {} <{}>", indent, item.entry.name, e),
            }
        }
    }
}

// =============================================================================
// Ranges Command
// =============================================================================

async fn run_ranges(config: SourceConfig) -> ExitCode {
    let Some(file) = decode_source(&config).await else {
        return ExitCode::FAILURE;
    };

    for payload in file.payload_ranges() {
        println!(
            "{} {} {}",
            payload.range.offset, payload.range.length, payload.codec
        );
    }

    ExitCode::SUCCESS
}

// =============================================================================
// Segments Command
// =============================================================================

async fn run_segments(config: SourceConfig) -> ExitCode {
    let Some(reader) = open_source(&config).await else {
        return ExitCode::FAILURE;
    };

    let scan = match scan_segments(&reader, 0).await {
        Ok(scan) => scan,
        Err(e) => {
            error!("Failed to scan {}: {}", reader.identifier(), e);
            return ExitCode::FAILURE;
        }
    };

    for segment in &scan.segments {
        println!(
            "{:>12} {:<16} allocated {:>10} used {:>10}",
            segment.offset,
            segment.kind.id(),
            segment.allocated_size,
            segment.used_size
        );
    }
    for warning in &scan.warnings {
        println!("warning {}", warning);
    }

    ExitCode::SUCCESS
}
