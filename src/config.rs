//! Configuration for WSI Decode.
//!
//! This module provides:
//! - Command-line arguments via clap, one subcommand per report
//! - Environment variables with `WSI_` prefix for the shared source options
//! - [`DecodeOptions`], the library-level settings passed to the decoders
//!
//! # Environment Variables
//!
//! - `WSI_MAX_DEPTH` - Maximum nesting depth of embedded CZI containers (default: 8)
//! - `WSI_BLOCK_SIZE` - Block size in bytes for the read cache (default: 64KB)
//! - `WSI_CACHE_BLOCKS` - Max blocks kept in the read cache (default: 256)

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::io::{DEFAULT_BLOCK_SIZE, DEFAULT_CACHE_CAPACITY};

// =============================================================================
// Default Values
// =============================================================================

/// Default maximum nesting depth of embedded containers.
pub const DEFAULT_MAX_NESTING_DEPTH: usize = 8;

/// Upper bound accepted for the nesting depth.
pub const MAX_NESTING_DEPTH_LIMIT: usize = 64;

// =============================================================================
// Decode Options
// =============================================================================

/// Settings shared by both decoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Deepest nested container that is still decoded (the file itself is 0)
    pub max_nesting_depth: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            max_nesting_depth: DEFAULT_MAX_NESTING_DEPTH,
        }
    }
}

impl DecodeOptions {
    pub fn with_max_nesting_depth(mut self, depth: usize) -> Self {
        self.max_nesting_depth = depth;
        self
    }

    /// Validate the options and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_nesting_depth == 0 || self.max_nesting_depth > MAX_NESTING_DEPTH_LIMIT {
            return Err(format!(
                "max_depth must be between 1 and {}",
                MAX_NESTING_DEPTH_LIMIT
            ));
        }
        Ok(())
    }
}

// =============================================================================
// CLI Arguments
// =============================================================================

/// WSI Decode - Inspect the container structure of whole-slide image files.
///
/// Decodes Hamamatsu NDPI and Zeiss CZI containers and reports their
/// directories, segments and image payload byte ranges. Pixel data is
/// never decompressed.
#[derive(Parser, Debug, Clone)]
#[command(name = "wsi-decode")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Decode a file and print its structure.
    Inspect(InspectConfig),

    /// Print one line per image payload range: offset, length, codec.
    Ranges(SourceConfig),

    /// List the raw segment headers of a CZI file.
    Segments(SourceConfig),
}

/// Options for reading and decoding a source file.
#[derive(Args, Debug, Clone)]
pub struct SourceConfig {
    /// Path to the slide file.
    pub path: PathBuf,

    /// Maximum nesting depth of embedded CZI containers.
    #[arg(long, default_value_t = DEFAULT_MAX_NESTING_DEPTH, env = "WSI_MAX_DEPTH")]
    pub max_depth: usize,

    /// Block size in bytes for the read cache.
    #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE, env = "WSI_BLOCK_SIZE")]
    pub block_size: usize,

    /// Maximum number of blocks kept in the read cache.
    #[arg(long, default_value_t = DEFAULT_CACHE_CAPACITY, env = "WSI_CACHE_BLOCKS")]
    pub cache_blocks: usize,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

/// Options for the `inspect` subcommand.
#[derive(Args, Debug, Clone)]
pub struct InspectConfig {
    #[command(flatten)]
    pub source: SourceConfig,

    /// Print the decoded tree as JSON.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

impl Cli {
    /// Options shared by every subcommand.
    pub fn source(&self) -> &SourceConfig {
        match &self.command {
            Command::Inspect(config) => &config.source,
            Command::Ranges(config) | Command::Segments(config) => config,
        }
    }

    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.source().validate()
    }
}

impl SourceConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.decode_options().validate()?;

        if self.cache_blocks == 0 {
            return Err("cache_blocks must be greater than 0".to_string());
        }

        // Validate block size (reasonable bounds)
        if self.block_size < 512 || self.block_size > 16 * 1024 * 1024 {
            return Err("block_size must be between 512 bytes and 16MB".to_string());
        }

        Ok(())
    }

    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions::default().with_max_nesting_depth(self.max_depth)
    }
}

// =============================================================================
// Tests
// =============================================================================
