use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use lru::LruCache;
use tokio::sync::Mutex;

use super::range_reader::{check_range, RangeReader};
use crate::error::IoError;

/// Default block size: 64KB
/// Directory records and trailer slots are tiny and clustered, so a modest
/// block catches a whole directory in one read.
pub const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;

/// Default cache capacity in number of blocks.
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Block-based caching layer that wraps any RangeReader.
///
/// Decoding issues many small reads at scattered offsets: a 2-byte record
/// count, then the record array, then the high-word trailer, then each
/// external value. The cache turns these into block-sized reads of the
/// underlying source and keeps recently used blocks in an LRU.
///
/// Decoding is sequential, so there is no in-flight deduplication: the
/// cache lock is held across a miss and the next reader waits for it.
pub struct BlockCache<R> {
    inner: R,
    block_size: usize,
    cache: Mutex<LruCache<u64, Bytes>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<R: RangeReader> BlockCache<R> {
    /// Create a new BlockCache with default block size and capacity.
    pub fn new(inner: R) -> Self {
        Self::with_capacity(inner, DEFAULT_BLOCK_SIZE, DEFAULT_CACHE_CAPACITY)
    }

    /// Create a new BlockCache with custom block size and capacity.
    ///
    /// Zero values fall back to a single byte block and a single cached block.
    pub fn with_capacity(inner: R, block_size: usize, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            block_size: block_size.max(1),
            cache: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// The wrapped reader.
    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Number of block lookups served from the cache.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Number of block lookups that went to the underlying reader.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    async fn get_block(&self, block_idx: u64) -> Result<Bytes, IoError> {
        let mut cache = self.cache.lock().await;
        if let Some(block) = cache.get(&block_idx) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(block.clone());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let offset = block_idx * self.block_size as u64;
        let remaining = self.inner.size().saturating_sub(offset);
        let len = remaining.min(self.block_size as u64) as usize;
        let block = self.inner.read_exact_at(offset, len).await?;
        cache.put(block_idx, block.clone());
        Ok(block)
    }
}

#[async_trait]
impl<R: RangeReader> RangeReader for BlockCache<R> {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        check_range(offset, len, self.inner.size())?;
        if len == 0 {
            return Ok(Bytes::new());
        }

        let block_size = self.block_size as u64;
        let start_block = offset / block_size;
        let end_block = (offset + len as u64 - 1) / block_size;
        let first_offset = (offset % block_size) as usize;

        if start_block == end_block {
            let block = self.get_block(start_block).await?;
            return Ok(block.slice(first_offset..first_offset + len));
        }

        let mut result = BytesMut::with_capacity(len);
        let mut block_offset = first_offset;
        for block_idx in start_block..=end_block {
            let block = self.get_block(block_idx).await?;
            let take = (block.len() - block_offset).min(len - result.len());
            result.extend_from_slice(&block[block_offset..block_offset + take]);
            block_offset = 0;
        }

        Ok(result.freeze())
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }

    fn identifier(&self) -> &str {
        self.inner.identifier()
    }
}
