//! LRU page cache over a [`ByteSource`].
//!
//! Block-graph walking produces many small reads at scattered offsets while
//! record streaming produces large sequential ones. The cache serves the
//! former from fixed-size aligned pages and lets the latter bypass the cache
//! entirely so bulk transfers do not evict the hot metadata pages.

use crate::source::ByteSource;
use crate::{Error, Result};
use std::collections::BTreeMap;

/// Default page size (64 KiB).
pub const DEFAULT_PAGE_SIZE: u64 = 64 * 1024;

/// Default maximum number of resident pages.
pub const DEFAULT_MAX_PAGES: usize = 16;

/// Cache access counters, observational only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads fully served from resident pages.
    pub hits: u64,
    /// Page loads triggered by a read.
    pub misses: u64,
    /// Pages dropped to make room.
    pub evictions: u64,
    /// Reads that bypassed the cache (length > 2 × page size).
    pub direct_reads: u64,
}

impl CacheStats {
    /// Fraction of page lookups that hit, in [0, 1].
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Page {
    bytes: Vec<u8>,
    last_access: u64,
}

/// Fixed-size-page LRU cache satisfying arbitrary-length byte reads.
pub struct PageCache<S: ByteSource> {
    source: S,
    page_size: u64,
    max_pages: usize,
    /// Pages keyed by their aligned start offset.
    pages: BTreeMap<u64, Page>,
    /// Monotonic access counter used as the recency timestamp.
    clock: u64,
    stats: CacheStats,
}

impl<S: ByteSource> PageCache<S> {
    /// Create a cache with the default page size and capacity.
    pub fn new(source: S) -> Self {
        Self::with_config(source, DEFAULT_PAGE_SIZE, DEFAULT_MAX_PAGES)
    }

    /// Create a cache with an explicit page size and page capacity.
    pub fn with_config(source: S, page_size: u64, max_pages: usize) -> Self {
        assert!(page_size > 0, "page size must be non-zero");
        assert!(max_pages > 0, "page capacity must be non-zero");
        Self {
            source,
            page_size,
            max_pages,
            pages: BTreeMap::new(),
            clock: 0,
            stats: CacheStats::default(),
        }
    }

    /// Total size of the backing source in bytes.
    pub fn source_len(&self) -> u64 {
        self.source.len()
    }

    /// Current access counters.
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Number of resident pages, never exceeds the configured capacity.
    pub fn resident_pages(&self) -> usize {
        self.pages.len()
    }

    /// Drop all resident pages. Counters are kept.
    pub fn clear(&mut self) {
        self.pages.clear();
    }

    /// Read `length` bytes starting at `offset`.
    ///
    /// Reads are clamped to the source size; a request past the end returns
    /// the available prefix (possibly empty). Reads longer than twice the
    /// page size go straight to the source.
    pub fn read_bytes(&mut self, offset: u64, length: u64) -> Result<Vec<u8>> {
        let source_len = self.source.len();
        if offset >= source_len {
            return Ok(Vec::new());
        }
        let length = length.min(source_len - offset);
        if length == 0 {
            return Ok(Vec::new());
        }

        if length > 2 * self.page_size {
            self.stats.direct_reads += 1;
            return self.source.read_range(offset, length);
        }

        let first_page = (offset / self.page_size) * self.page_size;
        let last_page = ((offset + length - 1) / self.page_size) * self.page_size;

        if first_page == last_page {
            let rel = (offset - first_page) as usize;
            let page = self.page(first_page)?;
            return Ok(page[rel..rel + length as usize].to_vec());
        }

        // Request spans multiple pages: gather the relevant slice of each
        // aligned page in offset order.
        let page_size = self.page_size;
        let mut out = Vec::with_capacity(length as usize);
        let mut cursor = offset;
        let end = offset + length;
        let mut page_start = first_page;
        while cursor < end {
            let page = self.page(page_start)?;
            let rel_start = (cursor - page_start) as usize;
            let rel_end = ((end - page_start).min(page_size)) as usize;
            if rel_end > page.len() {
                return Err(Error::TooShortBuffer {
                    actual: page.len(),
                    expected: rel_end,
                    file: file!(),
                    line: line!(),
                });
            }
            out.extend_from_slice(&page[rel_start..rel_end]);
            cursor = page_start + rel_end as u64;
            page_start += self.page_size;
        }
        Ok(out)
    }

    /// Return the page starting at `page_start`, loading and caching it on a
    /// miss. Refreshes the page's recency on every access.
    fn page(&mut self, page_start: u64) -> Result<&[u8]> {
        self.clock += 1;
        let clock = self.clock;

        if let Some(page) = self.pages.get_mut(&page_start) {
            page.last_access = clock;
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
            let source_len = self.source.len();
            let len = self.page_size.min(source_len.saturating_sub(page_start));
            let bytes = self.source.read_range(page_start, len)?;

            if self.pages.len() >= self.max_pages {
                self.evict_lru();
            }
            self.pages.insert(
                page_start,
                Page {
                    bytes,
                    last_access: clock,
                },
            );
        }
        Ok(&self.pages[&page_start].bytes)
    }

    /// Remove the least-recently-used page. Ties break on map order.
    fn evict_lru(&mut self) {
        let victim = self
            .pages
            .iter()
            .min_by_key(|(_, page)| page.last_access)
            .map(|(start, _)| *start);
        if let Some(start) = victim {
            self.pages.remove(&start);
            self.stats.evictions += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn matches_direct_slice_for_all_configs() {
        let data = source(1000);
        for (page_size, max_pages) in [(16u64, 2usize), (64, 4), (128, 1), (4096, 8)] {
            let mut cache = PageCache::with_config(data.clone(), page_size, max_pages);
            for (offset, length) in [
                (0u64, 1u64),
                (0, 1000),
                (17, 90),
                (999, 1),
                (512, 488),
                (100, 0),
                (990, 50), // clamped at the end
                (1500, 4), // fully past the end
            ] {
                let got = cache.read_bytes(offset, length).unwrap();
                let start = (offset as usize).min(data.len());
                let end = (offset + length).min(data.len() as u64) as usize;
                assert_eq!(got, &data[start..end.max(start)], "offset={offset} length={length} page_size={page_size}");
            }
        }
    }

    #[test]
    fn eviction_bound_holds() {
        let data = source(100_000);
        let mut cache = PageCache::with_config(data, 256, 3);
        for i in 0..400u64 {
            cache.read_bytes(i * 251, 13).unwrap();
            assert!(cache.resident_pages() <= 3);
        }
        assert!(cache.stats().evictions > 0);
    }

    #[test]
    fn bulk_reads_bypass_the_cache() {
        let data = source(10_000);
        let mut cache = PageCache::with_config(data.clone(), 256, 4);
        let got = cache.read_bytes(0, 9_000).unwrap();
        assert_eq!(got, &data[..9_000]);
        assert_eq!(cache.stats().direct_reads, 1);
        assert_eq!(cache.resident_pages(), 0);
    }

    #[test]
    fn hits_refresh_recency() {
        let data = source(4096);
        let mut cache = PageCache::with_config(data, 256, 2);
        cache.read_bytes(0, 8).unwrap(); // page 0
        cache.read_bytes(256, 8).unwrap(); // page 256
        cache.read_bytes(0, 8).unwrap(); // refresh page 0
        cache.read_bytes(512, 8).unwrap(); // evicts page 256, not page 0
        cache.read_bytes(0, 8).unwrap();
        let stats = cache.stats();
        assert_eq!(stats.misses, 3);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.evictions, 1);
        assert!(stats.hit_rate() > 0.0);
    }
}
