//! 懒加载数据源
//!
//! 行按固定大小的块从底层加载器读取，块缓存在容量有界的 LRU 中。

use super::{DataSource, ScanOptions};
use crate::error::{Result, RuleError};
use crate::models::Row;
use cohort_shared::config::EngineConfig;
use cohort_shared::observability::metrics::record_cache_eviction;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::trace;

/// 原始行加载器
pub trait RowLoader: Send + Sync {
    /// 总行数
    fn total_rows(&self) -> usize;

    /// 加载 `[start, start + len)` 范围内的行，越界部分截断
    fn load_range(&self, start: usize, len: usize) -> Result<Vec<Row>>;
}

impl RowLoader for Vec<Row> {
    fn total_rows(&self) -> usize {
        self.len()
    }

    fn load_range(&self, start: usize, len: usize) -> Result<Vec<Row>> {
        let start = start.min(self.len());
        let end = start.saturating_add(len).min(self.len());
        Ok(self[start..end].to_vec())
    }
}

/// 懒加载数据源
pub struct LazySource<L> {
    loader: L,
    total: usize,
    chunk_size: usize,
    scan: ScanOptions,
    chunks: Mutex<LruCache<usize, Arc<Vec<Row>>>>,
    chunk_loads: AtomicUsize,
}

impl<L: RowLoader> LazySource<L> {
    pub fn new(loader: L, config: &EngineConfig) -> Self {
        let capacity =
            NonZeroUsize::new(config.cache_capacity_chunks).unwrap_or(NonZeroUsize::MIN);
        Self {
            total: loader.total_rows(),
            loader,
            chunk_size: config.chunk_size.max(1),
            scan: ScanOptions::from(config),
            chunks: Mutex::new(LruCache::new(capacity)),
            chunk_loads: AtomicUsize::new(0),
        }
    }

    /// 当前缓存的块数
    pub fn cached_chunks(&self) -> usize {
        self.chunks.lock().len()
    }

    /// 累计从加载器读取块的次数
    pub fn chunk_loads(&self) -> usize {
        self.chunk_loads.load(Ordering::Relaxed)
    }

    fn chunk(&self, index: usize) -> Result<Arc<Vec<Row>>> {
        if let Some(chunk) = self.chunks.lock().get(&index) {
            return Ok(Arc::clone(chunk));
        }

        let start = index * self.chunk_size;
        let rows = Arc::new(self.loader.load_range(start, self.chunk_size)?);
        self.chunk_loads.fetch_add(1, Ordering::Relaxed);
        trace!(chunk = index, rows = rows.len(), "加载数据块");

        self.chunks.lock().put(index, Arc::clone(&rows));
        Ok(rows)
    }
}

impl<L: RowLoader> DataSource for LazySource<L> {
    fn len(&self) -> usize {
        self.total
    }

    fn get_batch(&self, start: usize, size: usize) -> Result<Vec<Row>> {
        let end = start.saturating_add(size).min(self.total);
        if start >= end {
            return Ok(Vec::new());
        }

        let mut out = Vec::with_capacity(end - start);
        let mut pos = start;
        while pos < end {
            let index = pos / self.chunk_size;
            let chunk = self.chunk(index)?;
            let chunk_start = index * self.chunk_size;

            let expected = self.chunk_size.min(self.total - chunk_start);
            if chunk.len() < expected {
                return Err(RuleError::DataSource(format!(
                    "数据块 {} 应有 {} 行，加载器只返回 {} 行",
                    index,
                    expected,
                    chunk.len()
                )));
            }

            let from = pos - chunk_start;
            let to = (end - chunk_start).min(chunk.len());
            out.extend_from_slice(&chunk[from..to]);
            pos = chunk_start + to;
        }
        Ok(out)
    }

    fn clear_cache(&self) {
        self.chunks.lock().clear();
        record_cache_eviction();
    }

    fn scan_options(&self) -> ScanOptions {
        self.scan
    }
}
