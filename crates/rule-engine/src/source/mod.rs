//! 数据源
//!
//! 评估器只通过 [`DataSource`] 按批读取行。小数据集直接放在内存中（[`EagerSource`]），
//! 超过阈值的数据集按块懒加载并用有界 LRU 缓存（[`LazySource`]）。

mod jsonl;
mod lazy;

pub use jsonl::JsonLinesLoader;
pub use lazy::{LazySource, RowLoader};

use crate::error::{Result, RuleError};
use crate::models::Row;
use cohort_shared::config::EngineConfig;
use tracing::debug;

/// 全量扫描参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOptions {
    /// 每批行数
    pub batch_size: usize,
    /// 每处理多少批清空一次缓存，0 表示不清空
    pub evict_every_batches: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            batch_size: 10_000,
            evict_every_batches: 0,
        }
    }
}

impl From<&EngineConfig> for ScanOptions {
    fn from(config: &EngineConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            evict_every_batches: config.evict_every_batches,
        }
    }
}

/// 数据源统一接口
pub trait DataSource: Send + Sync {
    /// 总行数
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 读取 `[start, start + size)` 范围内的行，越界部分截断
    fn get_batch(&self, start: usize, size: usize) -> Result<Vec<Row>>;

    /// 清空内部缓存，下次访问重新加载
    fn clear_cache(&self) {}

    fn scan_options(&self) -> ScanOptions {
        ScanOptions::default()
    }

    /// 按批扫描全部行，返回满足谓词的行（保持源顺序）
    ///
    /// 每处理 `evict_every_batches` 批清空一次缓存以限制峰值内存。
    fn filter(&self, predicate: &mut dyn FnMut(&Row) -> bool) -> Result<Vec<Row>> {
        let mut cursor = BatchCursor::new(self, self.scan_options());
        let mut out = Vec::new();
        while let Some(batch) = cursor.next_batch()? {
            out.extend(batch.into_iter().filter(|row| predicate(row)));
        }
        Ok(out)
    }
}

/// 顺序批游标
///
/// 全量扫描共用的批循环：按 `batch_size` 推进，每 `evict_every_batches` 批
/// 在读取下一批前清空数据源缓存。数据源声明的行数未读完就拿到空批时返回错误。
pub struct BatchCursor<'a, S: ?Sized> {
    source: &'a S,
    options: ScanOptions,
    position: usize,
    batches: usize,
}

impl<'a, S: DataSource + ?Sized> BatchCursor<'a, S> {
    pub fn new(source: &'a S, options: ScanOptions) -> Self {
        Self {
            source,
            options,
            position: 0,
            batches: 0,
        }
    }

    /// 已读取的行数
    pub fn position(&self) -> usize {
        self.position
    }

    /// 已读取的批数
    pub fn batches(&self) -> usize {
        self.batches
    }

    pub fn next_batch(&mut self) -> Result<Option<Vec<Row>>> {
        let evict = self.options.evict_every_batches;
        if self.batches > 0 && evict > 0 && self.batches % evict == 0 {
            self.source.clear_cache();
        }

        let total = self.source.len();
        if self.position >= total {
            return Ok(None);
        }

        let batch = self
            .source
            .get_batch(self.position, self.options.batch_size.max(1))?;
        if batch.is_empty() {
            return Err(RuleError::DataSource(format!(
                "数据源声明 {} 行，实际只读到 {} 行",
                total, self.position
            )));
        }

        self.position += batch.len();
        self.batches += 1;
        Ok(Some(batch))
    }
}

/// 内存数据源
#[derive(Debug, Clone, Default)]
pub struct EagerSource {
    rows: Vec<Row>,
}

impl EagerSource {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

impl From<Vec<Row>> for EagerSource {
    fn from(rows: Vec<Row>) -> Self {
        Self::new(rows)
    }
}

impl DataSource for EagerSource {
    fn len(&self) -> usize {
        self.rows.len()
    }

    fn get_batch(&self, start: usize, size: usize) -> Result<Vec<Row>> {
        let start = start.min(self.rows.len());
        let end = start.saturating_add(size).min(self.rows.len());
        Ok(self.rows[start..end].to_vec())
    }

    fn filter(&self, predicate: &mut dyn FnMut(&Row) -> bool) -> Result<Vec<Row>> {
        Ok(self.rows.iter().filter(|row| predicate(*row)).cloned().collect())
    }
}

/// 根据数据量选择数据源：不超过阈值时一次性加载到内存，否则懒加载
pub fn from_loader<L>(loader: L, config: &EngineConfig) -> Result<Box<dyn DataSource>>
where
    L: RowLoader + 'static,
{
    let total = loader.total_rows();
    if total <= config.large_dataset_threshold {
        debug!(total, "数据量未超过阈值，使用内存数据源");
        let rows = loader.load_range(0, total)?;
        if rows.len() != total {
            return Err(RuleError::DataSource(format!(
                "加载器声明 {} 行，实际返回 {} 行",
                total,
                rows.len()
            )));
        }
        Ok(Box::new(EagerSource::new(rows)))
    } else {
        debug!(
            total,
            threshold = config.large_dataset_threshold,
            "数据量超过阈值，使用懒加载数据源"
        );
        Ok(Box::new(LazySource::new(loader, config)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(n: usize) -> Vec<Row> {
        (0..n)
            .map(|i| [("Id", i.to_string())].into_iter().collect())
            .collect()
    }

    #[test]
    fn test_eager_get_batch_clamps() {
        let source = EagerSource::new(rows(5));
        assert_eq!(source.len(), 5);
        assert_eq!(source.get_batch(3, 10).unwrap().len(), 2);
        assert!(source.get_batch(7, 10).unwrap().is_empty());
    }

    #[test]
    fn test_eager_filter_preserves_order() {
        let source = EagerSource::new(rows(6));
        let even = source
            .filter(&mut |r: &Row| {
                r.get("Id")
                    .and_then(|v| v.parse::<u32>().ok())
                    .is_some_and(|n| n % 2 == 0)
            })
            .unwrap();
        let ids: Vec<_> = even.iter().filter_map(|r| r.get("Id")).collect();
        assert_eq!(ids, vec!["0", "2", "4"]);
    }

    /// 声明行数大于实际行数的数据源
    struct Truncated(EagerSource);

    impl DataSource for Truncated {
        fn len(&self) -> usize {
            self.0.len() + 3
        }

        fn get_batch(&self, start: usize, size: usize) -> Result<Vec<Row>> {
            self.0.get_batch(start, size)
        }
    }

    #[test]
    fn test_cursor_walks_in_batches() {
        let source = EagerSource::new(rows(7));
        let options = ScanOptions {
            batch_size: 3,
            evict_every_batches: 2,
        };
        let mut cursor = BatchCursor::new(&source, options);

        let mut sizes = Vec::new();
        while let Some(batch) = cursor.next_batch().unwrap() {
            sizes.push(batch.len());
        }
        assert_eq!(sizes, vec![3, 3, 1]);
        assert_eq!(cursor.position(), 7);
        assert_eq!(cursor.batches(), 3);
    }

    #[test]
    fn test_cursor_rejects_missing_rows() {
        let source = Truncated(EagerSource::new(rows(4)));
        let mut cursor = BatchCursor::new(&source, ScanOptions::default());

        assert_eq!(cursor.next_batch().unwrap().map(|b| b.len()), Some(4));
        let err = cursor.next_batch().unwrap_err();
        assert!(matches!(err, RuleError::DataSource(_)));
        assert!(err.to_string().contains("声明 7 行"));

        // 默认 filter 走同一个批循环
        assert!(source.filter(&mut |_: &Row| true).is_err());
    }

    #[test]
    fn test_from_loader_rejects_short_eager_load() {
        struct Short;

        impl RowLoader for Short {
            fn total_rows(&self) -> usize {
                3
            }

            fn load_range(&self, _start: usize, _len: usize) -> Result<Vec<Row>> {
                Ok(rows(2))
            }
        }

        let err = from_loader(Short, &EngineConfig::default()).err();
        assert!(matches!(err, Some(RuleError::DataSource(_))));
    }

    #[test]
    fn test_from_loader_picks_by_threshold() {
        let config = EngineConfig {
            large_dataset_threshold: 3,
            chunk_size: 2,
            ..EngineConfig::default()
        };
        let small = from_loader(rows(3), &config).unwrap();
        let large = from_loader(rows(4), &config).unwrap();
        assert_eq!(small.len(), 3);
        assert_eq!(large.len(), 4);
        assert_eq!(large.get_batch(1, 2).unwrap(), rows(4)[1..3].to_vec());
    }
}
