//! 分组聚合
//!
//! 按分组列划分数据集，对每个分组计算聚合值并与阈值比较，返回满足条件的分组键集合。
//! 聚合以累加器形式实现，既可一次性处理内存切片，也可在分批扫描中逐批喂入。

use crate::models::{GroupCondition, GroupStats, Row, percentage};
use crate::operators::Aggregation;
use crate::value::parse_number;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// 分组键：去空白后的分组列值，空值不属于任何分组
pub fn group_key(row: &Row, column: &str) -> Option<String> {
    row.get(column)
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
}

/// 单个分组的聚合状态
#[derive(Debug, Default)]
struct GroupState {
    rows: usize,
    distinct: HashSet<String>,
    within_seen: HashSet<String>,
    numeric_count: usize,
    sum: f64,
    min: Option<f64>,
    max: Option<f64>,
}

impl GroupState {
    fn value(&self, aggregation: Aggregation) -> f64 {
        match aggregation {
            Aggregation::Count => self.rows as f64,
            Aggregation::DistinctCount => self.distinct.len() as f64,
            Aggregation::Sum => self.sum,
            Aggregation::Avg => {
                if self.numeric_count == 0 {
                    0.0
                } else {
                    self.sum / self.numeric_count as f64
                }
            }
            Aggregation::Min => self.min.unwrap_or(0.0),
            Aggregation::Max => self.max.unwrap_or(0.0),
        }
    }
}

/// 分组条件累加器
#[derive(Debug)]
pub struct GroupAccumulator {
    condition: GroupCondition,
    groups: HashMap<String, GroupState>,
}

impl GroupAccumulator {
    pub fn new(condition: &GroupCondition) -> Self {
        Self {
            condition: condition.clone(),
            groups: HashMap::new(),
        }
    }

    pub fn condition(&self) -> &GroupCondition {
        &self.condition
    }

    /// 喂入一行
    pub fn push(&mut self, row: &Row) {
        let Some(key) = group_key(row, &self.condition.group_by_column) else {
            return;
        };
        let state = self.groups.entry(key).or_default();
        state.rows += 1;

        let target = row
            .get(&self.condition.target_column)
            .map(str::trim)
            .filter(|v| !v.is_empty());

        match self.condition.aggregation {
            Aggregation::Count => {}
            Aggregation::DistinctCount => {
                // 每个约束列取值只让第一次出现的行参与计数
                if let Some(within) = &self.condition.within_distinct_column {
                    let instance = row.get(within).map(str::trim).unwrap_or_default();
                    if !state.within_seen.insert(instance.to_string()) {
                        return;
                    }
                }
                if let Some(value) = target {
                    state.distinct.insert(value.to_string());
                }
            }
            Aggregation::Sum | Aggregation::Avg | Aggregation::Min | Aggregation::Max => {
                if let Some(n) = target.and_then(parse_number) {
                    state.numeric_count += 1;
                    state.sum += n;
                    state.min = Some(state.min.map_or(n, |m| m.min(n)));
                    state.max = Some(state.max.map_or(n, |m| m.max(n)));
                }
            }
        }
    }

    pub fn extend<'a>(&mut self, rows: impl IntoIterator<Item = &'a Row>) {
        for row in rows {
            self.push(row);
        }
    }

    /// 参与聚合的分组数
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// 结束聚合，返回满足阈值的分组键
    pub fn finish(self) -> HashSet<String> {
        let aggregation = self.condition.aggregation;
        let operator = self.condition.operator;
        let threshold = self.condition.threshold;

        self.groups
            .into_iter()
            .filter(|(_, state)| operator.compare_f64(state.value(aggregation), threshold))
            .map(|(key, _)| key)
            .collect()
    }
}

/// 分组聚合器
pub struct GroupAggregator;

impl GroupAggregator {
    /// 计算满足分组条件的分组键集合
    pub fn compute_matching_group_keys(rows: &[Row], condition: &GroupCondition) -> HashSet<String> {
        let mut acc = GroupAccumulator::new(condition);
        acc.extend(rows);
        acc.finish()
    }

    /// 分组统计：独立扫描全量数据集统计不同分组键
    pub fn group_statistics(
        rows: &[Row],
        group_by_column: &str,
        matching_keys: &HashSet<String>,
    ) -> GroupStats {
        let mut stats = GroupStatsAccumulator::new(group_by_column);
        stats.extend(rows);
        stats.finish(matching_keys)
    }
}

/// 分组统计累加器
#[derive(Debug)]
pub struct GroupStatsAccumulator {
    group_by_column: String,
    keys: HashSet<String>,
}

impl GroupStatsAccumulator {
    pub fn new(group_by_column: impl Into<String>) -> Self {
        Self {
            group_by_column: group_by_column.into(),
            keys: HashSet::new(),
        }
    }

    pub fn push(&mut self, row: &Row) {
        if let Some(key) = group_key(row, &self.group_by_column) {
            self.keys.insert(key);
        }
    }

    pub fn extend<'a>(&mut self, rows: impl IntoIterator<Item = &'a Row>) {
        for row in rows {
            self.push(row);
        }
    }

    pub fn finish(self, matching_keys: &HashSet<String>) -> GroupStats {
        let total_groups = self.keys.len();
        let matched_groups = self
            .keys
            .iter()
            .filter(|k| matching_keys.contains(*k))
            .count();

        GroupStats {
            total_groups,
            matched_groups,
            group_percentage: percentage(matched_groups, total_groups),
        }
    }
}

/// 分组条件结果缓存
///
/// 以分组条件 id 为键，作用域为单次评估调用，调用结束即丢弃。
#[derive(Debug, Default, Clone)]
pub struct GroupMemo {
    keys: HashMap<String, Arc<HashSet<String>>>,
}

impl GroupMemo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, condition_id: &str) -> Option<&Arc<HashSet<String>>> {
        self.keys.get(condition_id)
    }

    pub fn insert(&mut self, condition_id: impl Into<String>, keys: HashSet<String>) {
        self.keys.insert(condition_id.into(), Arc::new(keys));
    }

    /// 命中缓存直接返回，否则对数据集计算一次并写入
    pub fn get_or_compute(&mut self, rows: &[Row], condition: &GroupCondition) -> Arc<HashSet<String>> {
        self.keys
            .entry(condition.id.clone())
            .or_insert_with(|| Arc::new(GroupAggregator::compute_matching_group_keys(rows, condition)))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
