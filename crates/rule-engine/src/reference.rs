//! 引用表匹配
//!
//! 判断行中某列的值是否存在于引用表的指定列中（去空白、大小写不敏感）。

use crate::models::{ReferenceCondition, ReferenceTable, ReferenceTables, Row};
use crate::operators::ReferenceMatchType;
use crate::value::is_blank;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// 归一化比较键：去空白并转小写
pub fn normalize_key(value: &str) -> String {
    value.trim().to_lowercase()
}

/// 引用匹配器
pub struct ReferenceMatcher;

impl ReferenceMatcher {
    /// 评估引用条件
    ///
    /// 引用表不存在时条件永不匹配；行值为空时只有 not_match 成立。
    pub fn evaluate(row: &Row, condition: &ReferenceCondition, tables: &ReferenceTables) -> bool {
        let Some(table) = tables.get(&condition.reference_table_id) else {
            debug!(
                condition_id = %condition.id,
                table_id = %condition.reference_table_id,
                "引用表不存在，条件不匹配"
            );
            return false;
        };

        let raw = row.get(&condition.column);
        if is_blank(raw) {
            return condition.match_type == ReferenceMatchType::NotMatch;
        }
        let needle = normalize_key(raw.unwrap_or_default());

        let exists = Self::subset(table, condition).any(|r| {
            r.get(&condition.reference_column)
                .is_some_and(|v| normalize_key(v) == needle)
        });

        Self::apply(condition.match_type, exists)
    }

    /// 引用表中参与匹配的行：设置了过滤列和过滤值时只取满足过滤的行
    fn subset<'a>(
        table: &'a ReferenceTable,
        condition: &'a ReferenceCondition,
    ) -> impl Iterator<Item = &'a Row> + 'a {
        let filter = match (&condition.filter_column, &condition.filter_value) {
            (Some(column), Some(value)) => Some((column.as_str(), normalize_key(value))),
            _ => None,
        };

        table.rows.iter().filter(move |r| match &filter {
            Some((column, value)) => r.get(column).is_some_and(|v| normalize_key(v) == *value),
            None => true,
        })
    }

    fn apply(match_type: ReferenceMatchType, exists: bool) -> bool {
        match match_type {
            ReferenceMatchType::Match => exists,
            ReferenceMatchType::NotMatch => !exists,
        }
    }
}

/// 单次评估会话内的引用值索引
///
/// 对同一引用查找（表、列、过滤条件）只构建一次归一化值集合，
/// 语义与 [`ReferenceMatcher::evaluate`] 完全一致。
#[derive(Default)]
pub struct ReferenceIndex {
    lookups: HashMap<LookupKey, Option<HashSet<String>>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LookupKey {
    table_id: String,
    reference_column: String,
    filter: Option<(String, String)>,
}

impl LookupKey {
    fn of(condition: &ReferenceCondition) -> Self {
        let filter = match (&condition.filter_column, &condition.filter_value) {
            (Some(column), Some(value)) => Some((column.clone(), normalize_key(value))),
            _ => None,
        };
        Self {
            table_id: condition.reference_table_id.clone(),
            reference_column: condition.reference_column.clone(),
            filter,
        }
    }
}

impl ReferenceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// 通过索引评估引用条件
    pub fn evaluate(
        &mut self,
        row: &Row,
        condition: &ReferenceCondition,
        tables: &ReferenceTables,
    ) -> bool {
        let values = self
            .lookups
            .entry(LookupKey::of(condition))
            .or_insert_with(|| {
                tables.get(&condition.reference_table_id).map(|table| {
                    ReferenceMatcher::subset(table, condition)
                        .filter_map(|r| r.get(&condition.reference_column))
                        .map(normalize_key)
                        .collect()
                })
            });

        let Some(values) = values else {
            return false;
        };

        let raw = row.get(&condition.column);
        if is_blank(raw) {
            return condition.match_type == ReferenceMatchType::NotMatch;
        }

        let exists = values.contains(&normalize_key(raw.unwrap_or_default()));
        ReferenceMatcher::apply(condition.match_type, exists)
    }

    /// 已构建的查找数量
    pub fn len(&self) -> usize {
        self.lookups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookups.is_empty()
    }
}
