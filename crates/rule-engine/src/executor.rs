//! 规则执行器
//!
//! 对数据源中的每一行评估规则树，返回匹配行与统计信息。
//!
//! 分组条件是数据集级别的谓词：每个分组条件在一次评估会话中只计算一次，
//! 结果写入 [`GroupMemo`]，逐行评估时只做集合查找。大数据集按批扫描，
//! 批之间主动让出调度权，并在让出点检查取消令牌。

use crate::aggregate::{GroupAccumulator, GroupMemo, GroupStatsAccumulator, group_key};
use crate::error::{Result, RuleError};
use crate::evaluator::ConditionEvaluator;
use crate::models::{EvaluationResult, ReferenceTables, Row, RuleGroup};
use crate::operators::LogicalOperator;
use crate::reference::{ReferenceIndex, ReferenceMatcher};
use crate::source::{BatchCursor, DataSource, ScanOptions};
use cohort_shared::config::EngineConfig;
use cohort_shared::observability::metrics::record_rule_evaluation;
use std::collections::HashSet;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// 规则执行器
#[derive(Debug, Clone, Default)]
pub struct RuleExecutor {
    config: EngineConfig,
    /// 是否记录会话级诊断信息
    trace_enabled: bool,
    cancel: Option<CancellationToken>,
}

impl RuleExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// 启用评估追踪
    pub fn with_trace(mut self) -> Self {
        self.trace_enabled = true;
        self
    }

    /// 绑定取消令牌，在每个批次边界检查
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// 评估单行
    ///
    /// `memo` 中缺失的分组条件会基于 `dataset` 计算一次并写回，
    /// 同一会话内的后续行直接复用。
    pub fn evaluate_rule_group(
        &self,
        row: &Row,
        group: &RuleGroup,
        tables: &ReferenceTables,
        dataset: &[Row],
        memo: &mut GroupMemo,
    ) -> bool {
        let mut session = Session {
            tables,
            dataset,
            memo,
            references: None,
            short_circuit: self.config.short_circuit_leaves,
        };
        session.evaluate(row, group)
    }

    /// 对整个数据源评估规则树
    #[instrument(skip_all, fields(group_id = %group.id, total_rows = source.len()))]
    pub async fn evaluate_rules(
        &self,
        source: &dyn DataSource,
        group: &RuleGroup,
        tables: &ReferenceTables,
    ) -> Result<EvaluationResult> {
        let start = Instant::now();
        let total_rows = source.len();
        let mut trace = Vec::new();

        self.check_reference_tables(group, tables, &mut trace);

        // 预扫描：计算全部分组条件与分组统计
        let (mut memo, stats) = self.precompute_groups(source, group, &mut trace).await?;

        let mut matched_rows = Vec::new();
        let mut scan = BatchScan::new(source, &self.config, self.cancel.as_ref());
        {
            let mut session = Session {
                tables,
                dataset: &[],
                memo: &mut memo,
                references: Some(ReferenceIndex::new()),
                short_circuit: self.config.short_circuit_leaves,
            };
            while let Some(batch) = scan.next_batch().await? {
                for row in batch {
                    if session.evaluate(&row, group) {
                        matched_rows.push(row);
                    }
                }
            }
        }

        // 分组统计按首个分组条件的满足分组计算，与其他谓词无关
        let group_stats = stats.map(|(condition_id, acc)| match memo.get(&condition_id) {
            Some(keys) => acc.finish(keys),
            None => acc.finish(&HashSet::new()),
        });

        let mut result = EvaluationResult::new(matched_rows, total_rows);
        result.group_stats = group_stats;
        result.evaluation_time_ms = start.elapsed().as_millis() as u64;

        if self.trace_enabled {
            trace.push(format!(
                "扫描 {} 批, 匹配 {}/{} 行",
                scan.batches(), result.matched_count, total_rows
            ));
            result.trace = trace;
        }

        record_rule_evaluation(
            result.matched_count > 0,
            total_rows,
            start.elapsed().as_secs_f64(),
        );
        info!(
            matched = result.matched_count,
            total = total_rows,
            percentage = result.percentage,
            elapsed_ms = result.evaluation_time_ms,
            "规则评估完成"
        );

        Ok(result)
    }

    /// 每个会话只对缺失的引用表告警一次
    fn check_reference_tables(
        &self,
        group: &RuleGroup,
        tables: &ReferenceTables,
        trace: &mut Vec<String>,
    ) {
        let mut reported = HashSet::new();
        for cond in group.collect_reference_conditions() {
            if tables.contains_key(&cond.reference_table_id)
                || !reported.insert(cond.reference_table_id.as_str())
            {
                continue;
            }
            warn!(
                table_id = %cond.reference_table_id,
                condition_id = %cond.id,
                "引用表不存在，相关引用条件将不匹配"
            );
            if self.trace_enabled {
                trace.push(format!("引用表 {} 不存在", cond.reference_table_id));
            }
        }
    }

    async fn precompute_groups(
        &self,
        source: &dyn DataSource,
        group: &RuleGroup,
        trace: &mut Vec<String>,
    ) -> Result<(GroupMemo, Option<(String, GroupStatsAccumulator)>)> {
        let conditions = group.collect_group_conditions();
        let Some(first) = conditions.first() else {
            return Ok((GroupMemo::new(), None));
        };

        let mut stats = GroupStatsAccumulator::new(first.group_by_column.clone());
        let mut seen = HashSet::new();
        let mut accumulators: Vec<GroupAccumulator> = conditions
            .iter()
            .filter(|c| seen.insert(c.id.as_str()))
            .map(|c| GroupAccumulator::new(c))
            .collect();

        let mut scan = BatchScan::new(source, &self.config, self.cancel.as_ref());
        while let Some(batch) = scan.next_batch().await? {
            for acc in &mut accumulators {
                acc.extend(&batch);
            }
            stats.extend(&batch);
        }

        let mut memo = GroupMemo::new();
        for acc in accumulators {
            let id = acc.condition().id.clone();
            let groups = acc.group_count();
            let keys = acc.finish();
            debug!(condition_id = %id, groups, matched = keys.len(), "分组条件计算完成");
            if self.trace_enabled {
                trace.push(format!("分组条件 {}: {}/{} 个分组满足", id, keys.len(), groups));
            }
            memo.insert(id, keys);
        }

        Ok((memo, Some((first.id.clone(), stats))))
    }
}

/// 单次评估会话的可变状态
struct Session<'a> {
    tables: &'a ReferenceTables,
    dataset: &'a [Row],
    memo: &'a mut GroupMemo,
    references: Option<ReferenceIndex>,
    short_circuit: bool,
}

impl Session<'_> {
    fn evaluate(&mut self, row: &Row, group: &RuleGroup) -> bool {
        let mut results = Vec::with_capacity(group.predicate_count());

        // 叶子条件可以短路，其余谓词始终全部评估
        for cond in &group.conditions {
            let matched = ConditionEvaluator::evaluate(row, cond);
            results.push(matched);
            if self.short_circuit && decides(group.logic, matched) {
                break;
            }
        }

        for cond in &group.reference_conditions {
            let matched = match self.references.as_mut() {
                Some(index) => index.evaluate(row, cond, self.tables),
                None => ReferenceMatcher::evaluate(row, cond, self.tables),
            };
            results.push(matched);
        }

        for cond in &group.group_conditions {
            let keys = self.memo.get_or_compute(self.dataset, cond);
            let in_group = group_key(row, &cond.group_by_column).is_some_and(|k| keys.contains(&k));
            results.push(cond.action.apply(in_group));
        }

        for child in &group.groups {
            results.push(self.evaluate(row, child));
        }

        let combined = group.logic.combine(&results);
        if group.negated { !combined } else { combined }
    }
}

/// 单个结果是否已经决定了组合结果
fn decides(logic: LogicalOperator, value: bool) -> bool {
    match logic {
        LogicalOperator::And => !value,
        LogicalOperator::Or => value,
    }
}

/// 异步批扫描：在 [`BatchCursor`] 之上按周期让出调度权并检查取消
struct BatchScan<'a> {
    cursor: BatchCursor<'a, dyn DataSource + 'a>,
    yield_every: usize,
    cancel: Option<&'a CancellationToken>,
}

impl<'a> BatchScan<'a> {
    fn new(
        source: &'a dyn DataSource,
        config: &EngineConfig,
        cancel: Option<&'a CancellationToken>,
    ) -> Self {
        Self {
            cursor: BatchCursor::new(source, ScanOptions::from(config)),
            yield_every: config.yield_every_batches,
            cancel,
        }
    }

    fn batches(&self) -> usize {
        self.cursor.batches()
    }

    async fn next_batch(&mut self) -> Result<Option<Vec<Row>>> {
        let batches = self.cursor.batches();
        if batches > 0 && self.yield_every > 0 && batches % self.yield_every == 0 {
            tokio::task::yield_now().await;
        }

        if self.cancel.is_some_and(CancellationToken::is_cancelled) {
            let processed_rows = self.cursor.position();
            warn!(processed_rows, "评估已取消");
            return Err(RuleError::Cancelled { processed_rows });
        }

        self.cursor.next_batch()
    }
}
