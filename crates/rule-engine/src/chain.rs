//! 工作流链执行
//!
//! 按步骤顺序依次执行工作流，每一步只处理上一步匹配的行。
//! 某一步没有输出时链立即中止，剩余步骤不再执行。

use crate::error::{ChainError, RuleError};
use crate::executor::RuleExecutor;
use crate::models::{
    ChainExecutionResult, EvaluationResult, ReferenceTables, WorkflowChain, WorkflowChainStep,
    WorkflowChainStepResult,
};
use crate::source::{DataSource, EagerSource};
use crate::store::WorkflowStore;
use chrono::Utc;
use cohort_shared::observability::metrics::{record_chain_execution, record_chain_step};
use std::time::Instant;
use tracing::{error, info, instrument};

/// 链式执行器
#[derive(Clone)]
pub struct ChainExecutor {
    store: WorkflowStore,
    executor: RuleExecutor,
}

impl ChainExecutor {
    pub fn new(store: WorkflowStore, executor: RuleExecutor) -> Self {
        Self { store, executor }
    }

    pub fn store(&self) -> &WorkflowStore {
        &self.store
    }

    /// 执行工作流链
    ///
    /// `on_progress` 在每一步开始前收到 `round(100 * 已完成步数 / 总步数)`，结束时收到 100。
    #[instrument(skip_all, fields(chain_id = %chain.id, steps = chain.steps.len()))]
    pub async fn execute<F>(
        &self,
        chain: &WorkflowChain,
        initial: &dyn DataSource,
        tables: &ReferenceTables,
        mut on_progress: F,
    ) -> Result<ChainExecutionResult, ChainError>
    where
        F: FnMut(u8),
    {
        let started_at = Utc::now();
        let start = Instant::now();

        let mut steps: Vec<&WorkflowChainStep> = chain.steps.iter().collect();
        steps.sort_by_key(|s| s.order);
        let total_steps = steps.len();

        let mut completed: Vec<WorkflowChainStepResult> = Vec::with_capacity(total_steps);
        let mut current: Option<EagerSource> = None;
        let mut aborted_at: Option<usize> = None;

        for (index, step) in steps.iter().enumerate() {
            on_progress(progress(index, total_steps));

            let Some(workflow) = self.store.get(&step.workflow_id) else {
                error!(step_id = %step.id, workflow_id = %step.workflow_id, "步骤引用的工作流不存在");
                record_chain_execution("failed");
                return Err(ChainError {
                    step_id: step.id.clone(),
                    order: step.order,
                    completed_steps: completed,
                    source: RuleError::WorkflowNotFound {
                        step_id: step.id.clone(),
                        workflow_id: step.workflow_id.clone(),
                    },
                });
            };

            let input: &dyn DataSource = match &current {
                Some(rows) => rows,
                None => initial,
            };
            let input_records = input.len();

            let step_started_at = Utc::now();
            let step_start = Instant::now();
            let results = match self
                .executor
                .evaluate_rules(input, workflow.rules(), tables)
                .await
            {
                Ok(results) => results,
                Err(source) => {
                    error!(step_id = %step.id, error = %source, "步骤执行失败");
                    record_chain_execution("failed");
                    return Err(ChainError {
                        step_id: step.id.clone(),
                        order: step.order,
                        completed_steps: completed,
                        source,
                    });
                }
            };
            let elapsed = step_start.elapsed();
            record_chain_step(&step.workflow_id, elapsed.as_secs_f64());

            let output_records = results.matched_count;
            let next_rows = results.matched_rows.clone();
            info!(
                order = step.order,
                workflow_id = %step.workflow_id,
                input_records,
                output_records,
                "链步骤完成"
            );

            completed.push(WorkflowChainStepResult {
                step_id: step.id.clone(),
                workflow_id: step.workflow_id.clone(),
                workflow_name: workflow.name().to_string(),
                order: step.order,
                results,
                input_records,
                output_records,
                execution_time_ms: elapsed.as_millis() as u64,
                started_at: step_started_at,
                completed_at: Utc::now(),
            });

            if output_records == 0 {
                info!(order = step.order, skipped = total_steps - index - 1, "没有剩余记录，链提前中止");
                aborted_at = Some(input_records);
                break;
            }

            current = Some(EagerSource::new(next_rows));
        }

        on_progress(100);

        let final_results = match (aborted_at, completed.last()) {
            (Some(total_rows), _) => EvaluationResult::empty(total_rows),
            (None, Some(last)) => last.results.clone(),
            (None, None) => EvaluationResult::empty(initial.len()),
        };

        let aborted = aborted_at.is_some();
        record_chain_execution(if aborted { "aborted" } else { "completed" });

        Ok(ChainExecutionResult {
            chain_id: chain.id.clone(),
            steps: completed,
            final_results,
            aborted,
            total_execution_time: start.elapsed().as_millis() as u64,
            started_at,
            completed_at: Utc::now(),
        })
    }
}

/// 已完成步数对应的进度百分比
fn progress(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    (100.0 * completed as f64 / total as f64).round() as u8
}
