//! 指标模块
//!
//! 基于 metrics crate 的门面记录规则评估与链式执行指标。
//! 二进制可自行安装 recorder；未安装时所有记录均为空操作。

/// 注册指标描述
pub fn describe_metrics() {
    metrics::describe_counter!("rule_evaluations_total", "Total number of rule evaluations");
    metrics::describe_counter!(
        "rule_evaluation_rows_total",
        "Total number of rows scanned by rule evaluations"
    );
    metrics::describe_histogram!(
        "rule_evaluation_duration_seconds",
        "Rule evaluation duration in seconds"
    );

    metrics::describe_counter!("chain_executions_total", "Total number of chain executions");
    metrics::describe_histogram!(
        "chain_step_duration_seconds",
        "Chain step duration in seconds"
    );

    metrics::describe_counter!(
        "lazy_cache_evictions_total",
        "Total number of lazy data source cache clears"
    );
}

// ============================================================================
// 便捷的指标记录函数
// ============================================================================

/// 记录一次规则评估
#[inline]
pub fn record_rule_evaluation(matched: bool, rows: usize, duration_secs: f64) {
    metrics::counter!(
        "rule_evaluations_total",
        "matched" => if matched { "true" } else { "false" }
    )
    .increment(1);
    metrics::counter!("rule_evaluation_rows_total").increment(rows as u64);
    metrics::histogram!("rule_evaluation_duration_seconds").record(duration_secs);
}

/// 记录一次链式执行
#[inline]
pub fn record_chain_execution(status: &str) {
    metrics::counter!("chain_executions_total", "status" => status.to_string()).increment(1);
}

/// 记录链式执行中单步耗时
#[inline]
pub fn record_chain_step(workflow_id: &str, duration_secs: f64) {
    metrics::histogram!(
        "chain_step_duration_seconds",
        "workflow_id" => workflow_id.to_string()
    )
    .record(duration_secs);
}

/// 记录懒加载缓存清空
#[inline]
pub fn record_cache_eviction() {
    metrics::counter!("lazy_cache_evictions_total").increment(1);
}
