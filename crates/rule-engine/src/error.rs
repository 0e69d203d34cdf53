//! 规则引擎错误类型
//!
//! 数据形态问题（列缺失、日期或数值无法解析）从不产生错误，只会让条件不匹配。

use crate::models::WorkflowChainStepResult;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("规则解析失败: {0}")]
    ParseError(String),

    #[error("规则校验失败: {0}")]
    ValidationError(String),

    #[error("工作流未找到: 步骤 {step_id} 引用的工作流 {workflow_id} 不存在")]
    WorkflowNotFound { step_id: String, workflow_id: String },

    #[error("数据源错误: {0}")]
    DataSource(String),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON 序列化错误: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("评估已取消: 已处理 {processed_rows} 行")]
    Cancelled { processed_rows: usize },
}

pub type Result<T> = std::result::Result<T, RuleError>;

/// 链式执行失败
///
/// 标识失败的步骤，并保留此前已完成步骤的结果。
#[derive(Debug, Error)]
#[error("链式执行在步骤 {step_id} (order={order}) 失败: {source}")]
pub struct ChainError {
    pub step_id: String,
    pub order: u32,
    pub completed_steps: Vec<WorkflowChainStepResult>,
    #[source]
    pub source: RuleError,
}

impl ChainError {
    pub fn is_workflow_not_found(&self) -> bool {
        matches!(self.source, RuleError::WorkflowNotFound { .. })
    }
}
