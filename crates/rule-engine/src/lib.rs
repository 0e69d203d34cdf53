//! 队列筛选规则引擎
//!
//! 对表格数据集评估嵌套规则树，支持：
//! - 按值类型推断的列比较（数值、日期、文本）
//! - 引用表成员匹配
//! - 数据集级别的分组聚合条件
//! - 大数据集的分批懒加载扫描
//! - 工作流链式执行

pub mod aggregate;
pub mod chain;
pub mod comparator;
pub mod compiler;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod models;
pub mod operators;
pub mod reference;
pub mod source;
pub mod store;
pub mod value;

pub use aggregate::{GroupAccumulator, GroupAggregator, GroupMemo};
pub use chain::ChainExecutor;
pub use comparator::ValueComparator;
pub use compiler::{CompiledWorkflow, RuleCompiler};
pub use error::{ChainError, Result, RuleError};
pub use evaluator::ConditionEvaluator;
pub use executor::RuleExecutor;
pub use models::{
    ChainExecutionResult, EvaluationResult, GroupCondition, GroupStats, ReferenceCondition,
    ReferenceTable, ReferenceTables, Row, RuleCondition, RuleGroup, Workflow, WorkflowChain,
    WorkflowChainStep, WorkflowChainStepResult,
};
pub use operators::{Aggregation, GroupAction, LogicalOperator, Operator, ReferenceMatchType};
pub use reference::{ReferenceIndex, ReferenceMatcher};
pub use source::{
    BatchCursor, DataSource, EagerSource, JsonLinesLoader, LazySource, RowLoader, ScanOptions,
    from_loader,
};
pub use store::WorkflowStore;
pub use value::CellValue;
