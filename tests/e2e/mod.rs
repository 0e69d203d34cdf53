//! 规则引擎端到端测试
//!
//! 测试覆盖完整的数据流程，包括：
//! - JSON Lines 数据集与引用表加载
//! - 按数据量选择内存或懒加载数据源
//! - 多步骤工作流链执行
//! - 评估取消

pub mod data;
pub mod setup;
pub mod suites;

pub use setup::TestEnvironment;
