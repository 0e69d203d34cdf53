//! 测试数据模块
//!
//! 提供数据生成器和工作流 fixtures。

mod fixtures;
mod generators;

pub use fixtures::*;
pub use generators::*;
