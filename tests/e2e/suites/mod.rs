//! 端到端测试套件

mod cancellation;
mod chain_pipeline;
mod large_dataset;
