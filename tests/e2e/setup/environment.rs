//! 测试环境管理
//!
//! 每个测试拥有独立的临时目录，数据集和引用表以 JSON Lines 文件形式写入其中。

use anyhow::Result;
use cohort_shared::config::EngineConfig;
use rule_engine::{
    DataSource, JsonLinesLoader, ReferenceTable, ReferenceTables, Workflow, WorkflowStore,
    from_loader,
};
use serde_json::Value;
use std::io::Write;
use std::path::PathBuf;
use tempfile::TempDir;

/// 测试环境
pub struct TestEnvironment {
    dir: TempDir,
    pub config: EngineConfig,
}

impl TestEnvironment {
    pub fn new() -> Result<Self> {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir()?,
            config,
        })
    }

    /// 写入 JSON Lines 文件
    pub fn write_jsonl(&self, name: &str, rows: &[Value]) -> Result<PathBuf> {
        let path = self.dir.path().join(name);
        let mut file = std::fs::File::create(&path)?;
        for row in rows {
            serde_json::to_writer(&mut file, row)?;
            file.write_all(b"\n")?;
        }
        file.flush()?;
        Ok(path)
    }

    /// 按配置阈值打开数据源
    pub fn open_source(&self, name: &str, rows: &[Value]) -> Result<Box<dyn DataSource>> {
        let path = self.write_jsonl(name, rows)?;
        Ok(from_loader(JsonLinesLoader::open(path)?, &self.config)?)
    }

    /// 写入并加载引用表
    pub fn reference_tables(&self, tables: &[(&str, Vec<Value>)]) -> Result<ReferenceTables> {
        let mut loaded = ReferenceTables::new();
        for (id, rows) in tables {
            let path = self.write_jsonl(&format!("{}.jsonl", id), rows)?;
            let rows = JsonLinesLoader::open(path)?.read_all()?;
            loaded.insert(id.to_string(), ReferenceTable::new(*id, rows));
        }
        Ok(loaded)
    }

    /// 以 JSON 形式写入并加载工作流定义
    pub fn workflow_store(&self, workflows: &[Workflow]) -> Result<WorkflowStore> {
        let store = WorkflowStore::new();
        for workflow in workflows {
            store.load_from_json(&serde_json::to_string(workflow)?)?;
        }
        Ok(store)
    }
}
