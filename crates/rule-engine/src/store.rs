//! 工作流存储管理
//!
//! 使用 DashMap 提供线程安全的工作流缓存，支持加载、更新、删除和批量操作。
//! 入库前经过编译器校验，链式执行通过 id 从这里解析步骤引用的工作流。

use crate::compiler::{CompiledWorkflow, RuleCompiler};
use crate::error::{Result, RuleError};
use crate::models::Workflow;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// 工作流存储
#[derive(Clone)]
pub struct WorkflowStore {
    workflows: Arc<DashMap<String, CompiledWorkflow>>,
    compiler: Arc<parking_lot::Mutex<RuleCompiler>>,
}

impl WorkflowStore {
    pub fn new() -> Self {
        Self {
            workflows: Arc::new(DashMap::new()),
            compiler: Arc::new(parking_lot::Mutex::new(RuleCompiler::new())),
        }
    }

    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }

    /// 加载工作流
    #[instrument(skip(self, workflow), fields(workflow_id = %workflow.id, workflow_name = %workflow.name))]
    pub fn load(&self, workflow: Workflow) -> Result<()> {
        let compiled = {
            let mut compiler = self.compiler.lock();
            compiler.compile(workflow)?
        };

        let workflow_id = compiled.id().to_string();
        self.workflows.insert(workflow_id.clone(), compiled);

        info!("工作流已加载: {}", workflow_id);
        Ok(())
    }

    /// 从 JSON 字符串加载工作流
    #[instrument(skip(self, json))]
    pub fn load_from_json(&self, json: &str) -> Result<String> {
        let compiled = {
            let mut compiler = self.compiler.lock();
            compiler.compile_from_json(json)?
        };

        let workflow_id = compiled.id().to_string();
        self.workflows.insert(workflow_id.clone(), compiled);

        info!("工作流已加载: {}", workflow_id);
        Ok(workflow_id)
    }

    /// 更新工作流，保留原创建时间
    #[instrument(skip(self, workflow), fields(workflow_id = %workflow.id))]
    pub fn update(&self, mut workflow: Workflow) -> Result<()> {
        let Some(created_at) = self
            .workflows
            .get(&workflow.id)
            .map(|w| w.workflow.created_at)
        else {
            warn!("更新不存在的工作流: {}", workflow.id);
            return Err(RuleError::ValidationError(format!(
                "工作流 {} 不存在",
                workflow.id
            )));
        };

        workflow.created_at = created_at;
        workflow.updated_at = Utc::now();
        self.load(workflow)
    }

    /// 删除工作流
    #[instrument(skip(self))]
    pub fn delete(&self, workflow_id: &str) -> Result<()> {
        if self.workflows.remove(workflow_id).is_some() {
            info!("工作流已删除: {}", workflow_id);
            Ok(())
        } else {
            warn!("删除不存在的工作流: {}", workflow_id);
            Err(RuleError::ValidationError(format!(
                "工作流 {} 不存在",
                workflow_id
            )))
        }
    }

    pub fn get(&self, workflow_id: &str) -> Option<CompiledWorkflow> {
        self.workflows.get(workflow_id).map(|w| w.clone())
    }

    pub fn contains(&self, workflow_id: &str) -> bool {
        self.workflows.contains_key(workflow_id)
    }

    pub fn list_ids(&self) -> Vec<String> {
        self.workflows.iter().map(|w| w.key().clone()).collect()
    }

    /// 获取所有工作流，按名称排序
    pub fn list(&self) -> Vec<Workflow> {
        let mut workflows: Vec<Workflow> = self
            .workflows
            .iter()
            .map(|w| w.value().workflow.clone())
            .collect();
        workflows.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        workflows
    }

    /// 批量加载工作流，跳过校验失败的条目
    #[instrument(skip(self, workflows))]
    pub fn load_batch(&self, workflows: Vec<Workflow>) -> Result<Vec<String>> {
        let mut loaded_ids = Vec::with_capacity(workflows.len());
        let mut errors = Vec::new();

        for workflow in workflows {
            let workflow_id = workflow.id.clone();
            match self.load(workflow) {
                Ok(()) => loaded_ids.push(workflow_id),
                Err(e) => errors.push((workflow_id, e)),
            }
        }

        if !errors.is_empty() {
            warn!("批量加载部分失败: {:?}", errors);
        }

        info!("批量加载完成: {} 成功, {} 失败", loaded_ids.len(), errors.len());
        Ok(loaded_ids)
    }

    #[instrument(skip(self))]
    pub fn clear(&self) {
        let count = self.workflows.len();
        self.workflows.clear();
        info!("已清空 {} 个工作流", count);
    }

    pub fn stats(&self) -> WorkflowStoreStats {
        let workflows_count = self.workflows.len();
        let total_columns: usize = self
            .workflows
            .iter()
            .map(|w| w.required_columns.len())
            .sum();

        WorkflowStoreStats {
            workflows_count,
            total_columns,
            avg_columns_per_workflow: if workflows_count > 0 {
                total_columns as f64 / workflows_count as f64
            } else {
                0.0
            },
        }
    }
}

impl Default for WorkflowStore {
    fn default() -> Self {
        Self::new()
    }
}

/// 工作流存储统计信息
#[derive(Debug, Clone)]
pub struct WorkflowStoreStats {
    pub workflows_count: usize,
    /// 所有工作流读取的列数之和
    pub total_columns: usize,
    pub avg_columns_per_workflow: f64,
}
