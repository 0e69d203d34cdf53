//! 规则编译器
//!
//! 在工作流入库前校验规则树，并预先提取规则读取的列和分组条件。

use crate::error::{Result, RuleError};
use crate::models::{GroupCondition, ReferenceCondition, RuleCondition, RuleGroup, Workflow};
use std::collections::HashSet;

/// 编译后的工作流
#[derive(Debug, Clone)]
pub struct CompiledWorkflow {
    /// 原始工作流
    pub workflow: Workflow,
    /// 规则树读取的所有列
    pub required_columns: HashSet<String>,
    /// 编译版本号（用于缓存失效）
    pub compile_version: u64,
}

impl CompiledWorkflow {
    pub fn id(&self) -> &str {
        &self.workflow.id
    }

    pub fn name(&self) -> &str {
        &self.workflow.name
    }

    pub fn rules(&self) -> &RuleGroup {
        &self.workflow.rules
    }
}

/// 规则编译器
#[derive(Debug, Default)]
pub struct RuleCompiler {
    compile_version: u64,
}

impl RuleCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从 JSON 字符串编译工作流
    pub fn compile_from_json(&mut self, json: &str) -> Result<CompiledWorkflow> {
        let workflow: Workflow =
            serde_json::from_str(json).map_err(|e| RuleError::ParseError(e.to_string()))?;
        self.compile(workflow)
    }

    /// 编译工作流
    pub fn compile(&mut self, workflow: Workflow) -> Result<CompiledWorkflow> {
        if workflow.id.trim().is_empty() {
            return Err(RuleError::ValidationError("工作流 ID 不能为空".to_string()));
        }
        if workflow.name.trim().is_empty() {
            return Err(RuleError::ValidationError(format!(
                "工作流 '{}' 的名称不能为空",
                workflow.id
            )));
        }

        Self::validate(&workflow.rules)?;
        let required_columns = Self::required_columns(&workflow.rules);

        self.compile_version += 1;

        Ok(CompiledWorkflow {
            workflow,
            required_columns,
            compile_version: self.compile_version,
        })
    }

    /// 校验规则树
    pub fn validate(group: &RuleGroup) -> Result<()> {
        let mut group_condition_ids = HashSet::new();
        Self::validate_group(group, "root", &mut group_condition_ids)
    }

    fn validate_group<'a>(
        group: &'a RuleGroup,
        path: &str,
        group_condition_ids: &mut HashSet<&'a str>,
    ) -> Result<()> {
        for (i, cond) in group.conditions.iter().enumerate() {
            Self::validate_condition(cond, &format!("{}.conditions[{}]", path, i))?;
        }

        for (i, cond) in group.reference_conditions.iter().enumerate() {
            Self::validate_reference(cond, &format!("{}.referenceConditions[{}]", path, i))?;
        }

        for (i, cond) in group.group_conditions.iter().enumerate() {
            let cond_path = format!("{}.groupConditions[{}]", path, i);
            Self::validate_group_condition(cond, &cond_path)?;

            // 分组条件 id 是会话缓存的键
            if !group_condition_ids.insert(cond.id.as_str()) {
                return Err(RuleError::ValidationError(format!(
                    "分组条件 '{}' 的 id '{}' 重复",
                    cond_path, cond.id
                )));
            }
        }

        for (i, child) in group.groups.iter().enumerate() {
            Self::validate_group(child, &format!("{}.groups[{}]", path, i), group_condition_ids)?;
        }

        Ok(())
    }

    fn validate_condition(cond: &RuleCondition, path: &str) -> Result<()> {
        if cond.column.trim().is_empty() {
            return Err(RuleError::ValidationError(format!(
                "条件 '{}' 的列名不能为空",
                path
            )));
        }

        if cond.operator.needs_second_value()
            && cond.value2.as_deref().is_none_or(|v| v.trim().is_empty())
        {
            return Err(RuleError::ValidationError(format!(
                "条件 '{}' 的 {} 操作符需要 value2",
                path, cond.operator
            )));
        }

        Ok(())
    }

    fn validate_reference(cond: &ReferenceCondition, path: &str) -> Result<()> {
        let missing = [
            ("column", &cond.column),
            ("referenceTableId", &cond.reference_table_id),
            ("referenceColumn", &cond.reference_column),
        ]
        .into_iter()
        .find(|(_, v)| v.trim().is_empty());

        if let Some((field, _)) = missing {
            return Err(RuleError::ValidationError(format!(
                "引用条件 '{}' 的 {} 不能为空",
                path, field
            )));
        }

        Ok(())
    }

    fn validate_group_condition(cond: &GroupCondition, path: &str) -> Result<()> {
        if cond.group_by_column.trim().is_empty() || cond.target_column.trim().is_empty() {
            return Err(RuleError::ValidationError(format!(
                "分组条件 '{}' 的分组列和目标列不能为空",
                path
            )));
        }

        if !cond.threshold.is_finite() {
            return Err(RuleError::ValidationError(format!(
                "分组条件 '{}' 的阈值必须是有限数值",
                path
            )));
        }

        if !cond.operator.is_numeric_comparison() {
            return Err(RuleError::ValidationError(format!(
                "分组条件 '{}' 不支持 {} 操作符",
                path, cond.operator
            )));
        }

        Ok(())
    }

    /// 提取规则树从主数据集读取的所有列
    pub fn required_columns(group: &RuleGroup) -> HashSet<String> {
        let mut columns = HashSet::new();
        Self::collect_columns(group, &mut columns);
        columns
    }

    fn collect_columns(group: &RuleGroup, columns: &mut HashSet<String>) {
        columns.extend(group.conditions.iter().map(|c| c.column.clone()));
        columns.extend(group.reference_conditions.iter().map(|c| c.column.clone()));
        for cond in &group.group_conditions {
            columns.insert(cond.group_by_column.clone());
            columns.insert(cond.target_column.clone());
            if let Some(within) = &cond.within_distinct_column {
                columns.insert(within.clone());
            }
        }
        for child in &group.groups {
            Self::collect_columns(child, columns);
        }
    }

    /// 按深度优先顺序返回去重后的分组条件
    pub fn group_conditions(group: &RuleGroup) -> Vec<GroupCondition> {
        let mut seen = HashSet::new();
        group
            .collect_group_conditions()
            .into_iter()
            .filter(|c| seen.insert(c.id.clone()))
            .cloned()
            .collect()
    }
}
