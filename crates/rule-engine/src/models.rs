//! 规则引擎领域模型

use crate::operators::{
    Aggregation, GroupAction, LogicalOperator, Operator, ReferenceMatchType,
};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

// ==================== 数据行 ====================

/// 数据行：列名到原始单元格文本的有序映射
///
/// 行在导入后不可变，内部用 `Arc` 共享，链式执行在步骤之间传递时只复制指针。
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(from = "IndexMap<String, Value>")]
pub struct Row(Arc<IndexMap<String, String>>);

impl Row {
    pub fn new(cells: IndexMap<String, String>) -> Self {
        Self(Arc::new(cells))
    }

    /// 获取单元格原始值，列不存在时返回 None
    pub fn get(&self, column: &str) -> Option<&str> {
        self.0.get(column).map(String::as_str)
    }

    /// 按列名顺序返回所有列
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::new(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl From<IndexMap<String, Value>> for Row {
    fn from(cells: IndexMap<String, Value>) -> Self {
        Self::new(
            cells
                .into_iter()
                .map(|(k, v)| (k, cell_to_string(&v)))
                .collect(),
        )
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

/// 将 JSON 标量转换为单元格文本；null 视为空串
pub fn cell_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

fn deserialize_cell<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(cell_to_string(&value))
}

fn deserialize_optional_cell<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::Null => None,
        other => Some(cell_to_string(&other)),
    }))
}

// ==================== 引用表 ====================

/// 引用表：由调用方持有，引擎只读
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceTable {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub headers: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Row>,
}

impl ReferenceTable {
    pub fn new(id: impl Into<String>, rows: Vec<Row>) -> Self {
        let id = id.into();
        let headers = rows
            .first()
            .map(|r| r.columns().map(str::to_string).collect())
            .unwrap_or_default();
        Self {
            name: id.clone(),
            id,
            headers,
            rows,
        }
    }
}

/// 按 id 索引的引用表集合
pub type ReferenceTables = HashMap<String, ReferenceTable>;

// ==================== 条件 ====================

/// 叶子条件：单列与常量比较
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    pub id: String,
    pub column: String,
    pub operator: Operator,
    #[serde(default, deserialize_with = "deserialize_cell")]
    pub value: String,
    #[serde(
        default,
        deserialize_with = "deserialize_optional_cell",
        skip_serializing_if = "Option::is_none"
    )]
    pub value2: Option<String>,
}

impl RuleCondition {
    pub fn new(column: impl Into<String>, operator: Operator, value: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            column: column.into(),
            operator,
            value: value.into(),
            value2: None,
        }
    }

    /// 设置第二个比较值（between / not_between）
    pub fn with_value2(mut self, value2: impl Into<String>) -> Self {
        self.value2 = Some(value2.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// 引用条件：行值是否存在于另一张表的某列中
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceCondition {
    pub id: String,
    #[serde(rename = "type")]
    pub match_type: ReferenceMatchType,
    pub column: String,
    pub reference_table_id: String,
    pub reference_column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter_column: Option<String>,
    #[serde(
        default,
        deserialize_with = "deserialize_optional_cell",
        skip_serializing_if = "Option::is_none"
    )]
    pub filter_value: Option<String>,
}

impl ReferenceCondition {
    pub fn new(
        match_type: ReferenceMatchType,
        column: impl Into<String>,
        reference_table_id: impl Into<String>,
        reference_column: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            match_type,
            column: column.into(),
            reference_table_id: reference_table_id.into(),
            reference_column: reference_column.into(),
            filter_column: None,
            filter_value: None,
        }
    }

    /// 仅在引用表中 `filter_column == filter_value` 的子集内查找
    pub fn with_filter(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.filter_column = Some(column.into());
        self.filter_value = Some(value.into());
        self
    }
}

/// 分组条件：按键分组聚合后与阈值比较
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupCondition {
    pub id: String,
    pub group_by_column: String,
    pub target_column: String,
    pub aggregation: Aggregation,
    pub operator: Operator,
    pub threshold: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub within_distinct_column: Option<String>,
    #[serde(default)]
    pub action: GroupAction,
}

impl GroupCondition {
    pub fn new(
        group_by_column: impl Into<String>,
        target_column: impl Into<String>,
        aggregation: Aggregation,
        operator: Operator,
        threshold: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            group_by_column: group_by_column.into(),
            target_column: target_column.into(),
            aggregation,
            operator,
            threshold,
            within_distinct_column: None,
            action: GroupAction::KeepMatchingGroups,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn within_distinct(mut self, column: impl Into<String>) -> Self {
        self.within_distinct_column = Some(column.into());
        self
    }

    pub fn with_action(mut self, action: GroupAction) -> Self {
        self.action = action;
        self
    }
}

// ==================== 规则组 ====================

/// 规则组（递归）
///
/// 子组以 `Arc` 持有，编辑时只复制从根到目标节点的路径，未改动的子树共享。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleGroup {
    pub id: String,
    #[serde(default)]
    pub conditions: Vec<RuleCondition>,
    #[serde(default)]
    pub reference_conditions: Vec<ReferenceCondition>,
    #[serde(default)]
    pub group_conditions: Vec<GroupCondition>,
    #[serde(default)]
    pub logic: LogicalOperator,
    #[serde(default)]
    pub groups: Vec<Arc<RuleGroup>>,
    #[serde(default)]
    pub negated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Default for RuleGroup {
    fn default() -> Self {
        Self::new(LogicalOperator::And)
    }
}

impl RuleGroup {
    pub fn new(logic: LogicalOperator) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conditions: Vec::new(),
            reference_conditions: Vec::new(),
            group_conditions: Vec::new(),
            logic,
            groups: Vec::new(),
            negated: false,
            name: None,
        }
    }

    pub fn and() -> Self {
        Self::new(LogicalOperator::And)
    }

    pub fn or() -> Self {
        Self::new(LogicalOperator::Or)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn condition(mut self, condition: RuleCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn reference(mut self, condition: ReferenceCondition) -> Self {
        self.reference_conditions.push(condition);
        self
    }

    pub fn group_condition(mut self, condition: GroupCondition) -> Self {
        self.group_conditions.push(condition);
        self
    }

    pub fn child(mut self, group: RuleGroup) -> Self {
        self.groups.push(Arc::new(group));
        self
    }

    pub fn negate(mut self) -> Self {
        self.negated = !self.negated;
        self
    }

    /// 本组直接包含的谓词数量（含子组）
    pub fn predicate_count(&self) -> usize {
        self.conditions.len()
            + self.reference_conditions.len()
            + self.group_conditions.len()
            + self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predicate_count() == 0
    }

    /// 深度优先查找子组
    pub fn find_group(&self, id: &str) -> Option<&RuleGroup> {
        if self.id == id {
            return Some(self);
        }
        self.groups.iter().find_map(|g| g.find_group(id))
    }

    /// 深度优先收集整棵树中的分组条件
    pub fn collect_group_conditions(&self) -> Vec<&GroupCondition> {
        let mut out = Vec::new();
        self.walk(&mut |g| out.extend(g.group_conditions.iter()));
        out
    }

    /// 深度优先收集整棵树中的引用条件
    pub fn collect_reference_conditions(&self) -> Vec<&ReferenceCondition> {
        let mut out = Vec::new();
        self.walk(&mut |g| out.extend(g.reference_conditions.iter()));
        out
    }

    fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a RuleGroup)) {
        visit(self);
        for child in &self.groups {
            child.walk(visit);
        }
    }

    /// 以写时复制方式更新目标组
    ///
    /// 返回新的根；目标不存在时返回 None。原树保持不变。
    pub fn update_group<F>(&self, target_id: &str, update: F) -> Option<RuleGroup>
    where
        F: FnOnce(&RuleGroup) -> RuleGroup,
    {
        let mut update = Some(update);
        self.update_group_inner(target_id, &mut update)
    }

    fn update_group_inner<F>(&self, target_id: &str, update: &mut Option<F>) -> Option<RuleGroup>
    where
        F: FnOnce(&RuleGroup) -> RuleGroup,
    {
        if self.id == target_id {
            return update.take().map(|f| f(self));
        }

        for (i, child) in self.groups.iter().enumerate() {
            if let Some(new_child) = child.update_group_inner(target_id, update) {
                let mut copy = self.clone();
                copy.groups[i] = Arc::new(new_child);
                return Some(copy);
            }
        }

        None
    }

    /// 向目标组追加叶子条件
    pub fn with_condition(&self, target_id: &str, condition: RuleCondition) -> Option<RuleGroup> {
        self.update_group(target_id, |g| g.clone().condition(condition))
    }

    /// 向目标组追加子组
    pub fn with_child_group(&self, target_id: &str, child: RuleGroup) -> Option<RuleGroup> {
        self.update_group(target_id, |g| g.clone().child(child))
    }

    /// 移除任意层级中 id 匹配的条件（叶子、引用、分组条件）
    pub fn without_condition(&self, condition_id: &str) -> Option<RuleGroup> {
        let owner = self.find_condition_owner(condition_id)?.id.clone();
        self.update_group(&owner, |g| {
            let mut copy = g.clone();
            copy.conditions.retain(|c| c.id != condition_id);
            copy.reference_conditions.retain(|c| c.id != condition_id);
            copy.group_conditions.retain(|c| c.id != condition_id);
            copy
        })
    }

    /// 切换目标组的取反标记
    pub fn toggle_negation(&self, target_id: &str) -> Option<RuleGroup> {
        self.update_group(target_id, |g| g.clone().negate())
    }

    fn find_condition_owner(&self, condition_id: &str) -> Option<&RuleGroup> {
        let owns = self.conditions.iter().any(|c| c.id == condition_id)
            || self.reference_conditions.iter().any(|c| c.id == condition_id)
            || self.group_conditions.iter().any(|c| c.id == condition_id);
        if owns {
            return Some(self);
        }
        self.groups
            .iter()
            .find_map(|g| g.find_condition_owner(condition_id))
    }
}

// ==================== 评估结果 ====================

/// 分组统计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupStats {
    pub total_groups: usize,
    pub matched_groups: usize,
    pub group_percentage: f64,
}

/// 评估结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub matched_rows: Vec<Row>,
    pub total_rows: usize,
    pub matched_count: usize,
    pub percentage: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_stats: Option<GroupStats>,
    #[serde(default)]
    pub evaluation_time_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trace: Vec<String>,
}

impl EvaluationResult {
    pub fn new(matched_rows: Vec<Row>, total_rows: usize) -> Self {
        let matched_count = matched_rows.len();
        Self {
            matched_rows,
            total_rows,
            matched_count,
            percentage: percentage(matched_count, total_rows),
            group_stats: None,
            evaluation_time_ms: 0,
            trace: Vec::new(),
        }
    }

    /// 零记录结果（链式执行中止时使用）
    pub fn empty(total_rows: usize) -> Self {
        Self::new(Vec::new(), total_rows)
    }
}

/// 百分比，保留两位小数；分母为 0 时返回 0
pub fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let raw = 100.0 * part as f64 / total as f64;
    (raw * 100.0).round() / 100.0
}

// ==================== 工作流与链 ====================

/// 工作流：一组命名的规则
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workflow {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub rules: RuleGroup,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    pub fn new(name: impl Into<String>, rules: RuleGroup) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            description: None,
            rules,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// 链中的一个步骤
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowChainStep {
    pub id: String,
    pub workflow_id: String,
    #[serde(default)]
    pub workflow_name: String,
    pub order: u32,
}

impl WorkflowChainStep {
    pub fn new(workflow_id: impl Into<String>, order: u32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            workflow_id: workflow_id.into(),
            workflow_name: String::new(),
            order,
        }
    }
}

/// 工作流链
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowChain {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub steps: Vec<WorkflowChainStep>,
}

impl WorkflowChain {
    pub fn new(name: impl Into<String>, steps: Vec<WorkflowChainStep>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            steps,
        }
    }
}

/// 单步执行结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowChainStepResult {
    pub step_id: String,
    pub workflow_id: String,
    pub workflow_name: String,
    pub order: u32,
    pub results: EvaluationResult,
    pub input_records: usize,
    pub output_records: usize,
    pub execution_time_ms: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// 链式执行结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainExecutionResult {
    pub chain_id: String,
    pub steps: Vec<WorkflowChainStepResult>,
    pub final_results: EvaluationResult,
    /// 是否因某步无输出而提前中止
    #[serde(default)]
    pub aborted: bool,
    pub total_execution_time: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> RuleGroup {
        RuleGroup::and()
            .with_id("root")
            .condition(RuleCondition::new("Age", Operator::GreaterEqual, "18").with_id("c1"))
            .child(
                RuleGroup::or()
                    .with_id("left")
                    .condition(RuleCondition::new("Sex", Operator::Equals, "F").with_id("c2")),
            )
            .child(RuleGroup::or().with_id("right"))
    }

    #[test]
    fn test_row_deserialize_scalars() {
        let row: Row = serde_json::from_str(r#"{"Age": 15, "Name": "Ann", "Flag": true, "Note": null}"#)
            .unwrap();
        assert_eq!(row.get("Age"), Some("15"));
        assert_eq!(row.get("Flag"), Some("true"));
        assert_eq!(row.get("Note"), Some(""));
        assert_eq!(row.columns().collect::<Vec<_>>(), vec!["Age", "Name", "Flag", "Note"]);
    }

    #[test]
    fn test_row_serialize_preserves_order() {
        let row: Row = [("b", "1"), ("a", "2")].into_iter().collect();
        assert_eq!(serde_json::to_string(&row).unwrap(), r#"{"b":"1","a":"2"}"#);
    }

    #[test]
    fn test_rule_group_deserialization() {
        let json = r#"
        {
            "id": "g1",
            "logic": "OR",
            "negated": true,
            "conditions": [
                {"id": "c1", "column": "Age", "operator": "between", "value": 10, "value2": "20"}
            ],
            "referenceConditions": [
                {"id": "r1", "type": "not_match", "column": "Drug",
                 "referenceTableId": "drugs", "referenceColumn": "Name"}
            ],
            "groupConditions": [
                {"id": "gc1", "groupByColumn": "PatientId", "targetColumn": "Code",
                 "aggregation": "distinct_count", "operator": "greater_equal", "threshold": 2,
                 "action": "exclude_matching_groups"}
            ],
            "groups": []
        }
        "#;

        let group: RuleGroup = serde_json::from_str(json).unwrap();
        assert_eq!(group.logic, LogicalOperator::Or);
        assert!(group.negated);
        assert_eq!(group.conditions[0].value, "10");
        assert_eq!(group.conditions[0].value2.as_deref(), Some("20"));
        assert_eq!(group.reference_conditions[0].match_type, ReferenceMatchType::NotMatch);
        assert_eq!(group.group_conditions[0].action, GroupAction::ExcludeMatchingGroups);
        assert_eq!(group.predicate_count(), 3);
    }

    #[test]
    fn test_update_group_shares_untouched_subtrees() {
        let tree = sample_tree();
        let updated = tree
            .with_condition("right", RuleCondition::new("Zip", Operator::StartsWith, "9"))
            .unwrap();

        // 原树不变
        assert!(tree.find_group("right").unwrap().is_empty());
        assert_eq!(updated.find_group("right").unwrap().conditions.len(), 1);
        // 未改动的兄弟子树共享同一个 Arc
        assert!(Arc::ptr_eq(&tree.groups[0], &updated.groups[0]));
        assert!(!Arc::ptr_eq(&tree.groups[1], &updated.groups[1]));
    }

    #[test]
    fn test_update_missing_group() {
        let tree = sample_tree();
        assert!(tree.toggle_negation("missing").is_none());
    }

    #[test]
    fn test_without_condition_nested() {
        let tree = sample_tree();
        let updated = tree.without_condition("c2").unwrap();
        assert!(updated.find_group("left").unwrap().conditions.is_empty());
        assert_eq!(updated.conditions.len(), 1);
        assert!(tree.without_condition("nope").is_none());
    }

    #[test]
    fn test_percentage_rounding() {
        assert_eq!(percentage(2, 3), 66.67);
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(5, 5), 100.0);
    }

    #[test]
    fn test_evaluation_result_invariants() {
        let rows: Vec<Row> = vec![[("a", "1")].into_iter().collect()];
        let result = EvaluationResult::new(rows, 4);
        assert_eq!(result.matched_count, result.matched_rows.len());
        assert_eq!(result.percentage, 25.0);
    }
}
