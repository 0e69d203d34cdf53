//! 条件评估器
//!
//! 对单行评估叶子条件：取出列值后交给类型化比较器。列缺失视为空值。

use crate::comparator::ValueComparator;
use crate::models::{Row, RuleCondition};

/// 条件评估器
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// 评估条件
    pub fn evaluate(row: &Row, condition: &RuleCondition) -> bool {
        ValueComparator::compare(
            row.get(&condition.column),
            condition.operator,
            &condition.value,
            condition.value2.as_deref(),
        )
    }
}
