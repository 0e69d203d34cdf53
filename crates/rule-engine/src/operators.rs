//! 规则操作符定义

use serde::{Deserialize, Serialize};
use std::fmt;

/// 条件操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    // 通用比较
    Equals,
    NotEquals,

    // 有序比较（数值、日期、字符串字典序）
    GreaterThan,
    LessThan,
    GreaterEqual,
    LessEqual,
    Between,
    NotBetween,

    // 字符串操作
    Contains,
    NotContains,
    StartsWith,
    EndsWith,

    // 空值检查
    IsEmpty,
    IsNotEmpty,
}

impl Operator {
    /// 需要第二个比较值（value2）的操作符
    pub fn needs_second_value(&self) -> bool {
        matches!(self, Self::Between | Self::NotBetween)
    }

    /// 不需要比较值的操作符
    pub fn is_unary(&self) -> bool {
        matches!(self, Self::IsEmpty | Self::IsNotEmpty)
    }

    /// 分组聚合阈值可用的数值比较子集
    pub fn is_numeric_comparison(&self) -> bool {
        matches!(
            self,
            Self::Equals
                | Self::NotEquals
                | Self::GreaterThan
                | Self::LessThan
                | Self::GreaterEqual
                | Self::LessEqual
        )
    }

    /// 对两个浮点数应用数值比较子集，其余操作符返回 false
    pub fn compare_f64(&self, left: f64, right: f64) -> bool {
        match self {
            Self::Equals => left == right,
            Self::NotEquals => left != right,
            Self::GreaterThan => left > right,
            Self::LessThan => left < right,
            Self::GreaterEqual => left >= right,
            Self::LessEqual => left <= right,
            _ => false,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::GreaterThan => "greater_than",
            Self::LessThan => "less_than",
            Self::GreaterEqual => "greater_equal",
            Self::LessEqual => "less_equal",
            Self::Between => "between",
            Self::NotBetween => "not_between",
            Self::Contains => "contains",
            Self::NotContains => "not_contains",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
            Self::IsEmpty => "is_empty",
            Self::IsNotEmpty => "is_not_empty",
        };
        write!(f, "{}", s)
    }
}

/// 逻辑操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOperator {
    #[default]
    And,
    Or,
}

impl LogicalOperator {
    /// 合并一组布尔结果；空列表视为 true（空真）
    pub fn combine(&self, results: &[bool]) -> bool {
        if results.is_empty() {
            return true;
        }
        match self {
            Self::And => results.iter().all(|r| *r),
            Self::Or => results.iter().any(|r| *r),
        }
    }
}

impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And => write!(f, "AND"),
            Self::Or => write!(f, "OR"),
        }
    }
}

/// 引用条件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceMatchType {
    Match,
    NotMatch,
}

impl fmt::Display for ReferenceMatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Match => write!(f, "match"),
            Self::NotMatch => write!(f, "not_match"),
        }
    }
}

/// 分组聚合函数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    DistinctCount,
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DistinctCount => "distinct_count",
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Min => "min",
            Self::Max => "max",
        };
        write!(f, "{}", s)
    }
}

/// 分组条件命中后的动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupAction {
    #[default]
    KeepMatchingGroups,
    ExcludeMatchingGroups,
}

impl GroupAction {
    /// 根据分组是否命中决定行是否通过
    pub fn apply(&self, group_matched: bool) -> bool {
        match self {
            Self::KeepMatchingGroups => group_matched,
            Self::ExcludeMatchingGroups => !group_matched,
        }
    }
}
