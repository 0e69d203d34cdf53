//! 类型化值比较器
//!
//! 每次比较时推断两侧值的类型：两侧都是日期按日期比较，两侧都是数值按数值比较，
//! 否则回退到大小写不敏感的字符串比较。

use crate::operators::Operator;
use crate::value::{CellValue, is_blank};
use std::cmp::Ordering;

/// 类型化值比较器
pub struct ValueComparator;

impl ValueComparator {
    /// 比较列值与条件值
    ///
    /// # Arguments
    /// * `column_value` - 行中的原始单元格值，列缺失时为 None
    /// * `operator` - 操作符
    /// * `value` - 条件值
    /// * `value2` - between / not_between 的第二个边界
    pub fn compare(
        column_value: Option<&str>,
        operator: Operator,
        value: &str,
        value2: Option<&str>,
    ) -> bool {
        // 空值检查与类型无关，立即返回
        let empty = is_blank(column_value);
        match operator {
            Operator::IsEmpty => return empty,
            Operator::IsNotEmpty => return !empty,
            _ => {}
        }

        // 列值为空时其余操作符一律不匹配
        let Some(raw) = column_value.filter(|_| !empty) else {
            return false;
        };

        match operator {
            Operator::Contains | Operator::NotContains | Operator::StartsWith | Operator::EndsWith => {
                Self::compare_text(raw, operator, value)
            }
            Operator::Between | Operator::NotBetween => Self::compare_range(raw, operator, value, value2),
            _ => Self::compare_scalar(raw, operator, value),
        }
    }

    /// 单值比较：equals / not_equals / 有序比较
    fn compare_scalar(raw: &str, operator: Operator, value: &str) -> bool {
        let left = CellValue::classify(Some(raw));
        let right = CellValue::classify(Some(value));

        match (&left, &right) {
            (CellValue::Date(a), CellValue::Date(b)) => Self::apply_ordering(a.cmp(b), operator),
            (CellValue::Number(a), CellValue::Number(b)) => match a.partial_cmp(b) {
                Some(ord) => Self::apply_ordering(ord, operator),
                None => operator == Operator::NotEquals,
            },
            _ => Self::compare_text(raw, operator, value),
        }
    }

    /// 范围比较，边界视为无序对
    fn compare_range(raw: &str, operator: Operator, value: &str, value2: Option<&str>) -> bool {
        let negate = operator == Operator::NotBetween;

        let Some(value2) = value2.filter(|v| !v.trim().is_empty()) else {
            // 缺少第二个边界时按不支持处理
            return negate;
        };

        let target = CellValue::classify(Some(raw));
        let low = CellValue::classify(Some(value));
        let high = CellValue::classify(Some(value2));

        let inside = match (&target, &low, &high) {
            (CellValue::Date(t), CellValue::Date(a), CellValue::Date(b)) => {
                let (min, max) = if a <= b { (a, b) } else { (b, a) };
                t >= min && t <= max
            }
            (CellValue::Number(t), CellValue::Number(a), CellValue::Number(b)) => {
                let (min, max) = (a.min(*b), a.max(*b));
                *t >= min && *t <= max
            }
            // 字符串不支持范围比较
            _ => return negate,
        };

        inside != negate
    }

    /// 大小写不敏感的字符串比较
    fn compare_text(raw: &str, operator: Operator, value: &str) -> bool {
        let left = raw.trim().to_lowercase();
        let right = value.trim().to_lowercase();

        match operator {
            Operator::Equals => left == right,
            Operator::NotEquals => left != right,
            Operator::GreaterThan => left > right,
            Operator::LessThan => left < right,
            Operator::GreaterEqual => left >= right,
            Operator::LessEqual => left <= right,
            Operator::Contains => left.contains(&right),
            Operator::NotContains => !left.contains(&right),
            Operator::StartsWith => left.starts_with(&right),
            Operator::EndsWith => left.ends_with(&right),
            Operator::Between => false,
            Operator::NotBetween => true,
            // compare() 已提前处理空值操作符
            Operator::IsEmpty | Operator::IsNotEmpty => false,
        }
    }

    fn apply_ordering(ord: Ordering, operator: Operator) -> bool {
        match operator {
            Operator::Equals => ord == Ordering::Equal,
            Operator::NotEquals => ord != Ordering::Equal,
            Operator::GreaterThan => ord == Ordering::Greater,
            Operator::LessThan => ord == Ordering::Less,
            Operator::GreaterEqual => ord != Ordering::Less,
            Operator::LessEqual => ord != Ordering::Greater,
            _ => false,
        }
    }
}
