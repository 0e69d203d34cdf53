//! 单元格值类型推断
//!
//! 源数据全部是文本，类型在每次比较时推断：空值、数值、日期或普通文本。

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use std::sync::LazyLock;

/// 日期形态及其可用的解析格式
///
/// 只有形似日期的文本才会尝试按日期解析，避免把普通数字误判为日期；
/// 每种形态只尝试与之匹配的格式，防止 `%Y` 把两位数年份当成公元 24 年。
struct DateShape {
    pattern: Regex,
    formats: &'static [&'static str],
}

static DATE_SHAPES: LazyLock<Vec<DateShape>> = LazyLock::new(|| {
    let shape = |pattern: &str, formats: &'static [&'static str]| DateShape {
        pattern: Regex::new(pattern).expect("date pattern is valid"),
        formats,
    };

    vec![
        // YYYY-MM-DDThh:mm[:ss[.fff]][zone]，带时区的先走 RFC 3339
        shape(
            r"^\d{4}-\d{1,2}-\d{1,2}T\d{1,2}:\d{2}(:\d{2}(\.\d+)?)?(Z|[+-]\d{2}:?\d{2})?$",
            &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"],
        ),
        // YYYY-MM-DD
        shape(r"^\d{4}-\d{1,2}-\d{1,2}$", &["%Y-%m-%d"]),
        // YYYY/MM/DD
        shape(r"^\d{4}/\d{1,2}/\d{1,2}$", &["%Y/%m/%d"]),
        // M/D/YYYY，月份越界时按 DD/MM/YYYY
        shape(r"^\d{1,2}/\d{1,2}/\d{4}$", &["%m/%d/%Y", "%d/%m/%Y"]),
        // M/D/YY
        shape(r"^\d{1,2}/\d{1,2}/\d{2}$", &["%m/%d/%y"]),
        // D-M-YYYY
        shape(r"^\d{1,2}-\d{1,2}-\d{4}$", &["%d-%m-%Y"]),
        // D.M.YYYY
        shape(r"^\d{1,2}\.\d{1,2}\.\d{4}$", &["%d.%m.%Y"]),
    ]
});

/// 推断后的单元格值
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Number(f64),
    /// 已归一化到零点的日期
    Date(NaiveDate),
    Text(String),
}

impl CellValue {
    /// 推断原始文本的类型
    ///
    /// 优先级：空值 → 日期 → 数值 → 文本。形似日期但无法解析的值按文本处理。
    pub fn classify(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return Self::Empty;
        };
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::Empty;
        }

        if is_date_like(trimmed) {
            return match parse_date(trimmed) {
                Some(date) => Self::Date(date),
                None => Self::Text(trimmed.to_string()),
            };
        }

        if let Some(n) = parse_number(trimmed) {
            return Self::Number(n);
        }

        Self::Text(trimmed.to_string())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }
}

/// 值是否为空（None 或仅包含空白）
pub fn is_blank(raw: Option<&str>) -> bool {
    raw.is_none_or(|s| s.trim().is_empty())
}

/// 文本是否形似日期
pub fn is_date_like(raw: &str) -> bool {
    let s = raw.trim();
    DATE_SHAPES.iter().any(|shape| shape.pattern.is_match(s))
}

/// 按形态对应的格式顺序解析日期，第一个成功的格式生效，结果去掉时分秒
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    let shape = DATE_SHAPES.iter().find(|shape| shape.pattern.is_match(s))?;

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }

    shape.formats.iter().find_map(|fmt| {
        if fmt.contains("%H") {
            NaiveDateTime::parse_from_str(s, fmt).ok().map(|dt| dt.date())
        } else {
            NaiveDate::parse_from_str(s, fmt).ok()
        }
    })
}

/// 解析为有限浮点数；NaN 与无穷大不视为数值
pub fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}
