//! 通用类型定义：标识符、组合器枚举和属性值

use crate::error::{Error, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// 实体 ID（由存储层分配）
pub type EntityId = u64;

/// 实体类型标识，例如 `product`
pub type MetaType = String;

/// 路径 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathId(pub u64);

impl PathId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// 查询 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryId(pub u64);

impl QueryId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q{}", self.0)
    }
}

/// 多个条件之间的组合方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MatchMode {
    #[default]
    #[serde(rename = "AND")]
    And,
    #[serde(rename = "OR")]
    Or,
}

impl MatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMode::And => "AND",
            MatchMode::Or => "OR",
        }
    }
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "AND" => Ok(MatchMode::And),
            "OR" => Ok(MatchMode::Or),
            other => Err(Error::InvalidToken(format!("match: {}", other))),
        }
    }
}

/// 包含 / 排除
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Polarity {
    #[default]
    #[serde(rename = "INCLUDE")]
    Include,
    #[serde(rename = "EXCLUDE")]
    Exclude,
}

impl Polarity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Polarity::Include => "INCLUDE",
            Polarity::Exclude => "EXCLUDE",
        }
    }

    pub fn is_exclude(&self) -> bool {
        matches!(self, Polarity::Exclude)
    }
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Polarity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "INCLUDE" => Ok(Polarity::Include),
            "EXCLUDE" => Ok(Polarity::Exclude),
            other => Err(Error::InvalidToken(format!("include: {}", other))),
        }
    }
}

/// 路径末端值的数据类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueDataType {
    String,
    Number,
    Boolean,
    Date,
    Enum,
}

impl ValueDataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueDataType::String => "string",
            ValueDataType::Number => "number",
            ValueDataType::Boolean => "boolean",
            ValueDataType::Date => "date",
            ValueDataType::Enum => "enum",
        }
    }

    /// 是否支持字符串模式匹配（contains / starts_with ...）
    pub fn is_textual(&self) -> bool {
        matches!(self, ValueDataType::String | ValueDataType::Enum)
    }
}

impl fmt::Display for ValueDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 属性值
///
/// 线上格式为裸 JSON 标量；日期以 `YYYY-MM-DD` 字符串传输，
/// 校验时按路径声明的类型转换为 [`PropertyValue::Date`]。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Date(NaiveDate),
}

impl PropertyValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Null => "null",
            PropertyValue::Bool(_) => "bool",
            PropertyValue::Int(_) => "int",
            PropertyValue::Float(_) => "float",
            PropertyValue::String(_) => "string",
            PropertyValue::Date(_) => "date",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, PropertyValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Int(v) => Some(*v as f64),
            PropertyValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// 按路径声明的数据类型转换取值
    pub fn coerce(&self, data_type: ValueDataType, choices: &[String]) -> Result<PropertyValue> {
        let mismatch = || {
            Error::TypeMismatch(format!(
                "取值 {} ({}) 无法转换为 {}",
                self,
                self.type_name(),
                data_type
            ))
        };

        match data_type {
            ValueDataType::String => match self {
                PropertyValue::String(s) => Ok(PropertyValue::String(s.clone())),
                _ => Err(mismatch()),
            },
            ValueDataType::Enum => match self {
                PropertyValue::String(s) => {
                    if !choices.is_empty() && !choices.iter().any(|c| c == s) {
                        return Err(Error::TypeMismatch(format!(
                            "枚举值 {} 不在可选范围 {:?} 内",
                            s, choices
                        )));
                    }
                    Ok(PropertyValue::String(s.clone()))
                }
                _ => Err(mismatch()),
            },
            ValueDataType::Number => match self {
                PropertyValue::Int(v) => Ok(PropertyValue::Int(*v)),
                PropertyValue::Float(v) if v.is_finite() => Ok(PropertyValue::Float(*v)),
                PropertyValue::String(s) => {
                    if let Ok(v) = s.trim().parse::<i64>() {
                        Ok(PropertyValue::Int(v))
                    } else {
                        s.trim()
                            .parse::<f64>()
                            .ok()
                            .filter(|v| v.is_finite())
                            .map(PropertyValue::Float)
                            .ok_or_else(mismatch)
                    }
                }
                _ => Err(mismatch()),
            },
            ValueDataType::Boolean => match self {
                PropertyValue::Bool(v) => Ok(PropertyValue::Bool(*v)),
                PropertyValue::String(s) => match s.as_str() {
                    "true" => Ok(PropertyValue::Bool(true)),
                    "false" => Ok(PropertyValue::Bool(false)),
                    _ => Err(mismatch()),
                },
                _ => Err(mismatch()),
            },
            ValueDataType::Date => match self {
                PropertyValue::Date(d) => Ok(PropertyValue::Date(*d)),
                PropertyValue::String(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                    .map(PropertyValue::Date)
                    .map_err(|_| mismatch()),
                _ => Err(mismatch()),
            },
        }
    }

    /// 同类取值之间的比较；数字之间跨 Int/Float 比较，其余跨类返回 None
    pub fn compare(&self, other: &PropertyValue) -> Option<Ordering> {
        match (self, other) {
            (PropertyValue::Bool(a), PropertyValue::Bool(b)) => Some(a.cmp(b)),
            (PropertyValue::Int(a), PropertyValue::Int(b)) => Some(a.cmp(b)),
            (PropertyValue::String(a), PropertyValue::String(b)) => Some(a.cmp(b)),
            (PropertyValue::Date(a), PropertyValue::Date(b)) => Some(a.cmp(b)),
            (PropertyValue::Date(a), PropertyValue::String(b)) => NaiveDate::parse_from_str(b, "%Y-%m-%d")
                .ok()
                .map(|b| a.cmp(&b)),
            (PropertyValue::String(a), PropertyValue::Date(b)) => NaiveDate::parse_from_str(a, "%Y-%m-%d")
                .ok()
                .map(|a| a.cmp(b)),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        }
    }

    /// 语义相等（数字跨 Int/Float）
    pub fn matches(&self, other: &PropertyValue) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }

    /// 排序用的全序：先按类型分组，组内按取值比较
    ///
    /// 日期与字符串分属不同组，不做互相解析。
    pub fn total_cmp(&self, other: &PropertyValue) -> Ordering {
        self.rank().cmp(&other.rank()).then_with(|| match (self, other) {
            (PropertyValue::Int(a), PropertyValue::Int(b)) => a.cmp(b),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.total_cmp(&y),
                _ => a.compare(b).unwrap_or(Ordering::Equal),
            },
        })
    }

    fn rank(&self) -> u8 {
        match self {
            PropertyValue::Null => 0,
            PropertyValue::Bool(_) => 1,
            PropertyValue::Int(_) | PropertyValue::Float(_) => 2,
            PropertyValue::Date(_) => 3,
            PropertyValue::String(_) => 4,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Null => f.write_str("null"),
            PropertyValue::Bool(v) => write!(f, "{}", v),
            PropertyValue::Int(v) => write!(f, "{}", v),
            PropertyValue::Float(v) => write!(f, "{}", v),
            PropertyValue::String(v) => write!(f, "{:?}", v),
            PropertyValue::Date(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Int(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Float(v)
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::String(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::String(v.to_string())
    }
}

impl From<NaiveDate> for PropertyValue {
    fn from(v: NaiveDate) -> Self {
        PropertyValue::Date(v)
    }
}

/// 属性映射
pub type Properties = HashMap<String, PropertyValue>;
