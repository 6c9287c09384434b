//! 查找操作符
//!
//! 每个操作符携带自身的取值个数与类型约束，校验时一次分派，
//! 之后编译器和执行器只看到统一的 `(path, lookup, values)` 叶子。

use crate::error::{Error, Result};
use crate::types::ValueDataType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 操作符（线上标识区分大小写）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lookup {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    IsNull,
    IsNotNull,
}

/// 取值个数约束
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// 不接受取值
    Nullary,
    /// 恰好一个
    Single,
    /// 至少一个
    OneOrMore,
}

impl Arity {
    fn describe(&self) -> &'static str {
        match self {
            Arity::Nullary => "0",
            Arity::Single => "1",
            Arity::OneOrMore => ">=1",
        }
    }

    fn accepts(&self, n: usize) -> bool {
        match self {
            Arity::Nullary => n == 0,
            Arity::Single => n == 1,
            Arity::OneOrMore => n >= 1,
        }
    }
}

impl Lookup {
    pub const ALL: [Lookup; 14] = [
        Lookup::Eq,
        Lookup::Ne,
        Lookup::Gt,
        Lookup::Gte,
        Lookup::Lt,
        Lookup::Lte,
        Lookup::In,
        Lookup::NotIn,
        Lookup::Contains,
        Lookup::NotContains,
        Lookup::StartsWith,
        Lookup::EndsWith,
        Lookup::IsNull,
        Lookup::IsNotNull,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Lookup::Eq => "eq",
            Lookup::Ne => "ne",
            Lookup::Gt => "gt",
            Lookup::Gte => "gte",
            Lookup::Lt => "lt",
            Lookup::Lte => "lte",
            Lookup::In => "in",
            Lookup::NotIn => "not_in",
            Lookup::Contains => "contains",
            Lookup::NotContains => "not_contains",
            Lookup::StartsWith => "starts_with",
            Lookup::EndsWith => "ends_with",
            Lookup::IsNull => "is_null",
            Lookup::IsNotNull => "is_not_null",
        }
    }

    pub fn arity(&self) -> Arity {
        match self {
            Lookup::IsNull | Lookup::IsNotNull => Arity::Nullary,
            Lookup::Gt | Lookup::Gte | Lookup::Lt | Lookup::Lte => Arity::Single,
            _ => Arity::OneOrMore,
        }
    }

    /// `in` / `not_in` 把整个取值列表作为一个操作数
    pub fn takes_list(&self) -> bool {
        matches!(self, Lookup::In | Lookup::NotIn)
    }

    pub fn is_relational(&self) -> bool {
        matches!(self, Lookup::Gt | Lookup::Gte | Lookup::Lt | Lookup::Lte)
    }

    pub fn is_pattern(&self) -> bool {
        matches!(
            self,
            Lookup::Contains | Lookup::NotContains | Lookup::StartsWith | Lookup::EndsWith
        )
    }

    /// 取值为否定语义（没有任何取值满足对应的肯定操作符）
    pub fn is_negative(&self) -> bool {
        matches!(self, Lookup::Ne | Lookup::NotIn | Lookup::NotContains)
    }

    /// 校验取值个数以及与路径数据类型的兼容性
    pub fn check(&self, value_count: usize, data_type: ValueDataType) -> Result<()> {
        let arity = self.arity();
        if !arity.accepts(value_count) {
            return Err(Error::InvalidOperatorArity {
                lookup: self.as_str().to_string(),
                expected: arity.describe(),
                actual: value_count,
            });
        }
        if self.is_pattern() && !data_type.is_textual() {
            return Err(Error::TypeMismatch(format!(
                "操作符 {} 只能用于 string/enum 路径, 实际类型 {}",
                self, data_type
            )));
        }
        if self.is_relational() && data_type == ValueDataType::Boolean {
            return Err(Error::TypeMismatch(format!(
                "操作符 {} 不能用于 boolean 路径",
                self
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Lookup {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Lookup::ALL
            .iter()
            .copied()
            .find(|l| l.as_str() == s)
            .ok_or_else(|| Error::InvalidToken(format!("lookup: {}", s)))
    }
}
