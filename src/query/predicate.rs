//! 值谓词：查询树的叶子过滤条件

use super::lookup::Lookup;
use crate::catalog::QueryPath;
use crate::error::{Error, Result};
use crate::types::{MatchMode, PathId, Polarity, PropertyValue};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// 谓词取值列表，绝大多数谓词只有一两个取值
pub type ValueList = SmallVec<[PropertyValue; 2]>;

/// 单个值谓词
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValuePredicate {
    pub path_id: PathId,
    pub lookup: Lookup,
    #[serde(default)]
    pub values: ValueList,
    /// 多个取值之间的组合方式
    #[serde(default, rename = "match")]
    pub match_mode: MatchMode,
    #[serde(default)]
    pub include: Polarity,
}

impl ValuePredicate {
    pub fn new<I, V>(path_id: PathId, lookup: Lookup, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<PropertyValue>,
    {
        Self {
            path_id,
            lookup,
            values: values.into_iter().map(Into::into).collect(),
            match_mode: MatchMode::And,
            include: Polarity::Include,
        }
    }

    /// 一元操作符（is_null / is_not_null）
    pub fn unary(path_id: PathId, lookup: Lookup) -> Self {
        Self::new(path_id, lookup, Vec::<PropertyValue>::new())
    }

    pub fn with_match(mut self, mode: MatchMode) -> Self {
        self.match_mode = mode;
        self
    }

    pub fn with_include(mut self, include: Polarity) -> Self {
        self.include = include;
        self
    }

    pub fn exclude(self) -> Self {
        self.with_include(Polarity::Exclude)
    }

    /// 针对路径校验，并返回取值已按路径类型规范化的副本
    ///
    /// `meta_type` 是所属查询过滤的实体类型，路径必须从该类型出发。
    pub fn validate(&self, path: &QueryPath, meta_type: &str) -> Result<ValuePredicate> {
        if path.id != self.path_id {
            return Err(Error::UnknownPath(self.path_id));
        }
        if path.source_type != meta_type {
            return Err(Error::TypeMismatch(format!(
                "路径 {} 从 {} 出发, 无法用于过滤 {}",
                path.name, path.source_type, meta_type
            )));
        }
        self.lookup.check(self.values.len(), path.value_data_type)?;

        let values = self
            .values
            .iter()
            .map(|v| v.coerce(path.value_data_type, &path.choices))
            .collect::<Result<ValueList>>()?;

        Ok(ValuePredicate {
            values,
            ..self.clone()
        })
    }
}
