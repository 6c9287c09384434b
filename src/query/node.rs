//! 查询节点
//!
//! 具名的可组合过滤定义，通过 ID 引用子查询而不是内嵌子树

use super::predicate::ValuePredicate;
use crate::types::{MatchMode, MetaType, Polarity, QueryId};
use serde::{Deserialize, Serialize};

/// 节点的四个组合器
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Combinators {
    #[serde(default)]
    pub match_values: MatchMode,
    #[serde(default)]
    pub include_values: Polarity,
    #[serde(default)]
    pub match_queries: MatchMode,
    #[serde(default)]
    pub include_queries: Polarity,
}

impl Combinators {
    pub fn values(mut self, mode: MatchMode, include: Polarity) -> Self {
        self.match_values = mode;
        self.include_values = include;
        self
    }

    pub fn queries(mut self, mode: MatchMode, include: Polarity) -> Self {
        self.match_queries = mode;
        self.include_queries = include;
        self
    }
}

/// 已存储的查询节点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryNode {
    pub id: QueryId,
    pub name: String,
    /// 被过滤的实体类型
    pub meta_type_id: MetaType,
    pub query_values: Vec<ValuePredicate>,
    pub sub_query_ids: Vec<QueryId>,
    #[serde(flatten)]
    pub combinators: Combinators,
    pub version: u64,
}

impl QueryNode {
    pub fn from_definition(id: QueryId, def: QueryDefinition, version: u64) -> Self {
        Self {
            id,
            name: def.name,
            meta_type_id: def.meta_type_id,
            query_values: def.query_values,
            sub_query_ids: def.sub_query_ids,
            combinators: def.combinators,
            version,
        }
    }

    pub fn references(&self, other: QueryId) -> bool {
        self.sub_query_ids.contains(&other)
    }
}

/// 创建 / 更新查询时提交的内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDefinition {
    pub name: String,
    pub meta_type_id: MetaType,
    #[serde(default)]
    pub query_values: Vec<ValuePredicate>,
    #[serde(default)]
    pub sub_query_ids: Vec<QueryId>,
    #[serde(flatten)]
    pub combinators: Combinators,
}

impl QueryDefinition {
    pub fn new(name: impl Into<String>, meta_type_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            meta_type_id: meta_type_id.into(),
            query_values: Vec::new(),
            sub_query_ids: Vec::new(),
            combinators: Combinators::default(),
        }
    }

    pub fn with_value(mut self, predicate: ValuePredicate) -> Self {
        self.query_values.push(predicate);
        self
    }

    pub fn with_sub_query(mut self, id: QueryId) -> Self {
        self.sub_query_ids.push(id);
        self
    }

    pub fn with_combinators(mut self, combinators: Combinators) -> Self {
        self.combinators = combinators;
        self
    }
}
