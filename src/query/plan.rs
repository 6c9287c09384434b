//! 执行计划
//!
//! 编译产物：叶子为路径遍历操作、内部节点为 AND / OR / NOT 的布尔表达式树。
//! 计划不持有任何指向存储的引用，叶子携带所需路径信息的副本。

use super::lookup::Lookup;
use crate::catalog::QueryPath;
use crate::error::{Error, Result};
use crate::types::{MatchMode, MetaType, PathId, Polarity, PropertyValue, QueryId, ValueDataType};
use serde::{Deserialize, Serialize};
use std::fmt;
use xxhash_rust::xxh64::xxh64;

/// 叶子遍历操作
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeafOp {
    pub path_id: PathId,
    pub source_type: MetaType,
    pub traversal_template: String,
    pub data_type: ValueDataType,
    pub lookup: Lookup,
    pub values: Vec<PropertyValue>,
}

impl LeafOp {
    pub fn new(path: &QueryPath, lookup: Lookup, values: Vec<PropertyValue>) -> Self {
        Self {
            path_id: path.id,
            source_type: path.source_type.clone(),
            traversal_template: path.traversal_template.clone(),
            data_type: path.value_data_type,
            lookup,
            values,
        }
    }

    /// 单次执行内叶子缓存的键
    pub fn cache_key(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::SerializationError(e.to_string()))
    }
}

impl fmt::Display for LeafOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.path_id, self.lookup)?;
        if !self.values.is_empty() {
            let values: Vec<String> = self.values.iter().map(|v| v.to_string()).collect();
            write!(f, " [{}]", values.join(", "))?;
        }
        Ok(())
    }
}

/// 计划表达式
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlanExpr {
    /// 恒真：匹配目标类型的全部实体
    All,
    Leaf(LeafOp),
    Not(Box<PlanExpr>),
    And(Vec<PlanExpr>),
    Or(Vec<PlanExpr>),
}

impl PlanExpr {
    /// 按存储顺序组合子表达式；空列表返回 None，单个子表达式直接返回自身
    pub fn combine(mode: MatchMode, mut children: Vec<PlanExpr>) -> Option<PlanExpr> {
        match children.len() {
            0 => None,
            1 => children.pop(),
            _ => Some(match mode {
                MatchMode::And => PlanExpr::And(children),
                MatchMode::Or => PlanExpr::Or(children),
            }),
        }
    }

    pub fn negate(self) -> PlanExpr {
        PlanExpr::Not(Box::new(self))
    }

    /// EXCLUDE 时包一层 NOT
    pub fn apply_polarity(self, polarity: Polarity) -> PlanExpr {
        match polarity {
            Polarity::Include => self,
            Polarity::Exclude => self.negate(),
        }
    }

    /// 叶子数量（共享子树按出现次数计）
    pub fn leaf_count(&self) -> usize {
        match self {
            PlanExpr::All => 0,
            PlanExpr::Leaf(_) => 1,
            PlanExpr::Not(inner) => inner.leaf_count(),
            PlanExpr::And(children) | PlanExpr::Or(children) => {
                children.iter().map(PlanExpr::leaf_count).sum()
            }
        }
    }

    /// 是否需要目标类型的全集（NOT 与 All）
    pub fn needs_universe(&self) -> bool {
        match self {
            PlanExpr::All | PlanExpr::Not(_) => true,
            PlanExpr::Leaf(_) => false,
            PlanExpr::And(children) | PlanExpr::Or(children) => {
                children.iter().any(PlanExpr::needs_universe)
            }
        }
    }

    fn write_tree(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        let pad = "  ".repeat(indent);
        match self {
            PlanExpr::All => writeln!(f, "{}ALL", pad),
            PlanExpr::Leaf(leaf) => writeln!(f, "{}{}", pad, leaf),
            PlanExpr::Not(inner) => {
                writeln!(f, "{}NOT", pad)?;
                inner.write_tree(f, indent + 1)
            }
            PlanExpr::And(children) | PlanExpr::Or(children) => {
                let op = if matches!(self, PlanExpr::And(_)) { "AND" } else { "OR" };
                writeln!(f, "{}{}", pad, op)?;
                for child in children {
                    child.write_tree(f, indent + 1)?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for PlanExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_tree(f, 0)
    }
}

/// 编译后的执行计划
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// 计划来源的查询；纯临时过滤时为空
    pub root: Option<QueryId>,
    /// 目标实体类型，NOT 的全集取自该类型
    pub meta_type: MetaType,
    pub expr: PlanExpr,
}

impl ExecutionPlan {
    pub fn new(root: Option<QueryId>, meta_type: impl Into<String>, expr: PlanExpr) -> Self {
        Self {
            root,
            meta_type: meta_type.into(),
            expr,
        }
    }

    /// 与临时过滤条件做顶层 AND（过滤条件总是 INCLUDE）
    pub fn with_filters(mut self, filters: Vec<PlanExpr>) -> Self {
        if filters.is_empty() {
            return self;
        }
        let mut children = Vec::with_capacity(filters.len() + 1);
        children.push(self.expr);
        children.extend(filters);
        self.expr = PlanExpr::And(children);
        self
    }

    /// 由计划结构导出的稳定哈希，供外部结果缓存作键
    pub fn plan_hash(&self) -> Result<u64> {
        let bytes = bincode::serialize(&(&self.meta_type, &self.expr))
            .map_err(|e| Error::SerializationError(e.to_string()))?;
        Ok(xxh64(&bytes, 0))
    }
}

impl fmt::Display for ExecutionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.root {
            Some(root) => writeln!(f, "PLAN {} [{}]", root, self.meta_type)?,
            None => writeln!(f, "PLAN [{}]", self.meta_type)?,
        }
        self.expr.write_tree(f, 1)
    }
}
