//! 查询定义存储
//!
//! 保存路径与查询定义，写入时校验，读取时提供一致的快照

mod definitions;
mod registry;

pub use definitions::Definitions;
pub use registry::DefinitionStore;

use crate::catalog::QueryPath;
use crate::error::Result;
use crate::query::QueryNode;
use crate::types::{MetaType, PathId, QueryId};
use std::sync::Arc;

/// 解析器：按 ID 取路径与查询节点，缺失时返回 `NotFound`
pub trait QueryResolver {
    fn get_path(&self, id: PathId) -> Result<Arc<QueryPath>>;
    fn get_node(&self, id: QueryId) -> Result<Arc<QueryNode>>;
}

/// 失效通知，供外部结果缓存使用
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
    PathChanged(PathId),
    /// `affected` 包含变更的查询本身以及所有传递引用它的查询
    QueryChanged { id: QueryId, affected: Vec<QueryId> },
    EntitiesChanged { meta_type: MetaType },
}

/// 失效监听器
pub type InvalidationListener = Arc<dyn Fn(&Invalidation) + Send + Sync>;

/// 跳过校验直接写入快照，用于构造非法状态的测试
#[cfg(test)]
pub(crate) fn insert_unchecked(defs: &mut Definitions, node: QueryNode) {
    defs.query_names.insert(node.name.clone(), node.id);
    defs.queries.insert(node.id, Arc::new(node));
}
