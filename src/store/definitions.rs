//! 定义快照
//!
//! 某一版本下全部路径与查询的不可变视图；写入方克隆后整体替换。

use super::QueryResolver;
use crate::catalog::{PathCatalog, QueryPath};
use crate::error::{Error, Result};
use crate::query::QueryNode;
use crate::types::{PathId, QueryId};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct Definitions {
    pub(super) paths: PathCatalog,
    pub(super) queries: IndexMap<QueryId, Arc<QueryNode>>,
    pub(super) query_names: HashMap<String, QueryId>,
    pub(super) version: u64,
}

impl Definitions {
    /// 快照版本，每次成功写入递增
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn paths(&self) -> &PathCatalog {
        &self.paths
    }

    pub fn queries(&self) -> impl Iterator<Item = &Arc<QueryNode>> {
        self.queries.values()
    }

    pub fn query(&self, id: QueryId) -> Option<&Arc<QueryNode>> {
        self.queries.get(&id)
    }

    pub fn query_by_name(&self, name: &str) -> Option<&Arc<QueryNode>> {
        self.query_names.get(name).and_then(|id| self.queries.get(id))
    }

    /// 引用了该路径的查询
    pub fn path_users(&self, path_id: PathId) -> Vec<QueryId> {
        self.queries
            .values()
            .filter(|q| q.query_values.iter().any(|p| p.path_id == path_id))
            .map(|q| q.id)
            .collect()
    }

    /// 直接把 `id` 列为子查询的查询
    pub fn parents_of(&self, id: QueryId) -> Vec<QueryId> {
        self.queries
            .values()
            .filter(|q| q.id != id && q.references(id))
            .map(|q| q.id)
            .collect()
    }

    /// `id` 本身以及所有传递引用它的查询
    pub fn dependents(&self, id: QueryId) -> Vec<QueryId> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::from([id]);
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current) {
                continue;
            }
            order.push(current);
            queue.extend(self.parents_of(current));
        }
        order
    }
}

impl QueryResolver for Definitions {
    fn get_path(&self, id: PathId) -> Result<Arc<QueryPath>> {
        self.paths.resolve(id)
    }

    fn get_node(&self, id: QueryId) -> Result<Arc<QueryNode>> {
        self.queries
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("查询 {}", id)))
    }
}
