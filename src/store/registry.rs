//! 定义存储
//!
//! 写入方串行执行：克隆当前快照、校验、整体替换；读取方只克隆一个 `Arc`。

use super::definitions::Definitions;
use super::{Invalidation, InvalidationListener, QueryResolver};
use crate::catalog::{PathDefinition, QueryPath};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::query::{CycleGuard, QueryDefinition, QueryNode};
use crate::types::{PathId, QueryId};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct DefinitionStore {
    current: RwLock<Arc<Definitions>>,
    /// 串行化写入
    write_lock: Mutex<()>,
    next_path_id: AtomicU64,
    next_query_id: AtomicU64,
    guard: CycleGuard,
    listeners: RwLock<Vec<InvalidationListener>>,
}

impl DefinitionStore {
    pub fn new(max_depth: usize) -> Self {
        Self {
            current: RwLock::new(Arc::new(Definitions::default())),
            write_lock: Mutex::new(()),
            next_path_id: AtomicU64::new(1),
            next_query_id: AtomicU64::new(1),
            guard: CycleGuard::new(max_depth),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn with_config(config: &EngineConfig) -> Self {
        Self::new(config.max_depth)
    }

    /// 当前版本的一致快照
    pub fn snapshot(&self) -> Arc<Definitions> {
        Arc::clone(&self.current.read())
    }

    pub fn version(&self) -> u64 {
        self.current.read().version()
    }

    /// 注册失效监听器
    pub fn subscribe(&self, listener: InvalidationListener) {
        self.listeners.write().push(listener);
    }

    /// 向所有监听器广播
    pub fn notify(&self, event: &Invalidation) {
        let listeners = self.listeners.read().clone();
        for listener in listeners {
            listener(event);
        }
    }

    // ==================== 路径 ====================

    pub fn create_path(&self, def: PathDefinition) -> Result<Arc<QueryPath>> {
        def.validate()?;
        let id = PathId::new(self.next_path_id.fetch_add(1, Ordering::SeqCst));
        let path = self.write(|defs| {
            let path = QueryPath::from_definition(id, def, 1);
            defs.paths.insert(path)?;
            let stored = defs.paths.resolve(id)?;
            Ok((stored, Vec::new()))
        })?;
        info!(path = %path.id, name = %path.name, "path created");
        Ok(path)
    }

    /// 被引用的路径不可修改
    pub fn update_path(&self, id: PathId, def: PathDefinition) -> Result<Arc<QueryPath>> {
        def.validate()?;
        let path = self.write(|defs| {
            let old = defs.paths.resolve(id)?;
            Self::ensure_path_unused(defs, id)?;
            defs.paths
                .replace(QueryPath::from_definition(id, def, old.version + 1))?;
            let stored = defs.paths.resolve(id)?;
            Ok((stored, vec![Invalidation::PathChanged(id)]))
        })?;
        info!(path = %id, version = path.version, "path updated");
        Ok(path)
    }

    pub fn delete_path(&self, id: PathId) -> Result<()> {
        self.write(|defs| {
            defs.paths.resolve(id)?;
            Self::ensure_path_unused(defs, id)?;
            defs.paths.remove(id);
            Ok(((), vec![Invalidation::PathChanged(id)]))
        })?;
        info!(path = %id, "path deleted");
        Ok(())
    }

    fn ensure_path_unused(defs: &Definitions, id: PathId) -> Result<()> {
        let users = defs.path_users(id);
        if users.is_empty() {
            return Ok(());
        }
        warn!(path = %id, ?users, "path still referenced");
        Err(Error::PathInUse {
            id,
            referenced_by: users,
        })
    }

    // ==================== 查询 ====================

    pub fn create_query(&self, def: QueryDefinition) -> Result<Arc<QueryNode>> {
        let id = QueryId::new(self.next_query_id.fetch_add(1, Ordering::SeqCst));
        let node = self.write(|defs| {
            if defs.query_names.contains_key(&def.name) {
                return Err(Error::DuplicateName(def.name));
            }
            let node = self.validate_node(defs, QueryNode::from_definition(id, def, 1))?;
            defs.query_names.insert(node.name.clone(), id);
            defs.queries.insert(id, Arc::clone(&node));
            Ok((node, Vec::new()))
        })?;
        info!(query = %node.id, name = %node.name, "query created");
        Ok(node)
    }

    pub fn update_query(&self, id: QueryId, def: QueryDefinition) -> Result<Arc<QueryNode>> {
        let node = self.write(|defs| {
            let old = defs.get_node(id)?;
            if old.name != def.name && defs.query_names.contains_key(&def.name) {
                return Err(Error::DuplicateName(def.name));
            }
            let node =
                self.validate_node(defs, QueryNode::from_definition(id, def, old.version + 1))?;
            for parent_id in defs.parents_of(id) {
                let parent = defs.get_node(parent_id)?;
                if parent.meta_type_id != node.meta_type_id {
                    return Err(Error::TypeMismatch(format!(
                        "父查询 {} 过滤 {}, 与 {} 不一致",
                        parent_id, parent.meta_type_id, node.meta_type_id
                    )));
                }
            }
            defs.query_names.remove(&old.name);
            defs.query_names.insert(node.name.clone(), id);
            defs.queries.insert(id, Arc::clone(&node));
            let affected = defs.dependents(id);
            // 子树变高后，引用它的祖先也可能超过深度上限
            for &ancestor in affected.iter().filter(|a| **a != id) {
                self.guard.check(ancestor, &*defs)?;
            }
            Ok((node, vec![Invalidation::QueryChanged { id, affected }]))
        })?;
        info!(query = %id, version = node.version, "query updated");
        Ok(node)
    }

    /// 删除查询；被引用时除非 `cascade` 否则拒绝，级联时从所有父查询中摘除
    pub fn delete_query(&self, id: QueryId, cascade: bool) -> Result<Vec<QueryId>> {
        let detached = self.write(|defs| {
            let node = defs.get_node(id)?;
            let parents = defs.parents_of(id);
            if !parents.is_empty() && !cascade {
                return Err(Error::ReferencedByOthers {
                    id,
                    referenced_by: parents,
                });
            }
            let affected = defs.dependents(id);

            for parent_id in &parents {
                let parent = defs.get_node(*parent_id)?;
                let mut updated = (*parent).clone();
                updated.sub_query_ids.retain(|sub| *sub != id);
                updated.version += 1;
                defs.queries.insert(*parent_id, Arc::new(updated));
            }
            defs.queries.shift_remove(&id);
            defs.query_names.remove(&node.name);
            Ok((parents, vec![Invalidation::QueryChanged { id, affected }]))
        })?;
        info!(query = %id, detached = detached.len(), "query deleted");
        Ok(detached)
    }

    /// 定义期校验：谓词、子查询引用、实体类型一致性，以及环与深度
    fn validate_node(&self, defs: &Definitions, mut node: QueryNode) -> Result<Arc<QueryNode>> {
        if node.name.trim().is_empty() {
            return Err(Error::TypeMismatch("查询名称不能为空".to_string()));
        }
        if node.meta_type_id.trim().is_empty() {
            return Err(Error::TypeMismatch("meta_type_id 不能为空".to_string()));
        }

        node.query_values = node
            .query_values
            .iter()
            .map(|pred| {
                let path = defs
                    .paths
                    .get(pred.path_id)
                    .ok_or(Error::UnknownPath(pred.path_id))?;
                pred.validate(path, &node.meta_type_id)
            })
            .collect::<Result<Vec<_>>>()?;

        for &sub_id in &node.sub_query_ids {
            if sub_id == node.id {
                continue;
            }
            let sub = defs.get_node(sub_id)?;
            if sub.meta_type_id != node.meta_type_id {
                return Err(Error::TypeMismatch(format!(
                    "子查询 {} 过滤 {}, 与 {} 不一致",
                    sub_id, sub.meta_type_id, node.meta_type_id
                )));
            }
        }

        let node = Arc::new(node);
        self.guard.check_proposed(&node, defs)?;
        Ok(node)
    }

    fn write<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Definitions) -> Result<(T, Vec<Invalidation>)>,
    {
        let (value, events) = {
            let _writer = self.write_lock.lock();
            let mut next = (**self.current.read()).clone();
            let (value, events) = f(&mut next)?;
            next.version += 1;
            debug!(version = next.version, "definitions swapped");
            *self.current.write() = Arc::new(next);
            (value, events)
        };
        for event in &events {
            self.notify(event);
        }
        Ok(value)
    }
}

impl Default for DefinitionStore {
    fn default() -> Self {
        Self::with_config(&EngineConfig::default())
    }
}

impl QueryResolver for DefinitionStore {
    fn get_path(&self, id: PathId) -> Result<Arc<QueryPath>> {
        self.snapshot().get_path(id)
    }

    fn get_node(&self, id: QueryId) -> Result<Arc<QueryNode>> {
        self.snapshot().get_node(id)
    }
}
