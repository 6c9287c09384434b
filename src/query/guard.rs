//! 子查询环检测
//!
//! 沿 `sub_query_ids` 深度优先展开，维护当前活动路径上的祖先集合。
//! 同一节点从不同分支到达不算环（共享子查询是合法的 DAG）。

use super::node::QueryNode;
use crate::catalog::QueryPath;
use crate::error::{Error, Result};
use crate::store::QueryResolver;
use crate::types::{PathId, QueryId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// 环与深度检查器
#[derive(Debug, Clone, Copy)]
pub struct CycleGuard {
    max_depth: usize,
}

impl CycleGuard {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// 检查以 `root` 为根的展开是否无环且深度不超过上限
    pub fn check<R: QueryResolver + ?Sized>(&self, root: QueryId, resolver: &R) -> Result<()> {
        let mut walk = Walk {
            resolver,
            stack: Vec::new(),
            on_stack: HashSet::new(),
            heights: HashMap::new(),
        };
        // 先完整展开找环，深度只在无环时才判断
        let height = walk.visit(root)?;
        if height > self.max_depth {
            return Err(Error::DepthExceeded {
                limit: self.max_depth,
            });
        }
        Ok(())
    }

    /// 检查尚未写入的节点：用候选节点覆盖解析器中的同 ID 节点
    pub fn check_proposed<R: QueryResolver + ?Sized>(
        &self,
        node: &Arc<QueryNode>,
        resolver: &R,
    ) -> Result<()> {
        let overlay = Overlay {
            base: resolver,
            node,
        };
        self.check(node.id, &overlay)
    }
}

struct Walk<'a, R: ?Sized> {
    resolver: &'a R,
    stack: Vec<QueryId>,
    on_stack: HashSet<QueryId>,
    /// 已完整展开且无环的子树高度（边数）
    heights: HashMap<QueryId, usize>,
}

impl<R: QueryResolver + ?Sized> Walk<'_, R> {
    fn visit(&mut self, id: QueryId) -> Result<usize> {
        if self.on_stack.contains(&id) {
            let mut path = self.stack.clone();
            path.push(id);
            return Err(Error::CycleDetected { path });
        }
        if let Some(&height) = self.heights.get(&id) {
            return Ok(height);
        }

        let node = self.resolver.get_node(id)?;
        self.stack.push(id);
        self.on_stack.insert(id);

        let mut height = 0;
        for &child in &node.sub_query_ids {
            height = height.max(self.visit(child)? + 1);
        }

        self.stack.pop();
        self.on_stack.remove(&id);
        self.heights.insert(id, height);
        Ok(height)
    }
}

struct Overlay<'a, R: ?Sized> {
    base: &'a R,
    node: &'a Arc<QueryNode>,
}

impl<R: QueryResolver + ?Sized> QueryResolver for Overlay<'_, R> {
    fn get_path(&self, id: PathId) -> Result<Arc<QueryPath>> {
        self.base.get_path(id)
    }

    fn get_node(&self, id: QueryId) -> Result<Arc<QueryNode>> {
        if id == self.node.id {
            Ok(Arc::clone(self.node))
        } else {
            self.base.get_node(id)
        }
    }
}
