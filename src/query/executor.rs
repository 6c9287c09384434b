//! 计划执行器
//!
//! 自底向上对计划表达式求值：叶子交给遍历能力，AND 取交集，OR 取并集，
//! NOT 从目标类型全集中扣除。单次执行内相同叶子只遍历一次。

use super::plan::{ExecutionPlan, LeafOp, PlanExpr};
use super::request::{ExecuteOptions, ExecuteResponse, OrderBy};
use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::graph::TraversalCapability;
use crate::metrics;
use crate::types::{EntityId, PropertyValue};
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

type IdSet = HashSet<EntityId>;

/// 计划执行器
pub struct QueryExecutor<'a, T: TraversalCapability + ?Sized> {
    graph: &'a T,
    parallel: bool,
    leaf_cache: bool,
}

impl<'a, T: TraversalCapability + ?Sized> QueryExecutor<'a, T> {
    pub fn new(graph: &'a T, config: &EngineConfig) -> Self {
        Self {
            graph,
            parallel: config.parallel_execute,
            leaf_cache: config.leaf_cache,
        }
    }

    /// 执行计划；取消或超时直接失败，不返回部分结果
    pub fn execute(
        &self,
        plan: &ExecutionPlan,
        options: &ExecuteOptions,
        cancel: &CancelToken,
    ) -> Result<ExecuteResponse> {
        let start = Instant::now();
        cancel.check()?;

        let eval = Evaluation {
            graph: self.graph,
            meta_type: &plan.meta_type,
            parallel: self.parallel,
            use_cache: self.leaf_cache,
            cache: DashMap::new(),
            universe: OnceCell::new(),
            cancel,
            leaf_calls: AtomicUsize::new(0),
            cache_hits: AtomicUsize::new(0),
        };
        let matched = eval.expr(&plan.expr)?;

        let ordered = self.order(&matched, options.order_by.as_ref(), cancel)?;
        let count = ordered.len();
        let results: Vec<EntityId> = ordered
            .into_iter()
            .skip(options.offset)
            .take(options.limit.unwrap_or(usize::MAX))
            .collect();

        debug!(
            meta_type = %plan.meta_type,
            leaf_calls = eval.leaf_calls.load(AtomicOrdering::Relaxed),
            cache_hits = eval.cache_hits.load(AtomicOrdering::Relaxed),
            count,
            returned = results.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "plan executed"
        );
        Ok(ExecuteResponse { results, count })
    }

    /// 排序：默认按 ID 升序；其他字段缺值的实体排在最后，同值按 ID 升序
    fn order(
        &self,
        matched: &IdSet,
        order_by: Option<&OrderBy>,
        cancel: &CancelToken,
    ) -> Result<Vec<EntityId>> {
        let mut ids: Vec<EntityId> = matched.iter().copied().collect();
        ids.sort_unstable();

        let order_by = match order_by {
            None => return Ok(ids),
            Some(o) if o.is_id() => {
                if o.descending {
                    ids.reverse();
                }
                return Ok(ids);
            }
            Some(o) => o,
        };

        cancel.check()?;
        let mut keyed = ids
            .into_iter()
            .map(|id| Ok((self.graph.order_value(id, &order_by.field)?, id)))
            .collect::<Result<Vec<(Option<PropertyValue>, EntityId)>>>()?;

        keyed.sort_by(|(a, a_id), (b, b_id)| {
            let primary = match (a, b) {
                (Some(a), Some(b)) => {
                    let o = a.total_cmp(b);
                    if order_by.descending {
                        o.reverse()
                    } else {
                        o
                    }
                }
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            primary.then(a_id.cmp(b_id))
        });
        Ok(keyed.into_iter().map(|(_, id)| id).collect())
    }
}

/// 单次执行的求值状态
struct Evaluation<'a, T: TraversalCapability + ?Sized> {
    graph: &'a T,
    meta_type: &'a str,
    parallel: bool,
    use_cache: bool,
    cache: DashMap<Vec<u8>, Arc<OnceCell<Arc<IdSet>>>>,
    /// 目标类型全集，首次用到时才取
    universe: OnceCell<Arc<IdSet>>,
    cancel: &'a CancelToken,
    leaf_calls: AtomicUsize,
    cache_hits: AtomicUsize,
}

impl<T: TraversalCapability + ?Sized> Evaluation<'_, T> {
    /// 叶子与全集直接共享缓存中的集合，只在组合时生成新集合
    fn expr(&self, expr: &PlanExpr) -> Result<Arc<IdSet>> {
        match expr {
            PlanExpr::All => self.universe(),
            PlanExpr::Leaf(leaf) => self.leaf(leaf),
            PlanExpr::Not(inner) => {
                let excluded = self.expr(inner)?;
                self.cancel.check()?;
                let universe = self.universe()?;
                Ok(Arc::new(
                    universe
                        .iter()
                        .filter(|id| !excluded.contains(*id))
                        .copied()
                        .collect(),
                ))
            }
            PlanExpr::And(children) => {
                let mut sets = self.children(children)?;
                self.cancel.check()?;
                if sets.len() == 1 {
                    return Ok(sets.swap_remove(0));
                }
                // 从最小的集合开始求交
                sets.sort_by_key(|set| set.len());
                let Some((first, rest)) = sets.split_first() else {
                    return Ok(Arc::default());
                };
                Ok(Arc::new(
                    first
                        .iter()
                        .filter(|id| rest.iter().all(|set| set.contains(*id)))
                        .copied()
                        .collect(),
                ))
            }
            PlanExpr::Or(children) => {
                let mut sets = self.children(children)?;
                self.cancel.check()?;
                if sets.len() == 1 {
                    return Ok(sets.swap_remove(0));
                }
                let mut union = IdSet::new();
                for set in &sets {
                    union.extend(set.iter().copied());
                }
                Ok(Arc::new(union))
            }
        }
    }

    /// 子表达式求值，结果保持子表达式顺序
    fn children(&self, children: &[PlanExpr]) -> Result<Vec<Arc<IdSet>>> {
        if self.parallel && children.len() > 1 {
            children.par_iter().map(|c| self.expr(c)).collect()
        } else {
            children.iter().map(|c| self.expr(c)).collect()
        }
    }

    fn leaf(&self, leaf: &LeafOp) -> Result<Arc<IdSet>> {
        self.cancel.check()?;
        if !self.use_cache {
            return self.traverse(leaf).map(Arc::new);
        }

        // 每个叶子一个 OnceCell，并行分支同时命中时只有一个真正遍历
        let cell = self
            .cache
            .entry(leaf.cache_key()?)
            .or_default()
            .value()
            .clone();
        if let Some(hit) = cell.get() {
            self.cache_hits.fetch_add(1, AtomicOrdering::Relaxed);
            metrics::global_metrics().record_leaf_cache_hit();
            return Ok(Arc::clone(hit));
        }
        cell.get_or_try_init(|| self.traverse(leaf).map(Arc::new))
            .map(Arc::clone)
    }

    fn traverse(&self, leaf: &LeafOp) -> Result<IdSet> {
        self.leaf_calls.fetch_add(1, AtomicOrdering::Relaxed);
        metrics::global_metrics().record_leaf_traversal();
        self.graph
            .traverse(leaf)
            .map_err(|e| Error::traversal(leaf.path_id, e))
    }

    fn universe(&self) -> Result<Arc<IdSet>> {
        self.universe
            .get_or_try_init(|| self.graph.all_ids(self.meta_type).map(Arc::new))
            .map(Arc::clone)
    }
}
