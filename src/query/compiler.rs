//! 查询编译器
//!
//! 在编译开始时把根查询可达的全部节点与路径复制进一个按 ID 索引的
//! 竞技场（copy-on-read），先跑环检测，再按存储顺序自底向上构建表达式。

use super::guard::CycleGuard;
use super::lookup::Arity;
use super::node::QueryNode;
use super::plan::{ExecutionPlan, LeafOp, PlanExpr};
use super::predicate::ValuePredicate;
use crate::cancel::CancelToken;
use crate::catalog::QueryPath;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::metrics;
use crate::store::QueryResolver;
use crate::types::{PathId, QueryId};
use dashmap::DashMap;
use indexmap::IndexMap;
use rayon::prelude::*;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::debug;

/// 编译期解析出的节点与路径
struct ResolvedTree {
    nodes: IndexMap<QueryId, Arc<QueryNode>>,
    /// 缺失的路径记为 None，编译到时报 `UnknownPath`
    paths: HashMap<PathId, Option<Arc<QueryPath>>>,
}

impl ResolvedTree {
    fn resolve<R: QueryResolver + ?Sized>(root: QueryId, resolver: &R) -> Result<Self> {
        let mut nodes = IndexMap::new();
        let mut paths = HashMap::new();
        let mut queue = VecDeque::from([root]);

        while let Some(id) = queue.pop_front() {
            if nodes.contains_key(&id) {
                continue;
            }
            let node = resolver.get_node(id)?;
            for pred in &node.query_values {
                if paths.contains_key(&pred.path_id) {
                    continue;
                }
                let path = match resolver.get_path(pred.path_id) {
                    Ok(path) => Some(path),
                    Err(Error::NotFound(_)) => None,
                    Err(e) => return Err(e),
                };
                paths.insert(pred.path_id, path);
            }
            queue.extend(node.sub_query_ids.iter().copied());
            nodes.insert(id, node);
        }

        Ok(Self { nodes, paths })
    }

    fn path(&self, id: PathId) -> Result<&Arc<QueryPath>> {
        self.paths
            .get(&id)
            .and_then(Option::as_ref)
            .ok_or(Error::UnknownPath(id))
    }
}

impl QueryResolver for ResolvedTree {
    fn get_path(&self, id: PathId) -> Result<Arc<QueryPath>> {
        self.path(id).cloned()
    }

    fn get_node(&self, id: QueryId) -> Result<Arc<QueryNode>> {
        self.nodes
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("查询 {}", id)))
    }
}

/// 查询编译器
#[derive(Debug, Clone)]
pub struct QueryCompiler {
    guard: CycleGuard,
    parallel: bool,
}

impl QueryCompiler {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            guard: CycleGuard::new(config.max_depth),
            parallel: config.parallel_compile,
        }
    }

    /// 把已存储的查询编译为执行计划
    pub fn compile<R: QueryResolver + ?Sized>(
        &self,
        root: QueryId,
        resolver: &R,
        cancel: &CancelToken,
    ) -> Result<ExecutionPlan> {
        cancel.check()?;
        let tree = ResolvedTree::resolve(root, resolver)?;
        self.guard.check(root, &tree)?;

        let build = Build {
            tree: &tree,
            memo: DashMap::new(),
            parallel: self.parallel,
            cancel,
        };
        let expr = build.node(root)?;
        let meta_type = tree.get_node(root)?.meta_type_id.clone();

        metrics::global_metrics().record_compile(tree.nodes.len());
        debug!(
            query = %root,
            nodes = tree.nodes.len(),
            leaves = expr.leaf_count(),
            "query compiled"
        );
        Ok(ExecutionPlan::new(Some(root), meta_type, expr))
    }

    /// 编译临时过滤条件；每个条件按存储谓词同样规则校验
    pub fn compile_filters<R: QueryResolver + ?Sized>(
        &self,
        meta_type: &str,
        filters: &[ValuePredicate],
        resolver: &R,
    ) -> Result<Vec<PlanExpr>> {
        filters
            .iter()
            .map(|pred| {
                let path = resolver.get_path(pred.path_id).map_err(|e| match e {
                    Error::NotFound(_) => Error::UnknownPath(pred.path_id),
                    other => other,
                })?;
                compile_predicate(pred, &path, meta_type)
            })
            .collect()
    }
}

struct Build<'a> {
    tree: &'a ResolvedTree,
    /// 共享子查询只编译一次
    memo: DashMap<QueryId, PlanExpr>,
    parallel: bool,
    cancel: &'a CancelToken,
}

impl Build<'_> {
    fn node(&self, id: QueryId) -> Result<PlanExpr> {
        if let Some(expr) = self.memo.get(&id) {
            return Ok(expr.clone());
        }
        self.cancel.check()?;

        let node = self.tree.get_node(id)?;
        let combinators = node.combinators;

        let values = node
            .query_values
            .iter()
            .map(|pred| compile_predicate(pred, self.tree.path(pred.path_id)?, &node.meta_type_id))
            .collect::<Result<Vec<_>>>()?;

        for sub_id in &node.sub_query_ids {
            let sub = self.tree.get_node(*sub_id)?;
            if sub.meta_type_id != node.meta_type_id {
                return Err(Error::TypeMismatch(format!(
                    "子查询 {} 过滤 {}, 与 {} 不一致",
                    sub_id, sub.meta_type_id, node.meta_type_id
                )));
            }
        }

        // collect 保持 sub_query_ids 的存储顺序
        let queries = if self.parallel && node.sub_query_ids.len() > 1 {
            node.sub_query_ids
                .par_iter()
                .map(|sub| self.node(*sub))
                .collect::<Result<Vec<_>>>()?
        } else {
            node.sub_query_ids
                .iter()
                .map(|sub| self.node(*sub))
                .collect::<Result<Vec<_>>>()?
        };

        let v = PlanExpr::combine(combinators.match_values, values)
            .map(|e| e.apply_polarity(combinators.include_values));
        let q = PlanExpr::combine(combinators.match_queries, queries)
            .map(|e| e.apply_polarity(combinators.include_queries));

        let expr = match (v, q) {
            (Some(v), Some(q)) => PlanExpr::And(vec![v, q]),
            (Some(v), None) => v,
            (None, Some(q)) => q,
            (None, None) => PlanExpr::All,
        };

        self.memo.insert(id, expr.clone());
        Ok(expr)
    }
}

/// 单个谓词：校验后展开为叶子，按谓词自身的 match 组合，再按 include 取反
fn compile_predicate(pred: &ValuePredicate, path: &QueryPath, meta_type: &str) -> Result<PlanExpr> {
    let pred = pred.validate(path, meta_type)?;
    let leaf = |values| PlanExpr::Leaf(LeafOp::new(path, pred.lookup, values));

    let expr = if pred.lookup.arity() == Arity::Nullary {
        leaf(Vec::new())
    } else if pred.lookup.takes_list() {
        leaf(pred.values.to_vec())
    } else {
        let leaves = pred.values.iter().map(|v| leaf(vec![v.clone()])).collect();
        PlanExpr::combine(pred.match_mode, leaves).ok_or_else(|| Error::InvalidOperatorArity {
            lookup: pred.lookup.to_string(),
            expected: ">=1",
            actual: 0,
        })?
    };

    Ok(expr.apply_polarity(pred.include))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PathDefinition;
    use crate::query::{Combinators, Lookup, QueryDefinition};
    use crate::store::DefinitionStore;
    use crate::types::{MatchMode, Polarity, PropertyValue, ValueDataType};

    struct Fixture {
        store: DefinitionStore,
        color: Arc<QueryPath>,
        size: Arc<QueryPath>,
    }

    fn fixture() -> Fixture {
        let store = DefinitionStore::new(8);
        let color = store
            .create_path(PathDefinition::new("color", "product", "color", "color", ValueDataType::String))
            .unwrap();
        let size = store
            .create_path(PathDefinition::new("size", "product", "size", "size", ValueDataType::Number))
            .unwrap();
        Fixture { store, color, size }
    }

    fn compiler() -> QueryCompiler {
        QueryCompiler::new(&EngineConfig::default())
    }

    fn leaf(path: &QueryPath, lookup: Lookup, values: Vec<PropertyValue>) -> PlanExpr {
        PlanExpr::Leaf(LeafOp::new(path, lookup, values))
    }

    fn compile(f: &Fixture, id: QueryId) -> Result<PlanExpr> {
        compiler()
            .compile(id, &*f.store.snapshot(), &CancelToken::new())
            .map(|plan| plan.expr)
    }

    #[test]
    fn test_empty_node_is_tautology() {
        let f = fixture();
        let q = f.store.create_query(QueryDefinition::new("all", "product")).unwrap();
        assert_eq!(compile(&f, q.id).unwrap(), PlanExpr::All);
    }

    #[test]
    fn test_multi_value_predicate_expands_per_value() {
        let f = fixture();
        let q = f
            .store
            .create_query(QueryDefinition::new("warm", "product").with_value(
                ValuePredicate::new(f.color.id, Lookup::Eq, ["red", "orange"])
                    .with_match(MatchMode::Or)
                    .exclude(),
            ))
            .unwrap();
        let expected = PlanExpr::Or(vec![
            leaf(&f.color, Lookup::Eq, vec!["red".into()]),
            leaf(&f.color, Lookup::Eq, vec!["orange".into()]),
        ])
        .negate();
        assert_eq!(compile(&f, q.id).unwrap(), expected);
    }

    #[test]
    fn test_list_and_unary_operators_keep_one_leaf() {
        let f = fixture();
        let q = f
            .store
            .create_query(
                QueryDefinition::new("mixed", "product")
                    .with_value(ValuePredicate::new(f.size.id, Lookup::In, [1i64, 2, 3]))
                    .with_value(ValuePredicate::unary(f.color.id, Lookup::IsNull)),
            )
            .unwrap();
        let expected = PlanExpr::And(vec![
            leaf(&f.size, Lookup::In, vec![1i64.into(), 2i64.into(), 3i64.into()]),
            leaf(&f.color, Lookup::IsNull, vec![]),
        ]);
        assert_eq!(compile(&f, q.id).unwrap(), expected);
    }

    #[test]
    fn test_node_combines_values_and_queries() {
        let f = fixture();
        let red = f
            .store
            .create_query(
                QueryDefinition::new("red", "product")
                    .with_value(ValuePredicate::new(f.color.id, Lookup::Eq, ["red"])),
            )
            .unwrap();
        let big = f
            .store
            .create_query(
                QueryDefinition::new("big", "product")
                    .with_value(ValuePredicate::new(f.size.id, Lookup::Gte, [10i64])),
            )
            .unwrap();
        let top = f
            .store
            .create_query(
                QueryDefinition::new("top", "product")
                    .with_value(ValuePredicate::new(f.size.id, Lookup::Lt, [100i64]))
                    .with_value(ValuePredicate::unary(f.color.id, Lookup::IsNotNull))
                    .with_sub_query(red.id)
                    .with_sub_query(big.id)
                    .with_combinators(
                        Combinators::default()
                            .values(MatchMode::Or, Polarity::Include)
                            .queries(MatchMode::And, Polarity::Exclude),
                    ),
            )
            .unwrap();

        let expected = PlanExpr::And(vec![
            PlanExpr::Or(vec![
                leaf(&f.size, Lookup::Lt, vec![100i64.into()]),
                leaf(&f.color, Lookup::IsNotNull, vec![]),
            ]),
            PlanExpr::And(vec![
                leaf(&f.color, Lookup::Eq, vec!["red".into()]),
                leaf(&f.size, Lookup::Gte, vec![10i64.into()]),
            ])
            .negate(),
        ]);
        assert_eq!(compile(&f, top.id).unwrap(), expected);
    }

    #[test]
    fn test_compile_is_deterministic_with_shared_sub_queries() {
        let f = fixture();
        let shared = f
            .store
            .create_query(
                QueryDefinition::new("shared", "product")
                    .with_value(ValuePredicate::new(f.color.id, Lookup::Eq, ["red"])),
            )
            .unwrap();
        let mut subs = Vec::new();
        for i in 0..6 {
            let q = f
                .store
                .create_query(
                    QueryDefinition::new(format!("mid{}", i), "product")
                        .with_value(ValuePredicate::new(f.size.id, Lookup::Gt, [i as i64]))
                        .with_sub_query(shared.id),
                )
                .unwrap();
            subs.push(q.id);
        }
        let mut root = QueryDefinition::new("root", "product");
        root.sub_query_ids = subs;
        root.combinators = Combinators::default().queries(MatchMode::Or, Polarity::Include);
        let root = f.store.create_query(root).unwrap();

        let snapshot = f.store.snapshot();
        let parallel = compiler().compile(root.id, &*snapshot, &CancelToken::new()).unwrap();
        let again = compiler().compile(root.id, &*snapshot, &CancelToken::new()).unwrap();
        let serial = QueryCompiler::new(&EngineConfig {
            parallel_compile: false,
            ..EngineConfig::default()
        })
        .compile(root.id, &*snapshot, &CancelToken::new())
        .unwrap();

        assert_eq!(parallel, again);
        assert_eq!(parallel, serial);
        assert_eq!(parallel.plan_hash().unwrap(), serial.plan_hash().unwrap());
        match &parallel.expr {
            PlanExpr::Or(children) => {
                assert_eq!(children.len(), 6);
                // 顺序与存储顺序一致
                for (i, child) in children.iter().enumerate() {
                    match child {
                        PlanExpr::And(parts) => assert_eq!(
                            parts[0],
                            leaf(&f.size, Lookup::Gt, vec![(i as i64).into()])
                        ),
                        other => panic!("unexpected child {other:?}"),
                    }
                }
            }
            other => panic!("unexpected root {other:?}"),
        }
    }

    #[test]
    fn test_exclude_is_negation_of_include() {
        let f = fixture();
        let pred = ValuePredicate::new(f.color.id, Lookup::Eq, ["red"]);
        let inc = f
            .store
            .create_query(QueryDefinition::new("inc", "product").with_value(pred.clone()))
            .unwrap();
        let exc = f
            .store
            .create_query(
                QueryDefinition::new("exc", "product")
                    .with_value(pred)
                    .with_combinators(
                        Combinators::default().values(MatchMode::And, Polarity::Exclude),
                    ),
            )
            .unwrap();
        assert_eq!(compile(&f, exc.id).unwrap(), compile(&f, inc.id).unwrap().negate());
    }

    #[test]
    fn test_cycle_rejected_before_build() {
        // 直接构造带环的快照，绕过写入期校验
        let mut defs = crate::store::Definitions::default();
        let mut node = QueryNode::from_definition(QueryId::new(1), QueryDefinition::new("loop", "product"), 1);
        node.sub_query_ids.push(QueryId::new(1));
        defs_insert(&mut defs, node);

        let err = compiler()
            .compile(QueryId::new(1), &defs, &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, Error::CycleDetected { .. }));
    }

    #[test]
    fn test_missing_path_is_unknown_path() {
        let mut defs = crate::store::Definitions::default();
        let def = QueryDefinition::new("orphan", "product")
            .with_value(ValuePredicate::new(PathId::new(77), Lookup::Eq, ["x"]));
        defs_insert(&mut defs, QueryNode::from_definition(QueryId::new(1), def, 1));

        assert!(matches!(
            compiler().compile(QueryId::new(1), &defs, &CancelToken::new()),
            Err(Error::UnknownPath(id)) if id == PathId::new(77)
        ));
    }

    /// 路径解析失败但不是缺失
    struct BrokenPaths(crate::store::Definitions);

    impl QueryResolver for BrokenPaths {
        fn get_path(&self, _id: PathId) -> Result<Arc<QueryPath>> {
            Err(Error::StorageError("路径表不可读".to_string()))
        }

        fn get_node(&self, id: QueryId) -> Result<Arc<QueryNode>> {
            self.0.get_node(id)
        }
    }

    #[test]
    fn test_path_resolver_failure_is_propagated() {
        let f = fixture();
        let q = f
            .store
            .create_query(
                QueryDefinition::new("red", "product")
                    .with_value(ValuePredicate::new(f.color.id, Lookup::Eq, ["red"])),
            )
            .unwrap();
        let broken = BrokenPaths((*f.store.snapshot()).clone());
        assert!(matches!(
            compiler().compile(q.id, &broken, &CancelToken::new()),
            Err(Error::StorageError(_))
        ));
    }

    #[test]
    fn test_cancelled_compile() {
        let f = fixture();
        let q = f.store.create_query(QueryDefinition::new("all", "product")).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(
            compiler().compile(q.id, &*f.store.snapshot(), &cancel),
            Err(Error::Cancelled)
        ));
    }

    #[test]
    fn test_filters_are_validated() {
        let f = fixture();
        let snapshot = f.store.snapshot();
        let ok = compiler()
            .compile_filters(
                "product",
                &[ValuePredicate::new(f.size.id, Lookup::Gt, ["5"])],
                &*snapshot,
            )
            .unwrap();
        assert_eq!(ok, vec![leaf(&f.size, Lookup::Gt, vec![5i64.into()])]);

        assert!(matches!(
            compiler().compile_filters(
                "product",
                &[ValuePredicate::new(PathId::new(99), Lookup::Eq, ["x"])],
                &*snapshot,
            ),
            Err(Error::UnknownPath(_))
        ));
    }

    fn defs_insert(defs: &mut crate::store::Definitions, node: QueryNode) {
        crate::store::insert_unchecked(defs, node);
    }
}
