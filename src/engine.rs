//! 查询引擎
//!
//! 把定义存储、编译器和执行器串成一次完整的请求处理：
//! 取快照 -> 编译（含临时过滤条件）-> 执行 -> 记录指标。

use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::graph::TraversalCapability;
use crate::metrics;
use crate::query::{ExecuteOptions, ExecuteRequest, ExecuteResponse, ExecutionPlan, QueryCompiler, QueryExecutor};
use crate::store::{DefinitionStore, Invalidation, QueryResolver};
use crate::types::QueryId;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct QueryEngine {
    store: Arc<DefinitionStore>,
    config: EngineConfig,
    compiler: QueryCompiler,
}

impl QueryEngine {
    pub fn new(store: Arc<DefinitionStore>, config: EngineConfig) -> Self {
        let compiler = QueryCompiler::new(&config);
        Self {
            store,
            config,
            compiler,
        }
    }

    /// 使用新建的空存储
    pub fn with_config(config: EngineConfig) -> Self {
        Self::new(Arc::new(DefinitionStore::with_config(&config)), config)
    }

    pub fn store(&self) -> &Arc<DefinitionStore> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// 编译已存储的查询
    pub fn compile(&self, query_id: QueryId, cancel: &CancelToken) -> Result<ExecutionPlan> {
        let snapshot = self.store.snapshot();
        self.compiler.compile(query_id, snapshot.as_ref(), cancel)
    }

    /// 编译请求：查询本身加上临时过滤条件，二者基于同一快照
    pub fn plan_for(&self, request: &ExecuteRequest, cancel: &CancelToken) -> Result<ExecutionPlan> {
        let snapshot = self.store.snapshot();
        let plan = self
            .compiler
            .compile(request.query_id, snapshot.as_ref(), cancel)?;
        if request.filters.is_empty() {
            return Ok(plan);
        }

        let meta_type = snapshot.get_node(request.query_id)?.meta_type_id.clone();
        let filters = self
            .compiler
            .compile_filters(&meta_type, &request.filters, snapshot.as_ref())?;
        Ok(plan.with_filters(filters))
    }

    /// 处理一次执行请求
    ///
    /// 配置中的超时与调用方令牌合并；limit 按配置的默认值与上限调整。
    pub fn execute<T: TraversalCapability + ?Sized>(
        &self,
        request: &ExecuteRequest,
        graph: &T,
        cancel: &CancelToken,
    ) -> Result<ExecuteResponse> {
        let metrics = metrics::global_metrics();
        let timer = metrics.record_execution_start();
        let cancel = cancel.child_with_timeout(self.config.timeout());

        let outcome = self.plan_for(request, &cancel).and_then(|plan| {
            let options = ExecuteOptions {
                limit: self.config.effective_limit(request.options.limit),
                ..request.options.clone()
            };
            QueryExecutor::new(graph, &self.config).execute(&plan, &options, &cancel)
        });

        match &outcome {
            Ok(resp) => debug!(
                query = %request.query_id,
                count = resp.count,
                elapsed_ms = timer.elapsed().as_millis() as u64,
                "request served"
            ),
            Err(e) => warn!(query = %request.query_id, error = %e, "request failed"),
        }
        metrics.record_execution_complete(timer, &outcome);
        outcome
    }

    /// 存储层数据变化时调用，转发给失效监听器
    pub fn notify_entities_changed(&self, meta_type: &str) {
        self.store.notify(&Invalidation::EntitiesChanged {
            meta_type: meta_type.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PathDefinition;
    use crate::error::Error;
    use crate::graph::{Entity, MemoryGraph};
    use crate::query::{Combinators, Lookup, OrderBy, QueryDefinition, ValuePredicate};
    use crate::types::{MatchMode, Polarity, PathId, ValueDataType};
    use parking_lot::Mutex;
    use std::time::Duration;

    fn shop() -> MemoryGraph {
        let graph = MemoryGraph::new();
        for (id, name) in [(1, "red"), (2, "blue")] {
            graph
                .add_entity(Entity::new(id, "category").with_property("name", name))
                .unwrap();
        }
        let products: [(u64, i64, &[u64]); 4] =
            [(100, 40, &[]), (101, 10, &[1]), (102, 25, &[1, 2]), (103, 5, &[2])];
        for (id, price, categories) in products {
            let mut e = Entity::new(id, "product").with_property("price", price);
            for c in categories {
                e = e.with_link("category", *c);
            }
            graph.add_entity(e).unwrap();
        }
        graph
    }

    struct Setup {
        engine: QueryEngine,
        price: PathId,
        red: QueryId,
    }

    fn setup(config: EngineConfig) -> Setup {
        let engine = QueryEngine::with_config(config);
        let store = engine.store();
        let category = store
            .create_path(PathDefinition::new(
                "category",
                "product",
                "category",
                "category.name",
                ValueDataType::String,
            ))
            .unwrap()
            .id;
        let price = store
            .create_path(PathDefinition::new("price", "product", "product", "price", ValueDataType::Number))
            .unwrap()
            .id;
        let red = store
            .create_query(QueryDefinition::new("red", "product").with_value(
                ValuePredicate::new(category, Lookup::Eq, ["red"]).with_match(MatchMode::Or),
            ))
            .unwrap()
            .id;
        Setup {
            engine,
            price,
            red,
        }
    }

    #[test]
    fn test_execute_and_exclude_sub_query() {
        let s = setup(EngineConfig::default());
        let graph = shop();
        let cancel = CancelToken::new();

        let resp = s
            .engine
            .execute(&ExecuteRequest::new(s.red), &graph, &cancel)
            .unwrap();
        assert_eq!(resp.results, vec![101, 102]);
        assert_eq!(resp.count, 2);

        let not_red = s
            .engine
            .store()
            .create_query(
                QueryDefinition::new("not red", "product")
                    .with_sub_query(s.red)
                    .with_combinators(Combinators::default().queries(MatchMode::And, Polarity::Exclude)),
            )
            .unwrap();
        let resp = s
            .engine
            .execute(&ExecuteRequest::new(not_red.id), &graph, &cancel)
            .unwrap();
        assert_eq!(resp.results, vec![100, 103]);
    }

    #[test]
    fn test_ad_hoc_filters_narrow_results() {
        let s = setup(EngineConfig::default());
        let graph = shop();
        let request = ExecuteRequest::new(s.red)
            .with_filter(ValuePredicate::new(s.price, Lookup::Gt, [20i64]))
            .with_options(ExecuteOptions::default().ordered(OrderBy::desc("price")));

        let plan = s.engine.plan_for(&request, &CancelToken::new()).unwrap();
        assert!(matches!(plan.expr, crate::query::PlanExpr::And(ref c) if c.len() == 2));

        let resp = s.engine.execute(&request, &graph, &CancelToken::new()).unwrap();
        assert_eq!(resp.results, vec![102]);

        // 过滤条件使用未知路径
        let bad = ExecuteRequest::new(s.red).with_filter(ValuePredicate::new(PathId::new(99), Lookup::Eq, ["x"]));
        assert!(matches!(
            s.engine.execute(&bad, &graph, &CancelToken::new()),
            Err(Error::UnknownPath(_))
        ));
    }

    #[test]
    fn test_filter_must_match_query_type() {
        let s = setup(EngineConfig::default());
        let brand = s
            .engine
            .store()
            .create_path(PathDefinition::new("brand", "brand", "brand", "name", ValueDataType::String))
            .unwrap();
        let request = ExecuteRequest::new(s.red).with_filter(ValuePredicate::new(brand.id, Lookup::Eq, ["acme"]));
        assert!(matches!(
            s.engine.plan_for(&request, &CancelToken::new()),
            Err(Error::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_config_limits_apply() {
        let config = EngineConfig {
            default_limit: Some(1),
            max_limit: Some(2),
            ..EngineConfig::default()
        };
        let s = setup(config);
        let graph = shop();

        let resp = s
            .engine
            .execute(&ExecuteRequest::new(s.red), &graph, &CancelToken::new())
            .unwrap();
        assert_eq!(resp.results, vec![101]);
        assert_eq!(resp.count, 2);

        let all = s
            .engine
            .store()
            .create_query(QueryDefinition::new("all products", "product"))
            .unwrap();
        let request = ExecuteRequest::new(all.id).with_options(ExecuteOptions::page(100, 0));
        let resp = s.engine.execute(&request, &graph, &CancelToken::new()).unwrap();
        assert_eq!(resp.results.len(), 2);
        assert_eq!(resp.count, 4);
    }

    #[test]
    fn test_cancelled_request() {
        let s = setup(EngineConfig::default());
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = s
            .engine
            .execute(&ExecuteRequest::new(s.red), &shop(), &cancel)
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));

        let expired = CancelToken::with_timeout(Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(2));
        assert!(matches!(
            s.engine.compile(s.red, &expired),
            Err(Error::Cancelled)
        ));
    }

    #[test]
    fn test_entities_changed_notification() {
        let s = setup(EngineConfig::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        s.engine
            .store()
            .subscribe(Arc::new(move |e: &Invalidation| sink.lock().push(e.clone())));

        s.engine.notify_entities_changed("product");
        assert_eq!(
            seen.lock().as_slice(),
            &[Invalidation::EntitiesChanged {
                meta_type: "product".into()
            }]
        );
    }
}
