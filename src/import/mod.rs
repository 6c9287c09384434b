//! 工作区导入模块
//!
//! 从 JSON 文件批量导入路径、查询和实体。文件内的引用一律用名称，
//! 导入时换成存储分配的 ID。

use crate::catalog::PathDefinition;
use crate::error::{Error, Result};
use crate::graph::{Entity, MemoryGraph};
use crate::query::{Combinators, Lookup, QueryDefinition, ValueList, ValuePredicate};
use crate::store::DefinitionStore;
use crate::types::{MatchMode, MetaType, PathId, Polarity, QueryId};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// 导入统计
#[derive(Debug, Default, Clone)]
pub struct ImportStats {
    pub paths_imported: usize,
    pub queries_imported: usize,
    pub entities_imported: usize,
    /// 被跳过的实体（ID 重复）
    pub errors: usize,
    pub duration_ms: u64,
}

/// 工作区文件
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Workspace {
    #[serde(default)]
    pub paths: Vec<PathDefinition>,
    #[serde(default)]
    pub queries: Vec<QuerySpec>,
    #[serde(default)]
    pub entities: Vec<Entity>,
}

/// 文件中的查询，子查询按名称引用
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuerySpec {
    pub name: String,
    pub meta_type_id: MetaType,
    #[serde(default)]
    pub values: Vec<PredicateSpec>,
    #[serde(default)]
    pub sub_queries: Vec<String>,
    #[serde(flatten)]
    pub combinators: Combinators,
}

/// 文件中的谓词，路径按名称引用
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredicateSpec {
    pub path: String,
    pub lookup: Lookup,
    #[serde(default)]
    pub values: ValueList,
    #[serde(default, rename = "match")]
    pub match_mode: MatchMode,
    #[serde(default)]
    pub include: Polarity,
}

/// 工作区导入器
pub struct WorkspaceImporter {
    store: Arc<DefinitionStore>,
}

impl WorkspaceImporter {
    pub fn new(store: Arc<DefinitionStore>) -> Self {
        Self { store }
    }

    pub fn import_file<P: AsRef<Path>>(&self, path: P) -> Result<(ImportStats, MemoryGraph)> {
        let data = std::fs::read_to_string(path)?;
        self.import_str(&data)
    }

    pub fn import_str(&self, data: &str) -> Result<(ImportStats, MemoryGraph)> {
        let workspace: Workspace = serde_json::from_str(data)
            .map_err(|e| Error::ImportError(format!("JSON 解析错误: {}", e)))?;
        self.import(workspace)
    }

    /// 导入工作区；定义错误直接返回，实体 ID 重复只计数
    pub fn import(&self, workspace: Workspace) -> Result<(ImportStats, MemoryGraph)> {
        let start = Instant::now();
        let mut stats = ImportStats::default();

        let mut path_ids = HashMap::new();
        for def in workspace.paths {
            let path = self.store.create_path(def)?;
            path_ids.insert(path.name.clone(), path.id);
            stats.paths_imported += 1;
        }
        stats.queries_imported = self.import_queries(workspace.queries, &path_ids)?;

        let graph = MemoryGraph::new();
        let imported = AtomicUsize::new(0);
        let errors = AtomicUsize::new(0);
        workspace
            .entities
            .into_par_iter()
            .for_each(|entity| match graph.add_entity(entity) {
                Ok(_) => {
                    imported.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    warn!(error = %e, "entity skipped");
                    errors.fetch_add(1, Ordering::Relaxed);
                }
            });
        stats.entities_imported = imported.load(Ordering::Relaxed);
        stats.errors = errors.load(Ordering::Relaxed);
        stats.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            paths = stats.paths_imported,
            queries = stats.queries_imported,
            entities = stats.entities_imported,
            errors = stats.errors,
            "workspace imported"
        );
        Ok((stats, graph))
    }

    /// 两阶段：先创建不含子查询的查询体，再按文件顺序补上子查询引用，
    /// 这样文件内的前向引用也能解析，环仍由存储在第二阶段拒绝。
    fn import_queries(
        &self,
        specs: Vec<QuerySpec>,
        path_ids: &HashMap<String, PathId>,
    ) -> Result<usize> {
        let mut definitions = Vec::with_capacity(specs.len());
        let mut query_ids: HashMap<String, QueryId> = HashMap::new();

        for spec in specs {
            let mut def = QueryDefinition::new(&spec.name, &spec.meta_type_id)
                .with_combinators(spec.combinators);
            for pred in spec.values {
                let path_id = *path_ids
                    .get(&pred.path)
                    .ok_or_else(|| Error::ImportError(format!("查询 {} 引用了未知路径 {}", spec.name, pred.path)))?;
                def = def.with_value(ValuePredicate {
                    path_id,
                    lookup: pred.lookup,
                    values: pred.values,
                    match_mode: pred.match_mode,
                    include: pred.include,
                });
            }
            let node = self.store.create_query(def.clone())?;
            query_ids.insert(spec.name.clone(), node.id);
            definitions.push((node.id, def, spec.sub_queries));
        }

        for (id, def, subs) in &definitions {
            if subs.is_empty() {
                continue;
            }
            let mut def = def.clone();
            for name in subs {
                let sub = *query_ids
                    .get(name)
                    .ok_or_else(|| Error::ImportError(format!("查询 {} 引用了未知子查询 {}", def.name, name)))?;
                def = def.with_sub_query(sub);
            }
            self.store.update_query(*id, def)?;
        }
        Ok(definitions.len())
    }
}

/// 从工作区文件导入到给定存储
pub fn import_workspace<P: AsRef<Path>>(
    store: Arc<DefinitionStore>,
    path: P,
) -> Result<(ImportStats, MemoryGraph)> {
    WorkspaceImporter::new(store).import_file(path)
}
