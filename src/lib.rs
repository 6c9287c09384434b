//! pathquery - 基于路径的可组合过滤查询引擎
//!
//! 面向图建模的数据集，支持：
//! - 声明式的类型化遍历路径（Path）
//! - 由值谓词与子查询组合而成的可复用查询
//! - 写入与编译时的环检测和深度限制
//! - 编译为规范布尔计划，按集合代数求值
//! - 取消、超时、分页与排序

pub mod cancel;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod graph;
pub mod import;
pub mod metrics;
pub mod query;
pub mod store;
pub mod types;

// 重导出常用类型
pub use cancel::CancelToken;
pub use catalog::{PathCatalog, PathDefinition, QueryPath};
pub use config::EngineConfig;
pub use engine::QueryEngine;
pub use error::{Error, Result};
pub use graph::{Entity, MemoryGraph, TraversalCapability};
pub use query::{
    Combinators, ExecuteOptions, ExecuteRequest, ExecuteResponse, ExecutionPlan, LeafOp, Lookup,
    OrderBy, PlanExpr, QueryDefinition, QueryNode, ValuePredicate,
};
pub use store::{DefinitionStore, Invalidation, QueryResolver};
pub use types::{
    EntityId, MatchMode, MetaType, PathId, Polarity, PropertyValue, QueryId, ValueDataType,
};

/// 库版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
