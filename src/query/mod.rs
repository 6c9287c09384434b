//! 查询模块
//!
//! 可组合的过滤查询：值谓词和子查询组成的查询树，经环检测后编译为
//! 规范的布尔执行计划，再交给存储层的遍历能力求值。
//!
//! 主要组成:
//! - 操作符与取值校验: `Lookup`, `ValuePredicate`
//! - 查询定义: `QueryNode`, `Combinators`
//! - 环与深度检测: `CycleGuard`
//! - 编译: `QueryCompiler` -> `ExecutionPlan`
//! - 执行: `QueryExecutor` -> `ExecuteResponse`

mod compiler;
mod executor;
mod guard;
mod lookup;
pub(crate) mod node;
mod plan;
mod predicate;
mod request;

pub use compiler::QueryCompiler;
pub use executor::QueryExecutor;
pub use guard::CycleGuard;
pub use lookup::{Arity, Lookup};
pub use node::{Combinators, QueryDefinition, QueryNode};
pub use plan::{ExecutionPlan, LeafOp, PlanExpr};
pub use predicate::{ValueList, ValuePredicate};
pub use request::{ExecuteOptions, ExecuteRequest, ExecuteResponse, OrderBy};
