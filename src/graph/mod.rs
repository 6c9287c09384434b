//! 图遍历能力
//!
//! 存储层需要提供的只读接口，以及一个内存实现

mod entity;
mod memory;

pub use entity::Entity;
pub use memory::MemoryGraph;

use crate::error::Result;
use crate::query::LeafOp;
use crate::types::{EntityId, PropertyValue};
use std::collections::HashSet;

/// 存储层提供的遍历能力，对本模块而言必须只读、无副作用
pub trait TraversalCapability: Send + Sync {
    /// 解析一个叶子，返回满足条件的起点实体
    fn traverse(&self, leaf: &LeafOp) -> Result<HashSet<EntityId>>;

    /// 某类型的全部实体
    fn all_ids(&self, meta_type: &str) -> Result<HashSet<EntityId>>;

    /// 排序字段取值；不支持排序字段的后端可保持默认
    fn order_value(&self, _id: EntityId, _field: &str) -> Result<Option<PropertyValue>> {
        Ok(None)
    }
}
