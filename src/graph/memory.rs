//! 内存图
//!
//! 遍历能力的参考实现。遍历模板为点分链 `link.link.property`：
//! 前面各段沿出链标签前进，最后一段读取到达实体的属性。

use super::entity::Entity;
use super::TraversalCapability;
use crate::error::{Error, Result};
use crate::query::{LeafOp, Lookup};
use crate::types::{EntityId, MetaType, PropertyValue};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// 内存图
#[derive(Debug)]
pub struct MemoryGraph {
    /// 实体表
    entities: RwLock<HashMap<EntityId, Entity>>,
    /// 类型到实体 ID 集合的索引
    type_index: RwLock<HashMap<MetaType, HashSet<EntityId>>>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(HashMap::new()),
            type_index: RwLock::new(HashMap::new()),
        }
    }

    /// 添加实体，ID 重复时报错
    pub fn add_entity(&self, entity: Entity) -> Result<EntityId> {
        let id = entity.id();
        let mut entities = self.entities.write();
        if entities.contains_key(&id) {
            return Err(Error::StorageError(format!("实体已存在: {}", id)));
        }
        self.type_index
            .write()
            .entry(entity.meta_type().to_string())
            .or_default()
            .insert(id);
        entities.insert(id, entity);
        Ok(id)
    }

    /// 删除实体（指向它的出链保留，遍历时跳过）
    pub fn remove_entity(&self, id: EntityId) -> Option<Entity> {
        let removed = self.entities.write().remove(&id)?;
        if let Some(set) = self.type_index.write().get_mut(removed.meta_type()) {
            set.remove(&id);
        }
        Some(removed)
    }

    pub fn get_entity(&self, id: EntityId) -> Option<Entity> {
        self.entities.read().get(&id).cloned()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.read().len()
    }

    /// 沿模板到达的取值
    fn reach(
        entities: &HashMap<EntityId, Entity>,
        start: EntityId,
        template: &str,
    ) -> Result<Vec<PropertyValue>> {
        let segments: Vec<&str> = template.split('.').collect();
        let (property, links) = match segments.split_last() {
            Some((property, links)) if !property.is_empty() => (*property, links),
            _ => {
                return Err(Error::StorageError(format!("无效的遍历模板: {:?}", template)));
            }
        };

        let mut frontier = vec![start];
        for label in links {
            let mut next = Vec::new();
            let mut seen = HashSet::new();
            for id in &frontier {
                if let Some(entity) = entities.get(id) {
                    for target in entity.links(label) {
                        if entities.contains_key(target) && seen.insert(*target) {
                            next.push(*target);
                        }
                    }
                }
            }
            frontier = next;
        }

        Ok(frontier
            .iter()
            .filter_map(|id| entities.get(id))
            .filter_map(|e| e.property(property).cloned())
            .collect())
    }

    /// 肯定操作符：任一非空取值满足任一操作数；否定操作符取其补
    fn satisfies(lookup: Lookup, reached: &[PropertyValue], operands: &[PropertyValue]) -> bool {
        let present: Vec<&PropertyValue> = reached.iter().filter(|v| !v.is_null()).collect();

        match lookup {
            Lookup::Eq | Lookup::In => any_match(&present, operands, |v, op| v.matches(op)),
            Lookup::Ne | Lookup::NotIn => !any_match(&present, operands, |v, op| v.matches(op)),
            Lookup::Gt => any_match(&present, operands, |v, op| v.compare(op) == Some(Ordering::Greater)),
            Lookup::Gte => any_match(&present, operands, |v, op| {
                matches!(v.compare(op), Some(Ordering::Greater | Ordering::Equal))
            }),
            Lookup::Lt => any_match(&present, operands, |v, op| v.compare(op) == Some(Ordering::Less)),
            Lookup::Lte => any_match(&present, operands, |v, op| {
                matches!(v.compare(op), Some(Ordering::Less | Ordering::Equal))
            }),
            Lookup::Contains => any_match(&present, operands, |v, op| text_match(v, op, |s, p| s.contains(p))),
            Lookup::NotContains => !any_match(&present, operands, |v, op| text_match(v, op, |s, p| s.contains(p))),
            Lookup::StartsWith => any_match(&present, operands, |v, op| text_match(v, op, |s, p| s.starts_with(p))),
            Lookup::EndsWith => any_match(&present, operands, |v, op| text_match(v, op, |s, p| s.ends_with(p))),
            Lookup::IsNull => present.is_empty(),
            Lookup::IsNotNull => !present.is_empty(),
        }
    }
}

fn any_match(
    present: &[&PropertyValue],
    operands: &[PropertyValue],
    test: fn(&PropertyValue, &PropertyValue) -> bool,
) -> bool {
    present
        .iter()
        .any(|v| operands.iter().any(|op| test(v, op)))
}

fn text_match(value: &PropertyValue, operand: &PropertyValue, test: fn(&str, &str) -> bool) -> bool {
    match (value.as_str(), operand.as_str()) {
        (Some(v), Some(op)) => test(v, op),
        _ => false,
    }
}

impl Default for MemoryGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl TraversalCapability for MemoryGraph {
    fn traverse(&self, leaf: &LeafOp) -> Result<HashSet<EntityId>> {
        let entities = self.entities.read();
        let candidates = self.all_ids(&leaf.source_type)?;
        let mut matched = HashSet::new();
        for id in candidates {
            let reached = Self::reach(&entities, id, &leaf.traversal_template)?;
            if Self::satisfies(leaf.lookup, &reached, &leaf.values) {
                matched.insert(id);
            }
        }
        Ok(matched)
    }

    fn all_ids(&self, meta_type: &str) -> Result<HashSet<EntityId>> {
        Ok(self
            .type_index
            .read()
            .get(meta_type)
            .cloned()
            .unwrap_or_default())
    }

    fn order_value(&self, id: EntityId, field: &str) -> Result<Option<PropertyValue>> {
        let entities = self.entities.read();
        if !entities.contains_key(&id) {
            return Ok(None);
        }
        Ok(Self::reach(&entities, id, field)?
            .into_iter()
            .find(|v| !v.is_null()))
    }
}
