//! 实体定义

use crate::types::{EntityId, MetaType, Properties, PropertyValue};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 实体：类型、标量属性和带标签的出链
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    id: EntityId,
    meta_type: MetaType,
    #[serde(default)]
    properties: Properties,
    #[serde(default)]
    links: HashMap<String, Vec<EntityId>>,
}

impl Entity {
    pub fn new(id: EntityId, meta_type: impl Into<String>) -> Self {
        Self {
            id,
            meta_type: meta_type.into(),
            properties: HashMap::new(),
            links: HashMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_link(mut self, label: impl Into<String>, target: EntityId) -> Self {
        self.links.entry(label.into()).or_default().push(target);
        self
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn meta_type(&self) -> &str {
        &self.meta_type
    }

    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// 某标签下的出链目标
    pub fn links(&self, label: &str) -> &[EntityId] {
        self.links.get(label).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_accessors() {
        let e = Entity::new(1, "product")
            .with_property("name", "lamp")
            .with_link("category", 10)
            .with_link("category", 11);
        assert_eq!(e.meta_type(), "product");
        assert_eq!(e.property("name"), Some(&PropertyValue::from("lamp")));
        assert_eq!(e.links("category"), &[10, 11]);
        assert!(e.links("brand").is_empty());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let e: Entity = serde_json::from_str(r#"{"id": 5, "meta_type": "category"}"#).unwrap();
        assert!(e.properties().is_empty());
        assert!(e.links("x").is_empty());
    }
}
