//! 路径定义
//!
//! 声明两种实体类型之间的一条带类型的关系

use crate::error::{Error, Result};
use crate::types::{MetaType, PathId, ValueDataType};
use serde::{Deserialize, Serialize};

/// 已注册的路径
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPath {
    pub id: PathId,
    /// 唯一名称
    pub name: String,
    /// 起点实体类型
    pub source_type: MetaType,
    /// 终点实体类型
    pub target_type: MetaType,
    /// 遍历模板（对本模块不透明，原样交给存储层）
    pub traversal_template: String,
    /// 末端取值的数据类型
    pub value_data_type: ValueDataType,
    /// 枚举类型的可选值，空表示不限制
    #[serde(default)]
    pub choices: Vec<String>,
    /// 每次修改递增
    pub version: u64,
}

impl QueryPath {
    pub fn from_definition(id: PathId, def: PathDefinition, version: u64) -> Self {
        Self {
            id,
            name: def.name,
            source_type: def.source_type,
            target_type: def.target_type,
            traversal_template: def.traversal_template,
            value_data_type: def.value_data_type,
            choices: def.choices,
            version,
        }
    }
}

/// 创建 / 更新路径时提交的内容
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathDefinition {
    pub name: String,
    pub source_type: MetaType,
    pub target_type: MetaType,
    pub traversal_template: String,
    pub value_data_type: ValueDataType,
    #[serde(default)]
    pub choices: Vec<String>,
}

impl PathDefinition {
    pub fn new(
        name: impl Into<String>,
        source_type: impl Into<String>,
        target_type: impl Into<String>,
        traversal_template: impl Into<String>,
        value_data_type: ValueDataType,
    ) -> Self {
        Self {
            name: name.into(),
            source_type: source_type.into(),
            target_type: target_type.into(),
            traversal_template: traversal_template.into(),
            value_data_type,
            choices: Vec::new(),
        }
    }

    /// 设置枚举可选值
    pub fn with_choices<I, S>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.choices = choices.into_iter().map(Into::into).collect();
        self
    }

    /// 结构校验
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("name", &self.name),
            ("source_type", &self.source_type),
            ("target_type", &self.target_type),
            ("traversal_template", &self.traversal_template),
        ] {
            if value.trim().is_empty() {
                return Err(Error::TypeMismatch(format!("路径字段 {} 不能为空", field)));
            }
        }
        if !self.choices.is_empty() && self.value_data_type != ValueDataType::Enum {
            return Err(Error::TypeMismatch(format!(
                "只有 enum 路径可以声明 choices, 实际类型 {}",
                self.value_data_type
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_blank_fields() {
        let def = PathDefinition::new("p", "product", " ", "category", ValueDataType::String);
        assert!(def.validate().is_err());
    }

    #[test]
    fn test_choices_only_for_enum() {
        let def = PathDefinition::new("size", "product", "size", "size", ValueDataType::String)
            .with_choices(["s", "m"]);
        assert!(def.validate().is_err());

        let def = PathDefinition::new("size", "product", "size", "size", ValueDataType::Enum)
            .with_choices(["s", "m"]);
        assert!(def.validate().is_ok());
    }

    #[test]
    fn test_definition_from_json() {
        let def: PathDefinition = serde_json::from_str(
            r#"{"name":"category","source_type":"product","target_type":"category",
                "traversal_template":"category.name","value_data_type":"string"}"#,
        )
        .unwrap();
        assert_eq!(def.value_data_type, ValueDataType::String);
        assert!(def.choices.is_empty());
    }
}
