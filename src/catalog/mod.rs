//! 路径目录
//!
//! 已声明的关系路径，可按 ID 或唯一名称查找

mod path;

pub use path::{PathDefinition, QueryPath};

use crate::error::{Error, Result};
use crate::types::PathId;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;

/// 纯查找表，修改统一经由定义存储
#[derive(Debug, Clone, Default)]
pub struct PathCatalog {
    paths: IndexMap<PathId, Arc<QueryPath>>,
    names: HashMap<String, PathId>,
}

impl PathCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按 ID 取路径
    pub fn get(&self, id: PathId) -> Option<&Arc<QueryPath>> {
        self.paths.get(&id)
    }

    /// 按 ID 取路径，缺失时返回 `NotFound`
    pub fn resolve(&self, id: PathId) -> Result<Arc<QueryPath>> {
        self.paths
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("路径 {}", id)))
    }

    /// 按唯一名称查找
    pub fn by_name(&self, name: &str) -> Option<&Arc<QueryPath>> {
        self.names.get(name).and_then(|id| self.paths.get(id))
    }

    pub fn contains(&self, id: PathId) -> bool {
        self.paths.contains_key(&id)
    }

    /// 注册新路径，名称重复时失败
    pub fn insert(&mut self, path: QueryPath) -> Result<()> {
        if self.names.contains_key(&path.name) {
            return Err(Error::DuplicateName(path.name));
        }
        self.names.insert(path.name.clone(), path.id);
        self.paths.insert(path.id, Arc::new(path));
        Ok(())
    }

    /// 原位替换已有路径，保持注册顺序
    pub fn replace(&mut self, path: QueryPath) -> Result<()> {
        let old_name = match self.paths.get(&path.id) {
            Some(old) => old.name.clone(),
            None => return Err(Error::NotFound(format!("路径 {}", path.id))),
        };
        if old_name != path.name {
            if self.names.contains_key(&path.name) {
                return Err(Error::DuplicateName(path.name));
            }
            self.names.remove(&old_name);
            self.names.insert(path.name.clone(), path.id);
        }
        self.paths.insert(path.id, Arc::new(path));
        Ok(())
    }

    /// 删除路径，存在时返回它
    pub fn remove(&mut self, id: PathId) -> Option<Arc<QueryPath>> {
        let removed = self.paths.shift_remove(&id)?;
        self.names.remove(&removed.name);
        Some(removed)
    }

    /// 按注册顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = &Arc<QueryPath>> {
        self.paths.values()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ValueDataType;

    fn path(id: u64, name: &str) -> QueryPath {
        QueryPath::from_definition(
            PathId::new(id),
            PathDefinition::new(name, "product", "category", "category.name", ValueDataType::String),
            1,
        )
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut catalog = PathCatalog::new();
        catalog.insert(path(1, "category")).unwrap();
        catalog.insert(path(2, "brand")).unwrap();

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.by_name("brand").unwrap().id, PathId::new(2));
        assert!(matches!(catalog.resolve(PathId::new(9)), Err(Error::NotFound(_))));
        let names: Vec<_> = catalog.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["category", "brand"]);
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut catalog = PathCatalog::new();
        catalog.insert(path(1, "category")).unwrap();
        assert!(matches!(
            catalog.insert(path(2, "category")),
            Err(Error::DuplicateName(_))
        ));
    }

    #[test]
    fn test_replace_renames_index() {
        let mut catalog = PathCatalog::new();
        catalog.insert(path(1, "category")).unwrap();
        catalog.replace(path(1, "kind")).unwrap();
        assert!(catalog.by_name("category").is_none());
        assert!(catalog.by_name("kind").is_some());

        catalog.remove(PathId::new(1)).unwrap();
        assert!(catalog.is_empty());
        assert!(catalog.by_name("kind").is_none());
    }
}
