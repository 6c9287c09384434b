//! 错误类型定义

use crate::types::{PathId, QueryId};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("未找到: {0}")]
    NotFound(String),

    #[error("检测到子查询环: {}", format_cycle(.path))]
    CycleDetected { path: Vec<QueryId> },

    #[error("子查询嵌套深度超过上限 {limit}")]
    DepthExceeded { limit: usize },

    #[error("未知路径: {0}")]
    UnknownPath(PathId),

    #[error("类型不匹配: {0}")]
    TypeMismatch(String),

    #[error("操作符 {lookup} 的取值个数无效: 期望 {expected}, 实际 {actual}")]
    InvalidOperatorArity {
        lookup: String,
        expected: &'static str,
        actual: usize,
    },

    #[error("操作已取消")]
    Cancelled,

    #[error("查询 {id} 仍被其他查询引用: {referenced_by:?}")]
    ReferencedByOthers {
        id: QueryId,
        referenced_by: Vec<QueryId>,
    },

    #[error("路径 {id} 仍被查询引用: {referenced_by:?}")]
    PathInUse {
        id: PathId,
        referenced_by: Vec<QueryId>,
    },

    #[error("名称已存在: {0}")]
    DuplicateName(String),

    #[error("路径 {path_id} 遍历失败: {source}")]
    Traversal {
        path_id: PathId,
        #[source]
        source: Box<Error>,
    },

    #[error("无效的标识符: {0}")]
    InvalidToken(String),

    #[error("存储错误: {0}")]
    StorageError(String),

    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("导入错误: {0}")]
    ImportError(String),

    #[error("序列化错误: {0}")]
    SerializationError(String),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),
}

impl Error {
    /// 将遍历后端返回的错误标记上失败叶子的路径 ID
    pub fn traversal(path_id: PathId, source: Error) -> Self {
        Error::Traversal {
            path_id,
            source: Box::new(source),
        }
    }
}

fn format_cycle(path: &[QueryId]) -> String {
    path.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_lists_ids() {
        let err = Error::CycleDetected {
            path: vec![QueryId::new(1), QueryId::new(2), QueryId::new(1)],
        };
        assert!(err.to_string().ends_with("q1 -> q2 -> q1"));
    }

    #[test]
    fn test_traversal_keeps_source() {
        let err = Error::traversal(PathId::new(7), Error::StorageError("磁盘故障".into()));
        match &err {
            Error::Traversal { path_id, source } => {
                assert_eq!(*path_id, PathId::new(7));
                assert!(matches!(**source, Error::StorageError(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(std::error::Error::source(&err).is_some());
    }
}
