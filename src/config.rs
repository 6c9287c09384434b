//! 引擎配置
//!
//! 可从 TOML 文件加载，缺省字段使用默认值

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 默认子查询嵌套深度上限（边数）
pub const DEFAULT_MAX_DEPTH: usize = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 子查询展开深度上限
    pub max_depth: usize,
    /// 并行编译互不相关的子树
    pub parallel_compile: bool,
    /// 并行求值 AND / OR 分支
    pub parallel_execute: bool,
    /// 单次执行内缓存相同叶子的遍历结果
    pub leaf_cache: bool,
    /// 请求未指定 limit 时使用
    pub default_limit: Option<usize>,
    /// limit 上限
    pub max_limit: Option<usize>,
    /// 单次编译 + 执行的超时（毫秒）
    pub timeout_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            parallel_compile: true,
            parallel_execute: true,
            leaf_cache: true,
            default_limit: None,
            max_limit: None,
            timeout_ms: None,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: EngineConfig =
            toml::from_str(s).map_err(|e| Error::ConfigError(format!("解析配置失败: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("读取配置 {:?} 失败: {}", path, e)))?;
        Self::from_toml_str(&data)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// 结合默认值与上限，得到实际使用的 limit
    pub fn effective_limit(&self, requested: Option<usize>) -> Option<usize> {
        let limit = requested.or(self.default_limit);
        match (limit, self.max_limit) {
            (Some(l), Some(max)) => Some(l.min(max)),
            (None, Some(max)) => Some(max),
            (l, None) => l,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let (Some(default), Some(max)) = (self.default_limit, self.max_limit) {
            if default > max {
                return Err(Error::ConfigError(format!(
                    "default_limit {} 大于 max_limit {}",
                    default, max
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = EngineConfig::from_toml_str("max_depth = 4\ntimeout_ms = 250\n").unwrap();
        assert_eq!(config.max_depth, 4);
        assert_eq!(config.timeout(), Some(Duration::from_millis(250)));
        assert!(config.parallel_compile);
        assert!(config.leaf_cache);
    }

    #[test]
    fn test_invalid_limits_rejected() {
        let err = EngineConfig::from_toml_str("default_limit = 50\nmax_limit = 10\n");
        assert!(matches!(err, Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_effective_limit() {
        let config = EngineConfig {
            default_limit: Some(20),
            max_limit: Some(100),
            ..EngineConfig::default()
        };
        assert_eq!(config.effective_limit(None), Some(20));
        assert_eq!(config.effective_limit(Some(500)), Some(100));
        assert_eq!(EngineConfig::default().effective_limit(None), None);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "parallel_execute = false").unwrap();
        let config = EngineConfig::load(file.path()).unwrap();
        assert!(!config.parallel_execute);
        assert!(EngineConfig::load("/nonexistent/engine.toml").is_err());
    }
}
