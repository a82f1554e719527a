//! 配置管理
//!
//! 从 YAML 文件加载配置，所有字段都有默认值，缺失的字段和缺失的文件都使用默认配置。

use crate::stream::SseStreamOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 默认 SSE 缓冲区上限：1 MiB
const DEFAULT_MAX_BUFFER_BYTES: usize = 1024 * 1024;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 读取配置文件失败
    #[error("读取配置文件失败: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 配置解析失败
    #[error("配置解析失败: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// 无效的日志级别
    #[error("无效的日志级别: {0}")]
    InvalidLogLevel(String),
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别：trace / debug / info / warn / error
    pub level: String,
    /// 是否对服务端消息脱敏后再记录
    pub sanitize: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            sanitize: true,
        }
    }
}

/// 流式处理配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// SSE 缓冲区上限（字节），0 表示不限制
    pub max_buffer_bytes: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_buffer_bytes: DEFAULT_MAX_BUFFER_BYTES,
        }
    }
}

impl StreamConfig {
    /// 转换为事件流选项（不含取消令牌）
    pub fn sse_options(&self) -> SseStreamOptions {
        SseStreamOptions::default().with_max_buffer(self.max_buffer_bytes)
    }
}

/// 全局配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LexicacheConfig {
    pub logging: LoggingConfig,
    pub stream: StreamConfig,
}

impl LexicacheConfig {
    /// 从 YAML 字符串解析
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// 从文件加载
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    /// 从文件加载，文件不存在时使用默认配置
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("[Config] 配置文件不存在，使用默认配置: {}", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// 默认配置文件路径: <config_dir>/lexicache/config.yaml
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("lexicache")
            .join("config.yaml")
    }

    /// 序列化为 YAML
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }
}
