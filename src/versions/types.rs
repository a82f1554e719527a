//! 词条版本数据模型

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// 词条版本
///
/// 一次查询得到的词条渲染结果。除 `id` 和 `createdAt` 之外的字段
/// （markdown 文本、结构化释义等）原样保存在 `payload` 中。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordVersion {
    /// 稳定标识，保证非空
    pub id: String,
    /// ISO-8601 创建时间，可能缺失
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    /// 其余字段
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl WordVersion {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at: None,
            payload: Map::new(),
        }
    }

    pub fn with_created_at(mut self, created_at: impl Into<String>) -> Self {
        self.created_at = Some(created_at.into());
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }

    /// markdown 正文（如果有）
    pub fn markdown(&self) -> Option<&str> {
        self.payload.get("markdown").and_then(Value::as_str)
    }

    /// 转换回原始 JSON 形式
    pub fn to_value(&self) -> Value {
        let mut object = self.payload.clone();
        object.insert("id".to_string(), Value::String(self.id.clone()));
        if let Some(created_at) = &self.created_at {
            object.insert("createdAt".to_string(), Value::String(created_at.clone()));
        }
        Value::Object(object)
    }
}

impl From<WordVersion> for Value {
    fn from(version: WordVersion) -> Self {
        version.to_value()
    }
}

/// 版本元数据
///
/// 服务端提供的提示信息（如 `latestVersionId`），仅作为活跃版本解析的参考。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionMetadata(pub BTreeMap<String, Value>);

impl VersionMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn latest_version_id(&self) -> Option<String> {
        self.id_hint("latestVersionId")
    }

    pub fn active_version_id(&self) -> Option<String> {
        self.id_hint("activeVersionId")
    }

    /// 字符串或数字形式的 id 提示
    fn id_hint(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// 缓存记录
///
/// 每个 term-key 对应一条。`versions` 中 id 唯一且非空；
/// `active_version_id` 为 `None` 或指向 `versions` 中存在的版本。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    pub versions: Vec<WordVersion>,
    #[serde(default)]
    pub metadata: VersionMetadata,
    #[serde(rename = "activeVersionId")]
    pub active_version_id: Option<String>,
}

impl CacheRecord {
    /// 按 id 查找版本
    pub fn version(&self, id: &str) -> Option<&WordVersion> {
        self.versions.iter().find(|v| v.id == id)
    }

    /// 当前活跃版本
    pub fn active_version(&self) -> Option<&WordVersion> {
        self.active_version_id
            .as_deref()
            .and_then(|id| self.version(id))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.version(id).is_some()
    }
}

/// `setVersions` 的可选参数
#[derive(Debug, Clone, Default)]
pub struct SetVersionsOptions {
    /// 调用方明确指定的活跃版本
    pub active_version_id: Option<String>,
    /// 随本次版本一起下发的元数据
    pub metadata: Option<VersionMetadata>,
}

impl SetVersionsOptions {
    pub fn with_active(mut self, id: impl Into<String>) -> Self {
        self.active_version_id = Some(id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: VersionMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}
