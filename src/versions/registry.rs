//! 版本注册表
//!
//! 无状态的纯函数：规范化原始版本、合并版本集合与元数据、解析活跃版本。

use crate::versions::types::{VersionMetadata, WordVersion};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt::{self, Write as _};
use tracing::debug;

/// 备选 id 字段，按优先级排列
const ALIAS_ID_FIELDS: &[&str] = &["versionId", "version_id"];
/// 嵌套元数据中的 id 字段
const NESTED_ID_FIELDS: &[&str] = &["id", "versionId"];

// ========== 规范化 ==========

/// 规范化原始版本列表
///
/// 过滤 `null` 和非对象元素，为每个版本推导稳定的 id，其余字段原样保留。
/// 输出顺序与输入一致，对已规范化的列表再次调用结果不变。
pub fn normalize_versions(raw: &[Value]) -> Vec<WordVersion> {
    raw.iter().filter_map(normalize_version).collect()
}

/// 规范化单个原始版本，`null` 或非对象返回 `None`
pub fn normalize_version(raw: &Value) -> Option<WordVersion> {
    let object = match raw {
        Value::Object(object) => object,
        Value::Null => return None,
        other => {
            debug!("[Registry] 丢弃非对象版本: {}", type_name(other));
            return None;
        }
    };

    let id = derive_id(object).unwrap_or_else(|| fallback_id(raw));

    let mut payload = object.clone();
    payload.remove("id");
    let created_at = match payload.remove("createdAt") {
        Some(value) => created_at_from(&value),
        None => object.get("created_at").and_then(created_at_from),
    };

    Some(WordVersion {
        id,
        created_at,
        payload,
    })
}

fn derive_id(object: &Map<String, Value>) -> Option<String> {
    if let Some(id) = object.get("id").and_then(id_from) {
        return Some(id);
    }

    if let Some(id) = ALIAS_ID_FIELDS
        .iter()
        .find_map(|field| object.get(*field).and_then(id_from))
    {
        return Some(id);
    }

    let nested = object.get("metadata")?.as_object()?;
    NESTED_ID_FIELDS
        .iter()
        .find_map(|field| nested.get(*field).and_then(id_from))
}

fn id_from(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// 没有任何 id 候选时，用内容摘要生成确定性的 id
fn fallback_id(raw: &Value) -> String {
    let canonical = raw.to_string();
    let digest = Sha256::digest(canonical.as_bytes());
    let mut id = String::with_capacity(18);
    id.push_str("v-");
    for byte in &digest[..8] {
        let _ = write!(id, "{byte:02x}");
    }
    id
}

fn created_at_from(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        // 数字按毫秒时间戳处理
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|dt| dt.to_rfc3339()),
        _ => None,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ========== 合并 ==========

/// 合并版本集合
///
/// 新版本在前（保持给定顺序），随后是 id 未被覆盖的旧版本（保持原相对顺序）。
/// id 冲突时新版本的字段生效；同一列表内重复的 id 保留第一次出现的版本。
pub fn merge_version_collections(
    existing: &[WordVersion],
    incoming: &[WordVersion],
) -> Vec<WordVersion> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(existing.len() + incoming.len());
    let mut merged = Vec::with_capacity(existing.len() + incoming.len());

    for version in incoming.iter().chain(existing.iter()) {
        if seen.insert(version.id.as_str()) {
            merged.push(version.clone());
        }
    }

    merged
}

/// 浅合并元数据，新值覆盖旧值
pub fn merge_metadata(
    existing: &VersionMetadata,
    incoming: Option<&VersionMetadata>,
) -> VersionMetadata {
    let mut merged = existing.clone();
    if let Some(incoming) = incoming {
        for (key, value) in &incoming.0 {
            merged.0.insert(key.clone(), value.clone());
        }
    }
    merged
}

// ========== 活跃版本解析 ==========

/// 活跃版本解析上下文
#[derive(Debug, Clone, Copy)]
pub struct ResolutionContext<'a> {
    /// 候选版本
    pub versions: &'a [WordVersion],
    /// 调用方明确指定的 id
    pub preferred_id: Option<&'a str>,
    /// 记录当前的活跃 id
    pub current_active_id: Option<&'a str>,
    /// 服务端元数据提示
    pub metadata: &'a VersionMetadata,
}

impl<'a> ResolutionContext<'a> {
    pub fn new(versions: &'a [WordVersion], metadata: &'a VersionMetadata) -> Self {
        Self {
            versions,
            preferred_id: None,
            current_active_id: None,
            metadata,
        }
    }

    pub fn preferred(mut self, id: Option<&'a str>) -> Self {
        self.preferred_id = id;
        self
    }

    pub fn current(mut self, id: Option<&'a str>) -> Self {
        self.current_active_id = id;
        self
    }

    /// id 是否存在于候选版本中
    pub fn contains(&self, id: &str) -> bool {
        self.versions.iter().any(|v| v.id == id)
    }
}

/// 活跃版本选择策略
pub trait ActiveVersionStrategy: Send + Sync + fmt::Debug {
    /// 选出活跃版本 id
    fn pick(&self, ctx: &ResolutionContext<'_>) -> Option<String>;
}

/// 按优先级解析活跃版本，最终结果一定存在于候选版本中
pub fn resolve_active_version_id(
    strategy: &dyn ActiveVersionStrategy,
    ctx: &ResolutionContext<'_>,
) -> Option<String> {
    strategy.pick(ctx).filter(|id| ctx.contains(id))
}

/// 默认策略：显式指定 > 当前活跃 > latestVersionId > activeVersionId > 最新创建时间
#[derive(Debug, Clone, Copy, Default)]
pub struct LatestTimestampStrategy;

impl ActiveVersionStrategy for LatestTimestampStrategy {
    fn pick(&self, ctx: &ResolutionContext<'_>) -> Option<String> {
        if ctx.versions.is_empty() {
            return None;
        }

        let hints = [
            ctx.preferred_id.map(str::to_string),
            ctx.current_active_id.map(str::to_string),
            ctx.metadata.latest_version_id(),
            ctx.metadata.active_version_id(),
        ];
        if let Some(id) = hints.into_iter().flatten().find(|id| ctx.contains(id)) {
            return Some(id);
        }

        latest_by_created_at(ctx.versions).map(|v| v.id.clone())
    }
}

/// 创建时间最新的版本
///
/// 无法解析的时间排在最后，时间相同时取靠前的版本
pub fn latest_by_created_at(versions: &[WordVersion]) -> Option<&WordVersion> {
    let mut best: Option<(&WordVersion, Option<i64>)> = None;
    for version in versions {
        let ts = version.created_at.as_deref().and_then(parse_timestamp);
        match best {
            Some((_, best_ts)) if ts <= best_ts => {}
            _ => best = Some((version, ts)),
        }
    }
    best.map(|(version, _)| version)
}

/// 解析时间戳为毫秒
///
/// 支持 RFC 3339、无时区的日期时间（按 UTC）和纯日期
pub fn parse_timestamp(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp_millis());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
}
