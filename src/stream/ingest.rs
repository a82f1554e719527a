//! 词条流入库管道
//!
//! ```text
//! 字节流 ──> [sse_events] ──> message 事件 ──┬─> [StreamingTextBuffer] ──> markdown 版本 ──> VersionCache
//!                                            └─> JSON 累积 ──> 结构化版本 ──────────────> VersionCache
//! ```
//!
//! 只有流正常结束时才写入缓存；服务端报错、读取失败或被取消时，
//! 已缓冲的部分文本直接丢弃。

use crate::config::StreamConfig;
use crate::logger::redact;
use crate::stream::error::StreamError;
use crate::stream::sse::{sse_events, SseStreamOptions};
use crate::stream::text_buffer::StreamingTextBuffer;
use crate::versions::{normalize_version, SetVersionsOptions, VersionCache, VersionMetadata};
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 入库模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IngestMode {
    /// 每个 message 事件是一段文本，拼接为 markdown
    #[default]
    Prose,
    /// message 事件拼接后是一个完整的 JSON 版本负载
    Structured,
}

/// 入库结果
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// 散文模式：写入的版本 id 和完整文本
    Prose { version_id: String, text: String },
    /// 结构化模式：写入的版本 id（按负载顺序）
    Structured { version_ids: Vec<String> },
}

type ProgressCallback<'a> = Box<dyn FnMut(&str) + Send + 'a>;

/// 词条流入库器
///
/// 每次查询创建一个实例，`run` 消费字节流直到结束。
pub struct StreamIngestor<'a> {
    cache: &'a VersionCache,
    term_key: String,
    mode: IngestMode,
    options: SseStreamOptions,
    on_progress: Option<ProgressCallback<'a>>,
}

impl<'a> StreamIngestor<'a> {
    pub fn new(cache: &'a VersionCache, term_key: impl Into<String>, mode: IngestMode) -> Self {
        Self {
            cache,
            term_key: term_key.into(),
            mode,
            options: StreamConfig::default().sse_options(),
            on_progress: None,
        }
    }

    /// 设置取消令牌（通常与发起请求的令牌相同）
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.options.cancel = Some(cancel);
        self
    }

    /// 设置 SSE 缓冲区上限
    pub fn with_max_buffer(mut self, max_buffer_bytes: usize) -> Self {
        self.options.max_buffer_bytes = max_buffer_bytes;
        self
    }

    /// 使用配置中的流式参数，保留已设置的取消令牌
    pub fn with_config(mut self, config: &StreamConfig) -> Self {
        self.options.max_buffer_bytes = config.max_buffer_bytes;
        self
    }

    /// 散文模式下每次追加后回调完整文本
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&str) + Send + 'a,
    {
        self.on_progress = Some(Box::new(callback));
        self
    }

    /// 消费字节流并写入缓存
    pub async fn run<S, E>(mut self, byte_stream: S) -> Result<IngestOutcome, StreamError>
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let events = sse_events(byte_stream, self.options.clone());
        let mut events = std::pin::pin!(events);

        let mut text = StreamingTextBuffer::new();
        let mut payload = String::new();

        while let Some(event) = events.next().await {
            let event = event?;

            if event.is_error() {
                warn!(
                    "[Ingest] 服务端报告错误 {}: {}",
                    self.term_key,
                    redact(&event.data)
                );
                return Err(StreamError::Producer(event.data));
            }
            if !event.is_message() {
                debug!("[Ingest] 忽略事件类型: {}", event.event);
                continue;
            }

            match self.mode {
                IngestMode::Prose => {
                    let full = text.append(&event.data);
                    if let Some(callback) = self.on_progress.as_mut() {
                        callback(full);
                    }
                }
                IngestMode::Structured => payload.push_str(&event.data),
            }
        }

        match self.mode {
            IngestMode::Prose => self.commit_prose(text.into_string()),
            IngestMode::Structured => self.commit_structured(&payload),
        }
    }

    fn commit_prose(&self, text: String) -> Result<IngestOutcome, StreamError> {
        if text.trim().is_empty() {
            return Err(StreamError::InvalidPayload("响应为空".to_string()));
        }

        let raw = json!({
            "markdown": text.as_str(),
            "createdAt": Utc::now().to_rfc3339(),
        });
        let version = normalize_version(&raw)
            .ok_or_else(|| StreamError::InvalidPayload("无法生成版本".to_string()))?;
        let version_id = version.id.clone();

        self.cache.set_word_versions(
            &self.term_key,
            &[version],
            SetVersionsOptions::default().with_active(version_id.clone()),
        );
        info!(
            "[Ingest] 写入 {} 版本 {} ({} 字节)",
            self.term_key,
            version_id,
            text.len()
        );

        Ok(IngestOutcome::Prose { version_id, text })
    }

    fn commit_structured(&self, payload: &str) -> Result<IngestOutcome, StreamError> {
        let value: Value = serde_json::from_str(payload)
            .map_err(|e| StreamError::InvalidPayload(format!("JSON 解析失败: {e}")))?;
        let parsed = parse_structured_payload(value)?;

        let version_ids: Vec<String> = parsed
            .versions
            .iter()
            .filter_map(normalize_version)
            .map(|v| v.id)
            .collect();
        if version_ids.is_empty() {
            return Err(StreamError::InvalidPayload("负载中没有有效版本".to_string()));
        }

        self.cache
            .set_versions(&self.term_key, &parsed.versions, parsed.options);
        info!(
            "[Ingest] 写入 {} 共 {} 个版本",
            self.term_key,
            version_ids.len()
        );

        Ok(IngestOutcome::Structured { version_ids })
    }
}

/// 结构化负载解析结果
struct StructuredPayload {
    versions: Vec<Value>,
    options: SetVersionsOptions,
}

/// 解析结构化负载
///
/// 支持三种形式：
/// - `{ "versions": [...], "metadata": {...}, "activeVersionId": "..." }`
/// - `[ {...}, {...} ]`
/// - 单个版本对象（写入后设为活跃版本）
fn parse_structured_payload(value: Value) -> Result<StructuredPayload, StreamError> {
    match value {
        Value::Array(versions) => Ok(StructuredPayload {
            versions,
            options: SetVersionsOptions::default(),
        }),
        Value::Object(mut object) if object.get("versions").map_or(false, Value::is_array) => {
            let versions = match object.remove("versions") {
                Some(Value::Array(versions)) => versions,
                _ => Vec::new(),
            };

            let mut options = SetVersionsOptions::default();
            if let Some(Value::Object(metadata)) = object.remove("metadata") {
                options.metadata = Some(VersionMetadata(metadata.into_iter().collect()));
            }
            if let Some(Value::String(active)) = object.remove("activeVersionId") {
                options.active_version_id = Some(active);
            }

            Ok(StructuredPayload { versions, options })
        }
        Value::Object(object) => {
            let value = Value::Object(object);
            let options = match normalize_version(&value) {
                Some(version) => SetVersionsOptions::default().with_active(version.id),
                None => SetVersionsOptions::default(),
            };
            Ok(StructuredPayload {
                versions: vec![value],
                options,
            })
        }
        other => Err(StreamError::InvalidPayload(format!(
            "不支持的负载类型: {other}"
        ))),
    }
}
