//! Lexicache 词条流式入库与版本缓存
//!
//! 词典客户端的核心数据层：
//! - 解析服务端推送的 SSE 字节流 (`stream::sse`)
//! - 把任意切分的文本片段拼接为间距正确的正文 (`stream::text_buffer`)
//! - 合并多个词条版本并决定活跃版本 (`versions`)
//!
//! HTTP/认证、界面渲染和历史记录持久化不在本 crate 范围内。

pub mod config;
pub mod logger;
pub mod stream;
pub mod versions;

pub use config::{ConfigError, LexicacheConfig, LoggingConfig, StreamConfig};
pub use stream::{
    sse_events, IngestMode, IngestOutcome, SseDecoder, SseEvent, SseStreamOptions,
    StreamError, StreamIngestor, StreamingTextBuffer,
};
pub use versions::{
    term_key, ActiveVersionStrategy, CacheEvent, CacheRecord, Flavor, LatestTimestampStrategy,
    SetVersionsOptions, VersionCache, VersionMetadata, WordVersion,
};
