//! 流式处理层
//!
//! 将服务端推送的 SSE 字节流转换为词条版本，包括：
//! - SSE 事件解析 (sse)
//! - 流式文本拼接 (text_buffer)
//! - 入库管道 (ingest)
//!
//! # 架构设计
//!
//! ```text
//! HTTP 响应体 ──> [sse_events] ──> SseEvent ──> [StreamIngestor] ──> VersionCache
//!                                                  │
//!                                                  └─> [StreamingTextBuffer] (散文模式)
//! ```

pub mod error;
pub mod ingest;
pub mod sse;
pub mod text_buffer;

// 重新导出核心类型
pub use error::StreamError;
pub use ingest::{IngestMode, IngestOutcome, StreamIngestor};
pub use sse::{
    sse_events, SseDecoder, SseEvent, SseStreamOptions, DEFAULT_EVENT_TYPE, ERROR_EVENT_TYPE,
};
pub use text_buffer::StreamingTextBuffer;
