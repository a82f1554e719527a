//! SSE 事件流解析器
//!
//! 将原始字节流解析为有序的 `(event, data)` 事件序列。
//!
//! # 组成
//!
//! - `SseDecoder`: 同步的增量解码器，处理 UTF-8 跨 chunk 和事件分帧
//! - `sse_events`: 异步封装，持有底层读取流并支持外部取消
//!
//! ```text
//! 字节流 ──> [UTF-8 增量解码] ──> 缓冲区 ──> 按空行切分 ──> 逐行解析字段 ──> SseEvent
//! ```

use crate::stream::error::StreamError;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// 默认事件类型
pub const DEFAULT_EVENT_TYPE: &str = "message";

/// 服务端报告错误使用的事件类型
pub const ERROR_EVENT_TYPE: &str = "error";

/// 解析出的单个 SSE 事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// 事件类型（默认 `message`）
    pub event: String,
    /// 事件数据，多行 `data:` 以 `\n` 连接
    pub data: String,
}

impl SseEvent {
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
        }
    }

    /// 创建默认类型的消息事件
    pub fn message(data: impl Into<String>) -> Self {
        Self::new(DEFAULT_EVENT_TYPE, data)
    }

    /// 是否为服务端错误事件
    pub fn is_error(&self) -> bool {
        self.event == ERROR_EVENT_TYPE
    }

    /// 是否为默认类型的消息事件
    pub fn is_message(&self) -> bool {
        self.event == DEFAULT_EVENT_TYPE
    }
}

/// 增量 SSE 解码器
///
/// 每次 `push` 都会尽可能多地取出完整事件，剩余的半个事件留在缓冲区中。
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// 尚未构成完整 UTF-8 字符的尾部字节
    pending_bytes: Vec<u8>,
    /// 已解码但尚未组成完整事件的文本
    buffer: String,
    /// 已成功解码的字节数，用于报告错误偏移
    decoded_bytes: usize,
    /// 缓冲区上限（字节），0 表示不限制
    max_buffer_bytes: usize,
    /// 遇到非法 UTF-8 后记录的错误，之后的调用都返回该错误
    error: Option<StreamError>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建带缓冲区上限的解码器
    pub fn with_max_buffer(max_buffer_bytes: usize) -> Self {
        Self {
            max_buffer_bytes,
            ..Self::default()
        }
    }

    /// 处理一个字节块，返回其中所有完整的事件
    ///
    /// 块内出现非法 UTF-8 时，之前已完整的事件照常返回，错误在下一次
    /// `push` / `finish` 时报告（也可通过 `error()` 立即查询）
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<SseEvent>, StreamError> {
        if let Some(e) = &self.error {
            return Err(e.clone());
        }
        // 上一轮遗留的半个事件已超限：先报错，不丢弃已产出的事件
        self.check_overflow()?;

        self.decode(chunk);
        Ok(self.drain_events())
    }

    /// 流结束时调用，解析末尾缺少空行的残留事件
    pub fn finish(&mut self) -> Result<Option<SseEvent>, StreamError> {
        if let Some(e) = &self.error {
            return Err(e.clone());
        }
        self.check_overflow()?;
        if !self.pending_bytes.is_empty() {
            return Err(StreamError::InvalidUtf8 {
                offset: self.decoded_bytes,
            });
        }

        let residue = std::mem::take(&mut self.buffer);
        if residue.trim().is_empty() {
            return Ok(None);
        }

        Ok(parse_block(&residue).filter(|event| !event.data.is_empty()))
    }

    /// 当前缓冲区中尚未成帧的文本
    pub fn residue(&self) -> &str {
        &self.buffer
    }

    /// 已记录的解码错误
    pub fn error(&self) -> Option<&StreamError> {
        self.error.as_ref()
    }

    fn check_overflow(&self) -> Result<(), StreamError> {
        if self.max_buffer_bytes > 0 && self.buffer.len() > self.max_buffer_bytes {
            return Err(StreamError::BufferOverflow {
                limit: self.max_buffer_bytes,
            });
        }
        Ok(())
    }

    fn decode(&mut self, chunk: &[u8]) {
        self.pending_bytes.extend_from_slice(chunk);

        let (valid_up_to, invalid) = match std::str::from_utf8(&self.pending_bytes) {
            Ok(_) => (self.pending_bytes.len(), false),
            // error_len 为 None：多字节字符被截断在 chunk 边界，保留尾部等待下一块
            Err(e) => (e.valid_up_to(), e.error_len().is_some()),
        };

        // valid_up_to 之前的字节已验证为合法 UTF-8
        let valid: Vec<u8> = self.pending_bytes.drain(..valid_up_to).collect();
        self.buffer.push_str(&String::from_utf8_lossy(&valid));
        self.decoded_bytes += valid_up_to;

        if invalid {
            self.pending_bytes.clear();
            self.error = Some(StreamError::InvalidUtf8 {
                offset: self.decoded_bytes,
            });
        }
    }

    fn drain_events(&mut self) -> Vec<SseEvent> {
        let mut events = Vec::new();
        while let Some((end, separator_len)) = find_separator(&self.buffer) {
            let block: String = self.buffer.drain(..end + separator_len).collect();
            if let Some(event) = parse_block(&block[..end]) {
                events.push(event);
            }
        }
        events
    }
}

/// 查找第一个空行分隔符，返回 (块结束位置, 分隔符长度)
fn find_separator(buffer: &str) -> Option<(usize, usize)> {
    let lf = buffer.find("\n\n").map(|pos| (pos, 2));
    let crlf = buffer.find("\n\r\n").map(|pos| (pos, 3));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

/// 解析单个事件块
///
/// 类型为 `message` 且数据为空的事件（心跳等）返回 `None`
fn parse_block(block: &str) -> Option<SseEvent> {
    let mut event_type: Option<&str> = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in block.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            continue;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.trim_start()),
            None => (line, ""),
        };

        match field {
            "event" => {
                event_type = Some(value).filter(|v| !v.is_empty());
            }
            "data" => data_lines.push(value),
            // 注释行（字段为空）和未知字段忽略
            _ => {}
        }
    }

    let event = event_type.unwrap_or(DEFAULT_EVENT_TYPE);
    let data = data_lines.join("\n");
    if data.is_empty() && event == DEFAULT_EVENT_TYPE {
        return None;
    }

    Some(SseEvent::new(event, data))
}

/// 事件流选项
#[derive(Debug, Clone, Default)]
pub struct SseStreamOptions {
    /// 缓冲区上限（字节），0 表示不限制
    pub max_buffer_bytes: usize,
    /// 外部取消令牌
    pub cancel: Option<CancellationToken>,
}

impl SseStreamOptions {
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_max_buffer(mut self, max_buffer_bytes: usize) -> Self {
        self.max_buffer_bytes = max_buffer_bytes;
        self
    }
}

/// 底层读取流的持有者
///
/// 正常结束、出错、取消以及外层流被提前丢弃时都会释放底层流
struct ReaderGuard<S> {
    inner: Option<Pin<Box<S>>>,
}

impl<S, E> ReaderGuard<S>
where
    S: Stream<Item = Result<Bytes, E>>,
{
    fn new(stream: S) -> Self {
        Self {
            inner: Some(Box::pin(stream)),
        }
    }

    async fn next(&mut self) -> Option<Result<Bytes, E>> {
        match self.inner.as_mut() {
            Some(stream) => stream.next().await,
            None => None,
        }
    }

    fn release(&mut self) {
        if self.inner.take().is_some() {
            trace!("[SSE] 释放底层读取流");
        }
    }
}

impl<S> Drop for ReaderGuard<S> {
    fn drop(&mut self) {
        if self.inner.take().is_some() {
            trace!("[SSE] 释放底层读取流 (drop)");
        }
    }
}

/// 将字节流转换为 SSE 事件流
///
/// 错误（解码失败、读取失败、取消）都会作为最后一个元素返回，之后流结束。
pub fn sse_events<S, E>(
    byte_stream: S,
    options: SseStreamOptions,
) -> impl Stream<Item = Result<SseEvent, StreamError>>
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    async_stream::stream! {
        let mut decoder = SseDecoder::with_max_buffer(options.max_buffer_bytes);
        let mut reader = ReaderGuard::new(byte_stream);
        let cancel = options.cancel.unwrap_or_else(CancellationToken::new);

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                item = reader.next() => Some(item),
            };

            let Some(item) = next else {
                debug!("[SSE] 读取被取消，丢弃 {} 字节未成帧数据", decoder.residue().len());
                reader.release();
                yield Err(StreamError::Cancelled);
                return;
            };

            match item {
                Some(Ok(bytes)) => match decoder.push(&bytes) {
                    Ok(events) => {
                        for event in events {
                            yield Ok(event);
                        }
                        if let Some(e) = decoder.error().cloned() {
                            debug!("[SSE] 解码失败: {}", e);
                            reader.release();
                            yield Err(e);
                            return;
                        }
                    }
                    Err(e) => {
                        reader.release();
                        yield Err(e);
                        return;
                    }
                },
                Some(Err(e)) => {
                    reader.release();
                    yield Err(StreamError::Transport(e.to_string()));
                    return;
                }
                None => break,
            }
        }

        reader.release();
        match decoder.finish() {
            Ok(Some(event)) => yield Ok(event),
            Ok(None) => {}
            Err(e) => yield Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::task::{Context, Poll};

    fn decode_all(chunks: &[&[u8]]) -> Vec<SseEvent> {
        let mut decoder = SseDecoder::new();
        let mut events = Vec::new();
        for chunk in chunks {
            events.extend(decoder.push(chunk).unwrap());
        }
        events.extend(decoder.finish().unwrap());
        events
    }

    /// 被丢弃时设置标志位的字节流
    struct TrackedStream<S> {
        inner: S,
        dropped: Arc<AtomicBool>,
    }

    impl<S: Stream + Unpin> Stream for TrackedStream<S> {
        type Item = S::Item;

        fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            Pin::new(&mut self.inner).poll_next(cx)
        }
    }

    impl<S> Drop for TrackedStream<S> {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::SeqCst);
        }
    }

    fn tracked<S>(inner: S) -> (TrackedStream<S>, Arc<AtomicBool>) {
        let dropped = Arc::new(AtomicBool::new(false));
        (
            TrackedStream {
                inner,
                dropped: dropped.clone(),
            },
            dropped,
        )
    }

    fn ok_chunks(chunks: Vec<&'static [u8]>) -> Vec<Result<Bytes, std::io::Error>> {
        chunks
            .into_iter()
            .map(|c| Ok(Bytes::from_static(c)))
            .collect()
    }

    #[test]
    fn test_mixed_events_round_trip() {
        let events = decode_all(&[
            b"data: one\n\nevent: error\ndata: boom\n\ndata: multi\ndata: line\n\n",
        ]);
        assert_eq!(
            events,
            vec![
                SseEvent::message("one"),
                SseEvent::new("error", "boom"),
                SseEvent::message("multi\nline"),
            ]
        );
    }

    #[test]
    fn test_event_split_across_chunks() {
        let events = decode_all(&[b"da", b"ta: hel", b"lo\n", b"\nda", b"ta: x\n\n"]);
        assert_eq!(
            events,
            vec![SseEvent::message("hello"), SseEvent::message("x")]
        );
    }

    #[test]
    fn test_multibyte_char_split_across_chunks() {
        let bytes = "data: 你好\n\n".as_bytes();
        // "你" 占 3 字节，从中间切开
        let (a, b) = bytes.split_at(7);
        let events = decode_all(&[a, b]);
        assert_eq!(events, vec![SseEvent::message("你好")]);
    }

    #[test]
    fn test_crlf_line_endings() {
        let events = decode_all(&[b"event: update\r\ndata: a\r\ndata: b\r\n\r\n"]);
        assert_eq!(events, vec![SseEvent::new("update", "a\nb")]);
    }

    #[test]
    fn test_heartbeat_blocks_suppressed() {
        let events = decode_all(&[b": keep-alive\n\n\n\ndata:\n\ndata: real\n\n"]);
        assert_eq!(events, vec![SseEvent::message("real")]);
    }

    #[test]
    fn test_explicit_event_type_without_data_is_kept() {
        let events = decode_all(&[b"event: done\n\n"]);
        assert_eq!(events, vec![SseEvent::new("done", "")]);
    }

    #[test]
    fn test_leading_whitespace_after_colon_stripped() {
        let events = decode_all(&[b"data:   spaced\nid: 7\nretry: 10\n\n"]);
        assert_eq!(events, vec![SseEvent::message("spaced")]);
    }

    #[test]
    fn test_trailing_block_without_blank_line() {
        let events = decode_all(&[b"data: first\n\ndata: tail"]);
        assert_eq!(
            events,
            vec![SseEvent::message("first"), SseEvent::message("tail")]
        );
    }

    #[test]
    fn test_trailing_block_without_data_dropped() {
        let events = decode_all(&[b"data: first\n\nevent: done"]);
        assert_eq!(events, vec![SseEvent::message("first")]);
    }

    #[test]
    fn test_invalid_utf8_keeps_complete_events() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"data: ok\n\ndata: \xff\n\n").unwrap();
        assert_eq!(events, vec![SseEvent::message("ok")]);
        assert_eq!(
            decoder.error(),
            Some(&StreamError::InvalidUtf8 { offset: 16 })
        );

        assert_eq!(
            decoder.push(b"data: later\n\n").unwrap_err(),
            StreamError::InvalidUtf8 { offset: 16 }
        );
        assert_eq!(
            decoder.finish().unwrap_err(),
            StreamError::InvalidUtf8 { offset: 16 }
        );
    }

    #[test]
    fn test_invalid_utf8_offset_counts_previous_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: a\n\n").unwrap().len() == 1);
        assert!(decoder.push(b"data: \xc3\x28").unwrap().is_empty());
        assert_eq!(
            decoder.finish().unwrap_err(),
            StreamError::InvalidUtf8 { offset: 15 }
        );
    }

    #[test]
    fn test_truncated_utf8_at_end_is_error() {
        let mut decoder = SseDecoder::new();
        let bytes = "data: 好".as_bytes();
        decoder.push(&bytes[..bytes.len() - 1]).unwrap();
        assert!(matches!(
            decoder.finish(),
            Err(StreamError::InvalidUtf8 { .. })
        ));
    }

    #[test]
    fn test_buffer_overflow_reported_on_next_push() {
        let mut decoder = SseDecoder::with_max_buffer(8);
        let events = decoder.push(b"data: a\n\ndata: very long line").unwrap();
        assert_eq!(events, vec![SseEvent::message("a")]);
        assert_eq!(
            decoder.push(b"more").unwrap_err(),
            StreamError::BufferOverflow { limit: 8 }
        );
    }

    #[test]
    fn test_buffer_overflow_reported_on_finish() {
        let mut decoder = SseDecoder::with_max_buffer(8);
        assert!(decoder.push(b"data: very long line").unwrap().is_empty());
        assert_eq!(
            decoder.finish().unwrap_err(),
            StreamError::BufferOverflow { limit: 8 }
        );

        let mut decoder = SseDecoder::with_max_buffer(8);
        decoder.push(b"data: a").unwrap();
        assert_eq!(decoder.finish().unwrap(), Some(SseEvent::message("a")));
    }

    #[tokio::test]
    async fn test_sse_events_stream_yields_and_releases() {
        let (source, dropped) = tracked(stream::iter(ok_chunks(vec![
            b"data: one\n\nevent: err",
            b"or\ndata: boom\n\n",
            b"data: tail",
        ])));

        let events: Vec<_> = sse_events(source, SseStreamOptions::default())
            .collect()
            .await;

        assert_eq!(
            events,
            vec![
                Ok(SseEvent::message("one")),
                Ok(SseEvent::new("error", "boom")),
                Ok(SseEvent::message("tail")),
            ]
        );
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_sse_events_transport_error_propagates() {
        let (source, dropped) = tracked(stream::iter(vec![
            Ok(Bytes::from_static(b"data: one\n\n")),
            Err(std::io::Error::new(std::io::ErrorKind::Other, "reset")),
        ]));
        let mut events = Box::pin(sse_events(source, SseStreamOptions::default()));

        assert_eq!(events.next().await, Some(Ok(SseEvent::message("one"))));
        assert_eq!(
            events.next().await,
            Some(Err(StreamError::Transport("reset".to_string())))
        );
        // 错误返回时底层流已释放，不必等外层流被丢弃
        assert!(dropped.load(Ordering::SeqCst));
        assert_eq!(events.next().await, None);
    }

    #[tokio::test]
    async fn test_sse_events_invalid_utf8_yields_events_then_error() {
        let (source, dropped) = tracked(
            stream::iter(ok_chunks(vec![b"data: ok\n\ndata: \xff\n\n"])).chain(stream::pending()),
        );
        let mut events = Box::pin(sse_events(source, SseStreamOptions::default()));

        assert_eq!(events.next().await, Some(Ok(SseEvent::message("ok"))));
        assert_eq!(
            events.next().await,
            Some(Err(StreamError::InvalidUtf8 { offset: 16 }))
        );
        assert!(dropped.load(Ordering::SeqCst));
        assert_eq!(events.next().await, None);
    }

    #[tokio::test]
    async fn test_sse_events_overflow_releases_reader() {
        let (source, dropped) = tracked(stream::iter(ok_chunks(vec![
            b"data: a\n\ndata: very long line",
            b"more",
        ])));
        let options = SseStreamOptions::default().with_max_buffer(8);
        let mut events = Box::pin(sse_events(source, options));

        assert_eq!(events.next().await, Some(Ok(SseEvent::message("a"))));
        assert_eq!(
            events.next().await,
            Some(Err(StreamError::BufferOverflow { limit: 8 }))
        );
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_sse_events_cancel_releases_reader() {
        let (source, dropped) = tracked(
            stream::iter(ok_chunks(vec![b"data: one\n\ndata: partial"]))
                .chain(stream::pending()),
        );
        let cancel = CancellationToken::new();
        let options = SseStreamOptions::default().with_cancel(cancel.clone());
        let mut events = Box::pin(sse_events(source, options));

        assert_eq!(events.next().await, Some(Ok(SseEvent::message("one"))));

        cancel.cancel();
        assert_eq!(events.next().await, Some(Err(StreamError::Cancelled)));
        assert!(dropped.load(Ordering::SeqCst));
        assert_eq!(events.next().await, None);
    }

    #[tokio::test]
    async fn test_dropping_event_stream_releases_reader() {
        let (source, dropped) = tracked(
            stream::iter(ok_chunks(vec![b"data: one\n\n"])).chain(stream::pending()),
        );
        let mut events = Box::pin(sse_events(source, SseStreamOptions::default()));
        assert_eq!(events.next().await, Some(Ok(SseEvent::message("one"))));

        drop(events);
        assert!(dropped.load(Ordering::SeqCst));
    }
}
