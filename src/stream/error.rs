//! 流式错误类型
//!
//! 定义 SSE 解析与入库过程中可能发生的错误

use thiserror::Error;

/// 流处理错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// UTF-8 解码失败（字节偏移为相对整个流的位置）
    #[error("UTF-8 解码失败: 偏移 {offset}")]
    InvalidUtf8 { offset: usize },

    /// 底层字节流读取失败
    #[error("读取流失败: {0}")]
    Transport(String),

    /// 服务端通过 `event: error` 报告的错误
    #[error("{0}")]
    Producer(String),

    /// 等待事件分隔符时缓冲区超出上限
    #[error("SSE 缓冲区溢出: 超过 {limit} 字节仍未收到完整事件")]
    BufferOverflow { limit: usize },

    /// 结构化模式下的负载不是合法的词条版本
    #[error("无效的词条负载: {0}")]
    InvalidPayload(String),

    /// 读取被外部取消
    #[error("流已取消")]
    Cancelled,
}

impl StreamError {
    /// 是否需要展示给用户
    ///
    /// 取消是调用方主动行为，不属于失败
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, StreamError::Cancelled)
    }

    /// 获取错误类型字符串
    pub fn error_type(&self) -> &'static str {
        match self {
            StreamError::InvalidUtf8 { .. } => "invalid_utf8",
            StreamError::Transport(_) => "transport_error",
            StreamError::Producer(_) => "producer_error",
            StreamError::BufferOverflow { .. } => "buffer_overflow",
            StreamError::InvalidPayload(_) => "invalid_payload",
            StreamError::Cancelled => "cancelled",
        }
    }
}
