//! 统一错误类型定义.
//!
//! 所有 Ting crate 共用的错误类型, 支持跨模块传播.

use thiserror::Error;

/// Ting 统一错误类型
#[derive(Debug, Error)]
pub enum TingError {
    /// 无效参数
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 不支持的操作
    #[error("不支持的操作: {0}")]
    Unsupported(String),

    /// 容器结构损坏, 无法继续解析此流
    ///
    /// 例如在同步预算内找不到连续匹配的帧头.
    #[error("容器格式损坏: {0}")]
    MalformedContainer(String),

    /// I/O 错误
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 已到达流末尾
    #[error("已到达流末尾")]
    Eof,

    /// 未找到指定的容器格式
    #[error("未找到容器格式: {0}")]
    FormatNotFound(String),

    /// 未找到指定的流
    #[error("未找到流: 索引 {0}")]
    StreamNotFound(usize),

    /// 无效数据 (损坏的码流等)
    #[error("无效数据: {0}")]
    InvalidData(String),

    /// 内部错误 (不应发生)
    #[error("内部错误: {0}")]
    Internal(String),
}

/// Ting 统一 Result 类型
pub type TingResult<T> = Result<T, TingError>;
