//! 流信息定义.

use ting_core::Rational;

/// 流信息
///
/// 描述容器中的一条音频流.
#[derive(Debug, Clone)]
pub struct Stream {
    /// 流索引 (从 0 开始)
    pub index: usize,
    /// 样本 MIME 类型, 如 `audio/mpeg`
    pub mime_type: &'static str,
    /// 时间基
    pub time_base: Rational,
    /// 流时长 (以 time_base 为单位), `None` 表示未知
    pub duration: Option<i64>,
    /// 起始时间 (以 time_base 为单位)
    pub start_time: i64,
    /// 音频参数
    pub params: AudioStreamParams,
    /// 元数据 (标题, 艺术家等)
    pub metadata: Vec<(String, String)>,
}

/// 音频流参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioStreamParams {
    /// 采样率 (Hz)
    pub sample_rate: u32,
    /// 声道数
    pub channels: u8,
    /// 码率 (bps), `None` 表示未知
    pub bit_rate: Option<u32>,
    /// 每帧采样数 (MP3 为 1152 或 576)
    pub frame_size: u32,
    /// 编码器延迟 (采样数)
    pub encoder_delay: u32,
    /// 编码器尾部填充 (采样数)
    pub encoder_padding: u32,
}
