//! 压缩数据包 (Packet).
//!
//! 每个数据包对应一个完整的 MPEG 音频帧.

use bytes::Bytes;
use ting_core::Rational;

/// 压缩数据包
#[derive(Debug, Clone)]
pub struct Packet {
    /// 帧数据 (含 4 字节帧头)
    pub data: Bytes,
    /// 显示时间戳 (PTS)
    pub pts: i64,
    /// 解码时间戳 (DTS), 音频与 PTS 相同
    pub dts: i64,
    /// 数据包时长 (以 time_base 为单位)
    pub duration: i64,
    /// 时间基
    pub time_base: Rational,
    /// 所属流的索引
    pub stream_index: usize,
    /// 是否为关键帧
    pub is_keyframe: bool,
    /// 在容器中的字节偏移量, `None` 表示未知
    pub pos: Option<u64>,
}

impl Packet {
    /// 从数据创建数据包, 时间基为微秒
    pub fn from_data(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            pts: 0,
            dts: 0,
            duration: 0,
            time_base: Rational::MICRO,
            stream_index: 0,
            is_keyframe: false,
            pos: None,
        }
    }

    /// 数据大小 (字节)
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// 是否为空包
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 以秒表示的 PTS
    pub fn pts_seconds(&self) -> f64 {
        self.time_base.ticks_to_seconds(self.pts)
    }
}
