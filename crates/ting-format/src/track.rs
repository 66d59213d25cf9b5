//! 轨道输出 (sink).
//!
//! 解封装器把帧数据分两步交给轨道输出: 先用 `sample_data` 追加字节,
//! 帧写完后再用 `sample_metadata` 标注时间戳与大小.

use std::collections::VecDeque;

use bitflags::bitflags;
use bytes::BytesMut;
use log::warn;
use ting_core::time::{MICROS_PER_SECOND, scale_large_timestamp};
use ting_core::{Rational, TingError, TingResult};

use crate::extractor::{ExtractorOutput, SeekMap};
use crate::io::IoContext;
use crate::packet::Packet;

bitflags! {
    /// 样本标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SampleFlags: u32 {
        /// 关键帧 (MPEG 音频的每一帧都是关键帧)
        const KEY_FRAME = 1 << 0;
    }
}

/// 音频轨道格式
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackFormat {
    /// 容器 MIME 类型
    pub container_mime_type: &'static str,
    /// 样本 MIME 类型 (`audio/mpeg-L1`, `audio/mpeg-L2`, `audio/mpeg`)
    pub sample_mime_type: &'static str,
    /// 单个样本的最大字节数
    pub max_input_size: usize,
    /// 声道数
    pub channels: u8,
    /// 采样率 (Hz)
    pub sample_rate: u32,
    /// 每帧采样数
    pub samples_per_frame: u32,
    /// 平均码率 (bps), 未知为 `None`
    pub average_bitrate: Option<u32>,
    /// 编码器延迟 (采样数)
    pub encoder_delay: u32,
    /// 编码器尾部填充 (采样数)
    pub encoder_padding: u32,
    /// 文本元数据
    pub metadata: Vec<(String, String)>,
}

/// 轨道输出
pub trait TrackOutput {
    /// 设置轨道格式
    fn format(&mut self, format: TrackFormat);

    /// 从输入追加最多 `max_len` 字节的样本数据, 返回实际追加量
    ///
    /// 输入已结束时, `allow_end_of_input` 为真则返回 `Ok(None)`,
    /// 否则返回 [`TingError::Eof`].
    fn sample_data(
        &mut self,
        input: &mut IoContext,
        max_len: usize,
        allow_end_of_input: bool,
    ) -> TingResult<Option<usize>>;

    /// 标注一个完整样本
    ///
    /// 样本由已追加数据中截止到倒数第 `offset` 字节的 `size` 字节组成.
    fn sample_metadata(&mut self, time_us: i64, flags: SampleFlags, size: usize, offset: usize);
}

/// 丢弃所有数据的轨道输出
///
/// 定位尚未追上目标时间时, 解封装器把样本写到这里.
#[derive(Debug, Default)]
pub struct DiscardingTrackOutput {
    scratch: Vec<u8>,
}

impl DiscardingTrackOutput {
    /// 丢弃时单次读取的最大字节数
    const SCRATCH_SIZE: usize = 4096;

    /// 创建丢弃输出
    pub fn new() -> Self {
        Self::default()
    }
}

impl TrackOutput for DiscardingTrackOutput {
    fn format(&mut self, _format: TrackFormat) {}

    fn sample_data(
        &mut self,
        input: &mut IoContext,
        max_len: usize,
        allow_end_of_input: bool,
    ) -> TingResult<Option<usize>> {
        if self.scratch.len() < Self::SCRATCH_SIZE {
            self.scratch.resize(Self::SCRATCH_SIZE, 0);
        }
        let len = max_len.min(Self::SCRATCH_SIZE);
        let n = input.read(&mut self.scratch[..len])?;
        if n == 0 && len > 0 {
            if allow_end_of_input {
                return Ok(None);
            }
            return Err(TingError::Eof);
        }
        Ok(Some(n))
    }

    fn sample_metadata(&mut self, _time_us: i64, _flags: SampleFlags, _size: usize, _offset: usize) {}
}

/// 已发布定位映射的快照
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekMapInfo {
    /// 是否支持定位
    pub seekable: bool,
    /// 总时长 (微秒)
    pub duration_us: Option<i64>,
}

/// 把样本组装成 [`Packet`] 的输出
///
/// 同时实现 [`ExtractorOutput`], 记录每一次定位映射发布.
#[derive(Debug, Default)]
pub struct PacketTrackOutput {
    /// 轨道格式
    format: Option<TrackFormat>,
    /// 尚未标注的样本数据
    pending: BytesMut,
    /// 当前样本首字节在输入中的位置
    pending_start: Option<u64>,
    /// 已完成的数据包
    packets: VecDeque<Packet>,
    /// 最近一次发布的定位映射
    seek_map: Option<SeekMapInfo>,
    /// 定位映射发布次数
    seek_map_publications: usize,
}

impl PacketTrackOutput {
    /// 创建空输出
    pub fn new() -> Self {
        Self::default()
    }

    /// 轨道格式 (解封装器完成同步前为 `None`)
    pub fn track_format(&self) -> Option<&TrackFormat> {
        self.format.as_ref()
    }

    /// 最近一次发布的定位映射
    pub fn seek_map_info(&self) -> Option<SeekMapInfo> {
        self.seek_map
    }

    /// 定位映射发布次数
    pub fn seek_map_publications(&self) -> usize {
        self.seek_map_publications
    }

    /// 取出最早完成的数据包
    pub fn pop_packet(&mut self) -> Option<Packet> {
        self.packets.pop_front()
    }

    /// 已完成但尚未取出的数据包数量
    pub fn queued_packets(&self) -> usize {
        self.packets.len()
    }

    /// 丢弃所有未完成与未取出的数据 (定位后调用)
    pub fn clear(&mut self) {
        self.pending.clear();
        self.pending_start = None;
        self.packets.clear();
    }

    fn frame_duration_us(&self) -> i64 {
        match &self.format {
            Some(f) if f.sample_rate > 0 => scale_large_timestamp(
                i64::from(f.samples_per_frame),
                MICROS_PER_SECOND,
                i64::from(f.sample_rate),
            ),
            _ => 0,
        }
    }
}

impl TrackOutput for PacketTrackOutput {
    fn format(&mut self, format: TrackFormat) {
        self.format = Some(format);
    }

    fn sample_data(
        &mut self,
        input: &mut IoContext,
        max_len: usize,
        allow_end_of_input: bool,
    ) -> TingResult<Option<usize>> {
        if self.pending.is_empty() {
            self.pending_start = Some(input.position());
        }
        let old_len = self.pending.len();
        self.pending.resize(old_len + max_len, 0);
        let n = match input.read(&mut self.pending[old_len..]) {
            Ok(n) => n,
            Err(e) => {
                self.pending.truncate(old_len);
                return Err(e);
            }
        };
        self.pending.truncate(old_len + n);
        if n == 0 && max_len > 0 {
            if allow_end_of_input {
                return Ok(None);
            }
            return Err(TingError::Eof);
        }
        Ok(Some(n))
    }

    fn sample_metadata(&mut self, time_us: i64, flags: SampleFlags, size: usize, offset: usize) {
        let Some(end) = self.pending.len().checked_sub(offset) else {
            warn!("样本偏移超出已追加数据: offset={offset}, pending={}", self.pending.len());
            return;
        };
        let Some(start) = end.checked_sub(size) else {
            warn!("样本大小超出已追加数据: size={size}, pending={}", self.pending.len());
            return;
        };
        let mut head = self.pending.split_to(end);
        let data = head.split_off(start).freeze();
        let pos = self.pending_start.map(|p| p + start as u64);
        self.pending_start = if self.pending.is_empty() {
            None
        } else {
            self.pending_start.map(|p| p + end as u64)
        };

        let mut packet = Packet::from_data(data);
        packet.pts = time_us;
        packet.dts = time_us;
        packet.duration = self.frame_duration_us();
        packet.time_base = Rational::MICRO;
        packet.is_keyframe = flags.contains(SampleFlags::KEY_FRAME);
        packet.pos = pos;
        self.packets.push_back(packet);
    }
}

impl ExtractorOutput for PacketTrackOutput {
    fn track(&mut self) -> &mut dyn TrackOutput {
        self
    }

    fn seek_map(&mut self, seek_map: &dyn SeekMap) {
        self.seek_map = Some(SeekMapInfo {
            seekable: seek_map.is_seekable(),
            duration_us: seek_map.duration_us(),
        });
        self.seek_map_publications += 1;
    }
}
