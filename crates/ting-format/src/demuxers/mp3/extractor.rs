//! MP3 流式解封装状态机.
//!
//! 解封装器逐步推进: 先在帧网格上同步 (连续 4 个帧头互相匹配),
//! 然后根据首帧与 ID3 元数据选出唯一的定位器, 发布轨道格式与定位映射,
//! 之后逐帧把数据交给轨道输出, 时间戳由已读采样数推算.
//!
//! ```text
//! [ID3v2 标签 (可选, 可多个)]
//! [Xing/Info/VBRI 头帧 (可选)]
//! [MPEG 音频帧 #0] [MPEG 音频帧 #1] ...
//! ```

use bitflags::bitflags;
use byteorder::{BigEndian, ByteOrder};
use log::{debug, trace};
use ting_core::time::{MICROS_PER_SECOND, scale_large_timestamp};
use ting_core::{TingError, TingResult};

use super::gapless::GaplessInfo;
use super::header::{self, MAX_FRAME_SIZE, MpegAudioHeader};
use super::seeker::{
    ConstantBitrateSeeker, IndexSeeker, MlltSeeker, Mp3Seeker, Seeker, UnseekableSeeker,
    VBRI_OFFSET, VbriSeeker, XingSeeker,
};
use crate::extractor::{ExtractorOutput, ReadResult, SeekMap};
use crate::id3::{self, Id3Tag};
use crate::io::IoContext;
use crate::track::{DiscardingTrackOutput, SampleFlags, TrackFormat, TrackOutput};

bitflags! {
    /// 解封装器配置
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Mp3Flags: u32 {
        /// 找不到可用定位信息时按恒定码率定位
        const ENABLE_CONSTANT_BITRATE_SEEKING = 1 << 0;
        /// 读取过程中建立索引并用于定位, 优先于流内定位信息
        const ENABLE_INDEX_SEEKING = 1 << 1;
        /// 只解码定位与无缝播放所需的 ID3 帧, 不发布元数据
        const DISABLE_ID3_METADATA = 1 << 2;
        /// 长度未知时也允许恒定码率定位 (隐含 `ENABLE_CONSTANT_BITRATE_SEEKING`)
        const ENABLE_CONSTANT_BITRATE_SEEKING_ALWAYS = 1 << 3;
    }
}

/// 容器 MIME 类型
pub const CONTAINER_MIME_TYPE: &str = "audio/mpeg";

/// 稳态同步时最多搜索的字节数
const MAX_SYNC_BYTES: usize = 128 * 1024;

/// 探测时最多搜索的字节数
const MAX_SNIFF_BYTES: usize = 32 * 1024;

/// 判定同步成功所需的连续匹配帧头数
const MIN_MATCHING_FRAME_HEADERS: u32 = 4;

/// LAME 延迟/填充字段相对 Xing 头的偏移
const LAME_GAPLESS_OFFSET: usize = 141;

/// 样本数据的去向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SampleRoute {
    /// 交给调用方的轨道输出
    Real,
    /// 索引定位追赶目标时间, 数据被丢弃
    Skipping,
}

/// 首帧中的定位头类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SeekFrameHeader {
    Xing,
    Info,
    Vbri,
}

/// MP3 解封装器
#[derive(Debug)]
pub struct Mp3Extractor {
    flags: Mp3Flags,
    /// 强制的首个样本时间戳 (微秒)
    forced_first_sample_timestamp_us: Option<i64>,
    seeking_disabled: bool,

    /// 已同步的帧头, 0 表示尚未同步
    synchronized_header_data: u32,
    synchronized_header: Option<MpegAudioHeader>,
    metadata: Option<Id3Tag>,
    gapless: Option<GaplessInfo>,
    seeker: Option<Mp3Seeker>,

    /// 首个样本的时间基准, 定位或同步后首帧时确定
    basis_time_us: Option<i64>,
    samples_read: u64,
    first_sample_position: u64,
    /// 当前帧尚未交付的字节数, 0 表示位于帧边界
    sample_bytes_remaining: usize,

    route: SampleRoute,
    skipping_output: DiscardingTrackOutput,
    is_seek_in_progress: bool,
    seek_time_us: i64,
}

impl Default for Mp3Extractor {
    fn default() -> Self {
        Self::new(Mp3Flags::empty())
    }
}

impl Mp3Extractor {
    /// 创建解封装器
    pub fn new(flags: Mp3Flags) -> Self {
        let mut flags = flags;
        if flags.contains(Mp3Flags::ENABLE_CONSTANT_BITRATE_SEEKING_ALWAYS) {
            flags |= Mp3Flags::ENABLE_CONSTANT_BITRATE_SEEKING;
        }
        Self {
            flags,
            forced_first_sample_timestamp_us: None,
            seeking_disabled: false,
            synchronized_header_data: 0,
            synchronized_header: None,
            metadata: None,
            gapless: None,
            seeker: None,
            basis_time_us: None,
            samples_read: 0,
            first_sample_position: 0,
            sample_bytes_remaining: 0,
            route: SampleRoute::Real,
            skipping_output: DiscardingTrackOutput::new(),
            is_seek_in_progress: false,
            seek_time_us: 0,
        }
    }

    /// 创建解封装器, 并把首个样本的时间戳固定为 `time_us`
    pub fn with_forced_first_sample_timestamp(flags: Mp3Flags, time_us: i64) -> Self {
        let mut extractor = Self::new(flags);
        extractor.forced_first_sample_timestamp_us = Some(time_us);
        extractor
    }

    /// 禁用定位, 总是使用不可定位的定位器
    pub fn disable_seeking(&mut self) {
        self.seeking_disabled = true;
    }

    /// 生效的配置
    pub fn flags(&self) -> Mp3Flags {
        self.flags
    }

    /// 当前定位器 (完成首次同步前为 `None`)
    pub fn seeker(&self) -> Option<&Mp3Seeker> {
        self.seeker.as_ref()
    }

    /// 已解码的 ID3 标签
    pub fn metadata(&self) -> Option<&Id3Tag> {
        self.metadata.as_ref()
    }

    /// 无缝播放信息
    pub fn gapless_info(&self) -> Option<GaplessInfo> {
        self.gapless
    }

    /// 判断输入是否为 MP3 流
    ///
    /// 在 32 KiB 内找到连续匹配的帧头 (或输入在至少一个有效帧后结束) 即为真.
    pub fn sniff(&mut self, input: &mut IoContext) -> TingResult<bool> {
        match self.synchronize(input, true) {
            Ok(found) => Ok(found),
            Err(TingError::Eof) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// 推进一步
    ///
    /// 返回 [`ReadResult::EndOfInput`] 表示输入已结束. 同步预算耗尽时返回
    /// [`TingError::MalformedContainer`].
    pub fn read(
        &mut self,
        input: &mut IoContext,
        output: &mut dyn ExtractorOutput,
    ) -> TingResult<ReadResult> {
        let result = self.read_internal(input, output)?;
        if result == ReadResult::EndOfInput && self.basis_time_us.is_some() {
            let duration_us = self.compute_time_us(self.samples_read);
            if let Some(index) = self.seeker.as_mut().and_then(Mp3Seeker::as_index_mut) {
                if index.duration_us() != Some(duration_us) {
                    debug!("MP3: 读到流末尾, 修正索引时长为 {duration_us}us");
                    index.set_duration_us(duration_us);
                    output.seek_map(&*index);
                }
            }
        }
        Ok(result)
    }

    /// 通知解封装器输入已被移动到 `position`, 下一个样本对应 `time_us`
    pub fn seek(&mut self, position: u64, time_us: i64) {
        self.synchronized_header_data = 0;
        self.basis_time_us = None;
        self.samples_read = 0;
        self.sample_bytes_remaining = 0;
        self.seek_time_us = time_us;
        self.is_seek_in_progress = false;
        self.route = SampleRoute::Real;
        if let Some(index) = self.seeker.as_ref().and_then(Mp3Seeker::as_index) {
            if !index.is_time_us_in_index(time_us) {
                debug!("MP3: 目标时间 {time_us}us 尚未被索引, 从 {position} 开始追赶");
                self.is_seek_in_progress = true;
                self.route = SampleRoute::Skipping;
            }
        }
    }

    fn read_internal(
        &mut self,
        input: &mut IoContext,
        output: &mut dyn ExtractorOutput,
    ) -> TingResult<ReadResult> {
        if self.synchronized_header_data == 0 {
            match self.synchronize(input, false) {
                Ok(_) => {}
                Err(TingError::Eof) => return Ok(ReadResult::EndOfInput),
                Err(e) => return Err(e),
            }
        }
        if self.seeker.is_none() {
            let seeker = self.compute_seeker(input)?;
            debug!(
                "MP3: 选用 {} 定位器, 可定位={}, 时长={:?}us",
                seeker.kind(),
                seeker.is_seekable(),
                seeker.duration_us(),
            );
            output.seek_map(&seeker);
            let format = self.track_format(&seeker);
            self.seeker = Some(seeker);
            if let Some(format) = format {
                output.track().format(format);
            }
            self.first_sample_position = input.position();
        } else if self.first_sample_position != 0 {
            let position = input.position();
            if position < self.first_sample_position {
                input.skip_fully((self.first_sample_position - position) as usize, false)?;
            }
        }
        self.read_sample(input, output)
    }

    fn track_format(&self, seeker: &Mp3Seeker) -> Option<TrackFormat> {
        let header = self.synchronized_header.as_ref()?;
        let gapless = self.gapless.unwrap_or_default();
        let metadata = match &self.metadata {
            Some(tag) if !self.flags.contains(Mp3Flags::DISABLE_ID3_METADATA) => tag.to_metadata(),
            _ => Vec::new(),
        };
        Some(TrackFormat {
            container_mime_type: CONTAINER_MIME_TYPE,
            sample_mime_type: header.mime_type,
            max_input_size: MAX_FRAME_SIZE,
            channels: header.channels,
            sample_rate: header.sample_rate,
            samples_per_frame: header.samples_per_frame,
            average_bitrate: seeker.average_bitrate(),
            encoder_delay: gapless.encoder_delay,
            encoder_padding: gapless.encoder_padding,
            metadata,
        })
    }

    fn read_sample(
        &mut self,
        input: &mut IoContext,
        output: &mut dyn ExtractorOutput,
    ) -> TingResult<ReadResult> {
        if self.sample_bytes_remaining == 0 {
            input.reset_peek_position();
            let Some(header_data) = self.peek_end_of_stream_or_header(input)? else {
                return Ok(ReadResult::EndOfInput);
            };
            let header = if header::headers_match(header_data, self.synchronized_header_data) {
                MpegAudioHeader::decode(header_data)
            } else {
                None
            };
            let Some(header) = header else {
                trace!(
                    "MP3: 位置 {} 处帧头 {header_data:08X} 失配, 重新同步",
                    input.position()
                );
                input.skip_fully(1, false)?;
                self.synchronized_header_data = 0;
                return Ok(ReadResult::Continue);
            };

            let Some(seeker) = self.seeker.as_mut() else {
                return Err(TingError::Internal("MP3: 读取样本时定位器尚未建立".into()));
            };
            let basis_time_us = match self.basis_time_us {
                Some(basis) => basis,
                None => {
                    let mut basis = seeker.time_us(input.position());
                    if let Some(forced) = self.forced_first_sample_timestamp_us {
                        basis += forced - seeker.time_us(0);
                    }
                    self.basis_time_us = Some(basis);
                    basis
                }
            };
            self.sample_bytes_remaining = header.frame_size as usize;

            if let Some(index) = seeker.as_index_mut() {
                let next_time_us = basis_time_us
                    + samples_to_us(
                        self.samples_read + u64::from(header.samples_per_frame),
                        header.sample_rate,
                    );
                index.maybe_add_seek_point(next_time_us, input.position() + u64::from(header.frame_size));
                if self.is_seek_in_progress && index.is_time_us_in_index(self.seek_time_us) {
                    debug!("MP3: 索引已覆盖目标时间 {}us, 恢复输出", self.seek_time_us);
                    self.is_seek_in_progress = false;
                    self.route = SampleRoute::Real;
                }
            }
            self.synchronized_header = Some(header);
        }

        let appended = match self.route {
            SampleRoute::Real => output
                .track()
                .sample_data(input, self.sample_bytes_remaining, true)?,
            SampleRoute::Skipping => {
                self.skipping_output
                    .sample_data(input, self.sample_bytes_remaining, true)?
            }
        };
        let Some(appended) = appended else {
            return Ok(ReadResult::EndOfInput);
        };
        self.sample_bytes_remaining -= appended.min(self.sample_bytes_remaining);
        if self.sample_bytes_remaining > 0 {
            return Ok(ReadResult::Continue);
        }

        let Some(header) = self.synchronized_header.as_ref() else {
            return Err(TingError::Internal("MP3: 样本结束时缺少帧头".into()));
        };
        let frame_size = header.frame_size as usize;
        let samples_per_frame = u64::from(header.samples_per_frame);
        let time_us = self.compute_time_us(self.samples_read);
        match self.route {
            SampleRoute::Real => {
                output
                    .track()
                    .sample_metadata(time_us, SampleFlags::KEY_FRAME, frame_size, 0)
            }
            SampleRoute::Skipping => {
                self.skipping_output
                    .sample_metadata(time_us, SampleFlags::KEY_FRAME, frame_size, 0)
            }
        }
        self.samples_read += samples_per_frame;
        Ok(ReadResult::Continue)
    }

    fn compute_time_us(&self, samples: u64) -> i64 {
        let sample_rate = self
            .synchronized_header
            .as_ref()
            .map_or(0, |h| h.sample_rate);
        self.basis_time_us.unwrap_or(0) + samples_to_us(samples, sample_rate)
    }

    /// 在帧网格上同步
    ///
    /// 探测模式只移动预读游标, 成功后再跳过已搜索的字节; 稳态模式逐字节跳过.
    fn synchronize(&mut self, input: &mut IoContext, sniffing: bool) -> TingResult<bool> {
        let mut matching_frames = 0u32;
        let mut candidate_header_data = 0u32;
        let mut peeked_id3_bytes = 0usize;
        let mut searched_bytes = 0usize;
        let search_limit = if sniffing {
            MAX_SNIFF_BYTES
        } else {
            MAX_SYNC_BYTES
        };

        input.reset_peek_position();
        if input.position() == 0 {
            let predicate: Option<id3::FramePredicate> =
                if self.flags.contains(Mp3Flags::DISABLE_ID3_METADATA) {
                    Some(id3::is_required_frame)
                } else {
                    None
                };
            self.metadata = id3::peek_id3_data(input, predicate)?;
            if let Some(info) = self.metadata.as_ref().and_then(GaplessInfo::from_id3) {
                self.gapless = Some(info);
            }
            peeked_id3_bytes = input.peek_position() as usize;
            if !sniffing {
                input.skip_fully(peeked_id3_bytes, false)?;
            }
        }

        loop {
            let Some(header_data) = self.peek_end_of_stream_or_header(input)? else {
                if matching_frames > 0 {
                    break;
                }
                return Err(TingError::Eof);
            };

            let frame_size = if candidate_header_data != 0
                && !header::headers_match(header_data, candidate_header_data)
            {
                None
            } else {
                header::frame_size(header_data)
            };

            let Some(frame_size) = frame_size else {
                if searched_bytes == search_limit {
                    if sniffing {
                        return Ok(false);
                    }
                    return Err(TingError::MalformedContainer(format!(
                        "MP3: 搜索 {search_limit} 字节仍未找到连续的帧头"
                    )));
                }
                searched_bytes += 1;
                matching_frames = 0;
                candidate_header_data = 0;
                if sniffing {
                    input.reset_peek_position();
                    input.advance_peek_position(peeked_id3_bytes + searched_bytes, false)?;
                } else {
                    input.skip_fully(1, false)?;
                }
                continue;
            };

            matching_frames += 1;
            if matching_frames == 1 {
                self.synchronized_header = MpegAudioHeader::decode(header_data);
                candidate_header_data = header_data;
            } else if matching_frames == MIN_MATCHING_FRAME_HEADERS {
                break;
            }
            match input.advance_peek_position(frame_size as usize - 4, true) {
                Ok(true) => {}
                // 流在帧中间结束, 已匹配的帧头足以确认同步
                Ok(false) | Err(TingError::Eof) => break,
                Err(e) => return Err(e),
            }
        }

        if sniffing {
            input.skip_fully(peeked_id3_bytes + searched_bytes, false)?;
        } else {
            input.reset_peek_position();
        }
        debug!(
            "MP3: 在位置 {} 同步, 帧头 {candidate_header_data:08X}, 跳过 {searched_bytes} 字节",
            input.position()
        );
        self.synchronized_header_data = candidate_header_data;
        Ok(true)
    }

    /// 窥视下一个帧头, 输入或音频数据结束时返回 `None`
    fn peek_end_of_stream_or_header(&self, input: &mut IoContext) -> TingResult<Option<u32>> {
        if let Some(end) = self.seeker.as_ref().and_then(|s| s.data_end_position()) {
            if input.peek_position() + 4 > end {
                return Ok(None);
            }
        }
        let mut buf = [0u8; 4];
        match input.peek_fully(&mut buf, true) {
            Ok(true) => Ok(Some(BigEndian::read_u32(&buf))),
            Ok(false) | Err(TingError::Eof) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn compute_seeker(&mut self, input: &mut IoContext) -> TingResult<Mp3Seeker> {
        let seek_frame_seeker = self.maybe_read_seek_frame(input)?;
        let mllt_seeker = self
            .metadata
            .as_ref()
            .and_then(Id3Tag::mllt)
            .map(|frame| Mp3Seeker::Mllt(MlltSeeker::create(input.position(), frame)));

        if self.seeking_disabled {
            let duration_us = mllt_seeker
                .as_ref()
                .or(seek_frame_seeker.as_ref())
                .and_then(|s| s.duration_us());
            return Ok(Mp3Seeker::Unseekable(UnseekableSeeker::new(duration_us)));
        }

        let seeker = if self.flags.contains(Mp3Flags::ENABLE_INDEX_SEEKING) {
            let (duration_us, data_end_position) =
                match mllt_seeker.as_ref().or(seek_frame_seeker.as_ref()) {
                    Some(s) => (s.duration_us(), s.data_end_position()),
                    None => (self.metadata.as_ref().and_then(Id3Tag::tlen_us), None),
                };
            Some(Mp3Seeker::Index(IndexSeeker::new(
                duration_us,
                input.position(),
                data_end_position,
            )))
        } else {
            mllt_seeker.or(seek_frame_seeker)
        };

        match seeker {
            Some(s)
                if s.is_seekable()
                    || !self
                        .flags
                        .contains(Mp3Flags::ENABLE_CONSTANT_BITRATE_SEEKING) =>
            {
                Ok(s)
            }
            other => {
                // 不可定位的 Xing/Info 头仍给出准确时长
                let declared_duration_us = other.as_ref().and_then(|s| s.duration_us());
                let seeker = self.constant_bitrate_seeker(
                    input,
                    self.flags
                        .contains(Mp3Flags::ENABLE_CONSTANT_BITRATE_SEEKING_ALWAYS),
                )?;
                Ok(Mp3Seeker::ConstantBitrate(
                    seeker.with_duration_us(declared_duration_us),
                ))
            }
        }
    }

    /// 以下一个帧头 (取不到时用同步帧头) 构建恒定码率定位器
    fn constant_bitrate_seeker(
        &mut self,
        input: &mut IoContext,
        allow_seeks_if_length_unknown: bool,
    ) -> TingResult<ConstantBitrateSeeker> {
        let mut buf = [0u8; 4];
        let header_data = match input.peek_fully(&mut buf, true) {
            Ok(true) => BigEndian::read_u32(&buf),
            Ok(false) | Err(TingError::Eof) => self.synchronized_header_data,
            Err(e) => return Err(e),
        };
        input.reset_peek_position();
        let header = MpegAudioHeader::decode(header_data)
            .or(self.synchronized_header)
            .ok_or_else(|| TingError::Internal("MP3: 缺少同步帧头".into()))?;
        Ok(ConstantBitrateSeeker::new(
            input.length(),
            input.position(),
            &header,
            allow_seeks_if_length_unknown,
        ))
    }

    /// 读取首帧中的 Xing/Info/VBRI 头
    ///
    /// 找到定位头时消费该帧, 否则只复位预读游标.
    fn maybe_read_seek_frame(&mut self, input: &mut IoContext) -> TingResult<Option<Mp3Seeker>> {
        let Some(header) = self.synchronized_header else {
            return Ok(None);
        };
        let frame_size = header.frame_size as usize;
        let mut frame = vec![0u8; frame_size];
        input.reset_peek_position();
        match input.peek_fully(&mut frame, true) {
            Ok(true) => {}
            Ok(false) | Err(TingError::Eof) => {
                input.reset_peek_position();
                return Ok(None);
            }
            Err(e) => return Err(e),
        }

        let xing_base = header.xing_offset();
        let position = input.position();
        let seeker = match seek_frame_header(&frame, xing_base) {
            Some(kind @ (SeekFrameHeader::Xing | SeekFrameHeader::Info)) => {
                let xing = XingSeeker::create(input.length(), position, &header, &frame);
                if xing.is_some() && self.gapless.is_none() {
                    let offset = xing_base + LAME_GAPLESS_OFFSET;
                    if let Some(bytes) = frame.get(offset..offset + 3) {
                        self.gapless = GaplessInfo::from_xing_value(BigEndian::read_u24(bytes));
                    }
                }
                input.skip_fully(frame_size, false)?;
                debug!("MP3: 首帧为 {kind:?} 头, 解析{}", if xing.is_some() { "成功" } else { "失败" });
                match xing {
                    Some(x) if x.is_toc_truncated() => {
                        let seeker = self.constant_bitrate_seeker(input, false)?;
                        Some(Mp3Seeker::ConstantBitrate(
                            seeker.with_duration_us(x.duration_us()),
                        ))
                    }
                    other => other.map(Mp3Seeker::Xing),
                }
            }
            Some(SeekFrameHeader::Vbri) => {
                let vbri = VbriSeeker::create(input.length(), position, &header, &frame);
                input.skip_fully(frame_size, false)?;
                debug!("MP3: 首帧为 VBRI 头, 解析{}", if vbri.is_some() { "成功" } else { "失败" });
                vbri.map(Mp3Seeker::Vbri)
            }
            None => {
                input.reset_peek_position();
                None
            }
        };
        Ok(seeker)
    }
}

fn seek_frame_header(frame: &[u8], xing_base: usize) -> Option<SeekFrameHeader> {
    match frame.get(xing_base..xing_base + 4) {
        Some(b"Xing") => return Some(SeekFrameHeader::Xing),
        Some(b"Info") => return Some(SeekFrameHeader::Info),
        _ => {}
    }
    match frame.get(VBRI_OFFSET..VBRI_OFFSET + 4) {
        Some(b"VBRI") => Some(SeekFrameHeader::Vbri),
        _ => None,
    }
}

fn samples_to_us(samples: u64, sample_rate: u32) -> i64 {
    if sample_rate == 0 {
        return 0;
    }
    scale_large_timestamp(
        i64::try_from(samples).unwrap_or(i64::MAX),
        MICROS_PER_SECOND,
        i64::from(sample_rate),
    )
}
