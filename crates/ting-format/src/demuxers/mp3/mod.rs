//! MP3 (MPEG Audio Layer I/II/III) 容器解封装器.
//!
//! MP3 文件结构:
//! ```text
//! [ID3v2 标签 (可选)]
//! [Xing/Info/VBRI 头帧 (可选)]
//! [MPEG 音频帧 #0]
//!   ├── 帧同步码 (11 bits = 0x7FF)
//!   ├── 帧头 (版本, 层, 比特率, 采样率, 声道模式等)
//!   └── 帧数据 (压缩音频)
//! [MPEG 音频帧 #1]
//! ...
//! [ID3v1 标签 (可选, 文件末尾 128 字节)]
//! ```
//!
//! [`Mp3Extractor`] 是逐步推进的状态机, [`Mp3Demuxer`] 在其上提供
//! 按数据包拉取的 [`Demuxer`] 接口.

mod extractor;
mod gapless;
pub mod header;
pub mod seeker;

pub use extractor::{CONTAINER_MIME_TYPE, Mp3Extractor, Mp3Flags};
pub use gapless::GaplessInfo;
pub use header::MpegAudioHeader;
pub use seeker::{Mp3Seeker, Seeker};

use log::debug;
use ting_core::{Rational, TingError, TingResult};

use crate::demuxer::Demuxer;
use crate::extractor::{ReadResult, SeekMap, SeekPoint};
use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::packet::Packet;
use crate::probe::{FormatProbe, ProbeScore, SCORE_EXTENSION, SCORE_MAX};
use crate::stream::{AudioStreamParams, Stream};
use crate::track::{PacketTrackOutput, SeekMapInfo};

/// MP3 解封装器
pub struct Mp3Demuxer {
    /// 解封装状态机
    extractor: Mp3Extractor,
    /// 样本组装与定位映射记录
    output: PacketTrackOutput,
    /// 流信息
    streams: Vec<Stream>,
    /// 输入已结束
    end_of_input: bool,
}

impl Mp3Demuxer {
    /// 创建 MP3 解封装器实例 (工厂函数)
    ///
    /// 默认启用恒定码率定位.
    pub fn create() -> TingResult<Box<dyn Demuxer>> {
        Ok(Box::new(Self::new(Mp3Flags::ENABLE_CONSTANT_BITRATE_SEEKING)))
    }

    /// 以指定配置创建解封装器
    pub fn new(flags: Mp3Flags) -> Self {
        Self::with_extractor(Mp3Extractor::new(flags))
    }

    /// 包装一个已配置好的状态机
    pub fn with_extractor(extractor: Mp3Extractor) -> Self {
        Self {
            extractor,
            output: PacketTrackOutput::new(),
            streams: Vec::new(),
            end_of_input: false,
        }
    }

    /// 底层状态机
    pub fn extractor(&self) -> &Mp3Extractor {
        &self.extractor
    }

    /// 最近一次发布的定位映射
    pub fn seek_map_info(&self) -> Option<SeekMapInfo> {
        self.output.seek_map_info()
    }

    /// 按轨道格式与定位映射重建流信息
    fn refresh_stream(&mut self) {
        let Some(format) = self.output.track_format() else {
            return;
        };
        let stream = Stream {
            index: 0,
            mime_type: format.sample_mime_type,
            time_base: Rational::MICRO,
            duration: self.output.seek_map_info().and_then(|m| m.duration_us),
            start_time: 0,
            params: AudioStreamParams {
                sample_rate: format.sample_rate,
                channels: format.channels,
                bit_rate: format.average_bitrate,
                frame_size: format.samples_per_frame,
                encoder_delay: format.encoder_delay,
                encoder_padding: format.encoder_padding,
            },
            metadata: format.metadata.clone(),
        };
        self.streams = vec![stream];
    }
}

impl Demuxer for Mp3Demuxer {
    fn format_id(&self) -> FormatId {
        FormatId::Mp3Container
    }

    fn name(&self) -> &str {
        "mp3"
    }

    fn open(&mut self, io: &mut IoContext) -> TingResult<()> {
        while self.output.track_format().is_none() {
            if self.extractor.read(io, &mut self.output)? == ReadResult::EndOfInput {
                self.end_of_input = true;
                break;
            }
        }
        if self.output.track_format().is_none() {
            return Err(TingError::InvalidData(
                "MP3: 未找到有效的 MPEG 音频帧".into(),
            ));
        }
        self.refresh_stream();

        if let (Some(stream), Some(seeker)) = (self.streams.first(), self.extractor.seeker()) {
            debug!(
                "MP3: {} {}Hz {}ch {:?}bps, 定位器={}",
                stream.mime_type,
                stream.params.sample_rate,
                stream.params.channels,
                stream.params.bit_rate,
                seeker.kind(),
            );
        }
        Ok(())
    }

    fn streams(&self) -> &[Stream] {
        &self.streams
    }

    fn read_packet(&mut self, io: &mut IoContext) -> TingResult<Packet> {
        loop {
            if let Some(packet) = self.output.pop_packet() {
                return Ok(packet);
            }
            if self.end_of_input {
                return Err(TingError::Eof);
            }
            if self.extractor.read(io, &mut self.output)? == ReadResult::EndOfInput {
                self.end_of_input = true;
                // 索引定位器在流末尾修正时长
                self.refresh_stream();
            }
        }
    }

    fn seek(&mut self, io: &mut IoContext, time_us: i64) -> TingResult<SeekPoint> {
        let seeker = self
            .extractor
            .seeker()
            .ok_or_else(|| TingError::InvalidArgument("MP3: 解封装器尚未打开".into()))?;
        if !seeker.is_seekable() && time_us != 0 {
            return Err(TingError::Unsupported(format!(
                "MP3: {} 定位器不支持定位",
                seeker.kind()
            )));
        }
        let point = seeker.seek_points(time_us).first;
        debug!(
            "MP3: 定位到 {time_us}us, 使用定位点 ({}us, {})",
            point.time_us, point.position
        );
        io.seek_to(point.position)?;
        self.extractor.seek(point.position, time_us);
        self.output.clear();
        self.end_of_input = false;
        Ok(point)
    }

    fn is_seekable(&self) -> bool {
        self.extractor.seeker().is_some_and(|s| s.is_seekable())
    }

    fn duration(&self) -> Option<f64> {
        let duration_us = self.output.seek_map_info()?.duration_us?;
        Some(Rational::MICRO.ticks_to_seconds(duration_us))
    }

    fn metadata(&self) -> &[(String, String)] {
        self.streams
            .first()
            .map(|s| s.metadata.as_slice())
            .unwrap_or(&[])
    }
}

/// MP3 格式探测器
///
/// 以 32 KiB 的搜索预算在数据上试同步, 失败时退回扩展名匹配.
pub struct Mp3Probe;

impl FormatProbe for Mp3Probe {
    fn probe(&self, data: &[u8], filename: Option<&str>) -> Option<ProbeScore> {
        if !data.is_empty() {
            let mut io = IoContext::from_memory(data.to_vec());
            if let Ok(true) = Mp3Extractor::default().sniff(&mut io) {
                return Some(SCORE_MAX - 5);
            }
        }

        // 扩展名
        let format_id = filename.and_then(FormatId::from_filename)?;
        (format_id == FormatId::Mp3Container).then_some(SCORE_EXTENSION)
    }

    fn format_id(&self) -> FormatId {
        FormatId::Mp3Container
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 构造一个简单的 MPEG-1 Layer III 帧头
    fn make_mp3_frame_header(bitrate_idx: u8, sr_idx: u8, padding: bool) -> [u8; 4] {
        // 同步: 0xFFE (11 bit) | Version=MPEG1 (11) | Layer III (01) | No CRC (1)
        // = 0xFFFB
        let mut h: u32 = 0xFFFB_0000;
        h |= u32::from(bitrate_idx & 0x0F) << 12;
        h |= u32::from(sr_idx & 0x03) << 10;
        if padding {
            h |= 1 << 9;
        }
        // 声道: 立体声 (00)
        h.to_be_bytes()
    }

    /// 构造一个完整的 MP3 帧 (头部 + 填充)
    fn build_mp3_frame(bitrate_idx: u8, sr_idx: u8, padding: bool) -> Vec<u8> {
        let header = make_mp3_frame_header(bitrate_idx, sr_idx, padding);
        let fh = MpegAudioHeader::decode(u32::from_be_bytes(header)).unwrap();
        let mut frame = vec![0u8; fh.frame_size as usize];
        frame[0..4].copy_from_slice(&header);
        frame
    }

    fn open(data: Vec<u8>) -> (Mp3Demuxer, IoContext) {
        let mut io = IoContext::from_memory(data);
        let mut demuxer = Mp3Demuxer::new(Mp3Flags::ENABLE_CONSTANT_BITRATE_SEEKING);
        demuxer.open(&mut io).unwrap();
        (demuxer, io)
    }

    #[test]
    fn test_探测_id3v2() {
        let probe = Mp3Probe;
        // ID3v2 头 (10字节, size=0) + 两个有效的 MP3 帧
        let mut data = b"ID3\x04\x00\x00\x00\x00\x00\x00".to_vec();
        data.extend(build_mp3_frame(9, 0, false));
        data.extend(build_mp3_frame(9, 0, false));
        assert_eq!(probe.probe(&data, None), Some(SCORE_MAX - 5));
    }

    #[test]
    fn test_探测_帧同步() {
        let probe = Mp3Probe;
        let frame = build_mp3_frame(9, 0, false);
        assert!(probe.probe(&frame, None).is_some());
    }

    #[test]
    fn test_探测_id3_后非_mp3_帧() {
        let probe = Mp3Probe;
        // ID3(size=0) + "OggS": 不应被识别为 MP3
        let data = b"ID3\x04\x00\x00\x00\x00\x00\x00OggS";
        assert!(probe.probe(data, None).is_none());
    }

    #[test]
    fn test_探测_扩展名() {
        let probe = Mp3Probe;
        assert_eq!(probe.probe(&[], Some("song.mp3")), Some(SCORE_EXTENSION));
        assert!(probe.probe(&[], Some("video.mp4")).is_none());
    }

    #[test]
    fn test_id3v2_跳过() {
        // 构造 ID3v2 头部 + MP3 帧
        let mut data = Vec::new();
        data.extend_from_slice(b"ID3");
        data.push(4); // version major
        data.push(0); // version minor
        data.push(0); // flags
        // size = 100 (syncsafe: 0,0,0,100)
        data.extend_from_slice(&[0, 0, 0, 100]);
        data.extend(std::iter::repeat_n(0u8, 100));
        // 两个连续 MP3 帧
        let frame = build_mp3_frame(9, 0, false);
        data.extend_from_slice(&frame);
        data.extend_from_slice(&frame);

        let (mut demuxer, mut io) = open(data);
        let streams = demuxer.streams();
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].mime_type, "audio/mpeg");
        assert_eq!(demuxer.read_packet(&mut io).unwrap().pos, Some(110));
    }

    #[test]
    fn test_读取数据包() {
        let frame = build_mp3_frame(9, 0, false);
        let mut data = Vec::new();
        for _ in 0..4 {
            data.extend_from_slice(&frame);
        }

        let (mut demuxer, mut io) = open(data);
        let pkt0 = demuxer.read_packet(&mut io).unwrap();
        assert_eq!(pkt0.stream_index, 0);
        assert_eq!(pkt0.pts, 0);
        assert_eq!(pkt0.data.len(), 417);
        assert!(pkt0.is_keyframe);
        assert_eq!(pkt0.time_base, Rational::MICRO);

        let pkt1 = demuxer.read_packet(&mut io).unwrap();
        assert_eq!(pkt1.pts, 26_122);

        demuxer.read_packet(&mut io).unwrap();
        demuxer.read_packet(&mut io).unwrap();
        assert!(matches!(demuxer.read_packet(&mut io), Err(TingError::Eof)));
    }

    #[test]
    fn test_基本流信息() {
        let frame = build_mp3_frame(9, 0, false); // 128kbps, 44100Hz
        let mut data = Vec::new();
        for _ in 0..3 {
            data.extend_from_slice(&frame);
        }

        let (demuxer, _io) = open(data);
        let stream = &demuxer.streams()[0];
        assert_eq!(stream.time_base, Rational::MICRO);
        assert_eq!(stream.params.sample_rate, 44100);
        assert_eq!(stream.params.bit_rate, Some(128_000));
        assert_eq!(stream.params.frame_size, 1152);
        assert_eq!(stream.params.channels, 2);
        // 3 * 417 字节 * 8e6 / 128000
        assert_eq!(stream.duration, Some(78_187));
        assert!(demuxer.is_seekable());
    }

    #[test]
    fn test_定位() {
        let frame = build_mp3_frame(9, 0, false);
        let data: Vec<u8> = (0..100).flat_map(|_| frame.clone()).collect();
        let (mut demuxer, mut io) = open(data);

        let point = demuxer.seek(&mut io, 1_000_000).unwrap();
        assert_eq!(point.position % 417, 0);
        let pkt = demuxer.read_packet(&mut io).unwrap();
        assert_eq!(pkt.pos, Some(point.position));
        assert_eq!(pkt.pts, point.time_us);
    }

    #[test]
    fn test_无有效帧() {
        let mut io = IoContext::from_memory(vec![0x11; 64]);
        let mut demuxer = Mp3Demuxer::new(Mp3Flags::empty());
        assert!(matches!(demuxer.open(&mut io), Err(TingError::InvalidData(_))));
        assert!(matches!(
            demuxer.seek(&mut io, 0),
            Err(TingError::InvalidArgument(_))
        ));
    }
}
