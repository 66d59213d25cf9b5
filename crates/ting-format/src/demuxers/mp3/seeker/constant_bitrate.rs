//! 恒定码率定位器.
//!
//! 假设整条流码率不变, 字节偏移与时间线性对应. 定位点对齐到帧边界.

use ting_core::time::MICROS_PER_SECOND;

use super::Seeker;
use crate::demuxers::mp3::header::MpegAudioHeader;
use crate::extractor::{SeekMap, SeekPoint, SeekPoints};

const BITS_PER_BYTE: i128 = 8;

/// 恒定码率定位器
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantBitrateSeeker {
    /// 输入总长度
    input_length: Option<u64>,
    /// 第一个音频帧的偏移
    first_frame_position: u64,
    /// 音频数据字节数
    data_size: Option<u64>,
    /// 比特率 (bps)
    bitrate: u32,
    /// 帧大小 (字节)
    frame_size: u32,
    duration_us: Option<i64>,
    /// 长度未知时是否仍允许定位
    allow_seeks_if_length_unknown: bool,
}

impl ConstantBitrateSeeker {
    /// 以 `header` 描述的帧为基准创建定位器
    pub fn new(
        input_length: Option<u64>,
        first_frame_position: u64,
        header: &MpegAudioHeader,
        allow_seeks_if_length_unknown: bool,
    ) -> Self {
        let mut seeker = Self {
            input_length,
            first_frame_position,
            data_size: None,
            bitrate: header.bitrate,
            frame_size: header.frame_size.max(1),
            duration_us: None,
            allow_seeks_if_length_unknown,
        };
        if let Some(length) = input_length {
            seeker.data_size = Some(length.saturating_sub(first_frame_position));
            seeker.duration_us = Some(seeker.time_us_at(length));
        }
        seeker
    }

    /// 用流内元数据声明的时长替换按长度推算的时长
    pub fn with_duration_us(mut self, duration_us: Option<i64>) -> Self {
        if duration_us.is_some() {
            self.duration_us = duration_us;
        }
        self
    }

    fn time_us_at(&self, position: u64) -> i64 {
        if self.bitrate == 0 {
            return 0;
        }
        let offset = i128::from(position.saturating_sub(self.first_frame_position));
        let us = offset * BITS_PER_BYTE * i128::from(MICROS_PER_SECOND) / i128::from(self.bitrate);
        us.min(i128::from(i64::MAX)) as i64
    }

    fn frame_position_for_time_us(&self, time_us: i64) -> u64 {
        let frame_size = i128::from(self.frame_size);
        let mut offset = i128::from(time_us) * i128::from(self.bitrate)
            / (i128::from(MICROS_PER_SECOND) * BITS_PER_BYTE);
        offset = (offset / frame_size) * frame_size;
        if let Some(data_size) = self.data_size {
            offset = offset.min(i128::from(data_size) - frame_size);
        }
        offset = offset.max(0);
        self.first_frame_position + offset as u64
    }
}

impl SeekMap for ConstantBitrateSeeker {
    fn is_seekable(&self) -> bool {
        self.data_size.is_some() || self.allow_seeks_if_length_unknown
    }

    fn duration_us(&self) -> Option<i64> {
        self.duration_us
    }

    fn seek_points(&self, time_us: i64) -> SeekPoints {
        if !self.is_seekable() {
            return SeekPoints::single(SeekPoint::new(0, self.first_frame_position));
        }
        let position = self.frame_position_for_time_us(time_us);
        let point = SeekPoint::new(self.time_us_at(position), position);
        if let Some(length) = self.input_length {
            let next = position + u64::from(self.frame_size);
            if point.time_us < time_us && next < length {
                return SeekPoints::pair(point, SeekPoint::new(self.time_us_at(next), next));
            }
        }
        SeekPoints::single(point)
    }
}

impl Seeker for ConstantBitrateSeeker {
    fn time_us(&self, position: u64) -> i64 {
        self.time_us_at(position)
    }

    fn data_end_position(&self) -> Option<u64> {
        None
    }

    fn average_bitrate(&self) -> Option<u32> {
        Some(self.bitrate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// MPEG-1 Layer III 128kbps 44100Hz, 帧大小 417
    fn header() -> MpegAudioHeader {
        MpegAudioHeader::decode(0xFFFB_9000).unwrap()
    }

    #[test]
    fn test_已知长度() {
        let seeker = ConstantBitrateSeeker::new(Some(100 + 417 * 100), 100, &header(), false);
        assert!(seeker.is_seekable());
        // 41700 字节 * 8e6 / 128000
        assert_eq!(seeker.duration_us(), Some(2_606_250));
        assert_eq!(seeker.average_bitrate(), Some(128_000));
        assert_eq!(seeker.time_us(50), 0);
        assert_eq!(seeker.time_us(100 + 16_000), 1_000_000);
    }

    #[test]
    fn test_定位点对齐帧边界() {
        let seeker = ConstantBitrateSeeker::new(Some(100 + 417 * 100), 100, &header(), false);
        // 1s 对应 16000 字节, 向下对齐到 38 帧 = 15846 字节
        let points = seeker.seek_points(1_000_000);
        assert_eq!(points.first, SeekPoint::new(990_375, 100 + 15_846));
        assert_eq!(points.second, Some(SeekPoint::new(1_016_437, 100 + 16_263)));

        // 超出末尾时落在最后一帧
        let points = seeker.seek_points(10_000_000);
        assert_eq!(points.first.position, 100 + 417 * 99);
        assert_eq!(points.second, None);

        // 精确命中帧边界时只有一个点
        let points = seeker.seek_points(0);
        assert_eq!(points, SeekPoints::single(SeekPoint::new(0, 100)));
    }

    #[test]
    fn test_长度未知() {
        let seeker = ConstantBitrateSeeker::new(None, 100, &header(), false);
        assert!(!seeker.is_seekable());
        assert_eq!(seeker.duration_us(), None);
        assert_eq!(seeker.seek_points(1_000_000), SeekPoints::single(SeekPoint::new(0, 100)));

        let declared = ConstantBitrateSeeker::new(None, 100, &header(), false)
            .with_duration_us(Some(26_122_448));
        assert!(!declared.is_seekable());
        assert_eq!(declared.duration_us(), Some(26_122_448));

        let always = ConstantBitrateSeeker::new(None, 100, &header(), true);
        assert!(always.is_seekable());
        let points = always.seek_points(1_000_000);
        assert_eq!(points.first.position, 100 + 15_846);
        assert_eq!(points.second, None);
    }
}
