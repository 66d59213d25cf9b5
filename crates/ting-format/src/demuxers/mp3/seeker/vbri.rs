//! VBRI 头定位器 (Fraunhofer 编码器).
//!
//! VBRI 头固定位于帧头之后 32 字节处 (帧内偏移 36):
//! ```text
//! "VBRI"        4 字节
//! version       2 字节
//! delay         2 字节
//! quality       2 字节
//! bytes         4 字节
//! frames        4 字节
//! entry_count   2 字节
//! scale         2 字节
//! entry_size    2 字节 (1-4)
//! frames/entry  2 字节
//! toc           entry_count * entry_size 字节
//! ```

use log::warn;
use ting_core::ByteReader;
use ting_core::search::floor_index_clamped;
use ting_core::time::{MICROS_PER_SECOND, scale_large_timestamp};

use super::Seeker;
use crate::demuxers::mp3::header::MpegAudioHeader;
use crate::extractor::{SeekMap, SeekPoint, SeekPoints};

/// VBRI 标签在帧内的偏移
pub(crate) const VBRI_OFFSET: usize = 36;

/// VBRI 头定位器
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VbriSeeker {
    times_us: Vec<i64>,
    positions: Vec<u64>,
    duration_us: i64,
    data_end_position: u64,
}

impl VbriSeeker {
    /// 从首帧解析 VBRI 头
    ///
    /// `frame` 为完整的首帧数据, `position` 为首帧在输入中的偏移.
    /// 帧数不为正、目录为空、项宽度非法或目录被截断时返回 `None`.
    pub fn create(
        input_length: Option<u64>,
        position: u64,
        header: &MpegAudioHeader,
        frame: &[u8],
    ) -> Option<Self> {
        let mut reader = ByteReader::new(frame);
        reader.skip(VBRI_OFFSET + 4 + 10).ok()?;
        let frame_count = reader.read_u32_be().ok()? as i32;
        if frame_count <= 0 {
            return None;
        }
        let sample_rate = header.sample_rate;
        let samples_per_frame: i64 = if sample_rate >= 32_000 { 1152 } else { 576 };
        let duration_us = scale_large_timestamp(
            i64::from(frame_count),
            MICROS_PER_SECOND * samples_per_frame,
            i64::from(sample_rate),
        );

        let entry_count = usize::from(reader.read_u16_be().ok()?);
        let scale = u64::from(reader.read_u16_be().ok()?);
        let entry_size = reader.read_u16_be().ok()?;
        reader.skip(2).ok()?;
        if entry_count == 0 {
            return None;
        }

        let min_position = position + u64::from(header.frame_size);
        let mut times_us = Vec::with_capacity(entry_count);
        let mut positions = Vec::with_capacity(entry_count);
        let mut position = position;
        for index in 0..entry_count {
            times_us.push(scale_large_timestamp(
                index as i64,
                duration_us,
                entry_count as i64,
            ));
            positions.push(position.max(min_position));
            let segment_size = match entry_size {
                1 => u32::from(reader.read_u8().ok()?),
                2 => u32::from(reader.read_u16_be().ok()?),
                3 => reader.read_u24_be().ok()?,
                4 => reader.read_u32_be().ok()?,
                _ => return None,
            };
            position += u64::from(segment_size) * scale;
        }

        if let Some(length) = input_length {
            if length != position {
                warn!("MP3: VBRI 数据大小不一致: {length}, {position}");
            }
        }

        Some(Self {
            times_us,
            positions,
            duration_us,
            data_end_position: position,
        })
    }
}

impl SeekMap for VbriSeeker {
    fn is_seekable(&self) -> bool {
        true
    }

    fn duration_us(&self) -> Option<i64> {
        Some(self.duration_us)
    }

    fn seek_points(&self, time_us: i64) -> SeekPoints {
        let index = floor_index_clamped(&self.times_us, time_us);
        let point = SeekPoint::new(self.times_us[index], self.positions[index]);
        if point.time_us >= time_us || index + 1 == self.times_us.len() {
            return SeekPoints::single(point);
        }
        let next = SeekPoint::new(self.times_us[index + 1], self.positions[index + 1]);
        SeekPoints::pair(point, next)
    }
}

impl Seeker for VbriSeeker {
    fn time_us(&self, position: u64) -> i64 {
        self.times_us[floor_index_clamped(&self.positions, position)]
    }

    fn data_end_position(&self) -> Option<u64> {
        Some(self.data_end_position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POSITION: u64 = 0;

    /// MPEG-1 Layer III 128kbps 44100Hz, 帧大小 417
    fn header() -> MpegAudioHeader {
        MpegAudioHeader::decode(0xFFFB_9000).unwrap()
    }

    fn build_frame(frames: i32, scale: u16, entry_size: u16, entries: &[u32]) -> Vec<u8> {
        let mut frame = vec![0u8; 417];
        frame[0..4].copy_from_slice(&0xFFFB_9000u32.to_be_bytes());
        frame[36..40].copy_from_slice(b"VBRI");
        frame[40..42].copy_from_slice(&1u16.to_be_bytes());
        frame[50..54].copy_from_slice(&frames.to_be_bytes());
        frame[54..56].copy_from_slice(&(entries.len() as u16).to_be_bytes());
        frame[56..58].copy_from_slice(&scale.to_be_bytes());
        frame[58..60].copy_from_slice(&entry_size.to_be_bytes());
        let mut offset = 62;
        for &entry in entries {
            let bytes = entry.to_be_bytes();
            let width = usize::from(entry_size).min(4);
            frame[offset..offset + width].copy_from_slice(&bytes[4 - width..]);
            offset += width;
        }
        frame
    }

    #[test]
    fn test_目录解析() {
        // 100 帧, 4 项, 每项 100 * 10 字节
        let frame = build_frame(100, 10, 2, &[100, 100, 100, 100]);
        let seeker = VbriSeeker::create(Some(4_000), POSITION, &header(), &frame).unwrap();
        // 100 * 1152 * 1e6 / 44100
        assert_eq!(seeker.duration_us(), Some(2_612_244));
        assert_eq!(seeker.times_us, vec![0, 653_061, 1_306_122, 1_959_183]);
        // 首项不早于 VBRI 帧末尾
        assert_eq!(seeker.positions, vec![417, 1_000, 2_000, 3_000]);
        assert_eq!(seeker.data_end_position(), Some(4_000));
    }

    #[test]
    fn test_各种项宽度() {
        for width in 1..=4u16 {
            let frame = build_frame(10, 1, width, &[200, 200]);
            let seeker = VbriSeeker::create(None, POSITION, &header(), &frame).unwrap();
            assert_eq!(seeker.data_end_position(), Some(400));
        }
        assert!(VbriSeeker::create(None, POSITION, &header(), &build_frame(10, 1, 5, &[1])).is_none());
        assert!(VbriSeeker::create(None, POSITION, &header(), &build_frame(10, 1, 0, &[1])).is_none());
    }

    #[test]
    fn test_无效头() {
        assert!(VbriSeeker::create(None, POSITION, &header(), &build_frame(0, 1, 2, &[1])).is_none());
        assert!(VbriSeeker::create(None, POSITION, &header(), &build_frame(-5, 1, 2, &[1])).is_none());
        assert!(VbriSeeker::create(None, POSITION, &header(), &build_frame(10, 1, 2, &[])).is_none());
        // 目录超出帧
        let mut frame = build_frame(10, 1, 4, &[1, 2, 3]);
        frame.truncate(70);
        assert!(VbriSeeker::create(None, POSITION, &header(), &frame).is_none());
    }

    #[test]
    fn test_低采样率每帧_576_采样() {
        // MPEG-2 Layer III 64kbps 22050Hz
        let header = MpegAudioHeader::decode(0xFFF3_8000).unwrap();
        let mut frame = build_frame(100, 1, 1, &[10]);
        frame.truncate(header.frame_size as usize);
        let seeker = VbriSeeker::create(None, POSITION, &header, &frame).unwrap();
        // 100 * 576 * 1e6 / 22050
        assert_eq!(seeker.duration_us(), Some(2_612_244));
    }

    #[test]
    fn test_定位点() {
        let frame = build_frame(100, 10, 2, &[100, 100, 100, 100]);
        let seeker = VbriSeeker::create(None, POSITION, &header(), &frame).unwrap();
        assert_eq!(
            seeker.seek_points(1_000_000),
            SeekPoints::pair(SeekPoint::new(653_061, 1_000), SeekPoint::new(1_306_122, 2_000))
        );
        assert_eq!(seeker.seek_points(0), SeekPoints::single(SeekPoint::new(0, 417)));
        assert_eq!(
            seeker.seek_points(2_500_000),
            SeekPoints::single(SeekPoint::new(1_959_183, 3_000))
        );
        assert_eq!(seeker.time_us(0), 0);
        assert_eq!(seeker.time_us(1_500), 653_061);
        assert_eq!(seeker.time_us(9_999), 1_959_183);
    }

    #[test]
    fn test_往返误差在一个目录项内() {
        let entries = [120u32, 80, 150, 90, 110, 100, 130, 70];
        let frame = build_frame(400, 10, 2, &entries);
        let seeker = VbriSeeker::create(None, POSITION, &header(), &frame).unwrap();
        let duration = seeker.duration_us().unwrap();
        let bucket = duration / entries.len() as i64;
        for step in 0..16 {
            let t = duration * step / 16;
            let position = seeker.seek_points(t).first.position;
            assert!((seeker.time_us(position) - t).abs() <= bucket);
        }
    }
}
