//! Xing/Info 头定位器.
//!
//! Xing/Info 头位于首帧内 (紧随边信息之后), 结构如下:
//! ```text
//! "Xing" | "Info"   4 字节
//! flags             4 字节 (bit0=帧数, bit1=字节数, bit2=目录, bit3=质量)
//! frames            4 字节 (可选)
//! bytes             4 字节 (可选)
//! toc               100 字节 (可选), toc[i] = 第 i% 时间处的偏移 * 256 / bytes
//! ```

use log::warn;
use ting_core::ByteReader;
use ting_core::search::floor_index_clamped_by_key;
use ting_core::time::{MICROS_PER_SECOND, scale_large_timestamp};

use super::Seeker;
use crate::demuxers::mp3::header::MpegAudioHeader;
use crate::extractor::{SeekMap, SeekPoint, SeekPoints};

/// 目录项数
const TOC_SIZE: usize = 100;

/// Xing/Info 头定位器
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XingSeeker {
    /// Xing 帧起始偏移
    data_start_position: u64,
    /// Xing 帧大小
    xing_frame_size: u32,
    duration_us: i64,
    /// 音频数据字节数 (含 Xing 帧)
    data_size: Option<u64>,
    data_end_position: Option<u64>,
    /// 目录, 为 `None` 时不可定位
    table_of_contents: Option<[u8; TOC_SIZE]>,
    /// 标志声明了字节数与目录, 但帧内数据不足
    toc_truncated: bool,
}

impl XingSeeker {
    /// 从首帧解析 Xing/Info 头
    ///
    /// `frame` 为完整的首帧数据, `position` 为首帧在输入中的偏移.
    /// 头中没有帧数 (无法得出时长) 时返回 `None`.
    pub fn create(
        input_length: Option<u64>,
        position: u64,
        header: &MpegAudioHeader,
        frame: &[u8],
    ) -> Option<Self> {
        let mut reader = ByteReader::new(frame);
        reader.skip(header.xing_offset() + 4).ok()?;
        let flags = reader.read_u32_be().ok()?;
        if flags & 0x01 == 0 {
            return None;
        }
        let frame_count = reader.read_u32_be().ok()?;
        if frame_count == 0 {
            return None;
        }
        let duration_us = scale_large_timestamp(
            i64::from(frame_count),
            i64::from(header.samples_per_frame) * MICROS_PER_SECOND,
            i64::from(header.sample_rate),
        );

        let unseekable = Self {
            data_start_position: position,
            xing_frame_size: header.frame_size,
            duration_us,
            data_size: None,
            data_end_position: None,
            table_of_contents: None,
            toc_truncated: false,
        };
        if flags & 0x06 != 0x06 {
            return Some(unseekable);
        }

        let (Ok(data_size), Ok(toc_bytes)) = (reader.read_u32_be(), reader.read_bytes(TOC_SIZE))
        else {
            warn!("MP3: Xing 目录被截断, 帧大小={}", frame.len());
            return Some(Self {
                toc_truncated: true,
                ..unseekable
            });
        };
        let data_size = u64::from(data_size);
        if data_size <= u64::from(header.frame_size) {
            warn!(
                "MP3: Xing 数据大小 {data_size} 不大于 Xing 帧大小 {}, 忽略目录",
                header.frame_size
            );
            return Some(unseekable);
        }
        let mut table_of_contents = [0u8; TOC_SIZE];
        table_of_contents.copy_from_slice(toc_bytes);

        if let Some(length) = input_length {
            if length != position + data_size {
                warn!("MP3: Xing 数据大小不一致: {length}, {}", position + data_size);
            }
        }

        Some(Self {
            data_start_position: position,
            xing_frame_size: header.frame_size,
            duration_us,
            data_size: Some(data_size),
            data_end_position: Some(position + data_size),
            table_of_contents: Some(table_of_contents),
            toc_truncated: false,
        })
    }

    /// 头声明了目录但首帧放不下
    pub fn is_toc_truncated(&self) -> bool {
        self.toc_truncated
    }

    fn time_us_for_table_index(&self, index: usize) -> i64 {
        self.duration_us * index as i64 / 100
    }
}

/// 目录第 `index` 项的缩放偏移, 第 100 项视为 256
fn scaled_position_at(toc: &[u8; TOC_SIZE], index: usize) -> f64 {
    if index >= TOC_SIZE {
        256.0
    } else {
        f64::from(toc[index])
    }
}

impl SeekMap for XingSeeker {
    fn is_seekable(&self) -> bool {
        self.table_of_contents.is_some()
    }

    fn duration_us(&self) -> Option<i64> {
        Some(self.duration_us)
    }

    fn seek_points(&self, time_us: i64) -> SeekPoints {
        let (Some(toc), Some(data_size)) = (&self.table_of_contents, self.data_size) else {
            return SeekPoints::single(SeekPoint::new(
                0,
                self.data_start_position + u64::from(self.xing_frame_size),
            ));
        };
        let time_us = time_us.clamp(0, self.duration_us);
        let percent = time_us as f64 * 100.0 / self.duration_us as f64;
        let scaled_position = if percent <= 0.0 {
            0.0
        } else if percent >= 100.0 {
            256.0
        } else {
            let prev_index = percent as usize;
            let prev = scaled_position_at(toc, prev_index);
            let next = scaled_position_at(toc, prev_index + 1);
            prev + (percent - prev_index as f64) * (next - prev)
        };
        let offset = ((scaled_position / 256.0) * data_size as f64).round() as u64;
        let offset = offset.max(u64::from(self.xing_frame_size)).min(data_size - 1);
        SeekPoints::single(SeekPoint::new(time_us, self.data_start_position + offset))
    }
}

impl Seeker for XingSeeker {
    fn time_us(&self, position: u64) -> i64 {
        let (Some(toc), Some(data_size)) = (&self.table_of_contents, self.data_size) else {
            return 0;
        };
        let offset = position.saturating_sub(self.data_start_position);
        if offset <= u64::from(self.xing_frame_size) {
            return 0;
        }
        let scaled_position = offset as f64 * 256.0 / data_size as f64;
        let prev_index =
            floor_index_clamped_by_key(toc, &(scaled_position as i64), |&v| i64::from(v));
        let prev_time = self.time_us_for_table_index(prev_index);
        let next_time = self.time_us_for_table_index(prev_index + 1);
        let prev_scaled = scaled_position_at(toc, prev_index);
        let next_scaled = scaled_position_at(toc, prev_index + 1);
        let fraction = if prev_scaled == next_scaled {
            0.0
        } else {
            (scaled_position - prev_scaled) / (next_scaled - prev_scaled)
        };
        prev_time + (fraction * (next_time - prev_time) as f64).round() as i64
    }

    fn data_end_position(&self) -> Option<u64> {
        self.data_end_position
    }

    fn average_bitrate(&self) -> Option<u32> {
        let data_size = self.data_size?;
        if self.duration_us <= 0 {
            return None;
        }
        let bits = i64::try_from(data_size.saturating_mul(8)).ok()?;
        u32::try_from(scale_large_timestamp(bits, MICROS_PER_SECOND, self.duration_us)).ok()
    }
}
