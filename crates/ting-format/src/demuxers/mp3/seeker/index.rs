//! 实时索引定位器.
//!
//! 随着帧被读取, 每隔至少 [`MIN_TIME_BETWEEN_POINTS_US`] 记录一个 (时间, 偏移) 点.
//! 首个点始终是 `(0, 数据起点)`. 时长在读到流末尾前只是估计值.

use ting_core::search::floor_index_clamped;
use ting_core::time::{MICROS_PER_SECOND, scale_large_timestamp};

use super::Seeker;
use crate::extractor::{SeekMap, SeekPoint, SeekPoints};

/// 相邻索引点之间的最小时间间隔 (微秒)
pub const MIN_TIME_BETWEEN_POINTS_US: i64 = 100_000;

/// 实时索引定位器
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSeeker {
    /// 索引点时间, 严格递增
    times_us: Vec<i64>,
    /// 索引点偏移, 与 `times_us` 等长
    positions: Vec<u64>,
    duration_us: Option<i64>,
    data_end_position: Option<u64>,
    average_bitrate: Option<u32>,
}

impl IndexSeeker {
    /// 创建只含起点的索引
    pub fn new(
        duration_us: Option<i64>,
        data_start_position: u64,
        data_end_position: Option<u64>,
    ) -> Self {
        let average_bitrate = match (duration_us, data_end_position) {
            (Some(duration), Some(end)) if duration > 0 && end > data_start_position => {
                let bits = (end - data_start_position).saturating_mul(8);
                let bitrate = scale_large_timestamp(
                    i64::try_from(bits).unwrap_or(i64::MAX),
                    MICROS_PER_SECOND,
                    duration,
                );
                u32::try_from(bitrate).ok()
            }
            _ => None,
        };
        Self {
            times_us: vec![0],
            positions: vec![data_start_position],
            duration_us,
            data_end_position,
            average_bitrate,
        }
    }

    /// 距上个索引点足够远时追加新点
    ///
    /// 调用方须按时间非递减顺序提供点.
    pub fn maybe_add_seek_point(&mut self, time_us: i64, position: u64) {
        if self.is_time_us_in_index(time_us) {
            return;
        }
        self.times_us.push(time_us);
        self.positions.push(position);
    }

    /// `time_us` 是否已被索引覆盖 (与最后一个索引点相距不足最小间隔)
    pub fn is_time_us_in_index(&self, time_us: i64) -> bool {
        let last = self.times_us.last().copied().unwrap_or(0);
        time_us.saturating_sub(last) < MIN_TIME_BETWEEN_POINTS_US
    }

    /// 读到流末尾后修正时长
    pub fn set_duration_us(&mut self, duration_us: i64) {
        self.duration_us = Some(duration_us);
    }

    /// 索引点数量
    pub fn len(&self) -> usize {
        self.times_us.len()
    }

    /// 索引是否为空 (始终至少包含起点)
    pub fn is_empty(&self) -> bool {
        self.times_us.is_empty()
    }
}

impl SeekMap for IndexSeeker {
    fn is_seekable(&self) -> bool {
        true
    }

    fn duration_us(&self) -> Option<i64> {
        self.duration_us
    }

    fn seek_points(&self, time_us: i64) -> SeekPoints {
        let index = floor_index_clamped(&self.times_us, time_us);
        let point = SeekPoint::new(self.times_us[index], self.positions[index]);
        if point.time_us == time_us || index + 1 == self.times_us.len() {
            return SeekPoints::single(point);
        }
        let next = SeekPoint::new(self.times_us[index + 1], self.positions[index + 1]);
        SeekPoints::pair(point, next)
    }
}

impl Seeker for IndexSeeker {
    fn time_us(&self, position: u64) -> i64 {
        let index = floor_index_clamped(&self.positions, position);
        self.times_us[index]
    }

    fn data_end_position(&self) -> Option<u64> {
        self.data_end_position
    }

    fn average_bitrate(&self) -> Option<u32> {
        self.average_bitrate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_起点与最小间隔() {
        let mut seeker = IndexSeeker::new(None, 1_000, None);
        assert_eq!(seeker.len(), 1);
        assert!(seeker.is_time_us_in_index(99_999));
        assert!(!seeker.is_time_us_in_index(100_000));
        assert!(seeker.is_time_us_in_index(i64::MIN));

        seeker.maybe_add_seek_point(26_122, 1_417);
        assert_eq!(seeker.len(), 1);
        seeker.maybe_add_seek_point(104_489, 2_668);
        seeker.maybe_add_seek_point(130_612, 3_085);
        seeker.maybe_add_seek_point(208_979, 4_336);
        assert_eq!(seeker.len(), 3);
        assert_eq!(seeker.times_us, vec![0, 104_489, 208_979]);
        assert_eq!(seeker.positions, vec![1_000, 2_668, 4_336]);
    }

    #[test]
    fn test_索引点间隔不变式() {
        let mut seeker = IndexSeeker::new(None, 0, None);
        // 模拟 44.1kHz 每帧 1152 采样
        for frame in 1..500i64 {
            seeker.maybe_add_seek_point(frame * 1152 * 1_000_000 / 44_100, (frame * 417) as u64);
        }
        assert_eq!(seeker.times_us.len(), seeker.positions.len());
        for pair in seeker.times_us.windows(2) {
            assert!(pair[1] - pair[0] >= MIN_TIME_BETWEEN_POINTS_US);
        }
        for pair in seeker.positions.windows(2) {
            assert!(pair[1] > pair[0]);
        }
    }

    #[test]
    fn test_定位与时间查询() {
        let mut seeker = IndexSeeker::new(Some(1_000_000), 100, Some(10_100));
        seeker.maybe_add_seek_point(200_000, 2_100);
        seeker.maybe_add_seek_point(400_000, 4_100);

        assert_eq!(
            seeker.seek_points(300_000),
            SeekPoints::pair(SeekPoint::new(200_000, 2_100), SeekPoint::new(400_000, 4_100))
        );
        assert_eq!(seeker.seek_points(200_000), SeekPoints::single(SeekPoint::new(200_000, 2_100)));
        // 超出索引范围时返回最后一个点
        assert_eq!(seeker.seek_points(900_000), SeekPoints::single(SeekPoint::new(400_000, 4_100)));

        assert_eq!(seeker.time_us(50), 0);
        assert_eq!(seeker.time_us(3_000), 200_000);
        assert_eq!(seeker.time_us(4_100), 400_000);
        assert_eq!(seeker.data_end_position(), Some(10_100));
        // 10000 字节 / 1s
        assert_eq!(seeker.average_bitrate(), Some(80_000));
    }

    #[test]
    fn test_修正时长() {
        let mut seeker = IndexSeeker::new(None, 0, None);
        assert_eq!(seeker.duration_us(), None);
        seeker.set_duration_us(3_000_000);
        assert_eq!(seeker.duration_us(), Some(3_000_000));
    }
}
