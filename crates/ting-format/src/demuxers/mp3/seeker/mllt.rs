//! ID3 MLLT 参考点定位器.
//!
//! MLLT 帧给出名义上的 "每个参考点间隔的字节数/毫秒数" 以及每个参考点
//! 相对名义值的偏差. 累加后得到一组 (偏移, 毫秒) 参考点, 两点之间线性插值.

use ting_core::search::floor_index_clamped;
use ting_core::time::{ms_to_us, us_to_ms};

use super::Seeker;
use crate::extractor::{SeekMap, SeekPoint, SeekPoints};
use crate::id3::MlltFrame;

/// MLLT 参考点定位器
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MlltSeeker {
    /// 参考点偏移, 首项为首帧偏移
    reference_positions: Vec<i64>,
    /// 参考点时间 (毫秒), 首项为 0
    reference_times_ms: Vec<i64>,
    duration_us: i64,
}

impl MlltSeeker {
    /// 由 MLLT 帧构建参考点
    pub fn create(first_frame_position: u64, frame: &MlltFrame) -> Self {
        let count = frame
            .bytes_deviations
            .len()
            .min(frame.milliseconds_deviations.len());
        let mut reference_positions = Vec::with_capacity(count + 1);
        let mut reference_times_ms = Vec::with_capacity(count + 1);

        let mut position = i64::try_from(first_frame_position).unwrap_or(i64::MAX);
        let mut time_ms = 0i64;
        reference_positions.push(position);
        reference_times_ms.push(time_ms);
        for i in 0..count {
            position = position.saturating_add(
                i64::from(frame.bytes_between_reference) + i64::from(frame.bytes_deviations[i]),
            );
            time_ms = time_ms.saturating_add(
                i64::from(frame.milliseconds_between_reference)
                    + i64::from(frame.milliseconds_deviations[i]),
            );
            reference_positions.push(position);
            reference_times_ms.push(time_ms);
        }

        Self {
            reference_positions,
            reference_times_ms,
            duration_us: ms_to_us(time_ms),
        }
    }
}

/// 在参考点数组间线性插值
///
/// `x` 先被限制在参考范围内, 落在最后一个参考点上时直接返回该点.
fn linearly_interpolate(x: i64, x_references: &[i64], y_references: &[i64]) -> (i64, i64) {
    let first = x_references[0];
    let last = x_references[x_references.len() - 1];
    let x = x.clamp(first, last);

    let index = floor_index_clamped(x_references, x);
    let x_previous = x_references[index];
    let y_previous = y_references[index];
    let Some((&x_next, &y_next)) = x_references.get(index + 1).zip(y_references.get(index + 1))
    else {
        return (x_previous, y_previous);
    };
    let proportion = if x_next == x_previous {
        0.0
    } else {
        (x - x_previous) as f64 / (x_next - x_previous) as f64
    };
    let y = (proportion * (y_next - y_previous) as f64) as i64 + y_previous;
    (x, y)
}

impl SeekMap for MlltSeeker {
    fn is_seekable(&self) -> bool {
        true
    }

    fn duration_us(&self) -> Option<i64> {
        Some(self.duration_us)
    }

    fn seek_points(&self, time_us: i64) -> SeekPoints {
        let time_us = time_us.clamp(0, self.duration_us);
        let (time_ms, position) = linearly_interpolate(
            us_to_ms(time_us),
            &self.reference_times_ms,
            &self.reference_positions,
        );
        SeekPoints::single(SeekPoint::new(ms_to_us(time_ms), position.max(0) as u64))
    }
}

impl Seeker for MlltSeeker {
    fn time_us(&self, position: u64) -> i64 {
        let position = i64::try_from(position).unwrap_or(i64::MAX);
        let (_, time_ms) =
            linearly_interpolate(position, &self.reference_positions, &self.reference_times_ms);
        ms_to_us(time_ms)
    }

    fn data_end_position(&self) -> Option<u64> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 参考点: 偏移 [1000, 1500, 2600], 毫秒 [0, 400, 1000]
    fn three_point_seeker() -> MlltSeeker {
        let frame = MlltFrame {
            mpeg_frames_between_reference: 10,
            bytes_between_reference: 500,
            milliseconds_between_reference: 400,
            bytes_deviations: vec![0, 600],
            milliseconds_deviations: vec![0, 200],
        };
        MlltSeeker::create(1000, &frame)
    }

    #[test]
    fn test_参考点累加() {
        let seeker = three_point_seeker();
        assert_eq!(seeker.reference_positions, vec![1000, 1500, 2600]);
        assert_eq!(seeker.reference_times_ms, vec![0, 400, 1000]);
        assert_eq!(seeker.duration_us(), Some(1_000_000));
        assert!(seeker.is_seekable());
        assert_eq!(seeker.data_end_position(), None);
    }

    #[test]
    fn test_偏移插值为时间() {
        let seeker = three_point_seeker();
        // 相邻参考点 (1000, 0ms) 与 (1500, 400ms): 0 + 250 / 500 * 400ms
        assert_eq!(seeker.time_us(1250), 200_000);
        assert_eq!(seeker.time_us(1500), 400_000);
        // (2050 - 1500) / 1100 * 600 + 400
        assert_eq!(seeker.time_us(2050), 700_000);
    }

    #[test]
    fn test_时间插值为偏移() {
        let seeker = three_point_seeker();
        assert_eq!(
            seeker.seek_points(700_000),
            SeekPoints::single(SeekPoint::new(700_000, 2050))
        );
        assert_eq!(
            seeker.seek_points(0),
            SeekPoints::single(SeekPoint::new(0, 1000))
        );
    }

    #[test]
    fn test_超出范围时钳制() {
        let seeker = three_point_seeker();
        assert_eq!(seeker.time_us(0), 0);
        assert_eq!(seeker.time_us(100_000), 1_000_000);
        assert_eq!(
            seeker.seek_points(5_000_000),
            SeekPoints::single(SeekPoint::new(1_000_000, 2600))
        );
        assert_eq!(
            seeker.seek_points(-10),
            SeekPoints::single(SeekPoint::new(0, 1000))
        );
    }

    #[test]
    fn test_无偏差参考点() {
        let frame = MlltFrame {
            mpeg_frames_between_reference: 1,
            bytes_between_reference: 417,
            milliseconds_between_reference: 26,
            bytes_deviations: vec![],
            milliseconds_deviations: vec![],
        };
        let seeker = MlltSeeker::create(0, &frame);
        assert_eq!(seeker.duration_us(), Some(0));
        assert_eq!(seeker.time_us(1000), 0);
        assert_eq!(seeker.seek_points(10), SeekPoints::single(SeekPoint::new(0, 0)));
    }

    #[test]
    fn test_往返误差在一个参考区间内() {
        let seeker = three_point_seeker();
        for time_us in (0..=1_000_000).step_by(50_000) {
            let point = seeker.seek_points(time_us).first;
            let back = seeker.time_us(point.position);
            assert!((back - time_us).abs() <= 600_000, "t={time_us} back={back}");
            assert!(point.position >= 1000 && point.position <= 2600);
        }
    }
}
