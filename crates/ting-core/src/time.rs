//! 时间换算工具.
//!
//! 解封装层统一使用微秒 (`i64`) 表示时间戳, `None` 表示未知时长.

/// 每秒微秒数
pub const MICROS_PER_SECOND: i64 = 1_000_000;

/// 计算 `timestamp * multiplier / divisor`, 中间结果使用 128 位避免溢出
///
/// `divisor` 为 0 时返回 0.
pub fn scale_large_timestamp(timestamp: i64, multiplier: i64, divisor: i64) -> i64 {
    if divisor == 0 {
        return 0;
    }
    let scaled = i128::from(timestamp) * i128::from(multiplier) / i128::from(divisor);
    scaled.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64
}

/// 毫秒转微秒
pub fn ms_to_us(time_ms: i64) -> i64 {
    time_ms.saturating_mul(1000)
}

/// 微秒转毫秒 (向零截断)
pub fn us_to_ms(time_us: i64) -> i64 {
    time_us / 1000
}

/// 微秒转秒
pub fn us_to_seconds(time_us: i64) -> f64 {
    time_us as f64 / MICROS_PER_SECOND as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_大数缩放不溢出() {
        // 100 万帧 * 1152 采样 * 1e6 / 44100
        let us = scale_large_timestamp(1_000_000, 1152 * MICROS_PER_SECOND, 44_100);
        assert_eq!(us, 26_122_448_979);
    }

    #[test]
    fn test_毫秒微秒互换() {
        assert_eq!(ms_to_us(1_500), 1_500_000);
        assert_eq!(us_to_ms(1_234_567), 1_234);
        assert!((us_to_seconds(2_500_000) - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_除数为零() {
        assert_eq!(scale_large_timestamp(10, 10, 0), 0);
    }
}
