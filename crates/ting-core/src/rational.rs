//! 有理数类型, 用于描述流与数据包的时间基.
//!
//! MP3 解封装输出的时间戳统一以微秒计, 对应时间基 [`Rational::MICRO`].

use std::fmt;

/// 有理数, 由分子和分母组成
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    /// 分子
    pub num: i32,
    /// 分母
    pub den: i32,
}

impl Rational {
    /// 创建新的有理数, `den` 不应为 0
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// 未定义 (分母为 0)
    pub const UNDEFINED: Self = Self { num: 0, den: 0 };

    /// 微秒时间基 (1/1_000_000)
    pub const MICRO: Self = Self {
        num: 1,
        den: 1_000_000,
    };

    /// 判断是否有效 (分母不为 0)
    pub const fn is_valid(&self) -> bool {
        self.den != 0
    }

    /// 转换为 f64, 分母为 0 时返回 `f64::NAN`
    pub fn to_f64(self) -> f64 {
        if self.den == 0 {
            return f64::NAN;
        }
        f64::from(self.num) / f64::from(self.den)
    }

    /// 将以本时间基表示的时间戳换算为秒
    pub fn ticks_to_seconds(self, ticks: i64) -> f64 {
        ticks as f64 * self.to_f64()
    }
}

impl Default for Rational {
    fn default() -> Self {
        Self::UNDEFINED
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_微秒时间基() {
        assert!(Rational::MICRO.is_valid());
        assert!((Rational::MICRO.ticks_to_seconds(1_500_000) - 1.5).abs() < 1e-9);
        assert_eq!(Rational::MICRO.to_string(), "1/1000000");
    }

    #[test]
    fn test_未定义() {
        assert!(!Rational::default().is_valid());
        assert!(Rational::UNDEFINED.to_f64().is_nan());
    }
}
