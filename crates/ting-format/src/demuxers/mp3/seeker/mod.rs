//! MP3 定位器.
//!
//! 定位器负责字节偏移与播放时间之间的双向换算. 解封装器在同步后
//! 按流中实际存在的元数据选出一种:
//!
//! | 定位器 | 依据 |
//! |---|---|
//! | [`UnseekableSeeker`] | 禁用定位 |
//! | [`ConstantBitrateSeeker`] | 首帧比特率, 线性换算 |
//! | [`IndexSeeker`] | 读取过程中实时建立的稀疏索引 |
//! | [`XingSeeker`] | Xing/Info 头中的 100 项百分比目录 |
//! | [`VbriSeeker`] | VBRI 头中的变长目录 |
//! | [`MlltSeeker`] | ID3 MLLT 参考点线性插值 |

mod constant_bitrate;
mod index;
mod mllt;
mod vbri;
mod xing;

pub use constant_bitrate::ConstantBitrateSeeker;
pub use index::{IndexSeeker, MIN_TIME_BETWEEN_POINTS_US};
pub use mllt::MlltSeeker;
pub(crate) use vbri::VBRI_OFFSET;
pub use vbri::VbriSeeker;
pub use xing::XingSeeker;

use crate::extractor::{SeekMap, SeekPoint, SeekPoints};

/// 定位器的公共能力
pub trait Seeker: SeekMap {
    /// 字节偏移 `position` 处的播放时间 (微秒)
    fn time_us(&self, position: u64) -> i64;

    /// 音频数据之后第一个字节的偏移, 未知时为 `None`
    fn data_end_position(&self) -> Option<u64>;

    /// 平均码率 (bps), 未知时为 `None`
    fn average_bitrate(&self) -> Option<u32> {
        None
    }
}

/// 不支持定位的定位器
///
/// 仍可携带已知的总时长.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnseekableSeeker {
    duration_us: Option<i64>,
}

impl UnseekableSeeker {
    /// 创建不可定位的定位器
    pub fn new(duration_us: Option<i64>) -> Self {
        Self { duration_us }
    }
}

impl SeekMap for UnseekableSeeker {
    fn is_seekable(&self) -> bool {
        false
    }

    fn duration_us(&self) -> Option<i64> {
        self.duration_us
    }

    fn seek_points(&self, _time_us: i64) -> SeekPoints {
        SeekPoints::single(SeekPoint::START)
    }
}

impl Seeker for UnseekableSeeker {
    fn time_us(&self, _position: u64) -> i64 {
        0
    }

    fn data_end_position(&self) -> Option<u64> {
        None
    }
}

/// 解封装器持有的定位器
#[derive(Debug, Clone)]
pub enum Mp3Seeker {
    /// 不可定位
    Unseekable(UnseekableSeeker),
    /// 恒定码率
    ConstantBitrate(ConstantBitrateSeeker),
    /// 实时索引
    Index(IndexSeeker),
    /// Xing/Info 目录
    Xing(XingSeeker),
    /// VBRI 目录
    Vbri(VbriSeeker),
    /// ID3 MLLT 参考点
    Mllt(MlltSeeker),
}

macro_rules! dispatch {
    ($self:expr, $s:ident => $body:expr) => {
        match $self {
            Mp3Seeker::Unseekable($s) => $body,
            Mp3Seeker::ConstantBitrate($s) => $body,
            Mp3Seeker::Index($s) => $body,
            Mp3Seeker::Xing($s) => $body,
            Mp3Seeker::Vbri($s) => $body,
            Mp3Seeker::Mllt($s) => $body,
        }
    };
}

impl Mp3Seeker {
    /// 定位器名称, 用于日志与诊断输出
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unseekable(_) => "unseekable",
            Self::ConstantBitrate(_) => "constant-bitrate",
            Self::Index(_) => "index",
            Self::Xing(_) => "xing",
            Self::Vbri(_) => "vbri",
            Self::Mllt(_) => "mllt",
        }
    }

    /// 若为索引定位器, 返回其可变引用
    pub fn as_index_mut(&mut self) -> Option<&mut IndexSeeker> {
        match self {
            Self::Index(s) => Some(s),
            _ => None,
        }
    }

    /// 若为索引定位器, 返回其引用
    pub fn as_index(&self) -> Option<&IndexSeeker> {
        match self {
            Self::Index(s) => Some(s),
            _ => None,
        }
    }
}

impl SeekMap for Mp3Seeker {
    fn is_seekable(&self) -> bool {
        dispatch!(self, s => s.is_seekable())
    }

    fn duration_us(&self) -> Option<i64> {
        dispatch!(self, s => s.duration_us())
    }

    fn seek_points(&self, time_us: i64) -> SeekPoints {
        dispatch!(self, s => s.seek_points(time_us))
    }
}

impl Seeker for Mp3Seeker {
    fn time_us(&self, position: u64) -> i64 {
        dispatch!(self, s => s.time_us(position))
    }

    fn data_end_position(&self) -> Option<u64> {
        dispatch!(self, s => s.data_end_position())
    }

    fn average_bitrate(&self) -> Option<u32> {
        dispatch!(self, s => s.average_bitrate())
    }
}
