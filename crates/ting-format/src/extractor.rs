//! 流式解封装的输出接口.
//!
//! 解封装状态机按步推进, 每一步把帧数据写入 [`TrackOutput`],
//! 并在选定定位器后通过 [`ExtractorOutput::seek_map`] 发布定位映射.

use crate::track::TrackOutput;

/// 单步读取结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadResult {
    /// 可以继续读取
    Continue,
    /// 输入已结束
    EndOfInput,
}

/// 定位点: (时间戳, 字节偏移)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekPoint {
    /// 时间戳 (微秒)
    pub time_us: i64,
    /// 字节偏移
    pub position: u64,
}

impl SeekPoint {
    /// 创建定位点
    pub const fn new(time_us: i64, position: u64) -> Self {
        Self { time_us, position }
    }

    /// 流起点
    pub const START: Self = Self::new(0, 0);
}

/// 一次定位请求的候选点
///
/// `second` 存在时, 两个点按时间非递减排列, 目标时间落在两者之间.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekPoints {
    /// 第一个候选点
    pub first: SeekPoint,
    /// 第二个候选点 (可选)
    pub second: Option<SeekPoint>,
}

impl SeekPoints {
    /// 只有一个候选点
    pub const fn single(point: SeekPoint) -> Self {
        Self {
            first: point,
            second: None,
        }
    }

    /// 一对候选点
    pub const fn pair(first: SeekPoint, second: SeekPoint) -> Self {
        Self {
            first,
            second: Some(second),
        }
    }
}

/// 时间到字节偏移的映射
pub trait SeekMap {
    /// 是否支持定位
    fn is_seekable(&self) -> bool;

    /// 总时长 (微秒), `None` 表示未知
    fn duration_us(&self) -> Option<i64>;

    /// 获取 `time_us` 对应的候选定位点
    fn seek_points(&self, time_us: i64) -> SeekPoints;
}

/// 解封装器的输出端
pub trait ExtractorOutput {
    /// 音频轨道的输出
    fn track(&mut self) -> &mut dyn TrackOutput;

    /// 发布 (或重新发布) 定位映射
    fn seek_map(&mut self, seek_map: &dyn SeekMap);
}
