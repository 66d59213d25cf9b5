//! 解封装器 (Demuxer) trait 定义.
//!
//! 在流式解封装状态机之上提供按数据包拉取的接口.

use ting_core::TingResult;

use crate::extractor::SeekPoint;
use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::packet::Packet;
use crate::stream::Stream;

/// 解封装器 trait
///
/// 使用流程:
/// 1. 调用 `open()` 同步到首帧并解析流信息
/// 2. 调用 `streams()` 获取流信息
/// 3. 循环调用 `read_packet()` 读取数据包
/// 4. 可选: 调用 `seek()` 进行定位
pub trait Demuxer: Send {
    /// 获取格式标识
    fn format_id(&self) -> FormatId;

    /// 获取格式名称
    fn name(&self) -> &str;

    /// 打开输入并解析流信息
    fn open(&mut self, io: &mut IoContext) -> TingResult<()>;

    /// 获取所有流信息
    fn streams(&self) -> &[Stream];

    /// 读取下一个数据包
    ///
    /// # 返回
    /// - `Ok(packet)`: 成功读取一个数据包
    /// - `Err(TingError::Eof)`: 已到达输入末尾
    fn read_packet(&mut self, io: &mut IoContext) -> TingResult<Packet>;

    /// 定位到 `time_us` (微秒), 返回实际使用的定位点
    ///
    /// 之后读到的第一个数据包从返回的定位点开始.
    fn seek(&mut self, io: &mut IoContext, time_us: i64) -> TingResult<SeekPoint>;

    /// 是否支持定位
    fn is_seekable(&self) -> bool;

    /// 获取时长 (秒), None 表示未知
    fn duration(&self) -> Option<f64>;

    /// 获取容器元数据
    fn metadata(&self) -> &[(String, String)] {
        &[]
    }
}
