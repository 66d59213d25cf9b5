//! # ting-format
//!
//! Ting 流式 MP3 解封装库.
//!
//! 提供可窥视的字节源 [`IoContext`], 逐步推进的 MP3 解封装状态机
//! ([`demuxers::mp3::Mp3Extractor`]) 及其六种定位器, ID3v2 标签解码,
//! 以及按数据包拉取的 [`Demuxer`] 接口和格式注册表.

pub mod demuxer;
pub mod demuxers;
pub mod extractor;
pub mod format_id;
pub mod id3;
pub mod io;
pub mod packet;
pub mod probe;
pub mod registry;
pub mod stream;
pub mod track;

// 重导出常用类型
pub use demuxer::Demuxer;
pub use demuxers::mp3::{Mp3Demuxer, Mp3Extractor, Mp3Flags};
pub use extractor::{ExtractorOutput, ReadResult, SeekMap, SeekPoint, SeekPoints};
pub use format_id::FormatId;
pub use io::IoContext;
pub use packet::Packet;
pub use probe::ProbeResult;
pub use registry::FormatRegistry;
pub use stream::Stream;
pub use track::{PacketTrackOutput, TrackFormat, TrackOutput};

/// 注册所有内置容器格式
pub fn register_all(registry: &mut FormatRegistry) {
    demuxers::register_all_demuxers(registry);
}
