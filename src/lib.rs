//! # Ting (听)
//!
//! 纯 Rust 实现的流式 MP3 解封装库.
//!
//! Ting 从可窥视的字节流中定位 MPEG 音频帧, 逐帧输出带时间戳的数据包,
//! 并依据流中携带的元数据选择定位器, 在播放时间与字节偏移之间换算:
//! - **恒定码率**: 按首帧比特率线性换算
//! - **Xing/Info**: 100 项百分比目录
//! - **VBRI**: 变长目录
//! - **ID3 MLLT**: 参考点线性插值
//! - **索引**: 读取过程中实时建立
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use ting::format::{Demuxer, IoContext};
//!
//! let registry = ting::default_format_registry();
//! let mut io = IoContext::open_read("song.mp3").unwrap();
//! let mut demuxer = registry.open_input(&mut io, Some("song.mp3")).unwrap();
//! while let Ok(packet) = demuxer.read_packet(&mut io) {
//!     println!("{:.3}s {} 字节", packet.pts_seconds(), packet.size());
//! }
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `ting-core` | 错误类型, 时间换算, 比特/字节读取器 |
//! | `ting-format` | 字节源, MP3 解封装, 定位器, ID3 解码 |

/// 核心类型与工具
pub use ting_core as core;

/// 容器格式框架
pub use ting_format as format;

/// 获取 Ting 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// 创建已注册所有内置容器格式的注册表
pub fn default_format_registry() -> ting_format::FormatRegistry {
    let mut registry = ting_format::FormatRegistry::new();
    ting_format::register_all(&mut registry);
    registry
}
