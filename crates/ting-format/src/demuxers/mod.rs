//! 解封装器实现模块.

pub mod mp3;

use crate::format_id::FormatId;
use crate::registry::FormatRegistry;

/// 注册所有内置解封装器
pub fn register_all_demuxers(registry: &mut FormatRegistry) {
    registry.register_demuxer(FormatId::Mp3Container, "mp3", mp3::Mp3Demuxer::create);
    registry.register_probe(Box::new(mp3::Mp3Probe));
}
