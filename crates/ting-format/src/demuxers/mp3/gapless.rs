//! 无缝播放信息 (编码器延迟与填充).

use crate::id3::Id3Tag;

/// iTunes 写入的注释描述
const GAPLESS_COMMENT_DESCRIPTION: &str = "iTunSMPB";

/// 编码器在音频首尾插入的样本数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GaplessInfo {
    /// 开头需要丢弃的样本数
    pub encoder_delay: u32,
    /// 结尾需要丢弃的样本数
    pub encoder_padding: u32,
}

impl GaplessInfo {
    /// 解析 LAME 扩展中的 24 位值: 高 12 位为延迟, 低 12 位为填充
    ///
    /// 两者均为 0 时返回 `None`.
    pub fn from_xing_value(value: u32) -> Option<Self> {
        Self::non_empty((value >> 12) & 0xFFF, value & 0xFFF)
    }

    /// 解析 `iTunSMPB` 注释文本
    ///
    /// 格式为 ` XXXXXXXX DDDDDDDD PPPPPPPP ...`, 各字段为 8 位十六进制数,
    /// 第二个字段为延迟, 第三个字段为填充.
    pub fn from_comment(text: &str) -> Option<Self> {
        let rest = text.strip_prefix(' ')?;
        let mut fields = rest.splitn(4, ' ');
        let _ = parse_hex_field(fields.next()?)?;
        let delay = parse_hex_field(fields.next()?)?;
        let padding = parse_hex_field(fields.next()?)?;
        Self::non_empty(delay, padding)
    }

    /// 从 ID3 注释帧中查找 `iTunSMPB`
    pub fn from_id3(tag: &Id3Tag) -> Option<Self> {
        tag.comments()
            .filter(|(description, _)| *description == GAPLESS_COMMENT_DESCRIPTION)
            .find_map(|(_, text)| Self::from_comment(text))
    }

    fn non_empty(encoder_delay: u32, encoder_padding: u32) -> Option<Self> {
        (encoder_delay > 0 || encoder_padding > 0).then_some(Self {
            encoder_delay,
            encoder_padding,
        })
    }
}

fn parse_hex_field(field: &str) -> Option<u32> {
    if field.len() != 8 || !field.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(field, 16).ok()
}
