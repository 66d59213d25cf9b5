//! ID3v2 标签.
//!
//! MP3 流开头可能有一个或多个连续的 ID3v2 标签. 解封装器只解码第一个,
//! 其余仅跳过. 其中的 MLLT 帧提供定位参考点, `COMM` 中的 iTunSMPB 注释与
//! `TLEN` 帧分别提供无缝播放信息和时长.

mod decoder;

use log::debug;
use ting_core::bytereader::synchsafe_to_u32;
use ting_core::time::ms_to_us;
use ting_core::{TingError, TingResult};

use crate::io::IoContext;

pub use decoder::decode;

/// ID3v2 标签头长度
pub const ID3_HEADER_LENGTH: usize = 10;

/// 帧过滤器: 参数为主版本号与帧 ID (v2.2 为 3 字节, 其余 4 字节)
///
/// 返回 `false` 的帧直接跳过, 不解码.
pub type FramePredicate = fn(major_version: u8, id: &[u8]) -> bool;

/// 只保留无缝播放与定位所必需的帧 (`COMM` 与 `MLLT`)
pub fn is_required_frame(major_version: u8, id: &[u8]) -> bool {
    let fourth_matches = |c: u8| id.get(3) == Some(&c) || major_version == 2;
    (id.starts_with(b"COM") && fourth_matches(b'M')) || (id.starts_with(b"MLL") && fourth_matches(b'T'))
}

/// MPEG 定位查找表 (MLLT) 帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MlltFrame {
    /// 相邻参考点之间的 MPEG 帧数
    pub mpeg_frames_between_reference: u16,
    /// 相邻参考点之间的名义字节数
    pub bytes_between_reference: u32,
    /// 相邻参考点之间的名义毫秒数
    pub milliseconds_between_reference: u32,
    /// 每个参考点的字节偏差
    pub bytes_deviations: Vec<u32>,
    /// 每个参考点的毫秒偏差
    pub milliseconds_deviations: Vec<u32>,
}

/// 已解码的 ID3v2 帧
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Id3Frame {
    /// 文本信息帧 (`T***`)
    Text { id: String, values: Vec<String> },
    /// 用户自定义文本帧 (`TXXX`)
    UserText {
        description: String,
        values: Vec<String>,
    },
    /// 注释帧 (`COMM`)
    Comment {
        language: String,
        description: String,
        text: String,
    },
    /// 定位查找表 (`MLLT`)
    Mllt(MlltFrame),
    /// 其他帧, 保留原始数据
    Binary { id: String, data: Vec<u8> },
}

/// 已解码的 ID3v2 标签
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Id3Tag {
    /// 主版本号 (2, 3, 4)
    pub major_version: u8,
    /// 按出现顺序排列的帧
    pub frames: Vec<Id3Frame>,
}

impl Id3Tag {
    /// 第一个 MLLT 帧
    pub fn mllt(&self) -> Option<&MlltFrame> {
        self.frames.iter().find_map(|f| match f {
            Id3Frame::Mllt(m) => Some(m),
            _ => None,
        })
    }

    /// 指定文本帧的第一个值
    pub fn text(&self, frame_id: &str) -> Option<&str> {
        self.frames.iter().find_map(|f| match f {
            Id3Frame::Text { id, values } if id == frame_id => values.first().map(String::as_str),
            _ => None,
        })
    }

    /// `TLEN` 帧声明的时长 (微秒)
    pub fn tlen_us(&self) -> Option<i64> {
        let value = self.text("TLEN").or_else(|| self.text("TLE"))?;
        value.trim().parse::<i64>().ok().map(ms_to_us)
    }

    /// 所有注释帧: (描述, 文本)
    pub fn comments(&self) -> impl Iterator<Item = (&str, &str)> {
        self.frames.iter().filter_map(|f| match f {
            Id3Frame::Comment {
                description, text, ..
            } => Some((description.as_str(), text.as_str())),
            _ => None,
        })
    }

    /// 转换为 (键, 值) 形式的文本元数据
    pub fn to_metadata(&self) -> Vec<(String, String)> {
        let mut metadata = Vec::new();
        for frame in &self.frames {
            match frame {
                Id3Frame::Text { id, values } => {
                    let key = text_frame_key(id).unwrap_or(id.as_str());
                    metadata.push((key.to_string(), values.join("; ")));
                }
                Id3Frame::UserText {
                    description,
                    values,
                } => metadata.push((description.clone(), values.join("; "))),
                Id3Frame::Comment {
                    description, text, ..
                } => {
                    let key = if description.is_empty() {
                        "comment".to_string()
                    } else {
                        format!("comment:{description}")
                    };
                    metadata.push((key, text.clone()));
                }
                Id3Frame::Mllt(_) | Id3Frame::Binary { .. } => {}
            }
        }
        metadata
    }
}

/// 常见文本帧对应的元数据键名
fn text_frame_key(id: &str) -> Option<&'static str> {
    Some(match id {
        "TIT2" | "TT2" => "title",
        "TPE1" | "TP1" => "artist",
        "TPE2" | "TP2" => "album_artist",
        "TALB" | "TAL" => "album",
        "TRCK" | "TRK" => "track",
        "TPOS" | "TPA" => "disc",
        "TCON" | "TCO" => "genre",
        "TYER" | "TYE" | "TDRC" => "date",
        "TCOM" | "TCM" => "composer",
        "TENC" | "TEN" => "encoded_by",
        "TSSE" | "TSS" => "encoder",
        "TLEN" | "TLE" => "length_ms",
        _ => return None,
    })
}

/// 从预读游标处窥视连续的 ID3v2 标签
///
/// 只解码第一个标签, 其余跳过. 返回后预读游标位于最后一个标签之后,
/// 读游标不变. 标签在输入结束处被截断时停止扫描.
pub fn peek_id3_data(
    io: &mut IoContext,
    predicate: Option<FramePredicate>,
) -> TingResult<Option<Id3Tag>> {
    let start = (io.peek_position() - io.position()) as usize;
    let mut peeked_bytes = 0usize;
    let mut tag: Option<Id3Tag> = None;
    loop {
        let mut header = [0u8; ID3_HEADER_LENGTH];
        match io.peek_fully(&mut header, true) {
            Ok(true) => {}
            Ok(false) | Err(TingError::Eof) => break,
            Err(e) => return Err(e),
        }
        if &header[0..3] != b"ID3" {
            break;
        }
        let frames_length = synchsafe_to_u32(&header[6..10]) as usize;
        let has_footer = header[3] == 4 && header[5] & 0x10 != 0;
        let tag_length = ID3_HEADER_LENGTH + frames_length + if has_footer { 10 } else { 0 };

        if tag.is_none() {
            let mut data = vec![0u8; tag_length];
            data[..ID3_HEADER_LENGTH].copy_from_slice(&header);
            match io.peek_fully(&mut data[ID3_HEADER_LENGTH..], false) {
                Ok(_) => {}
                Err(TingError::Eof) => break,
                Err(e) => return Err(e),
            }
            tag = decode(&data, predicate);
        } else {
            match io.advance_peek_position(tag_length - ID3_HEADER_LENGTH, false) {
                Ok(_) => {}
                Err(TingError::Eof) => break,
                Err(e) => return Err(e),
            }
        }
        debug!("ID3: 标签 v2.{} 长度={tag_length}", header[3]);
        peeked_bytes += tag_length;
    }
    io.reset_peek_position();
    io.advance_peek_position(start + peeked_bytes, false)?;
    Ok(tag)
}
