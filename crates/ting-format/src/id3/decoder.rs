//! ID3v2.2/2.3/2.4 标签解码.
//!
//! 支持扩展头、整体 (v2.2/2.3) 与逐帧 (v2.4) 去同步、数据长度指示与分组标识.
//! 压缩或加密的帧直接跳过.

use encoding_rs::{Encoding, UTF_8, UTF_16BE, UTF_16LE, WINDOWS_1252};
use log::warn;
use ting_core::bytereader::synchsafe_to_u32;
use ting_core::{BitReader, ByteReader};

use super::{FramePredicate, ID3_HEADER_LENGTH, Id3Frame, Id3Tag, MlltFrame};

/// 文本编码字节
const ENCODING_ISO_8859_1: u8 = 0;
const ENCODING_UTF16: u8 = 1;
const ENCODING_UTF16BE: u8 = 2;
const ENCODING_UTF8: u8 = 3;

/// 标签头解析结果
struct TagHeader {
    major_version: u8,
    /// 帧区域字节数 (不含扩展头与页脚)
    frames_size: usize,
    /// 整个帧区域经过去同步处理 (v2.2/2.3)
    is_unsynchronized: bool,
}

/// 单帧解码结果
enum FrameStep {
    Frame(Id3Frame),
    Skipped,
    End,
}

/// 解码一个完整的 ID3v2 标签 (含 10 字节标签头)
///
/// 标签头无效或版本不受支持时返回 `None`.
pub fn decode(data: &[u8], predicate: Option<FramePredicate>) -> Option<Id3Tag> {
    let mut reader = ByteReader::new(data);
    let header = decode_header(&mut reader)?;
    let major_version = header.major_version;

    let body_start = reader.position();
    let frames_size = header.frames_size.min(reader.remaining());
    let mut body = data[body_start..body_start + frames_size].to_vec();
    if header.is_unsynchronized {
        body = remove_unsynchronization(&body);
    }

    let frame_header_size = if major_version == 2 { 6 } else { 10 };
    let mut unsigned_size_hack = false;
    if !validate_frames(&body, major_version, frame_header_size, false) {
        // 部分编码器在 v2.4 中错误地使用普通整数表示帧大小
        if major_version == 4 && validate_frames(&body, 4, frame_header_size, true) {
            unsigned_size_hack = true;
        } else {
            warn!("ID3: 帧校验失败, 主版本号={major_version}");
            return None;
        }
    }

    let mut frames = Vec::new();
    let mut reader = ByteReader::new(&body);
    while reader.remaining() >= frame_header_size {
        match decode_frame(&mut reader, major_version, predicate, unsigned_size_hack) {
            FrameStep::Frame(frame) => frames.push(frame),
            FrameStep::Skipped => {}
            FrameStep::End => break,
        }
    }
    Some(Id3Tag {
        major_version,
        frames,
    })
}

fn decode_header(reader: &mut ByteReader<'_>) -> Option<TagHeader> {
    if reader.remaining() < ID3_HEADER_LENGTH {
        warn!("ID3: 数据不足以构成标签头");
        return None;
    }
    let magic = reader.read_bytes(3).ok()?;
    if magic != b"ID3" {
        warn!("ID3: 意外的标签起始 {magic:02X?}");
        return None;
    }
    let major_version = reader.read_u8().ok()?;
    reader.skip(1).ok()?;
    let flags = reader.read_u8().ok()?;
    let mut frames_size = reader.read_synchsafe_u32().ok()? as usize;

    match major_version {
        2 => {
            if flags & 0x40 != 0 {
                warn!("ID3: v2.2 标签使用了未定义的压缩方式, 跳过");
                return None;
            }
        }
        3 => {
            if flags & 0x40 != 0 {
                let extended_size = reader.read_u32_be().ok()? as usize;
                reader.skip(extended_size).ok()?;
                frames_size = frames_size.checked_sub(extended_size + 4)?;
            }
        }
        4 => {
            if flags & 0x40 != 0 {
                let extended_size = reader.read_synchsafe_u32().ok()? as usize;
                reader.skip(extended_size.checked_sub(4)?).ok()?;
                frames_size = frames_size.checked_sub(extended_size)?;
            }
        }
        _ => {
            warn!("ID3: 不支持的主版本号 {major_version}");
            return None;
        }
    }

    Some(TagHeader {
        major_version,
        frames_size,
        is_unsynchronized: major_version < 4 && flags & 0x80 != 0,
    })
}

/// 读取帧头中的 (帧大小, 标志)
fn read_frame_size_and_flags(
    reader: &mut ByteReader<'_>,
    major_version: u8,
    unsigned_size_hack: bool,
) -> Option<(usize, u16)> {
    match major_version {
        2 => Some((reader.read_u24_be().ok()? as usize, 0)),
        3 => {
            let size = reader.read_u32_be().ok()? as usize;
            Some((size, reader.read_u16_be().ok()?))
        }
        _ => {
            let raw = reader.read_bytes(4).ok()?;
            let size = if unsigned_size_hack {
                u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]])
            } else {
                if raw.iter().any(|b| b & 0x80 != 0) {
                    return None;
                }
                synchsafe_to_u32(raw)
            };
            Some((size as usize, reader.read_u16_be().ok()?))
        }
    }
}

fn validate_frames(
    body: &[u8],
    major_version: u8,
    frame_header_size: usize,
    unsigned_size_hack: bool,
) -> bool {
    let id_length = if major_version == 2 { 3 } else { 4 };
    let mut reader = ByteReader::new(body);
    while reader.remaining() >= frame_header_size {
        let Ok(id) = reader.read_bytes(id_length) else {
            return false;
        };
        let Some((size, flags)) =
            read_frame_size_and_flags(&mut reader, major_version, unsigned_size_hack)
        else {
            return false;
        };
        if id.iter().all(|&b| b == 0) && size == 0 && flags == 0 {
            // 填充区
            return true;
        }
        let mut minimum_size = 0;
        if major_version == 4 {
            if flags & 0x0001 != 0 {
                minimum_size += 4;
            }
            if flags & 0x0040 != 0 {
                minimum_size += 1;
            }
        } else if major_version == 3 {
            if flags & 0x0080 != 0 {
                minimum_size += 4;
            }
            if flags & 0x0020 != 0 {
                minimum_size += 1;
            }
        }
        if size < minimum_size || reader.skip(size).is_err() {
            return false;
        }
    }
    true
}

fn decode_frame(
    reader: &mut ByteReader<'_>,
    major_version: u8,
    predicate: Option<FramePredicate>,
    unsigned_size_hack: bool,
) -> FrameStep {
    let id_length = if major_version == 2 { 3 } else { 4 };
    let Ok(id) = reader.read_bytes(id_length) else {
        return FrameStep::End;
    };
    let Some((size, flags)) = read_frame_size_and_flags(reader, major_version, unsigned_size_hack)
    else {
        return FrameStep::End;
    };
    if id.iter().all(|&b| b == 0) && size == 0 && flags == 0 {
        return FrameStep::End;
    }
    let Ok(frame_data) = reader.read_bytes(size) else {
        warn!("ID3: 帧大小超出标签剩余数据");
        return FrameStep::End;
    };
    if predicate.is_some_and(|p| !p(major_version, id)) {
        return FrameStep::Skipped;
    }

    let id_str = String::from_utf8_lossy(id).into_owned();
    let (compressed, encrypted, grouped, unsynchronized, has_data_length) = match major_version {
        3 => {
            let compressed = flags & 0x0080 != 0;
            (compressed, flags & 0x0040 != 0, flags & 0x0020 != 0, false, compressed)
        }
        4 => (
            flags & 0x0008 != 0,
            flags & 0x0004 != 0,
            flags & 0x0040 != 0,
            flags & 0x0002 != 0,
            flags & 0x0001 != 0,
        ),
        _ => (false, false, false, false, false),
    };
    if compressed || encrypted {
        warn!("ID3: 跳过压缩或加密的帧 {id_str}");
        return FrameStep::Skipped;
    }

    let mut payload = frame_data;
    if grouped {
        payload = payload.get(1..).unwrap_or_default();
    }
    if has_data_length {
        payload = payload.get(4..).unwrap_or_default();
    }
    let resynchronized;
    if unsynchronized {
        resynchronized = remove_unsynchronization(payload);
        payload = &resynchronized;
    }

    let decoded = match id_str.as_str() {
        "TXXX" | "TXX" => decode_user_text_frame(payload),
        s if s.starts_with('T') => decode_text_frame(&id_str, payload),
        "COMM" | "COM" => decode_comment_frame(payload),
        "MLLT" | "MLL" => decode_mllt_frame(payload),
        _ => None,
    };
    FrameStep::Frame(decoded.unwrap_or_else(|| Id3Frame::Binary {
        id: id_str,
        data: payload.to_vec(),
    }))
}

fn decode_text_frame(id: &str, data: &[u8]) -> Option<Id3Frame> {
    let (&encoding, rest) = data.split_first()?;
    Some(Id3Frame::Text {
        id: id.to_string(),
        values: decode_text_values(rest, encoding),
    })
}

fn decode_user_text_frame(data: &[u8]) -> Option<Id3Frame> {
    let (&encoding, rest) = data.split_first()?;
    let description_end = index_of_terminator(rest, encoding);
    let description = decode_string(&rest[..description_end], encoding);
    let values_start = (description_end + delimiter_length(encoding)).min(rest.len());
    Some(Id3Frame::UserText {
        description,
        values: decode_text_values(&rest[values_start..], encoding),
    })
}

fn decode_comment_frame(data: &[u8]) -> Option<Id3Frame> {
    if data.len() < 4 {
        return None;
    }
    let encoding = data[0];
    let language = String::from_utf8_lossy(&data[1..4]).into_owned();
    let rest = &data[4..];
    let description_end = index_of_terminator(rest, encoding);
    let description = decode_string(&rest[..description_end], encoding);
    let text_start = (description_end + delimiter_length(encoding)).min(rest.len());
    let rest = &rest[text_start..];
    let text_end = index_of_terminator(rest, encoding);
    Some(Id3Frame::Comment {
        language,
        description,
        text: decode_string(&rest[..text_end], encoding),
    })
}

fn decode_mllt_frame(data: &[u8]) -> Option<Id3Frame> {
    let mut reader = ByteReader::new(data);
    let mpeg_frames_between_reference = reader.read_u16_be().ok()?;
    let bytes_between_reference = reader.read_u24_be().ok()?;
    let milliseconds_between_reference = reader.read_u24_be().ok()?;
    let bits_for_bytes = reader.read_u8().ok()?;
    let bits_for_milliseconds = reader.read_u8().ok()?;

    let references = reader.read_bytes(reader.remaining()).ok()?;
    let bits_per_reference = usize::from(bits_for_bytes) + usize::from(bits_for_milliseconds);
    let count = if bits_per_reference == 0 {
        0
    } else {
        references.len() * 8 / bits_per_reference
    };
    let mut bits = BitReader::new(references);
    let mut bytes_deviations = Vec::with_capacity(count);
    let mut milliseconds_deviations = Vec::with_capacity(count);
    for _ in 0..count {
        bytes_deviations.push(bits.read_bits(u32::from(bits_for_bytes)).ok()?);
        milliseconds_deviations.push(bits.read_bits(u32::from(bits_for_milliseconds)).ok()?);
    }

    Some(Id3Frame::Mllt(MlltFrame {
        mpeg_frames_between_reference,
        bytes_between_reference,
        milliseconds_between_reference,
        bytes_deviations,
        milliseconds_deviations,
    }))
}

/// 按终止符拆分多值文本 (v2.4 允许一个文本帧包含多个值)
fn decode_text_values(data: &[u8], encoding: u8) -> Vec<String> {
    let mut values = Vec::new();
    let mut rest = data;
    loop {
        let end = index_of_terminator(rest, encoding);
        values.push(decode_string(&rest[..end], encoding));
        let next = end + delimiter_length(encoding);
        if next >= rest.len() {
            break;
        }
        rest = &rest[next..];
    }
    values
}

fn encoding_for(encoding: u8) -> &'static Encoding {
    match encoding {
        ENCODING_UTF16 => UTF_16LE,
        ENCODING_UTF16BE => UTF_16BE,
        ENCODING_UTF8 => UTF_8,
        _ => WINDOWS_1252,
    }
}

/// 解码文本; UTF-16 依据 BOM 判断字节序
fn decode_string(bytes: &[u8], encoding: u8) -> String {
    let (text, _, _) = encoding_for(encoding).decode(bytes);
    text.into_owned()
}

fn delimiter_length(encoding: u8) -> usize {
    if encoding == ENCODING_UTF16 || encoding == ENCODING_UTF16BE {
        2
    } else {
        1
    }
}

/// 终止符位置, 没有终止符时返回数据长度
fn index_of_terminator(data: &[u8], encoding: u8) -> usize {
    if delimiter_length(encoding) == 1 {
        return data.iter().position(|&b| b == 0).unwrap_or(data.len());
    }
    data.chunks_exact(2)
        .position(|pair| pair == [0, 0])
        .map(|i| i * 2)
        .unwrap_or(data.len())
}

/// 去同步: 把 `FF 00` 还原为 `FF`
fn remove_unsynchronization(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        out.push(data[i]);
        if data[i] == 0xFF && data.get(i + 1) == Some(&0x00) {
            i += 1;
        }
        i += 1;
    }
    out
}
