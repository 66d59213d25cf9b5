//! 内存字节读取器.
//!
//! 以大端序从一段已读入内存的字节 (如一整帧、一个 ID3 标签) 中顺序解析字段.
//! 越界读取返回 [`TingError::Eof`], 由调用方决定是视为截断还是直接失败.

use byteorder::{BigEndian, ByteOrder};

use crate::{TingError, TingResult};

/// 内存字节读取器
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    /// 源数据
    data: &'a [u8],
    /// 当前读取位置
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// 创建新的读取器
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// 当前读取位置
    pub fn position(&self) -> usize {
        self.pos
    }

    /// 剩余字节数
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// 取出接下来的 n 个字节
    pub fn read_bytes(&mut self, n: usize) -> TingResult<&'a [u8]> {
        if n > self.remaining() {
            return Err(TingError::Eof);
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// 跳过 n 个字节
    pub fn skip(&mut self, n: usize) -> TingResult<()> {
        self.read_bytes(n).map(|_| ())
    }

    /// 读取 1 个字节
    pub fn read_u8(&mut self) -> TingResult<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    /// 读取 u16 大端
    pub fn read_u16_be(&mut self) -> TingResult<u16> {
        Ok(BigEndian::read_u16(self.read_bytes(2)?))
    }

    /// 读取 u24 大端 (3 字节无符号整数)
    pub fn read_u24_be(&mut self) -> TingResult<u32> {
        Ok(BigEndian::read_u24(self.read_bytes(3)?))
    }

    /// 读取 u32 大端
    pub fn read_u32_be(&mut self) -> TingResult<u32> {
        Ok(BigEndian::read_u32(self.read_bytes(4)?))
    }

    /// 读取 ID3v2 同步安全整数 (4 字节, 每字节只用低 7 位)
    pub fn read_synchsafe_u32(&mut self) -> TingResult<u32> {
        Ok(synchsafe_to_u32(self.read_bytes(4)?))
    }
}

/// 解码 4 字节同步安全整数
///
/// 调用方需保证 `bytes` 至少 4 字节.
pub fn synchsafe_to_u32(bytes: &[u8]) -> u32 {
    bytes[..4]
        .iter()
        .fold(0u32, |acc, &b| (acc << 7) | u32::from(b & 0x7F))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_顺序读取大端字段() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A];
        let mut r = ByteReader::new(&data);
        assert_eq!(r.read_u8().unwrap(), 0x01);
        assert_eq!(r.read_u16_be().unwrap(), 0x0203);
        assert_eq!(r.read_u24_be().unwrap(), 0x040506);
        assert_eq!(r.read_u32_be().unwrap(), 0x0708090A);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_同步安全整数() {
        // 0x00 0x00 0x02 0x01 => (2 << 7) | 1 = 257
        let data = [0x00, 0x00, 0x02, 0x01];
        let mut r = ByteReader::new(&data);
        assert_eq!(r.read_synchsafe_u32().unwrap(), 257);
        assert_eq!(synchsafe_to_u32(&[0x7F, 0x7F, 0x7F, 0x7F]), 0x0FFF_FFFF);
    }

    #[test]
    fn test_截断时返回_eof_且不移动位置() {
        let data = [0xAA, 0xBB];
        let mut r = ByteReader::new(&data);
        r.skip(1).unwrap();
        assert!(matches!(r.read_u32_be(), Err(TingError::Eof)));
        assert_eq!(r.position(), 1);
        assert_eq!(r.read_u8().unwrap(), 0xBB);
    }
}
