//! 比特流读取器.
//!
//! 按大端位序 (MSB first) 从字节缓冲区中读取任意宽度的位字段.
//! ID3 MLLT 帧中的偏差表就是以这种方式紧密排列的, 每个条目的位宽由帧头声明.

use crate::{TingError, TingResult};

/// 比特流读取器
///
/// # 示例
/// ```
/// use ting_core::bitreader::BitReader;
///
/// // 两个 4 位字段 + 一个 8 位字段
/// let data = [0x12, 0x34];
/// let mut br = BitReader::new(&data);
/// assert_eq!(br.read_bits(4).unwrap(), 1);
/// assert_eq!(br.read_bits(4).unwrap(), 2);
/// assert_eq!(br.read_bits(8).unwrap(), 0x34);
/// ```
pub struct BitReader<'a> {
    /// 源数据
    data: &'a [u8],
    /// 已消耗的位数
    bit_offset: usize,
}

impl<'a> BitReader<'a> {
    /// 创建新的比特流读取器
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            bit_offset: 0,
        }
    }

    /// 获取已读取的总位数
    pub fn bits_read(&self) -> usize {
        self.bit_offset
    }

    /// 获取剩余可读位数
    pub fn bits_left(&self) -> usize {
        (self.data.len() * 8).saturating_sub(self.bit_offset)
    }

    /// 是否已到达末尾
    pub fn is_eof(&self) -> bool {
        self.bits_left() == 0
    }

    /// 读取 1 个位
    pub fn read_bit(&mut self) -> TingResult<bool> {
        Ok(self.read_bits(1)? == 1)
    }

    /// 读取 N 个位 (最多 32 位), 返回值的低 N 位有效
    pub fn read_bits(&mut self, n: u32) -> TingResult<u32> {
        if n > 32 {
            return Err(TingError::InvalidArgument(format!(
                "read_bits: n={n} 超过 32 位"
            )));
        }
        if n as usize > self.bits_left() {
            return Err(TingError::Eof);
        }

        let mut result = 0u64;
        let mut remaining = n as usize;
        while remaining > 0 {
            let byte = self.data[self.bit_offset / 8];
            let used = self.bit_offset % 8;
            let take = remaining.min(8 - used);
            let bits = (byte >> (8 - used - take)) & (0xFFu8 >> (8 - take));
            result = (result << take) | u64::from(bits);
            self.bit_offset += take;
            remaining -= take;
        }
        Ok(result as u32)
    }

    /// 跳过 N 个位
    pub fn skip_bits(&mut self, n: usize) -> TingResult<()> {
        if n > self.bits_left() {
            return Err(TingError::Eof);
        }
        self.bit_offset += n;
        Ok(())
    }
}
