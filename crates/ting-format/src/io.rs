//! I/O 抽象层.
//!
//! 提供带预读 (peek) 能力的字节源. 解封装器需要同时维护两个游标:
//! - 读游标: 已消费数据的位置, 只能通过 `read`/`skip` 前移;
//! - 预读游标: 从读游标开始向后窥视, 不消费数据, 可随时复位.
//!
//! 预读过的数据缓存在内存中, 因此不可随机访问的后端 (如标准输入) 同样支持预读.

use std::io::{self, Read, Seek};

use bytes::{Buf, BytesMut};
use ting_core::{TingError, TingResult};

/// I/O 后端 trait
///
/// 实现此 trait 以支持不同的 I/O 来源 (文件、内存、管道等).
pub trait IoBackend: Send {
    /// 读取数据到缓冲区, 返回 0 表示到达末尾
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    /// 定位 (seek)
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64>;
    /// 获取当前位置
    fn position(&mut self) -> io::Result<u64>;
    /// 获取总大小 (如果可知)
    fn size(&self) -> Option<u64>;
    /// 是否支持 seek
    fn is_seekable(&self) -> bool;
}

/// 单次向后端请求的块大小 (32 KB)
const READ_CHUNK_SIZE: usize = 32 * 1024;

/// I/O 上下文
///
/// 封装底层 I/O 后端, 为解封装器提供读取、跳过与预读接口.
pub struct IoContext {
    /// 内部 I/O 实现
    inner: Box<dyn IoBackend>,
    /// 已从后端取出、尚未消费的数据, 首字节位于读游标处
    pending: BytesMut,
    /// 读游标 (绝对字节位置)
    position: u64,
    /// 预读游标相对读游标的偏移
    peek_offset: usize,
}

impl IoContext {
    /// 从 I/O 后端创建上下文
    pub fn new(mut backend: Box<dyn IoBackend>) -> Self {
        let position = backend.position().unwrap_or(0);
        Self {
            inner: backend,
            pending: BytesMut::new(),
            position,
            peek_offset: 0,
        }
    }

    /// 从文件路径打开 (只读)
    pub fn open_read(path: &str) -> TingResult<Self> {
        let file = std::fs::File::open(path)?;
        Ok(Self::new(Box::new(FileBackend::new(file))))
    }

    /// 从内存数据创建
    pub fn from_memory(data: Vec<u8>) -> Self {
        Self::new(Box::new(MemoryBackend::from_data(data)))
    }

    /// 从任意 `Read` 创建 (不可 seek, 长度未知)
    pub fn from_reader<R: Read + Send + 'static>(reader: R) -> Self {
        Self::new(Box::new(ReadBackend::new(reader)))
    }

    // ========================
    // 读取方法
    // ========================

    /// 读取最多 `buf.len()` 字节, 返回实际读取量, 0 表示到达末尾
    pub fn read(&mut self, buf: &mut [u8]) -> TingResult<usize> {
        self.reset_peek_position();
        if buf.is_empty() {
            return Ok(0);
        }
        let n = if self.pending.is_empty() {
            self.inner.read(buf)?
        } else {
            let n = buf.len().min(self.pending.len());
            buf[..n].copy_from_slice(&self.pending[..n]);
            self.pending.advance(n);
            n
        };
        self.position += n as u64;
        Ok(n)
    }

    /// 读满 `buf`
    ///
    /// 未读到任何字节即到达末尾时, `allow_eof` 为真则返回 `Ok(false)`;
    /// 读到部分数据后到达末尾总是返回 [`TingError::Eof`].
    pub fn read_fully(&mut self, buf: &mut [u8], allow_eof: bool) -> TingResult<bool> {
        let mut total = 0;
        while total < buf.len() {
            let n = self.read(&mut buf[total..])?;
            if n == 0 {
                if total == 0 && allow_eof {
                    return Ok(false);
                }
                return Err(TingError::Eof);
            }
            total += n;
        }
        Ok(true)
    }

    /// 读取指定字节数, 不足时返回 [`TingError::Eof`]
    pub fn read_exact(&mut self, buf: &mut [u8]) -> TingResult<()> {
        self.read_fully(buf, false).map(|_| ())
    }

    /// 跳过最多 `count` 字节, 返回实际跳过量, 0 表示到达末尾
    pub fn skip(&mut self, count: usize) -> TingResult<usize> {
        self.reset_peek_position();
        if count == 0 {
            return Ok(0);
        }
        if !self.pending.is_empty() {
            let n = count.min(self.pending.len());
            self.pending.advance(n);
            self.position += n as u64;
            return Ok(n);
        }
        if self.inner.is_seekable() {
            if let Some(size) = self.inner.size() {
                let n = size.saturating_sub(self.position).min(count as u64);
                if n > 0 {
                    self.inner.seek(io::SeekFrom::Start(self.position + n))?;
                    self.position += n;
                }
                return Ok(n as usize);
            }
        }
        let mut scratch = vec![0u8; count.min(READ_CHUNK_SIZE)];
        let n = self.inner.read(&mut scratch)?;
        self.position += n as u64;
        Ok(n)
    }

    /// 跳过 `count` 字节, 语义同 [`IoContext::read_fully`]
    pub fn skip_fully(&mut self, count: usize, allow_eof: bool) -> TingResult<bool> {
        let mut total = 0;
        while total < count {
            let n = self.skip(count - total)?;
            if n == 0 {
                if total == 0 && allow_eof {
                    return Ok(false);
                }
                return Err(TingError::Eof);
            }
            total += n;
        }
        Ok(true)
    }

    // ========================
    // 预读方法
    // ========================

    /// 从预读游标处窥视 `buf.len()` 字节, 并将预读游标后移
    ///
    /// 语义同 [`IoContext::read_fully`]: 游标处已无数据且 `allow_eof` 为真时返回
    /// `Ok(false)`, 部分数据后到达末尾返回 [`TingError::Eof`].
    pub fn peek_fully(&mut self, buf: &mut [u8], allow_eof: bool) -> TingResult<bool> {
        if !self.advance_peek_position(buf.len(), allow_eof)? {
            return Ok(false);
        }
        let start = self.peek_offset - buf.len();
        buf.copy_from_slice(&self.pending[start..self.peek_offset]);
        Ok(true)
    }

    /// 将预读游标后移 `len` 字节, 语义同 [`IoContext::peek_fully`]
    pub fn advance_peek_position(&mut self, len: usize, allow_eof: bool) -> TingResult<bool> {
        let target = self.peek_offset + len;
        let available = self.fill_pending(target)?;
        if available < target {
            if available <= self.peek_offset && allow_eof {
                return Ok(false);
            }
            return Err(TingError::Eof);
        }
        self.peek_offset = target;
        Ok(true)
    }

    /// 将预读游标复位到读游标
    pub fn reset_peek_position(&mut self) {
        self.peek_offset = 0;
    }

    /// 预读游标的绝对位置
    pub fn peek_position(&self) -> u64 {
        self.position + self.peek_offset as u64
    }

    /// 窥视从读游标开始的最多 `max_len` 字节, 不移动任何游标
    pub fn peek_prefix(&mut self, max_len: usize) -> TingResult<&[u8]> {
        let available = self.fill_pending(max_len)?;
        Ok(&self.pending[..available.min(max_len)])
    }

    /// 确保缓存中至少有 `needed` 字节, 返回实际可用字节数
    fn fill_pending(&mut self, needed: usize) -> TingResult<usize> {
        let mut chunk = [0u8; 4096];
        while self.pending.len() < needed {
            let want = (needed - self.pending.len()).min(chunk.len());
            let n = self.inner.read(&mut chunk[..want])?;
            if n == 0 {
                break;
            }
            self.pending.extend_from_slice(&chunk[..n]);
        }
        Ok(self.pending.len())
    }

    // ========================
    // 定位方法
    // ========================

    /// 读游标的绝对位置
    pub fn position(&self) -> u64 {
        self.position
    }

    /// 输入总长度 (如果可知)
    pub fn length(&self) -> Option<u64> {
        self.inner.size()
    }

    /// 是否支持随机访问
    pub fn is_seekable(&self) -> bool {
        self.inner.is_seekable()
    }

    /// 将读游标移动到绝对位置 `position`
    ///
    /// 不可 seek 的后端只能向前移动.
    pub fn seek_to(&mut self, position: u64) -> TingResult<()> {
        if position == self.position {
            self.reset_peek_position();
            return Ok(());
        }
        if self.inner.is_seekable() {
            self.inner.seek(io::SeekFrom::Start(position))?;
            self.pending.clear();
            self.peek_offset = 0;
            self.position = position;
            return Ok(());
        }
        if position > self.position {
            let distance = (position - self.position) as usize;
            self.skip_fully(distance, false)?;
            return Ok(());
        }
        Err(TingError::Unsupported(format!(
            "输入不支持向后定位: {} -> {}",
            self.position, position,
        )))
    }
}

/// 文件 I/O 后端
pub struct FileBackend {
    file: std::fs::File,
    size: Option<u64>,
}

impl FileBackend {
    /// 包装已打开的文件
    pub fn new(file: std::fs::File) -> Self {
        let size = file.metadata().ok().map(|m| m.len());
        Self { file, size }
    }
}

impl IoBackend for FileBackend {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }

    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }

    fn position(&mut self) -> io::Result<u64> {
        self.file.stream_position()
    }

    fn size(&self) -> Option<u64> {
        self.size
    }

    fn is_seekable(&self) -> bool {
        true
    }
}

/// 内存缓冲区 I/O 后端
///
/// 用于测试和内存中处理.
pub struct MemoryBackend {
    /// 数据缓冲区
    data: Vec<u8>,
    /// 当前位置
    pos: usize,
}

impl MemoryBackend {
    /// 从已有数据创建
    pub fn from_data(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }
}

impl IoBackend for MemoryBackend {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let available = self.data.len().saturating_sub(self.pos);
        let to_read = buf.len().min(available);
        if to_read == 0 {
            return Ok(0);
        }
        buf[..to_read].copy_from_slice(&self.data[self.pos..self.pos + to_read]);
        self.pos += to_read;
        Ok(to_read)
    }

    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let new_pos = match pos {
            io::SeekFrom::Start(offset) => offset as i64,
            io::SeekFrom::End(offset) => self.data.len() as i64 + offset,
            io::SeekFrom::Current(offset) => self.pos as i64 + offset,
        };
        if new_pos < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek 位置不能为负",
            ));
        }
        self.pos = new_pos as usize;
        Ok(self.pos as u64)
    }

    fn position(&mut self) -> io::Result<u64> {
        Ok(self.pos as u64)
    }

    fn size(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }

    fn is_seekable(&self) -> bool {
        true
    }
}

/// 流式 I/O 后端
///
/// 包装任意 `Read` (管道、标准输入、网络流), 不可 seek, 长度未知.
pub struct ReadBackend<R> {
    reader: R,
    /// 已读取字节数
    consumed: u64,
}

impl<R: Read + Send> ReadBackend<R> {
    /// 包装读取器
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            consumed: 0,
        }
    }
}

impl<R: Read + Send> IoBackend for ReadBackend<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.reader.read(buf) {
                Ok(n) => {
                    self.consumed += n as u64;
                    return Ok(n);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn seek(&mut self, _pos: io::SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "流式输入不支持 seek",
        ))
    }

    fn position(&mut self) -> io::Result<u64> {
        Ok(self.consumed)
    }

    fn size(&self) -> Option<u64> {
        None
    }

    fn is_seekable(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_data() -> Vec<u8> {
        (0u8..=99).collect()
    }

    #[test]
    fn test_预读不消费数据() {
        let mut io = IoContext::from_memory(sample_data());
        let mut buf = [0u8; 4];
        assert!(io.peek_fully(&mut buf, false).unwrap());
        assert_eq!(buf, [0, 1, 2, 3]);
        assert!(io.peek_fully(&mut buf, false).unwrap());
        assert_eq!(buf, [4, 5, 6, 7]);
        assert_eq!(io.position(), 0);
        assert_eq!(io.peek_position(), 8);

        io.reset_peek_position();
        io.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [0, 1, 2, 3]);
        assert_eq!(io.position(), 4);
    }

    #[test]
    fn test_消费操作复位预读游标() {
        let mut io = IoContext::from_memory(sample_data());
        assert!(io.advance_peek_position(10, false).unwrap());
        assert!(io.skip_fully(2, false).unwrap());
        assert_eq!(io.peek_position(), 2);
        let mut buf = [0u8; 1];
        io.peek_fully(&mut buf, false).unwrap();
        assert_eq!(buf[0], 2);
    }

    #[test]
    fn test_预读到末尾() {
        let mut io = IoContext::from_memory(vec![1, 2, 3]);
        let mut buf = [0u8; 3];
        assert!(io.peek_fully(&mut buf, true).unwrap());
        // 游标处已无数据
        assert!(!io.peek_fully(&mut buf, true).unwrap());
        // 部分数据后到达末尾
        io.reset_peek_position();
        io.advance_peek_position(1, false).unwrap();
        assert!(matches!(io.peek_fully(&mut buf, true), Err(TingError::Eof)));
        // 不允许末尾
        io.reset_peek_position();
        io.advance_peek_position(3, false).unwrap();
        assert!(matches!(io.peek_fully(&mut buf, false), Err(TingError::Eof)));
    }

    #[test]
    fn test_读取与跳过到末尾() {
        let mut io = IoContext::from_memory(vec![9; 5]);
        let mut buf = [0u8; 5];
        assert!(io.read_fully(&mut buf, true).unwrap());
        assert!(!io.read_fully(&mut buf, true).unwrap());
        assert!(!io.skip_fully(3, true).unwrap());
        assert_eq!(io.skip(3).unwrap(), 0);
    }

    #[test]
    fn test_流式后端预读与跳过() {
        let mut io = IoContext::from_reader(std::io::Cursor::new(sample_data()));
        assert!(!io.is_seekable());
        assert_eq!(io.length(), None);
        let prefix = io.peek_prefix(16).unwrap().to_vec();
        assert_eq!(prefix.len(), 16);
        assert_eq!(io.position(), 0);
        io.seek_to(40).unwrap();
        let mut buf = [0u8; 2];
        io.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [40, 41]);
        assert!(io.seek_to(0).is_err());
    }

    #[test]
    fn test_可seek后端定位() {
        let mut io = IoContext::from_memory(sample_data());
        io.advance_peek_position(50, false).unwrap();
        io.seek_to(90).unwrap();
        assert_eq!(io.position(), 90);
        assert_eq!(io.peek_position(), 90);
        let mut buf = [0u8; 1];
        io.read_exact(&mut buf).unwrap();
        assert_eq!(buf[0], 90);
        assert_eq!(io.skip(100).unwrap(), 9);
        assert_eq!(io.position(), 100);
    }
}
