//! 容器格式标识符.

use std::fmt;

/// 容器格式标识符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum FormatId {
    /// MP3 原生容器 (裸 MPEG Audio, 可带 ID3v2 标签)
    Mp3Container,
}

impl FormatId {
    /// 所有已知格式标识的列表
    pub const ALL: &[FormatId] = &[Self::Mp3Container];

    /// 获取格式的人类可读名称
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Mp3Container => "mp3",
        }
    }

    /// 获取格式常用的文件扩展名
    pub const fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Mp3Container => &["mp3", "mp2", "mp1", "mpga"],
        }
    }

    /// 根据文件扩展名猜测格式
    ///
    /// # 参数
    /// - `ext`: 文件扩展名 (不含 `.`, 如 "mp3")
    pub fn from_extension(ext: &str) -> Option<FormatId> {
        let ext_lower = ext.to_lowercase();
        Self::ALL
            .iter()
            .find(|id| id.extensions().contains(&ext_lower.as_str()))
            .copied()
    }

    /// 从文件路径猜测格式
    pub fn from_filename(filename: &str) -> Option<FormatId> {
        let (_, ext) = filename.rsplit_once('.')?;
        Self::from_extension(ext)
    }
}

impl fmt::Display for FormatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_扩展名识别() {
        assert_eq!(FormatId::from_filename("a/b/song.MP3"), Some(FormatId::Mp3Container));
        assert_eq!(FormatId::from_extension("mpga"), Some(FormatId::Mp3Container));
        assert_eq!(FormatId::from_filename("video.mp4"), None);
        assert_eq!(FormatId::from_filename("mp3"), None);
        assert_eq!(FormatId::Mp3Container.to_string(), "mp3");
    }
}
