//! # ting-core
//!
//! Ting 核心库, 提供错误处理、字节/比特读取、有序表查找与时间换算等基础设施.
//!
//! 上层的 `ting-format` 在此之上实现流式 MP3 解封装与定位索引.

pub mod bitreader;
pub mod bytereader;
pub mod error;
pub mod rational;
pub mod search;
pub mod time;

// 重导出常用类型
pub use bitreader::BitReader;
pub use bytereader::ByteReader;
pub use error::{TingError, TingResult};
pub use rational::Rational;
