//! MPEG 音频帧头解析.
//!
//! 帧头结构 (32 位):
//! ```text
//! AAAA AAAA  AAAB BCCD  EEEE FFGH  IIJJ KLMM
//! A = 同步位 (11 bit, 全1)   B = MPEG 版本    C = 层
//! D = CRC 保护              E = 比特率索引    F = 采样率索引
//! G = 填充位                H = 私有位        I = 声道模式
//! J = 模式扩展              K = 版权         L = 原始/复制
//! M = 强调
//! ```

/// 同一条流中必须保持一致的帧头位: 同步位、版本、层、采样率索引
pub const HEADER_MASK: u32 = 0xFFFE_0C00;

/// 单帧的最大字节数
pub const MAX_FRAME_SIZE: usize = 4096;

/// MPEG 音频版本
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpegVersion {
    /// MPEG-1
    V1,
    /// MPEG-2
    V2,
    /// MPEG-2.5
    V25,
}

/// MPEG 音频帧头部信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MpegAudioHeader {
    /// MPEG 版本
    pub version: MpegVersion,
    /// 层 (1, 2, 3)
    pub layer: u8,
    /// 比特率 (bps)
    pub bitrate: u32,
    /// 采样率 (Hz)
    pub sample_rate: u32,
    /// 声道模式 (0=立体声, 1=联合立体声, 2=双声道, 3=单声道)
    pub channel_mode: u8,
    /// 声道数
    pub channels: u8,
    /// 帧总字节数 (含头部)
    pub frame_size: u32,
    /// 每帧采样数
    pub samples_per_frame: u32,
    /// 样本 MIME 类型
    pub mime_type: &'static str,
}

/// MPEG-1 Layer I 比特率表 (kbps)
const BITRATE_V1_L1: [u32; 15] = [
    0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448,
];

/// MPEG-2/2.5 Layer I 比特率表 (kbps)
const BITRATE_V2_L1: [u32; 15] = [
    0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256,
];

/// MPEG-1 Layer II 比特率表 (kbps)
const BITRATE_V1_L2: [u32; 15] = [
    0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384,
];

/// MPEG-1 Layer III 比特率表 (kbps)
const BITRATE_V1_L3: [u32; 15] = [
    0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320,
];

/// MPEG-2/2.5 Layer II/III 比特率表 (kbps)
const BITRATE_V2_L23: [u32; 15] = [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160];

/// MPEG-1 采样率表
const SAMPLERATE_V1: [u32; 3] = [44100, 48000, 32000];

impl MpegAudioHeader {
    /// 解析 4 字节帧头, 无效 (含自由格式) 时返回 `None`
    pub fn decode(header: u32) -> Option<Self> {
        // 同步位 (bit 31-21 必须全为 1)
        if (header >> 21) != 0x7FF {
            return None;
        }

        let version = match (header >> 19) & 0x03 {
            0 => MpegVersion::V25,
            2 => MpegVersion::V2,
            3 => MpegVersion::V1,
            _ => return None,
        };

        let layer = match (header >> 17) & 0x03 {
            1 => 3,
            2 => 2,
            3 => 1,
            _ => return None,
        };

        let br_idx = ((header >> 12) & 0x0F) as usize;
        if br_idx == 0 || br_idx == 15 {
            return None;
        }
        let bitrate_kbps = match (version, layer) {
            (MpegVersion::V1, 1) => BITRATE_V1_L1[br_idx],
            (MpegVersion::V1, 2) => BITRATE_V1_L2[br_idx],
            (MpegVersion::V1, _) => BITRATE_V1_L3[br_idx],
            (_, 1) => BITRATE_V2_L1[br_idx],
            (_, _) => BITRATE_V2_L23[br_idx],
        };
        let bitrate = bitrate_kbps * 1000;

        let sr_idx = ((header >> 10) & 0x03) as usize;
        if sr_idx == 3 {
            return None;
        }
        let sample_rate = match version {
            MpegVersion::V1 => SAMPLERATE_V1[sr_idx],
            MpegVersion::V2 => SAMPLERATE_V1[sr_idx] / 2,
            MpegVersion::V25 => SAMPLERATE_V1[sr_idx] / 4,
        };

        let padding = (header >> 9) & 1;
        let channel_mode = ((header >> 6) & 0x03) as u8;

        let samples_per_frame = match (version, layer) {
            (_, 1) => 384,
            (_, 2) => 1152,
            (MpegVersion::V1, _) => 1152,
            (_, _) => 576,
        };

        let frame_size = if layer == 1 {
            (12 * bitrate / sample_rate + padding) * 4
        } else {
            // 仅 MPEG-2/2.5 Layer III 的每帧采样数减半
            let factor = if layer == 3 && version != MpegVersion::V1 {
                72
            } else {
                144
            };
            factor * bitrate / sample_rate + padding
        };

        let mime_type = match layer {
            1 => "audio/mpeg-L1",
            2 => "audio/mpeg-L2",
            _ => "audio/mpeg",
        };

        Some(Self {
            version,
            layer,
            bitrate,
            sample_rate,
            channel_mode,
            channels: if channel_mode == 3 { 1 } else { 2 },
            frame_size,
            samples_per_frame,
            mime_type,
        })
    }

    /// Xing/Info 标签在帧内的偏移
    pub fn xing_offset(&self) -> usize {
        match (self.version, self.channels) {
            (MpegVersion::V1, 1) => 21,
            (MpegVersion::V1, _) => 36,
            (_, 1) => 13,
            (_, _) => 21,
        }
    }
}

/// 帧总字节数, 帧头无效时返回 `None`
pub fn frame_size(header: u32) -> Option<u32> {
    MpegAudioHeader::decode(header).map(|h| h.frame_size)
}

/// 两个帧头是否属于同一条流 (比特率与填充允许不同)
pub fn headers_match(a: u32, b: u32) -> bool {
    (a & HEADER_MASK) == (b & HEADER_MASK)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 构造 MPEG-1 Layer III 立体声帧头
    fn make_header(bitrate_idx: u32, sr_idx: u32, padding: bool) -> u32 {
        let mut h: u32 = 0xFFFB_0000;
        h |= (bitrate_idx & 0x0F) << 12;
        h |= (sr_idx & 0x03) << 10;
        if padding {
            h |= 1 << 9;
        }
        h
    }

    #[test]
    fn test_帧头解析_mpeg1_layer3_128kbps_44100() {
        let fh = MpegAudioHeader::decode(make_header(9, 0, false)).unwrap();
        assert_eq!(fh.version, MpegVersion::V1);
        assert_eq!(fh.layer, 3);
        assert_eq!(fh.bitrate, 128_000);
        assert_eq!(fh.sample_rate, 44100);
        assert_eq!(fh.samples_per_frame, 1152);
        assert_eq!(fh.channels, 2);
        assert_eq!(fh.mime_type, "audio/mpeg");
        // 144 * 128000 / 44100 = 417
        assert_eq!(fh.frame_size, 417);
        assert_eq!(fh.xing_offset(), 36);
    }

    #[test]
    fn test_帧头解析_填充与单声道() {
        let fh = MpegAudioHeader::decode(make_header(9, 0, true) | 0xC0).unwrap();
        assert_eq!(fh.frame_size, 418);
        assert_eq!(fh.channels, 1);
        assert_eq!(fh.xing_offset(), 21);
    }

    #[test]
    fn test_帧头解析_mpeg2_各层() {
        // MPEG-2 Layer III 64kbps 22050Hz: 72 * 64000 / 22050 = 208
        let l3 = MpegAudioHeader::decode(0xFFF3_8000).unwrap();
        assert_eq!(l3.version, MpegVersion::V2);
        assert_eq!(l3.sample_rate, 22050);
        assert_eq!(l3.samples_per_frame, 576);
        assert_eq!(l3.frame_size, 208);
        assert_eq!(l3.xing_offset(), 21);

        // MPEG-2 Layer II 64kbps 22050Hz: 144 * 64000 / 22050 = 417
        let l2 = MpegAudioHeader::decode(0xFFF5_8000).unwrap();
        assert_eq!(l2.layer, 2);
        assert_eq!(l2.samples_per_frame, 1152);
        assert_eq!(l2.frame_size, 417);
        assert_eq!(l2.mime_type, "audio/mpeg-L2");

        // MPEG-2 Layer I 索引 4 = 64kbps: (12 * 64000 / 22050) * 4 = 136
        let l1 = MpegAudioHeader::decode(0xFFF7_4000).unwrap();
        assert_eq!(l1.bitrate, 64_000);
        assert_eq!(l1.samples_per_frame, 384);
        assert_eq!(l1.frame_size, 136);
    }

    #[test]
    fn test_帧头解析_mpeg25() {
        // MPEG-2.5 Layer III 32kbps 11025Hz: 72 * 32000 / 11025 = 208
        let fh = MpegAudioHeader::decode(0xFFE3_4000).unwrap();
        assert_eq!(fh.version, MpegVersion::V25);
        assert_eq!(fh.sample_rate, 11025);
        assert_eq!(fh.frame_size, 208);
    }

    #[test]
    fn test_帧头解析_无效() {
        assert!(MpegAudioHeader::decode(0x0000_0000).is_none());
        assert!(MpegAudioHeader::decode(0x1234_5678).is_none());
        // 自由格式
        assert!(MpegAudioHeader::decode(make_header(0, 0, false)).is_none());
        // 无效比特率
        assert!(MpegAudioHeader::decode(make_header(15, 0, false)).is_none());
        // 保留采样率
        assert!(MpegAudioHeader::decode(make_header(9, 3, false)).is_none());
        // 保留版本
        assert!(MpegAudioHeader::decode(0xFFEB_9000).is_none());
        // 保留层
        assert!(MpegAudioHeader::decode(0xFFF9_9000).is_none());
        assert_eq!(frame_size(0x1234_5678), None);
    }

    #[test]
    fn test_帧头匹配() {
        let a = make_header(9, 0, false);
        // 比特率与填充不同仍匹配
        assert!(headers_match(a, make_header(14, 0, true)));
        // 采样率不同不匹配
        assert!(!headers_match(a, make_header(9, 1, false)));
        // 版本不同不匹配
        assert!(!headers_match(a, 0xFFF3_9000));
    }
}
