//! ting-probe - MP3 信息探测工具
//!
//! 对标 FFmpeg 的 ffprobe, 输出 MP3 流的格式, 流参数, 定位映射与数据包统计.

mod logging;

use std::path::PathBuf;

use anyhow::{Context, bail};
use clap::Parser;
use log::{debug, warn};
use serde::Serialize;

use ting_core::TingError;
use ting_format::demuxers::mp3::{Mp3Demuxer, Mp3Extractor, Mp3Flags};
use ting_format::{Demuxer, FormatId, FormatRegistry, IoContext};

/// Ting MP3 信息探测工具
#[derive(Parser, Debug)]
#[command(name = "ting-probe", version, about = "纯 Rust MP3 信息探测工具")]
struct Cli {
    /// 输入文件路径, `-` 表示标准输入
    input: String,

    /// 显示数据包统计 (会读取全部数据包)
    #[arg(long)]
    show_packets: bool,

    /// 定位到指定时间 (秒) 并报告定位点
    #[arg(long, value_name = "SECONDS")]
    seek: Option<f64>,

    /// 输出 JSON 格式
    #[arg(long)]
    json: bool,

    /// 静默模式 (只输出探测结果)
    #[arg(short, long)]
    quiet: bool,

    /// 日志详细程度 (-v: debug, -vv: trace)
    #[arg(short, action = clap::ArgAction::Count)]
    verbose: u8,

    /// 日志文件目录 (按天滚动)
    #[arg(long, value_name = "DIR")]
    log_dir: Option<PathBuf>,

    /// 关闭恒定码率定位
    #[arg(long)]
    no_cbr: bool,

    /// 输入长度未知时也允许恒定码率定位
    #[arg(long)]
    cbr_always: bool,

    /// 使用读取时建立的索引定位
    #[arg(long)]
    index: bool,

    /// 只解析定位所需的 ID3 帧
    #[arg(long)]
    no_id3: bool,

    /// 禁用定位
    #[arg(long)]
    no_seek: bool,
}

impl Cli {
    /// 命令行开关对应的解封装配置
    fn flags(&self) -> Mp3Flags {
        let mut flags = Mp3Flags::empty();
        flags.set(Mp3Flags::ENABLE_CONSTANT_BITRATE_SEEKING, !self.no_cbr);
        flags.set(Mp3Flags::ENABLE_CONSTANT_BITRATE_SEEKING_ALWAYS, self.cbr_always);
        flags.set(Mp3Flags::ENABLE_INDEX_SEEKING, self.index);
        flags.set(Mp3Flags::DISABLE_ID3_METADATA, self.no_id3);
        flags
    }
}

// ============================================================
// 输出结构体
// ============================================================

/// 完整探测结果
#[derive(Serialize)]
struct ProbeOutput {
    format: FormatInfo,
    streams: Vec<StreamInfo>,
    seek_map: SeekMapReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    packets: Option<PacketSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seek: Option<SeekReport>,
}

/// 格式信息
#[derive(Serialize)]
struct FormatInfo {
    filename: String,
    format_name: String,
    nb_streams: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<f64>,
    probe_score: u32,
}

/// 流信息
#[derive(Serialize)]
struct StreamInfo {
    index: usize,
    codec_type: String,
    mime_type: String,
    time_base: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<f64>,
    sample_rate: u32,
    channels: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    bit_rate: Option<u32>,
    samples_per_frame: u32,
    encoder_delay: u32,
    encoder_padding: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    metadata: Vec<(String, String)>,
}

/// 定位映射
#[derive(Serialize)]
struct SeekMapReport {
    seeker: String,
    seekable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<f64>,
}

/// 数据包统计
#[derive(Serialize)]
struct PacketSummary {
    total_packets: u64,
    total_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    first_pts: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_pts: Option<f64>,
}

/// 定位结果
#[derive(Serialize)]
struct SeekReport {
    target: f64,
    point_time: f64,
    point_position: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    first_packet_pts: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    first_packet_pos: Option<u64>,
}

// ============================================================
// 主逻辑
// ============================================================

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.log_dir.as_deref())?;

    if !cli.quiet {
        eprintln!(
            "ting-probe 版本 {} -- 纯 Rust MP3 探测工具",
            env!("CARGO_PKG_VERSION")
        );
        eprintln!("输入文件: {}", cli.input);
    }

    let output = run(&cli)?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("序列化探测结果失败")?;
        println!("{json}");
    } else {
        print_format_text(&output.format);
        print_streams_text(&output.streams);
        print_seek_map_text(&output.seek_map);
        if let Some(ref summary) = output.packets {
            print_packets_text(summary);
        }
        if let Some(ref report) = output.seek {
            print_seek_text(report);
        }
    }
    Ok(())
}

/// 打开输入
fn open_input(input: &str) -> anyhow::Result<IoContext> {
    if input == "-" {
        return Ok(IoContext::from_reader(std::io::stdin()));
    }
    IoContext::open_read(input).with_context(|| format!("无法打开文件 '{input}'"))
}

/// 探测, 打开并按命令行要求收集信息
fn run(cli: &Cli) -> anyhow::Result<ProbeOutput> {
    let mut registry = FormatRegistry::new();
    ting_format::register_all(&mut registry);

    let mut io = open_input(&cli.input)?;
    let filename = (cli.input != "-").then_some(cli.input.as_str());
    let probe_result = registry
        .probe_input(&mut io, filename)
        .context("无法识别文件格式")?;
    if probe_result.format_id != FormatId::Mp3Container {
        bail!("不支持的格式: {}", probe_result.format_id);
    }
    if !cli.quiet {
        eprintln!(
            "格式: {} (置信度: {})",
            probe_result.format_id, probe_result.score
        );
    }

    let mut extractor = Mp3Extractor::new(cli.flags());
    if cli.no_seek {
        extractor.disable_seeking();
    }
    debug!("解封装配置: {:?}", extractor.flags());
    let mut demuxer = Mp3Demuxer::with_extractor(extractor);
    demuxer.open(&mut io).context("无法解析文件头部")?;

    let packets = if cli.show_packets {
        Some(read_packet_summary(&mut demuxer, &mut io))
    } else {
        None
    };

    let seek = match cli.seek {
        Some(target) => Some(seek_report(&mut demuxer, &mut io, target)?),
        None => None,
    };

    // 索引定位器读到流末尾后才有时长, 因此在读取数据包之后收集
    let format = FormatInfo {
        filename: cli.input.clone(),
        format_name: probe_result.format_id.name().to_string(),
        nb_streams: demuxer.streams().len(),
        duration: demuxer.duration(),
        probe_score: probe_result.score,
    };
    let streams = demuxer.streams().iter().map(build_stream_info).collect();
    let seek_map = SeekMapReport {
        seeker: demuxer
            .extractor()
            .seeker()
            .map_or("none", |s| s.kind())
            .to_string(),
        seekable: demuxer.is_seekable(),
        duration: demuxer.duration(),
    };

    Ok(ProbeOutput {
        format,
        streams,
        seek_map,
        packets,
        seek,
    })
}

/// 读取全部数据包并统计
fn read_packet_summary(demuxer: &mut Mp3Demuxer, io: &mut IoContext) -> PacketSummary {
    let mut summary = PacketSummary {
        total_packets: 0,
        total_bytes: 0,
        first_pts: None,
        last_pts: None,
    };
    loop {
        match demuxer.read_packet(io) {
            Ok(pkt) => {
                summary.total_packets += 1;
                summary.total_bytes += pkt.size() as u64;
                summary.first_pts.get_or_insert(pkt.pts_seconds());
                summary.last_pts = Some(pkt.pts_seconds());
            }
            Err(TingError::Eof) => break,
            Err(e) => {
                warn!("读取数据包时出错: {e}");
                break;
            }
        }
    }
    summary
}

/// 定位并读取定位后的第一个数据包
fn seek_report(
    demuxer: &mut Mp3Demuxer,
    io: &mut IoContext,
    target: f64,
) -> anyhow::Result<SeekReport> {
    if !target.is_finite() || target < 0.0 {
        bail!("无效的定位时间: {target}");
    }
    let time_us = (target * 1_000_000.0) as i64;
    let point = demuxer
        .seek(io, time_us)
        .with_context(|| format!("定位到 {target:.3} 秒失败"))?;
    let first = match demuxer.read_packet(io) {
        Ok(pkt) => Some(pkt),
        Err(TingError::Eof) => None,
        Err(e) => return Err(e).context("定位后读取数据包失败"),
    };
    Ok(SeekReport {
        target,
        point_time: point.time_us as f64 / 1_000_000.0,
        point_position: point.position,
        first_packet_pts: first.as_ref().map(|p| p.pts_seconds()),
        first_packet_pos: first.and_then(|p| p.pos),
    })
}

/// 从 Stream 构建 StreamInfo
fn build_stream_info(stream: &ting_format::Stream) -> StreamInfo {
    StreamInfo {
        index: stream.index,
        codec_type: "audio".to_string(),
        mime_type: stream.mime_type.to_string(),
        time_base: stream.time_base.to_string(),
        duration: stream
            .duration
            .filter(|_| stream.time_base.is_valid())
            .map(|d| stream.time_base.ticks_to_seconds(d)),
        sample_rate: stream.params.sample_rate,
        channels: stream.params.channels,
        bit_rate: stream.params.bit_rate,
        samples_per_frame: stream.params.frame_size,
        encoder_delay: stream.params.encoder_delay,
        encoder_padding: stream.params.encoder_padding,
        metadata: stream.metadata.clone(),
    }
}

/// 文本输出: 格式信息
fn print_format_text(info: &FormatInfo) {
    println!("[FORMAT]");
    println!("  文件名       : {}", info.filename);
    println!("  格式名称     : {}", info.format_name);
    println!("  流数量       : {}", info.nb_streams);
    if let Some(dur) = info.duration {
        println!("  时长         : {dur:.3} 秒");
    }
    println!("  探测置信度   : {}", info.probe_score);
    println!("[/FORMAT]");
    println!();
}

/// 文本输出: 流信息
fn print_streams_text(streams: &[StreamInfo]) {
    for stream in streams {
        println!("[STREAM #{}]", stream.index);
        println!("  类型         : {}", stream.codec_type);
        println!("  MIME         : {}", stream.mime_type);
        println!("  时间基       : {}", stream.time_base);
        if let Some(dur) = stream.duration {
            println!("  时长         : {dur:.3} 秒");
        }
        println!("  采样率       : {} Hz", stream.sample_rate);
        println!("  声道数       : {}", stream.channels);
        if let Some(br) = stream.bit_rate {
            println!("  码率         : {} kbps", br / 1000);
        }
        println!("  每帧采样数   : {}", stream.samples_per_frame);
        if stream.encoder_delay > 0 || stream.encoder_padding > 0 {
            println!(
                "  无缝播放     : 延迟 {} / 填充 {} 采样",
                stream.encoder_delay, stream.encoder_padding
            );
        }
        for (key, value) in &stream.metadata {
            println!("  {key:<12} : {value}");
        }
        println!("[/STREAM]");
        println!();
    }
}

/// 文本输出: 定位映射
fn print_seek_map_text(report: &SeekMapReport) {
    println!("[SEEKMAP]");
    println!("  定位器       : {}", report.seeker);
    println!("  可定位       : {}", if report.seekable { "是" } else { "否" });
    if let Some(dur) = report.duration {
        println!("  时长         : {dur:.3} 秒");
    }
    println!("[/SEEKMAP]");
    println!();
}

/// 文本输出: 数据包统计
fn print_packets_text(summary: &PacketSummary) {
    println!("[PACKETS]");
    println!("  数据包总数   : {}", summary.total_packets);
    println!(
        "  数据总量     : {} 字节 ({:.2} KB)",
        summary.total_bytes,
        summary.total_bytes as f64 / 1024.0
    );
    if let (Some(first), Some(last)) = (summary.first_pts, summary.last_pts) {
        println!("  PTS 范围     : {first:.3} - {last:.3} 秒");
    }
    println!("[/PACKETS]");
    println!();
}

/// 文本输出: 定位结果
fn print_seek_text(report: &SeekReport) {
    println!("[SEEK]");
    println!("  目标时间     : {:.3} 秒", report.target);
    println!(
        "  定位点       : {:.3} 秒 @ {} 字节",
        report.point_time, report.point_position
    );
    if let Some(pts) = report.first_packet_pts {
        println!("  首个数据包   : {pts:.3} 秒");
    }
    if let Some(pos) = report.first_packet_pos {
        println!("  数据包偏移   : {pos}");
    }
    println!("[/SEEK]");
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// 44.1kHz 128kbps 单声道 MPEG-1 Layer III 帧头, 帧长 417 字节
    const HEADER: [u8; 4] = [0xFF, 0xFB, 0x90, 0xC4];
    const FRAME_SIZE: usize = 417;

    fn cbr_stream(frames: usize) -> Vec<u8> {
        let mut data = Vec::with_capacity(frames * FRAME_SIZE);
        for _ in 0..frames {
            data.extend_from_slice(&HEADER);
            data.resize(data.len() + FRAME_SIZE - HEADER.len(), 0);
        }
        data
    }

    fn write_temp(data: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".mp3")
            .tempfile()
            .expect("创建临时文件失败");
        file.write_all(data).expect("写入临时文件失败");
        file.flush().expect("刷新临时文件失败");
        file
    }

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("ting-probe").chain(args.iter().copied()))
            .expect("命令行解析失败")
    }

    #[test]
    fn test_命令行开关映射为解封装配置() {
        let cli = parse(&["a.mp3"]);
        assert_eq!(cli.flags(), Mp3Flags::ENABLE_CONSTANT_BITRATE_SEEKING);

        let cli = parse(&["--no-cbr", "--index", "--no-id3", "a.mp3"]);
        assert_eq!(
            cli.flags(),
            Mp3Flags::ENABLE_INDEX_SEEKING | Mp3Flags::DISABLE_ID3_METADATA
        );

        let cli = parse(&["--cbr-always", "-vv", "a.mp3"]);
        assert!(cli.flags().contains(Mp3Flags::ENABLE_CONSTANT_BITRATE_SEEKING_ALWAYS));
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_探测恒定码率文件() {
        let file = write_temp(&cbr_stream(30));
        let path = file.path().to_string_lossy().into_owned();
        let cli = parse(&["-q", "--show-packets", "--seek", "0.5", &path]);
        let output = run(&cli).expect("探测失败");

        assert_eq!(output.format.format_name, "mp3");
        assert_eq!(output.streams.len(), 1);
        assert_eq!(output.streams[0].sample_rate, 44100);
        assert_eq!(output.seek_map.seeker, "constant-bitrate");
        assert!(output.seek_map.seekable);

        let packets = output.packets.expect("缺少数据包统计");
        assert_eq!(packets.total_packets, 30);
        assert_eq!(packets.total_bytes, (30 * FRAME_SIZE) as u64);

        let seek = output.seek.expect("缺少定位结果");
        assert_eq!(seek.point_position % FRAME_SIZE as u64, 0);
        assert!(seek.point_time <= 0.5);
        assert_eq!(seek.first_packet_pos, Some(seek.point_position));
    }

    #[test]
    fn test_禁用定位时报告不可定位() {
        let file = write_temp(&cbr_stream(10));
        let path = file.path().to_string_lossy().into_owned();
        let cli = parse(&["-q", "--no-seek", &path]);
        let output = run(&cli).expect("探测失败");
        assert_eq!(output.seek_map.seeker, "unseekable");
        assert!(!output.seek_map.seekable);

        let cli = parse(&["-q", "--no-seek", "--seek", "0.1", &path]);
        assert!(run(&cli).is_err());
    }

    #[test]
    fn test_非mp3文件报错() {
        let file = tempfile::Builder::new()
            .suffix(".bin")
            .tempfile()
            .expect("创建临时文件失败");
        let path = file.path().to_string_lossy().into_owned();
        let cli = parse(&["-q", &path]);
        assert!(run(&cli).is_err());
    }
}
