//! Ting MP3 解封装性能基准测试.
//!
//! 覆盖帧同步, 稳态逐帧读取与恒定码率定位等核心路径.

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use ting::format::demuxers::mp3::{Mp3Demuxer, Mp3Extractor, Mp3Flags};
use ting::format::{Demuxer, IoContext};

/// MPEG-1 Layer III, 128 kbps, 44100 Hz, 立体声, 帧长 417 字节
const HEADER_128K: [u8; 4] = [0xFF, 0xFB, 0x90, 0x00];
const FRAME_SIZE: usize = 417;

/// 生成 `frames` 帧的恒定码率流, 前面带 `junk` 字节的非同步数据
fn make_stream(junk: usize, frames: usize) -> Vec<u8> {
    let mut data: Vec<u8> = (0..junk).map(|i| (i * 7 % 255) as u8).collect();
    for i in 0..frames {
        data.extend_from_slice(&HEADER_128K);
        data.extend((4..FRAME_SIZE).map(|j| ((i + j) % 200) as u8));
    }
    data
}

fn bench_sniff(c: &mut Criterion) {
    let data = make_stream(16 * 1024, 8);
    c.bench_function("mp3_sniff_16k_junk", |b| {
        b.iter_batched(
            || IoContext::from_memory(data.clone()),
            |mut io| {
                let found = Mp3Extractor::default().sniff(&mut io).unwrap();
                black_box(found);
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_read_all(c: &mut Criterion) {
    // 约 26 秒音频
    let data = make_stream(0, 1000);
    c.bench_function("mp3_demux_1000_frames", |b| {
        b.iter_batched(
            || IoContext::from_memory(data.clone()),
            |mut io| {
                let mut demuxer = Mp3Demuxer::new(Mp3Flags::ENABLE_CONSTANT_BITRATE_SEEKING);
                demuxer.open(&mut io).unwrap();
                let mut bytes = 0usize;
                while let Ok(pkt) = demuxer.read_packet(&mut io) {
                    bytes += pkt.size();
                }
                black_box(bytes);
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_index_read_all(c: &mut Criterion) {
    let data = make_stream(0, 1000);
    c.bench_function("mp3_demux_1000_frames_index", |b| {
        b.iter_batched(
            || IoContext::from_memory(data.clone()),
            |mut io| {
                let mut demuxer = Mp3Demuxer::new(Mp3Flags::ENABLE_INDEX_SEEKING);
                demuxer.open(&mut io).unwrap();
                while demuxer.read_packet(&mut io).is_ok() {}
                black_box(demuxer.duration());
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_cbr_seek(c: &mut Criterion) {
    let data = make_stream(0, 1000);
    let mut io = IoContext::from_memory(data);
    let mut demuxer = Mp3Demuxer::new(Mp3Flags::ENABLE_CONSTANT_BITRATE_SEEKING);
    demuxer.open(&mut io).unwrap();
    c.bench_function("mp3_cbr_seek_and_read", |b| {
        let mut target = 0i64;
        b.iter(|| {
            target = (target + 1_234_567) % 25_000_000;
            let point = demuxer.seek(&mut io, black_box(target)).unwrap();
            let pkt = demuxer.read_packet(&mut io).unwrap();
            black_box((point, pkt.pts));
        });
    });
}

criterion_group!(
    benches,
    bench_sniff,
    bench_read_all,
    bench_index_read_all,
    bench_cbr_seek
);
criterion_main!(benches);
