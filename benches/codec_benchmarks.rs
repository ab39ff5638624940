//! Performance benchmarks for CrabCodec hot paths
//!
//! Run with: cargo bench
//!
//! These benchmarks measure the per-frame conversion and scanning work the
//! encoder performs on the submission and completion paths.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use crabcodec::convert::i420_to_nv12;
use crabcodec::nal::scan_fragments;
use crabcodec::testing::synthetic_frame;

fn bench_i420_to_nv12(c: &mut Criterion) {
    let mut group = c.benchmark_group("I420 to NV12");

    let resolutions = [(640u32, 480u32, "480p"), (1280, 720, "720p"), (1920, 1080, "1080p")];

    for (width, height, name) in resolutions {
        let frame = synthetic_frame(7, width, height);
        let bytes = (width * height * 3 / 2) as u64;
        group.throughput(Throughput::Bytes(bytes));
        group.bench_with_input(BenchmarkId::from_parameter(name), &frame, |b, frame| {
            b.iter(|| i420_to_nv12(black_box(&frame.buffer), black_box(height)).unwrap());
        });
    }

    group.finish();
}

fn bench_i420_to_nv12_padded(c: &mut Criterion) {
    let mut group = c.benchmark_group("I420 to NV12 with padding");

    // 1080 pads to 1088 when 16-alignment is required.
    let frame = synthetic_frame(7, 1920, 1080);
    group.bench_function("1080p padded to 1088", |b| {
        b.iter(|| i420_to_nv12(black_box(&frame.buffer), black_box(1088)).unwrap());
    });

    group.finish();
}

fn bench_nal_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("Annex-B scan");

    // A realistic access unit: SPS + PPS followed by a large slice with
    // no embedded start codes.
    for (slice_len, name) in [(4 * 1024usize, "4KB"), (64 * 1024, "64KB")] {
        let mut stream = vec![
            0x00, 0x00, 0x00, 0x01, 0x67, 0x42, 0x00, 0x1e, // SPS
            0x00, 0x00, 0x00, 0x01, 0x68, 0xce, 0x3c, 0x80, // PPS
            0x00, 0x00, 0x01, 0x65, // IDR slice header
        ];
        stream.extend((0..slice_len).map(|i| 0x20u8.wrapping_add((i % 199) as u8)));

        group.throughput(Throughput::Bytes(stream.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), &stream, |b, stream| {
            b.iter(|| scan_fragments(black_box(stream)));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_i420_to_nv12,
    bench_i420_to_nv12_padded,
    bench_nal_scan
);
criterion_main!(benches);
