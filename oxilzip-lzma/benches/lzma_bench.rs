//! Performance benchmarks for oxilzip-lzma
//!
//! Measures compression and decompression throughput across the level
//! range and across data patterns with different match structure.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use oxilzip_lzma::{compress, decompress, CompressOptions, DecompressOptions, NoProgress};
use std::hint::black_box;
use std::io::Cursor;

/// Generate test data patterns for benchmarking
mod test_data {
    /// Uniform data - all bytes are the same (best compression)
    pub fn uniform(size: usize) -> Vec<u8> {
        vec![0xAA; size]
    }

    /// Random data - no patterns (worst compression)
    pub fn random(size: usize) -> Vec<u8> {
        let mut data = Vec::with_capacity(size);
        let mut seed: u64 = 0x123456789ABCDEF0;
        for _ in 0..size {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
            data.push((seed >> 32) as u8);
        }
        data
    }

    /// Text-like data - realistic scenario
    pub fn text_like(size: usize) -> Vec<u8> {
        let text = b"The quick brown fox jumps over the lazy dog. \
                     Pack my box with five dozen liquor jugs. \
                     How vexingly quick daft zebras jump! ";
        let mut data = Vec::with_capacity(size);
        while data.len() < size {
            let remaining = size - data.len();
            let chunk_size = remaining.min(text.len());
            data.extend_from_slice(&text[..chunk_size]);
        }
        data
    }
}

fn pack(data: &[u8], options: &CompressOptions) -> Vec<u8> {
    let mut out = Vec::new();
    compress(Cursor::new(data), &mut out, options, &mut NoProgress).unwrap();
    out
}

fn unpack(blob: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    decompress(
        Cursor::new(blob),
        &mut out,
        &DecompressOptions::default(),
        &mut NoProgress,
    )
    .unwrap();
    out
}

const SIZE: usize = 100 * 1024;

fn bench_compression_levels(c: &mut Criterion) {
    let mut group = c.benchmark_group("compression_levels");
    let data = test_data::text_like(SIZE);

    for level in [0u8, 1, 3, 6, 9] {
        let options = CompressOptions::from_level(level);
        group.throughput(Throughput::Bytes(SIZE as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("level_{}", level)),
            &data,
            |b, data| {
                b.iter(|| black_box(pack(black_box(data), &options)));
            },
        );
    }

    group.finish();
}

fn bench_compression_data_types(c: &mut Criterion) {
    let mut group = c.benchmark_group("compression_data_types");
    let patterns: [(&str, fn(usize) -> Vec<u8>); 3] = [
        ("uniform", test_data::uniform),
        ("random", test_data::random),
        ("text", test_data::text_like),
    ];
    let options = CompressOptions::from_level(6);

    for (name, generator) in patterns {
        let data = generator(SIZE);
        group.throughput(Throughput::Bytes(SIZE as u64));
        group.bench_with_input(BenchmarkId::from_parameter(name), &data, |b, data| {
            b.iter(|| black_box(pack(black_box(data), &options)));
        });
    }

    group.finish();
}

fn bench_decompression_speed(c: &mut Criterion) {
    let mut group = c.benchmark_group("decompression_speed");
    let patterns: [(&str, fn(usize) -> Vec<u8>); 3] = [
        ("uniform", test_data::uniform),
        ("random", test_data::random),
        ("text", test_data::text_like),
    ];
    let options = CompressOptions::from_level(6);

    for (name, generator) in patterns {
        let compressed = pack(&generator(SIZE), &options);
        group.throughput(Throughput::Bytes(SIZE as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(name),
            &compressed,
            |b, compressed| {
                b.iter(|| black_box(unpack(black_box(compressed))));
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_compression_levels,
    bench_compression_data_types,
    bench_decompression_speed,
);
criterion_main!(benches);
