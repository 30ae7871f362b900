//! Benchmarks for the simage hashing engine.
//!
//! Run with: cargo bench -p simage-core

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use simage_core::config::PoolConfig;
use simage_core::{
    Fingerprinter, HashJobBatch, HashWorkerPool, ImageLoader, MemorySink, PerceptualHasher,
};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

fn gradient(size: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(size, size, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    }))
}

fn benchmark_fingerprint(c: &mut Criterion) {
    let hasher = PerceptualHasher::default();
    let img = gradient(512);

    c.bench_function("fingerprint_512px", |b| {
        b.iter(|| {
            let _ = hasher.fingerprint(black_box(&img));
        })
    });
}

fn benchmark_decode(c: &mut Criterion) {
    let mut bytes = Cursor::new(Vec::new());
    gradient(512).write_to(&mut bytes, ImageFormat::Png).unwrap();
    let bytes = bytes.into_inner();
    let loader = ImageLoader::default();

    c.bench_function("decode_png_512px", |b| {
        b.iter(|| {
            let _ = loader.decode_bytes(black_box(bytes.clone()), Path::new("bench.png"));
        })
    });
}

fn benchmark_pool(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let paths: Vec<_> = (0..32)
        .map(|i| {
            let path = dir.path().join(format!("img_{i}.png"));
            gradient(128 + i).save(&path).unwrap();
            path
        })
        .collect();
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("pool_32_images", |b| {
        b.iter(|| {
            rt.block_on(async {
                let sink = Arc::new(MemorySink::new());
                let pool = HashWorkerPool::with_hasher(
                    &PoolConfig::default(),
                    ImageLoader::default(),
                    Arc::new(PerceptualHasher::default()),
                    sink,
                );
                for chunk in paths.chunks(8) {
                    pool.submit(HashJobBatch::new(chunk.to_vec())).await.unwrap();
                }
                pool.wait_idle().await;
                pool.shutdown().await;
            })
        })
    });
}

criterion_group!(benches, benchmark_fingerprint, benchmark_decode, benchmark_pool);
criterion_main!(benches);
